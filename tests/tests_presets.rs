//! Preset expansion, negation and class defaults, end to end.

#![allow(clippy::unwrap_used)]

mod helpers;

use helpers::{QUICKSTART_XML, TestCorpus};

use sparv::registry::ResolvedParam;

const PRESET_FILE: &str = "\
classes:
  token: segment.token
  sentence: segment.sentence
presets:
  basic:
    - <sentence>
    - <token>
    - <token>:misc.word
";

fn preset_corpus(annotations: &str) -> TestCorpus {
    let config = format!(
        "metadata:\n  language: swe\nimport:\n  importer: xml_import:parse\nexport:\n  annotations:\n{annotations}"
    );
    let corpus = TestCorpus::new(&config, &[("doc1.xml", QUICKSTART_XML)]);
    corpus.add_preset("SWE_DEFAULT", PRESET_FILE);
    corpus
}

#[test]
fn test_preset_expands_in_run() {
    let corpus = preset_corpus("    - SWE_DEFAULT.basic\n");
    let summary = corpus.run(&["xml_export"]);
    assert!(summary.ok(), "failures: {:?}", summary.failed);
    assert!(summary
        .executed
        .iter()
        .any(|t| t.rule.as_str() == "misc:word"));

    let xml = corpus.export_file("xml_export/doc1_export.xml");
    assert!(xml.contains("<token word=\"Ord\">Ord</token>"), "{xml}");
}

#[test]
fn test_preset_with_negation() {
    let corpus = preset_corpus(
        "    - SWE_DEFAULT.basic\n    - not <token>:misc.word\n",
    );
    let pipeline = corpus.pipeline();
    let rule = pipeline.ruleset.get("xml_export:pretty").unwrap();
    let Some(ResolvedParam::ExportAnnotations(items)) = rule.params.get("annotations") else {
        panic!("missing export annotations");
    };
    let names: Vec<&str> = items.iter().map(|i| i.annotation.as_str()).collect();
    assert!(names.contains(&"segment.token"));
    assert!(names.contains(&"segment.sentence"));
    assert!(
        !names.contains(&"segment.token:misc.word"),
        "negated annotation still listed: {names:?}"
    );
}

#[test]
fn test_negation_only_list_is_an_error() {
    let config = "metadata:\n  language: swe\nimport:\n  importer: xml_import:parse\nexport:\n  annotations:\n    - not <token>:misc.word\n";
    let corpus = TestCorpus::new(config, &[("doc1.xml", QUICKSTART_XML)]);
    let result = sparv::cli::commands::load_pipeline(
        corpus.corpus_dir(),
        Some(corpus.data_dir()),
        &[],
    );
    assert!(result.is_err());
}

#[test]
fn test_rename_reaches_the_export() {
    let corpus = preset_corpus("    - <sentence>\n    - <token>\n    - <token>:misc.word as w\n");
    let summary = corpus.run(&["xml_export"]);
    assert!(summary.ok(), "failures: {:?}", summary.failed);
    let xml = corpus.export_file("xml_export/doc1_export.xml");
    assert!(xml.contains("<token w=\"Ord\">Ord</token>"), "{xml}");
}

#[test]
fn test_classes_listing_marks_inferred() {
    let config = "metadata:\n  language: swe\nimport:\n  importer: xml_import:parse\nexport:\n  annotations:\n    - <sentence>\n    - <token>\n";
    let corpus = TestCorpus::new(config, &[("doc1.xml", QUICKSTART_XML)]);
    let pipeline = corpus.pipeline();
    let bindings = pipeline.ruleset.bindings();
    assert_eq!(bindings.get("token"), Some("segment.token"));
    assert_eq!(bindings.get("sentence"), Some("segment.sentence"));
    assert!(bindings.inferred().iter().any(|(c, _)| c == "token"));
}
