//! Staleness and incremental re-execution.

#![allow(clippy::unwrap_used)]

mod helpers;

use std::fs;

use helpers::{QUICKSTART_XML, TestCorpus, swedish_xml_config};

use sparv::scheduler::RunOptions;

#[test]
fn test_second_run_executes_nothing() {
    let corpus = TestCorpus::new(&swedish_xml_config(), &[("doc1.xml", QUICKSTART_XML)]);
    let first = corpus.run(&["xml_export"]);
    assert!(first.ok(), "failures: {:?}", first.failed);
    assert!(!first.executed.is_empty());

    let second = corpus.run(&["xml_export"]);
    assert!(second.ok());
    assert!(
        second.executed.is_empty(),
        "re-executed: {:?}",
        second.executed
    );
    assert_eq!(second.skipped.len(), first.executed.len() + first.skipped.len());
}

#[test]
fn test_touched_source_with_same_content_executes_nothing() {
    let corpus = TestCorpus::new(&swedish_xml_config(), &[("doc1.xml", QUICKSTART_XML)]);
    assert!(corpus.run(&["xml_export"]).ok());

    // Rewrite the file with identical bytes: the mtime changes, the
    // content hash does not.
    let source = corpus.corpus_dir().join("source").join("doc1.xml");
    fs::write(&source, QUICKSTART_XML).unwrap();

    let second = corpus.run(&["xml_export"]);
    assert!(
        second.executed.is_empty(),
        "re-executed: {:?}",
        second.executed
    );
}

#[test]
fn test_changed_source_reruns_everything() {
    let corpus = TestCorpus::new(&swedish_xml_config(), &[("doc1.xml", QUICKSTART_XML)]);
    assert!(corpus.run(&["xml_export"]).ok());

    let source = corpus.corpus_dir().join("source").join("doc1.xml");
    fs::write(&source, "<text>Helt ny text.</text>").unwrap();

    let second = corpus.run(&["xml_export"]);
    assert!(second.ok(), "failures: {:?}", second.failed);
    assert!(second
        .executed
        .iter()
        .any(|t| t.rule.as_str() == "xml_import:parse"));
    assert!(second
        .executed
        .iter()
        .any(|t| t.rule.as_str() == "xml_export:pretty"));
}

#[test]
fn test_added_annotation_reruns_only_its_subtree() {
    let corpus = TestCorpus::new(&swedish_xml_config(), &[("doc1.xml", QUICKSTART_XML)]);
    assert!(corpus.run(&["xml_export"]).ok());

    // Add <token>:misc.word to the export list: only the new annotator
    // and its dependents may run.
    let mut config = swedish_xml_config();
    config.push_str("    - <token>:misc.word\n");
    fs::write(corpus.corpus_dir().join("config.yaml"), config).unwrap();

    let second = corpus.run(&["xml_export"]);
    assert!(second.ok(), "failures: {:?}", second.failed);
    let executed: Vec<&str> = second.executed.iter().map(|t| t.rule.as_str()).collect();
    assert!(executed.contains(&"misc:word"), "executed: {executed:?}");
    assert!(executed.contains(&"xml_export:pretty"));
    assert!(!executed.contains(&"xml_import:parse"));
    assert!(!executed.contains(&"segment:tokenize"));
    assert!(!executed.contains(&"segment:sentence"));
}

#[test]
fn test_force_reruns_everything() {
    let corpus = TestCorpus::new(&swedish_xml_config(), &[("doc1.xml", QUICKSTART_XML)]);
    let first = corpus.run(&["xml_export"]);
    assert!(first.ok());

    let forced = corpus.run_with(
        &["xml_export"],
        &RunOptions {
            force: true,
            ..RunOptions::default()
        },
    );
    assert!(forced.ok());
    assert_eq!(forced.executed.len(), first.executed.len());
    assert!(forced.skipped.is_empty());
}

#[test]
fn test_dry_run_reports_without_running() {
    let corpus = TestCorpus::new(&swedish_xml_config(), &[("doc1.xml", QUICKSTART_XML)]);
    let dry = corpus.run_with(
        &["xml_export"],
        &RunOptions {
            dry_run: true,
            ..RunOptions::default()
        },
    );
    assert!(!dry.stale.is_empty());
    assert!(dry.executed.is_empty());
    assert!(!corpus.has_export("xml_export/doc1_export.xml"));

    // After a real run the stale set is empty.
    assert!(corpus.run(&["xml_export"]).ok());
    let dry = corpus.run_with(
        &["xml_export"],
        &RunOptions {
            dry_run: true,
            ..RunOptions::default()
        },
    );
    assert!(dry.stale.is_empty(), "stale: {:?}", dry.stale);
}

#[test]
fn test_deterministic_outputs_byte_equal() {
    let corpus = TestCorpus::new(&swedish_xml_config(), &[("doc1.xml", QUICKSTART_XML)]);
    assert!(corpus.run(&["xml_export"]).ok());
    let first = corpus.export_file("xml_export/doc1_export.xml");

    let forced = corpus.run_with(
        &["xml_export"],
        &RunOptions {
            force: true,
            ..RunOptions::default()
        },
    );
    assert!(forced.ok());
    let second = corpus.export_file("xml_export/doc1_export.xml");
    assert_eq!(first, second);
}
