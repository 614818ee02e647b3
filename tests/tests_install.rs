//! Installer/uninstaller pairing and marker exclusivity.

#![allow(clippy::unwrap_used)]

mod helpers;

use helpers::{QUICKSTART_XML, TestCorpus, swedish_xml_config};

use sparv::registry::FunctionKind;
use sparv::scheduler::RunOptions;
use sparv::storage::{Compression, WorkDir};

fn install_corpus() -> (TestCorpus, std::path::PathBuf) {
    let target = tempfile::TempDir::new().unwrap().keep();
    let mut config = swedish_xml_config();
    config.push_str(&format!(
        "xml_export:\n  install_target: {}\n",
        target.display()
    ));
    let corpus = TestCorpus::new(&config, &[("doc1.xml", QUICKSTART_XML)]);
    (corpus, target)
}

fn corpus_workdir(corpus: &TestCorpus) -> WorkDir {
    WorkDir::for_corpus(
        &corpus.corpus_dir().join("sparv-workdir"),
        Compression::Gzip,
    )
}

#[test]
fn test_install_copies_exports_and_writes_marker() {
    let (corpus, target) = install_corpus();
    let summary = corpus.run_kinds(
        &["xml_export:install"],
        &[FunctionKind::Installer],
        &RunOptions::default(),
    );
    assert!(summary.ok(), "failures: {:?}", summary.failed);

    // The exporter ran as a dependency, and the copy landed.
    assert!(corpus.has_export("xml_export/doc1_export.xml"));
    assert!(target.join("doc1_export.xml").is_file());

    let workdir = corpus_workdir(&corpus);
    assert!(workdir.data_exists("xml_export.install"));
    assert!(!workdir.data_exists("xml_export.uninstall"));
}

#[test]
fn test_uninstall_swaps_markers_and_removes_files() {
    let (corpus, target) = install_corpus();
    assert!(
        corpus
            .run_kinds(
                &["xml_export:install"],
                &[FunctionKind::Installer],
                &RunOptions::default(),
            )
            .ok()
    );
    let summary = corpus.run_kinds(
        &["xml_export:uninstall"],
        &[FunctionKind::Uninstaller],
        &RunOptions::default(),
    );
    assert!(summary.ok(), "failures: {:?}", summary.failed);

    assert!(!target.join("doc1_export.xml").is_file());
    let workdir = corpus_workdir(&corpus);
    assert!(workdir.data_exists("xml_export.uninstall"));
    assert!(
        !workdir.data_exists("xml_export.install"),
        "paired markers may not coexist"
    );
}

#[test]
fn test_build_models_is_idempotent() {
    let corpus = TestCorpus::new(&swedish_xml_config(), &[("doc1.xml", QUICKSTART_XML)]);
    let first = corpus.run_kinds(
        &["segment:abbrev_model"],
        &[FunctionKind::ModelBuilder],
        &RunOptions::default(),
    );
    assert!(first.ok(), "failures: {:?}", first.failed);
    let model = corpus.data_dir().join("models").join("segment").join("abbrev.txt");
    assert!(model.is_file());
    let contents = std::fs::read_to_string(&model).unwrap();

    let second = corpus.run_kinds(
        &["segment:abbrev_model"],
        &[FunctionKind::ModelBuilder],
        &RunOptions::default(),
    );
    assert!(second.ok());
    assert_eq!(std::fs::read_to_string(&model).unwrap(), contents);
}
