//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use sparv::cli::commands::{Pipeline, load_pipeline};
use sparv::graph::build_graph;
use sparv::registry::FunctionKind;
use sparv::scheduler::{RunOptions, RunSummary, execute};

/// A corpus directory plus a data directory, both temporary.
pub struct TestCorpus {
    pub dir: TempDir,
}

impl TestCorpus {
    /// Create a corpus with a config and a set of source files.
    pub fn new(config: &str, sources: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.yaml"), config).unwrap();
        let source_dir = dir.path().join("source");
        fs::create_dir_all(&source_dir).unwrap();
        for (name, contents) in sources {
            fs::write(source_dir.join(name), contents).unwrap();
        }
        let data = dir.path().join("data");
        fs::create_dir_all(data.join("config").join("presets")).unwrap();
        fs::create_dir_all(data.join("models")).unwrap();
        fs::create_dir_all(data.join("bin")).unwrap();
        Self { dir }
    }

    pub fn corpus_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Write a preset file into the data directory.
    pub fn add_preset(&self, namespace: &str, contents: &str) {
        let path = self
            .data_dir()
            .join("config")
            .join("presets")
            .join(format!("{namespace}.yaml"));
        fs::write(path, contents).unwrap();
    }

    pub fn pipeline(&self) -> Pipeline {
        load_pipeline(self.corpus_dir(), Some(self.data_dir()), &[]).unwrap()
    }

    /// Run exporter targets to completion.
    pub fn run(&self, targets: &[&str]) -> RunSummary {
        self.run_with(targets, &RunOptions::default())
    }

    pub fn run_with(&self, targets: &[&str], options: &RunOptions) -> RunSummary {
        self.run_kinds(targets, &[FunctionKind::Exporter], options)
    }

    pub fn run_kinds(
        &self,
        targets: &[&str],
        kinds: &[FunctionKind],
        options: &RunOptions,
    ) -> RunSummary {
        let mut pipeline = self.pipeline();
        let targets: Vec<String> = targets.iter().map(|t| (*t).to_owned()).collect();
        let graph = build_graph(&mut pipeline.ruleset, &targets, kinds, &pipeline.env).unwrap();
        execute(&graph, &pipeline.env, options, &CancellationToken::new()).unwrap()
    }

    pub fn export_file(&self, relative: &str) -> String {
        fs::read_to_string(self.corpus_dir().join("export").join(relative)).unwrap()
    }

    pub fn has_export(&self, relative: &str) -> bool {
        self.corpus_dir().join("export").join(relative).is_file()
    }
}

/// The minimal Swedish corpus config over the XML importer.
pub fn swedish_xml_config() -> String {
    "metadata:\n  language: swe\n  id: testcorpus\nimport:\n  importer: xml_import:parse\nexport:\n  annotations:\n    - <sentence>\n    - <token>\n"
        .to_owned()
}

/// The quick-start sentence used across the scenario tests.
pub const QUICKSTART_XML: &str = "<text>Ord, ord, ord. Här kommer några fler ord.</text>";
