//! Work-directory layout and list-expansion properties.

#![allow(clippy::unwrap_used)]

mod helpers;

use helpers::{QUICKSTART_XML, TestCorpus, swedish_xml_config};
use rstest::rstest;
use walkdir::WalkDir;

use sparv::base::{Annotation, ExpandedItem, ListItem, expand_in_list};

#[test]
fn test_workdir_span_directories_hold_span_files() {
    let mut config = swedish_xml_config();
    config.push_str("    - <token>:misc.word\n");
    let corpus = TestCorpus::new(&config, &[("doc1.xml", QUICKSTART_XML)]);
    assert!(corpus.run(&["xml_export"]).ok());

    let workdir = corpus.corpus_dir().join("sparv-workdir").join("doc1");
    let mut span_dirs = 0;
    for entry in WalkDir::new(&workdir).min_depth(1).max_depth(1) {
        let entry = entry.unwrap();
        if !entry.file_type().is_dir() || entry.file_name() == "markers" {
            continue;
        }
        if entry.file_name() == "data" {
            continue;
        }
        span_dirs += 1;
        assert!(
            entry.path().join("span").is_file(),
            "span directory {} without a span file",
            entry.path().display()
        );
    }
    // text, segment.sentence, segment.token at least.
    assert!(span_dirs >= 3, "only {span_dirs} span directories");

    // The attribute file sits beside its base annotation's span file.
    assert!(workdir.join("segment.token").join("misc.word").is_file());
}

#[rstest]
#[case("segment.token", ListItem::Include { name: "segment.token".into(), rename: None })]
#[case("segment.token as t", ListItem::Include { name: "segment.token".into(), rename: Some("t".into()) })]
#[case("not segment.token", ListItem::Exclude("segment.token".into()))]
#[case("...", ListItem::Rest)]
fn test_list_item_forms(#[case] entry: &str, #[case] expected: ListItem) {
    assert_eq!(ListItem::parse(entry), expected);
}

#[rstest]
#[case(&["a.x"])]
#[case(&["..."])]
#[case(&["b.y", "..."])]
#[case(&["b.y as z", "...", "not c.z"])]
#[case(&[])]
fn test_expansion_idempotent(#[case] entries: &[&str]) {
    let candidates: Vec<Annotation> = ["a.x", "b.y", "c.z"]
        .iter()
        .map(|n| Annotation::new(n).unwrap())
        .collect();
    let entries: Vec<String> = entries.iter().map(|e| (*e).to_owned()).collect();
    let once = expand_in_list(&entries, &candidates).unwrap();
    let rendered: Vec<String> = once.iter().map(ExpandedItem::render).collect();
    let twice = expand_in_list(&rendered, &candidates).unwrap();
    assert_eq!(once, twice);
}
