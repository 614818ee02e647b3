//! Preload server and client over a local socket.

#![allow(clippy::unwrap_used)]

mod helpers;

use std::os::unix::net::UnixStream;
use std::time::Duration;

use helpers::{QUICKSTART_XML, TestCorpus, swedish_xml_config};

use sparv::cli::commands::load_pipeline;
use sparv::preloader::{
    PreloadConfig, PreloadRequest, PreloadResponse, PreloadServer, read_packet, write_packet,
};
use sparv::scheduler::RunOptions;

fn wait_for_socket(path: &std::path::Path) {
    for _ in 0..100 {
        if path.exists() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("preload socket never appeared");
}

fn annotations_config() -> String {
    let mut config = swedish_xml_config();
    config.push_str("    - <token>:misc.word\n");
    config
}

#[test]
fn test_execute_through_preloader() {
    let corpus = TestCorpus::new(&annotations_config(), &[("doc1.xml", QUICKSTART_XML)]);
    // Produce the token spans the warm annotator needs.
    assert!(corpus.run(&["xml_export"]).ok());

    let socket = corpus.corpus_dir().join("preload.sock");
    let server_pipeline =
        load_pipeline(corpus.corpus_dir(), Some(corpus.data_dir()), &[]).unwrap();
    let preload_config = PreloadConfig {
        socket: socket.clone(),
        annotators: vec![sparv::preloader::PreloadEntry {
            rule: "misc:word".to_owned(),
            params: std::collections::BTreeMap::new(),
        }],
    };
    let server =
        PreloadServer::new(&preload_config, &server_pipeline.ruleset, server_pipeline.env)
            .unwrap();
    let handle = std::thread::spawn(move || server.serve());
    wait_for_socket(&socket);

    // Force a re-run so the warm annotator actually serves a request.
    let summary = corpus.run_with(
        &["xml_export"],
        &RunOptions {
            force: true,
            socket: Some(socket.clone()),
            ..RunOptions::default()
        },
    );
    assert!(summary.ok(), "failures: {:?}", summary.failed);
    assert!(summary
        .executed
        .iter()
        .any(|t| t.rule.as_str() == "misc:word"));

    PreloadServer::stop(&socket).unwrap();
    handle.join().unwrap().unwrap();
}

#[test]
fn test_handshake_rejects_wrong_fingerprint() {
    let corpus = TestCorpus::new(&annotations_config(), &[("doc1.xml", QUICKSTART_XML)]);
    assert!(corpus.run(&["xml_export"]).ok());

    let socket = corpus.corpus_dir().join("preload.sock");
    let pipeline = load_pipeline(corpus.corpus_dir(), Some(corpus.data_dir()), &[]).unwrap();
    let preload_config = PreloadConfig {
        socket: socket.clone(),
        annotators: vec![sparv::preloader::PreloadEntry {
            rule: "misc:word".to_owned(),
            params: std::collections::BTreeMap::new(),
        }],
    };
    let server = PreloadServer::new(&preload_config, &pipeline.ruleset, pipeline.env).unwrap();
    let handle = std::thread::spawn(move || server.serve());
    wait_for_socket(&socket);

    let mut stream = UnixStream::connect(&socket).unwrap();
    write_packet(
        &mut stream,
        &PreloadRequest::Handshake {
            rule: "misc:word".to_owned(),
            fingerprint: "not-the-right-fingerprint".to_owned(),
        },
    )
    .unwrap();
    let answer: PreloadResponse = read_packet(&mut stream).unwrap();
    match answer {
        PreloadResponse::Handshake { ok, .. } => assert!(!ok),
        other => panic!("unexpected answer: {other:?}"),
    }
    drop(stream);

    PreloadServer::stop(&socket).unwrap();
    handle.join().unwrap().unwrap();
}
