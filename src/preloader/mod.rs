//! Annotator preloading.
//!
//! A long-lived side process hosts warm instances of expensive annotators
//! and serves execute requests over a local stream socket. The client and
//! server exchange a configuration fingerprint at connect time; on
//! mismatch the scheduler falls back to inline execution.

mod client;
mod protocol;
mod server;

pub use client::PreloadClient;
pub use protocol::{PreloadRequest, PreloadResponse, read_packet, rule_fingerprint, write_packet};
pub use server::{PreloadConfig, PreloadEntry, PreloadServer};
