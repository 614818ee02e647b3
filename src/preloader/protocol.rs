//! Wire protocol of the preload socket.
//!
//! Packets are length-prefixed (little-endian u32) JSON values. A
//! connection starts with a handshake carrying the rule id and a
//! fingerprint of `(rule id, model files, parameter map)`; requests then
//! stream log events followed by a final status.

use std::fs;
use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::base::{Result, SparvError};
use crate::registry::ResolvedParam;
use crate::resolver::Rule;

/// Upper bound on one packet; anything larger is a protocol violation.
const MAX_PACKET: u32 = 64 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub enum PreloadRequest {
    /// Opens a conversation about one warmed rule.
    Handshake { rule: String, fingerprint: String },
    /// Run the rule for one file.
    Execute {
        rule: String,
        file: Option<String>,
    },
    /// Ask the server to shut down.
    Stop,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum PreloadResponse {
    /// Handshake answer; `ok` is false on fingerprint mismatch or when
    /// the rule is not warmed.
    Handshake { ok: bool, fingerprint: String },
    /// A log event streamed while the rule runs.
    Log { level: String, message: String },
    /// Final status of an execute request.
    Done { ok: bool, message: Option<String> },
}

pub fn write_packet<T: Serialize>(stream: &mut impl Write, message: &T) -> Result<()> {
    let body = serde_json::to_vec(message)
        .map_err(|e| SparvError::Preloader(format!("encoding packet: {e}")))?;
    let len = u32::try_from(body.len())
        .map_err(|_| SparvError::Preloader("packet too large".to_owned()))?;
    stream.write_all(&len.to_le_bytes())?;
    stream.write_all(&body)?;
    stream.flush()?;
    Ok(())
}

pub fn read_packet<T: DeserializeOwned>(stream: &mut impl Read) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_PACKET {
        return Err(SparvError::Preloader(format!(
            "packet of {len} bytes exceeds the limit"
        )));
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body)?;
    serde_json::from_slice(&body)
        .map_err(|e| SparvError::Preloader(format!("decoding packet: {e}")))
}

/// Fingerprint of a warmed rule: rule id, model file hashes, parameter
/// snapshot.
pub fn rule_fingerprint(rule: &Rule) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(rule.name.as_bytes());
    for (name, param) in &rule.params {
        hasher.update(name.as_bytes());
        hasher.update(crate::scheduler::staleness_render(param).as_bytes());
        if let ResolvedParam::Model(path) = param {
            match fs::read(path) {
                Ok(bytes) => {
                    hasher.update(blake3::hash(&bytes).as_bytes());
                }
                Err(_) => {
                    hasher.update(b"absent");
                }
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}
