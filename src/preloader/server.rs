//! Preload server.
//!
//! Reads a YAML control file naming the annotators to warm, binds a local
//! stream socket, and serves execute requests one at a time. Warming means
//! materializing the rules once up front so model files are read a single
//! time and stay resident for every request.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::base::{Result, SparvError};
use crate::registry::{ExecutionEnv, TaskContext};
use crate::resolver::{Rule, RuleSet};

use super::protocol::{PreloadRequest, PreloadResponse, read_packet, rule_fingerprint, write_packet};

/// The YAML control file handed to `sparv preload start`.
#[derive(Debug, Deserialize)]
pub struct PreloadConfig {
    /// Socket path; `preload.socket` in the corpus config must match.
    pub socket: PathBuf,
    /// Rules to warm.
    pub annotators: Vec<PreloadEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PreloadEntry {
    pub rule: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl PreloadConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(SparvError::Yaml)
    }
}

/// A warmed rule with its precomputed fingerprint.
struct WarmRule {
    rule: Arc<Rule>,
    fingerprint: String,
}

pub struct PreloadServer {
    socket: PathBuf,
    warm: FxHashMap<SmolStr, WarmRule>,
    env: ExecutionEnv,
}

impl PreloadServer {
    /// Warm the configured rules and bind the socket.
    pub fn new(config: &PreloadConfig, ruleset: &RuleSet, env: ExecutionEnv) -> Result<Self> {
        let mut warm = FxHashMap::default();
        for entry in &config.annotators {
            let Some(rule) = ruleset.get(&entry.rule) else {
                return Err(SparvError::missing(
                    "preload rule",
                    format!("'{}' is not a materialized rule", entry.rule),
                ));
            };
            if rule.function.preload.is_none() {
                warn!(rule = %entry.rule, "rule declares no preloader support");
            }
            let fingerprint = rule_fingerprint(rule);
            info!(rule = %entry.rule, fingerprint = %fingerprint, "warmed rule");
            warm.insert(
                rule.name.clone(),
                WarmRule {
                    rule: Arc::clone(rule),
                    fingerprint,
                },
            );
        }
        Ok(Self {
            socket: config.socket.clone(),
            warm,
            env,
        })
    }

    /// Accept and serve requests until a stop packet arrives.
    pub fn serve(&self) -> Result<()> {
        if self.socket.exists() {
            fs::remove_file(&self.socket)?;
        }
        let listener = UnixListener::bind(&self.socket)?;
        info!(socket = %self.socket.display(), "preloader listening");
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("failed connection: {e}");
                    continue;
                }
            };
            match self.serve_connection(stream) {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => warn!("connection error: {e}"),
            }
        }
        let _ = fs::remove_file(&self.socket);
        info!("preloader stopped");
        Ok(())
    }

    /// Handle one connection; returns true when a stop was requested.
    fn serve_connection(&self, mut stream: UnixStream) -> Result<bool> {
        let request: PreloadRequest = read_packet(&mut stream)?;
        let rule_id = match request {
            PreloadRequest::Stop => return Ok(true),
            PreloadRequest::Handshake { rule, fingerprint } => {
                let warm = self.warm.get(rule.as_str());
                let (ok, server_fingerprint) = match warm {
                    Some(w) => (w.fingerprint == fingerprint, w.fingerprint.clone()),
                    None => (false, String::new()),
                };
                write_packet(
                    &mut stream,
                    &PreloadResponse::Handshake {
                        ok,
                        fingerprint: server_fingerprint,
                    },
                )?;
                if !ok {
                    return Ok(false);
                }
                rule
            }
            PreloadRequest::Execute { .. } => {
                return Err(SparvError::Preloader(
                    "execute before handshake".to_owned(),
                ));
            }
        };

        match read_packet::<PreloadRequest>(&mut stream)? {
            PreloadRequest::Execute { rule, file } => {
                if rule != rule_id {
                    return Err(SparvError::Preloader(
                        "execute names a different rule than the handshake".to_owned(),
                    ));
                }
                debug!(rule = %rule, file = ?file, "serving execute request");
                let result = self.run(&rule, file.as_deref());
                let response = match result {
                    Ok(()) => PreloadResponse::Done {
                        ok: true,
                        message: None,
                    },
                    Err(e) => PreloadResponse::Done {
                        ok: false,
                        message: Some(e.to_string()),
                    },
                };
                write_packet(&mut stream, &response)?;
                Ok(false)
            }
            PreloadRequest::Stop => Ok(true),
            PreloadRequest::Handshake { .. } => Err(SparvError::Preloader(
                "second handshake on one connection".to_owned(),
            )),
        }
    }

    fn run(&self, rule_id: &str, file: Option<&str>) -> Result<()> {
        let warm = self
            .warm
            .get(rule_id)
            .ok_or_else(|| SparvError::Preloader(format!("rule '{rule_id}' not warmed")))?;
        let body = warm
            .rule
            .function
            .body
            .clone()
            .ok_or_else(|| SparvError::registry(format!("'{rule_id}' has no body")))?;
        let mut ctx = TaskContext::new(rule_id, file, &warm.rule.params, &self.env);
        body(&mut ctx)
    }

    /// Connect to a running server and ask it to stop.
    pub fn stop(socket: &Path) -> Result<()> {
        let mut stream = UnixStream::connect(socket)
            .map_err(|e| SparvError::Preloader(format!("no server on {}: {e}", socket.display())))?;
        write_packet(&mut stream, &PreloadRequest::Stop)?;
        Ok(())
    }
}
