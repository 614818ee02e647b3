//! Preload socket client.

use std::io::ErrorKind;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::base::{Result, SparvError};
use crate::graph::Task;
use crate::registry::ExecutionEnv;

use super::protocol::{PreloadRequest, PreloadResponse, read_packet, rule_fingerprint, write_packet};

/// Timeout for a handshake answer; a busy server simply does not answer
/// in time.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// How long a forced client waits between connection attempts.
const RETRY_DELAY: Duration = Duration::from_millis(250);

pub struct PreloadClient;

impl PreloadClient {
    /// Try to execute a task through the preload socket.
    ///
    /// Returns `Ok(None)` when the task should run inline instead: no
    /// server, busy socket, or fingerprint mismatch. With `force` the
    /// client waits for a busy socket instead of falling back; a
    /// fingerprint mismatch stays an error then, since waiting cannot fix
    /// a differently-configured server.
    pub fn try_execute(
        socket: &Path,
        task: &Task,
        _env: &ExecutionEnv,
        force: bool,
    ) -> Result<Option<Result<()>>> {
        loop {
            let stream = match UnixStream::connect(socket) {
                Ok(stream) => stream,
                Err(e) if force && is_busy(&e) => {
                    debug!("preload socket busy, waiting");
                    std::thread::sleep(RETRY_DELAY);
                    continue;
                }
                Err(e) => {
                    debug!("preload socket unavailable: {e}");
                    return Ok(None);
                }
            };
            match Self::execute_on(stream, task, force)? {
                Attempt::Done(result) => return Ok(Some(result)),
                Attempt::Fallback => return Ok(None),
                Attempt::RetryBusy => {
                    std::thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    fn execute_on(mut stream: UnixStream, task: &Task, force: bool) -> Result<Attempt> {
        stream
            .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
            .map_err(SparvError::Io)?;

        let fingerprint = rule_fingerprint(&task.rule);
        write_packet(
            &mut stream,
            &PreloadRequest::Handshake {
                rule: task.rule.name.to_string(),
                fingerprint: fingerprint.clone(),
            },
        )?;

        let answer: PreloadResponse = match read_packet(&mut stream) {
            Ok(answer) => answer,
            Err(SparvError::Io(e))
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
            {
                // No answer in time: the single-request server is busy.
                return Ok(if force {
                    Attempt::RetryBusy
                } else {
                    Attempt::Fallback
                });
            }
            Err(other) => return Err(other),
        };

        match answer {
            PreloadResponse::Handshake { ok: true, .. } => {}
            PreloadResponse::Handshake {
                ok: false,
                fingerprint: server_fingerprint,
            } => {
                if force {
                    return Err(SparvError::Preloader(format!(
                        "fingerprint mismatch for '{}' (server has {server_fingerprint}, task needs {fingerprint})",
                        task.rule.name
                    )));
                }
                debug!(
                    rule = %task.rule.name,
                    "preloader fingerprint mismatch, falling back"
                );
                return Ok(Attempt::Fallback);
            }
            other => {
                return Err(SparvError::Preloader(format!(
                    "unexpected handshake answer: {other:?}"
                )));
            }
        }

        // Execution may take long; drop the handshake timeout.
        stream.set_read_timeout(None).map_err(SparvError::Io)?;
        write_packet(
            &mut stream,
            &PreloadRequest::Execute {
                rule: task.rule.name.to_string(),
                file: task.file().map(str::to_owned),
            },
        )?;

        loop {
            match read_packet::<PreloadResponse>(&mut stream)? {
                PreloadResponse::Log { level, message } => match level.as_str() {
                    "warn" => warn!(target: "preloader", "{message}"),
                    "info" => info!(target: "preloader", "{message}"),
                    _ => debug!(target: "preloader", "{message}"),
                },
                PreloadResponse::Done { ok: true, .. } => {
                    return Ok(Attempt::Done(Ok(())));
                }
                PreloadResponse::Done { ok: false, message } => {
                    return Ok(Attempt::Done(Err(SparvError::task(
                        task.rule.name.as_str(),
                        task.file(),
                        message.unwrap_or_else(|| "preloaded execution failed".to_owned()),
                    ))));
                }
                other => {
                    return Err(SparvError::Preloader(format!(
                        "unexpected packet during execution: {other:?}"
                    )));
                }
            }
        }
    }
}

enum Attempt {
    Done(Result<()>),
    Fallback,
    RetryBusy,
}

fn is_busy(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::WouldBlock
    )
}
