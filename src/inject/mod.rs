//! Injector — run one child process with granted secrets in its
//! environment, streaming its output through the redactor.
//!
//! The child never sees anything the grant does not cover: the
//! explicit env var is the grant's first secret, and every `2k://`
//! placeholder in the constructed environment must resolve to a uuid
//! inside the grant. Both pipes are measured in raw (pre-redaction)
//! bytes against a hard cap, and a single timer covers the whole run.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::errors::{BrokerError, Result};
use crate::grant::{Grant, GrantManager};
use crate::redact::StreamRedactor;
use crate::store::SecretStore;

/// Hard cap on raw child output per pipe.
pub const MAX_BUFFER_BYTES: u64 = 10 * 1024 * 1024;

/// Whole-run time budget when the caller does not pick one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Full-value env placeholder scheme.
const PLACEHOLDER_SCHEME: &str = "2k://";

/// Cadence of the child wait/kill poll loop.
const WAIT_POLL: Duration = Duration::from_millis(25);

/// Caller knobs for a single injection.
#[derive(Debug, Clone, Default)]
pub struct InjectionOptions {
    /// Env var to receive the grant's first secret, if any.
    pub env_var_name: Option<String>,
    /// Whole-run budget in milliseconds; defaults to `DEFAULT_TIMEOUT_MS`.
    pub timeout_ms: Option<u64>,
}

/// What came back from the child, post-redaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionResult {
    /// `None` when the child was killed by a signal; callers map that
    /// to a non-zero status.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub struct Injector {
    store: Arc<SecretStore>,
    grants: Arc<GrantManager>,
}

impl Injector {
    pub fn new(store: Arc<SecretStore>, grants: Arc<GrantManager>) -> Self {
        Self { store, grants }
    }

    /// Validate the grant, spawn the command with secrets injected,
    /// and return its redacted output.
    ///
    /// Whatever happens after preflight, the grant is consumed: a
    /// best-effort `mark_used` runs on every exit path and its failure
    /// never masks the primary outcome.
    pub fn inject(
        &self,
        grant_id: &str,
        command: &[String],
        options: &InjectionOptions,
    ) -> Result<InjectionResult> {
        // Preflight — no process is spawned on any of these failures.
        if command.is_empty() {
            return Err(BrokerError::EmptyCommand);
        }
        if !self.grants.validate_grant(grant_id) {
            return Err(BrokerError::GrantNotValid(grant_id.to_string()));
        }
        let grant = self
            .grants
            .get_grant(grant_id)
            .ok_or_else(|| BrokerError::GrantNotFound(grant_id.to_string()))?;

        let outcome = self.run_child(&grant, command, options);

        if let Err(e) = self.grants.mark_used(grant_id) {
            debug!(grant_id, error = %e, "mark_used failed in exit guard (ignored)");
        }

        outcome
    }

    fn run_child(
        &self,
        grant: &Grant,
        command: &[String],
        options: &InjectionOptions,
    ) -> Result<InjectionResult> {
        let env = self.build_environment(grant, options.env_var_name.as_deref())?;

        // Values of every granted secret feed the redactors; secrets
        // that no longer resolve are skipped silently.
        let secret_values: Zeroizing<Vec<String>> = Zeroizing::new(
            grant
                .secret_uuids
                .iter()
                .filter_map(|uuid| self.store.get_value(uuid).ok())
                .collect(),
        );
        let stdout_redactor = StreamRedactor::new(&secret_values)?;
        let stderr_redactor = StreamRedactor::new(&secret_values)?;

        let timeout_ms = options.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        let mut child = Command::new(&command[0])
            .args(&command[1..])
            .env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BrokerError::SpawnFailure(e.to_string()))?;

        let overflow = Arc::new(AtomicBool::new(false));
        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| BrokerError::SpawnFailure("stdout pipe missing".into()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| BrokerError::SpawnFailure("stderr pipe missing".into()))?;
        let stdout_pump = pump(stdout_pipe, stdout_redactor, overflow.clone());
        let stderr_pump = pump(stderr_pipe, stderr_redactor, overflow.clone());

        let mut failure: Option<BrokerError> = None;
        let status = loop {
            if failure.is_none() && overflow.load(Ordering::SeqCst) {
                warn!(grant_id = %grant.id, "output buffer cap exceeded, killing child");
                let _ = child.kill();
                failure = Some(BrokerError::BufferExceeded {
                    limit: MAX_BUFFER_BYTES,
                });
            }

            match child.try_wait()? {
                Some(status) => break status,
                None => {
                    if failure.is_none() && Instant::now() >= deadline {
                        warn!(grant_id = %grant.id, timeout_ms, "time budget elapsed, killing child");
                        let _ = child.kill();
                        failure = Some(BrokerError::Timeout(timeout_ms));
                    }
                    std::thread::sleep(WAIT_POLL);
                }
            }
        };

        // Child is gone; the pumps drain to EOF and flush their
        // redactors before handing the buffers back.
        let (stdout_bytes, stdout_overflow) = stdout_pump
            .join()
            .map_err(|_| BrokerError::CommandFailed("stdout reader panicked".into()))?;
        let (stderr_bytes, stderr_overflow) = stderr_pump
            .join()
            .map_err(|_| BrokerError::CommandFailed("stderr reader panicked".into()))?;

        if failure.is_none() && (stdout_overflow || stderr_overflow) {
            failure = Some(BrokerError::BufferExceeded {
                limit: MAX_BUFFER_BYTES,
            });
        }
        if let Some(err) = failure {
            return Err(err);
        }

        Ok(InjectionResult {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        })
    }

    /// Copy the parent environment, apply the explicit injection, then
    /// substitute full-value `2k://` placeholders.
    ///
    /// A placeholder resolving outside the grant aborts before any
    /// process is spawned.
    fn build_environment(
        &self,
        grant: &Grant,
        env_var_name: Option<&str>,
    ) -> Result<HashMap<OsString, OsString>> {
        let mut env: HashMap<OsString, OsString> = std::env::vars_os().collect();

        if let Some(name) = env_var_name {
            let first = grant
                .secret_uuids
                .first()
                .ok_or_else(|| BrokerError::GrantNotValid(grant.id.clone()))?;
            let value = self.store.get_value(first)?;
            env.insert(OsString::from(name), OsString::from(value));
        }

        let placeholders: Vec<(OsString, String)> = env
            .iter()
            .filter_map(|(key, value)| {
                let value = value.to_str()?;
                let rest = value.strip_prefix(PLACEHOLDER_SCHEME)?;
                if rest.is_empty() {
                    None
                } else {
                    Some((key.clone(), rest.to_string()))
                }
            })
            .collect();

        for (key, reference) in placeholders {
            let resolved = self.store.resolve_ref(&reference)?;
            if !grant.secret_uuids.contains(&resolved.uuid) {
                return Err(BrokerError::PlaceholderOutOfScope {
                    env_var: key.to_string_lossy().into_owned(),
                    placeholder: format!("{PLACEHOLDER_SCHEME}{reference}"),
                    uuid: resolved.uuid,
                });
            }
            env.insert(key, OsString::from(resolved.value));
        }

        Ok(env)
    }
}

/// Drain one pipe through a redactor on its own thread.
///
/// Counts raw bytes and bails (flagging `overflow`) the moment the cap
/// is crossed; the main loop kills the child, which closes the pipe.
fn pump<R: Read + Send + 'static>(
    mut pipe: R,
    mut redactor: StreamRedactor,
    overflow: Arc<AtomicBool>,
) -> std::thread::JoinHandle<(Vec<u8>, bool)> {
    std::thread::spawn(move || {
        let mut out = Vec::new();
        let mut raw_bytes: u64 = 0;
        let mut buf = [0u8; 8192];

        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    raw_bytes += n as u64;
                    if raw_bytes > MAX_BUFFER_BYTES {
                        overflow.store(true, Ordering::SeqCst);
                        return (out, true);
                    }
                    redactor.write_chunk(&buf[..n], &mut out);
                }
                Err(_) => break,
            }
        }

        redactor.finish(&mut out);
        (out, false)
    })
}
