//! External validator adapter.
//!
//! Runs `<binary> <args...> <file>` (by default `alloy validate <file>`)
//! under a timeout. Exit status 0 means the file is valid; otherwise the
//! tool's diagnostics are returned verbatim. A missing binary is not an
//! error for the caller: validation is reported as skipped.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::config::ValidatorSettings;
use crate::core::error::{MigrateError, MigrateResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    /// Diagnostics printed by the validator
    Invalid(String),
    /// Validation could not run; the reason is included
    Skipped(String),
}

pub struct ExternalValidator {
    binary: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ExternalValidator {
    pub fn new<S: Into<String>>(binary: S, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            args,
            timeout,
        }
    }

    pub fn from_settings(settings: &ValidatorSettings) -> Self {
        Self::new(
            settings.binary.clone(),
            settings.args.clone(),
            Duration::from_secs(settings.timeout_seconds),
        )
    }

    pub async fn validate_file(&self, path: &Path) -> MigrateResult<ValidationOutcome> {
        match self.run(path).await {
            Err(MigrateError::ValidatorUnavailable(reason)) => {
                warn!("Validation skipped: {}", reason);
                Ok(ValidationOutcome::Skipped(reason))
            }
            other => other,
        }
    }

    /// Validate configuration text through a temporary file.
    pub async fn validate_text(&self, text: &str) -> MigrateResult<ValidationOutcome> {
        let path = tempfile::Builder::new()
            .prefix("alloy-migrator-")
            .suffix(".alloy")
            .tempfile()?
            .into_temp_path();
        tokio::fs::write(&path, text).await?;

        self.validate_file(&path).await
    }

    async fn run(&self, path: &Path) -> MigrateResult<ValidationOutcome> {
        debug!("Running {} {:?} {}", self.binary, self.args, path.display());

        let child = Command::new(&self.binary)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => MigrateError::ValidatorUnavailable(format!(
                    "'{}' was not found on the search path",
                    self.binary
                )),
                _ => MigrateError::ValidatorUnavailable(format!(
                    "cannot start '{}': {}",
                    self.binary, e
                )),
            })?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(MigrateError::validation(format!(
                    "'{}' timed out after {} seconds",
                    self.binary,
                    self.timeout.as_secs_f64()
                )))
            }
        };

        if output.status.success() {
            info!("{} is valid", path.display());
            return Ok(ValidationOutcome::Valid);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let diagnostics = if stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr
        };
        Ok(ValidationOutcome::Invalid(diagnostics))
    }
}
