use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{MigrateError, MigrateResult};

/// How a translation reacts to constructs that have no target equivalent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
    /// Abort the translation on the first unsupported stage or feature
    #[default]
    Strict,
    /// Skip unsupported stages/features, recording a warning for each
    BestEffort,
}

impl TranslationMode {
    /// Apply the mode to an error raised during translation.
    ///
    /// Returns `Ok(())` when the error was downgraded to a warning and the
    /// offending construct should be skipped.
    pub fn tolerate(&self, err: MigrateError, warnings: &mut Warnings) -> MigrateResult<()> {
        match self {
            TranslationMode::BestEffort if err.is_downgradable() => {
                warnings.push(format!("skipped: {}", err));
                Ok(())
            }
            _ => Err(err),
        }
    }
}

/// Warnings collected over one translation run.
///
/// Every warning is also emitted through `tracing` as it is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warnings {
    messages: Vec<String>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<S: Into<String>>(&mut self, message: S) {
        let message = message.into();
        warn!("{}", message);
        self.messages.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.messages
    }
}
