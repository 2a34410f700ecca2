use thiserror::Error;

use crate::render::syntax::SyntaxError;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Malformed source at '{path}': {reason}")]
    MalformedSource { path: String, reason: String },

    #[error("Unsupported stage '{kind}' at ordinal {ordinal} in job '{job}'")]
    UnsupportedStage {
        job: String,
        kind: String,
        ordinal: usize,
    },

    #[error("Unsupported feature in {context}: {feature}")]
    UnsupportedFeature { context: String, feature: String },

    #[error("Missing required field '{field}' in {entity}")]
    MissingRequiredField { field: String, entity: String },

    #[error("Duplicate {namespace} identifier '{identifier}'")]
    DuplicateIdentifier {
        namespace: String,
        identifier: String,
    },

    #[error("Block '{from}' references unknown '{reference}'")]
    DanglingReference { from: String, reference: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Generated text failed the syntax check: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("Validator unavailable: {0}")]
    ValidatorUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl MigrateError {
    pub fn malformed<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        Self::MalformedSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_feature<C: Into<String>, F: Into<String>>(context: C, feature: F) -> Self {
        Self::UnsupportedFeature {
            context: context.into(),
            feature: feature.into(),
        }
    }

    pub fn missing_field<F: Into<String>, E: Into<String>>(field: F, entity: E) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            entity: entity.into(),
        }
    }

    pub fn render<S: Into<String>>(msg: S) -> Self {
        Self::Render(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn settings<S: Into<String>>(msg: S) -> Self {
        Self::Settings(msg.into())
    }

    /// Whether best-effort mode may turn this error into a warning.
    pub fn is_downgradable(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedStage { .. } | Self::UnsupportedFeature { .. }
        )
    }
}

pub type MigrateResult<T> = Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MigrateError::UnsupportedStage {
            job: "system".to_string(),
            kind: "unknown_kind".to_string(),
            ordinal: 2,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported stage 'unknown_kind' at ordinal 2 in job 'system'"
        );

        let err = MigrateError::missing_field("buckets", "metric 'latency'");
        assert_eq!(
            err.to_string(),
            "Missing required field 'buckets' in metric 'latency'"
        );
    }

    #[test]
    fn test_downgradable() {
        assert!(MigrateError::unsupported_feature("job 'k8s'", "kubernetes_sd_configs")
            .is_downgradable());
        assert!(!MigrateError::malformed("clients", "missing").is_downgradable());
        assert!(!MigrateError::DuplicateIdentifier {
            namespace: "job".to_string(),
            identifier: "a_b".to_string(),
        }
        .is_downgradable());
    }
}
