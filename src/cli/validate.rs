use anyhow::{bail, Context, Result};
use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::render::syntax;
use crate::validator::{ExternalValidator, ValidationOutcome};

/// Validate an Alloy file: first with the built-in syntax check, then with
/// the external validator when it is installed.
pub async fn validate_file(path: &Path, validator: &ExternalValidator) -> Result<()> {
    info!("Validating {}", path.display());

    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;

    if let Err(e) = syntax::parse(&text) {
        bail!("{}: {}", path.display(), e);
    }

    match validator.validate_file(path).await? {
        ValidationOutcome::Valid => {
            println!("✓ Configuration is valid");
            Ok(())
        }
        ValidationOutcome::Invalid(diagnostics) => {
            println!("✗ Configuration has errors:");
            println!("{}", diagnostics);
            bail!("validation failed for {}", path.display())
        }
        ValidationOutcome::Skipped(reason) => {
            println!("✓ Syntax is valid");
            println!("Warning: {}; install alloy to run full validation", reason);
            Ok(())
        }
    }
}
