pub mod migrate;
pub mod output;
pub mod validate;

use anyhow::Result;

use crate::translate::stage::SUPPORTED_STAGES;

pub fn list_stages() -> Result<()> {
    println!("\nSupported pipeline stages");
    println!("{}", "=".repeat(40));

    for (kind, block) in SUPPORTED_STAGES {
        println!("  • {:<16} -> {}", kind, block);
    }

    println!("\nOther stage kinds are reported as unsupported; --best-effort skips them with a warning.");
    println!();
    Ok(())
}
