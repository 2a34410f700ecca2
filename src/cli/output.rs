use anyhow::{Context, Result};
use similar::TextDiff;
use std::path::Path;
use tokio::fs;
use tracing::info;

/// Unified diff from `old` to `new`; empty when the texts are equal.
pub fn unified_diff(old: &str, new: &str, name: &str) -> String {
    if old == new {
        return String::new();
    }

    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{}", name), &format!("b/{}", name))
        .to_string()
}

/// Emit generated text.
///
/// With an output path the text replaces the file's content; otherwise it
/// goes to stdout. With `show_diff` a unified diff against the previous
/// content (empty if none) is printed to stdout instead of the text itself.
pub async fn emit(text: &str, output: Option<&Path>, show_diff: bool) -> Result<()> {
    let previous = match output {
        Some(path) if show_diff => fs::read_to_string(path).await.unwrap_or_default(),
        _ => String::new(),
    };

    match output {
        Some(path) => {
            write_file(path, text).await?;
            info!("Configuration written to {}", path.display());
        }
        None if !show_diff => print!("{}", text),
        None => {}
    }

    if show_diff {
        let name = output
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "config.alloy".to_string());
        let diff = unified_diff(&previous, text, &name);
        if diff.is_empty() {
            println!("No changes");
        } else {
            print!("{}", diff);
        }
    }

    Ok(())
}

/// Write a file, creating missing parent directories.
pub async fn write_file(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    fs::write(path, text)
        .await
        .with_context(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_unified_diff() {
        let diff = unified_diff("a\nb\n", "a\nc\n", "out.alloy");
        assert_eq!(
            diff,
            "--- a/out.alloy\n+++ b/out.alloy\n@@ -1,2 +1,2 @@\n a\n-b\n+c\n"
        );
        assert!(unified_diff("same\n", "same\n", "x").is_empty());
    }

    #[tokio::test]
    async fn test_emit_writes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.alloy");

        emit("a { }\n", Some(&path), false).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a { }\n");

        emit("b { }\n", Some(&path), true).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "b { }\n");
    }
}
