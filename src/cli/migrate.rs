use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::cli::output::{emit, write_file};
use crate::core::strategy::TranslationMode;
use crate::translate::{Migration, NodeExporterMigrator, PromtailMigrator};
use crate::validator::{ExternalValidator, ValidationOutcome};

pub struct PromtailOptions {
    pub output: Option<PathBuf>,
    pub show_diff: bool,
    pub mode: TranslationMode,
}

/// Migrate one Promtail file, or stdin when `config` is `-`.
///
/// Nothing is written unless translation (and validation, when requested)
/// succeeded.
pub async fn migrate_promtail(
    config: &str,
    options: PromtailOptions,
    validator: Option<&ExternalValidator>,
) -> Result<()> {
    let yaml = if config == "-" {
        info!("Reading Promtail configuration from stdin");
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .context("cannot read stdin")?;
        content
    } else {
        info!("Loading Promtail configuration from {}", config);
        fs::read_to_string(config)
            .await
            .with_context(|| format!("cannot read {}", config))?
    };

    let migration = PromtailMigrator::new(options.mode).migrate_str(&yaml)?;
    report_warnings(&migration);

    if let Some(validator) = validator {
        check(validator, &migration.text).await?;
    }

    emit(&migration.text, options.output.as_deref(), options.show_diff).await
}

pub async fn migrate_node_exporter(
    service_file: Option<PathBuf>,
    exec_start: Option<String>,
    output: Option<PathBuf>,
    remote_write_url: &str,
) -> Result<()> {
    let migrator = NodeExporterMigrator::new(remote_write_url);

    let migration = match (service_file, exec_start) {
        (_, Some(line)) => migrator.migrate_exec_start(&line)?,
        (Some(path), None) => {
            info!("Loading node_exporter unit from {}", path.display());
            let unit = fs::read_to_string(&path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?;
            migrator.migrate_unit(&unit)?
        }
        (None, None) => bail!("provide either --service-file or --exec-start"),
    };
    report_warnings(&migration);

    emit(&migration.text, output.as_deref(), false).await?;
    eprintln!("Note: update the prometheus.remote_write endpoint URL if it is still a placeholder");
    Ok(())
}

/// Outcome of one file in a batch run.
#[derive(Debug)]
pub struct BatchItem {
    pub input: PathBuf,
    pub result: Result<PathBuf>,
}

enum Job {
    Promtail(PathBuf),
    NodeExporter(PathBuf),
}

/// Migrate several files concurrently, one output per input.
///
/// Every file is translated in isolation; a failure is reported for that
/// file and leaves the others untouched.
pub async fn migrate_all(
    promtail: Vec<PathBuf>,
    node_service: Option<PathBuf>,
    output_dir: &Path,
    mode: TranslationMode,
    remote_write_url: &str,
) -> Result<Vec<BatchItem>> {
    let mut jobs: Vec<Job> = promtail.into_iter().map(Job::Promtail).collect();
    jobs.extend(node_service.map(Job::NodeExporter));

    if jobs.is_empty() {
        warn!("No configurations to migrate");
        return Ok(Vec::new());
    }

    fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("cannot create {}", output_dir.display()))?;

    let promtail_migrator = Arc::new(PromtailMigrator::new(mode));
    let exporter_migrator = Arc::new(NodeExporterMigrator::new(remote_write_url));
    let mut used_names = HashSet::new();
    let mut set = JoinSet::new();

    for (idx, job) in jobs.into_iter().enumerate() {
        let (input, stem) = match &job {
            Job::Promtail(path) => (path.clone(), file_stem(path)),
            Job::NodeExporter(path) => (path.clone(), "node_exporter".to_string()),
        };
        let target = output_dir.join(unique_name(&mut used_names, &stem));

        let promtail_migrator = Arc::clone(&promtail_migrator);
        let exporter_migrator = Arc::clone(&exporter_migrator);

        set.spawn(async move {
            let result = async {
                let content = fs::read_to_string(&input)
                    .await
                    .with_context(|| format!("cannot read {}", input.display()))?;

                let migration = tokio::task::spawn_blocking(move || match job {
                    Job::Promtail(_) => promtail_migrator.migrate_str(&content),
                    Job::NodeExporter(_) => exporter_migrator.migrate_unit(&content),
                })
                .await??;

                report_warnings(&migration);
                write_file(&target, &migration.text).await?;
                Ok::<_, anyhow::Error>(target)
            }
            .await;

            (idx, BatchItem { input, result })
        });
    }

    let mut items = Vec::new();
    while let Some(joined) = set.join_next().await {
        items.push(joined.context("migration task panicked")?);
    }
    items.sort_by_key(|(idx, _)| *idx);

    let items: Vec<BatchItem> = items.into_iter().map(|(_, item)| item).collect();
    for item in &items {
        match &item.result {
            Ok(target) => println!("✓ {} -> {}", item.input.display(), target.display()),
            Err(e) => {
                error!("Failed to migrate {}: {:#}", item.input.display(), e);
                println!("✗ {}: {:#}", item.input.display(), e);
            }
        }
    }

    Ok(items)
}

async fn check(validator: &ExternalValidator, text: &str) -> Result<()> {
    match validator.validate_text(text).await? {
        ValidationOutcome::Valid => {
            info!("Generated configuration passed validation");
            Ok(())
        }
        ValidationOutcome::Invalid(diagnostics) => {
            bail!("generated configuration failed validation:\n{}", diagnostics)
        }
        ValidationOutcome::Skipped(reason) => {
            eprintln!("Warning: validation skipped: {}", reason);
            Ok(())
        }
    }
}

fn report_warnings(migration: &Migration) {
    if !migration.warnings.is_empty() {
        info!(
            "{} warning(s) during migration; review the output",
            migration.warnings.len()
        );
    }
}

/// First of `<stem>.alloy`, `<stem>_1.alloy`, `<stem>_2.alloy`, ... not yet
/// in `used`.
fn unique_name(used: &mut HashSet<String>, stem: &str) -> String {
    let mut name = format!("{}.alloy", stem);
    let mut suffix = 0;
    while !used.insert(name.clone()) {
        suffix += 1;
        name = format!("{}_{}.alloy", stem, suffix);
    }
    name
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "promtail".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const GOOD: &str = r#"
clients:
  - url: http://loki:3100/loki/api/v1/push
scrape_configs:
  - job_name: system
    static_configs:
      - targets: [localhost]
        labels: {__path__: /var/log/*.log}
"#;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(Path::new("/etc/promtail/config.yml")), "config");
        assert_eq!(file_stem(Path::new("/")), "promtail");
    }

    #[test]
    fn test_unique_name_skips_taken_suffixes() {
        let mut used = HashSet::new();
        assert_eq!(unique_name(&mut used, "config_2"), "config_2.alloy");
        assert_eq!(unique_name(&mut used, "config"), "config.alloy");
        assert_eq!(unique_name(&mut used, "config"), "config_1.alloy");
        used.insert("config_2.alloy".to_string());
        assert_eq!(unique_name(&mut used, "config"), "config_3.alloy");
    }

    #[tokio::test]
    async fn test_migrate_promtail_unsupported_writes_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("promtail.yml");
        let output = dir.path().join("out.alloy");
        std::fs::write(
            &input,
            format!("{}    pipeline_stages:\n      - geoip: {{db: x}}\n", GOOD),
        )
        .unwrap();

        let result = migrate_promtail(
            input.to_str().unwrap(),
            PromtailOptions {
                output: Some(output.clone()),
                show_diff: false,
                mode: TranslationMode::Strict,
            },
            None,
        )
        .await;

        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_migrate_all_isolates_failures() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.yml");
        let bad = dir.path().join("bad.yml");
        let unit = dir.path().join("node_exporter.service");
        std::fs::write(&good, GOOD).unwrap();
        std::fs::write(&bad, "clients: []\n").unwrap();
        std::fs::write(
            &unit,
            "[Service]\nExecStart=/usr/bin/node_exporter --collector.systemd\n",
        )
        .unwrap();

        let out = dir.path().join("out");
        let items = migrate_all(
            vec![good.clone(), bad.clone()],
            Some(unit),
            &out,
            TranslationMode::Strict,
            "http://prom/api/v1/write",
        )
        .await
        .unwrap();

        assert_eq!(items.len(), 3);
        assert!(items[0].result.is_ok());
        assert!(items[1].result.is_err());
        assert!(items[2].result.is_ok());

        assert!(out.join("good.alloy").exists());
        assert!(!out.join("bad.alloy").exists());
        let exporter = std::fs::read_to_string(out.join("node_exporter.alloy")).unwrap();
        assert!(exporter.contains("prometheus.exporter.unix \"node_exporter\""));
    }

    #[tokio::test]
    async fn test_migrate_all_distinct_names() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("config.yml"), GOOD).unwrap();
        std::fs::write(b.join("config.yml"), GOOD).unwrap();

        let out = dir.path().join("out");
        let items = migrate_all(
            vec![a.join("config.yml"), b.join("config.yml")],
            None,
            &out,
            TranslationMode::Strict,
            "http://x",
        )
        .await
        .unwrap();

        assert!(items.iter().all(|i| i.result.is_ok()));
        assert!(out.join("config.alloy").exists());
        assert!(out.join("config_1.alloy").exists());
    }

    #[tokio::test]
    async fn test_migrate_all_suffix_collides_with_stem() {
        let dir = tempdir().unwrap();
        let mut inputs = Vec::new();
        for (sub, file) in [("a", "config_2.yml"), ("b", "config.yml"), ("c", "config.yml")] {
            let parent = dir.path().join(sub);
            std::fs::create_dir_all(&parent).unwrap();
            std::fs::write(parent.join(file), GOOD).unwrap();
            inputs.push(parent.join(file));
        }

        let out = dir.path().join("out");
        let items = migrate_all(inputs, None, &out, TranslationMode::Strict, "http://x")
            .await
            .unwrap();

        let targets: HashSet<PathBuf> = items
            .into_iter()
            .map(|i| i.result.unwrap())
            .collect();
        assert_eq!(targets.len(), 3);
        assert!(out.join("config_2.alloy").exists());
        assert!(out.join("config.alloy").exists());
        assert!(out.join("config_1.alloy").exists());
    }
}
