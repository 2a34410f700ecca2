//! Translation entry points.
//!
//! Each call runs one isolated translation: it owns a fresh
//! [`IdentifierRegistry`] and warnings sink, so migrators can be shared
//! across threads and invoked concurrently.

pub mod block;
pub mod exporter;
pub mod graph;
pub mod relabel;
pub mod stage;

use tracing::info;

use crate::core::error::MigrateResult;
use crate::core::registry::IdentifierRegistry;
use crate::core::strategy::{TranslationMode, Warnings};
use crate::render::render_checked;
use crate::source::PromtailConfig;
use exporter::{build_exporter_graph, extract_exec_start, ExporterFlags};
use graph::{ComponentGraph, ComponentGraphBuilder};

/// Result of a successful translation.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Rendered configuration text
    pub text: String,
    pub graph: ComponentGraph,
    pub warnings: Vec<String>,
}

#[derive(Default)]
pub struct PromtailMigrator {
    builder: ComponentGraphBuilder,
}

impl PromtailMigrator {
    pub fn new(mode: TranslationMode) -> Self {
        Self {
            builder: ComponentGraphBuilder::new(mode),
        }
    }

    pub fn migrate(&self, config: &PromtailConfig) -> MigrateResult<Migration> {
        let mut registry = IdentifierRegistry::new();
        let mut warnings = Warnings::new();

        let graph = self.builder.build(config, &mut registry, &mut warnings)?;
        let text = render_checked(&graph)?;

        info!(
            "Translated {} job(s) into {} component(s)",
            config.scrape_configs.len(),
            graph.len()
        );
        Ok(Migration {
            text,
            graph,
            warnings: warnings.into_vec(),
        })
    }

    /// Load and translate Promtail YAML text.
    pub fn migrate_str(&self, yaml: &str) -> MigrateResult<Migration> {
        let config = PromtailConfig::from_str(yaml)?;
        self.migrate(&config)
    }
}

pub struct NodeExporterMigrator {
    remote_write_url: String,
}

impl NodeExporterMigrator {
    pub fn new<S: Into<String>>(remote_write_url: S) -> Self {
        Self {
            remote_write_url: remote_write_url.into(),
        }
    }

    /// Translate an `ExecStart=` command line.
    pub fn migrate_exec_start(&self, exec_start: &str) -> MigrateResult<Migration> {
        let mut warnings = Warnings::new();
        let flags = ExporterFlags::parse(exec_start, &mut warnings)?;
        let graph = build_exporter_graph(&flags, &self.remote_write_url)?;
        let text = render_checked(&graph)?;

        info!(
            "Translated node_exporter with {} enabled collector(s)",
            flags.enabled.len()
        );
        Ok(Migration {
            text,
            graph,
            warnings: warnings.into_vec(),
        })
    }

    /// Translate a systemd unit file running node_exporter.
    pub fn migrate_unit(&self, unit: &str) -> MigrateResult<Migration> {
        let exec_start = extract_exec_start(unit)?;
        self.migrate_exec_start(&exec_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::MigrateError;

    #[test]
    fn test_migrate_str() {
        let migration = PromtailMigrator::default()
            .migrate_str(
                r#"
clients:
  - url: http://loki:3100/loki/api/v1/push
scrape_configs:
  - job_name: varlogs
    static_configs:
      - targets: [localhost]
        labels: {__path__: /var/log/*.log}
"#,
            )
            .unwrap();

        assert!(migration.text.starts_with("loki.write \"default\" {\n"));
        assert!(migration.text.contains("loki.source.file \"varlogs\" {"));
        assert!(migration.warnings.is_empty());
    }

    #[test]
    fn test_migrations_are_independent() {
        let migrator = PromtailMigrator::default();
        let yaml = r#"
clients:
  - url: http://loki:3100/loki/api/v1/push
scrape_configs:
  - job_name: app
    static_configs: [{targets: [localhost], labels: {__path__: /a}}]
"#;

        // A second run must not see identifiers claimed by the first.
        let first = migrator.migrate_str(yaml).unwrap();
        let second = migrator.migrate_str(yaml).unwrap();
        assert_eq!(first.text, second.text);
    }

    #[test]
    fn test_node_exporter_unit() {
        let migration = NodeExporterMigrator::new("http://prom/api/v1/write")
            .migrate_unit("[Service]\nExecStart=/usr/bin/node_exporter --collector.systemd\n")
            .unwrap();

        assert!(migration
            .text
            .contains("enable_collectors = [\"systemd\"]"));
        assert!(migration
            .text
            .contains("forward_to = [prometheus.remote_write.default.receiver]"));
    }

    #[test]
    fn test_node_exporter_missing_exec_start() {
        let err = NodeExporterMigrator::new("http://x")
            .migrate_unit("[Service]\n")
            .unwrap_err();
        assert!(matches!(err, MigrateError::MalformedSource { .. }));
    }
}
