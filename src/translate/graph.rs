//! Component graph builder.
//!
//! Assembles the top-level components of one migration and wires them
//! together by reference. Log entries flow
//! `source -> loki.process -> loki.relabel -> loki.write`; the optional hops
//! are emitted only when the job has stages or rules. Journal jobs apply
//! their rules at the source through `relabel_rules`, since the
//! `__journal_*` labels are gone once an entry leaves the source.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::core::error::{MigrateError, MigrateResult};
use crate::core::registry::IdentifierRegistry;
use crate::core::strategy::{TranslationMode, Warnings};
use crate::source::{Client, JournalConfig, PromtailConfig, ScrapeJob, StaticTarget};
use crate::translate::block::{ComponentKind, Export, Reference, TargetBlock, Value};
use crate::translate::relabel::translate_rules;
use crate::translate::stage::StageTranslator;

const CLIENT_NAMESPACE: &str = "client";
const JOB_NAMESPACE: &str = "job";

/// Ordered set of top-level components.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentGraph {
    pub blocks: Vec<TargetBlock>,
}

impl ComponentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: TargetBlock) {
        self.blocks.push(block);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn find(&self, kind: ComponentKind, label: &str) -> Option<&TargetBlock> {
        self.blocks
            .iter()
            .find(|b| b.component_kind() == Some(kind) && b.label.as_deref() == Some(label))
    }

    /// Check that every component is declared once and every reference
    /// names an existing component and one of its exports.
    pub fn validate(&self) -> MigrateResult<()> {
        let mut declared = HashSet::new();

        for block in &self.blocks {
            let (Some(kind), Some(label)) = (block.component_kind(), block.label.as_deref()) else {
                return Err(MigrateError::render(format!(
                    "top-level block '{}' is not a labelled component",
                    block.kind.name()
                )));
            };

            if !declared.insert((kind, label)) {
                return Err(MigrateError::DuplicateIdentifier {
                    namespace: kind.as_str().to_string(),
                    identifier: label.to_string(),
                });
            }
        }

        for block in &self.blocks {
            for reference in block.references() {
                let resolved = declared.contains(&(reference.component, reference.label.as_str()))
                    && reference.component.exports().contains(&reference.export);

                if !resolved {
                    return Err(MigrateError::DanglingReference {
                        from: block.identifier().unwrap_or_else(|| block.kind.name()),
                        reference: reference.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Builds the component graph of a Promtail configuration.
pub struct ComponentGraphBuilder {
    mode: TranslationMode,
    stages: StageTranslator,
}

impl Default for ComponentGraphBuilder {
    fn default() -> Self {
        Self::new(TranslationMode::default())
    }
}

impl ComponentGraphBuilder {
    pub fn new(mode: TranslationMode) -> Self {
        Self {
            mode,
            stages: StageTranslator::new(mode),
        }
    }

    pub fn build(
        &self,
        config: &PromtailConfig,
        registry: &mut IdentifierRegistry,
        warnings: &mut Warnings,
    ) -> MigrateResult<ComponentGraph> {
        info!(
            "Building component graph: {} client(s), {} job(s)",
            config.clients.len(),
            config.scrape_configs.len()
        );

        for section in &config.ignored_sections {
            warnings.push(format!(
                "section '{}' has no equivalent and was not migrated",
                section
            ));
        }

        let mut graph = ComponentGraph::new();
        let mut writers = Vec::with_capacity(config.clients.len());

        for (idx, client) in config.clients.iter().enumerate() {
            let raw = if idx == 0 {
                "default".to_string()
            } else {
                format!("client_{}", idx)
            };
            let label = registry.claim(CLIENT_NAMESPACE, &raw)?;
            graph.push(client_block(client, &label, warnings));
            writers.push(Reference::receiver(ComponentKind::Connection, label));
        }

        for job in &config.scrape_configs {
            self.build_job(job, &writers, registry, &mut graph, warnings)?;
        }

        graph.validate()?;
        debug!(
            "Component graph has {} components, jobs: {:?}",
            graph.len(),
            registry.list(JOB_NAMESPACE)
        );
        Ok(graph)
    }

    fn build_job(
        &self,
        job: &ScrapeJob,
        writers: &[Reference],
        registry: &mut IdentifierRegistry,
        graph: &mut ComponentGraph,
        warnings: &mut Warnings,
    ) -> MigrateResult<()> {
        let label = registry.claim(JOB_NAMESPACE, &job.job_name)?;
        let context = format!("job '{}'", job.job_name);

        for key in &job.unsupported {
            self.mode
                .tolerate(MigrateError::unsupported_feature(&context, key), warnings)?;
        }

        if job.static_configs.is_empty() && job.journal.is_none() {
            // Only reachable in best-effort mode once the unsupported keys
            // were tolerated.
            if !job.unsupported.is_empty() {
                warnings.push(format!("{} skipped: no migratable targets", context));
                return Ok(());
            }
            return Err(MigrateError::malformed(
                context,
                "job needs static_configs or journal",
            ));
        }

        if job.journal.is_some() && !job.static_configs.is_empty() {
            // Promtail reads the journal and ignores the static targets.
            self.mode.tolerate(
                MigrateError::unsupported_feature(&context, "static_configs alongside journal"),
                warnings,
            )?;
        }

        debug!("Translating {} as '{}'", context, label);

        let stage_blocks = self.stages.translate(&job.pipeline_stages, &label, warnings)?;
        let rule_blocks = translate_rules(&job.relabel_configs, &label)?;
        let journal = job.journal.as_ref();

        // Walk the chain backwards from the writers.
        let mut forward_to = writers.to_vec();
        let mut relabel = None;

        if !rule_blocks.is_empty() {
            let downstream = if journal.is_some() {
                Vec::new()
            } else {
                std::mem::replace(
                    &mut forward_to,
                    vec![Reference::receiver(ComponentKind::Relabel, label.clone())],
                )
            };
            relabel = Some(
                TargetBlock::component(ComponentKind::Relabel, label.clone())
                    .attr("forward_to", Value::refs(downstream))
                    .blocks(rule_blocks),
            );
        }

        let process = if stage_blocks.is_empty() {
            None
        } else {
            let downstream = std::mem::replace(
                &mut forward_to,
                vec![Reference::receiver(ComponentKind::Process, label.clone())],
            );
            Some(
                TargetBlock::component(ComponentKind::Process, label.clone())
                    .attr("forward_to", Value::refs(downstream))
                    .blocks(stage_blocks),
            )
        };

        match journal {
            Some(journal) => {
                let rules = relabel
                    .as_ref()
                    .map(|_| Reference::new(ComponentKind::Relabel, label.clone(), Export::Rules));
                graph.push(journal_block(journal, &label, rules, forward_to));
            }
            None => {
                graph.push(file_match_block(&job.static_configs, &label));
                graph.push(
                    TargetBlock::component(ComponentKind::FileSource, label.clone())
                        .attr(
                            "targets",
                            Reference::new(ComponentKind::FileMatch, label.clone(), Export::Targets),
                        )
                        .attr("forward_to", Value::refs(forward_to)),
                );
            }
        }

        graph.blocks.extend(process);
        graph.blocks.extend(relabel);
        Ok(())
    }
}

fn client_block(client: &Client, label: &str, warnings: &mut Warnings) -> TargetBlock {
    let mut endpoint = TargetBlock::section("endpoint")
        .attr("url", &client.url)
        .opt_attr("tenant_id", client.tenant_id.as_ref())
        .opt_attr("batch_wait", client.batchwait.as_ref())
        .opt_attr("remote_timeout", client.timeout.as_ref())
        .opt_attr("bearer_token_file", client.bearer_token_file.as_ref());

    if client.bearer_token.is_some() {
        warnings.push(format!(
            "client '{}': bearer_token was not copied, configure bearer_token_file instead",
            label
        ));
    }

    if let Some(auth) = &client.basic_auth {
        if auth.password.is_some() {
            warnings.push(format!(
                "client '{}': basic_auth.password was not copied, configure password_file instead",
                label
            ));
        }
        endpoint = endpoint.block(
            TargetBlock::section("basic_auth")
                .opt_attr("username", auth.username.as_ref())
                .opt_attr("password_file", auth.password_file.as_ref()),
        );
    }

    TargetBlock::component(ComponentKind::Connection, label)
        .attr("external_labels", Value::string_map(&client.external_labels))
        .block(endpoint)
}

fn file_match_block(static_configs: &[StaticTarget], label: &str) -> TargetBlock {
    let mut path_targets = Vec::new();

    for target in static_configs {
        let labels = target
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), Value::string(v)));

        if target.targets.is_empty() {
            path_targets.push(Value::Object(labels.collect()));
            continue;
        }

        for address in &target.targets {
            let entry = std::iter::once(("__address__".to_string(), Value::string(address)))
                .chain(labels.clone())
                .collect();
            path_targets.push(Value::Object(entry));
        }
    }

    TargetBlock::component(ComponentKind::FileMatch, label).attr("path_targets", Value::List(path_targets))
}

fn journal_block(
    journal: &JournalConfig,
    label: &str,
    relabel_rules: Option<Reference>,
    forward_to: Vec<Reference>,
) -> TargetBlock {
    let block = TargetBlock::component(ComponentKind::JournalSource, label)
        .opt_attr("max_age", journal.max_age.as_ref())
        .opt_attr("path", journal.path.as_ref())
        .opt_attr("format_as_json", journal.json)
        .opt_attr("matches", journal.matches.as_ref());

    let block = if journal.labels.is_empty() {
        block
    } else {
        block.attr("labels", Value::string_map(&journal.labels))
    };

    block
        .opt_attr("relabel_rules", relabel_rules)
        .attr("forward_to", Value::refs(forward_to))
}
