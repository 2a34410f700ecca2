//! Stage translator: Promtail pipeline stages to `stage.*` blocks.
//!
//! Translation is a pure function of the stage list. Order is preserved one
//! to one; a `match` stage recurses into its nested list and carries the
//! translated children as nested blocks.

use indexmap::IndexMap;

use crate::core::error::{MigrateError, MigrateResult};
use crate::core::strategy::{TranslationMode, Warnings};
use crate::source::stage::{
    DropStage, FieldSource, JsonStage, LogfmtStage, MatchStage, MetricDef, MetricKind,
    MultilineStage, ReplaceStage, Stage, StageKind, TenantStage, TimestampStage,
};
use crate::translate::block::{TargetBlock, Value};

/// Stage kinds with a translation, and the block each one becomes.
pub const SUPPORTED_STAGES: &[(&str, &str)] = &[
    ("regex", "stage.regex"),
    ("json", "stage.json"),
    ("labels", "stage.labels"),
    ("template", "stage.template"),
    ("metrics", "stage.metrics"),
    ("output", "stage.output"),
    ("match", "stage.match"),
    ("timestamp", "stage.timestamp"),
    ("drop", "stage.drop"),
    ("static_labels", "stage.static_labels"),
    ("labeldrop", "stage.label_drop"),
    ("labelallow", "stage.label_keep"),
    ("replace", "stage.replace"),
    ("tenant", "stage.tenant"),
    ("logfmt", "stage.logfmt"),
    ("multiline", "stage.multiline"),
    ("docker", "stage.docker"),
    ("cri", "stage.cri"),
];

pub struct StageTranslator {
    mode: TranslationMode,
}

impl Default for StageTranslator {
    fn default() -> Self {
        Self::new(TranslationMode::default())
    }
}

impl StageTranslator {
    pub fn new(mode: TranslationMode) -> Self {
        Self { mode }
    }

    /// Translate an ordered stage list for the job identified by `job`.
    pub fn translate(
        &self,
        stages: &[Stage],
        job: &str,
        warnings: &mut Warnings,
    ) -> MigrateResult<Vec<TargetBlock>> {
        let mut blocks = Vec::with_capacity(stages.len());

        for stage in stages {
            match self.translate_stage(stage, job, warnings) {
                Ok(block) => blocks.push(block),
                Err(e) => self.mode.tolerate(e, warnings)?,
            }
        }

        Ok(blocks)
    }

    fn translate_stage(
        &self,
        stage: &Stage,
        job: &str,
        warnings: &mut Warnings,
    ) -> MigrateResult<TargetBlock> {
        let block = match &stage.kind {
            StageKind::Regex(regex) => TargetBlock::stage("regex")
                .attr("expression", &regex.expression)
                .opt_attr("source", regex.source.as_ref()),
            StageKind::Json(json) => json_block(json),
            StageKind::Labels(labels) => {
                TargetBlock::stage("labels").attr("values", field_map(&labels.values))
            }
            StageKind::Template(template) => TargetBlock::stage("template")
                .attr("source", &template.source)
                .attr("template", &template.template),
            StageKind::Metrics(metrics) => {
                let mut block = TargetBlock::stage("metrics");
                for metric in &metrics.metrics {
                    block = block.block(metric_block(metric)?);
                }
                block
            }
            StageKind::Output(output) => TargetBlock::stage("output").attr("source", &output.source),
            StageKind::Match(m) => self.match_block(m, job, warnings)?,
            StageKind::Timestamp(ts) => timestamp_block(ts),
            StageKind::Drop(drop) => drop_block(drop),
            StageKind::StaticLabels(values) => {
                TargetBlock::stage("static_labels").attr("values", Value::string_map(values))
            }
            StageKind::LabelDrop(names) => {
                TargetBlock::stage("label_drop").attr("values", Value::string_list(names))
            }
            StageKind::LabelAllow(names) => {
                TargetBlock::stage("label_keep").attr("values", Value::string_list(names))
            }
            StageKind::Replace(replace) => replace_block(replace),
            StageKind::Tenant(tenant) => tenant_block(tenant, job, stage.ordinal)?,
            StageKind::Logfmt(logfmt) => logfmt_block(logfmt),
            StageKind::Multiline(multiline) => multiline_block(multiline),
            StageKind::Docker => TargetBlock::stage("docker"),
            StageKind::Cri => TargetBlock::stage("cri"),
            StageKind::Unsupported { kind } => {
                return Err(MigrateError::UnsupportedStage {
                    job: job.to_string(),
                    kind: kind.clone(),
                    ordinal: stage.ordinal,
                })
            }
        };

        Ok(block)
    }

    fn match_block(
        &self,
        m: &MatchStage,
        job: &str,
        warnings: &mut Warnings,
    ) -> MigrateResult<TargetBlock> {
        let children = self.translate(&m.stages, job, warnings)?;

        Ok(TargetBlock::stage("match")
            .attr("selector", &m.selector)
            .opt_attr("pipeline_name", m.pipeline_name.as_ref())
            .attr("action", m.action.as_str())
            .opt_attr("drop_counter_reason", m.drop_counter_reason.as_ref())
            .blocks(children))
    }
}

/// Render a target-name → source-field map with same-name entries spelled out.
fn field_map(values: &IndexMap<String, FieldSource>) -> Value {
    Value::Object(
        values
            .iter()
            .map(|(target, source)| (target.clone(), Value::string(source.resolve(target))))
            .collect(),
    )
}

fn json_block(json: &JsonStage) -> TargetBlock {
    TargetBlock::stage("json")
        .attr("expressions", field_map(&json.expressions))
        .opt_attr("source", json.source.as_ref())
        .opt_attr("drop_malformed", json.drop_malformed)
}

fn metric_block(metric: &MetricDef) -> MigrateResult<TargetBlock> {
    let entity = format!("metric '{}'", metric.name);
    let section = match metric.kind {
        MetricKind::Counter => "metric.counter",
        MetricKind::Gauge => "metric.gauge",
        MetricKind::Histogram => "metric.histogram",
    };

    let mut block = TargetBlock::section(section)
        .attr("name", &metric.name)
        .opt_attr("description", metric.description.as_ref())
        .opt_attr("prefix", metric.prefix.as_ref())
        .opt_attr("source", metric.source.as_ref())
        .opt_attr("max_idle_duration", metric.max_idle_duration.as_ref());

    let matcher = &metric.matcher;
    let match_all = matcher.match_all.unwrap_or(false);
    if match_all && matcher.value.is_some() {
        return Err(MigrateError::malformed(
            entity,
            "match_all and value are mutually exclusive",
        ));
    }

    match metric.kind {
        MetricKind::Histogram => {
            let buckets = metric
                .buckets
                .as_ref()
                .ok_or_else(|| MigrateError::missing_field("buckets", entity.as_str()))?;
            block = block
                .opt_attr("value", matcher.value.as_ref())
                .attr(
                    "buckets",
                    Value::List(buckets.iter().map(|b| Value::Float(*b)).collect()),
                );
        }
        MetricKind::Counter | MetricKind::Gauge => {
            if metric.buckets.is_some() {
                return Err(MigrateError::malformed(
                    entity,
                    format!("buckets are only valid for histograms, not {}", metric.kind),
                ));
            }
            let action = matcher
                .action
                .ok_or_else(|| MigrateError::missing_field("action", entity.as_str()))?;

            if metric.kind == MetricKind::Gauge
                && (matcher.match_all.is_some() || matcher.count_entry_bytes.is_some())
            {
                return Err(MigrateError::malformed(
                    entity,
                    "match_all and count_entry_bytes are only valid for counters",
                ));
            }

            if match_all {
                block = block.attr("match_all", true);
            } else {
                block = block.opt_attr("value", matcher.value.as_ref());
            }
            block = block
                .opt_attr("count_entry_bytes", matcher.count_entry_bytes)
                .attr("action", action.as_str());
        }
    }

    Ok(block)
}

fn timestamp_block(ts: &TimestampStage) -> TargetBlock {
    let block = TargetBlock::stage("timestamp")
        .attr("source", &ts.source)
        .attr("format", &ts.format);
    let block = if ts.fallback_formats.is_empty() {
        block
    } else {
        block.attr("fallback_formats", Value::string_list(&ts.fallback_formats))
    };
    block
        .opt_attr("location", ts.location.as_ref())
        .opt_attr("action_on_failure", ts.action_on_failure.as_ref())
}

fn drop_block(drop: &DropStage) -> TargetBlock {
    TargetBlock::stage("drop")
        .opt_attr("source", drop.source.as_ref())
        .opt_attr("separator", drop.separator.as_ref())
        .opt_attr("expression", drop.expression.as_ref())
        .opt_attr("value", drop.value.as_ref())
        .opt_attr("older_than", drop.older_than.as_ref())
        .opt_attr("longer_than", drop.longer_than.as_ref())
        .opt_attr("drop_counter_reason", drop.drop_counter_reason.as_ref())
}

fn replace_block(replace: &ReplaceStage) -> TargetBlock {
    TargetBlock::stage("replace")
        .attr("expression", &replace.expression)
        .opt_attr("source", replace.source.as_ref())
        .opt_attr("replace", replace.replace.as_ref())
}

fn tenant_block(tenant: &TenantStage, job: &str, ordinal: usize) -> MigrateResult<TargetBlock> {
    let set = [&tenant.label, &tenant.source, &tenant.value]
        .iter()
        .filter(|v| v.is_some())
        .count();
    if set != 1 {
        return Err(MigrateError::malformed(
            format!("job '{}' stage {} (tenant)", job, ordinal),
            "exactly one of label, source or value must be set",
        ));
    }

    Ok(TargetBlock::stage("tenant")
        .opt_attr("label", tenant.label.as_ref())
        .opt_attr("source", tenant.source.as_ref())
        .opt_attr("value", tenant.value.as_ref()))
}

fn logfmt_block(logfmt: &LogfmtStage) -> TargetBlock {
    TargetBlock::stage("logfmt")
        .attr("mapping", field_map(&logfmt.mapping))
        .opt_attr("source", logfmt.source.as_ref())
}

fn multiline_block(multiline: &MultilineStage) -> TargetBlock {
    TargetBlock::stage("multiline")
        .attr("firstline", &multiline.firstline)
        .opt_attr("max_wait_time", multiline.max_wait_time.as_ref())
        .opt_attr("max_lines", multiline.max_lines)
}
