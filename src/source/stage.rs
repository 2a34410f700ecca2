//! Typed pipeline stages.
//!
//! A Promtail stage list entry is a single-key mapping, e.g.
//! `- regex: { expression: "..." }`. The key selects the stage kind. Known
//! kinds are parsed into dedicated structs; unknown keys are kept as
//! [`StageKind::Unsupported`] so the translator can report them with their
//! position instead of the loader rejecting the whole file.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::fmt;
use std::str::FromStr;

use super::scalar;
use crate::core::error::{MigrateError, MigrateResult};

/// One pipeline stage and its position in the enclosing list.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    /// 0-based index in the enclosing stage list
    pub ordinal: usize,
    pub kind: StageKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageKind {
    Regex(RegexStage),
    Json(JsonStage),
    Labels(LabelsStage),
    Template(TemplateStage),
    Metrics(MetricsStage),
    Output(OutputStage),
    Match(MatchStage),
    Timestamp(TimestampStage),
    Drop(DropStage),
    StaticLabels(IndexMap<String, String>),
    LabelDrop(Vec<String>),
    LabelAllow(Vec<String>),
    Replace(ReplaceStage),
    Tenant(TenantStage),
    Logfmt(LogfmtStage),
    Multiline(MultilineStage),
    Docker,
    Cri,
    Unsupported { kind: String },
}

impl StageKind {
    /// Source-side name of the stage kind
    pub fn name(&self) -> &str {
        match self {
            StageKind::Regex(_) => "regex",
            StageKind::Json(_) => "json",
            StageKind::Labels(_) => "labels",
            StageKind::Template(_) => "template",
            StageKind::Metrics(_) => "metrics",
            StageKind::Output(_) => "output",
            StageKind::Match(_) => "match",
            StageKind::Timestamp(_) => "timestamp",
            StageKind::Drop(_) => "drop",
            StageKind::StaticLabels(_) => "static_labels",
            StageKind::LabelDrop(_) => "labeldrop",
            StageKind::LabelAllow(_) => "labelallow",
            StageKind::Replace(_) => "replace",
            StageKind::Tenant(_) => "tenant",
            StageKind::Logfmt(_) => "logfmt",
            StageKind::Multiline(_) => "multiline",
            StageKind::Docker => "docker",
            StageKind::Cri => "cri",
            StageKind::Unsupported { kind } => kind,
        }
    }
}

/// Where a label or extracted field takes its value from.
///
/// A null or empty source value means the target name doubles as the
/// source field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    SameName,
    Field(String),
}

impl FieldSource {
    /// Resolve to the concrete source field name for `target`.
    pub fn resolve<'a>(&'a self, target: &'a str) -> &'a str {
        match self {
            FieldSource::SameName => target,
            FieldSource::Field(field) => field,
        }
    }
}

impl<'de> Deserialize<'de> for FieldSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match scalar::opt_string(deserializer)? {
            Some(field) if !field.is_empty() => FieldSource::Field(field),
            _ => FieldSource::SameName,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegexStage {
    pub expression: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonStage {
    #[serde(default)]
    pub expressions: IndexMap<String, FieldSource>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub drop_malformed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelsStage {
    pub values: IndexMap<String, FieldSource>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemplateStage {
    pub source: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputStage {
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimestampStage {
    pub source: String,
    pub format: String,
    #[serde(default)]
    pub fallback_formats: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub action_on_failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DropStage {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub older_than: Option<String>,
    #[serde(default)]
    pub longer_than: Option<String>,
    #[serde(default)]
    pub drop_counter_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplaceStage {
    pub expression: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub replace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TenantStage {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogfmtStage {
    #[serde(default)]
    pub mapping: IndexMap<String, FieldSource>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MultilineStage {
    pub firstline: String,
    #[serde(default)]
    pub max_wait_time: Option<String>,
    #[serde(default)]
    pub max_lines: Option<u64>,
}

/// `match` stage: a conditional sub-pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStage {
    /// Log stream selector, passed through verbatim
    pub selector: String,
    pub action: MatchAction,
    pub pipeline_name: Option<String>,
    pub drop_counter_reason: Option<String>,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchAction {
    #[default]
    Keep,
    Drop,
}

impl MatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchAction::Keep => "keep",
            MatchAction::Drop => "drop",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMatchStage {
    selector: String,
    #[serde(default)]
    action: MatchAction,
    #[serde(default)]
    pipeline_name: Option<String>,
    #[serde(default)]
    drop_counter_reason: Option<String>,
    #[serde(default)]
    stages: Vec<Value>,
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsStage {
    pub metrics: Vec<MetricDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            "histogram" => Ok(MetricKind::Histogram),
            other => Err(format!(
                "unknown metric type '{}', expected Counter, Gauge or Histogram",
                other
            )),
        }
    }
}

impl<'de> Deserialize<'de> for MetricKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricAction {
    Inc,
    Add,
    Set,
    Dec,
    Sub,
}

impl MetricAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricAction::Inc => "inc",
            MetricAction::Add => "add",
            MetricAction::Set => "set",
            MetricAction::Dec => "dec",
            MetricAction::Sub => "sub",
        }
    }
}

/// Match configuration of a metric: which entries it counts and how.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct MetricMatch {
    #[serde(default, deserialize_with = "scalar::opt_string")]
    pub value: Option<String>,
    #[serde(default)]
    pub match_all: Option<bool>,
    #[serde(default)]
    pub count_entry_bytes: Option<bool>,
    #[serde(default)]
    pub action: Option<MetricAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDef {
    pub name: String,
    pub kind: MetricKind,
    pub description: Option<String>,
    pub prefix: Option<String>,
    pub source: Option<String>,
    pub max_idle_duration: Option<String>,
    pub buckets: Option<Vec<f64>>,
    pub matcher: MetricMatch,
}

#[derive(Debug, Deserialize)]
struct RawMetric {
    #[serde(rename = "type")]
    kind: MetricKind,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    max_idle_duration: Option<String>,
    #[serde(default)]
    config: Option<RawMetricConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetricConfig {
    #[serde(flatten)]
    matcher: MetricMatch,
    #[serde(default)]
    buckets: Option<Vec<f64>>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a stage list. `path` is the key path of the list itself and is used
/// in error messages (e.g. `scrape_configs[0].pipeline_stages`).
pub fn parse_stages(values: &[Value], path: &str) -> MigrateResult<Vec<Stage>> {
    values
        .iter()
        .enumerate()
        .map(|(ordinal, value)| parse_stage(value, ordinal, &format!("{}[{}]", path, ordinal)))
        .collect()
}

fn parse_stage(value: &Value, ordinal: usize, path: &str) -> MigrateResult<Stage> {
    let mapping = value
        .as_mapping()
        .ok_or_else(|| MigrateError::malformed(path, "stage must be a mapping"))?;

    if mapping.len() != 1 {
        return Err(MigrateError::malformed(
            path,
            format!("stage must have exactly one key, found {}", mapping.len()),
        ));
    }

    let (key, body) = mapping
        .iter()
        .next()
        .ok_or_else(|| MigrateError::malformed(path, "empty stage"))?;
    let kind_name = key
        .as_str()
        .ok_or_else(|| MigrateError::malformed(path, "stage kind must be a string"))?;
    let body_path = format!("{}.{}", path, kind_name);

    let kind = match kind_name {
        "regex" => StageKind::Regex(from_body(body, &body_path)?),
        "json" => StageKind::Json(from_body(body, &body_path)?),
        "labels" => StageKind::Labels(LabelsStage {
            values: from_body_or_default(body, &body_path)?,
        }),
        "template" => StageKind::Template(from_body(body, &body_path)?),
        "metrics" => StageKind::Metrics(parse_metrics(body, &body_path)?),
        "output" => StageKind::Output(from_body(body, &body_path)?),
        "match" => StageKind::Match(parse_match(body, &body_path)?),
        "timestamp" => StageKind::Timestamp(from_body(body, &body_path)?),
        "drop" => StageKind::Drop(from_body(body, &body_path)?),
        "static_labels" => {
            StageKind::StaticLabels(from_body_or_default::<LabelValues>(body, &body_path)?.0)
        }
        "labeldrop" => StageKind::LabelDrop(from_body_or_default(body, &body_path)?),
        "labelallow" => StageKind::LabelAllow(from_body_or_default(body, &body_path)?),
        "replace" => StageKind::Replace(from_body(body, &body_path)?),
        "tenant" => StageKind::Tenant(from_body(body, &body_path)?),
        "logfmt" => StageKind::Logfmt(from_body(body, &body_path)?),
        "multiline" => StageKind::Multiline(from_body(body, &body_path)?),
        "docker" => StageKind::Docker,
        "cri" => StageKind::Cri,
        other => StageKind::Unsupported {
            kind: other.to_string(),
        },
    };

    Ok(Stage { ordinal, kind })
}

fn parse_match(body: &Value, path: &str) -> MigrateResult<MatchStage> {
    let raw: RawMatchStage = from_body(body, path)?;
    let stages = parse_stages(&raw.stages, &format!("{}.stages", path))?;

    Ok(MatchStage {
        selector: raw.selector,
        action: raw.action,
        pipeline_name: raw.pipeline_name,
        drop_counter_reason: raw.drop_counter_reason,
        stages,
    })
}

fn parse_metrics(body: &Value, path: &str) -> MigrateResult<MetricsStage> {
    let raw: IndexMap<String, RawMetric> = from_body(body, path)?;

    let metrics = raw
        .into_iter()
        .map(|(name, metric)| {
            let config = metric.config.unwrap_or_default();
            MetricDef {
                name,
                kind: metric.kind,
                description: metric.description,
                prefix: metric.prefix,
                source: metric.source,
                max_idle_duration: metric.max_idle_duration,
                buckets: config.buckets,
                matcher: config.matcher,
            }
        })
        .collect();

    Ok(MetricsStage { metrics })
}

#[derive(Default, Deserialize)]
struct LabelValues(#[serde(deserialize_with = "scalar::string_map")] IndexMap<String, String>);

fn from_body<T: DeserializeOwned>(body: &Value, path: &str) -> MigrateResult<T> {
    serde_yaml::from_value(body.clone()).map_err(|e| MigrateError::malformed(path, e.to_string()))
}

/// Like [`from_body`], but an empty (`~`) body yields the default value.
fn from_body_or_default<T: DeserializeOwned + Default>(body: &Value, path: &str) -> MigrateResult<T> {
    if body.is_null() {
        return Ok(T::default());
    }
    from_body(body, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> MigrateResult<Vec<Stage>> {
        let values: Vec<Value> = serde_yaml::from_str(yaml).unwrap();
        parse_stages(&values, "pipeline_stages")
    }

    #[test]
    fn test_parse_ordered_stages() {
        let stages = parse(
            r#"
- regex:
    expression: '^(?P<level>\w+) (?P<msg>.*)$'
- labels:
    level:
- output:
    source: msg
"#,
        )
        .unwrap();

        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].ordinal, 0);
        assert_eq!(stages[0].kind.name(), "regex");
        assert_eq!(stages[1].kind.name(), "labels");
        assert_eq!(stages[2].ordinal, 2);

        match &stages[0].kind {
            StageKind::Regex(regex) => {
                assert_eq!(regex.expression, r"^(?P<level>\w+) (?P<msg>.*)$");
                assert!(regex.source.is_none());
            }
            other => panic!("unexpected stage: {other:?}"),
        }
    }

    #[test]
    fn test_labels_field_source() {
        let stages = parse(
            r#"
- labels:
    foo:
    bar: baz
    qux: ""
"#,
        )
        .unwrap();

        match &stages[0].kind {
            StageKind::Labels(labels) => {
                let values: Vec<_> = labels.values.iter().collect();
                assert_eq!(values[0], (&"foo".to_string(), &FieldSource::SameName));
                assert_eq!(
                    values[1],
                    (&"bar".to_string(), &FieldSource::Field("baz".to_string()))
                );
                assert_eq!(values[2], (&"qux".to_string(), &FieldSource::SameName));
            }
            other => panic!("unexpected stage: {other:?}"),
        }
    }

    #[test]
    fn test_field_source_resolve() {
        assert_eq!(FieldSource::SameName.resolve("foo"), "foo");
        assert_eq!(FieldSource::Field("bar".to_string()).resolve("foo"), "bar");
    }

    #[test]
    fn test_unknown_stage_kind_is_kept() {
        let stages = parse(
            r#"
- docker: {}
- json:
    expressions:
      level:
- unknown_kind:
    foo: bar
"#,
        )
        .unwrap();

        assert_eq!(stages[0].kind, StageKind::Docker);
        assert_eq!(
            stages[2].kind,
            StageKind::Unsupported {
                kind: "unknown_kind".to_string()
            }
        );
        assert_eq!(stages[2].ordinal, 2);
    }

    #[test]
    fn test_parse_nested_match() {
        let stages = parse(
            r#"
- match:
    selector: '{app="nginx"}'
    stages:
      - regex:
          expression: '(?P<status>\d{3})'
      - labels:
          status:
- match:
    selector: '{app="noisy"}'
    action: drop
"#,
        )
        .unwrap();

        match &stages[0].kind {
            StageKind::Match(m) => {
                assert_eq!(m.selector, r#"{app="nginx"}"#);
                assert_eq!(m.action, MatchAction::Keep);
                assert_eq!(m.stages.len(), 2);
                assert_eq!(m.stages[1].ordinal, 1);
            }
            other => panic!("unexpected stage: {other:?}"),
        }
        match &stages[1].kind {
            StageKind::Match(m) => {
                assert_eq!(m.action, MatchAction::Drop);
                assert!(m.stages.is_empty());
            }
            other => panic!("unexpected stage: {other:?}"),
        }
    }

    #[test]
    fn test_parse_metrics() {
        let stages = parse(
            r#"
- metrics:
    log_lines_total:
      type: Counter
      description: total number of log lines
      prefix: my_promtail_custom_
      max_idle_duration: 24h
      config:
        match_all: true
        action: inc
    response_seconds:
      type: histogram
      source: response_time
      config:
        buckets: [0.001, 0.5, 1]
"#,
        )
        .unwrap();

        let StageKind::Metrics(metrics) = &stages[0].kind else {
            panic!("expected metrics stage");
        };
        assert_eq!(metrics.metrics.len(), 2);

        let counter = &metrics.metrics[0];
        assert_eq!(counter.name, "log_lines_total");
        assert_eq!(counter.kind, MetricKind::Counter);
        assert_eq!(counter.max_idle_duration.as_deref(), Some("24h"));
        assert_eq!(counter.matcher.match_all, Some(true));
        assert_eq!(counter.matcher.action, Some(MetricAction::Inc));
        assert!(counter.buckets.is_none());

        let histogram = &metrics.metrics[1];
        assert_eq!(histogram.kind, MetricKind::Histogram);
        assert_eq!(histogram.buckets, Some(vec![0.001, 0.5, 1.0]));
    }

    #[test]
    fn test_unquoted_scalar_values() {
        let stages = parse(
            r#"
- static_labels: {port: 9080, canary: true}
- labels: {code: 200}
- metrics:
    server_errors:
      type: Counter
      source: status
      config:
        value: 500
        action: inc
"#,
        )
        .unwrap();

        let StageKind::StaticLabels(labels) = &stages[0].kind else {
            panic!("expected static_labels stage");
        };
        assert_eq!(labels["port"], "9080");
        assert_eq!(labels["canary"], "true");

        let StageKind::Labels(labels) = &stages[1].kind else {
            panic!("expected labels stage");
        };
        assert_eq!(labels.values["code"], FieldSource::Field("200".to_string()));

        let StageKind::Metrics(metrics) = &stages[2].kind else {
            panic!("expected metrics stage");
        };
        assert_eq!(metrics.metrics[0].matcher.value.as_deref(), Some("500"));
    }

    #[test]
    fn test_unknown_metric_type() {
        let err = parse(
            r#"
- metrics:
    bad:
      type: Summary
"#,
        )
        .unwrap_err();

        match err {
            MigrateError::MalformedSource { path, reason } => {
                assert_eq!(path, "pipeline_stages[0].metrics");
                assert!(reason.contains("Summary") || reason.contains("summary"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_stage_paths() {
        let err = parse("- regex: {}\n").unwrap_err();
        assert!(matches!(
            err,
            MigrateError::MalformedSource { ref path, .. } if path == "pipeline_stages[0].regex"
        ));

        let err = parse("- regex: {expression: a}\n  json: {}\n").unwrap_err();
        assert!(matches!(err, MigrateError::MalformedSource { .. }));

        let err = parse("- just_a_string\n").unwrap_err();
        assert!(matches!(
            err,
            MigrateError::MalformedSource { ref path, .. } if path == "pipeline_stages[0]"
        ));
    }

    #[test]
    fn test_nested_error_path() {
        let err = parse(
            r#"
- match:
    selector: '{a="b"}'
    stages:
      - output: {}
"#,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            MigrateError::MalformedSource { ref path, .. }
                if path == "pipeline_stages[0].match.stages[0].output"
        ));
    }
}
