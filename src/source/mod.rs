//! Source model: Promtail configuration loaded into typed nodes.
//!
//! Loading happens in two passes. The document is first read as a generic
//! YAML tree so required keys can be checked and errors can name the key
//! path; each section is then deserialized into its typed form.

mod scalar;
pub mod stage;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tokio::fs;

use crate::core::error::{MigrateError, MigrateResult};

pub use stage::{
    FieldSource, MatchAction, MetricAction, MetricDef, MetricKind, MetricMatch, Stage, StageKind,
};

/// Top-level sections that configure the Promtail process itself and have
/// no component equivalent.
const PROCESS_SECTIONS: &[&str] = &[
    "server",
    "positions",
    "limits_config",
    "target_config",
    "options",
    "tracing",
];

/// Root of a loaded Promtail configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PromtailConfig {
    pub clients: Vec<Client>,
    pub scrape_configs: Vec<ScrapeJob>,
    /// Top-level sections present in the source that are not migrated
    pub ignored_sections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Client {
    pub url: String,

    #[serde(default)]
    pub basic_auth: Option<BasicAuth>,

    #[serde(default)]
    pub bearer_token: Option<String>,

    #[serde(default)]
    pub bearer_token_file: Option<String>,

    #[serde(default)]
    pub tenant_id: Option<String>,

    #[serde(default)]
    pub batchwait: Option<String>,

    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default, deserialize_with = "scalar::string_map")]
    pub external_labels: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BasicAuth {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub password_file: Option<String>,
}

/// One entry of `scrape_configs`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeJob {
    pub job_name: String,
    pub static_configs: Vec<StaticTarget>,
    pub journal: Option<JournalConfig>,
    pub pipeline_stages: Vec<Stage>,
    pub relabel_configs: Vec<RelabelRule>,
    /// Keys of the job that have no translation (service discovery, receivers)
    pub unsupported: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct StaticTarget {
    #[serde(default)]
    pub targets: Vec<String>,

    /// Label mapping, including the reserved `__path__` / `__path_exclude__`
    #[serde(default, deserialize_with = "scalar::string_map")]
    pub labels: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct JournalConfig {
    #[serde(default)]
    pub max_age: Option<String>,

    #[serde(default, deserialize_with = "scalar::string_map")]
    pub labels: IndexMap<String, String>,

    #[serde(default)]
    pub json: Option<bool>,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub matches: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RelabelRule {
    #[serde(default)]
    pub source_labels: Vec<String>,

    #[serde(default)]
    pub separator: Option<String>,

    #[serde(default)]
    pub target_label: Option<String>,

    #[serde(default)]
    pub regex: Option<String>,

    #[serde(default)]
    pub modulus: Option<u64>,

    #[serde(default)]
    pub replacement: Option<String>,

    /// Absent means `replace`
    #[serde(default)]
    pub action: Option<RelabelAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelabelAction {
    #[default]
    Replace,
    Keep,
    Drop,
    KeepEqual,
    DropEqual,
    HashMod,
    LabelMap,
    LabelDrop,
    LabelKeep,
    Lowercase,
    Uppercase,
}

impl RelabelAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelabelAction::Replace => "replace",
            RelabelAction::Keep => "keep",
            RelabelAction::Drop => "drop",
            RelabelAction::KeepEqual => "keepequal",
            RelabelAction::DropEqual => "dropequal",
            RelabelAction::HashMod => "hashmod",
            RelabelAction::LabelMap => "labelmap",
            RelabelAction::LabelDrop => "labeldrop",
            RelabelAction::LabelKeep => "labelkeep",
            RelabelAction::Lowercase => "lowercase",
            RelabelAction::Uppercase => "uppercase",
        }
    }

    /// Actions that operate on label names rather than source label values
    pub fn acts_on_label_names(&self) -> bool {
        matches!(
            self,
            RelabelAction::LabelMap | RelabelAction::LabelDrop | RelabelAction::LabelKeep
        )
    }
}

impl std::str::FromStr for RelabelAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [RelabelAction; 11] = [
            RelabelAction::Replace,
            RelabelAction::Keep,
            RelabelAction::Drop,
            RelabelAction::KeepEqual,
            RelabelAction::DropEqual,
            RelabelAction::HashMod,
            RelabelAction::LabelMap,
            RelabelAction::LabelDrop,
            RelabelAction::LabelKeep,
            RelabelAction::Lowercase,
            RelabelAction::Uppercase,
        ];

        let lowered = s.to_lowercase();
        ALL.into_iter()
            .find(|action| action.as_str() == lowered)
            .ok_or_else(|| format!("unknown relabel action '{}'", s))
    }
}

impl<'de> Deserialize<'de> for RelabelAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Deserialize)]
struct RawScrapeJob {
    #[serde(default)]
    job_name: Option<String>,

    #[serde(default)]
    static_configs: Vec<StaticTarget>,

    #[serde(default)]
    journal: Option<JournalConfig>,

    #[serde(default)]
    pipeline_stages: Vec<Value>,

    #[serde(default)]
    relabel_configs: Vec<RelabelRule>,

    #[serde(flatten)]
    extra: Mapping,
}

impl PromtailConfig {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> MigrateResult<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> MigrateResult<Self> {
        let root: Value = serde_yaml::from_str(content)?;
        Self::from_value(&root)
    }

    pub fn from_value(root: &Value) -> MigrateResult<Self> {
        let root = root
            .as_mapping()
            .ok_or_else(|| MigrateError::malformed("<root>", "document must be a mapping"))?;

        let clients = load_clients(root)?;

        let scrape_values = match root.get("scrape_configs") {
            Some(Value::Sequence(items)) => items.as_slice(),
            Some(_) => {
                return Err(MigrateError::malformed(
                    "scrape_configs",
                    "expected a list of scrape configs",
                ))
            }
            None => {
                return Err(MigrateError::malformed(
                    "scrape_configs",
                    "required key is missing",
                ))
            }
        };

        let scrape_configs = scrape_values
            .iter()
            .enumerate()
            .map(|(idx, value)| load_scrape_job(value, &format!("scrape_configs[{}]", idx)))
            .collect::<MigrateResult<Vec<_>>>()?;

        let ignored_sections = PROCESS_SECTIONS
            .iter()
            .filter(|section| root.contains_key(**section))
            .map(|section| section.to_string())
            .collect();

        let config = PromtailConfig {
            clients,
            scrape_configs,
            ignored_sections,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MigrateResult<()> {
        if self.clients.is_empty() {
            return Err(MigrateError::malformed(
                "clients",
                "at least one client is required",
            ));
        }

        for (idx, client) in self.clients.iter().enumerate() {
            if client.url.trim().is_empty() {
                return Err(MigrateError::malformed(
                    format!("clients[{}].url", idx),
                    "must not be empty",
                ));
            }
        }

        for (idx, job) in self.scrape_configs.iter().enumerate() {
            if job.job_name.trim().is_empty() {
                return Err(MigrateError::malformed(
                    format!("scrape_configs[{}].job_name", idx),
                    "must not be empty",
                ));
            }
        }

        Ok(())
    }
}

/// `clients` is a list; the legacy singular `client` holds one entry.
fn load_clients(root: &Mapping) -> MigrateResult<Vec<Client>> {
    if let Some(value) = root.get("clients") {
        return match value {
            Value::Sequence(_) => serde_yaml::from_value(value.clone())
                .map_err(|e| MigrateError::malformed("clients", e.to_string())),
            _ => Err(MigrateError::malformed("clients", "expected a list of clients")),
        };
    }

    if let Some(value) = root.get("client") {
        let client: Client = serde_yaml::from_value(value.clone())
            .map_err(|e| MigrateError::malformed("client", e.to_string()))?;
        return Ok(vec![client]);
    }

    Err(MigrateError::malformed("clients", "required key is missing"))
}

fn load_scrape_job(value: &Value, path: &str) -> MigrateResult<ScrapeJob> {
    if !value.is_mapping() {
        return Err(MigrateError::malformed(path, "scrape config must be a mapping"));
    }

    let raw: RawScrapeJob = serde_yaml::from_value(value.clone())
        .map_err(|e| MigrateError::malformed(path, e.to_string()))?;

    let job_name = raw
        .job_name
        .ok_or_else(|| MigrateError::malformed(format!("{}.job_name", path), "required key is missing"))?;

    let pipeline_stages =
        stage::parse_stages(&raw.pipeline_stages, &format!("{}.pipeline_stages", path))?;

    let unsupported = raw
        .extra
        .keys()
        .filter_map(|key| key.as_str().map(str::to_string))
        .collect();

    Ok(ScrapeJob {
        job_name,
        static_configs: raw.static_configs,
        journal: raw.journal,
        pipeline_stages,
        relabel_configs: raw.relabel_configs,
        unsupported,
    })
}
