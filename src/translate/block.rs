//! Target block tree.
//!
//! A [`TargetBlock`] is one named unit of the Alloy configuration language:
//! a header (`loki.write "default"`), ordered attributes and ordered nested
//! blocks. Cross-block wiring is expressed with [`Value::Ref`], so the edges
//! of the component graph can be read back from the attribute values.

use indexmap::IndexMap;
use std::fmt;

/// Top-level component kinds the migrator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Log write endpoint (`loki.write`)
    Connection,
    /// File target set (`local.file_match`)
    FileMatch,
    /// File tailer (`loki.source.file`)
    FileSource,
    /// systemd journal reader (`loki.source.journal`)
    JournalSource,
    /// Stage pipeline (`loki.process`)
    Process,
    /// Relabel rule set (`loki.relabel`)
    Relabel,
    UnixExporter,
    Scrape,
    RemoteWrite,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Connection => "loki.write",
            ComponentKind::FileMatch => "local.file_match",
            ComponentKind::FileSource => "loki.source.file",
            ComponentKind::JournalSource => "loki.source.journal",
            ComponentKind::Process => "loki.process",
            ComponentKind::Relabel => "loki.relabel",
            ComponentKind::UnixExporter => "prometheus.exporter.unix",
            ComponentKind::Scrape => "prometheus.scrape",
            ComponentKind::RemoteWrite => "prometheus.remote_write",
        }
    }

    /// Exports other components may reference
    pub fn exports(&self) -> &'static [Export] {
        match self {
            ComponentKind::Connection
            | ComponentKind::Process
            | ComponentKind::RemoteWrite => &[Export::Receiver],
            ComponentKind::Relabel => &[Export::Receiver, Export::Rules],
            ComponentKind::FileMatch | ComponentKind::UnixExporter => &[Export::Targets],
            ComponentKind::FileSource | ComponentKind::JournalSource | ComponentKind::Scrape => &[],
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Export {
    Receiver,
    Targets,
    Rules,
}

impl Export {
    pub fn as_str(&self) -> &'static str {
        match self {
            Export::Receiver => "receiver",
            Export::Targets => "targets",
            Export::Rules => "rules",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Component(ComponentKind),
    /// One processing stage (`stage.<name>`)
    StageGroup(&'static str),
    /// One relabel rule (`rule`)
    RelabelGroup,
    /// Plain nested block (`endpoint`, `metric.counter`, ...)
    Section(&'static str),
}

impl BlockKind {
    /// Block name as written in the header
    pub fn name(&self) -> String {
        match self {
            BlockKind::Component(kind) => kind.as_str().to_string(),
            BlockKind::StageGroup(stage) => format!("stage.{}", stage),
            BlockKind::RelabelGroup => "rule".to_string(),
            BlockKind::Section(name) => name.to_string(),
        }
    }
}

/// Reference to an export of another component, e.g.
/// `loki.write.default.receiver`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub component: ComponentKind,
    pub label: String,
    pub export: Export,
}

impl Reference {
    pub fn new<S: Into<String>>(component: ComponentKind, label: S, export: Export) -> Self {
        Self {
            component,
            label: label.into(),
            export,
        }
    }

    pub fn receiver<S: Into<String>>(component: ComponentKind, label: S) -> Self {
        Self::new(component, label, Export::Receiver)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.component.as_str(),
            self.label,
            self.export.as_str()
        )
    }
}

/// Attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
    Ref(Reference),
}

impl Value {
    pub fn string<S: Into<String>>(s: S) -> Self {
        Value::String(s.into())
    }

    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    pub fn string_map<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }

    pub fn refs(references: Vec<Reference>) -> Self {
        Value::List(references.into_iter().map(Value::Ref).collect())
    }

    /// Whether the value renders on a single line
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Object(_))
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Value::Ref(reference) => out.push(reference),
            Value::List(items) => items.iter().for_each(|item| item.collect_references(out)),
            Value::Object(entries) => entries
                .values()
                .for_each(|item| item.collect_references(out)),
            _ => {}
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Int(n as i64)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::Ref(r)
    }
}

/// One block of the output tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetBlock {
    pub kind: BlockKind,
    pub label: Option<String>,
    pub attributes: Vec<(String, Value)>,
    pub blocks: Vec<TargetBlock>,
}

impl TargetBlock {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            label: None,
            attributes: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn component<S: Into<String>>(kind: ComponentKind, label: S) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new(BlockKind::Component(kind))
        }
    }

    pub fn stage(name: &'static str) -> Self {
        Self::new(BlockKind::StageGroup(name))
    }

    pub fn section(name: &'static str) -> Self {
        Self::new(BlockKind::Section(name))
    }

    pub fn attr<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Add an attribute only when a value is present
    pub fn opt_attr<K: Into<String>, V: Into<Value>>(self, key: K, value: Option<V>) -> Self {
        match value {
            Some(value) => self.attr(key, value),
            None => self,
        }
    }

    pub fn block(mut self, block: TargetBlock) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn blocks(mut self, blocks: impl IntoIterator<Item = TargetBlock>) -> Self {
        self.blocks.extend(blocks);
        self
    }

    pub fn get_attr(&self, key: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn component_kind(&self) -> Option<ComponentKind> {
        match self.kind {
            BlockKind::Component(kind) => Some(kind),
            _ => None,
        }
    }

    /// Generated identifier of a component, e.g. `loki.write.default`
    pub fn identifier(&self) -> Option<String> {
        let kind = self.component_kind()?;
        let label = self.label.as_ref()?;
        Some(format!("{}.{}", kind.as_str(), label))
    }

    /// All references made by this block and its nested blocks
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        for (_, value) in &self.attributes {
            value.collect_references(out);
        }
        for block in &self.blocks {
            block.collect_references(out);
        }
    }
}
