use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag of namespace records; the namespace filter never applies to them.
pub const NAMESPACE_KIND: &str = "namespace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerRole {
    #[serde(rename = "container")]
    Container,
    #[serde(rename = "init container")]
    InitContainer,
}

impl fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerRole::Container => write!(f, "container"),
            ContainerRole::InitContainer => write!(f, "init container"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMeta {
    pub name: String,
    pub role: ContainerRole,
}

/// One cached cluster object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub containers: Vec<ContainerMeta>,
}

impl ResourceRecord {
    pub fn new(kind: &str, name: &str, namespace: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    /// Same (name, namespace, kind) triple.
    pub fn same_identity(&self, other: &ResourceRecord) -> bool {
        self.name == other.name && self.namespace == other.namespace && self.kind == other.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEvent {
    pub event_type: EventType,
    pub record: ResourceRecord,
}

impl ResourceEvent {
    pub fn new(event_type: EventType, record: ResourceRecord) -> Self {
        Self { event_type, record }
    }
}

/// Query parameters for `Resources`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchFilter {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub kind: String,
}

impl WatchFilter {
    pub fn new(context: &str, namespace: &str, kind: &str) -> Self {
        Self {
            context: context.to_string(),
            namespace: namespace.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn matches(&self, record: &ResourceRecord) -> bool {
        record.kind.eq_ignore_ascii_case(&self.kind)
            && (self.namespace.is_empty()
                || record.kind == NAMESPACE_KIND
                || record.namespace.eq_ignore_ascii_case(&self.namespace))
    }
}
