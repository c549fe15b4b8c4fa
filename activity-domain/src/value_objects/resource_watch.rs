// Resource watch value object
// Names one backend table and the change event to be notified about

use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    #[default]
    Insert,
    Update,
    Delete,
    #[serde(rename = "*")]
    All,
}

impl ChangeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeEvent::Insert => "INSERT",
            ChangeEvent::Update => "UPDATE",
            ChangeEvent::Delete => "DELETE",
            ChangeEvent::All => "*",
        }
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            ChangeEvent::All => true,
            other => other.as_str().eq_ignore_ascii_case(event_type.trim()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceWatch {
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub event: ChangeEvent,
}

impl ResourceWatch {
    pub fn inserts(table: impl Into<String>) -> Self {
        Self::inserts_in(DEFAULT_SCHEMA, table)
    }

    pub fn inserts_in(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into().trim().to_string(),
            table: table.into().trim().to_string(),
            event: ChangeEvent::Insert,
        }
    }

    /// The resource name used to pick a mapping.
    pub fn resource(&self) -> &str {
        &self.table
    }

    pub fn topic(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }
}

impl std::fmt::Display for ResourceWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} ({})", self.schema, self.table, self.event.as_str())
    }
}
