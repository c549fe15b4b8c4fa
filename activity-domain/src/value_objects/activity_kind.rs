// Activity kind value object

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    Order,
    LootOpen,
    Tournament,
    Spin,
    #[default]
    #[serde(other)]
    Other,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Order => "order",
            ActivityKind::LootOpen => "loot-open",
            ActivityKind::Tournament => "tournament",
            ActivityKind::Spin => "spin",
            ActivityKind::Other => "other",
        }
    }
}

impl From<&str> for ActivityKind {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "order" => ActivityKind::Order,
            "loot-open" | "loot" => ActivityKind::LootOpen,
            "tournament" => ActivityKind::Tournament,
            "spin" => ActivityKind::Spin,
            _ => ActivityKind::Other,
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
