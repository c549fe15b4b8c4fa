// Activity item entity
// One user-facing event as shown in the activity sidebar

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{generate_item_id, ActivityKind};

pub const PLACEHOLDER_ACTOR: &str = "A Player";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub kind: ActivityKind,
    #[serde(default = "default_actor")]
    pub actor: String,
    pub description: String,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

fn default_actor() -> String {
    PLACEHOLDER_ACTOR.to_string()
}

impl ActivityItem {
    /// Builds a locally generated item (seed or synthetic).
    pub fn synthetic(
        kind: ActivityKind,
        actor: impl Into<String>,
        description: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_item_id(),
            kind,
            actor: actor.into(),
            description: description.into(),
            occurred_at,
            avatar_url: None,
        }
    }

    /// Fills in the fields a seed file may leave out.
    pub fn normalized(mut self) -> Self {
        if self.id.trim().is_empty() {
            self.id = generate_item_id();
        }
        if self.actor.trim().is_empty() {
            self.actor = default_actor();
        }
        if let Some(url) = &self.avatar_url {
            if url.trim().is_empty() {
                self.avatar_url = None;
            }
        }
        self
    }

    pub fn time_ago(&self, now: DateTime<Utc>) -> String {
        let seconds = (now - self.occurred_at).num_seconds().max(0);
        match seconds {
            0..=59 => "just now".to_string(),
            60..=3_599 => format!("{}m ago", seconds / 60),
            3_600..=86_399 => format!("{}h ago", seconds / 3_600),
            _ => format!("{}d ago", seconds / 86_400),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item_at(occurred_at: DateTime<Utc>) -> ActivityItem {
        ActivityItem::synthetic(ActivityKind::Spin, "Nova", "spun the wheel", occurred_at)
    }

    #[test]
    fn time_ago_uses_coarse_buckets() {
        let now = Utc::now();
        assert_eq!(item_at(now - Duration::seconds(20)).time_ago(now), "just now");
        assert_eq!(item_at(now - Duration::minutes(5)).time_ago(now), "5m ago");
        assert_eq!(item_at(now - Duration::hours(3)).time_ago(now), "3h ago");
        assert_eq!(item_at(now - Duration::days(2)).time_ago(now), "2d ago");
        assert_eq!(item_at(now + Duration::minutes(1)).time_ago(now), "just now");
    }

    #[test]
    fn normalized_fills_missing_identity() {
        let item: ActivityItem = serde_json::from_str(
            r#"{"kind":"order","actor":"  ","description":"placed a new trade","avatar_url":""}"#,
        )
        .expect("parse item");
        let item = item.normalized();
        assert!(!item.id.is_empty());
        assert_eq!(item.actor, PLACEHOLDER_ACTOR);
        assert_eq!(item.avatar_url, None);
        assert_eq!(item.kind, ActivityKind::Order);
    }
}
