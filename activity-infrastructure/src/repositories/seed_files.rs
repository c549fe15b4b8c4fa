use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use activity_domain::{ActivityItem, SeedSource};

/// Seed items kept in a YAML (`.yaml`/`.yml`) or JSON file.
pub struct FileSeedSource {
    path: PathBuf,
}

impl FileSeedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_yaml(&self) -> bool {
        matches!(
            self.path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_ascii_lowercase())
                .as_deref(),
            Some("yaml") | Some("yml")
        )
    }
}

#[async_trait]
impl SeedSource for FileSeedSource {
    async fn load(&self, limit: usize) -> anyhow::Result<Vec<ActivityItem>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).await?;
        let items: Vec<ActivityItem> = if self.is_yaml() {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(items
            .into_iter()
            .take(limit)
            .map(ActivityItem::normalized)
            .collect())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
