use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use activity_domain::{ActivityItem, ActivityMapper, BackendConfig, RawRecord, ResourceWatch, SeedSource};

/// Seeds the feed with the newest rows of every watched table through the
/// BaaS REST endpoint.
pub struct RestSeedSource {
    client: Client,
    rest_url: String,
    api_key: Option<String>,
    watches: Vec<ResourceWatch>,
    mapper: Arc<ActivityMapper>,
}

impl RestSeedSource {
    pub fn new(
        config: &BackendConfig,
        watches: Vec<ResourceWatch>,
        mapper: Arc<ActivityMapper>,
        request_timeout_seconds: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_seconds.max(3)))
            .build()?;
        Ok(Self {
            client,
            rest_url: config.rest_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            watches,
            mapper,
        })
    }

    async fn fetch_rows(&self, watch: &ResourceWatch, limit: usize) -> Result<Vec<Value>> {
        let url = table_url(&self.rest_url, &watch.table);
        let mut request = self
            .client
            .get(&url)
            .query(&[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .header("Accept", "application/json");
        if watch.schema != activity_domain::DEFAULT_SCHEMA {
            request = request.header("Accept-Profile", watch.schema.as_str());
        }
        if let Some(key) = &self.api_key {
            request = request
                .header("apikey", key.as_str())
                .header(AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("seed fetch {} failed: {} {}", url, status, body));
        }
        match response.json::<Value>().await? {
            Value::Array(rows) => Ok(rows),
            other => Err(anyhow!("seed fetch {} returned non-array: {}", url, other)),
        }
    }
}

#[async_trait]
impl SeedSource for RestSeedSource {
    async fn load(&self, limit: usize) -> Result<Vec<ActivityItem>> {
        let mut batches = Vec::with_capacity(self.watches.len());
        let mut failures = Vec::new();
        for watch in &self.watches {
            match self.fetch_rows(watch, limit).await {
                Ok(rows) => batches.push(map_rows(&self.mapper, &watch.table, rows)),
                Err(err) => {
                    warn!("seed rows for {} unavailable: {}", watch, err);
                    failures.push(err.to_string());
                }
            }
        }
        if batches.is_empty() && !failures.is_empty() {
            return Err(anyhow!(failures.join("; ")));
        }
        Ok(merge_newest_first(batches, limit))
    }

    fn describe(&self) -> String {
        format!("rest {} ({} tables)", self.rest_url, self.watches.len())
    }
}

fn table_url(rest_url: &str, table: &str) -> String {
    format!("{}/rest/v1/{}", rest_url.trim_end_matches('/'), table)
}

fn map_rows(mapper: &ActivityMapper, table: &str, rows: Vec<Value>) -> Vec<ActivityItem> {
    rows.into_iter()
        .filter_map(|row| RawRecord::from_value(table, row))
        .filter_map(|record| match mapper.map(&record) {
            Ok(item) => Some(item),
            Err(err) => {
                debug!("skipping seed row: {}", err);
                None
            }
        })
        .collect()
}

/// Seed order is by `occurred_at`, unlike live inserts which keep arrival order.
fn merge_newest_first(batches: Vec<Vec<ActivityItem>>, limit: usize) -> Vec<ActivityItem> {
    let mut items: Vec<ActivityItem> = batches.into_iter().flatten().collect();
    items.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
    items.truncate(limit);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use activity_domain::{ActivityKind, LOOT_BOX_OPENS, ORDERS};
    use serde_json::json;

    #[test]
    fn table_url_joins_rest_path() {
        assert_eq!(
            table_url("https://demo.supabase.co/", "orders"),
            "https://demo.supabase.co/rest/v1/orders"
        );
    }

    #[test]
    fn rows_merge_by_time_and_skip_bad_rows() {
        let mapper = ActivityMapper::default();
        let orders = map_rows(
            &mapper,
            ORDERS,
            vec![
                json!({"id": 1, "total_amount": 10, "created_at": "2024-06-01T10:00:00Z"}),
                json!({"id": 2, "created_at": "2024-06-01T11:00:00Z"}),
            ],
        );
        let opens = map_rows(
            &mapper,
            LOOT_BOX_OPENS,
            vec![
                json!({"id": "c1", "box_name": "Golden Crate", "created_at": "2024-06-01T12:00:00Z"}),
                json!({"id": "c2", "box_name": "Iron Crate", "created_at": "2024-06-01T09:00:00Z"}),
            ],
        );
        assert_eq!(orders.len(), 1);

        let merged = merge_newest_first(vec![orders, opens], 2);
        let ids: Vec<_> = merged.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "1"]);
        assert_eq!(merged[0].kind, ActivityKind::LootOpen);
    }
}
