use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::entities::{ActivityItem, RawRecord, PLACEHOLDER_ACTOR};
use crate::error::MappingError;
use crate::value_objects::ActivityKind;

pub const ORDERS: &str = "orders";
pub const LOOT_BOX_OPENS: &str = "loot_box_opens";
pub const TOURNAMENT_ENTRIES: &str = "tournament_entries";
pub const WHEEL_SPINS: &str = "wheel_spins";

const DEFAULT_CURRENCY: &str = "coins";
const ACTOR_FIELDS: [&str; 3] = ["username", "display_name", "player_name"];

type DescribeFn = fn(&RawRecord) -> String;

/// What a required field must hold for the row to be displayable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Numeric or non-blank text id.
    Id,
    /// Non-blank string or number.
    Text,
    /// Number, or a string that parses as one.
    Amount,
}

impl FieldRule {
    fn accepts(&self, record: &RawRecord, field: &str) -> bool {
        match self {
            FieldRule::Id => matches!(
                record.fields.get(field),
                Some(Value::Number(_)) | Some(Value::String(_))
            ) && record.has(field),
            FieldRule::Text => record.display_field(field).is_some(),
            FieldRule::Amount => record
                .number_field(field)
                .map_or(false, f64::is_finite),
        }
    }
}

/// How rows of one backend table become activity items.
#[derive(Debug, Clone)]
pub struct ResourceMapping {
    pub resource: String,
    pub kind: ActivityKind,
    pub required_fields: Vec<(String, FieldRule)>,
    describe: DescribeFn,
}

impl ResourceMapping {
    pub fn new(
        resource: impl Into<String>,
        kind: ActivityKind,
        required_fields: &[(&str, FieldRule)],
        describe: DescribeFn,
    ) -> Self {
        Self {
            resource: resource.into(),
            kind,
            required_fields: required_fields
                .iter()
                .map(|(field, rule)| (field.to_string(), *rule))
                .collect(),
            describe,
        }
    }

    fn check(&self, record: &RawRecord) -> Result<(), MappingError> {
        for (field, rule) in &self.required_fields {
            if !record.has(field) {
                return Err(MappingError::MissingField {
                    resource: self.resource.clone(),
                    field: field.clone(),
                });
            }
            if !rule.accepts(record, field) {
                return Err(MappingError::InvalidField {
                    resource: self.resource.clone(),
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Tagged mapping table keyed by resource (table) name.
#[derive(Debug, Clone)]
pub struct ActivityMapper {
    mappings: HashMap<String, ResourceMapping>,
}

impl Default for ActivityMapper {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ActivityMapper {
    pub fn empty() -> Self {
        Self {
            mappings: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut mapper = Self::empty();
        mapper.register(ResourceMapping::new(
            ORDERS,
            ActivityKind::Order,
            &[("id", FieldRule::Id), ("total_amount", FieldRule::Amount)],
            describe_order,
        ));
        mapper.register(ResourceMapping::new(
            LOOT_BOX_OPENS,
            ActivityKind::LootOpen,
            &[("id", FieldRule::Id), ("box_name", FieldRule::Text)],
            describe_loot_open,
        ));
        mapper.register(ResourceMapping::new(
            TOURNAMENT_ENTRIES,
            ActivityKind::Tournament,
            &[("id", FieldRule::Id), ("tournament_name", FieldRule::Text)],
            describe_tournament,
        ));
        mapper.register(ResourceMapping::new(
            WHEEL_SPINS,
            ActivityKind::Spin,
            &[("id", FieldRule::Id), ("prize", FieldRule::Text)],
            describe_spin,
        ));
        mapper
    }

    pub fn register(&mut self, mapping: ResourceMapping) {
        self.mappings
            .insert(normalize_resource(&mapping.resource), mapping);
    }

    pub fn supports(&self, resource: &str) -> bool {
        self.mappings.contains_key(&normalize_resource(resource))
    }

    pub fn get(&self, resource: &str) -> Option<&ResourceMapping> {
        self.mappings.get(&normalize_resource(resource))
    }

    pub fn resources(&self) -> Vec<String> {
        let mut out: Vec<String> = self.mappings.keys().cloned().collect();
        out.sort();
        out
    }

    pub fn map(&self, record: &RawRecord) -> Result<ActivityItem, MappingError> {
        self.map_at(record, Utc::now())
    }

    /// `received_at` stands in for rows without a usable `created_at`.
    pub fn map_at(
        &self,
        record: &RawRecord,
        received_at: DateTime<Utc>,
    ) -> Result<ActivityItem, MappingError> {
        let mapping = self
            .get(&record.resource)
            .ok_or_else(|| MappingError::UnknownResource(record.resource.clone()))?;

        mapping.check(record)?;
        let id = record.id_field().ok_or_else(|| MappingError::MissingField {
            resource: mapping.resource.clone(),
            field: "id".to_string(),
        })?;

        Ok(ActivityItem {
            id,
            kind: mapping.kind,
            actor: resolve_actor(record),
            description: (mapping.describe)(record),
            occurred_at: resolve_occurred_at(record).unwrap_or(received_at),
            avatar_url: record.str_field("avatar_url").map(ToString::to_string),
        })
    }
}

fn normalize_resource(resource: &str) -> String {
    resource.trim().to_lowercase()
}

fn resolve_actor(record: &RawRecord) -> String {
    ACTOR_FIELDS
        .iter()
        .find_map(|field| record.str_field(field))
        .unwrap_or(PLACEHOLDER_ACTOR)
        .to_string()
}

fn resolve_occurred_at(record: &RawRecord) -> Option<DateTime<Utc>> {
    let raw = record.str_field("created_at")?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

fn describe_order(record: &RawRecord) -> String {
    let amount = record.display_field("total_amount").unwrap_or_default();
    let currency = record.str_field("currency").unwrap_or(DEFAULT_CURRENCY);
    format!("placed a new trade for {} {}", amount, currency)
}

fn describe_loot_open(record: &RawRecord) -> String {
    format!(
        "opened a {}!",
        record.display_field("box_name").unwrap_or_default()
    )
}

fn describe_tournament(record: &RawRecord) -> String {
    format!(
        "joined the {} tournament",
        record.display_field("tournament_name").unwrap_or_default()
    )
}

fn describe_spin(record: &RawRecord) -> String {
    format!(
        "spun the wheel and won {}",
        record.display_field("prize").unwrap_or_default()
    )
}
