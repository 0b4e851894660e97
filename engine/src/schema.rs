//! Tracked-field definitions per sync type.
//!
//! The schema says which registry fields a sync type carries, which of them
//! must be present before a local record can be synthesized, and which ones
//! the matcher compares when deciding between `updated` and `matched`.

use crate::{error::Result, Error, Fields, LocalEntity, RemoteRecord, SyncType, TagStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Value kinds the registry reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    /// Whole, non-negative number such as a plant count
    Count,
    /// Measured amount; weights, potency, package quantity
    Quantity,
    /// List of text values such as tag numbers
    List,
    /// One of the tag lifecycle states
    #[serde(rename = "tag_status")]
    TagStatus,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Count => "count",
            FieldType::Quantity => "quantity",
            FieldType::List => "list",
            FieldType::TagStatus => "tag status",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Text, Value::String(_)) => true,
            (FieldType::Count, Value::Number(n)) => n.is_u64(),
            (FieldType::Quantity, Value::Number(n)) => n.as_f64().is_some_and(|q| q >= 0.0),
            (FieldType::List, Value::Array(items)) => items.iter().all(Value::is_string),
            (FieldType::TagStatus, Value::String(_)) => {
                serde_json::from_value::<TagStatus>(value.clone()).is_ok()
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field the registry reports for a sync type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    /// A record without this field cannot become a local entity
    pub required: bool,
}

impl FieldDef {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type)
        }
    }

    /// Check one reported value. Null counts as absent.
    pub fn validate(&self, value: Option<&Value>) -> Result<()> {
        let value = match value {
            Some(Value::Null) | None if self.required => {
                return Err(Error::MissingRequiredField(self.name.clone()))
            }
            Some(Value::Null) | None => return Ok(()),
            Some(value) => value,
        };

        if self.field_type.accepts(value) {
            return Ok(());
        }
        Err(Error::TypeMismatch {
            field: self.name.clone(),
            expected: self.field_type.to_string(),
            got: describe(value),
        })
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("text {s:?}"),
        Value::Array(_) => "list".into(),
        Value::Object(_) => "object".into(),
    }
}

/// Tracked fields of one sync type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSchema {
    pub sync_type: SyncType,
    pub fields: Vec<FieldDef>,
}

impl TypeSchema {
    pub fn new(sync_type: SyncType, fields: Vec<FieldDef>) -> Self {
        Self { sync_type, fields }
    }

    /// Validate registry-reported fields against this schema.
    pub fn validate_fields(&self, fields: &Fields) -> Result<()> {
        for field in &self.fields {
            field.validate(fields.get(&field.name))?;
        }
        Ok(())
    }

    /// Keep only tracked, non-null fields.
    pub fn project(&self, fields: &Fields) -> Fields {
        self.fields
            .iter()
            .filter_map(|def| {
                fields
                    .get(&def.name)
                    .filter(|v| !v.is_null())
                    .map(|v| (def.name.clone(), v.clone()))
            })
            .collect()
    }

    /// Whether the registry copy differs from the local one in any tracked
    /// field. Fields the registry does not report are not compared.
    pub fn differs(&self, remote: &RemoteRecord, local: &LocalEntity) -> bool {
        if remote.display_name != local.name {
            return true;
        }
        self.fields.iter().any(|def| match remote.fields.get(&def.name) {
            None | Some(Value::Null) => false,
            Some(value) => local.fields.get(&def.name) != Some(value),
        })
    }
}

/// Field schema for every sync type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSchema {
    pub types: HashMap<SyncType, TypeSchema>,
}

impl SyncSchema {
    /// Create an empty schema. Types without an entry track only the name.
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// The field set the registry reports for each sync type.
    pub fn standard() -> Self {
        use FieldType::{Count, List, Quantity, Text};

        Self::new()
            .with_type(TypeSchema::new(
                SyncType::Locations,
                vec![
                    FieldDef::optional("roomType", Text),
                    FieldDef::optional("capacity", Count),
                ],
            ))
            .with_type(TypeSchema::new(
                SyncType::Strains,
                vec![
                    FieldDef::optional("strainType", Text),
                    FieldDef::optional("thcLevel", Quantity),
                    FieldDef::optional("cbdLevel", Quantity),
                ],
            ))
            .with_type(TypeSchema::new(
                SyncType::Items,
                vec![
                    FieldDef::required("category", Text),
                    FieldDef::optional("unitOfMeasure", Text),
                    FieldDef::optional("strainName", Text),
                ],
            ))
            .with_type(TypeSchema::new(
                SyncType::PlantBatches,
                vec![
                    FieldDef::optional("plantCount", Count),
                    FieldDef::optional("growthPhase", Text),
                    FieldDef::optional("strainName", Text),
                    FieldDef::optional("tags", List),
                ],
            ))
            .with_type(TypeSchema::new(
                SyncType::Plants,
                vec![
                    FieldDef::optional("growthPhase", Text),
                    FieldDef::optional("strainName", Text),
                    FieldDef::optional("locationName", Text),
                ],
            ))
            .with_type(TypeSchema::new(
                SyncType::Packages,
                vec![
                    FieldDef::required("itemName", Text),
                    FieldDef::optional("quantity", Quantity),
                    FieldDef::optional("unitOfMeasure", Text),
                ],
            ))
            .with_type(TypeSchema::new(
                SyncType::Harvests,
                vec![
                    FieldDef::optional("harvestType", Text),
                    FieldDef::optional("wetWeight", Quantity),
                    FieldDef::optional("unitOfWeight", Text),
                ],
            ))
            .with_type(TypeSchema::new(
                SyncType::Tags,
                vec![
                    FieldDef::optional("tagNumber", Text),
                    FieldDef::optional("status", FieldType::TagStatus),
                ],
            ))
    }

    /// Builder-style method to add a type schema.
    pub fn with_type(mut self, schema: TypeSchema) -> Self {
        self.types.insert(schema.sync_type, schema);
        self
    }

    pub fn get(&self, sync_type: SyncType) -> Option<&TypeSchema> {
        self.types.get(&sync_type)
    }

    pub fn validate_fields(&self, sync_type: SyncType, fields: &Fields) -> Result<()> {
        match self.get(sync_type) {
            Some(schema) => schema.validate_fields(fields),
            None => Ok(()),
        }
    }

    pub fn project(&self, sync_type: SyncType, fields: &Fields) -> Fields {
        self.get(sync_type)
            .map(|schema| schema.project(fields))
            .unwrap_or_default()
    }

    pub fn differs(&self, sync_type: SyncType, remote: &RemoteRecord, local: &LocalEntity) -> bool {
        match self.get(sync_type) {
            Some(schema) => schema.differs(remote, local),
            None => remote.display_name != local.name,
        }
    }
}

impl Default for SyncSchema {
    fn default() -> Self {
        Self::new()
    }
}
