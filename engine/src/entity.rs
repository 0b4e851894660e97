//! Entity types shared by the matcher, the store and the orchestrators.

use crate::status::{self, StalenessPolicy, StatusInputs, SyncStatus};
use crate::{error::Result, EntityId, Error, Fields, RemoteKey, SiteId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of registry data a sync run reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    /// Rooms (registry "locations")
    Locations,
    /// Cultivars (registry "strains")
    Strains,
    Items,
    PlantBatches,
    Plants,
    Packages,
    Harvests,
    /// Registry-issued plant and package tags
    Tags,
}

impl SyncType {
    pub const ALL: [SyncType; 8] = [
        SyncType::Locations,
        SyncType::Strains,
        SyncType::Items,
        SyncType::PlantBatches,
        SyncType::Plants,
        SyncType::Packages,
        SyncType::Harvests,
        SyncType::Tags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Locations => "locations",
            SyncType::Strains => "strains",
            SyncType::Items => "items",
            SyncType::PlantBatches => "plant_batches",
            SyncType::Plants => "plants",
            SyncType::Packages => "packages",
            SyncType::Harvests => "harvests",
            SyncType::Tags => "tags",
        }
    }

    /// Whether local records of this type can be created in the registry.
    ///
    /// Tags are issued by the registry and only ever flow inward.
    pub fn supports_push(&self) -> bool {
        !matches!(self, SyncType::Tags)
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SyncType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownSyncType(s.to_string()))
    }
}

/// Compliance standing of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    Uncompliant,
    #[default]
    Pending,
    NotRequired,
}

/// A tenant facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    /// Registry license the facility operates under
    pub license_number: Option<String>,
    pub last_synced_at: Option<Timestamp>,
    pub compliance_status: ComplianceStatus,
}

impl Site {
    pub fn new(id: impl Into<SiteId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            license_number: None,
            last_synced_at: None,
            compliance_status: ComplianceStatus::default(),
        }
    }

    pub fn with_license(mut self, license_number: impl Into<String>) -> Self {
        self.license_number = Some(license_number.into());
        self
    }
}

/// A record as listed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    /// Stable registry identifier
    pub remote_key: RemoteKey,
    pub display_name: String,
    /// Type-specific fields reported by the registry
    #[serde(default)]
    pub fields: Fields,
}

impl RemoteRecord {
    pub fn new(remote_key: impl Into<RemoteKey>, display_name: impl Into<String>) -> Self {
        Self {
            remote_key: remote_key.into(),
            display_name: display_name.into(),
            fields: Fields::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Link from a local entity to its registry counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMapping {
    pub remote_key: RemoteKey,
    pub remote_name: Option<String>,
}

/// A local record participating in reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEntity {
    pub id: EntityId,
    pub site_id: SiteId,
    pub sync_type: SyncType,
    pub name: String,
    pub mapping: Option<RemoteMapping>,
    #[serde(default)]
    pub fields: Fields,
    pub active: bool,
    /// Mapped remote record disappeared from the latest listing
    pub orphaned: bool,
    /// Mapping has been confirmed by a successful run or an explicit link
    pub confirmed: bool,
    pub last_error: Option<String>,
    pub last_synced_at: Option<Timestamp>,
    pub sync_status: SyncStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl LocalEntity {
    /// Create an unmapped, active local entity.
    pub fn new(
        id: impl Into<EntityId>,
        site_id: impl Into<SiteId>,
        sync_type: SyncType,
        name: impl Into<String>,
        fields: Fields,
        timestamp: Timestamp,
    ) -> Self {
        let mut entity = Self {
            id: id.into(),
            site_id: site_id.into(),
            sync_type,
            name: name.into(),
            mapping: None,
            fields,
            active: true,
            orphaned: false,
            confirmed: false,
            last_error: None,
            last_synced_at: None,
            sync_status: SyncStatus::NotSynced,
            created_at: timestamp,
            updated_at: timestamp,
        };
        entity.refresh_status(&StalenessPolicy::default(), timestamp);
        entity
    }

    /// Synthesize a local entity for a registry record with no local match.
    pub fn from_remote(
        id: impl Into<EntityId>,
        site_id: impl Into<SiteId>,
        sync_type: SyncType,
        remote: &RemoteRecord,
        fields: Fields,
        timestamp: Timestamp,
    ) -> Self {
        let mut entity = Self::new(
            id,
            site_id,
            sync_type,
            remote.display_name.clone(),
            fields,
            timestamp,
        );
        entity.bind(remote, timestamp);
        entity.refresh_status(&StalenessPolicy::default(), timestamp);
        entity
    }

    /// Attach an unconfirmed mapping.
    pub fn with_mapping(mut self, remote_key: impl Into<RemoteKey>) -> Self {
        self.mapping = Some(RemoteMapping {
            remote_key: remote_key.into(),
            remote_name: None,
        });
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn remote_key(&self) -> Option<&str> {
        self.mapping.as_ref().map(|m| m.remote_key.as_str())
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// Whether this entity participates in registry compliance at all.
    ///
    /// Batches and harvests of non-regulated product lines carry
    /// `"domain": "produce"`.
    pub fn is_regulated(&self) -> bool {
        match self.sync_type {
            SyncType::PlantBatches | SyncType::Harvests => {
                self.fields.get("domain").and_then(|v| v.as_str()) != Some("produce")
            }
            _ => true,
        }
    }

    pub fn status_inputs(&self) -> StatusInputs {
        StatusInputs {
            regulated: self.is_regulated(),
            mapped: self.is_mapped(),
            confirmed: self.confirmed,
            orphaned: self.orphaned,
            has_error: self.last_error.is_some(),
            last_synced_at: self.last_synced_at,
        }
    }

    /// Recompute the derived sync status.
    pub fn refresh_status(&mut self, policy: &StalenessPolicy, now: Timestamp) {
        self.sync_status = status::derive(&self.status_inputs(), policy, now);
    }

    /// Bind to a registry record and mark the mapping confirmed.
    pub fn bind(&mut self, remote: &RemoteRecord, timestamp: Timestamp) {
        self.mapping = Some(RemoteMapping {
            remote_key: remote.remote_key.clone(),
            remote_name: Some(remote.display_name.clone()),
        });
        self.confirm(timestamp);
    }

    /// Record that a successful run observed the mapped remote record.
    pub fn confirm(&mut self, timestamp: Timestamp) {
        self.confirmed = true;
        self.orphaned = false;
        self.last_error = None;
        self.last_synced_at = Some(timestamp);
        self.updated_at = timestamp;
    }

    /// Copy the registry's name and tracked fields onto this entity.
    pub fn apply_remote(&mut self, remote: &RemoteRecord, tracked: Fields, timestamp: Timestamp) {
        self.name = remote.display_name.clone();
        self.fields.extend(tracked);
        if let Some(mapping) = self.mapping.as_mut() {
            mapping.remote_name = Some(remote.display_name.clone());
        }
        self.updated_at = timestamp;
    }

    /// Flag the entity as orphaned. The mapping is kept.
    pub fn mark_orphaned(&mut self, timestamp: Timestamp) {
        self.orphaned = true;
        self.updated_at = timestamp;
    }

    pub fn record_error(&mut self, message: impl Into<String>, timestamp: Timestamp) {
        self.last_error = Some(message.into());
        self.updated_at = timestamp;
    }

    fn str_field(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn expect_type(&self, sync_type: SyncType) -> Result<()> {
        if self.sync_type == sync_type {
            Ok(())
        } else {
            Err(Error::InvalidPayload(format!(
                "entity {} is {}, expected {}",
                self.id, self.sync_type, sync_type
            )))
        }
    }
}

/// A cultivation room (registry location).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: EntityId,
    pub name: String,
    pub room_type: Option<String>,
    pub capacity: Option<i64>,
    pub active: bool,
    pub remote_location_id: Option<RemoteKey>,
    pub remote_location_name: Option<String>,
    pub orphaned: bool,
    pub sync_status: SyncStatus,
}

impl Room {
    pub fn from_entity(entity: &LocalEntity) -> Result<Self> {
        entity.expect_type(SyncType::Locations)?;
        Ok(Self {
            id: entity.id.clone(),
            name: entity.name.clone(),
            room_type: entity.str_field("roomType"),
            capacity: entity.fields.get("capacity").and_then(|v| v.as_i64()),
            active: entity.active,
            remote_location_id: entity.mapping.as_ref().map(|m| m.remote_key.clone()),
            remote_location_name: entity.mapping.as_ref().and_then(|m| m.remote_name.clone()),
            orphaned: entity.orphaned,
            sync_status: entity.sync_status,
        })
    }
}

/// A variety definition (registry strain).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cultivar {
    pub id: EntityId,
    pub name: String,
    pub remote_strain_id: Option<RemoteKey>,
    pub sync_status: SyncStatus,
}

impl Cultivar {
    pub fn from_entity(entity: &LocalEntity) -> Result<Self> {
        entity.expect_type(SyncType::Strains)?;
        Ok(Self {
            id: entity.id.clone(),
            name: entity.name.clone(),
            remote_strain_id: entity.mapping.as_ref().map(|m| m.remote_key.clone()),
            sync_status: entity.sync_status,
        })
    }
}

/// Product line a batch belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum BatchDomain {
    /// Regulated plants, tracked with registry tags
    #[serde(rename_all = "camelCase")]
    Cannabis {
        #[serde(default)]
        plant_count: u32,
        stage: Option<String>,
        #[serde(default)]
        tags: Vec<String>,
        cultivar_id: Option<EntityId>,
    },
    /// Non-regulated plants
    #[serde(rename_all = "camelCase")]
    Produce {
        #[serde(default)]
        plant_count: u32,
        stage: Option<String>,
    },
}

impl BatchDomain {
    pub fn plant_count(&self) -> u32 {
        match self {
            BatchDomain::Cannabis { plant_count, .. } | BatchDomain::Produce { plant_count, .. } => {
                *plant_count
            }
        }
    }
}

/// Registry view of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBatch {
    pub remote_id: RemoteKey,
    pub growth_phase: Option<String>,
}

/// A cohort of plants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: EntityId,
    pub site_id: SiteId,
    pub name: String,
    pub active: bool,
    pub domain: BatchDomain,
    pub remote: Option<RemoteBatch>,
    pub sync_status: SyncStatus,
}

impl Batch {
    pub fn from_entity(entity: &LocalEntity) -> Result<Self> {
        entity.expect_type(SyncType::PlantBatches)?;

        let mut fields = entity.fields.clone();
        fields
            .entry("domain")
            .or_insert_with(|| serde_json::Value::String("cannabis".into()));
        let domain: BatchDomain = serde_json::from_value(serde_json::Value::Object(fields))
            .map_err(|e| Error::InvalidPayload(format!("batch {}: {}", entity.id, e)))?;

        Ok(Self {
            id: entity.id.clone(),
            site_id: entity.site_id.clone(),
            name: entity.name.clone(),
            active: entity.active,
            domain,
            remote: entity.mapping.as_ref().map(|m| RemoteBatch {
                remote_id: m.remote_key.clone(),
                growth_phase: entity.str_field("growthPhase"),
            }),
            sync_status: entity.sync_status,
        })
    }
}

/// Lifecycle of a registry tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStatus {
    #[default]
    Available,
    Assigned,
    Active,
    Harvested,
    Destroyed,
    Lost,
    Retired,
}

/// A registry-issued plant or package identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: EntityId,
    pub tag_number: String,
    pub remote_tag_id: Option<RemoteKey>,
    pub status: TagStatus,
    pub batch_id: Option<EntityId>,
    pub plant_id: Option<EntityId>,
}

impl Tag {
    pub fn from_entity(entity: &LocalEntity) -> Result<Self> {
        entity.expect_type(SyncType::Tags)?;

        let status = match entity.fields.get("status") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| Error::InvalidPayload(format!("tag {}: {}", entity.id, e)))?,
            None => TagStatus::default(),
        };

        Ok(Self {
            id: entity.id.clone(),
            tag_number: entity
                .str_field("tagNumber")
                .unwrap_or_else(|| entity.name.clone()),
            remote_tag_id: entity.mapping.as_ref().map(|m| m.remote_key.clone()),
            status,
            batch_id: entity.str_field("batchId"),
            plant_id: entity.str_field("plantId"),
        })
    }

    pub fn is_available(&self) -> bool {
        self.status == TagStatus::Available
    }
}
