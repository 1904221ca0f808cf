//! Metadata record and lineage types
//!
//! Wire types use camelCase JSON serialization, matching what the routing
//! layer exposes to clients.

use serde::{Deserialize, Serialize};

/// Kind of artifact a resource holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    EventLog,
    Histogram,
    ProcessModel,
    PetriNet,
    Image,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EventLog => write!(f, "EventLog"),
            Self::Histogram => write!(f, "Histogram"),
            Self::ProcessModel => write!(f, "ProcessModel"),
            Self::PetriNet => write!(f, "PetriNet"),
            Self::Image => write!(f, "Image"),
        }
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EventLog" => Ok(Self::EventLog),
            "Histogram" => Ok(Self::Histogram),
            "ProcessModel" => Ok(Self::ProcessModel),
            "PetriNet" => Ok(Self::PetriNet),
            "Image" => Ok(Self::Image),
            other => Err(format!("unknown resource type: {}", other)),
        }
    }
}

/// One lineage edge, tagged with the role the referenced resource plays
/// (e.g. "Log" meaning "used as the source log")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageEdge {
    pub resource_id: String,
    pub used_as: String,
}

impl LineageEdge {
    pub fn new(resource_id: impl Into<String>, used_as: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            used_as: used_as.into(),
        }
    }
}

/// Parent/child edges recording which resources this one was derived from
/// and which were derived from it. Both sequences keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTree {
    #[serde(default)]
    pub parents: Vec<LineageEdge>,
    #[serde(default)]
    pub children: Vec<LineageEdge>,
}

/// Metadata record for a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataObject {
    /// Opaque unique identifier, assigned at creation, never reused
    pub resource_id: String,
    pub resource_label: String,
    pub description: String,
    /// Immutable after creation
    pub resource_type: ResourceType,
    /// With `file_extension`, determines the on-disk payload placement;
    /// immutable once the payload is written
    pub file_type: String,
    pub file_extension: String,
    /// URL of the repository instance the resource was registered at
    pub origin_url: String,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub generation_tree: GenerationTree,
}

/// Fields for registering a new resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResource {
    pub resource_label: String,
    #[serde(default)]
    pub description: String,
    pub resource_type: ResourceType,
    pub file_type: String,
    pub file_extension: String,
    #[serde(default)]
    pub origin_url: String,
    /// Resources this one was derived from; symmetric child edges are
    /// registered on each parent
    #[serde(default)]
    pub parents: Vec<LineageEdge>,
}

/// Fields for updating an existing resource
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResource {
    pub resource_label: Option<String>,
    pub description: Option<String>,
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,
}

/// Structured filter over metadata records
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFilter {
    pub resource_type: Option<ResourceType>,
    pub label_contains: Option<String>,
}

impl ResourceFilter {
    /// Whether a record passes the filter
    pub fn matches(&self, record: &MetadataObject) -> bool {
        if let Some(rt) = self.resource_type {
            if record.resource_type != rt {
                return false;
            }
        }
        if let Some(needle) = &self.label_contains {
            let needle = needle.to_lowercase();
            if !record.resource_label.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// First qualifying child for a lineage lookup, plus any additional matches.
///
/// More than one qualifying child violates the at-most-one-derivation
/// invariant; the caller decides how to surface that.
#[derive(Debug, Clone)]
pub struct ChildMatch {
    pub resource_id: String,
    pub duplicates: Vec<String>,
}

/// Current time in Unix milliseconds
pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
