//! Metadata store with file-based JSON persistence
//!
//! Directory layout:
//! ```text
//! <metadata_dir>/
//! ├── <resource_id>.json
//! └── ...
//! ```
//!
//! Records are kept in an insertion-ordered in-memory index behind a write
//! lock and mirrored to one JSON file each. Persistence is awaited: a caller
//! never observes a successful mutation before the record is on disk, because
//! lineage decisions made by other callers depend on it.

use crate::error::{Error, Result};
use crate::metadata::types::*;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage boundary for metadata records and their lineage graph
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Look up a record by resource id
    async fn get(&self, resource_id: &str) -> Result<Option<MetadataObject>>;

    /// Insert or replace a record as a whole (last-writer-wins at record
    /// granularity)
    async fn put(&self, record: MetadataObject) -> Result<()>;

    /// All records passing the filter, in insertion order
    async fn scan(&self, filter: &ResourceFilter) -> Result<Vec<MetadataObject>>;

    /// Insert the parent→child edge and its symmetric counterpart together.
    /// Fails with `NotFound` if either id is unknown; neither half-edge is
    /// written in that case.
    async fn add_edge(&self, parent_id: &str, child_id: &str, role: &str) -> Result<()>;

    /// First child of the given resource whose type equals `target`, in
    /// insertion order, along with the ids of any further qualifying
    /// children. A child edge pointing at a missing record is a reported
    /// consistency fault.
    async fn find_child_of_type(
        &self,
        resource_id: &str,
        target: ResourceType,
    ) -> Result<Option<ChildMatch>>;

    /// Metadata for the direct children of a resource, in insertion order
    async fn children_of(&self, resource_id: &str) -> Result<Vec<MetadataObject>>;
}

/// In-memory metadata index backed by JSON files
pub struct FileMetadataStore {
    dir: PathBuf,
    records: Arc<RwLock<Vec<MetadataObject>>>,
}

impl FileMetadataStore {
    /// Create a store at the given directory, loading any existing records
    pub async fn new(dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&dir).await?;

        let mut records = Self::load_json_files(&dir);
        // Tie-break on id so records created in the same millisecond keep a
        // stable scan order across restarts
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.resource_id.cmp(&b.resource_id))
        });
        tracing::info!("Loaded {} metadata records from {}", records.len(), dir.display());

        Ok(Self {
            dir,
            records: Arc::new(RwLock::new(records)),
        })
    }

    /// Load all record files from the metadata directory, skipping any that
    /// fail to parse
    fn load_json_files(dir: &Path) -> Vec<MetadataObject> {
        let mut items = Vec::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to read directory {}: {}", dir.display(), e);
                }
                return items;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(data) => match serde_json::from_str(&data) {
                    Ok(item) => items.push(item),
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                }
            }
        }

        items
    }

    /// Write a record file atomically (temp then rename)
    async fn persist(&self, record: &MetadataObject) -> Result<()> {
        let path = self.dir.join(format!("{}.json", record.resource_id));
        let tmp = self.dir.join(format!("{}.json.tmp", record.resource_id));
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn index_of(records: &[MetadataObject], resource_id: &str) -> Option<usize> {
        records.iter().position(|r| r.resource_id == resource_id)
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn get(&self, resource_id: &str) -> Result<Option<MetadataObject>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.resource_id == resource_id).cloned())
    }

    async fn put(&self, record: MetadataObject) -> Result<()> {
        let mut records = self.records.write().await;
        self.persist(&record).await?;
        match Self::index_of(&records, &record.resource_id) {
            Some(idx) => records[idx] = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn scan(&self, filter: &ResourceFilter) -> Result<Vec<MetadataObject>> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn add_edge(&self, parent_id: &str, child_id: &str, role: &str) -> Result<()> {
        let mut records = self.records.write().await;

        let parent_idx = Self::index_of(&records, parent_id)
            .ok_or_else(|| Error::NotFound(format!("edge parent {}", parent_id)))?;
        let child_idx = Self::index_of(&records, child_id)
            .ok_or_else(|| Error::NotFound(format!("edge child {}", child_id)))?;

        if parent_idx == child_idx {
            // Self-edge: both halves live in one record, one atomic persist
            let mut record = records[parent_idx].clone();
            record
                .generation_tree
                .children
                .push(LineageEdge::new(child_id, role));
            record
                .generation_tree
                .parents
                .push(LineageEdge::new(parent_id, role));
            self.persist(&record).await?;
            records[parent_idx] = record;
            return Ok(());
        }

        let mut parent = records[parent_idx].clone();
        let mut child = records[child_idx].clone();
        parent
            .generation_tree
            .children
            .push(LineageEdge::new(child_id, role));
        child
            .generation_tree
            .parents
            .push(LineageEdge::new(parent_id, role));

        // Both record files must land before the index sees either half-edge.
        // If the child write fails after the parent file went out, put the
        // parent file back so disk and index stay symmetric.
        self.persist(&parent).await?;
        if let Err(e) = self.persist(&child).await {
            if let Err(undo) = self.persist(&records[parent_idx]).await {
                tracing::warn!(
                    "Failed to restore record {} after edge write failure: {}",
                    parent_id,
                    undo
                );
            }
            return Err(e);
        }
        records[parent_idx] = parent;
        records[child_idx] = child;

        tracing::debug!("Linked {} -> {} as {}", parent_id, child_id, role);
        Ok(())
    }

    async fn find_child_of_type(
        &self,
        resource_id: &str,
        target: ResourceType,
    ) -> Result<Option<ChildMatch>> {
        let records = self.records.read().await;
        let record = records
            .iter()
            .find(|r| r.resource_id == resource_id)
            .ok_or_else(|| Error::NotFound(resource_id.to_string()))?;

        let mut matches = Vec::new();
        for edge in &record.generation_tree.children {
            let child = records
                .iter()
                .find(|r| r.resource_id == edge.resource_id)
                .ok_or_else(|| {
                    tracing::warn!(
                        "Child edge {} -> {} points at a missing record",
                        resource_id,
                        edge.resource_id
                    );
                    Error::InconsistentLineage(format!(
                        "child {} of {} has no metadata record",
                        edge.resource_id, resource_id
                    ))
                })?;
            if child.resource_type == target {
                matches.push(child.resource_id.clone());
            }
        }

        let mut matches = matches.into_iter();
        Ok(matches.next().map(|first| ChildMatch {
            resource_id: first,
            duplicates: matches.collect(),
        }))
    }

    async fn children_of(&self, resource_id: &str) -> Result<Vec<MetadataObject>> {
        let records = self.records.read().await;
        let record = records
            .iter()
            .find(|r| r.resource_id == resource_id)
            .ok_or_else(|| Error::NotFound(resource_id.to_string()))?;

        let mut children = Vec::new();
        for edge in &record.generation_tree.children {
            let child = records
                .iter()
                .find(|r| r.resource_id == edge.resource_id)
                .ok_or_else(|| {
                    Error::InconsistentLineage(format!(
                        "child {} of {} has no metadata record",
                        edge.resource_id, resource_id
                    ))
                })?;
            children.push(child.clone());
        }
        Ok(children)
    }
}
