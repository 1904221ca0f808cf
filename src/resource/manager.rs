//! Resource orchestration over the file and metadata stores

use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::metadata::{
    FileMetadataStore, MetadataObject, MetadataStore, NewResource, ResourceFilter, ResourceType,
    UpdateResource,
};
use crate::metadata::types::now_millis;
use crate::storage::{FileStore, LocalFileStore};
use std::sync::Arc;
use uuid::Uuid;

/// Orchestrates resource creation, update, and retrieval, combining the
/// payload store and the metadata store and enforcing the id and path
/// conventions. Stores are injected at construction so the manager can be
/// exercised against in-memory fakes.
pub struct ResourceManager {
    files: Arc<dyn FileStore>,
    metadata: Arc<dyn MetadataStore>,
}

impl ResourceManager {
    /// Create a manager over the given stores
    pub fn new(files: Arc<dyn FileStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { files, metadata }
    }

    /// Open a manager over local on-disk stores described by the config
    pub async fn open(config: &RepositoryConfig) -> Result<Self> {
        let files = Arc::new(LocalFileStore::new(config.resources_dir.clone()));
        let metadata = Arc::new(FileMetadataStore::new(config.metadata_dir.clone()).await?);
        Ok(Self::new(files, metadata))
    }

    /// The payload storage boundary
    pub fn files(&self) -> &Arc<dyn FileStore> {
        &self.files
    }

    /// The metadata storage boundary
    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Register a new resource: allocate an id, write the payload at its
    /// deterministic path, write the metadata record, and link any parent
    /// edges. Returns the new resource id.
    pub async fn create_resource(&self, new: NewResource, payload: &[u8]) -> Result<String> {
        if payload.is_empty() {
            return Err(Error::InvalidInput("payload must not be empty".to_string()));
        }
        Self::validate_fields(&new)?;
        self.validate_parents(&new).await?;

        let resource_id = Uuid::new_v4().to_string();
        self.files
            .store(&resource_id, &new.file_type, &new.file_extension, payload)
            .await?;
        self.register(&resource_id, new).await
    }

    /// Register a metadata record whose payload arrives later via
    /// `update_resource`
    pub async fn create_metadata(&self, new: NewResource) -> Result<String> {
        Self::validate_fields(&new)?;
        self.validate_parents(&new).await?;

        let resource_id = Uuid::new_v4().to_string();
        self.register(&resource_id, new).await
    }

    /// Update a resource's payload and/or mutable metadata fields. The
    /// payload is staged first and swapped in only after the record update
    /// is durable, so a failure in between changes nothing observable.
    pub async fn update_resource(&self, resource_id: &str, update: UpdateResource) -> Result<()> {
        let mut record = self.require(resource_id).await?;
        let file_type = record.file_type.clone();
        let file_extension = record.file_extension.clone();

        let staged = match &update.payload {
            Some(payload) => {
                if payload.is_empty() {
                    return Err(Error::InvalidInput("payload must not be empty".to_string()));
                }
                Some(
                    self.files
                        .stage(resource_id, &file_type, &file_extension, payload)
                        .await?,
                )
            }
            None => None,
        };

        if let Some(label) = update.resource_label {
            record.resource_label = label;
        }
        if let Some(description) = update.description {
            record.description = description;
        }
        record.updated_at = now_millis();

        if let Err(e) = self.metadata.put(record).await {
            if let Some(token) = staged {
                let _ = self
                    .files
                    .discard(resource_id, &file_type, &file_extension, &token)
                    .await;
            }
            return Err(e);
        }

        if let Some(token) = staged {
            self.files
                .publish(resource_id, &file_type, &file_extension, &token)
                .await?;
        }

        tracing::info!("Updated resource {}", resource_id);
        Ok(())
    }

    /// Fetch a resource's payload. Unknown id is `NotFound`; a record whose
    /// payload file is missing is `Corruption`, reported rather than healed.
    pub async fn get_resource(&self, resource_id: &str) -> Result<Vec<u8>> {
        let record = self.require(resource_id).await?;

        if !self
            .files
            .exists(resource_id, &record.file_type, &record.file_extension)
            .await?
        {
            return Err(Error::Corruption(format!(
                "metadata for {} exists but its payload file is missing",
                resource_id
            )));
        }
        self.files
            .load(resource_id, &record.file_type, &record.file_extension)
            .await
    }

    /// Fetch a resource's metadata record
    pub async fn get_metadata(&self, resource_id: &str) -> Result<MetadataObject> {
        self.require(resource_id).await
    }

    /// Metadata records passing the filter, in insertion order
    pub async fn list_metadata(&self, filter: &ResourceFilter) -> Result<Vec<MetadataObject>> {
        self.metadata.scan(filter).await
    }

    /// All event log records
    pub async fn list_event_logs(&self) -> Result<Vec<MetadataObject>> {
        self.list_by_type(ResourceType::EventLog).await
    }

    /// All visualization records (histograms and images)
    pub async fn list_visualizations(&self) -> Result<Vec<MetadataObject>> {
        let mut out = self.list_by_type(ResourceType::Histogram).await?;
        out.extend(self.list_by_type(ResourceType::Image).await?);
        Ok(out)
    }

    /// Metadata for the direct children of a resource
    pub async fn children(&self, resource_id: &str) -> Result<Vec<MetadataObject>> {
        self.metadata.children_of(resource_id).await
    }

    async fn list_by_type(&self, resource_type: ResourceType) -> Result<Vec<MetadataObject>> {
        self.metadata
            .scan(&ResourceFilter {
                resource_type: Some(resource_type),
                label_contains: None,
            })
            .await
    }

    async fn require(&self, resource_id: &str) -> Result<MetadataObject> {
        self.metadata
            .get(resource_id)
            .await?
            .ok_or_else(|| Error::NotFound(resource_id.to_string()))
    }

    fn validate_fields(new: &NewResource) -> Result<()> {
        if new.resource_label.trim().is_empty() {
            return Err(Error::InvalidInput("resourceLabel is required".to_string()));
        }
        if new.file_type.trim().is_empty() || new.file_extension.trim().is_empty() {
            return Err(Error::InvalidInput(
                "fileType and fileExtension are required".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject unknown parent ids before anything is written
    async fn validate_parents(&self, new: &NewResource) -> Result<()> {
        for edge in &new.parents {
            if self.metadata.get(&edge.resource_id).await?.is_none() {
                return Err(Error::NotFound(format!("parent {}", edge.resource_id)));
            }
        }
        Ok(())
    }

    async fn register(&self, resource_id: &str, new: NewResource) -> Result<String> {
        let now = now_millis();
        let record = MetadataObject {
            resource_id: resource_id.to_string(),
            resource_label: new.resource_label,
            description: new.description,
            resource_type: new.resource_type,
            file_type: new.file_type,
            file_extension: new.file_extension,
            origin_url: new.origin_url,
            created_at: now,
            updated_at: now,
            generation_tree: Default::default(),
        };
        self.metadata.put(record).await?;

        for edge in &new.parents {
            self.metadata
                .add_edge(&edge.resource_id, resource_id, &edge.used_as)
                .await?;
        }

        tracing::info!(
            "Registered {} resource {}",
            new.resource_type,
            resource_id
        );
        Ok(resource_id.to_string())
    }
}
