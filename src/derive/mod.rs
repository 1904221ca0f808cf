//! Derived-artifact generation with lineage-based caching
//!
//! A derivation request walks a fixed sequence: validate the source resource,
//! check its lineage for an already-derived child of the target type, and
//! either serve that child or compute, persist, and link a new one. The
//! central guarantee is that a given source is derived into a given target
//! type at most once under normal operation; later requests are served from
//! the cached artifact.

pub mod histogram;

pub use histogram::HistogramDerivation;

use crate::error::{Error, Result};
use crate::metadata::{LineageEdge, MetadataObject, NewResource, ResourceType};
use crate::resource::ResourceManager;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A type-specific derived-artifact producer.
///
/// Implementations are pure with respect to the repository: `compute` maps a
/// source payload to the derived payload and the engine handles validation,
/// caching, persistence, and lineage.
pub trait Derivation: Send + Sync + 'static {
    /// Resource type the source must have
    fn input_type(&self) -> ResourceType;

    /// Resource type of the derived artifact
    fn output_type(&self) -> ResourceType;

    /// Role tag recorded on the lineage edge from source to derived artifact
    fn role(&self) -> &str;

    /// File type segment for the derived payload's storage path
    fn file_type(&self) -> &str;

    /// File extension of the derived payload
    fn file_extension(&self) -> &str;

    /// Label for the derived metadata record
    fn derived_label(&self, source: &MetadataObject) -> String;

    /// Description for the derived metadata record
    fn derived_description(&self, source: &MetadataObject) -> String;

    /// Produce the derived payload. Must be deterministic for a given input.
    fn compute(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Result of a derivation request
#[derive(Debug, Clone)]
pub struct DerivedArtifact {
    /// Id of the derived resource
    pub resource_id: String,
    /// Canonical payload of the derived resource
    pub payload: Vec<u8>,
    /// Whether an existing artifact was served instead of recomputing
    pub cache_hit: bool,
}

type DerivationKey = (String, ResourceType);

/// Runs derivations against the repository, serializing requests per
/// (source id, derived type) pair
#[derive(Clone)]
pub struct DerivationEngine {
    manager: Arc<ResourceManager>,
    locks: Arc<Mutex<HashMap<DerivationKey, Arc<Mutex<()>>>>>,
}

impl DerivationEngine {
    /// Create an engine over the given resource manager
    pub fn new(manager: Arc<ResourceManager>) -> Self {
        Self {
            manager,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Derive an artifact of `derivation`'s output type from the given
    /// source resource, returning the cached artifact when one exists.
    ///
    /// Requests racing on the same (source, type) pair are serialized on a
    /// per-key lock: one computation proceeds and the rest observe its
    /// result. The locked section runs in a detached task, so a caller that
    /// abandons its request mid-computation neither blocks other waiters nor
    /// leaves a half-committed artifact behind.
    pub async fn derive(
        &self,
        source_id: &str,
        derivation: Arc<dyn Derivation>,
    ) -> Result<DerivedArtifact> {
        let key = (source_id.to_string(), derivation.output_type());
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };

        let engine = self.clone();
        let source_id = source_id.to_string();
        let handle = tokio::spawn(async move {
            let result = {
                let _guard = lock.lock().await;
                engine.derive_locked(&source_id, derivation.as_ref()).await
            };
            engine.release_lock(&key, &lock).await;
            result
        });
        handle
            .await
            .map_err(|e| Error::Internal(format!("derivation task failed: {}", e)))?
    }

    /// Drop the per-key lock entry once no other request holds it, so the
    /// map does not grow with every distinct key ever derived. Clones are
    /// only handed out under the map lock, so a count of two (the map plus
    /// this request) means nobody else is waiting.
    async fn release_lock(&self, key: &DerivationKey, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if let Some(entry) = locks.get(key) {
            if Arc::ptr_eq(entry, lock) && Arc::strong_count(lock) == 2 {
                locks.remove(key);
            }
        }
    }

    async fn derive_locked(
        &self,
        source_id: &str,
        derivation: &dyn Derivation,
    ) -> Result<DerivedArtifact> {
        let source = self.validate_source(source_id, derivation).await?;

        if let Some(cached) = self.check_lineage(&source, derivation).await? {
            return Ok(cached);
        }

        tracing::info!(
            "No {} exists for {}, generating a new one",
            derivation.output_type(),
            source_id
        );
        let source_payload = self.manager.get_resource(source_id).await?;
        let payload = derivation.compute(&source_payload)?;

        // create_resource persists the payload, the record, and the lineage
        // edge back to the source; a failure there surfaces to the caller
        // rather than leaving a silently half-linked artifact
        let resource_id = self
            .manager
            .create_resource(
                NewResource {
                    resource_label: derivation.derived_label(&source),
                    description: derivation.derived_description(&source),
                    resource_type: derivation.output_type(),
                    file_type: derivation.file_type().to_string(),
                    file_extension: derivation.file_extension().to_string(),
                    origin_url: source.origin_url.clone(),
                    parents: vec![LineageEdge::new(source_id, derivation.role())],
                },
                &payload,
            )
            .await?;

        Ok(DerivedArtifact {
            resource_id,
            payload,
            cache_hit: false,
        })
    }

    /// The source must exist, have the derivation's input type, and still
    /// have its payload on disk
    async fn validate_source(
        &self,
        source_id: &str,
        derivation: &dyn Derivation,
    ) -> Result<MetadataObject> {
        let source = match self.manager.get_metadata(source_id).await {
            Ok(record) => record,
            Err(Error::NotFound(_)) => {
                return Err(Error::InvalidSource(format!(
                    "no resource with id {}",
                    source_id
                )))
            }
            Err(e) => return Err(e),
        };

        if source.resource_type != derivation.input_type() {
            return Err(Error::InvalidSource(format!(
                "resource {} has type {}, expected {}",
                source_id,
                source.resource_type,
                derivation.input_type()
            )));
        }

        if !self
            .manager
            .files()
            .exists(source_id, &source.file_type, &source.file_extension)
            .await?
        {
            return Err(Error::InvalidSource(format!(
                "payload file for {} is missing",
                source_id
            )));
        }

        Ok(source)
    }

    /// Serve an already-derived child when the lineage has one. Duplicate
    /// qualifying children or a recorded child without a payload are
    /// surfaced as anomalies; regenerating here would create a second
    /// resource in the same logical role.
    async fn check_lineage(
        &self,
        source: &MetadataObject,
        derivation: &dyn Derivation,
    ) -> Result<Option<DerivedArtifact>> {
        let target = derivation.output_type();
        let Some(found) = self
            .manager
            .metadata()
            .find_child_of_type(&source.resource_id, target)
            .await?
        else {
            return Ok(None);
        };

        if !found.duplicates.is_empty() {
            tracing::warn!(
                "Resource {} has multiple {} children: {} plus {:?}",
                source.resource_id,
                target,
                found.resource_id,
                found.duplicates
            );
            return Err(Error::InconsistentLineage(format!(
                "resource {} has multiple {} children: {}, {}",
                source.resource_id,
                target,
                found.resource_id,
                found.duplicates.join(", ")
            )));
        }

        let child = self.manager.get_metadata(&found.resource_id).await?;
        if !self
            .manager
            .files()
            .exists(&child.resource_id, &child.file_type, &child.file_extension)
            .await?
        {
            tracing::warn!(
                "Resource {} has recorded {} child {} whose payload is missing",
                source.resource_id,
                target,
                child.resource_id
            );
            return Err(Error::InconsistentLineage(format!(
                "derived {} child {} of {} is recorded but its payload is missing",
                target, child.resource_id, source.resource_id
            )));
        }

        tracing::info!(
            "{} already exists for {}, returning it",
            target,
            source.resource_id
        );
        let payload = self.manager.get_resource(&child.resource_id).await?;
        Ok(Some(DerivedArtifact {
            resource_id: child.resource_id,
            payload,
            cache_hit: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use crate::metadata::{NewResource, ResourceFilter};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts compute invocations, delegating everything to the inner
    /// derivation
    struct CountingDerivation {
        inner: HistogramDerivation,
        calls: Arc<AtomicUsize>,
    }

    impl Derivation for CountingDerivation {
        fn input_type(&self) -> ResourceType {
            self.inner.input_type()
        }
        fn output_type(&self) -> ResourceType {
            self.inner.output_type()
        }
        fn role(&self) -> &str {
            self.inner.role()
        }
        fn file_type(&self) -> &str {
            self.inner.file_type()
        }
        fn file_extension(&self) -> &str {
            self.inner.file_extension()
        }
        fn derived_label(&self, source: &MetadataObject) -> String {
            self.inner.derived_label(source)
        }
        fn derived_description(&self, source: &MetadataObject) -> String {
            self.inner.derived_description(source)
        }
        fn compute(&self, payload: &[u8]) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.compute(payload)
        }
    }

    async fn make_engine() -> (DerivationEngine, Arc<ResourceManager>, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = RepositoryConfig::at(dir.path());
        let manager = Arc::new(ResourceManager::open(&config).await.unwrap());
        (DerivationEngine::new(manager.clone()), manager, dir)
    }

    /// XES document with one single-event trace per name
    fn xes_log(names: &[&str]) -> Vec<u8> {
        let mut doc = String::from("<log>");
        for name in names {
            doc.push_str(&format!(
                "<trace><event><string key=\"concept:name\" value=\"{}\"/></event></trace>",
                name
            ));
        }
        doc.push_str("</log>");
        doc.into_bytes()
    }

    fn event_log(label: &str) -> NewResource {
        NewResource {
            resource_label: label.to_string(),
            description: String::new(),
            resource_type: ResourceType::EventLog,
            file_type: "eventlog".to_string(),
            file_extension: "xes".to_string(),
            origin_url: "http://localhost:4000/resources/".to_string(),
            parents: vec![],
        }
    }

    async fn create_log(manager: &ResourceManager, names: &[&str]) -> String {
        manager
            .create_resource(event_log("test log"), &xes_log(names))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_derivation_scenario() {
        let (engine, manager, _dir) = make_engine().await;
        let log_id = create_log(&manager, &["A", "B", "A"]).await;

        let artifact = engine
            .derive(&log_id, Arc::new(HistogramDerivation))
            .await
            .unwrap();

        assert!(!artifact.cache_hit);
        let tally: Vec<(String, u64)> = serde_json::from_slice(&artifact.payload).unwrap();
        assert_eq!(tally, vec![("A".to_string(), 2), ("B".to_string(), 1)]);

        // Lineage edge L -> H with role "Log", symmetric on both sides
        let log = manager.get_metadata(&log_id).await.unwrap();
        assert_eq!(log.generation_tree.children.len(), 1);
        assert_eq!(log.generation_tree.children[0].resource_id, artifact.resource_id);
        assert_eq!(log.generation_tree.children[0].used_as, "Log");

        let hist = manager.get_metadata(&artifact.resource_id).await.unwrap();
        assert_eq!(hist.resource_type, ResourceType::Histogram);
        assert_eq!(hist.generation_tree.parents[0].resource_id, log_id);

        // Re-requesting returns the existing artifact, not a new one
        let again = engine
            .derive(&log_id, Arc::new(HistogramDerivation))
            .await
            .unwrap();
        assert!(again.cache_hit);
        assert_eq!(again.resource_id, artifact.resource_id);
        assert_eq!(again.payload, artifact.payload);

        let histograms = manager
            .list_metadata(&ResourceFilter {
                resource_type: Some(ResourceType::Histogram),
                label_contains: None,
            })
            .await
            .unwrap();
        assert_eq!(histograms.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_source_is_invalid_source() {
        let (engine, _manager, _dir) = make_engine().await;
        let err = engine
            .derive("ghost", Arc::new(HistogramDerivation))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSource(_)));
    }

    #[tokio::test]
    async fn test_wrong_source_type_is_invalid_source() {
        let (engine, manager, _dir) = make_engine().await;

        let image_id = manager
            .create_resource(
                NewResource {
                    resource_label: "diagram".to_string(),
                    description: String::new(),
                    resource_type: ResourceType::Image,
                    file_type: "image".to_string(),
                    file_extension: "png".to_string(),
                    origin_url: String::new(),
                    parents: vec![],
                },
                b"png-bytes",
            )
            .await
            .unwrap();

        let err = engine
            .derive(&image_id, Arc::new(HistogramDerivation))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSource(_)));
    }

    #[tokio::test]
    async fn test_missing_source_payload_is_invalid_source() {
        let (engine, manager, dir) = make_engine().await;
        let log_id = create_log(&manager, &["A"]).await;

        std::fs::remove_file(
            dir.path()
                .join("eventlog")
                .join("XES")
                .join(format!("{}.xes", log_id)),
        )
        .unwrap();

        let err = engine
            .derive(&log_id, Arc::new(HistogramDerivation))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSource(_)));
    }

    #[tokio::test]
    async fn test_recorded_child_without_payload_is_inconsistent_lineage() {
        let (engine, manager, dir) = make_engine().await;
        let log_id = create_log(&manager, &["A"]).await;

        let artifact = engine
            .derive(&log_id, Arc::new(HistogramDerivation))
            .await
            .unwrap();

        // Lose the derived payload behind the repository's back
        std::fs::remove_file(
            dir.path()
                .join("json")
                .join("JSON")
                .join(format!("{}.json", artifact.resource_id)),
        )
        .unwrap();

        // Must surface the fault, not silently regenerate a second child
        let err = engine
            .derive(&log_id, Arc::new(HistogramDerivation))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentLineage(_)));

        let log = manager.get_metadata(&log_id).await.unwrap();
        assert_eq!(log.generation_tree.children.len(), 1, "no second child created");
    }

    #[tokio::test]
    async fn test_duplicate_children_are_an_anomaly() {
        let (engine, manager, _dir) = make_engine().await;
        let log_id = create_log(&manager, &["A"]).await;

        // Two histogram children registered out of band
        for _ in 0..2 {
            manager
                .create_resource(
                    NewResource {
                        resource_label: "stray histogram".to_string(),
                        description: String::new(),
                        resource_type: ResourceType::Histogram,
                        file_type: "json".to_string(),
                        file_extension: "json".to_string(),
                        origin_url: String::new(),
                        parents: vec![LineageEdge::new(log_id.clone(), "Log")],
                    },
                    b"[]",
                )
                .await
                .unwrap();
        }

        let err = engine
            .derive(&log_id, Arc::new(HistogramDerivation))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentLineage(_)));
    }

    #[tokio::test]
    async fn test_malformed_source_is_computation_error() {
        let (engine, manager, _dir) = make_engine().await;
        let log_id = manager
            .create_resource(event_log("broken"), b"<log><trace>")
            .await
            .unwrap();

        let err = engine
            .derive(&log_id, Arc::new(HistogramDerivation))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Computation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_requests_compute_once() {
        let (engine, manager, _dir) = make_engine().await;
        let log_id = create_log(&manager, &["A", "B"]).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let derivation: Arc<dyn Derivation> = Arc::new(CountingDerivation {
            inner: HistogramDerivation,
            calls: calls.clone(),
        });

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let log_id = log_id.clone();
            let derivation = derivation.clone();
            handles.push(tokio::spawn(async move {
                engine.derive(&log_id, derivation).await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().resource_id);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one computation ran");
        assert!(ids.windows(2).all(|w| w[0] == w[1]), "all callers got the same id");

        let log = manager.get_metadata(&log_id).await.unwrap();
        assert_eq!(log.generation_tree.children.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_entries_released_after_requests_settle() {
        let (engine, manager, _dir) = make_engine().await;
        let log_a = create_log(&manager, &["A"]).await;
        let log_b = create_log(&manager, &["B"]).await;

        let mut handles = Vec::new();
        for log_id in [&log_a, &log_a, &log_a, &log_b] {
            let engine = engine.clone();
            let log_id = log_id.clone();
            handles.push(tokio::spawn(async move {
                engine.derive(&log_id, Arc::new(HistogramDerivation)).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Every request has settled, so no key is left in the lock map
        assert!(engine.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_request_still_commits() {
        let (engine, manager, _dir) = make_engine().await;
        let log_id = create_log(&manager, &["A"]).await;

        // Abandon the request after its first poll; the locked section runs
        // in a detached task and must finish on its own
        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(0),
            engine.derive(&log_id, Arc::new(HistogramDerivation)),
        )
        .await;
        assert!(abandoned.is_err(), "request was cancelled");

        // Wait for the detached commit, then confirm the artifact landed and
        // the per-key lock was released
        let mut children = Vec::new();
        for _ in 0..100 {
            children = manager.children(&log_id).await.unwrap();
            if !children.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(children.len(), 1);

        let artifact = engine
            .derive(&log_id, Arc::new(HistogramDerivation))
            .await
            .unwrap();
        assert!(artifact.cache_hit);
        assert_eq!(artifact.resource_id, children[0].resource_id);
    }
}
