//! resource-repo - Metadata-driven resource repository with derived-artifact
//! generation and lineage-based caching
//!
//! The repository stores uploaded artifacts (event logs, process models,
//! images) together with metadata describing each artifact's type,
//! provenance, and relationships to other artifacts, and supports deriving
//! new artifacts (e.g. a histogram from an event log) on demand. Derivations
//! are cached through the lineage graph: a source resource is derived into a
//! given target type at most once, and later requests are served from the
//! existing artifact.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                   DerivationEngine                     │
//! │  validate source → check lineage → compute → persist   │
//! │  (per-(source, derived type) lock, detached commit)    │
//! └───────────────────────────┬────────────────────────────┘
//!                             │
//! ┌───────────────────────────▼────────────────────────────┐
//! │                   ResourceManager                      │
//! │  create / update / fetch resources, listing, children  │
//! └───────────┬───────────────────────────────┬────────────┘
//!             │                               │
//! ┌───────────▼───────────┐      ┌────────────▼────────────┐
//! │      FileStore        │      │      MetadataStore      │
//! │  payload bytes at     │      │  records + lineage      │
//! │  root/type/EXT/id.ext │      │  graph, one JSON file   │
//! │  (atomic swaps)       │      │  per resource           │
//! └───────────────────────┘      └─────────────────────────┘
//! ```
//!
//! The core is invoked in-process by a routing layer that supplies resource
//! ids and raw request bodies; HTTP handling, rate limiting, and multipart
//! parsing live outside this crate.
//!
//! ## Modules
//!
//! - [`resource`]: resource lifecycle orchestration
//! - [`derive`]: derived-artifact producers and the caching engine
//! - [`metadata`]: metadata records, lineage graph, and their store
//! - [`storage`]: payload storage boundary
//! - [`config`]: repository configuration

pub mod config;
pub mod derive;
pub mod error;
pub mod metadata;
pub mod resource;
pub mod storage;

pub use config::RepositoryConfig;
pub use derive::{Derivation, DerivationEngine, DerivedArtifact, HistogramDerivation};
pub use error::{Error, Result};
pub use metadata::{
    FileMetadataStore, GenerationTree, LineageEdge, MetadataObject, MetadataStore, NewResource,
    ResourceFilter, ResourceType, UpdateResource,
};
pub use resource::ResourceManager;
pub use storage::{FileStore, LocalFileStore};
