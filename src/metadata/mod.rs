//! Metadata records, lineage graph, and their storage boundary
//!
//! The generation tree is a directed graph on resource identifiers: each
//! record carries adjacency lists of parent and child edges tagged with a
//! role. Edges reference ids, never records, so the graph cannot form
//! ownership cycles.

pub mod store;
pub mod types;

pub use store::{FileMetadataStore, MetadataStore};
pub use types::{
    ChildMatch, GenerationTree, LineageEdge, MetadataObject, NewResource, ResourceFilter,
    ResourceType, UpdateResource,
};
