//! Resource lifecycle orchestration

mod manager;

pub use manager::ResourceManager;
