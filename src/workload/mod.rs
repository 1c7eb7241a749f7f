//! Agent definition discovery and workload construction (C11).

pub mod manager;

pub use manager::{create_workload, discover, DiscoveredDefinition, Workload, WorkloadManagerConfig};
