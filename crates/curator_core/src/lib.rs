//! The asset curator: dependency tracking, transform states and incremental
//! rebuilds over a set of data directories.
//!
//! [`AssetCurator`] scans the data directories, keeps the asset database and
//! dependency graph current as files change, evaluates every asset's
//! [`TransformState`](curator_assets::TransformState) and hands transform
//! work to a bounded pool of workers. Outputs are written per platform
//! profile below the configured output directory, together with one GUID
//! lookup table per data directory.

#![warn(missing_docs)]

pub mod curator;
pub mod dgml;
pub mod error;
pub mod events;
pub mod hashing;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod state;
pub mod tables;

#[cfg(test)]
mod testing;

pub use curator::{AssetCurator, FileEvent, LockedSubAsset, TransformFlags, TransformTicket};
pub use dgml::{dependency_subgraph, DgmlGraph, NodeCategory};
pub use error::CuratorError;
pub use events::{CuratorEvent, EventBus};
pub use hashing::AssetHashes;
pub use registry::{AssetDocumentManager, GenericDocumentManager, ManagerRegistry, TransformContext};
pub use resolver::DataDirResolver;
pub use runner::{serve_worker, TransformRunner};
pub use state::{EvalContext, Refreshed, TransformStateEngine};
