//! Shared foundational types used across the asset curator.
//!
//! This crate provides content hashes, deterministic sub-asset GUIDs, interned
//! asset keys, batch status values and the internal error type.

#![warn(missing_docs)]

pub mod guid;
pub mod hash;
pub mod ident;
pub mod result;
pub mod status;

pub use guid::{Guid, ParseGuidError};
pub use hash::{ContentHash, HashBuilder};
pub use ident::{AssetKey, PathInterner};
pub use result::{CuratorResult, InternalError};
pub use status::Status;
