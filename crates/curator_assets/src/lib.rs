//! The asset database and the dependency graph over it.
//!
//! [`AssetDatabase`] owns every [`AssetInfo`] and its [`SubAsset`]s and keeps
//! GUID and path indices for constant-time lookup. [`DependencyGraph`] keeps
//! the declared dependency edges of every asset consistent with its document,
//! remembers references that do not resolve yet, and answers the cycle and
//! missing-dependency queries the transform state engine is built on.

#![warn(missing_docs)]

pub mod asset;
pub mod database;
pub mod document;
pub mod error;
pub mod graph;

pub use asset::{AssetInfo, DependencyKind, SubAsset, TransformState};
pub use database::{AssetDatabase, DependencyDelta, NewAsset, UpsertOutcome};
pub use document::{AssetDocument, DeclaredDependency, ImportSource};
pub use error::DocumentError;
pub use graph::{DependencyGraph, EdgeTarget, Link, MissingReport, ReferenceResolver};
