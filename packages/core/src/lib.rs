//! Software-defined asset definitions.
//!
//! An asset is a named, persisted value (a table, a file, a model) computed
//! by a function from other assets. This crate turns such a function into an
//! [`AssetsDefinition`]: the function wrapped as an op, plus the mapping
//! between the op's local port names and the graph-level [`AssetKey`]s it
//! reads and produces. It is the foundation for the `assetdefs` CLI and for
//! anything that assembles definitions into a dependency graph.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`key`] | [`AssetKey`], the hierarchical asset identifier |
//! | [`op`] | [`ComputeFn`], [`OpDefinition`] and its port descriptors |
//! | [`inference`] | Inferring input and output keys from parameter and output names |
//! | [`definition`] | [`AssetsDefinition`] and key substitution |
//! | [`builder`] | [`AssetBuilder`], [`MultiAssetBuilder`], [`OpAssetsBuilder`] |
//! | [`partition`] | [`PartitionsDefinition`] and [`PartitionMapping`] |
//! | [`validation`] | Cross-checks shared by the above |
//! | [`render`] | Human-readable text rendering of definitions |
//! | [`error`] | Error types |
//!
//! # Quick start
//!
//! ```rust,ignore
//! use assetdefs::{AssetBuilder, AssetIn, DeclaredFn};
//!
//! let f = DeclaredFn::new("total", ["context", "upstream_a", "upstream_b"], |(a, b): (i64, i64)| a + b);
//! let def = AssetBuilder {
//!     ins: [("upstream_a".into(), AssetIn::key("ns/A".parse()?))].into(),
//!     ..Default::default()
//! }
//! .build(f)?;
//!
//! assert_eq!(def.asset_key()?.to_string(), "total");
//! assert_eq!(def.invoke((1, 2)), 3);
//! ```

pub mod builder;
pub mod definition;
pub mod error;
pub mod inference;
pub mod key;
pub mod op;
pub mod partition;
pub mod render;
pub mod validation;

pub use builder::{AssetBuilder, MultiAssetBuilder, OpAssetsBuilder};
pub use definition::AssetsDefinition;
pub use error::{
    AmbiguousKeyError, DefinitionError, Error, InconsistentPortError, NotPartitionedError, Result,
};
pub use inference::{AssetIn, Out};
pub use key::{AssetKey, InvalidKeyError, KeySubstitutions};
pub use op::{ComputeFn, Computation, DeclaredFn, InputDef, OpConfig, OpDefinition, OutputDef, PortKind};
pub use partition::{PartitionMapping, PartitionMappingError, PartitionsDefinition};
pub use render::{render_assets_definition, render_catalog};
