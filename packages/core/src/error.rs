//! Error types for building and querying asset definitions.
//!
//! Every check runs when a definition is constructed, so these errors reach
//! the author of the computation rather than the code that later walks the
//! graph. Each variant names the offending key or port and, where there is
//! one, the set of names that would have been accepted.

use thiserror::Error;

use crate::key::{AssetKey, InvalidKeyError};
use crate::op::PortKind;

/// A definition is internally inconsistent or references names its
/// computation does not declare.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error(
        "input override {name:?} does not correspond to any parameter of {op:?}; \
         parameters are {parameters:?}"
    )]
    UnknownInputOverride {
        op: String,
        name: String,
        parameters: Vec<String>,
    },

    #[error(
        "output override {name:?} does not correspond to any declared output of {op:?}; \
         outputs are {outputs:?}"
    )]
    UnknownOutputOverride {
        op: String,
        name: String,
        outputs: Vec<String>,
    },

    #[error("input {name:?} of {op:?} receives a value but no parameter of that name exists")]
    InputWithoutParameter { op: String, name: String },

    #[error("{op:?} declares {kind} port {name:?} more than once")]
    DuplicateDeclaration {
        op: String,
        kind: PortKind,
        name: String,
    },

    #[error("{kind} keys {first} and {second} of {op:?} both resolve to local port {name:?}")]
    DuplicatePortName {
        op: String,
        kind: PortKind,
        name: String,
        first: AssetKey,
        second: AssetKey,
    },

    #[error("{kind} ports {first:?} and {second:?} of {op:?} both resolve to asset key {key}")]
    DuplicateKey {
        op: String,
        kind: PortKind,
        key: AssetKey,
        first: String,
        second: String,
    },

    #[error("{key} is both an input and an output of {op:?}")]
    KeyIsInputAndOutput { op: String, key: AssetKey },

    #[error("{op:?} must produce at least one asset")]
    NoOutputs { op: String },

    #[error("{op:?} has partition mappings for {inputs:?} but no partitions definition")]
    MappingsWithoutPartitions { op: String, inputs: Vec<String> },

    #[error("partition mapping for {input} does not correspond to any input of {op:?}")]
    MappingForUnknownInput { op: String, input: String },

    #[error("internal dependencies are listed for {key}, which is not an output of {op:?}")]
    DependenciesForUnknownOutput { op: String, key: AssetKey },

    #[error("{key} depends on {dependency}, which is neither an input nor an output of {op:?}")]
    UnknownInternalDependency {
        op: String,
        key: AssetKey,
        dependency: AssetKey,
    },

    #[error("key substitution maps both {first} and {second} of {op:?} to {target}")]
    SubstitutionCollision {
        op: String,
        target: AssetKey,
        first: AssetKey,
        second: AssetKey,
    },

    #[error("invalid partitions definition for {op:?}: {reason}")]
    InvalidPartitions { op: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    InvalidKey(#[from] InvalidKeyError),
}

/// A stored key → port entry references a port the computation does not
/// declare.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "{kind} key {key} maps to port {port:?}, which {op:?} does not declare; \
     declared {kind} ports are {declared:?}"
)]
pub struct InconsistentPortError {
    pub op: String,
    pub kind: PortKind,
    pub key: AssetKey,
    pub port: String,
    pub declared: Vec<String>,
}

/// A single asset key was requested from a definition that produces several.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "tried to retrieve the asset key of {op:?}, which produces multiple asset keys: {}",
    join_keys(.keys)
)]
pub struct AmbiguousKeyError {
    pub op: String,
    pub keys: Vec<AssetKey>,
}

/// A partition mapping was requested from a definition without a
/// partitions definition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{op:?} is not partitioned")]
pub struct NotPartitionedError {
    pub op: String,
}

/// Any error this crate returns.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    InvalidKey(#[from] InvalidKeyError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    InconsistentPort(#[from] InconsistentPortError),

    #[error(transparent)]
    AmbiguousKey(#[from] AmbiguousKeyError),

    #[error(transparent)]
    NotPartitioned(#[from] NotPartitionedError),
}

pub type Result<T> = std::result::Result<T, Error>;

fn join_keys(keys: &[AssetKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
