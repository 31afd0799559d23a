//! Partitioning schemes and partition mappings between adjacent assets.
//!
//! A [`PartitionsDefinition`] describes how an asset's output is split into
//! addressable partitions. A [`PartitionMapping`] translates a partition key
//! of a downstream asset into the set of partition keys of one of its
//! upstream assets. Every scheme names a default mapping
//! ([`PartitionsDefinition::default_partition_mapping`]) that applies to any
//! dependency without an explicit one.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `strftime` format of daily partition keys, e.g. `2026-02-18`.
pub const DAILY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Errors returned when evaluating a [`PartitionMapping`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionMappingError {
    #[error("partition {key:?} does not exist in the downstream partitions definition")]
    UnknownDownstreamPartition { key: String },

    #[error("partition {key:?} does not exist in the upstream partitions definition")]
    MissingUpstreamPartition { key: String },
}

/// How an asset's output is subdivided into partitions.
///
/// Serialises externally tagged:
///
/// ```json
/// { "static": ["eu", "us"] }
/// { "daily": { "start": "2026-01-01", "end": "2026-02-01" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionsDefinition {
    /// A fixed, ordered list of partition keys.
    Static(Vec<String>),
    /// One partition per calendar day in `[start, end)`.
    Daily { start: NaiveDate, end: NaiveDate },
}

impl PartitionsDefinition {
    /// Every partition key of the scheme, in order.
    pub fn partition_keys(&self) -> Vec<String> {
        match self {
            PartitionsDefinition::Static(keys) => keys.clone(),
            PartitionsDefinition::Daily { start, end } => start
                .iter_days()
                .take_while(|day| day < end)
                .map(|day| day.format(DAILY_KEY_FORMAT).to_string())
                .collect(),
        }
    }

    /// Whether `key` names a partition of this scheme.
    pub fn has_partition_key(&self, key: &str) -> bool {
        match self {
            PartitionsDefinition::Static(keys) => keys.iter().any(|k| k == key),
            PartitionsDefinition::Daily { start, end } => {
                match NaiveDate::parse_from_str(key, DAILY_KEY_FORMAT) {
                    // Reject non-canonical spellings such as `2026-2-1`.
                    Ok(day) => {
                        day >= *start
                            && day < *end
                            && day.format(DAILY_KEY_FORMAT).to_string() == key
                    }
                    Err(_) => false,
                }
            }
        }
    }

    /// The last partition key of the scheme, if it has any.
    pub fn last_partition_key(&self) -> Option<String> {
        match self {
            PartitionsDefinition::Static(keys) => keys.last().cloned(),
            PartitionsDefinition::Daily { start, end } => end
                .pred_opt()
                .filter(|last| last >= start)
                .map(|last| last.format(DAILY_KEY_FORMAT).to_string()),
        }
    }

    /// The mapping used for dependencies that do not name one explicitly.
    ///
    /// Both schemes map a partition to the identically-keyed upstream
    /// partition.
    pub fn default_partition_mapping(&self) -> PartitionMapping {
        match self {
            PartitionsDefinition::Static(_) => PartitionMapping::Identity,
            PartitionsDefinition::Daily { .. } => PartitionMapping::Identity,
        }
    }

    /// Structural checks: static keys are non-empty and unique, daily ranges
    /// are non-empty.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            PartitionsDefinition::Static(keys) => {
                let mut seen = BTreeSet::new();
                for key in keys {
                    if key.is_empty() {
                        return Err("static partition keys must not be empty".into());
                    }
                    if !seen.insert(key.as_str()) {
                        return Err(format!("static partition key {key:?} is listed twice"));
                    }
                }
                Ok(())
            }
            PartitionsDefinition::Daily { start, end } => {
                if start >= end {
                    Err(format!("daily partitions must start before they end ({start} >= {end})"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Formats the scheme as a short summary, e.g. `static (2 partitions)`.
impl fmt::Display for PartitionsDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionsDefinition::Static(keys) => write!(
                f,
                "static ({} partition{})",
                keys.len(),
                if keys.len() == 1 { "" } else { "s" }
            ),
            PartitionsDefinition::Daily { start, end } => write!(f, "daily {start}..{end}"),
        }
    }
}

/// Translates a downstream partition key into upstream partition keys.
///
/// Mappings are plain values: they carry no state and evaluating one has no
/// side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionMapping {
    /// Partition `k` depends on upstream partition `k`.
    #[default]
    Identity,
    /// Every partition depends on every upstream partition.
    AllPartitions,
    /// Every partition depends on the latest upstream partition.
    LastPartition,
    /// An explicit table, downstream key → upstream keys. Keys absent from
    /// the table depend on nothing upstream.
    Explicit(BTreeMap<String, BTreeSet<String>>),
}

impl PartitionMapping {
    /// The upstream partitions that `downstream_partition` depends on.
    ///
    /// # Errors
    ///
    /// - [`PartitionMappingError::UnknownDownstreamPartition`] if
    ///   `downstream_partition` is not a key of `downstream`.
    /// - [`PartitionMappingError::MissingUpstreamPartition`] if the mapping
    ///   resolves to a key that `upstream` does not have.
    pub fn upstream_partitions_for(
        &self,
        downstream_partition: &str,
        downstream: &PartitionsDefinition,
        upstream: &PartitionsDefinition,
    ) -> Result<BTreeSet<String>, PartitionMappingError> {
        if !downstream.has_partition_key(downstream_partition) {
            return Err(PartitionMappingError::UnknownDownstreamPartition {
                key: downstream_partition.to_string(),
            });
        }

        let keys: BTreeSet<String> = match self {
            PartitionMapping::Identity => BTreeSet::from([downstream_partition.to_string()]),
            PartitionMapping::AllPartitions => upstream.partition_keys().into_iter().collect(),
            PartitionMapping::LastPartition => upstream.last_partition_key().into_iter().collect(),
            PartitionMapping::Explicit(table) => {
                table.get(downstream_partition).cloned().unwrap_or_default()
            }
        };

        if let Some(missing) = keys.iter().find(|k| !upstream.has_partition_key(k)) {
            return Err(PartitionMappingError::MissingUpstreamPartition {
                key: missing.clone(),
            });
        }
        Ok(keys)
    }
}

/// Formats the mapping as its snake_case name (e.g. `all_partitions`).
impl fmt::Display for PartitionMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionMapping::Identity => write!(f, "identity"),
            PartitionMapping::AllPartitions => write!(f, "all_partitions"),
            PartitionMapping::LastPartition => write!(f, "last_partition"),
            PartitionMapping::Explicit(table) => write!(f, "explicit ({} entries)", table.len()),
        }
    }
}

// --- tests -------------------------------------------------------------------
