//! JSON asset manifests.
//!
//! A manifest describes functions by name and signature only, so the CLI can
//! check and inspect asset definitions without any function bodies:
//!
//! ```json
//! [
//!   { "name": "orders", "namespace": ["warehouse"], "params": ["context", "raw_orders"],
//!     "partitions": { "static": ["eu", "us"] } },
//!   { "name": "split", "params": ["orders"],
//!     "ins": { "orders": { "key": ["warehouse", "orders"] } },
//!     "outs": { "eu": { "key": ["orders", "eu"] }, "us": {} } }
//! ]
//! ```
//!
//! An entry with `outs` is a multi-asset; without, a single asset.

use std::collections::{BTreeMap, BTreeSet};

use assetdefs::{
    AssetBuilder, AssetIn, AssetKey, AssetsDefinition, ComputeFn, DefinitionError, Error,
    KeySubstitutions, MultiAssetBuilder, OpDefinition, Out, PartitionMapping,
    PartitionsDefinition,
};
use serde::{Deserialize, Serialize};

pub type ManifestAsset = AssetsDefinition<OpDefinition<ManifestFn>>;

/// One function declared in a manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(default)]
    pub namespace: Vec<String>,
    #[serde(default)]
    pub params: Vec<String>,
    pub outs: Option<BTreeMap<String, Out>>,
    #[serde(default)]
    pub ins: BTreeMap<String, AssetIn>,
    #[serde(default)]
    pub non_argument_deps: BTreeSet<AssetKey>,
    pub partitions: Option<PartitionsDefinition>,
    #[serde(default)]
    pub partition_mappings: BTreeMap<String, PartitionMapping>,
    pub description: Option<String>,
    pub compute_kind: Option<String>,
    pub io_manager_key: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Output key (`/`-joined) → the keys it depends on. Multi-assets only.
    #[serde(default)]
    pub internal_asset_deps: BTreeMap<String, BTreeSet<AssetKey>>,
}

/// A signature-only function: the names a manifest entry declares.
#[derive(Debug, Clone)]
pub struct ManifestFn {
    name: String,
    parameters: Vec<String>,
    outputs: Vec<String>,
}

impl ComputeFn for ManifestFn {
    type Args = ();
    type Output = ();

    fn name(&self) -> &str {
        &self.name
    }

    fn declared_parameters(&self) -> &[String] {
        &self.parameters
    }

    fn declared_outputs(&self) -> &[String] {
        &self.outputs
    }

    fn call(&self, _args: ()) {}
}

impl ManifestEntry {
    /// Build the definition this entry describes.
    pub fn build(&self) -> Result<ManifestAsset, Error> {
        let Some(outs) = &self.outs else {
            let f = ManifestFn {
                name: self.name.clone(),
                parameters: self.params.clone(),
                outputs: vec![assetdefs::op::DEFAULT_OUTPUT.to_string()],
            };
            if !self.internal_asset_deps.is_empty() {
                return Err(self.multi_only("internal_asset_deps"));
            }
            return AssetBuilder {
                namespace: self.namespace.clone(),
                ins: self.ins.clone(),
                non_argument_deps: self.non_argument_deps.clone(),
                metadata: self.metadata.clone(),
                description: self.description.clone(),
                io_manager_key: self.io_manager_key.clone(),
                compute_kind: self.compute_kind.clone(),
                partitions_def: self.partitions.clone(),
                partition_mappings: self.partition_mappings.clone(),
                ..Default::default()
            }
            .build(f);
        };

        for (field, set) in [
            ("namespace", !self.namespace.is_empty()),
            ("partitions", self.partitions.is_some()),
            ("partition_mappings", !self.partition_mappings.is_empty()),
            ("io_manager_key", self.io_manager_key.is_some()),
            ("metadata", !self.metadata.is_empty()),
        ] {
            if set {
                return Err(self.single_only(field));
            }
        }

        let internal_asset_deps = self
            .internal_asset_deps
            .iter()
            .map(|(key, deps)| -> Result<(AssetKey, BTreeSet<AssetKey>), Error> {
                Ok((key.parse()?, deps.clone()))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let f = ManifestFn {
            name: self.name.clone(),
            parameters: self.params.clone(),
            outputs: outs.keys().cloned().collect(),
        };
        MultiAssetBuilder {
            outs: outs.clone(),
            ins: self.ins.clone(),
            non_argument_deps: self.non_argument_deps.clone(),
            description: self.description.clone(),
            compute_kind: self.compute_kind.clone(),
            internal_asset_deps,
            ..Default::default()
        }
        .build(f)
    }

    fn single_only(&self, field: &str) -> Error {
        DefinitionError::InvalidConfig(format!(
            "{:?}: `{field}` applies to single assets only; remove it or drop `outs`",
            self.name
        ))
        .into()
    }

    fn multi_only(&self, field: &str) -> Error {
        DefinitionError::InvalidConfig(format!(
            "{:?}: `{field}` applies to multi-assets only; declare `outs` to use it",
            self.name
        ))
        .into()
    }
}

/// Parse a manifest: an array of entries, or a single entry object.
pub fn parse_manifest(json: &str) -> Result<Vec<ManifestEntry>, serde_json::Error> {
    match serde_json::from_str::<Vec<ManifestEntry>>(json) {
        Ok(entries) => Ok(entries),
        Err(array_err) => match serde_json::from_str::<ManifestEntry>(json) {
            Ok(entry) => Ok(vec![entry]),
            // Report the array error for array input, the object error otherwise.
            Err(object_err) if json.trim_start().starts_with('{') => Err(object_err),
            Err(_) => Err(array_err),
        },
    }
}

/// Output keys produced by more than one definition, with the producing ops.
pub fn duplicate_outputs(defs: &[&ManifestAsset]) -> BTreeMap<AssetKey, Vec<String>> {
    let mut producers: BTreeMap<AssetKey, Vec<String>> = BTreeMap::new();
    for def in defs {
        for key in def.asset_keys() {
            producers
                .entry(key.clone())
                .or_default()
                .push(def.op().name().to_string());
        }
    }
    producers.retain(|_, ops| ops.len() > 1);
    producers
}

/// Prefix every key produced by `defs`, both where it is produced and where
/// another definition in `defs` reads it. Keys read from outside `defs` are
/// left alone.
pub fn prefix_produced_keys(defs: &[ManifestAsset], prefix: &[String]) -> Result<Vec<ManifestAsset>, Error> {
    let mut substitutions = KeySubstitutions::new();
    for def in defs {
        for key in def.asset_keys() {
            substitutions.insert(key.clone(), key.with_prefix(prefix.iter().cloned())?);
        }
    }
    tracing::debug!(keys = substitutions.len(), "prefixing produced keys");

    defs.iter()
        .map(|def| def.with_substituted_keys(&substitutions, &substitutions))
        .collect()
}

/// Serializable view of a definition's keys.
#[derive(Debug, Serialize)]
pub struct DefinitionSummary {
    pub op: String,
    pub outputs: BTreeMap<String, AssetKey>,
    pub inputs: BTreeMap<String, AssetKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitions: Option<PartitionsDefinition>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub partition_mappings: BTreeMap<String, PartitionMapping>,
    pub asset_deps: BTreeMap<String, BTreeSet<AssetKey>>,
}

impl From<&ManifestAsset> for DefinitionSummary {
    fn from(def: &ManifestAsset) -> Self {
        let invert = |map: &BTreeMap<AssetKey, String>| {
            map.iter()
                .map(|(key, port)| (port.clone(), key.clone()))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            op: def.op().name().to_string(),
            outputs: invert(def.output_names_by_key()),
            inputs: invert(def.input_names_by_key()),
            partitions: def.partitions_def().cloned(),
            partition_mappings: def
                .partition_mappings()
                .iter()
                .map(|(key, mapping)| (key.to_string(), mapping.clone()))
                .collect(),
            asset_deps: def
                .asset_deps()
                .iter()
                .map(|(key, deps)| (key.to_string(), deps.clone()))
                .collect(),
        }
    }
}

// --- tests -------------------------------------------------------------------
