//! Two-step construction of [`AssetsDefinition`]s.
//!
//! Each builder is a plain configuration struct. Fill in the fields that
//! differ from the defaults, then call `build` with the function (or op) it
//! should wrap:
//!
//! | Builder | Produces | Keys come from |
//! |---------|----------|----------------|
//! | [`AssetBuilder`] | one asset | `namespace + name`, parameters for inputs |
//! | [`MultiAssetBuilder`] | several assets from one function | [`Out`] overrides, parameters for inputs |
//! | [`OpAssetsBuilder`] | assets from an existing [`OpDefinition`] | explicit overrides, else port names |
//!
//! ```rust,ignore
//! let orders = AssetBuilder {
//!     namespace: vec!["warehouse".into()],
//!     compute_kind: Some("sql".into()),
//!     ..Default::default()
//! }
//! .build(DeclaredFn::new("orders", ["context", "raw_orders"], load_orders))?;
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::definition::AssetsDefinition;
use crate::error::{DefinitionError, Error};
use crate::inference::{
    build_asset_ins, build_asset_outs, infer_asset_keys_by_input_name,
    infer_asset_keys_by_output_name, AssetIn, AssetIns, AssetOuts, Out,
};
use crate::key::AssetKey;
use crate::op::{ComputeFn, OpConfig, OpDefinition, OutputDef, PortKind};
use crate::partition::{PartitionMapping, PartitionsDefinition};
use crate::validation::{check_namespace, check_overrides_declared};

/// Tag key under which `compute_kind` is recorded on the op.
pub const COMPUTE_KIND_TAG: &str = "kind";

/// Configuration for a definition producing exactly one asset.
#[derive(Debug, Clone, Default)]
pub struct AssetBuilder {
    /// Asset name; defaults to the function's name.
    pub name: Option<String>,
    /// Segments prepended to the asset name, and to inferred input keys.
    pub namespace: Vec<String>,
    /// Per-parameter overrides, by parameter name.
    pub ins: BTreeMap<String, AssetIn>,
    /// Upstream assets the function depends on without receiving them.
    pub non_argument_deps: BTreeSet<AssetKey>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub description: Option<String>,
    pub required_resource_keys: BTreeSet<String>,
    /// Output manager for the asset; defaults to
    /// [`DEFAULT_IO_MANAGER_KEY`](crate::op::DEFAULT_IO_MANAGER_KEY).
    pub io_manager_key: Option<String>,
    /// Kind of computation, e.g. `sql` or `spark`. Recorded as a tag.
    pub compute_kind: Option<String>,
    pub partitions_def: Option<PartitionsDefinition>,
    /// Partition mappings, by input parameter name.
    pub partition_mappings: BTreeMap<String, PartitionMapping>,
}

impl AssetBuilder {
    /// Check the configuration on its own, before any function is supplied.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::InvalidConfig`] for an empty name.
    /// - [`DefinitionError::InvalidKey`] for an empty or malformed namespace
    ///   segment, or a name containing the key delimiter.
    /// - [`DefinitionError::MappingsWithoutPartitions`] when partition
    ///   mappings are given without a partitions definition.
    /// - [`DefinitionError::InvalidPartitions`] for a malformed partitions
    ///   definition.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let label = self.name.as_deref().unwrap_or("<unnamed asset>");

        if let Some(name) = &self.name {
            if name.is_empty() {
                return Err(DefinitionError::InvalidConfig("asset name must not be empty".into()));
            }
            AssetKey::new([name.as_str()])?;
        }
        check_namespace(&self.namespace)?;

        match &self.partitions_def {
            Some(partitions_def) => {
                partitions_def
                    .validate()
                    .map_err(|reason| DefinitionError::InvalidPartitions {
                        op: label.to_string(),
                        reason,
                    })?;
            }
            None if !self.partition_mappings.is_empty() => {
                return Err(DefinitionError::MappingsWithoutPartitions {
                    op: label.to_string(),
                    inputs: self.partition_mappings.keys().cloned().collect(),
                });
            }
            None => {}
        }
        Ok(())
    }

    /// Wrap `compute_fn` as a single asset.
    ///
    /// The asset key is `namespace + name`, the op is named after the key's
    /// `__`-joined path, and the function's single declared output becomes
    /// the asset.
    ///
    /// # Errors
    ///
    /// Anything [`AssetBuilder::validate`] reports;
    /// [`DefinitionError::InvalidConfig`] if the function does not declare
    /// exactly one output; [`DefinitionError::MappingForUnknownInput`] if a
    /// partition mapping names something that is not an input; and the port
    /// inference errors of [`build_asset_ins`].
    pub fn build<F: ComputeFn>(&self, compute_fn: F) -> Result<AssetsDefinition<OpDefinition<F>>, Error> {
        self.validate()?;

        let output_name = match compute_fn.declared_outputs() {
            [only] => only.clone(),
            declared => {
                return Err(DefinitionError::InvalidConfig(format!(
                    "a single asset must declare exactly one output, {:?} declares {declared:?}",
                    compute_fn.name()
                ))
                .into());
            }
        };

        let asset_name = self.name.as_deref().unwrap_or_else(|| compute_fn.name());
        let out_key = AssetKey::new(
            self.namespace
                .iter()
                .map(String::as_str)
                .chain([asset_name]),
        )?;
        let op_name = out_key.to_op_name();

        let asset_ins = build_asset_ins(
            &op_name,
            compute_fn.declared_parameters(),
            &self.namespace,
            &self.ins,
            &self.non_argument_deps,
        )?;

        let partition_mappings = self
            .partition_mappings
            .iter()
            .map(|(input, mapping)| -> Result<(AssetKey, PartitionMapping), DefinitionError> {
                let key = asset_ins
                    .iter()
                    .find(|(_, (name, _))| name == input)
                    .map(|(key, _)| key.clone())
                    .ok_or_else(|| DefinitionError::MappingForUnknownInput {
                        op: op_name.clone(),
                        input: input.clone(),
                    })?;
                Ok((key, mapping.clone()))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let out = OutputDef {
            metadata: self.metadata.clone(),
            asset_key: Some(out_key.clone()),
            partitions_def: self.partitions_def.clone(),
            ..OutputDef::new(output_name.clone())
        };
        let out = match &self.io_manager_key {
            Some(key) => OutputDef {
                io_manager_key: key.clone(),
                ..out
            },
            None => out,
        };

        let config = OpConfig {
            name: Some(op_name),
            description: self.description.clone(),
            ins: asset_ins.values().map(|(_, def)| def.clone()).collect(),
            outs: vec![out],
            required_resource_keys: self.required_resource_keys.clone(),
            tags: kind_tags(&self.compute_kind),
        };
        let op = OpDefinition::new(config, compute_fn)?;

        tracing::debug!(asset = %out_key, op = op.name(), inputs = asset_ins.len(), "asset built");

        AssetsDefinition::new(
            input_port_map(&asset_ins),
            BTreeMap::from([(out_key, output_name)]),
            op,
            self.partitions_def.clone(),
            partition_mappings,
            None,
        )
    }
}

/// Configuration for one function producing several assets.
#[derive(Debug, Clone, Default)]
pub struct MultiAssetBuilder {
    /// Op name; defaults to the function's name.
    pub name: Option<String>,
    /// Per-output overrides, by declared output name.
    pub outs: BTreeMap<String, Out>,
    pub ins: BTreeMap<String, AssetIn>,
    pub non_argument_deps: BTreeSet<AssetKey>,
    pub description: Option<String>,
    pub required_resource_keys: BTreeSet<String>,
    pub compute_kind: Option<String>,
    /// Output key → the keys it depends on. When empty, every output depends
    /// on every input.
    pub internal_asset_deps: BTreeMap<AssetKey, BTreeSet<AssetKey>>,
}

impl MultiAssetBuilder {
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.as_deref() == Some("") {
            return Err(DefinitionError::InvalidConfig("op name must not be empty".into()));
        }
        Ok(())
    }

    /// Wrap `compute_fn`; each of its declared outputs becomes an asset.
    ///
    /// # Errors
    ///
    /// The port inference errors of [`build_asset_ins`] and
    /// [`build_asset_outs`], and the consistency errors of
    /// [`AssetsDefinition::new`] (e.g. internal dependencies on unknown
    /// keys).
    pub fn build<F: ComputeFn>(&self, compute_fn: F) -> Result<AssetsDefinition<OpDefinition<F>>, Error> {
        self.validate()?;

        let op_name = self
            .name
            .clone()
            .unwrap_or_else(|| compute_fn.name().to_string());

        let asset_ins = build_asset_ins(
            &op_name,
            compute_fn.declared_parameters(),
            &[],
            &self.ins,
            &self.non_argument_deps,
        )?;
        let asset_outs = build_asset_outs(&op_name, compute_fn.declared_outputs(), &self.outs)?;

        let config = OpConfig {
            name: Some(op_name),
            description: self.description.clone(),
            ins: asset_ins.values().map(|(_, def)| def.clone()).collect(),
            outs: asset_outs.values().map(|(_, def)| def.clone()).collect(),
            required_resource_keys: self.required_resource_keys.clone(),
            tags: kind_tags(&self.compute_kind),
        };
        let op = OpDefinition::new(config, compute_fn)?;

        tracing::debug!(
            op = op.name(),
            inputs = asset_ins.len(),
            outputs = asset_outs.len(),
            "multi-asset built"
        );

        let asset_deps = (!self.internal_asset_deps.is_empty()).then(|| self.internal_asset_deps.clone());
        AssetsDefinition::new(
            input_port_map(&asset_ins),
            output_port_map(&asset_outs),
            op,
            None,
            BTreeMap::new(),
            asset_deps,
        )
    }
}

/// Configuration for exposing an already-built op as assets.
#[derive(Debug, Clone, Default)]
pub struct OpAssetsBuilder {
    /// Input key overrides, by parameter name.
    pub asset_key_by_input_name: BTreeMap<String, AssetKey>,
    /// Output key overrides, by output name.
    pub asset_key_by_output_name: BTreeMap<String, AssetKey>,
    /// Output name → the keys that output depends on.
    pub internal_asset_deps: BTreeMap<String, BTreeSet<AssetKey>>,
}

impl OpAssetsBuilder {
    /// Wrap `op`. Ports without an override keep the key the op records for
    /// them, else their port name as a single-segment key.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::UnknownInputOverride`] /
    ///   [`DefinitionError::UnknownOutputOverride`] for overrides (or
    ///   internal dependencies) naming ports the op does not have.
    /// - [`DefinitionError::DuplicateKey`] if two ports resolve to one key.
    /// - The consistency errors of [`AssetsDefinition::new`].
    pub fn build<F: ComputeFn>(&self, op: OpDefinition<F>) -> Result<AssetsDefinition<OpDefinition<F>>, Error> {
        let keys_by_input = infer_asset_keys_by_input_name(&op, &self.asset_key_by_input_name)?;
        let keys_by_output = infer_asset_keys_by_output_name(&op, &self.asset_key_by_output_name)?;

        let asset_deps = if self.internal_asset_deps.is_empty() {
            None
        } else {
            let output_names: Vec<String> = keys_by_output.keys().cloned().collect();
            check_overrides_declared(
                op.name(),
                PortKind::Output,
                self.internal_asset_deps.keys(),
                &output_names,
            )?;
            Some(
                self.internal_asset_deps
                    .iter()
                    .filter_map(|(name, deps)| {
                        keys_by_output.get(name).map(|key| (key.clone(), deps.clone()))
                    })
                    .collect(),
            )
        };

        let inputs = invert_keys(op.name(), PortKind::Input, keys_by_input)?;
        let outputs = invert_keys(op.name(), PortKind::Output, keys_by_output)?;

        tracing::debug!(op = op.name(), inputs = inputs.len(), outputs = outputs.len(), "op wrapped as assets");

        AssetsDefinition::new(inputs, outputs, op, None, BTreeMap::new(), asset_deps)
    }
}

fn kind_tags(compute_kind: &Option<String>) -> BTreeMap<String, String> {
    compute_kind
        .iter()
        .map(|kind| (COMPUTE_KIND_TAG.to_string(), kind.clone()))
        .collect()
}

fn input_port_map(ins: &AssetIns) -> BTreeMap<AssetKey, String> {
    ins.iter().map(|(key, (name, _))| (key.clone(), name.clone())).collect()
}

fn output_port_map(outs: &AssetOuts) -> BTreeMap<AssetKey, String> {
    outs.iter().map(|(key, (name, _))| (key.clone(), name.clone())).collect()
}

fn invert_keys(
    op: &str,
    kind: PortKind,
    keys_by_name: BTreeMap<String, AssetKey>,
) -> Result<BTreeMap<AssetKey, String>, DefinitionError> {
    let mut names_by_key: BTreeMap<AssetKey, String> = BTreeMap::new();
    for (name, key) in keys_by_name {
        if let Some(first) = names_by_key.get(&key) {
            return Err(DefinitionError::DuplicateKey {
                op: op.to_string(),
                kind,
                key,
                first: first.clone(),
                second: name,
            });
        }
        names_by_key.insert(key, name);
    }
    Ok(names_by_key)
}

// --- tests -------------------------------------------------------------------
