//! The validated asset definition: a computation plus the asset keys it reads
//! and produces.
//!
//! An [`AssetsDefinition`] is immutable. Renaming its keys (to nest it in a
//! namespace, or to resolve overlaps when subsetting a graph) produces a new
//! definition via [`AssetsDefinition::with_substituted_keys`].

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{AmbiguousKeyError, DefinitionError, Error, NotPartitionedError};
use crate::key::{AssetKey, KeySubstitutions};
use crate::op::{ComputeFn, Computation, InputDef, OpDefinition, OutputDef, PortKind};
use crate::partition::{PartitionMapping, PartitionsDefinition};
use crate::validation::{check_ports_declared, invert_port_map, substitute, substitute_map_keys};

/// A node of the asset graph.
///
/// Holds two bidirectional maps between asset keys and the local port names
/// of the wrapped computation `C`: one for the upstream assets it depends on
/// (`inputs`) and one for the assets it produces (`outputs`).
#[derive(Debug, Clone, PartialEq)]
pub struct AssetsDefinition<C> {
    input_names_by_key: BTreeMap<AssetKey, String>,
    output_names_by_key: BTreeMap<AssetKey, String>,
    keys_by_input_name: BTreeMap<String, AssetKey>,
    keys_by_output_name: BTreeMap<String, AssetKey>,
    op: C,
    partitions_def: Option<PartitionsDefinition>,
    partition_mappings: BTreeMap<AssetKey, PartitionMapping>,
    asset_deps: BTreeMap<AssetKey, BTreeSet<AssetKey>>,
}

impl<C: Computation> AssetsDefinition<C> {
    /// Assemble a definition from already-resolved key maps.
    ///
    /// Port inference is not repeated here; the maps are only checked against
    /// `op` and each other. `asset_deps` lists, per output key, the keys it
    /// depends on; `None` means every output depends on every input.
    ///
    /// # Errors
    ///
    /// - [`Error::InconsistentPort`] if a map names a port `op` does not
    ///   declare.
    /// - [`Error::Definition`] if `outputs` is empty, a port is shared by two
    ///   keys, a key is both input and output, partition mappings are given
    ///   without `partitions_def` or for keys that are not inputs, or
    ///   `asset_deps` references unknown keys.
    pub fn new(
        inputs: BTreeMap<AssetKey, String>,
        outputs: BTreeMap<AssetKey, String>,
        op: C,
        partitions_def: Option<PartitionsDefinition>,
        partition_mappings: BTreeMap<AssetKey, PartitionMapping>,
        asset_deps: Option<BTreeMap<AssetKey, BTreeSet<AssetKey>>>,
    ) -> Result<Self, Error> {
        let op_name = op.name().to_string();

        if outputs.is_empty() {
            return Err(DefinitionError::NoOutputs { op: op_name }.into());
        }

        check_ports_declared(&op_name, PortKind::Input, &inputs, &op.input_names())?;
        check_ports_declared(&op_name, PortKind::Output, &outputs, &op.output_names())?;

        let keys_by_input_name = invert_port_map(&op_name, PortKind::Input, &inputs)?;
        let keys_by_output_name = invert_port_map(&op_name, PortKind::Output, &outputs)?;

        if let Some(key) = inputs.keys().find(|k| outputs.contains_key(*k)) {
            return Err(DefinitionError::KeyIsInputAndOutput {
                op: op_name,
                key: key.clone(),
            }
            .into());
        }

        if let Some(partitions_def) = &partitions_def {
            partitions_def
                .validate()
                .map_err(|reason| DefinitionError::InvalidPartitions {
                    op: op_name.clone(),
                    reason,
                })?;
        } else if !partition_mappings.is_empty() {
            return Err(DefinitionError::MappingsWithoutPartitions {
                op: op_name,
                inputs: partition_mappings.keys().map(ToString::to_string).collect(),
            }
            .into());
        }
        if let Some(key) = partition_mappings.keys().find(|k| !inputs.contains_key(*k)) {
            return Err(DefinitionError::MappingForUnknownInput {
                op: op_name,
                input: key.to_string(),
            }
            .into());
        }

        let asset_deps = match asset_deps {
            Some(deps) => {
                check_asset_deps(&op_name, &deps, &inputs, &outputs)?;
                let mut resolved = deps;
                for key in outputs.keys() {
                    resolved.entry(key.clone()).or_default();
                }
                resolved
            }
            None => {
                let all_inputs: BTreeSet<AssetKey> = inputs.keys().cloned().collect();
                outputs
                    .keys()
                    .map(|k| (k.clone(), all_inputs.clone()))
                    .collect()
            }
        };

        Ok(Self {
            input_names_by_key: inputs,
            output_names_by_key: outputs,
            keys_by_input_name,
            keys_by_output_name,
            op,
            partitions_def,
            partition_mappings,
            asset_deps,
        })
    }

    /// The single asset key this definition produces.
    ///
    /// # Errors
    ///
    /// [`AmbiguousKeyError`] if it produces more than one.
    pub fn asset_key(&self) -> Result<&AssetKey, AmbiguousKeyError> {
        let mut keys = self.output_names_by_key.keys();
        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(key),
            _ => Err(AmbiguousKeyError {
                op: self.op.name().to_string(),
                keys: self.output_names_by_key.keys().cloned().collect(),
            }),
        }
    }

    /// The partition mapping to use for the dependency on `input_key`.
    ///
    /// Returns the explicit mapping for `input_key` when one was given,
    /// otherwise the default mapping of this definition's partitions
    /// definition.
    ///
    /// # Errors
    ///
    /// [`NotPartitionedError`] if the definition has no partitions
    /// definition, whatever `input_key` is.
    pub fn partition_mapping_for(
        &self,
        input_key: &AssetKey,
    ) -> Result<PartitionMapping, NotPartitionedError> {
        let Some(partitions_def) = &self.partitions_def else {
            return Err(NotPartitionedError {
                op: self.op.name().to_string(),
            });
        };
        Ok(self
            .partition_mappings
            .get(input_key)
            .cloned()
            .unwrap_or_else(|| partitions_def.default_partition_mapping()))
    }

    /// A copy of this definition with asset keys renamed.
    ///
    /// Output keys found in `output_substitutions` and input keys found in
    /// `input_substitutions` are replaced; all other keys are kept. The op is
    /// asked for its own substituted copy, and partition mappings and
    /// internal dependencies follow their keys. `self` is left untouched.
    ///
    /// # Errors
    ///
    /// [`DefinitionError::SubstitutionCollision`] if two distinct keys would
    /// be renamed onto the same key, and any error [`AssetsDefinition::new`]
    /// reports for the renamed maps.
    pub fn with_substituted_keys(
        &self,
        output_substitutions: &KeySubstitutions,
        input_substitutions: &KeySubstitutions,
    ) -> Result<Self, Error> {
        let op_name = self.op.name();

        let inputs = substitute_map_keys(op_name, &self.input_names_by_key, input_substitutions)?;
        let outputs =
            substitute_map_keys(op_name, &self.output_names_by_key, output_substitutions)?;
        let partition_mappings =
            substitute_map_keys(op_name, &self.partition_mappings, input_substitutions)?;

        let asset_deps: BTreeMap<AssetKey, BTreeSet<AssetKey>> = self
            .asset_deps
            .iter()
            .map(|(key, deps)| {
                let deps = deps
                    .iter()
                    .map(|dep| {
                        if self.input_names_by_key.contains_key(dep) {
                            substitute(dep, input_substitutions)
                        } else {
                            substitute(dep, output_substitutions)
                        }
                    })
                    .collect();
                (substitute(key, output_substitutions), deps)
            })
            .collect();

        tracing::debug!(
            op = op_name,
            renamed_outputs = output_substitutions.len(),
            renamed_inputs = input_substitutions.len(),
            "substituting asset keys"
        );

        Self::new(
            inputs,
            outputs,
            self.op
                .with_substituted_keys(output_substitutions, input_substitutions),
            self.partitions_def.clone(),
            partition_mappings,
            Some(asset_deps),
        )
    }
}

impl<C> AssetsDefinition<C> {
    /// The wrapped computation.
    pub fn op(&self) -> &C {
        &self.op
    }

    /// Every asset key this definition produces.
    pub fn asset_keys(&self) -> BTreeSet<&AssetKey> {
        self.output_names_by_key.keys().collect()
    }

    /// Every upstream asset key this definition depends on.
    pub fn dependency_asset_keys(&self) -> BTreeSet<&AssetKey> {
        self.input_names_by_key.keys().collect()
    }

    /// Input key → local port name.
    pub fn input_names_by_key(&self) -> &BTreeMap<AssetKey, String> {
        &self.input_names_by_key
    }

    /// Output key → local port name.
    pub fn output_names_by_key(&self) -> &BTreeMap<AssetKey, String> {
        &self.output_names_by_key
    }

    pub fn input_name_for_key(&self, key: &AssetKey) -> Option<&str> {
        self.input_names_by_key.get(key).map(String::as_str)
    }

    pub fn output_name_for_key(&self, key: &AssetKey) -> Option<&str> {
        self.output_names_by_key.get(key).map(String::as_str)
    }

    pub fn key_for_input_name(&self, name: &str) -> Option<&AssetKey> {
        self.keys_by_input_name.get(name)
    }

    pub fn key_for_output_name(&self, name: &str) -> Option<&AssetKey> {
        self.keys_by_output_name.get(name)
    }

    pub fn partitions_def(&self) -> Option<&PartitionsDefinition> {
        self.partitions_def.as_ref()
    }

    /// Explicitly supplied partition mappings, by input key.
    pub fn partition_mappings(&self) -> &BTreeMap<AssetKey, PartitionMapping> {
        &self.partition_mappings
    }

    /// For each output key, the keys it depends on.
    pub fn asset_deps(&self) -> &BTreeMap<AssetKey, BTreeSet<AssetKey>> {
        &self.asset_deps
    }
}

impl<F: ComputeFn> AssetsDefinition<OpDefinition<F>> {
    /// Input port descriptors, by asset key.
    pub fn input_defs_by_key(&self) -> BTreeMap<&AssetKey, &InputDef> {
        self.input_names_by_key
            .iter()
            .filter_map(|(key, name)| self.op.input_def(name).map(|def| (key, def)))
            .collect()
    }

    /// Output port descriptors, by asset key.
    pub fn output_defs_by_key(&self) -> BTreeMap<&AssetKey, &OutputDef> {
        self.output_names_by_key
            .iter()
            .filter_map(|(key, name)| self.op.output_def(name).map(|def| (key, def)))
            .collect()
    }

    /// Run the wrapped function.
    pub fn invoke(&self, args: F::Args) -> F::Output {
        self.op.invoke(args)
    }
}

fn check_asset_deps(
    op: &str,
    deps: &BTreeMap<AssetKey, BTreeSet<AssetKey>>,
    inputs: &BTreeMap<AssetKey, String>,
    outputs: &BTreeMap<AssetKey, String>,
) -> Result<(), DefinitionError> {
    for (key, upstream) in deps {
        if !outputs.contains_key(key) {
            return Err(DefinitionError::DependenciesForUnknownOutput {
                op: op.to_string(),
                key: key.clone(),
            });
        }
        if let Some(dependency) = upstream
            .iter()
            .find(|d| !inputs.contains_key(*d) && !outputs.contains_key(*d))
        {
            return Err(DefinitionError::UnknownInternalDependency {
                op: op.to_string(),
                key: key.clone(),
                dependency: dependency.clone(),
            });
        }
    }
    Ok(())
}

// --- tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InconsistentPortError;

    #[derive(Debug, Clone, PartialEq)]
    struct StubOp {
        name: String,
        inputs: Vec<String>,
        outputs: Vec<String>,
        renames: usize,
    }

    impl Computation for StubOp {
        fn name(&self) -> &str {
            &self.name
        }

        fn input_names(&self) -> Vec<&str> {
            self.inputs.iter().map(String::as_str).collect()
        }

        fn output_names(&self) -> Vec<&str> {
            self.outputs.iter().map(String::as_str).collect()
        }

        fn with_substituted_keys(&self, o: &KeySubstitutions, i: &KeySubstitutions) -> Self {
            Self {
                renames: self.renames + usize::from(!o.is_empty() || !i.is_empty()),
                ..self.clone()
            }
        }
    }

    fn stub(inputs: &[&str], outputs: &[&str]) -> StubOp {
        StubOp {
            name: "stub".into(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            renames: 0,
        }
    }

    fn key(s: &str) -> AssetKey {
        s.parse().unwrap()
    }

    fn ports(entries: &[(&str, &str)]) -> BTreeMap<AssetKey, String> {
        entries.iter().map(|(k, p)| (key(k), p.to_string())).collect()
    }

    fn regions() -> PartitionsDefinition {
        PartitionsDefinition::Static(vec!["eu".into(), "us".into()])
    }

    fn two_in_one_out() -> AssetsDefinition<StubOp> {
        AssetsDefinition::new(
            ports(&[("ns/A", "a"), ("b", "b")]),
            ports(&[("result", "result")]),
            stub(&["a", "b"], &["result"]),
            None,
            BTreeMap::new(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn keys_and_lookups() {
        let def = two_in_one_out();
        assert_eq!(def.asset_key(), Ok(&key("result")));
        assert_eq!(def.asset_keys(), BTreeSet::from([&key("result")]));
        assert_eq!(def.dependency_asset_keys(), BTreeSet::from([&key("ns/A"), &key("b")]));
        assert_eq!(def.input_name_for_key(&key("ns/A")), Some("a"));
        assert_eq!(def.key_for_input_name("a"), Some(&key("ns/A")));
        assert_eq!(def.key_for_output_name("result"), Some(&key("result")));
        assert_eq!(def.output_name_for_key(&key("nope")), None);
    }

    #[test]
    fn default_asset_deps_cover_all_inputs() {
        let def = two_in_one_out();
        assert_eq!(
            def.asset_deps()[&key("result")],
            BTreeSet::from([key("ns/A"), key("b")])
        );
    }

    #[test]
    fn undeclared_port_is_inconsistent() {
        let result = AssetsDefinition::new(
            ports(&[("a", "missing")]),
            ports(&[("result", "result")]),
            stub(&["a"], &["result"]),
            None,
            BTreeMap::new(),
            None,
        );
        assert!(matches!(
            result,
            Err(Error::InconsistentPort(InconsistentPortError { ref port, kind: PortKind::Input, .. }))
                if port == "missing"
        ));
    }

    #[test]
    fn empty_outputs_rejected() {
        let result = AssetsDefinition::new(
            BTreeMap::new(),
            BTreeMap::new(),
            stub(&[], &["result"]),
            None,
            BTreeMap::new(),
            None,
        );
        assert!(matches!(result, Err(Error::Definition(DefinitionError::NoOutputs { .. }))));
    }

    #[test]
    fn shared_port_rejected() {
        let result = AssetsDefinition::new(
            ports(&[("a", "a"), ("b", "a")]),
            ports(&[("result", "result")]),
            stub(&["a"], &["result"]),
            None,
            BTreeMap::new(),
            None,
        );
        assert!(matches!(
            result,
            Err(Error::Definition(DefinitionError::DuplicatePortName { .. }))
        ));
    }

    #[test]
    fn ambiguous_single_key() {
        let def = AssetsDefinition::new(
            BTreeMap::new(),
            ports(&[("x", "x"), ("y", "y")]),
            stub(&[], &["x", "y"]),
            None,
            BTreeMap::new(),
            None,
        )
        .unwrap();
        let err = def.asset_key().unwrap_err();
        assert_eq!(err.keys, vec![key("x"), key("y")]);
    }

    #[test]
    fn unpartitioned_mapping_lookup_fails_for_any_key() {
        let def = two_in_one_out();
        for k in ["ns/A", "b", "not/an/input"] {
            assert_eq!(
                def.partition_mapping_for(&key(k)),
                Err(NotPartitionedError { op: "stub".into() })
            );
        }
    }

    #[test]
    fn partitioned_mapping_lookup_falls_back_to_default() {
        let def = AssetsDefinition::new(
            ports(&[("ns/A", "a"), ("b", "b")]),
            ports(&[("result", "result")]),
            stub(&["a", "b"], &["result"]),
            Some(regions()),
            BTreeMap::from([(key("ns/A"), PartitionMapping::AllPartitions)]),
            None,
        )
        .unwrap();
        assert_eq!(def.partition_mapping_for(&key("ns/A")), Ok(PartitionMapping::AllPartitions));
        assert_eq!(def.partition_mapping_for(&key("b")), Ok(PartitionMapping::Identity));
    }

    #[test]
    fn mappings_require_partitions_and_known_inputs() {
        let without_partitions = AssetsDefinition::new(
            ports(&[("a", "a")]),
            ports(&[("result", "result")]),
            stub(&["a"], &["result"]),
            None,
            BTreeMap::from([(key("a"), PartitionMapping::Identity)]),
            None,
        );
        assert!(matches!(
            without_partitions,
            Err(Error::Definition(DefinitionError::MappingsWithoutPartitions { .. }))
        ));

        let unknown_input = AssetsDefinition::new(
            ports(&[("a", "a")]),
            ports(&[("result", "result")]),
            stub(&["a"], &["result"]),
            Some(regions()),
            BTreeMap::from([(key("z"), PartitionMapping::Identity)]),
            None,
        );
        assert!(matches!(
            unknown_input,
            Err(Error::Definition(DefinitionError::MappingForUnknownInput { .. }))
        ));
    }

    #[test]
    fn explicit_asset_deps_checked() {
        let outputs = ports(&[("x", "x"), ("y", "y")]);
        let ok = AssetsDefinition::new(
            ports(&[("a", "a")]),
            outputs.clone(),
            stub(&["a"], &["x", "y"]),
            None,
            BTreeMap::new(),
            Some(BTreeMap::from([(key("y"), BTreeSet::from([key("x")]))])),
        )
        .unwrap();
        assert_eq!(ok.asset_deps()[&key("y")], BTreeSet::from([key("x")]));
        assert!(ok.asset_deps()[&key("x")].is_empty());

        let bad = AssetsDefinition::new(
            ports(&[("a", "a")]),
            outputs,
            stub(&["a"], &["x", "y"]),
            None,
            BTreeMap::new(),
            Some(BTreeMap::from([(key("y"), BTreeSet::from([key("elsewhere")]))])),
        );
        assert!(matches!(
            bad,
            Err(Error::Definition(DefinitionError::UnknownInternalDependency { .. }))
        ));
    }

    #[test]
    fn asset_deps_for_non_output_rejected() {
        let result = AssetsDefinition::new(
            ports(&[("a", "a")]),
            ports(&[("result", "result")]),
            stub(&["a"], &["result"]),
            None,
            BTreeMap::new(),
            Some(BTreeMap::from([(key("a"), BTreeSet::new())])),
        );
        assert!(matches!(
            result,
            Err(Error::Definition(DefinitionError::DependenciesForUnknownOutput { ref key, .. }))
                if key.to_string() == "a"
        ));
    }

    #[test]
    fn invalid_partitions_rejected() {
        let result = AssetsDefinition::new(
            ports(&[("a", "a")]),
            ports(&[("result", "result")]),
            stub(&["a"], &["result"]),
            Some(PartitionsDefinition::Daily {
                start: "2026-02-01".parse().unwrap(),
                end: "2026-01-01".parse().unwrap(),
            }),
            BTreeMap::new(),
            None,
        );
        assert!(matches!(
            result,
            Err(Error::Definition(DefinitionError::InvalidPartitions { ref op, .. }))
                if op == "stub"
        ));
    }

    #[test]
    fn key_both_input_and_output_rejected() {
        let result = AssetsDefinition::new(
            ports(&[("result", "a")]),
            ports(&[("result", "result")]),
            stub(&["a"], &["result"]),
            None,
            BTreeMap::new(),
            None,
        );
        assert!(matches!(
            result,
            Err(Error::Definition(DefinitionError::KeyIsInputAndOutput { .. }))
        ));
    }

    #[test]
    fn substituting_input_onto_output_key_rejected() {
        let def = AssetsDefinition::new(
            ports(&[("a", "a")]),
            ports(&[("result", "result")]),
            stub(&["a"], &["result"]),
            None,
            BTreeMap::new(),
            None,
        )
        .unwrap();
        let result = def.with_substituted_keys(
            &KeySubstitutions::new(),
            &KeySubstitutions::from([(key("a"), key("result"))]),
        );
        assert_eq!(
            result,
            Err(Error::Definition(DefinitionError::KeyIsInputAndOutput {
                op: "stub".into(),
                key: key("result"),
            }))
        );
        assert_eq!(def.input_name_for_key(&key("a")), Some("a"));
    }

    #[test]
    fn empty_substitution_is_identity() {
        let def = two_in_one_out();
        let copy = def
            .with_substituted_keys(&KeySubstitutions::new(), &KeySubstitutions::new())
            .unwrap();
        assert_eq!(copy, def);
    }

    #[test]
    fn substitution_renames_and_leaves_original() {
        let def = two_in_one_out();
        let renamed = def
            .with_substituted_keys(
                &KeySubstitutions::from([(key("result"), key("prod/result"))]),
                &KeySubstitutions::from([(key("b"), key("prod/b"))]),
            )
            .unwrap();
        assert_eq!(renamed.asset_key(), Ok(&key("prod/result")));
        assert_eq!(renamed.input_name_for_key(&key("prod/b")), Some("b"));
        assert_eq!(renamed.input_name_for_key(&key("ns/A")), Some("a"));
        assert_eq!(renamed.op().renames, 1);
        assert_eq!(
            renamed.asset_deps()[&key("prod/result")],
            BTreeSet::from([key("ns/A"), key("prod/b")])
        );

        assert_eq!(def.asset_key(), Ok(&key("result")));
        assert_eq!(def.op().renames, 0);
    }

    #[test]
    fn substitution_moves_partition_mappings() {
        let def = AssetsDefinition::new(
            ports(&[("a", "a")]),
            ports(&[("result", "result")]),
            stub(&["a"], &["result"]),
            Some(regions()),
            BTreeMap::from([(key("a"), PartitionMapping::LastPartition)]),
            None,
        )
        .unwrap();
        let renamed = def
            .with_substituted_keys(
                &KeySubstitutions::new(),
                &KeySubstitutions::from([(key("a"), key("ns/a"))]),
            )
            .unwrap();
        assert_eq!(
            renamed.partition_mapping_for(&key("ns/a")),
            Ok(PartitionMapping::LastPartition)
        );
        assert_eq!(renamed.partition_mapping_for(&key("a")), Ok(PartitionMapping::Identity));
    }

    #[test]
    fn substitution_collision_rejected() {
        let def = two_in_one_out();
        let result = def.with_substituted_keys(
            &KeySubstitutions::new(),
            &KeySubstitutions::from([(key("b"), key("ns/A"))]),
        );
        assert!(matches!(
            result,
            Err(Error::Definition(DefinitionError::SubstitutionCollision { ref target, .. }))
                if *target == key("ns/A")
        ));
    }
}
