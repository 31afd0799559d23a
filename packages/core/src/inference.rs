//! Inference of a computation's input and output asset keys.
//!
//! Parameters of the function name the upstream assets it reads: a parameter
//! `orders` depends on the asset `orders` (or `<namespace>/orders`) unless an
//! [`AssetIn`] override says otherwise. Outputs are keyed by their port name
//! unless an [`Out`] override gives an explicit key.
//!
//! A leading parameter named like a context (`context`, `_context`,
//! `context_`, `_`) is never treated as an input.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::key::AssetKey;
use crate::op::{ComputeFn, Computation, InputDef, OpDefinition, OutputDef, PortKind};
use crate::validation::check_overrides_declared;

/// Names recognised as an implicit execution-context first parameter.
pub const CONTEXT_PARAMETER_NAMES: [&str; 4] = ["context", "_context", "context_", "_"];

/// Resolved input ports, keyed by the asset each one depends on.
pub type AssetIns = BTreeMap<AssetKey, (String, InputDef)>;

/// Resolved output ports, keyed by the asset each one produces.
pub type AssetOuts = BTreeMap<AssetKey, (String, OutputDef)>;

/// Override for how one parameter maps to an upstream asset.
///
/// With `key` set the parameter reads exactly that asset. Otherwise the key
/// is `namespace + parameter name`, falling back to the builder's default
/// namespace when `namespace` is also absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetIn {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<AssetKey>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Vec<String>>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AssetIn {
    /// Read exactly `key`.
    pub fn key(key: AssetKey) -> Self {
        Self {
            key: Some(key),
            ..Default::default()
        }
    }

    /// Read `namespace + parameter name`.
    pub fn namespace<I, S>(namespace: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespace: Some(namespace.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }
}

/// Override for one declared output of a multi-asset computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Out {
    /// Explicit key; defaults to the port name as a single segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<AssetKey>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub io_manager_key: Option<String>,
}

impl Out {
    pub fn key(key: AssetKey) -> Self {
        Self {
            key: Some(key),
            ..Default::default()
        }
    }
}

/// Whether `name` is a conventional context parameter name.
pub fn is_context_parameter(name: &str) -> bool {
    CONTEXT_PARAMETER_NAMES.contains(&name)
}

/// `parameters` without a leading context parameter.
pub fn input_parameter_names(parameters: &[String]) -> &[String] {
    match parameters.first() {
        Some(first) if is_context_parameter(first) => &parameters[1..],
        _ => parameters,
    }
}

/// Resolve the input ports of a function.
///
/// `parameters` are the function's declared parameters (a leading context
/// parameter is skipped). `ins` overrides individual parameters,
/// `default_namespace` prefixes keys that no override pins, and
/// `non_argument_deps` adds dependency-only ports named by each key's
/// `_`-joined path.
///
/// # Errors
///
/// - [`DefinitionError::UnknownInputOverride`] if `ins` names something that
///   is not a parameter.
/// - [`DefinitionError::DuplicatePortName`] if two keys end up on the same
///   port name.
/// - [`DefinitionError::DuplicateKey`] if two ports end up on the same key.
/// - [`DefinitionError::InvalidKey`] if a namespace contains an empty
///   segment.
pub fn build_asset_ins(
    op: &str,
    parameters: &[String],
    default_namespace: &[String],
    ins: &BTreeMap<String, AssetIn>,
    non_argument_deps: &BTreeSet<AssetKey>,
) -> Result<AssetIns, DefinitionError> {
    let input_names = input_parameter_names(parameters);
    check_overrides_declared(op, PortKind::Input, ins.keys(), input_names)?;

    let mut resolved = ResolvedPorts::new(op, PortKind::Input);

    for name in input_names {
        let (key, metadata) = match ins.get(name) {
            Some(AssetIn {
                key: Some(key),
                metadata,
                ..
            }) => (key.clone(), metadata.clone()),
            Some(AssetIn {
                key: None,
                namespace,
                metadata,
            }) => {
                let namespace = namespace.as_deref().unwrap_or(default_namespace);
                (namespaced_key(namespace, name)?, metadata.clone())
            }
            None => (namespaced_key(default_namespace, name)?, BTreeMap::new()),
        };
        tracing::trace!(op, parameter = %name, key = %key, "input key resolved");

        let def = InputDef {
            metadata,
            ..InputDef::new(name.clone())
        };
        resolved.insert(key, name.clone(), def)?;
    }

    for key in non_argument_deps {
        let def = InputDef::dependency_only(key.clone());
        resolved.insert(key.clone(), def.name.clone(), def)?;
    }

    tracing::debug!(op, inputs = resolved.ports.len(), "asset inputs inferred");
    Ok(resolved.ports)
}

/// Resolve the output ports of a function from its declared outputs.
///
/// Every declared output gets a key: the override's key if `outs` has one,
/// otherwise the port name as a single segment.
///
/// # Errors
///
/// - [`DefinitionError::UnknownOutputOverride`] if `outs` names an output the
///   function does not declare.
/// - [`DefinitionError::DuplicateKey`] if two outputs end up on the same key.
pub fn build_asset_outs(
    op: &str,
    declared_outputs: &[String],
    outs: &BTreeMap<String, Out>,
) -> Result<AssetOuts, DefinitionError> {
    check_overrides_declared(op, PortKind::Output, outs.keys(), declared_outputs)?;

    let mut resolved = ResolvedPorts::new(op, PortKind::Output);
    for name in declared_outputs {
        let out = outs.get(name).cloned().unwrap_or_default();
        let key = match out.key {
            Some(key) => key,
            None => AssetKey::new([name.as_str()])?,
        };
        let mut def = OutputDef::new(name.clone());
        def.asset_key = Some(key.clone());
        def.metadata = out.metadata;
        if let Some(io_manager_key) = out.io_manager_key {
            def.io_manager_key = io_manager_key;
        }
        resolved.insert(key, name.clone(), def)?;
    }

    tracing::debug!(op, outputs = resolved.ports.len(), "asset outputs inferred");
    Ok(resolved.ports)
}

/// Input keys of an already-built op, by port name.
///
/// `overrides` may only name the op function's parameters. Every input port
/// of the op receives a key: the override, else the key the port records,
/// else the port name as a single segment.
pub fn infer_asset_keys_by_input_name<F: ComputeFn>(
    op: &OpDefinition<F>,
    overrides: &BTreeMap<String, AssetKey>,
) -> Result<BTreeMap<String, AssetKey>, DefinitionError> {
    let parameters = input_parameter_names(op.compute_fn().declared_parameters());
    check_overrides_declared(op.name(), PortKind::Input, overrides.keys(), parameters)?;

    op.input_defs()
        .iter()
        .map(|def| -> Result<(String, AssetKey), DefinitionError> {
            let key = match (overrides.get(&def.name), &def.asset_key) {
                (Some(key), _) => key.clone(),
                (None, Some(recorded)) => recorded.clone(),
                (None, None) => AssetKey::new([def.name.as_str()])?,
            };
            Ok((def.name.clone(), key))
        })
        .collect()
}

/// Output keys of an already-built op, by port name.
///
/// `overrides` may only name the op's outputs; outputs without an override
/// keep the key they record, else their port name as a single segment.
pub fn infer_asset_keys_by_output_name<F>(
    op: &OpDefinition<F>,
    overrides: &BTreeMap<String, AssetKey>,
) -> Result<BTreeMap<String, AssetKey>, DefinitionError> {
    let outputs: Vec<String> = op.output_names().into_iter().map(String::from).collect();
    check_overrides_declared(op.name(), PortKind::Output, overrides.keys(), &outputs)?;

    op.output_defs()
        .iter()
        .map(|def| -> Result<(String, AssetKey), DefinitionError> {
            let key = match (overrides.get(&def.name), &def.asset_key) {
                (Some(key), _) => key.clone(),
                (None, Some(recorded)) => recorded.clone(),
                (None, None) => AssetKey::new([def.name.as_str()])?,
            };
            Ok((def.name.clone(), key))
        })
        .collect()
}

fn namespaced_key(namespace: &[String], name: &str) -> Result<AssetKey, DefinitionError> {
    let path = namespace.iter().map(String::as_str).chain([name]);
    Ok(AssetKey::new(path)?)
}

// Accumulates ports while enforcing that keys and port names stay one-to-one.
struct ResolvedPorts<'a, D> {
    op: &'a str,
    kind: PortKind,
    ports: BTreeMap<AssetKey, (String, D)>,
    keys_by_name: BTreeMap<String, AssetKey>,
}

impl<'a, D> ResolvedPorts<'a, D> {
    fn new(op: &'a str, kind: PortKind) -> Self {
        Self {
            op,
            kind,
            ports: BTreeMap::new(),
            keys_by_name: BTreeMap::new(),
        }
    }

    fn insert(&mut self, key: AssetKey, name: String, def: D) -> Result<(), DefinitionError> {
        if let Some((first, _)) = self.ports.get(&key) {
            return Err(DefinitionError::DuplicateKey {
                op: self.op.to_string(),
                kind: self.kind,
                key,
                first: first.clone(),
                second: name,
            });
        }
        if let Some(first) = self.keys_by_name.get(&name) {
            return Err(DefinitionError::DuplicatePortName {
                op: self.op.to_string(),
                kind: self.kind,
                name,
                first: first.clone(),
                second: key,
            });
        }
        self.keys_by_name.insert(name.clone(), key.clone());
        self.ports.insert(key, (name, def));
        Ok(())
    }
}

// --- tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{DeclaredFn, OpConfig};

    fn key(s: &str) -> AssetKey {
        s.parse().unwrap()
    }

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn port_names(ins: &AssetIns) -> BTreeMap<AssetKey, String> {
        ins.iter().map(|(k, (n, _))| (k.clone(), n.clone())).collect()
    }

    #[test]
    fn context_parameter_stripped_only_when_first() {
        assert_eq!(input_parameter_names(&params(&["context", "a"])), params(&["a"]).as_slice());
        assert_eq!(input_parameter_names(&params(&["_", "a"])), params(&["a"]).as_slice());
        assert_eq!(
            input_parameter_names(&params(&["a", "context"])),
            params(&["a", "context"]).as_slice()
        );
        assert!(input_parameter_names(&[]).is_empty());
    }

    #[test]
    fn parameters_become_single_segment_keys() {
        let ins = build_asset_ins("op", &params(&["a", "b"]), &[], &BTreeMap::new(), &BTreeSet::new())
            .unwrap();
        assert_eq!(
            port_names(&ins),
            BTreeMap::from([(key("a"), "a".to_string()), (key("b"), "b".to_string())])
        );
        assert!(ins.values().all(|(_, def)| def.receives_value));
    }

    #[test]
    fn default_namespace_prefixes_unpinned_parameters() {
        let overrides = BTreeMap::from([("b".to_string(), AssetIn::namespace(["other"]))]);
        let ins = build_asset_ins(
            "op",
            &params(&["a", "b", "c"]),
            &["prod".to_string()],
            &overrides,
            &BTreeSet::new(),
        )
        .unwrap();
        let keys: BTreeSet<AssetKey> = ins.keys().cloned().collect();
        assert_eq!(keys, BTreeSet::from([key("prod/a"), key("other/b"), key("prod/c")]));
    }

    #[test]
    fn explicit_override_key_and_metadata() {
        let overrides = BTreeMap::from([(
            "upstream_a".to_string(),
            AssetIn {
                key: Some(key("ns/A")),
                metadata: BTreeMap::from([("owner".to_string(), serde_json::json!("data-eng"))]),
                ..Default::default()
            },
        )]);
        let ins = build_asset_ins(
            "op",
            &params(&["context", "upstream_a", "upstream_b"]),
            &[],
            &overrides,
            &BTreeSet::new(),
        )
        .unwrap();
        assert_eq!(
            port_names(&ins),
            BTreeMap::from([
                (key("ns/A"), "upstream_a".to_string()),
                (key("upstream_b"), "upstream_b".to_string()),
            ])
        );
        let (_, def) = &ins[&key("ns/A")];
        assert_eq!(def.metadata["owner"], serde_json::json!("data-eng"));
    }

    #[test]
    fn override_for_missing_parameter_rejected() {
        for bogus in ["c", "context", "A"] {
            let overrides = BTreeMap::from([(bogus.to_string(), AssetIn::default())]);
            let result = build_asset_ins(
                "op",
                &params(&["context", "a", "b"]),
                &[],
                &overrides,
                &BTreeSet::new(),
            );
            assert!(matches!(
                result,
                Err(DefinitionError::UnknownInputOverride { ref name, .. }) if name == bogus
            ));
        }
    }

    #[test]
    fn dependency_only_keys_get_joined_port_names() {
        let deps = BTreeSet::from([key("raw/events")]);
        let ins = build_asset_ins("op", &params(&["a"]), &[], &BTreeMap::new(), &deps).unwrap();
        let (name, def) = &ins[&key("raw/events")];
        assert_eq!(name, "raw_events");
        assert!(!def.receives_value);
        assert_eq!(def.asset_key, Some(key("raw/events")));
    }

    #[test]
    fn dependency_port_colliding_with_parameter_rejected() {
        let deps = BTreeSet::from([key("raw/events")]);
        let result = build_asset_ins("op", &params(&["raw_events"]), &[], &BTreeMap::new(), &deps);
        assert!(matches!(
            result,
            Err(DefinitionError::DuplicatePortName { ref name, .. }) if name == "raw_events"
        ));
    }

    #[test]
    fn two_parameters_on_one_key_rejected() {
        let overrides = BTreeMap::from([("b".to_string(), AssetIn::key(key("a")))]);
        let result = build_asset_ins("op", &params(&["a", "b"]), &[], &overrides, &BTreeSet::new());
        assert!(matches!(result, Err(DefinitionError::DuplicateKey { .. })));
    }

    #[test]
    fn outputs_default_to_port_names() {
        let outs = BTreeMap::from([("b".to_string(), Out::key(key("ns/B")))]);
        let resolved = build_asset_outs("op", &params(&["a", "b"]), &outs).unwrap();
        let keys: BTreeSet<AssetKey> = resolved.keys().cloned().collect();
        assert_eq!(keys, BTreeSet::from([key("a"), key("ns/B")]));
        assert_eq!(resolved[&key("ns/B")].1.asset_key, Some(key("ns/B")));
    }

    #[test]
    fn output_override_for_undeclared_port_rejected() {
        let outs = BTreeMap::from([("c".to_string(), Out::default())]);
        assert!(matches!(
            build_asset_outs("op", &params(&["a"]), &outs),
            Err(DefinitionError::UnknownOutputOverride { ref name, .. }) if name == "c"
        ));
    }

    #[test]
    fn keys_inferred_from_existing_op() {
        let f = DeclaredFn::new("join", ["context", "left", "right"], |_: ()| ())
            .with_outputs(["joined", "rejects"]);
        let op = OpDefinition::new(OpConfig::default(), f).unwrap();

        let inputs = infer_asset_keys_by_input_name(
            &op,
            &BTreeMap::from([("left".to_string(), key("ns/left"))]),
        )
        .unwrap();
        assert_eq!(inputs["left"], key("ns/left"));
        assert_eq!(inputs["right"], key("right"));

        let outputs = infer_asset_keys_by_output_name(
            &op,
            &BTreeMap::from([("rejects".to_string(), key("quarantine/rejects"))]),
        )
        .unwrap();
        assert_eq!(outputs["joined"], key("joined"));
        assert_eq!(outputs["rejects"], key("quarantine/rejects"));

        assert!(matches!(
            infer_asset_keys_by_output_name(&op, &BTreeMap::from([("nope".to_string(), key("x"))])),
            Err(DefinitionError::UnknownOutputOverride { .. })
        ));
        assert!(matches!(
            infer_asset_keys_by_input_name(&op, &BTreeMap::from([("context".to_string(), key("x"))])),
            Err(DefinitionError::UnknownInputOverride { .. })
        ));
    }
}
