//! The computation an asset definition wraps.
//!
//! Two seams meet here:
//!
//! | Trait | Implemented by | Provides |
//! |-------|----------------|----------|
//! | [`ComputeFn`] | user code ([`DeclaredFn`] for closures) | parameter and output names, the function body |
//! | [`Computation`] | [`OpDefinition`] (or a test double) | port names and key substitution, as seen by [`AssetsDefinition`](crate::AssetsDefinition) |
//!
//! An [`OpDefinition`] binds a [`ComputeFn`] to port descriptors
//! ([`InputDef`], [`OutputDef`]). The port descriptors are the only place the
//! op itself records asset keys; [`Computation::with_substituted_keys`]
//! rewrites them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::inference::input_parameter_names;
use crate::key::{AssetKey, KeySubstitutions};
use crate::partition::PartitionsDefinition;
use crate::validation::check_unique_names;

/// Output port name used when a function does not declare its outputs.
pub const DEFAULT_OUTPUT: &str = "result";

/// Output-manager key used when an output does not name one.
pub const DEFAULT_IO_MANAGER_KEY: &str = "io_manager";

/// Manager key used to load inputs that come from other assets.
pub const ROOT_MANAGER_KEY: &str = "root_manager";

/// Which side of a computation a port is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Input,
    Output,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Input => write!(f, "input"),
            PortKind::Output => write!(f, "output"),
        }
    }
}

/// A user function together with the names it declares.
///
/// Parameter names replace runtime introspection: the builders read them to
/// infer input ports, and never look at the function body.
pub trait ComputeFn: Send + Sync {
    /// Arguments handed to [`ComputeFn::call`].
    type Args;
    /// Value returned by [`ComputeFn::call`].
    type Output;

    /// The function's own name, used as the default asset or op name.
    fn name(&self) -> &str;

    /// Parameter names in declaration order, including a leading context
    /// parameter if the function takes one.
    fn declared_parameters(&self) -> &[String];

    /// Output names in declaration order.
    fn declared_outputs(&self) -> &[String];

    /// Run the function.
    fn call(&self, args: Self::Args) -> Self::Output;
}

/// Adapts a closure plus an explicit list of parameter names into a
/// [`ComputeFn`].
///
/// ```rust,ignore
/// let f = DeclaredFn::new("orders", ["context", "raw_orders"], |rows: Vec<u32>| rows.len());
/// ```
pub struct DeclaredFn<A, O> {
    name: String,
    parameters: Vec<String>,
    outputs: Vec<String>,
    body: Box<dyn Fn(A) -> O + Send + Sync>,
}

impl<A, O> DeclaredFn<A, O> {
    /// A function with a single output named [`DEFAULT_OUTPUT`].
    pub fn new<I, S>(
        name: impl Into<String>,
        parameters: I,
        body: impl Fn(A) -> O + Send + Sync + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().map(Into::into).collect(),
            outputs: vec![DEFAULT_OUTPUT.to_string()],
            body: Box::new(body),
        }
    }

    /// Replace the declared outputs.
    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }
}

impl<A, O> fmt::Debug for DeclaredFn<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclaredFn")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl<A, O> ComputeFn for DeclaredFn<A, O> {
    type Args = A;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn declared_parameters(&self) -> &[String] {
        &self.parameters
    }

    fn declared_outputs(&self) -> &[String] {
        &self.outputs
    }

    fn call(&self, args: A) -> O {
        (self.body)(args)
    }
}

/// Descriptor of one input port of an op.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InputDef {
    /// Local port name.
    pub name: String,

    /// Free-form metadata attached by the author.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// The asset this port depends on, when the op itself records it.
    /// Set for dependency-only ports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_key: Option<AssetKey>,

    /// `false` for dependency-only ports: the op depends on the asset but is
    /// not handed its value.
    pub receives_value: bool,

    /// Manager that loads the value, when the port receives one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_manager_key: Option<String>,
}

impl InputDef {
    /// A value-receiving port loaded by the [`ROOT_MANAGER_KEY`] manager.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: BTreeMap::new(),
            asset_key: None,
            receives_value: true,
            input_manager_key: Some(ROOT_MANAGER_KEY.to_string()),
        }
    }

    /// A port that records a dependency on `asset_key` without receiving its
    /// value. Its name is the key's `_`-joined path.
    pub fn dependency_only(asset_key: AssetKey) -> Self {
        Self {
            name: asset_key.to_local_name(),
            metadata: BTreeMap::new(),
            asset_key: Some(asset_key),
            receives_value: false,
            input_manager_key: None,
        }
    }
}

/// Descriptor of one output port of an op.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputDef {
    /// Local port name.
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// The asset this port materializes, when the op itself records it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_key: Option<AssetKey>,

    /// Output manager that stores the value.
    pub io_manager_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions_def: Option<PartitionsDefinition>,
}

impl OutputDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: BTreeMap::new(),
            asset_key: None,
            io_manager_key: DEFAULT_IO_MANAGER_KEY.to_string(),
            partitions_def: None,
        }
    }
}

/// What a definition needs to know about the computation it wraps.
pub trait Computation {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Declared input port names, in declaration order.
    fn input_names(&self) -> Vec<&str>;

    /// Declared output port names, in declaration order.
    fn output_names(&self) -> Vec<&str>;

    /// An equivalent computation whose recorded asset keys are renamed.
    fn with_substituted_keys(
        &self,
        output_substitutions: &KeySubstitutions,
        input_substitutions: &KeySubstitutions,
    ) -> Self
    where
        Self: Sized;
}

/// Everything about an op except its function.
///
/// Fields left empty are derived from the function: `name` from
/// [`ComputeFn::name`], missing value-receiving inputs from its parameters,
/// and missing outputs from its declared outputs.
#[derive(Debug, Clone, Default)]
pub struct OpConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub ins: Vec<InputDef>,
    pub outs: Vec<OutputDef>,
    pub required_resource_keys: BTreeSet<String>,
    pub tags: BTreeMap<String, String>,
}

/// A computation with named, described ports.
pub struct OpDefinition<F> {
    name: String,
    description: Option<String>,
    input_defs: Vec<InputDef>,
    output_defs: Vec<OutputDef>,
    required_resource_keys: BTreeSet<String>,
    tags: BTreeMap<String, String>,
    compute_fn: Arc<F>,
}

impl<F: ComputeFn> OpDefinition<F> {
    /// Bind `compute_fn` to the ports described by `config`.
    ///
    /// Input ports are the function's parameters (after a leading context
    /// parameter) in declaration order, followed by any dependency-only ports
    /// from `config.ins`. Output ports are the function's declared outputs.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::DuplicateDeclaration`] if a parameter, output, or
    ///   configured port name repeats.
    /// - [`DefinitionError::InputWithoutParameter`] if `config.ins` has a
    ///   value-receiving port with no matching parameter.
    /// - [`DefinitionError::UnknownOutputOverride`] if `config.outs` names an
    ///   output the function does not declare.
    pub fn new(config: OpConfig, compute_fn: F) -> Result<Self, DefinitionError> {
        let name = config.name.unwrap_or_else(|| compute_fn.name().to_string());
        let parameters = input_parameter_names(compute_fn.declared_parameters());
        let outputs = compute_fn.declared_outputs();

        check_unique_names(&name, PortKind::Input, parameters)?;
        check_unique_names(&name, PortKind::Output, outputs)?;
        check_unique_names(&name, PortKind::Input, config.ins.iter().map(|d| &d.name))?;
        check_unique_names(&name, PortKind::Output, config.outs.iter().map(|d| &d.name))?;

        let mut configured_ins: BTreeMap<String, InputDef> = config
            .ins
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        let mut input_defs: Vec<InputDef> = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let def = match configured_ins.remove(parameter) {
                Some(def) if !def.receives_value => {
                    return Err(DefinitionError::DuplicateDeclaration {
                        op: name,
                        kind: PortKind::Input,
                        name: parameter.clone(),
                    });
                }
                Some(def) => def,
                None => InputDef::new(parameter.clone()),
            };
            input_defs.push(def);
        }
        for (port, def) in configured_ins {
            if def.receives_value {
                return Err(DefinitionError::InputWithoutParameter { op: name, name: port });
            }
            input_defs.push(def);
        }

        let mut configured_outs: BTreeMap<String, OutputDef> = config
            .outs
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        if let Some(unknown) = configured_outs.keys().find(|k| !outputs.contains(*k)) {
            return Err(DefinitionError::UnknownOutputOverride {
                op: name,
                name: unknown.clone(),
                outputs: outputs.to_vec(),
            });
        }
        let output_defs: Vec<OutputDef> = outputs
            .iter()
            .map(|o| configured_outs.remove(o).unwrap_or_else(|| OutputDef::new(o.clone())))
            .collect();

        tracing::trace!(
            op = %name,
            inputs = input_defs.len(),
            outputs = output_defs.len(),
            "op ports resolved"
        );

        Ok(Self {
            name,
            description: config.description,
            input_defs,
            output_defs,
            required_resource_keys: config.required_resource_keys,
            tags: config.tags,
            compute_fn: Arc::new(compute_fn),
        })
    }

    /// Forward `args` to the wrapped function.
    pub fn invoke(&self, args: F::Args) -> F::Output {
        self.compute_fn.call(args)
    }
}

impl<F> OpDefinition<F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn input_defs(&self) -> &[InputDef] {
        &self.input_defs
    }

    pub fn output_defs(&self) -> &[OutputDef] {
        &self.output_defs
    }

    pub fn input_def(&self, name: &str) -> Option<&InputDef> {
        self.input_defs.iter().find(|d| d.name == name)
    }

    pub fn output_def(&self, name: &str) -> Option<&OutputDef> {
        self.output_defs.iter().find(|d| d.name == name)
    }

    pub fn required_resource_keys(&self) -> &BTreeSet<String> {
        &self.required_resource_keys
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn compute_fn(&self) -> &F {
        &self.compute_fn
    }
}

impl<F> Computation for OpDefinition<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_names(&self) -> Vec<&str> {
        self.input_defs.iter().map(|d| d.name.as_str()).collect()
    }

    fn output_names(&self) -> Vec<&str> {
        self.output_defs.iter().map(|d| d.name.as_str()).collect()
    }

    fn with_substituted_keys(
        &self,
        output_substitutions: &KeySubstitutions,
        input_substitutions: &KeySubstitutions,
    ) -> Self {
        let substitute = |key: &Option<AssetKey>, table: &KeySubstitutions| {
            key.as_ref()
                .map(|k| table.get(k).cloned().unwrap_or_else(|| k.clone()))
        };

        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            input_defs: self
                .input_defs
                .iter()
                .map(|d| InputDef {
                    asset_key: substitute(&d.asset_key, input_substitutions),
                    ..d.clone()
                })
                .collect(),
            output_defs: self
                .output_defs
                .iter()
                .map(|d| OutputDef {
                    asset_key: substitute(&d.asset_key, output_substitutions),
                    ..d.clone()
                })
                .collect(),
            required_resource_keys: self.required_resource_keys.clone(),
            tags: self.tags.clone(),
            compute_fn: Arc::clone(&self.compute_fn),
        }
    }
}

// Manual impls: `F` is shared behind an `Arc` and need not be `Clone`,
// `PartialEq`, or `Debug` itself.

impl<F> Clone for OpDefinition<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            input_defs: self.input_defs.clone(),
            output_defs: self.output_defs.clone(),
            required_resource_keys: self.required_resource_keys.clone(),
            tags: self.tags.clone(),
            compute_fn: Arc::clone(&self.compute_fn),
        }
    }
}

/// Two ops are equal when their descriptors match and they share the same
/// function instance.
impl<F> PartialEq for OpDefinition<F> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.input_defs == other.input_defs
            && self.output_defs == other.output_defs
            && self.required_resource_keys == other.required_resource_keys
            && self.tags == other.tags
            && Arc::ptr_eq(&self.compute_fn, &other.compute_fn)
    }
}

impl<F> fmt::Debug for OpDefinition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_defs", &self.input_defs)
            .field("output_defs", &self.output_defs)
            .field("required_resource_keys", &self.required_resource_keys)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

// --- tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn add() -> DeclaredFn<(i64, i64), i64> {
        DeclaredFn::new("add", ["context", "a", "b"], |(a, b): (i64, i64)| a + b)
    }

    #[test]
    fn ports_follow_parameters_after_context() {
        let op = OpDefinition::new(OpConfig::default(), add()).unwrap();
        assert_eq!(op.name(), "add");
        assert_eq!(op.input_names(), vec!["a", "b"]);
        assert_eq!(op.output_names(), vec![DEFAULT_OUTPUT]);
        assert_eq!(
            op.input_def("a").and_then(|d| d.input_manager_key.as_deref()),
            Some(ROOT_MANAGER_KEY)
        );
    }

    #[test]
    fn invoke_forwards_to_function() {
        let op = OpDefinition::new(OpConfig::default(), add()).unwrap();
        assert_eq!(op.invoke((2, 3)), 5);
    }

    #[test]
    fn dependency_only_ports_are_appended() {
        let key = AssetKey::new(["raw", "events"]).unwrap();
        let config = OpConfig {
            ins: vec![InputDef::dependency_only(key.clone())],
            ..Default::default()
        };
        let op = OpDefinition::new(config, add()).unwrap();
        assert_eq!(op.input_names(), vec!["a", "b", "raw_events"]);
        let dep = op.input_def("raw_events").unwrap();
        assert!(!dep.receives_value);
        assert_eq!(dep.asset_key.as_ref(), Some(&key));
    }

    #[test]
    fn value_input_without_parameter_rejected() {
        let config = OpConfig {
            ins: vec![InputDef::new("c")],
            ..Default::default()
        };
        assert_eq!(
            OpDefinition::new(config, add()),
            Err(DefinitionError::InputWithoutParameter {
                op: "add".into(),
                name: "c".into(),
            })
        );
    }

    #[test]
    fn unknown_output_rejected() {
        let config = OpConfig {
            outs: vec![OutputDef::new("total")],
            ..Default::default()
        };
        assert!(matches!(
            OpDefinition::new(config, add()),
            Err(DefinitionError::UnknownOutputOverride { name, .. }) if name == "total"
        ));
    }

    #[test]
    fn duplicate_parameters_rejected() {
        let f = DeclaredFn::new("dup", ["a", "a"], |_: ()| ());
        assert!(matches!(
            OpDefinition::new(OpConfig::default(), f),
            Err(DefinitionError::DuplicateDeclaration { kind: PortKind::Input, .. })
        ));
    }

    #[test]
    fn substitution_rewrites_recorded_keys_and_shares_function() {
        let old = AssetKey::new(["raw", "events"]).unwrap();
        let new = AssetKey::new(["prod", "raw", "events"]).unwrap();
        let config = OpConfig {
            ins: vec![InputDef::dependency_only(old.clone())],
            ..Default::default()
        };
        let op = OpDefinition::new(config, add()).unwrap();
        let renamed = op.with_substituted_keys(
            &KeySubstitutions::new(),
            &KeySubstitutions::from([(old.clone(), new.clone())]),
        );
        assert_eq!(renamed.input_def("raw_events").unwrap().asset_key.as_ref(), Some(&new));
        assert_eq!(op.input_def("raw_events").unwrap().asset_key.as_ref(), Some(&old));
        assert_eq!(renamed.invoke((1, 1)), 2);
        assert_eq!(op.with_substituted_keys(&KeySubstitutions::new(), &KeySubstitutions::new()), op);
    }
}
