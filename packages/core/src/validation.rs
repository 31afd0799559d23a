//! Cross-checks shared by the builders and [`AssetsDefinition`](crate::AssetsDefinition).
//!
//! Each helper returns the first problem found, naming the offending key or
//! port and what would have been accepted instead.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{DefinitionError, InconsistentPortError};
use crate::key::{AssetKey, KeySubstitutions};
use crate::op::PortKind;

/// Fail with [`DefinitionError::DuplicateDeclaration`] on the first repeated
/// name.
pub fn check_unique_names<'a>(
    op: &str,
    kind: PortKind,
    names: impl IntoIterator<Item = &'a String>,
) -> Result<(), DefinitionError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(DefinitionError::DuplicateDeclaration {
                op: op.to_string(),
                kind,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// Every override name must be one of the `declared` port names.
pub fn check_overrides_declared<'a>(
    op: &str,
    kind: PortKind,
    overrides: impl IntoIterator<Item = &'a String>,
    declared: &[String],
) -> Result<(), DefinitionError> {
    for name in overrides {
        if !declared.contains(name) {
            return Err(match kind {
                PortKind::Input => DefinitionError::UnknownInputOverride {
                    op: op.to_string(),
                    name: name.clone(),
                    parameters: declared.to_vec(),
                },
                PortKind::Output => DefinitionError::UnknownOutputOverride {
                    op: op.to_string(),
                    name: name.clone(),
                    outputs: declared.to_vec(),
                },
            });
        }
    }
    Ok(())
}

/// Every port named in `ports` must be one of the computation's `declared`
/// ports.
pub fn check_ports_declared(
    op: &str,
    kind: PortKind,
    ports: &BTreeMap<AssetKey, String>,
    declared: &[&str],
) -> Result<(), InconsistentPortError> {
    for (key, port) in ports {
        if !declared.contains(&port.as_str()) {
            return Err(InconsistentPortError {
                op: op.to_string(),
                kind,
                key: key.clone(),
                port: port.clone(),
                declared: declared.iter().map(|d| d.to_string()).collect(),
            });
        }
    }
    Ok(())
}

/// Invert a key → port map, failing if two keys share a port.
pub fn invert_port_map(
    op: &str,
    kind: PortKind,
    ports: &BTreeMap<AssetKey, String>,
) -> Result<BTreeMap<String, AssetKey>, DefinitionError> {
    let mut inverted: BTreeMap<String, AssetKey> = BTreeMap::new();
    for (key, port) in ports {
        if let Some(first) = inverted.insert(port.clone(), key.clone()) {
            return Err(DefinitionError::DuplicatePortName {
                op: op.to_string(),
                kind,
                name: port.clone(),
                first,
                second: key.clone(),
            });
        }
    }
    Ok(inverted)
}

/// Rename the keys of `map` through `substitutions`, failing if two distinct
/// keys land on the same target.
pub fn substitute_map_keys<V: Clone>(
    op: &str,
    map: &BTreeMap<AssetKey, V>,
    substitutions: &KeySubstitutions,
) -> Result<BTreeMap<AssetKey, V>, DefinitionError> {
    let mut out: BTreeMap<AssetKey, V> = BTreeMap::new();
    let mut origin: BTreeMap<AssetKey, &AssetKey> = BTreeMap::new();
    for (key, value) in map {
        let target = substitute(key, substitutions);
        if let Some(first) = origin.insert(target.clone(), key) {
            return Err(DefinitionError::SubstitutionCollision {
                op: op.to_string(),
                target,
                first: first.clone(),
                second: key.clone(),
            });
        }
        out.insert(target, value.clone());
    }
    Ok(out)
}

/// `key` renamed through `substitutions`, or `key` itself when absent.
pub fn substitute(key: &AssetKey, substitutions: &KeySubstitutions) -> AssetKey {
    substitutions.get(key).cloned().unwrap_or_else(|| key.clone())
}

/// A namespace is a key prefix; every segment must be a valid key segment.
pub fn check_namespace(namespace: &[String]) -> Result<(), DefinitionError> {
    if namespace.is_empty() {
        return Ok(());
    }
    AssetKey::new(namespace.iter().cloned())?;
    Ok(())
}

// --- tests -------------------------------------------------------------------
