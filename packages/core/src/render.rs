//! Human-readable text rendering of [`AssetsDefinition`]s.
//!
//! The output is stable plain text for terminals and logs. It is not a
//! canonical format; tooling that needs structure should serialize the keys
//! and port maps instead.

use crate::definition::AssetsDefinition;
use crate::op::Computation;

/// Render one definition as indented plain text.
///
/// ```text
/// [op] warehouse__orders  1 asset  partitioned: static (2 partitions)
///
/// Outputs:
///   warehouse/orders  <- result
///
/// Inputs:
///   ns/A  -> upstream_a  (all_partitions)
///   raw/events  -> raw_events
///
/// Depends on:
///   warehouse/orders  <- ns/A, raw/events
/// ```
pub fn render_assets_definition<C: Computation>(def: &AssetsDefinition<C>) -> String {
    let mut out = String::new();

    // header line
    let count = def.output_names_by_key().len();
    let partitioned = def
        .partitions_def()
        .map(|p| format!("  partitioned: {p}"))
        .unwrap_or_default();
    out.push_str(&format!(
        "[op] {}  {} asset{}{}\n",
        def.op().name(),
        count,
        plural(count),
        partitioned
    ));

    out.push('\n');
    out.push_str("Outputs:\n");
    for (key, port) in def.output_names_by_key() {
        out.push_str(&format!("  {key}  <- {port}\n"));
    }

    if !def.input_names_by_key().is_empty() {
        out.push('\n');
        out.push_str("Inputs:\n");
        for (key, port) in def.input_names_by_key() {
            match def.partition_mappings().get(key) {
                Some(mapping) => out.push_str(&format!("  {key}  -> {port}  ({mapping})\n")),
                None => out.push_str(&format!("  {key}  -> {port}\n")),
            }
        }
    }

    // only worth listing when some output has upstream keys
    if def.asset_deps().values().any(|deps| !deps.is_empty()) {
        out.push('\n');
        out.push_str("Depends on:\n");
        for (key, deps) in def.asset_deps() {
            let deps: Vec<String> = deps.iter().map(ToString::to_string).collect();
            out.push_str(&format!("  {key}  <- {}\n", deps.join(", ")));
        }
    }

    out
}

/// Render several definitions as a one-line-per-asset summary.
///
/// ```text
/// Asset catalog  3 assets
/// ───────────────────────
///   orders/eu  (split)
///   orders/us  (split)
///   total  (total)
/// ```
pub fn render_catalog<'a, C, I>(defs: I) -> String
where
    C: Computation + 'a,
    I: IntoIterator<Item = &'a AssetsDefinition<C>>,
{
    let mut rows: Vec<(String, &str)> = defs
        .into_iter()
        .flat_map(|def| {
            def.output_names_by_key()
                .keys()
                .map(move |key| (key.to_string(), def.op().name()))
        })
        .collect();
    rows.sort();

    let header = format!("Asset catalog  {} asset{}", rows.len(), plural(rows.len()));
    let rule = "─".repeat(header.chars().count());
    let mut out = format!("{header}\n{rule}\n");
    for (key, op) in rows {
        out.push_str(&format!("  {key}  ({op})\n"));
    }
    out
}

// --- helpers -----------------------------------------------------------------

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

// --- tests -------------------------------------------------------------------
