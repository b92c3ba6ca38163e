//! Region partitioning
//!
//! Splits a scored region table into one output unit per region that has a
//! finer level below it. Units are emitted children first, so a parent unit
//! is only produced after all of its descendants' units.

use crate::config::OutputMode;
use crate::error::RegionError;
use crate::hierarchy::RegionTree;
use crate::models::RegionUnit;
use tracing::{debug, error, info};

/// Units to write, plus the subtrees that were refused
#[derive(Debug, Default)]
pub struct PartitionPlan {
    pub units: Vec<RegionUnit>,
    pub failures: Vec<RegionError>,
}

impl PartitionPlan {
    /// Rows covered by at least one unit, counted with multiplicity
    pub fn rows_emitted(&self) -> usize {
        self.units.iter().map(|u| u.rows.len()).sum()
    }
}

/// Partition a region tree into output units.
///
/// In `children` mode a root unit named `root_unit_name` lists the top-level
/// regions, so the units cover every attached row exactly once. Detached
/// subtrees are reported as partition integrity failures while every other
/// subtree still completes.
pub fn split(tree: &RegionTree, mode: OutputMode, root_unit_name: &str) -> PartitionPlan {
    let mut plan = PartitionPlan::default();

    for &root in tree.roots() {
        split_region(tree, root, mode, &mut plan.units);
    }

    if mode == OutputMode::Children && !tree.roots().is_empty() {
        plan.units.push(RegionUnit {
            code: root_unit_name.to_string(),
            name: root_unit_name.to_string(),
            level: root_unit_name.to_string(),
            ancestors: Vec::new(),
            rows: tree.roots().to_vec(),
            child_units: tree
                .roots()
                .iter()
                .filter(|&&row| has_unit(tree, row))
                .map(|&row| tree.node(row).code.clone())
                .collect(),
        });
    }

    for detached in tree.detached() {
        let failure = detached.to_error();
        error!("Refusing subtree: {}", failure);
        plan.failures.push(failure);
    }

    info!(
        "Partitioned {} regions into {} units ({} subtrees refused)",
        tree.len(),
        plan.units.len(),
        plan.failures.len()
    );
    plan
}

/// Regions at the finest level have no unit
fn has_unit(tree: &RegionTree, row: usize) -> bool {
    tree.node(row).depth + 1 < tree.hierarchy().len()
}

fn split_region(tree: &RegionTree, row: usize, mode: OutputMode, units: &mut Vec<RegionUnit>) {
    if !has_unit(tree, row) {
        return;
    }

    let node = tree.node(row);
    for &child in &node.children {
        split_region(tree, child, mode, units);
    }

    let rows = match mode {
        OutputMode::Children => node.children.clone(),
        OutputMode::Subtree => tree.subtree(row),
    };

    let mut ancestors: Vec<String> = tree.path(row).into_iter().map(str::to_string).collect();
    ancestors.pop();

    debug!(
        "Unit {} with {} rows under [{}]",
        node.code,
        rows.len(),
        ancestors.join("/")
    );

    units.push(RegionUnit {
        code: node.code.clone(),
        name: node.name.clone(),
        level: tree
            .hierarchy()
            .level_name(node.depth)
            .unwrap_or_default()
            .to_string(),
        ancestors,
        rows,
        child_units: node
            .children
            .iter()
            .filter(|&&child| has_unit(tree, child))
            .map(|&child| tree.node(child).code.clone())
            .collect(),
    });
}
