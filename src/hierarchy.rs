//! Region hierarchy reconstruction.
//!
//! Turns the flat, pre-ordered region table into an explicit tree of region
//! nodes, built once per loaded table. Every row becomes a node whose id is
//! its row index. Rows that break the ordering invariant are kept as
//! detached subtree roots so the rest of the tree stays usable.

use crate::constants::{CODE_COLUMN, NAME_COLUMN, TYPE_COLUMN};
use crate::error::{RegionError, Result};
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Ordered region levels, coarsest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hierarchy {
    levels: Vec<String>,
}

impl Hierarchy {
    pub fn new<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }

    /// Depth of a level name (0 = coarsest)
    pub fn depth_of(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == level)
    }

    /// Level name at a depth
    pub fn level_name(&self, depth: usize) -> Option<&str> {
        self.levels.get(depth).map(String::as_str)
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// One region (one table row)
#[derive(Debug, Clone, Serialize)]
pub struct RegionNode {
    pub row: usize,
    pub depth: usize,
    pub code: String,
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub detached: bool,
}

/// A row that could not be attached where the ordering says it belongs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetachedRegion {
    pub row: usize,
    pub code: String,
    pub reason: String,
}

impl DetachedRegion {
    pub fn to_error(&self) -> RegionError {
        RegionError::PartitionIntegrity {
            code: self.code.clone(),
            row: self.row,
            reason: self.reason.clone(),
        }
    }
}

/// Explicit region tree over a region table
#[derive(Debug, Clone)]
pub struct RegionTree {
    hierarchy: Hierarchy,
    nodes: Vec<RegionNode>,
    roots: Vec<usize>,
    detached: Vec<DetachedRegion>,
}

impl RegionTree {
    /// Build the tree from the `type`, `code` and `name` columns of a frame
    pub fn from_frame(dataset: &str, frame: &DataFrame, hierarchy: Hierarchy) -> Result<Self> {
        let types = string_values(frame, TYPE_COLUMN)
            .ok_or_else(|| RegionError::schema(dataset, TYPE_COLUMN))??;
        let codes = string_values(frame, CODE_COLUMN)
            .ok_or_else(|| RegionError::schema(dataset, CODE_COLUMN))??;
        let names = match string_values(frame, NAME_COLUMN) {
            Some(names) => names?,
            None => vec![None; frame.height()],
        };

        let types: Vec<Option<&str>> = types.iter().map(|t| t.as_deref()).collect();
        let codes: Vec<Option<&str>> = codes.iter().map(|c| c.as_deref()).collect();
        let names: Vec<Option<&str>> = names.iter().map(|n| n.as_deref()).collect();

        Self::from_columns(dataset, hierarchy, &types, &codes, &names)
    }

    /// Build the tree from parallel column slices in row order
    pub fn from_columns(
        dataset: &str,
        hierarchy: Hierarchy,
        types: &[Option<&str>],
        codes: &[Option<&str>],
        names: &[Option<&str>],
    ) -> Result<Self> {
        let mut nodes: Vec<RegionNode> = Vec::with_capacity(types.len());
        let mut roots = Vec::new();
        let mut detached = Vec::new();
        let mut seen: HashSet<(usize, String)> = HashSet::new();

        // Most recent row at each shallower depth, innermost last
        let mut chain: Vec<usize> = Vec::with_capacity(hierarchy.len());

        for row in 0..types.len() {
            let type_value = types[row].unwrap_or_default();
            let depth = hierarchy
                .depth_of(type_value)
                .ok_or_else(|| RegionError::UnknownRegionType {
                    dataset: dataset.to_string(),
                    row,
                    value: type_value.to_string(),
                })?;

            while chain.last().is_some_and(|&top| nodes[top].depth >= depth) {
                chain.pop();
            }

            let code = codes
                .get(row)
                .copied()
                .flatten()
                .map(str::to_string)
                .unwrap_or_default();
            let name = names
                .get(row)
                .copied()
                .flatten()
                .map(str::to_string)
                .unwrap_or_default();

            let reason = if code.is_empty() {
                Some("missing region code".to_string())
            } else if !seen.insert((depth, code.clone())) {
                Some(format!("duplicate {} code", type_value))
            } else if depth > 0 {
                match chain.last() {
                    Some(&top) if nodes[top].depth + 1 == depth => None,
                    _ => Some(format!(
                        "no preceding {} row",
                        hierarchy.level_name(depth - 1).unwrap_or("parent")
                    )),
                }
            } else {
                None
            };

            let parent = match (&reason, depth) {
                (None, d) if d > 0 => chain.last().copied(),
                _ => None,
            };

            if let Some(reason) = &reason {
                warn!("Detaching region {} at row {}: {}", code, row, reason);
                detached.push(DetachedRegion {
                    row,
                    code: code.clone(),
                    reason: reason.clone(),
                });
            } else if depth == 0 {
                roots.push(row);
            }

            if let Some(parent) = parent {
                nodes[parent].children.push(row);
            }

            nodes.push(RegionNode {
                row,
                depth,
                code,
                name,
                parent,
                children: Vec::new(),
                detached: reason.is_some(),
            });
            chain.push(row);
        }

        debug!(
            "Built region tree for {}: {} regions, {} roots, {} detached",
            dataset,
            nodes.len(),
            roots.len(),
            detached.len()
        );

        Ok(Self {
            hierarchy,
            nodes,
            roots,
            detached,
        })
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn nodes(&self) -> &[RegionNode] {
        &self.nodes
    }

    pub fn node(&self, row: usize) -> &RegionNode {
        &self.nodes[row]
    }

    /// Top-level regions that attached cleanly
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Rows that start a detached subtree
    pub fn detached(&self) -> &[DetachedRegion] {
        &self.detached
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Codes from the top of the node's subtree down to the node itself
    pub fn path(&self, row: usize) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = Some(row);
        while let Some(r) = current {
            path.push(self.nodes[r].code.as_str());
            current = self.nodes[r].parent;
        }
        path.reverse();
        path
    }

    /// Human readable hierarchy path, e.g. `NL00 > GM0014 > WK001400`
    pub fn path_string(&self, row: usize) -> String {
        self.path(row).join(" > ")
    }

    /// Rows of the subtree rooted at `row`, in pre-order
    pub fn subtree(&self, row: usize) -> Vec<usize> {
        let mut rows = Vec::new();
        let mut pending = vec![row];
        while let Some(r) = pending.pop() {
            rows.push(r);
            pending.extend(self.nodes[r].children.iter().rev());
        }
        rows
    }

    /// Number of regions at each depth
    pub fn count_by_depth(&self) -> Vec<usize> {
        let mut counts = vec![0; self.hierarchy.len()];
        for node in &self.nodes {
            counts[node.depth] += 1;
        }
        counts
    }
}

fn string_values(frame: &DataFrame, name: &str) -> Option<Result<Vec<Option<String>>>> {
    let column = frame.column(name).ok()?;
    let values = column
        .cast(&DataType::String)
        .map_err(RegionError::from)
        .and_then(|c| {
            Ok(c.str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect::<Vec<_>>())
        });
    Some(values)
}
