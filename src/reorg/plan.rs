use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::path::parse_path;
use crate::config::{NodeIdentity, DEFAULT_DELIMITER};
use crate::model::{CategoryNode, Dependent, FlatCategory};
use crate::AppError;

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub delimiter: String,
    pub identity: NodeIdentity,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            identity: NodeIdentity::Segment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("category {id} has an empty segment at position {position}: {name:?}")]
    MalformedCategoryName {
        id: i64,
        name: String,
        position: usize,
    },
}

impl From<PlanError> for AppError {
    fn from(error: PlanError) -> Self {
        let message = error.to_string();
        match error {
            PlanError::MalformedCategoryName { id, name, position } => {
                AppError::new(AppError::MALFORMED_NAME_CODE, message)
                    .with_context("category_id", id.to_string())
                    .with_context("name", name)
                    .with_context("position", position.to_string())
            }
        }
    }
}

/// One source category after its name was split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCategory {
    pub id: i64,
    pub name: String,
    pub segments: Vec<String>,
    /// Identity key of the node the category's last segment resolved to.
    pub leaf_key: String,
}

/// Where a dependent row will point once the tree is in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependentAssignment {
    pub table: String,
    pub column: String,
    pub id: i64,
    pub previous_category_id: i64,
    /// `None` when the dependent referenced no source category.
    pub leaf: Option<String>,
}

/// A node reached through a different parent than the one it was first
/// seen under. The first parent is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentConflict {
    pub segment: String,
    pub kept_parent: Option<String>,
    pub ignored_parent: Option<String>,
    pub category_id: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyPlan {
    pub delimiter: String,
    pub identity: NodeIdentity,
    pub sources: Vec<ParsedCategory>,
    /// Nodes keyed by identity key, in first-seen order.
    pub nodes: IndexMap<String, CategoryNode>,
    pub assignments: Vec<DependentAssignment>,
    pub parent_conflicts: Vec<ParentConflict>,
    /// The id the next freshly minted node would have received.
    pub next_id: i64,
}

impl HierarchyPlan {
    pub fn node(&self, key: &str) -> Option<&CategoryNode> {
        self.nodes.get(key)
    }

    pub fn node_id(&self, key: &str) -> Option<i64> {
        self.nodes.get(key).map(|node| node.id)
    }

    /// Nodes in ascending id order, the order they are inserted in.
    pub fn nodes_by_id(&self) -> Vec<&CategoryNode> {
        let mut nodes: Vec<&CategoryNode> = self.nodes.values().collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }

    pub fn root_count(&self) -> usize {
        self.nodes.values().filter(|node| node.is_root()).count()
    }

    pub fn sub_count(&self) -> usize {
        self.nodes.len() - self.root_count()
    }

    /// Nodes that kept the id of a source category.
    pub fn reused_count(&self) -> usize {
        let source_ids: HashSet<i64> = self.sources.iter().map(|source| source.id).collect();
        self.nodes
            .values()
            .filter(|node| source_ids.contains(&node.id))
            .count()
    }

    pub fn unresolved_assignments(&self) -> impl Iterator<Item = &DependentAssignment> {
        self.assignments.iter().filter(|assignment| {
            assignment
                .leaf
                .as_deref()
                .map_or(true, |leaf| !self.nodes.contains_key(leaf))
        })
    }
}

struct PlannedNode {
    node: CategoryNode,
    parent_key: Option<String>,
}

/// Builds the category tree and the dependent remapping from the flat rows.
///
/// Walks every path left to right. The first time an identity key is seen
/// it gets an id and a parent; later sightings reuse both. A root segment
/// equal to the trimmed name of an undelimited source category keeps that
/// category's id (the lowest one when several share the name); every other
/// new node gets the next id above the largest existing one.
pub fn build_plan(
    categories: &[FlatCategory],
    dependents: &[Dependent],
    options: &PlanOptions,
) -> Result<HierarchyPlan, PlanError> {
    let delimiter = options.delimiter.as_str();

    let mut existing_by_name: HashMap<&str, i64> = HashMap::new();
    for category in categories
        .iter()
        .filter(|category| !category.name.contains(delimiter))
    {
        existing_by_name
            .entry(category.name.trim())
            .and_modify(|id| *id = (*id).min(category.id))
            .or_insert(category.id);
    }
    let mut next_id = categories.iter().map(|c| c.id).max().unwrap_or(0) + 1;

    let mut planned: IndexMap<String, PlannedNode> = IndexMap::new();
    let mut sources = Vec::with_capacity(categories.len());
    let mut parent_conflicts = Vec::new();
    let mut seen_conflicts: HashSet<(String, Option<String>)> = HashSet::new();

    for category in categories {
        let segments = parse_path(category, delimiter)?;
        debug!(
            target: "category_reorg",
            event = "category_parsed",
            category_id = category.id,
            name = %category.name,
            depth = segments.len()
        );

        let mut previous_key: Option<String> = None;
        for (position, segment) in segments.iter().enumerate() {
            let key = match options.identity {
                NodeIdentity::Segment => segment.clone(),
                NodeIdentity::Path => segments[..=position].join(delimiter),
            };

            match planned.get(&key) {
                Some(existing) => {
                    if existing.parent_key != previous_key
                        && seen_conflicts.insert((key.clone(), previous_key.clone()))
                    {
                        warn!(
                            target: "category_reorg",
                            event = "parent_conflict",
                            segment = %key,
                            kept_parent = ?existing.parent_key,
                            ignored_parent = ?previous_key,
                            category_id = category.id
                        );
                        parent_conflicts.push(ParentConflict {
                            segment: key.clone(),
                            kept_parent: existing.parent_key.clone(),
                            ignored_parent: previous_key.clone(),
                            category_id: category.id,
                        });
                    }
                }
                None => {
                    let reused = if position == 0 {
                        existing_by_name.get(segment.as_str()).copied()
                    } else {
                        None
                    };
                    let id = match reused {
                        Some(id) => id,
                        None => {
                            let id = next_id;
                            next_id += 1;
                            id
                        }
                    };
                    let parent_id = previous_key
                        .as_deref()
                        .and_then(|parent| planned.get(parent))
                        .map(|parent| parent.node.id);
                    planned.insert(
                        key.clone(),
                        PlannedNode {
                            node: CategoryNode {
                                id,
                                name: segment.clone(),
                                parent_id,
                            },
                            parent_key: previous_key.clone(),
                        },
                    );
                }
            }
            previous_key = Some(key);
        }

        sources.push(ParsedCategory {
            id: category.id,
            name: category.name.clone(),
            leaf_key: previous_key.unwrap_or_default(),
            segments,
        });
    }

    let leaf_by_source: HashMap<i64, &str> = sources
        .iter()
        .map(|source| (source.id, source.leaf_key.as_str()))
        .collect();
    let assignments: Vec<DependentAssignment> = dependents
        .iter()
        .map(|dependent| DependentAssignment {
            table: dependent.table.clone(),
            column: dependent.column.clone(),
            id: dependent.id,
            previous_category_id: dependent.category_ref,
            leaf: leaf_by_source
                .get(&dependent.category_ref)
                .map(|leaf| leaf.to_string()),
        })
        .collect();

    let nodes: IndexMap<String, CategoryNode> = planned
        .into_iter()
        .map(|(key, planned)| (key, planned.node))
        .collect();

    let plan = HierarchyPlan {
        delimiter: delimiter.to_string(),
        identity: options.identity,
        sources,
        nodes,
        assignments,
        parent_conflicts,
        next_id,
    };

    info!(
        target: "category_reorg",
        event = "hierarchy_planned",
        sources = plan.sources.len(),
        nodes = plan.nodes.len(),
        roots = plan.root_count(),
        reused = plan.reused_count(),
        dependents = plan.assignments.len(),
        parent_conflicts = plan.parent_conflicts.len()
    );

    Ok(plan)
}
