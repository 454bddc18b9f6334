#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, HashSet};

use category_reorg_lib::config::NodeIdentity;
use category_reorg_lib::model::{Dependent, FlatCategory};
use category_reorg_lib::reorg::{build_plan, HierarchyPlan, PlanOptions};
use proptest::prelude::*;

const SEGMENTS: &[&str] = &[
    "Gia vị",
    "Nước chấm",
    "Mắm tôm",
    "Đồ uống",
    "Sữa",
    "Bánh kẹo",
];

fn catalog() -> impl Strategy<Value = (Vec<FlatCategory>, Vec<Dependent>)> {
    let path = (
        prop::collection::vec(0..SEGMENTS.len(), 1..5),
        prop::bool::ANY,
    );
    prop::collection::vec(path, 1..12).prop_map(|paths| {
        let categories: Vec<FlatCategory> = paths
            .iter()
            .enumerate()
            .map(|(idx, (segments, spaced))| {
                let separator = if *spaced { " >> " } else { ">>" };
                let name = segments
                    .iter()
                    .map(|&s| SEGMENTS[s])
                    .collect::<Vec<_>>()
                    .join(separator);
                FlatCategory::new(idx as i64 + 1, name)
            })
            .collect();
        let dependents = categories
            .iter()
            .enumerate()
            .map(|(idx, category)| {
                Dependent::new("Products", "CategoryId", 100 + idx as i64, category.id)
            })
            .collect();
        (categories, dependents)
    })
}

fn options(identity: NodeIdentity) -> PlanOptions {
    PlanOptions {
        identity,
        ..PlanOptions::default()
    }
}

/// Walks parent links from every node; a chain longer than the node count
/// would mean a cycle.
fn assert_forest(plan: &HierarchyPlan) {
    let parents: HashMap<i64, Option<i64>> = plan
        .nodes
        .values()
        .map(|node| (node.id, node.parent_id))
        .collect();
    assert_eq!(parents.len(), plan.nodes.len(), "node ids are unique");
    for node in plan.nodes.values() {
        let mut current = node.parent_id;
        let mut hops = 0;
        while let Some(id) = current {
            assert!(parents.contains_key(&id), "parent {id} is a planned node");
            current = parents[&id];
            hops += 1;
            assert!(hops <= plan.nodes.len(), "cycle through node {}", node.id);
        }
    }
}

proptest! {
    #[test]
    fn segments_follow_the_delimiters((categories, dependents) in catalog()) {
        let plan = build_plan(&categories, &dependents, &options(NodeIdentity::Segment)).unwrap();
        for (source, category) in plan.sources.iter().zip(&categories) {
            prop_assert_eq!(source.segments.len(), category.name.matches(">>").count() + 1);
            for segment in &source.segments {
                prop_assert_eq!(segment.trim(), segment.as_str());
                prop_assert!(!segment.is_empty());
            }
        }
    }

    #[test]
    fn segment_identity_yields_one_node_per_name((categories, dependents) in catalog()) {
        let plan = build_plan(&categories, &dependents, &options(NodeIdentity::Segment)).unwrap();
        let names: HashSet<&str> = plan.nodes.values().map(|node| node.name.as_str()).collect();
        prop_assert_eq!(names.len(), plan.nodes.len());
        assert_forest(&plan);
    }

    #[test]
    fn every_dependent_lands_on_its_leaf((categories, dependents) in catalog()) {
        let plan = build_plan(&categories, &dependents, &options(NodeIdentity::Segment)).unwrap();
        prop_assert_eq!(plan.assignments.len(), dependents.len());
        prop_assert_eq!(plan.unresolved_assignments().count(), 0);
        for (assignment, source) in plan.assignments.iter().zip(&plan.sources) {
            let leaf = assignment.leaf.as_deref().unwrap();
            prop_assert_eq!(Some(leaf), source.segments.last().map(String::as_str));
            prop_assert!(plan.node_id(leaf).is_some());
        }
    }

    #[test]
    fn path_identity_rebuilds_each_path((categories, dependents) in catalog()) {
        let plan = build_plan(&categories, &dependents, &options(NodeIdentity::Path)).unwrap();
        prop_assert!(plan.parent_conflicts.is_empty());
        assert_forest(&plan);

        let by_id: HashMap<i64, _> = plan.nodes.values().map(|node| (node.id, node)).collect();
        for source in &plan.sources {
            let mut names = Vec::new();
            let mut current = plan.node(&source.leaf_key).map(|node| node.id);
            while let Some(id) = current {
                let node = by_id[&id];
                names.push(node.name.clone());
                current = node.parent_id;
            }
            names.reverse();
            prop_assert_eq!(&names, &source.segments);
        }
    }

    #[test]
    fn planning_is_deterministic((categories, dependents) in catalog()) {
        let first = build_plan(&categories, &dependents, &options(NodeIdentity::Segment)).unwrap();
        let second = build_plan(&categories, &dependents, &options(NodeIdentity::Segment)).unwrap();
        prop_assert_eq!(
            first.nodes_by_id().into_iter().cloned().collect::<Vec<_>>(),
            second.nodes_by_id().into_iter().cloned().collect::<Vec<_>>()
        );
        prop_assert_eq!(first.next_id, second.next_id);
    }
}
