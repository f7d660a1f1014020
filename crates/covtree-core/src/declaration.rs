//! Per-declaration coverage derived from positional containment
//!
//! A file's detail list is flat: declarations, statements and branches in no
//! particular nesting. [`DeclarationForest::build`] reconstructs the nesting of
//! declarations purely from their source ranges, and each node attributes the
//! statements (and their branches) that fall inside its own range.
//!
//! Containment is evaluated independently for every node against the full
//! list, so a statement inside a nested declaration also counts toward every
//! enclosing declaration.

use crate::model::{
    CoverageCount, DeclarationDetail, DetailEntry, Location, total_coverage_percent,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// Allocate a process-unique id for a derived display node.
pub fn next_node_id() -> u64 {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Index of a node inside its [`DeclarationForest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeclarationId(usize);

impl DeclarationId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Statement and branch coverage attributable to one declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributableCoverage {
    pub statement: CoverageCount,
    pub branch: CoverageCount,
}

impl AttributableCoverage {
    pub fn tpc(&self) -> f64 {
        total_coverage_percent(&self.statement, Some(&self.branch), None)
    }
}

/// A declaration and the detail records positionally contained in it
#[derive(Debug)]
pub struct DeclarationCoverageNode {
    id: u64,
    data: DeclarationDetail,
    details: Arc<[DetailEntry]>,
    /// Indices into `details`, ascending. Fixed at construction.
    contained: Vec<usize>,
    children: Vec<DeclarationId>,
    attributable: OnceLock<Option<AttributableCoverage>>,
}

impl DeclarationCoverageNode {
    fn new(data: DeclarationDetail, details: Arc<[DetailEntry]>) -> Self {
        let contained = match &data.location {
            Location::Range(own) => details
                .iter()
                .enumerate()
                .filter(|(_, detail)| match detail.location() {
                    Some(Location::Range(range)) => own.contains_range(&range),
                    Some(Location::Position(position)) => own.contains_position(position),
                    None => false,
                })
                .map(|(index, _)| index)
                .collect(),
            Location::Position(_) => Vec::new(),
        };

        Self {
            id: next_node_id(),
            data,
            details,
            contained,
            children: Vec::new(),
            attributable: OnceLock::new(),
        }
    }

    /// Process-unique id, stable for the lifetime of the node
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.data.name
    }

    pub fn hits(&self) -> u64 {
        self.data.count
    }

    pub fn location(&self) -> Location {
        self.data.location
    }

    pub fn children(&self) -> &[DeclarationId] {
        &self.children
    }

    /// Whether the detail at `index` in the file's detail list lies inside this declaration.
    pub fn contains_detail(&self, index: usize) -> bool {
        self.contained.binary_search(&index).is_ok()
    }

    /// Detail records inside this declaration's range, in file order.
    pub fn contained_details(&self) -> impl Iterator<Item = &DetailEntry> + '_ {
        self.contained.iter().map(|&index| &self.details[index])
    }

    /// Statement and branch coverage of the statements inside this declaration.
    ///
    /// `None` when the declaration has no range or was never entered. Computed
    /// once; later calls return the cached value.
    pub fn attributable_coverage(&self) -> Option<&AttributableCoverage> {
        self.attributable
            .get_or_init(|| self.compute_attributable())
            .as_ref()
    }

    /// Combined coverage ratio of [`Self::attributable_coverage`]
    pub fn tpc(&self) -> Option<f64> {
        self.attributable_coverage().map(AttributableCoverage::tpc)
    }

    fn compute_attributable(&self) -> Option<AttributableCoverage> {
        if self.data.location.as_range().is_none() || self.data.count == 0 {
            return None;
        }

        let mut statement = CoverageCount::default();
        let mut branch = CoverageCount::default();
        for detail in self.contained_details() {
            let DetailEntry::Statement(s) = detail else {
                continue;
            };
            statement.record(s.count);
            for b in &s.branches {
                branch.record(b.count);
            }
        }

        Some(AttributableCoverage { statement, branch })
    }
}

/// All declaration nodes of one file, nested by containment.
#[derive(Debug)]
pub struct DeclarationForest {
    nodes: Vec<DeclarationCoverageNode>,
    roots: Vec<DeclarationId>,
}

impl DeclarationForest {
    /// Build the declaration hierarchy for a file's flat detail list.
    ///
    /// Declarations are visited in list order. Each one descends through the
    /// nodes built so far, following the first node at every level whose
    /// contained set includes it, and is appended where that walk stops.
    pub fn build(details: impl Into<Arc<[DetailEntry]>>) -> Self {
        let details: Arc<[DetailEntry]> = details.into();
        let mut nodes: Vec<DeclarationCoverageNode> = Vec::new();
        let mut roots: Vec<DeclarationId> = Vec::new();

        for (index, detail) in details.iter().enumerate() {
            let DetailEntry::Declaration(decl) = detail else {
                continue;
            };

            let mut parent: Option<DeclarationId> = None;
            loop {
                let siblings = match parent {
                    None => &roots,
                    Some(p) => &nodes[p.0].children,
                };
                match siblings
                    .iter()
                    .copied()
                    .find(|candidate| nodes[candidate.0].contains_detail(index))
                {
                    Some(found) => parent = Some(found),
                    None => break,
                }
            }

            let id = DeclarationId(nodes.len());
            nodes.push(DeclarationCoverageNode::new(
                decl.clone(),
                Arc::clone(&details),
            ));
            match parent {
                None => roots.push(id),
                Some(p) => nodes[p.0].children.push(id),
            }
        }

        Self { nodes, roots }
    }

    pub fn roots(&self) -> &[DeclarationId] {
        &self.roots
    }

    pub fn node(&self, id: DeclarationId) -> &DeclarationCoverageNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find a node by label (first match in construction order)
    pub fn find(&self, label: &str) -> Option<DeclarationId> {
        self.nodes
            .iter()
            .position(|n| n.label() == label)
            .map(DeclarationId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeclarationId, &DeclarationCoverageNode)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (DeclarationId(index), node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Position, Range};

    fn at(line: u32) -> Position {
        Position::new(line, 0)
    }

    fn nested_fixture() -> Vec<DetailEntry> {
        vec![
            DetailEntry::declaration("outer", Range::lines(0, 100), 1),
            DetailEntry::declaration("inner", Range::lines(10, 20), 1),
            DetailEntry::statement(at(15), 1),
            DetailEntry::statement(at(50), 0),
        ]
    }

    #[test]
    fn nested_declarations_share_statements() {
        let forest = DeclarationForest::build(nested_fixture());
        let outer = forest.find("outer").expect("outer");
        let inner = forest.find("inner").expect("inner");

        assert_eq!(forest.roots(), &[outer]);
        assert_eq!(forest.node(outer).children(), &[inner]);

        let inner_cov = forest.node(inner).attributable_coverage().expect("inner coverage");
        assert_eq!(inner_cov.statement, CoverageCount::new(1, 1));

        let outer_cov = forest.node(outer).attributable_coverage().expect("outer coverage");
        assert_eq!(outer_cov.statement, CoverageCount::new(1, 2));
        assert_eq!(forest.node(outer).tpc(), Some(0.5));
    }

    #[test]
    fn attributable_coverage_is_memoized() {
        let forest = DeclarationForest::build(nested_fixture());
        let node = forest.node(forest.find("outer").expect("outer"));
        let first = node.attributable_coverage().expect("coverage");
        let second = node.attributable_coverage().expect("coverage");
        assert!(std::ptr::eq(first, second));
        assert_eq!(first, second);
    }

    #[test]
    fn branches_are_counted_under_statements() {
        let forest = DeclarationForest::build(vec![
            DetailEntry::declaration("f", Range::lines(0, 10), 2),
            DetailEntry::statement_with_branches(at(3), 2, [1, 0, 4]),
        ]);
        let cov = forest.node(forest.roots()[0]).attributable_coverage().expect("coverage");
        assert_eq!(cov.statement, CoverageCount::new(1, 1));
        assert_eq!(cov.branch, CoverageCount::new(2, 3));
    }

    #[test]
    fn unhit_or_point_declarations_have_no_attributable_coverage() {
        let forest = DeclarationForest::build(vec![
            DetailEntry::declaration("never", Range::lines(0, 10), 0),
            DetailEntry::declaration("point", at(20), 3),
            DetailEntry::statement(at(5), 0),
        ]);
        assert_eq!(forest.roots().len(), 2);
        for (_, node) in forest.iter() {
            assert!(node.attributable_coverage().is_none());
            assert!(node.tpc().is_none());
        }
    }

    #[test]
    fn siblings_stay_at_the_same_level() {
        let forest = DeclarationForest::build(vec![
            DetailEntry::declaration("class", Range::lines(0, 50), 1),
            DetailEntry::declaration("a", Range::lines(1, 10), 1),
            DetailEntry::declaration("b", Range::lines(11, 20), 0),
            DetailEntry::declaration("a.inner", Range::lines(2, 4), 1),
            DetailEntry::declaration("free", Range::lines(60, 70), 1),
        ]);
        let class = forest.find("class").expect("class");
        let a = forest.find("a").expect("a");
        let b = forest.find("b").expect("b");
        let inner = forest.find("a.inner").expect("a.inner");
        let free = forest.find("free").expect("free");

        assert_eq!(forest.roots(), &[class, free]);
        assert_eq!(forest.node(class).children(), &[a, b]);
        assert_eq!(forest.node(a).children(), &[inner]);
        assert!(forest.node(b).children().is_empty());
    }

    #[test]
    fn node_ids_are_unique() {
        let forest = DeclarationForest::build(nested_fixture());
        let ids: std::collections::HashSet<u64> = forest.iter().map(|(_, n)| n.id()).collect();
        assert_eq!(ids.len(), forest.len());
    }
}
