//! Rows shown by the coverage tree

use covtree_core::{DeclarationCoverageNode, DeclarationForest, DeclarationId, next_node_id};
use std::sync::Arc;

use crate::coverage::{CoverageTreeNode, basename_or_authority};
use crate::test_id::TestItem;
use crate::tree::{RowKey, TreeElement};

/// One row of the coverage tree
#[derive(Debug, Clone)]
pub enum CoverageElement {
    /// A file or directory of the coverage path tree
    File(Arc<CoverageTreeNode>),
    Declaration(DeclarationRow),
    /// Placeholder shown while a file's details are fetched
    Loading(LoadingDetails),
    /// Stand-in for declarations that were never hit
    RevealUncovered(RevealUncoveredDeclarations),
    /// Header naming the test the tree is filtered to
    FilteredTo(CurrentlyFilteredTo),
}

/// A declaration of a file, addressed inside the file's forest
#[derive(Debug, Clone)]
pub struct DeclarationRow {
    pub uri: String,
    pub forest: Arc<DeclarationForest>,
    pub id: DeclarationId,
}

impl DeclarationRow {
    pub fn node(&self) -> &DeclarationCoverageNode {
        self.forest.node(self.id)
    }
}

#[derive(Debug, Clone)]
pub struct LoadingDetails {
    pub id: u64,
}

impl LoadingDetails {
    pub const LABEL: &'static str = "Loading Coverage Details...";

    pub fn new() -> Self {
        Self { id: next_node_id() }
    }
}

impl Default for LoadingDetails {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct RevealUncoveredDeclarations {
    pub id: u64,
    pub uri: String,
    pub forest: Arc<DeclarationForest>,
    pub hidden: Vec<DeclarationId>,
}

impl RevealUncoveredDeclarations {
    pub fn new(uri: String, forest: Arc<DeclarationForest>, hidden: Vec<DeclarationId>) -> Self {
        Self {
            id: next_node_id(),
            uri,
            forest,
            hidden,
        }
    }

    pub fn count(&self) -> usize {
        self.hidden.len()
    }
}

#[derive(Debug, Clone)]
pub struct CurrentlyFilteredTo {
    pub id: u64,
    pub test: TestItem,
}

impl CurrentlyFilteredTo {
    pub fn new(test: TestItem) -> Self {
        Self {
            id: next_node_id(),
            test,
        }
    }
}

impl TreeElement for CoverageElement {
    fn key(&self) -> RowKey {
        match self {
            Self::File(node) => RowKey::File(node.id().to_string()),
            Self::Declaration(row) => RowKey::Node(row.node().id()),
            Self::Loading(row) => RowKey::Node(row.id),
            Self::RevealUncovered(row) => RowKey::Node(row.id),
            Self::FilteredTo(row) => RowKey::Node(row.id),
        }
    }

    fn unchanged(&self, previous: &Self) -> bool {
        match (self, previous) {
            (Self::File(a), Self::File(b)) => Arc::ptr_eq(a, b),
            (Self::Declaration(a), Self::Declaration(b)) => {
                Arc::ptr_eq(&a.forest, &b.forest) && a.id == b.id
            }
            (Self::Loading(_), Self::Loading(_)) | (Self::FilteredTo(_), Self::FilteredTo(_)) => {
                self.key() == previous.key()
            }
            _ => false,
        }
    }
}

impl CoverageElement {
    /// Text displayed for the row
    pub fn label(&self) -> String {
        match self {
            Self::File(node) => node.segment().to_string(),
            Self::Declaration(row) => row.node().label().to_string(),
            Self::Loading(_) => LoadingDetails::LABEL.to_string(),
            Self::RevealUncovered(row) => {
                format!("{} declarations without coverage...", row.count())
            }
            Self::FilteredTo(row) => format!("Showing coverage for \"{}\"", row.test.label),
        }
    }

    /// Label matched by type-to-navigate
    pub fn navigation_label(&self) -> String {
        match self {
            Self::File(node) => basename_or_authority(&node.value().uri).to_string(),
            Self::Declaration(row) => row.node().label().to_string(),
            Self::Loading(_) | Self::RevealUncovered(_) | Self::FilteredTo(_) => self.label(),
        }
    }

    /// Coverage ratio shown next to the row, when it has one
    pub fn tpc(&self) -> Option<f64> {
        match self {
            Self::File(node) if node.value().is_bypassed() => None,
            Self::File(node) => Some(node.value().tpc()),
            Self::Declaration(row) => row.node().tpc(),
            _ => None,
        }
    }

    /// Label read by screen readers
    pub fn aria_label(&self) -> String {
        let name = self.navigation_label();
        match self.tpc() {
            Some(tpc) => format!("{name} coverage: {:.2}%", tpc * 100.0),
            None => name,
        }
    }

    pub fn as_file(&self) -> Option<&Arc<CoverageTreeNode>> {
        match self {
            Self::File(node) => Some(node),
            _ => None,
        }
    }
}

/// Navigation label of a compressed chain of rows, joined with `/`
pub fn compressed_navigation_label<'a>(
    elements: impl IntoIterator<Item = &'a CoverageElement>,
) -> String {
    elements
        .into_iter()
        .map(CoverageElement::navigation_label)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageTree, FileCoverage};
    use crate::test_id::TestId;
    use covtree_core::{DetailEntry, Position, Range};

    fn file_tree() -> CoverageTree {
        CoverageTree::from_files([Arc::new(FileCoverage::with_details(
            "file:///src/lib.rs",
            vec![
                DetailEntry::statement(Position::new(1, 0), 1),
                DetailEntry::statement(Position::new(2, 0), 0),
            ],
        ))])
    }

    #[test]
    fn file_rows_are_keyed_by_uri() {
        let tree = file_tree();
        let node = tree.find("file:///src/lib.rs").expect("file");
        let element = CoverageElement::File(Arc::clone(node));
        assert_eq!(element.key(), RowKey::File("file:///src/lib.rs".into()));
        assert_eq!(element.label(), "lib.rs");
        assert_eq!(element.aria_label(), "lib.rs coverage: 50.00%");
    }

    #[test]
    fn root_rows_navigate_by_authority() {
        let tree = CoverageTree::from_files([Arc::new(FileCoverage::with_details(
            "file://host/a.rs",
            Vec::new(),
        ))]);
        let root = tree.nodes().next().expect("root");
        assert_eq!(root.segment(), "file://host");
        assert_eq!(CoverageElement::File(Arc::clone(root)).navigation_label(), "host");
    }

    #[test]
    fn sentinel_labels() {
        let filtered = CoverageElement::FilteredTo(CurrentlyFilteredTo::new(TestItem::new(
            TestId::new(["ctrl", "t"]),
            "adds numbers",
        )));
        assert_eq!(filtered.label(), "Showing coverage for \"adds numbers\"");
        assert_eq!(
            CoverageElement::Loading(LoadingDetails::new()).label(),
            "Loading Coverage Details..."
        );

        let forest = Arc::new(DeclarationForest::build(vec![
            DetailEntry::declaration("a", Range::lines(0, 1), 0),
            DetailEntry::declaration("b", Range::lines(2, 3), 0),
        ]));
        let hidden = forest.roots().to_vec();
        let reveal = CoverageElement::RevealUncovered(RevealUncoveredDeclarations::new(
            "file:///x".into(),
            forest,
            hidden,
        ));
        assert_eq!(reveal.label(), "2 declarations without coverage...");
        assert_eq!(reveal.tpc(), None);
    }

    #[test]
    fn compressed_rows_join_with_slash() {
        let tree = CoverageTree::from_files([
            Arc::new(FileCoverage::with_details("file:///a/b/x.rs", Vec::new())),
            Arc::new(FileCoverage::with_details("file:///a/b/y.rs", Vec::new())),
        ]);
        let a = tree.find("file:///a").expect("a");
        let b = tree.find("file:///a/b").expect("b");
        let chain = [
            CoverageElement::File(Arc::clone(a)),
            CoverageElement::File(Arc::clone(b)),
        ];
        assert_eq!(compressed_navigation_label(&chain), "a/b");
    }
}
