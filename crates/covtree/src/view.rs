//! The coverage tree view
//!
//! [`CoverageTreeView`] turns a [`CoverageResult`] into rows of an
//! [`ObjectTree`] and keeps them current:
//!
//! - [`set_input`](CoverageTreeView::set_input) builds the rows for a run,
//!   optionally scoped to one test, and subscribes to the run's changes.
//! - [`process_pending_updates`](CoverageTreeView::process_pending_updates) and
//!   [`next_update`](CoverageTreeView::next_update) patch the rows as coverage
//!   streams in.
//! - [`expand`](CoverageTreeView::expand) and
//!   [`update_with_details`](CoverageTreeView::update_with_details) load a
//!   file's declarations when its row is first expanded.
//!
//! The view is driven from one task. Fetching details is the only await
//! point, and its result is applied only if the row still exists.

use covtree_core::{DeclarationForest, DeclarationId, Location, Range};
use eyre::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ViewConfig;
use crate::coverage::{
    CoverageResult, CoverageSubscription, CoverageTree, CoverageTreeNode, CoverageUpdate,
    FileCoverage,
};
use crate::elements::{
    CoverageElement, CurrentlyFilteredTo, DeclarationRow, LoadingDetails,
    RevealUncoveredDeclarations, compressed_navigation_label,
};
use crate::sort::{SortOrder, Sorter};
use crate::test_id::TestId;
use crate::tree::{ChildIter, ObjectTree, RowKey, SetChildrenMode, TreeChild, VisibleRow};

type Child = TreeChild<CoverageElement>;

// ============================================================================
// Row construction
// ============================================================================

/// Descend through directories with a single child, so a root shows from its
/// first file or fork.
fn collapse_single_child_chain(mut node: Arc<CoverageTreeNode>) -> Arc<CoverageTreeNode> {
    while !node.is_file() && node.children().len() == 1 {
        let Some(only) = node.children().values().next().cloned() else {
            break;
        };
        node = only;
    }
    node
}

/// Row for a coverage node. Directories start expanded, files collapsed, and
/// a directory's children are produced only when the tree walks them.
fn file_child(node: Arc<CoverageTreeNode>) -> Child {
    let is_file = node.is_file();
    let collapsible = !is_file || node.value().has_declarations();
    let children: Vec<Arc<CoverageTreeNode>> = node.children().values().cloned().collect();

    let child = TreeChild::leaf(CoverageElement::File(node))
        .incompressible(is_file)
        .collapsed(is_file)
        .collapsible(collapsible);
    if is_file {
        child
    } else {
        child.with_children(Box::new(children.into_iter().map(file_child)))
    }
}

fn declaration_child(
    uri: &str,
    forest: &Arc<DeclarationForest>,
    id: DeclarationId,
    fold: bool,
) -> Child {
    let node = forest.node(id);
    let row = DeclarationRow {
        uri: uri.to_string(),
        forest: Arc::clone(forest),
        id,
    };
    let child = TreeChild::leaf(CoverageElement::Declaration(row))
        .incompressible(true)
        .collapsed(true)
        .collapsible(!node.children().is_empty());
    if node.children().is_empty() {
        return child;
    }

    let uri = uri.to_string();
    let forest = Arc::clone(forest);
    let ids = node.children().to_vec();
    child.with_children(lazy_children(move || {
        declaration_children(&uri, &forest, &ids, fold)
    }))
}

/// Children built by `build` on first iteration, not when the row is created
fn lazy_children(build: impl FnOnce() -> Vec<Child> + 'static) -> ChildIter<CoverageElement> {
    let mut build = Some(build);
    let mut built: Option<std::vec::IntoIter<Child>> = None;
    Box::new(std::iter::from_fn(move || {
        if let Some(make) = build.take() {
            built = Some(make().into_iter());
        }
        built.as_mut()?.next()
    }))
}

/// Rows for sibling declarations. With `fold`, the ones never hit are hidden
/// behind a single reveal row.
fn declaration_children(
    uri: &str,
    forest: &Arc<DeclarationForest>,
    ids: &[DeclarationId],
    fold: bool,
) -> Vec<Child> {
    let (shown, hidden): (Vec<DeclarationId>, Vec<DeclarationId>) = if fold {
        ids.iter().partition(|id| forest.node(**id).hits() > 0)
    } else {
        (ids.to_vec(), Vec::new())
    };

    let mut children: Vec<Child> = shown
        .into_iter()
        .map(|id| declaration_child(uri, forest, id, fold))
        .collect();
    if !hidden.is_empty() {
        children.push(
            TreeChild::leaf(CoverageElement::RevealUncovered(
                RevealUncoveredDeclarations::new(uri.to_string(), Arc::clone(forest), hidden),
            ))
            .incompressible(true),
        );
    }
    children
}

// ============================================================================
// Detail loading
// ============================================================================

/// A detail fetch for a file row that was just expanded
#[derive(Debug)]
pub struct PendingDetails {
    key: RowKey,
    file: Arc<FileCoverage>,
}

impl PendingDetails {
    pub fn key(&self) -> &RowKey {
        &self.key
    }

    /// Fetch the file's details and build its declaration forest.
    ///
    /// Fetch failures are returned as-is.
    pub async fn fetch(self) -> Result<LoadedDetails> {
        let details = self.file.details().await?;
        let forest = DeclarationForest::build(details);
        debug!(uri = %self.file.uri, declarations = forest.len(), "Loaded coverage details");
        Ok(LoadedDetails {
            key: self.key,
            uri: self.file.uri.clone(),
            file: self.file,
            forest: Arc::new(forest),
        })
    }
}

/// Declarations ready to be attached to a file row
#[derive(Debug)]
pub struct LoadedDetails {
    key: RowKey,
    uri: String,
    /// The value the details were fetched from
    file: Arc<FileCoverage>,
    forest: Arc<DeclarationForest>,
}

impl LoadedDetails {
    pub fn forest(&self) -> &Arc<DeclarationForest> {
        &self.forest
    }
}

// ============================================================================
// Open actions
// ============================================================================

/// What opening a row asks the host to do
#[derive(Debug, Clone, PartialEq)]
pub enum OpenAction {
    /// Show a resource, optionally selecting a range in it
    Editor {
        uri: String,
        selection: Option<Range>,
    },
    /// Let the user pick which test to filter coverage to
    PickTestFilter,
}

// ============================================================================
// View
// ============================================================================

/// A displayed row with everything needed to render it
#[derive(Debug, Clone)]
pub struct RenderedRow {
    pub key: RowKey,
    pub depth: usize,
    /// Labels of compressed rows are joined with `/`
    pub label: String,
    pub navigation_label: String,
    pub aria_label: String,
    pub tpc: Option<f64>,
    pub collapsed: bool,
    pub collapsible: bool,
    pub element: CoverageElement,
}

struct ViewInput {
    coverage: Arc<dyn CoverageResult>,
    filter: Option<TestId>,
    header: Option<CurrentlyFilteredTo>,
    subscription: CoverageSubscription,
}

pub struct CoverageTreeView {
    tree: ObjectTree<CoverageElement>,
    config: ViewConfig,
    sort_order: SortOrder,
    input: Option<ViewInput>,
}

impl CoverageTreeView {
    pub fn new(config: ViewConfig) -> Self {
        let sort_order = config.sort_order;
        Self {
            tree: ObjectTree::with_sorter(Sorter(sort_order)),
            config,
            sort_order,
            input: None,
        }
    }

    pub fn tree(&self) -> &ObjectTree<CoverageElement> {
        &self.tree
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    /// Test the rows are currently scoped to
    pub fn filter(&self) -> Option<&TestId> {
        self.input.as_ref()?.filter.as_ref()
    }

    pub fn coverage(&self) -> Option<&Arc<dyn CoverageResult>> {
        self.input.as_ref().map(|input| &input.coverage)
    }

    /// Show a coverage run, optionally scoped to a single test.
    ///
    /// The previous run's subscription is released before subscribing again,
    /// and every row is rebuilt.
    pub fn set_input(&mut self, coverage: Arc<dyn CoverageResult>, filter: Option<TestId>) {
        if let Some(previous) = self.input.take() {
            previous.subscription.release();
        }

        let subscription = coverage.subscribe();
        let header = filter
            .as_ref()
            .and_then(|test| coverage.get_test_by_id(test))
            .map(CurrentlyFilteredTo::new);
        let input = ViewInput {
            coverage,
            filter,
            header,
            subscription,
        };

        let roots = root_children(&input, &self.scoped_tree(&input));
        let splice = self.tree.set_roots(roots, SetChildrenMode::Replace);
        info!(
            filter = ?input.filter.as_ref().map(TestId::to_string),
            rows = splice.inserted,
            "Built coverage tree"
        );
        self.input = Some(input);
    }

    /// Rebuild the current run scoped to another test (`None` for all tests).
    pub fn filter_to_test(&mut self, filter: Option<TestId>) {
        if let Some(coverage) = self.coverage().cloned() {
            self.set_input(coverage, filter);
        }
    }

    /// Drop the current run and its subscription.
    pub fn clear(&mut self) {
        if let Some(previous) = self.input.take() {
            previous.subscription.release();
        }
        self.tree.set_roots(Vec::new(), SetChildrenMode::Replace);
    }

    pub fn layout(&mut self, height: u32, width: u32) {
        self.tree.layout(height, width);
    }

    /// Rows that fit in the current viewport
    pub fn page_size(&self) -> usize {
        (self.tree.viewport().height / self.config.row_height.max(1)) as usize
    }

    pub fn collapse_all(&mut self) {
        self.tree.collapse_all();
    }

    /// Reorder rows in place. Expansion and selection are kept.
    pub fn set_sort_order(&mut self, order: SortOrder) {
        if order == self.sort_order {
            return;
        }
        debug!(order = order.as_str(), "Changed coverage sort order");
        self.sort_order = order;
        self.tree.set_sorter(Sorter(order));
        self.tree.resort();
    }

    /// Re-apply the current order to every sibling list.
    pub fn resort(&mut self) {
        self.tree.resort();
    }

    pub fn select(&mut self, key: &RowKey) {
        self.tree.set_selection([key.clone()]);
        self.tree.set_focus(Some(key.clone()));
    }

    fn scoped_tree(&self, input: &ViewInput) -> CoverageTree {
        match &input.filter {
            Some(test) => input.coverage.filter_tree_for_test(test),
            None => input.coverage.tree(),
        }
    }

    // ------------------------------------------------------------------------
    // Expansion and details
    // ------------------------------------------------------------------------

    /// Expand a row.
    ///
    /// Expanding a file row whose declarations are not loaded yet returns the
    /// fetch to run, and shows a loading row first unless the file can supply
    /// its details without waiting.
    pub fn expand(&mut self, key: &RowKey) -> Option<PendingDetails> {
        self.tree.set_collapsed(key, false);
        if self.tree.is_collapsed(key) != Some(false) || !self.tree.children(Some(key)).is_empty() {
            return None;
        }

        let node = self.tree.element(key)?.as_file()?;
        if !node.is_file() || !node.value().has_declarations() {
            return None;
        }
        let file = Arc::clone(node.value());

        if !file.has_synchronous_details() {
            let loading = TreeChild::leaf(CoverageElement::Loading(LoadingDetails::new()))
                .incompressible(true);
            if let Err(error) = self
                .tree
                .set_children(Some(key), [loading], SetChildrenMode::Replace)
            {
                debug!(%error, "Could not show loading row");
            }
        }
        Some(PendingDetails {
            key: key.clone(),
            file,
        })
    }

    pub fn collapse(&mut self, key: &RowKey) -> bool {
        self.tree.set_collapsed(key, true)
    }

    /// Attach loaded declarations to their file row.
    ///
    /// Returns `false`, changing nothing, when the row is gone or now shows
    /// another value than the one the details came from.
    pub fn update_with_details(&mut self, loaded: LoadedDetails) -> bool {
        let current = self
            .tree
            .element(&loaded.key)
            .and_then(CoverageElement::as_file);
        if !current.is_some_and(|node| Arc::ptr_eq(node.value(), &loaded.file)) {
            return false;
        }

        let children = declaration_children(
            &loaded.uri,
            &loaded.forest,
            loaded.forest.roots(),
            self.config.fold_uncovered_declarations,
        );
        self.tree
            .set_children(Some(&loaded.key), children, SetChildrenMode::Replace)
            .is_ok()
    }

    /// Expand a row and, for a file, load and attach its declarations.
    pub async fn expand_and_load(&mut self, key: &RowKey) -> Result<bool> {
        match self.expand(key) {
            Some(pending) => {
                let loaded = pending.fetch().await?;
                Ok(self.update_with_details(loaded))
            }
            None => Ok(false),
        }
    }

    /// Expand every file row that has declarations and load them.
    pub async fn expand_all_files(&mut self) -> Result<usize> {
        let mut loaded = 0;
        let mut stack: Vec<RowKey> = self.tree.children(None).to_vec();
        while let Some(key) = stack.pop() {
            let is_file = self
                .tree
                .element(&key)
                .and_then(CoverageElement::as_file)
                .is_some_and(|node| node.is_file());
            if is_file {
                if self.expand_and_load(&key).await? {
                    loaded += 1;
                }
            } else {
                stack.extend(self.tree.children(Some(&key)).iter().cloned());
            }
        }
        Ok(loaded)
    }

    // ------------------------------------------------------------------------
    // Incremental updates
    // ------------------------------------------------------------------------

    /// Apply every batch already buffered on the subscription.
    pub fn process_pending_updates(&mut self) -> usize {
        let mut applied = 0;
        while let Some(update) = self
            .input
            .as_mut()
            .and_then(|input| input.subscription.try_recv())
        {
            self.apply_update(update);
            applied += 1;
        }
        applied
    }

    /// Wait for the next batch and apply it. `false` once the run is gone.
    pub async fn next_update(&mut self) -> bool {
        let Some(input) = self.input.as_mut() else {
            return false;
        };
        let update = input.subscription.recv().await;
        match update {
            Some(update) => {
                self.apply_update(update);
                true
            }
            None => false,
        }
    }

    fn apply_update(&mut self, update: CoverageUpdate) {
        match update {
            CoverageUpdate::Batch(batch) => self.apply_batch(&batch),
            CoverageUpdate::Lagged(skipped) => {
                debug!(skipped, "Coverage updates lagged, reconciling roots");
                self.resync_roots();
            }
        }
    }

    fn apply_batch(&mut self, batch: &[Arc<CoverageTreeNode>]) {
        let Some(input) = &self.input else {
            return;
        };

        let nodes: Vec<Arc<CoverageTreeNode>> = match &input.filter {
            None => batch.to_vec(),
            Some(test) => {
                let scoped = input.coverage.filter_tree_for_test(test);
                batch
                    .iter()
                    .filter_map(|node| scoped.find(node.id()).cloned())
                    .collect()
            }
        };

        let visible: Vec<&Arc<CoverageTreeNode>> = nodes
            .iter()
            .filter(|node| self.tree.has_element(&file_key(node)))
            .collect();
        let Some((target, ancestors)) = visible.split_last() else {
            return;
        };

        for node in ancestors {
            self.tree
                .replace_element(&file_key(node), CoverageElement::File(Arc::clone(node)));
        }

        let key = file_key(target);
        if target.is_file() {
            // Loaded declarations belong to the previous value and are dropped,
            // so the next expand loads the new one.
            if let Ok(splice) = self.tree.refresh_row(&key, file_child(Arc::clone(target))) {
                debug!(uri = %target.id(), removed = splice.removed, "Refreshed coverage row");
            }
            return;
        }

        self.tree
            .replace_element(&key, CoverageElement::File(Arc::clone(target)));

        let children: Vec<Child> = target.children().values().cloned().map(file_child).collect();
        if let Ok(splice) = self.tree.set_children(Some(&key), children, SetChildrenMode::Diff) {
            debug!(
                uri = %target.id(),
                inserted = splice.inserted,
                removed = splice.removed,
                kept = splice.kept,
                "Patched coverage rows"
            );
        }
    }

    fn resync_roots(&mut self) {
        let Some(input) = &self.input else {
            return;
        };
        let roots = root_children(input, &self.scoped_tree(input));
        let splice = self.tree.set_roots(roots, SetChildrenMode::Diff);
        debug!(
            inserted = splice.inserted,
            removed = splice.removed,
            kept = splice.kept,
            "Reconciled root rows"
        );
    }

    // ------------------------------------------------------------------------
    // Opening rows
    // ------------------------------------------------------------------------

    /// Open a row: files and declarations open an editor, the filter header
    /// asks for a new filter, and a folded row reveals its declarations.
    pub fn open(&mut self, key: &RowKey) -> Option<OpenAction> {
        match self.tree.element(key)?.clone() {
            CoverageElement::File(node) if node.is_file() => Some(OpenAction::Editor {
                uri: node.value().uri.clone(),
                selection: None,
            }),
            CoverageElement::Declaration(row) => {
                let selection = match row.node().location() {
                    Location::Range(range) => range,
                    Location::Position(position) => Range::new(position, position),
                };
                Some(OpenAction::Editor {
                    uri: row.uri.clone(),
                    selection: Some(selection),
                })
            }
            CoverageElement::FilteredTo(_) => Some(OpenAction::PickTestFilter),
            CoverageElement::RevealUncovered(_) => {
                self.reveal_uncovered(key);
                None
            }
            CoverageElement::File(_) | CoverageElement::Loading(_) => None,
        }
    }

    /// Replace a folded row with the declarations it hides.
    pub fn reveal_uncovered(&mut self, key: &RowKey) -> bool {
        let Some(parent) = self.tree.parent(key).cloned() else {
            return false;
        };
        let Some(CoverageElement::RevealUncovered(reveal)) = self.tree.element(key) else {
            return false;
        };
        let (uri, forest) = (reveal.uri.clone(), Arc::clone(&reveal.forest));

        let siblings = match self.tree.element(&parent) {
            Some(CoverageElement::Declaration(row)) => row.node().children().to_vec(),
            Some(CoverageElement::File(_)) => forest.roots().to_vec(),
            _ => return false,
        };
        let fold = self.config.fold_uncovered_declarations;
        let children: Vec<Child> = siblings
            .into_iter()
            .map(|id| declaration_child(&uri, &forest, id, fold))
            .collect();
        self.tree
            .set_children(Some(&parent), children, SetChildrenMode::Diff)
            .is_ok()
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    pub fn rows(&self) -> Vec<RenderedRow> {
        self.tree
            .visible_rows()
            .into_iter()
            .filter_map(|row| self.render_row(row))
            .collect()
    }

    fn render_row(&self, row: VisibleRow) -> Option<RenderedRow> {
        let elements: Vec<&CoverageElement> = row
            .keys
            .iter()
            .map(|key| self.tree.element(key))
            .collect::<Option<_>>()?;
        let last = *elements.last()?;

        let label = elements
            .iter()
            .map(|e| e.label())
            .collect::<Vec<_>>()
            .join("/");
        let navigation_label = compressed_navigation_label(elements.iter().copied());
        let aria_label = match last.tpc() {
            Some(tpc) => format!("{navigation_label} coverage: {:.2}%", tpc * 100.0),
            None => navigation_label.clone(),
        };

        Some(RenderedRow {
            key: row.key().clone(),
            depth: row.depth,
            label,
            navigation_label,
            aria_label,
            tpc: last.tpc(),
            collapsed: row.collapsed,
            collapsible: row.collapsible,
            element: last.clone(),
        })
    }

    /// Key of the first visible row whose navigation label starts with `prefix`
    pub fn find_by_prefix(&self, prefix: &str) -> Option<RowKey> {
        let prefix = prefix.to_lowercase();
        self.rows()
            .into_iter()
            .find(|row| row.navigation_label.to_lowercase().starts_with(&prefix))
            .map(|row| row.key)
    }
}

impl Drop for CoverageTreeView {
    fn drop(&mut self) {
        if let Some(input) = self.input.take() {
            input.subscription.release();
        }
    }
}

fn file_key(node: &CoverageTreeNode) -> RowKey {
    RowKey::File(node.id().to_string())
}

fn root_children(input: &ViewInput, tree: &CoverageTree) -> Vec<Child> {
    let header = input.header.clone().map(|header| {
        TreeChild::leaf(CoverageElement::FilteredTo(header)).incompressible(true)
    });
    header
        .into_iter()
        .chain(
            tree.nodes()
                .cloned()
                .map(collapse_single_child_chain)
                .map(file_child),
        )
        .collect()
}
