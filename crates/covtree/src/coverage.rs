//! Coverage results: per-file values, the path tree, and the change stream
//!
//! A [`TestCoverage`] owns one coverage run. Files are appended as the run
//! streams them in; every append path-copies the tree from the root down to
//! the changed file, so untouched subtrees stay shared between the old and new
//! tree, and the chain of rewritten nodes is broadcast as one batch.

use async_trait::async_trait;
use covtree_core::{CoverageCount, DetailEntry, total_coverage_percent};
use eyre::Result;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

use crate::test_id::{TestId, TestItem};

/// Batches buffered per subscriber before it is considered lagging.
const UPDATE_CAPACITY: usize = 256;

// ============================================================================
// URIs
// ============================================================================

/// Split a URI into tree path segments.
///
/// The first segment is `scheme://authority`; the rest are path components.
/// URIs without a scheme are split on `/` alone.
pub fn uri_segments(uri: &str) -> Vec<String> {
    match uri.split_once("://") {
        Some((scheme, rest)) => {
            let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
            std::iter::once(format!("{scheme}://{authority}"))
                .chain(
                    path.split('/')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                )
                .collect()
        }
        None => uri
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// Inverse of [`uri_segments`] for a prefix of the segments
fn join_segments(segments: &[String]) -> String {
    match segments.split_first() {
        Some((first, rest)) if first.contains("://") => {
            if rest.is_empty() {
                first.clone()
            } else {
                format!("{first}/{}", rest.join("/"))
            }
        }
        _ => segments.join("/"),
    }
}

/// Last path segment of a URI, or its authority when the path is empty.
pub fn basename_or_authority(uri: &str) -> &str {
    let (authority, path) = match uri.split_once("://") {
        Some((_, rest)) => rest.split_once('/').unwrap_or((rest, "")),
        None => ("", uri),
    };
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(authority)
}

// ============================================================================
// File coverage
// ============================================================================

/// Asynchronous source of a file's detail records
#[async_trait]
pub trait DetailProvider: Send + Sync {
    async fn details(&self) -> Result<Vec<DetailEntry>>;

    /// Whether [`Self::details`] resolves without waiting on anything.
    fn has_synchronous_details(&self) -> bool {
        false
    }
}

/// Details already held in memory
pub struct StaticDetails(Arc<[DetailEntry]>);

impl StaticDetails {
    pub fn new(details: impl Into<Arc<[DetailEntry]>>) -> Self {
        Self(details.into())
    }
}

#[async_trait]
impl DetailProvider for StaticDetails {
    async fn details(&self) -> Result<Vec<DetailEntry>> {
        Ok(self.0.to_vec())
    }

    fn has_synchronous_details(&self) -> bool {
        true
    }
}

/// What kind of value a tree node holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageKind {
    /// A real file whose details can be fetched
    Detailed,
    /// Roll-up of every file below a directory
    Aggregate,
    /// A file deliberately excluded from detailed analysis
    Bypassed,
}

#[derive(Clone)]
enum CoverageSource {
    Details(Arc<dyn DetailProvider>),
    Aggregate,
    Bypassed,
}

/// Coverage summary for one file or directory
#[derive(Clone)]
pub struct FileCoverage {
    pub uri: String,
    pub statement: CoverageCount,
    pub branch: Option<CoverageCount>,
    pub declaration: Option<CoverageCount>,
    source: CoverageSource,
}

impl FileCoverage {
    pub fn new(
        uri: impl Into<String>,
        statement: CoverageCount,
        branch: Option<CoverageCount>,
        declaration: Option<CoverageCount>,
        provider: Arc<dyn DetailProvider>,
    ) -> Self {
        Self {
            uri: uri.into(),
            statement,
            branch,
            declaration,
            source: CoverageSource::Details(provider),
        }
    }

    /// File whose counts are summarized from an in-memory detail list
    pub fn with_details(uri: impl Into<String>, details: Vec<DetailEntry>) -> Self {
        let (statement, branch, declaration) = summarize_details(&details);
        Self::new(
            uri,
            statement,
            branch,
            declaration,
            Arc::new(StaticDetails::new(details)),
        )
    }

    pub fn bypassed(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            statement: CoverageCount::default(),
            branch: None,
            declaration: None,
            source: CoverageSource::Bypassed,
        }
    }

    fn aggregate<'a>(uri: String, children: impl Iterator<Item = &'a FileCoverage>) -> Self {
        let mut statement = CoverageCount::default();
        let mut branch: Option<CoverageCount> = None;
        let mut declaration: Option<CoverageCount> = None;
        for child in children {
            statement.add(&child.statement);
            if let Some(b) = &child.branch {
                branch.get_or_insert_default().add(b);
            }
            if let Some(d) = &child.declaration {
                declaration.get_or_insert_default().add(d);
            }
        }

        Self {
            uri,
            statement,
            branch,
            declaration,
            source: CoverageSource::Aggregate,
        }
    }

    /// Stable identity of this value across runs and filters
    pub fn id(&self) -> &str {
        &self.uri
    }

    pub fn kind(&self) -> CoverageKind {
        match self.source {
            CoverageSource::Details(_) => CoverageKind::Detailed,
            CoverageSource::Aggregate => CoverageKind::Aggregate,
            CoverageSource::Bypassed => CoverageKind::Bypassed,
        }
    }

    pub fn is_bypassed(&self) -> bool {
        matches!(self.source, CoverageSource::Bypassed)
    }

    /// Combined coverage ratio (0.0 - 1.0)
    pub fn tpc(&self) -> f64 {
        total_coverage_percent(
            &self.statement,
            self.branch.as_ref(),
            self.declaration.as_ref(),
        )
    }

    pub fn declaration_total(&self) -> u32 {
        self.declaration.map_or(0, |d| d.total)
    }

    /// Whether expanding this file can show declarations
    pub fn has_declarations(&self) -> bool {
        self.kind() == CoverageKind::Detailed && self.declaration_total() > 0
    }

    pub fn has_synchronous_details(&self) -> bool {
        match &self.source {
            CoverageSource::Details(provider) => provider.has_synchronous_details(),
            CoverageSource::Aggregate | CoverageSource::Bypassed => true,
        }
    }

    /// Fetch the flat detail list. Directories and bypassed files have none.
    pub async fn details(&self) -> Result<Vec<DetailEntry>> {
        match &self.source {
            CoverageSource::Details(provider) => provider.details().await,
            CoverageSource::Aggregate | CoverageSource::Bypassed => Ok(Vec::new()),
        }
    }
}

impl fmt::Debug for FileCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCoverage")
            .field("uri", &self.uri)
            .field("kind", &self.kind())
            .field("statement", &self.statement)
            .field("branch", &self.branch)
            .field("declaration", &self.declaration)
            .finish()
    }
}

/// Statement, branch and declaration counts of a detail list.
///
/// Branch and declaration counts are `None` when the list has none of them.
pub fn summarize_details(
    details: &[DetailEntry],
) -> (CoverageCount, Option<CoverageCount>, Option<CoverageCount>) {
    let mut statement = CoverageCount::default();
    let mut branch = CoverageCount::default();
    let mut declaration = CoverageCount::default();
    for detail in details {
        match detail {
            DetailEntry::Statement(s) => {
                statement.record(s.count);
                for b in &s.branches {
                    branch.record(b.count);
                }
            }
            DetailEntry::Branch(b) => branch.record(b.count),
            DetailEntry::Declaration(d) => declaration.record(d.count),
        }
    }

    let present = |count: CoverageCount| (count.total > 0).then_some(count);
    (statement, present(branch), present(declaration))
}

// ============================================================================
// Coverage tree
// ============================================================================

/// A node of the coverage path tree: a directory when it has children, a file otherwise.
#[derive(Debug, Clone)]
pub struct CoverageTreeNode {
    segment: String,
    value: Arc<FileCoverage>,
    children: BTreeMap<String, Arc<CoverageTreeNode>>,
}

impl CoverageTreeNode {
    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn value(&self) -> &Arc<FileCoverage> {
        &self.value
    }

    pub fn children(&self) -> &BTreeMap<String, Arc<CoverageTreeNode>> {
        &self.children
    }

    pub fn is_file(&self) -> bool {
        self.children.is_empty()
    }

    /// Identity of the row displaying this node
    pub fn id(&self) -> &str {
        self.value.id()
    }
}

/// Forest of coverage nodes, one root per `scheme://authority` (or leading path segment).
#[derive(Debug, Clone, Default)]
pub struct CoverageTree {
    roots: BTreeMap<String, Arc<CoverageTreeNode>>,
}

impl CoverageTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files(files: impl IntoIterator<Item = Arc<FileCoverage>>) -> Self {
        let mut tree = Self::new();
        for file in files {
            tree.insert(file);
        }
        tree
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<CoverageTreeNode>> + '_ {
        self.roots.values()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Insert or replace a file, returning the rewritten chain from root to the file.
    pub fn insert(&mut self, file: Arc<FileCoverage>) -> Vec<Arc<CoverageTreeNode>> {
        let segments = uri_segments(&file.uri);
        let Some(first) = segments.first() else {
            return Vec::new();
        };

        let root = insert_at(self.roots.get(first), &segments, 0, &file);
        self.roots.insert(first.clone(), Arc::clone(&root));

        let mut chain = Vec::with_capacity(segments.len());
        let mut node = root;
        for segment in &segments[1..] {
            let next = Arc::clone(&node.children[segment]);
            chain.push(node);
            node = next;
        }
        chain.push(node);
        chain
    }

    /// Find the node whose value has the given URI
    pub fn find(&self, uri: &str) -> Option<&Arc<CoverageTreeNode>> {
        let segments = uri_segments(uri);
        let (first, rest) = segments.split_first()?;
        let mut node = self.roots.get(first)?;
        for segment in rest {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    /// Every file (leaf) value, depth first
    pub fn files(&self) -> Vec<Arc<FileCoverage>> {
        fn walk(node: &CoverageTreeNode, out: &mut Vec<Arc<FileCoverage>>) {
            if node.is_file() {
                out.push(Arc::clone(&node.value));
            }
            for child in node.children.values() {
                walk(child, out);
            }
        }

        let mut out = Vec::new();
        for root in self.roots.values() {
            walk(root, &mut out);
        }
        out
    }
}

fn insert_at(
    existing: Option<&Arc<CoverageTreeNode>>,
    segments: &[String],
    depth: usize,
    file: &Arc<FileCoverage>,
) -> Arc<CoverageTreeNode> {
    let mut children = existing.map(|n| n.children.clone()).unwrap_or_default();

    let value = if depth + 1 == segments.len() {
        Arc::clone(file)
    } else {
        let key = &segments[depth + 1];
        let child = insert_at(children.get(key), segments, depth + 1, file);
        children.insert(key.clone(), child);
        Arc::new(FileCoverage::aggregate(
            join_segments(&segments[..=depth]),
            children.values().map(|c| c.value.as_ref()),
        ))
    };

    Arc::new(CoverageTreeNode {
        segment: segments[depth].clone(),
        value,
        children,
    })
}

// ============================================================================
// Change stream
// ============================================================================

/// Nodes rewritten by one append, root first
pub type CoverageBatch = Arc<[Arc<CoverageTreeNode>]>;

/// What a subscription yields
#[derive(Debug, Clone)]
pub enum CoverageUpdate {
    Batch(CoverageBatch),
    /// The subscriber fell behind and this many batches were dropped
    Lagged(u64),
}

/// Live subscription to a coverage run's `did_add_coverage` stream.
///
/// Dropping or [releasing](Self::release) the handle unsubscribes.
pub struct CoverageSubscription {
    receiver: broadcast::Receiver<CoverageBatch>,
}

impl CoverageSubscription {
    /// Next buffered update, without waiting.
    pub fn try_recv(&mut self) -> Option<CoverageUpdate> {
        match self.receiver.try_recv() {
            Ok(batch) => Some(CoverageUpdate::Batch(batch)),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Some(CoverageUpdate::Lagged(n)),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed) => {
                None
            }
        }
    }

    /// Wait for the next update. `None` once the run is gone.
    pub async fn recv(&mut self) -> Option<CoverageUpdate> {
        match self.receiver.recv().await {
            Ok(batch) => Some(CoverageUpdate::Batch(batch)),
            Err(broadcast::error::RecvError::Lagged(n)) => Some(CoverageUpdate::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    pub fn release(self) {
        debug!("Released coverage subscription");
    }
}

// ============================================================================
// Coverage result
// ============================================================================

/// The coverage of one run, as consumed by the tree view
pub trait CoverageResult: Send + Sync {
    /// Current forest
    fn tree(&self) -> CoverageTree;

    /// Forest scoped to the coverage produced by a single test
    fn filter_tree_for_test(&self, test: &TestId) -> CoverageTree;

    /// Subscribe to batches of changed nodes
    fn subscribe(&self) -> CoverageSubscription;

    /// Tests that produced per-test coverage, sorted
    fn all_per_test_ids(&self) -> Vec<TestId>;

    fn get_test_by_id(&self, id: &TestId) -> Option<TestItem>;
}

#[derive(Default)]
struct CoverageState {
    tree: CoverageTree,
    /// File URI -> per-test coverage of that file
    per_test: HashMap<String, BTreeMap<TestId, Arc<FileCoverage>>>,
}

/// In-memory coverage run
pub struct TestCoverage {
    tests: RwLock<BTreeMap<TestId, TestItem>>,
    state: RwLock<CoverageState>,
    did_add_coverage: broadcast::Sender<CoverageBatch>,
}

impl Default for TestCoverage {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCoverage {
    pub fn new() -> Self {
        let (did_add_coverage, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            tests: RwLock::new(BTreeMap::new()),
            state: RwLock::new(CoverageState::default()),
            did_add_coverage,
        }
    }

    /// Make a test known to the run (for labels and the filter header).
    pub fn register_test(&self, item: TestItem) {
        self.tests
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(item.id.clone(), item);
    }

    /// Insert or replace one file's coverage and notify subscribers.
    pub fn append(
        &self,
        file: FileCoverage,
        per_test: impl IntoIterator<Item = (TestId, FileCoverage)>,
    ) -> CoverageBatch {
        let uri = file.uri.clone();
        let batch: CoverageBatch = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            let per_test: BTreeMap<TestId, Arc<FileCoverage>> = per_test
                .into_iter()
                .map(|(test, coverage)| (test, Arc::new(coverage)))
                .collect();
            if per_test.is_empty() {
                state.per_test.remove(&uri);
            } else {
                state.per_test.insert(uri.clone(), per_test);
            }
            state.tree.insert(Arc::new(file)).into()
        };

        match self.did_add_coverage.send(Arc::clone(&batch)) {
            Ok(receivers) => debug!(uri = %uri, nodes = batch.len(), receivers, "Added coverage"),
            Err(_) => debug!(uri = %uri, nodes = batch.len(), "Added coverage with no subscribers"),
        }
        batch
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.did_add_coverage.receiver_count()
    }
}

impl CoverageResult for TestCoverage {
    fn tree(&self) -> CoverageTree {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .tree
            .clone()
    }

    fn filter_tree_for_test(&self, test: &TestId) -> CoverageTree {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        CoverageTree::from_files(
            state
                .tree
                .files()
                .iter()
                .filter_map(|file| state.per_test.get(&file.uri)?.get(test).cloned()),
        )
    }

    fn subscribe(&self) -> CoverageSubscription {
        debug!("Acquired coverage subscription");
        CoverageSubscription {
            receiver: self.did_add_coverage.subscribe(),
        }
    }

    fn all_per_test_ids(&self) -> Vec<TestId> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<TestId> = state
            .per_test
            .values()
            .flat_map(|by_test| by_test.keys().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn get_test_by_id(&self, id: &TestId) -> Option<TestItem> {
        self.tests
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }
}
