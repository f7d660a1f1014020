//! Common test utilities.

#![allow(dead_code)]

use async_trait::async_trait;
use covtree::{
    CoverageResult, CoverageTreeView, DetailProvider, FileCoverage, RowKey, TestCoverage,
    ViewConfig,
};
use covtree_core::{CoverageCount, DetailEntry, Position, Range};
use std::sync::Arc;

/// Details that resolve only after yielding to the runtime.
pub struct AsyncDetails(pub Vec<DetailEntry>);

#[async_trait]
impl DetailProvider for AsyncDetails {
    async fn details(&self) -> eyre::Result<Vec<DetailEntry>> {
        tokio::task::yield_now().await;
        Ok(self.0.clone())
    }
}

/// Details that always fail to load.
pub struct FailingDetails;

#[async_trait]
impl DetailProvider for FailingDetails {
    async fn details(&self) -> eyre::Result<Vec<DetailEntry>> {
        eyre::bail!("coverage backend went away")
    }
}

/// A file with `covered` of `total` statements hit and no declarations.
pub fn file_with_ratio(uri: &str, covered: u32, total: u32) -> FileCoverage {
    let details = (0..total)
        .map(|line| DetailEntry::statement(Position::new(line, 0), u64::from(line < covered)))
        .collect();
    FileCoverage::with_details(uri, details)
}

/// The nested-declaration file: "outer" spans lines 0-100, "inner" 10-20.
pub fn nested_details() -> Vec<DetailEntry> {
    vec![
        DetailEntry::declaration("outer", Range::lines(0, 100), 1),
        DetailEntry::declaration("inner", Range::lines(10, 20), 1),
        DetailEntry::statement(Position::new(15, 0), 1),
        DetailEntry::statement(Position::new(50, 0), 0),
    ]
}

/// Five top-level declarations whose details resolve asynchronously.
pub fn slow_file(uri: &str) -> FileCoverage {
    let details: Vec<DetailEntry> = (0..5)
        .map(|i| DetailEntry::declaration(format!("fn_{i}"), Range::lines(i * 10, i * 10 + 5), 1))
        .collect();
    FileCoverage::new(
        uri,
        CoverageCount::new(0, 0),
        None,
        Some(CoverageCount::new(5, 5)),
        Arc::new(AsyncDetails(details)),
    )
}

pub fn failing_file(uri: &str) -> FileCoverage {
    FileCoverage::new(
        uri,
        CoverageCount::new(1, 2),
        None,
        Some(CoverageCount::new(1, 1)),
        Arc::new(FailingDetails),
    )
}

/// A run with a small project under `file:///repo/src`.
pub fn sample_coverage() -> Arc<TestCoverage> {
    let coverage = Arc::new(TestCoverage::new());
    coverage.append(file_with_ratio("file:///repo/src/a.rs", 1, 2), []);
    coverage.append(file_with_ratio("file:///repo/src/b.rs", 9, 10), []);
    coverage.append(
        FileCoverage::with_details("file:///repo/src/util/nested.rs", nested_details()),
        [],
    );
    coverage.append(file_with_ratio("file:///repo/src/util/z.rs", 3, 4), []);
    coverage
}

pub fn view_for(coverage: Arc<TestCoverage>) -> CoverageTreeView {
    let mut view = CoverageTreeView::new(ViewConfig::default());
    view.set_input(coverage as Arc<dyn CoverageResult>, None);
    view
}

pub fn file_key(uri: &str) -> RowKey {
    RowKey::File(uri.to_string())
}

/// Visible rows as "depth:label" strings.
pub fn outline(view: &CoverageTreeView) -> Vec<String> {
    view.rows()
        .into_iter()
        .map(|row| format!("{}:{}", row.depth, row.label))
        .collect()
}

/// Key of the first visible row with the given label
pub fn key_of(view: &CoverageTreeView, label: &str) -> RowKey {
    view.rows()
        .into_iter()
        .find(|row| row.label == label)
        .map(|row| row.key)
        .unwrap_or_else(|| panic!("no row labelled {label}: {:?}", outline(view)))
}
