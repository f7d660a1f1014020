//! covtree library - Aggregate test coverage into an incrementally updated tree
//!
//! This library exposes the coverage tree engine for embedding and testing:
//! the coverage run model and its change stream, the object tree the rows
//! live in, and the view that keeps those rows current as coverage streams
//! in, declarations load and filters change.

pub mod config;
pub mod coverage;
pub mod elements;
pub mod filter;
pub mod output;
pub mod report;
pub mod sort;
pub mod test_id;
pub mod tree;
pub mod view;

pub use config::{LoadedConfig, ViewConfig};
pub use coverage::{
    CoverageBatch, CoverageKind, CoverageResult, CoverageSubscription, CoverageTree,
    CoverageTreeNode, CoverageUpdate, DetailProvider, FileCoverage, StaticDetails, TestCoverage,
};
pub use elements::CoverageElement;
pub use report::CoverageReport;
pub use sort::SortOrder;
pub use test_id::{TestId, TestItem};
pub use tree::RowKey;
pub use view::{CoverageTreeView, LoadedDetails, OpenAction, PendingDetails, RenderedRow};
