//! covtree-core - Core model for test coverage trees
//!
//! This crate provides the building blocks for:
//! - Source positions and ranges with inclusive containment checks
//! - Fine-grained coverage detail records (declarations, statements, branches)
//! - Deriving per-declaration coverage from the positions of those records
//!
//! # Declaration coverage
//!
//! Coverage backends report a flat list of detail records per file. Nested
//! declarations are recovered from source ranges alone:
//!
//! ```
//! use covtree_core::{CoverageCount, DeclarationForest, DetailEntry, Position, Range};
//!
//! let forest = DeclarationForest::build(vec![
//!     DetailEntry::declaration("outer", Range::lines(0, 100), 1),
//!     DetailEntry::declaration("inner", Range::lines(10, 20), 1),
//!     DetailEntry::statement(Position::new(15, 0), 1),
//!     DetailEntry::statement(Position::new(50, 0), 0),
//! ]);
//!
//! let outer = forest.find("outer").unwrap();
//! let inner = forest.find("inner").unwrap();
//! assert_eq!(forest.node(outer).children(), &[inner]);
//!
//! let coverage = forest.node(outer).attributable_coverage().unwrap();
//! assert_eq!(coverage.statement, CoverageCount::new(1, 2));
//! ```

mod declaration;
mod model;

pub use declaration::{
    AttributableCoverage, DeclarationCoverageNode, DeclarationForest, DeclarationId, next_node_id,
};
pub use model::{
    BranchDetail, CoverageCount, DeclarationDetail, DetailEntry, Location, Position, Range,
    StatementDetail, total_coverage_percent,
};
