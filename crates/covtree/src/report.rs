//! JSON coverage reports
//!
//! A report lists the tests of a run and the coverage of every file:
//!
//! ```json
//! {
//!   "tests": [{ "id": ["ctrl", "adds"], "label": "adds" }],
//!   "files": [
//!     {
//!       "uri": "file:///src/math.rs",
//!       "details": [
//!         { "Declaration": { "name": "add", "location": { "Range": { ... } }, "count": 1 } },
//!         { "Statement": { "location": { "Position": { "line": 3, "column": 4 } }, "count": 1 } }
//!       ],
//!       "perTest": [{ "test": ["ctrl", "adds"], "details": [ ... ] }]
//!     }
//!   ]
//! }
//! ```
//!
//! Counts left out of a file entry are summarized from its details.

use covtree_core::{CoverageCount, DetailEntry};
use eyre::{Result, WrapErr};
use facet::Facet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::coverage::{FileCoverage, StaticDetails, TestCoverage, summarize_details};
use crate::test_id::{TestId, TestItem};

#[derive(Debug, Clone, Facet)]
#[facet(rename_all = "camelCase")]
pub struct CoverageReport {
    #[facet(default)]
    pub tests: Vec<ReportTest>,
    #[facet(default)]
    pub files: Vec<ReportFile>,
}

#[derive(Debug, Clone, Facet)]
pub struct ReportTest {
    /// Path of ids from the root test down to this one
    pub id: Vec<String>,
    pub label: String,
}

#[derive(Debug, Clone, Facet)]
#[facet(rename_all = "camelCase")]
pub struct ReportFile {
    pub uri: String,
    /// Excluded from detailed analysis
    #[facet(default)]
    pub bypassed: bool,
    #[facet(default)]
    pub statement: Option<CoverageCount>,
    #[facet(default)]
    pub branch: Option<CoverageCount>,
    #[facet(default)]
    pub declaration: Option<CoverageCount>,
    #[facet(default)]
    pub details: Vec<DetailEntry>,
    #[facet(default)]
    pub per_test: Vec<ReportPerTest>,
}

#[derive(Debug, Clone, Facet)]
pub struct ReportPerTest {
    pub test: Vec<String>,
    #[facet(default)]
    pub details: Vec<DetailEntry>,
}

impl CoverageReport {
    pub fn from_json(content: &str) -> Result<Self> {
        facet_json::from_str(content).wrap_err("Failed to parse coverage report")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&content).wrap_err_with(|| format!("Invalid report {}", path.display()))
    }

    /// Replay the report into a coverage run, one file at a time.
    pub fn into_coverage(self) -> TestCoverage {
        let coverage = TestCoverage::new();
        for test in self.tests {
            coverage.register_test(TestItem::new(TestId::new(test.id), test.label));
        }

        let files = self.files.len();
        for file in self.files {
            let per_test: Vec<(TestId, FileCoverage)> = file
                .per_test
                .iter()
                .map(|entry| {
                    (
                        TestId::new(entry.test.iter().cloned()),
                        FileCoverage::with_details(file.uri.clone(), entry.details.clone()),
                    )
                })
                .collect();
            coverage.append(file.into_file_coverage(), per_test);
        }
        debug!(files, "Loaded coverage report");
        coverage
    }
}

impl ReportFile {
    fn into_file_coverage(self) -> FileCoverage {
        if self.bypassed {
            return FileCoverage::bypassed(self.uri);
        }

        let (statement, branch, declaration) = summarize_details(&self.details);
        FileCoverage::new(
            self.uri,
            self.statement.unwrap_or(statement),
            self.branch.or(branch),
            self.declaration.or(declaration),
            Arc::new(StaticDetails::new(self.details)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageKind, CoverageResult};

    const REPORT: &str = r#"{
        "tests": [
            { "id": ["ctrl"], "label": "Controller" },
            { "id": ["ctrl", "adds"], "label": "adds" }
        ],
        "files": [
            {
                "uri": "file:///src/math.rs",
                "details": [
                    { "Declaration": { "name": "add", "location": { "Range": { "start": { "line": 0, "column": 0 }, "end": { "line": 4, "column": 1 } } }, "count": 1 } },
                    { "Statement": { "location": { "Position": { "line": 1, "column": 4 } }, "count": 1 } },
                    { "Statement": { "location": { "Position": { "line": 9, "column": 4 } }, "count": 0 } }
                ],
                "perTest": [
                    {
                        "test": ["ctrl", "adds"],
                        "details": [
                            { "Statement": { "location": { "Position": { "line": 1, "column": 4 } }, "count": 1 } }
                        ]
                    }
                ]
            },
            {
                "uri": "file:///src/gen.rs",
                "bypassed": true
            },
            {
                "uri": "file:///src/io.rs",
                "statement": { "covered": 3, "total": 4 }
            }
        ]
    }"#;

    #[test]
    fn loads_files_and_tests() {
        let coverage = CoverageReport::from_json(REPORT)
            .expect("valid report")
            .into_coverage();
        let tree = coverage.tree();

        let math = tree.find("file:///src/math.rs").expect("math.rs");
        assert_eq!(math.value().statement, CoverageCount::new(1, 2));
        assert_eq!(math.value().declaration, Some(CoverageCount::new(1, 1)));
        assert!(math.value().has_declarations());

        let generated = tree.find("file:///src/gen.rs").expect("gen.rs");
        assert_eq!(generated.value().kind(), CoverageKind::Bypassed);

        let io = tree.find("file:///src/io.rs").expect("io.rs");
        assert_eq!(io.value().statement, CoverageCount::new(3, 4));

        let adds = TestId::new(["ctrl", "adds"]);
        assert_eq!(coverage.all_per_test_ids(), vec![adds.clone()]);
        assert_eq!(
            coverage.get_test_by_id(&adds).map(|t| t.label),
            Some("adds".to_string())
        );
        let scoped = coverage.filter_tree_for_test(&adds);
        assert_eq!(scoped.files().len(), 1);
    }

    #[test]
    fn rejects_malformed_json() {
        let error = CoverageReport::from_json("{ \"files\": 3 }").unwrap_err();
        assert!(format!("{error:#}").contains("Failed to parse coverage report"));
    }
}
