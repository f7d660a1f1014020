//! Choices offered when filtering coverage to a single test

use crate::coverage::CoverageResult;
use crate::test_id::TestId;

pub const ALL_TESTS_LABEL: &str = "All tests";

/// Separator between the labels of a test and its ancestors
const LABEL_SEPARATOR: &str = " \u{203a} ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChoice {
    pub label: String,
    /// `None` selects every test
    pub test: Option<TestId>,
}

/// Label of `test`: the labels of its ancestors and itself, minus the first
/// `common_prefix` levels.
pub fn label_for_test(
    coverage: &dyn CoverageResult,
    test: &TestId,
    common_prefix: usize,
) -> String {
    let mut parts = Vec::new();
    for id in test.ids_from_root() {
        let Some(item) = coverage.get_test_by_id(&id) else {
            break;
        };
        parts.push(item.label);
    }
    parts
        .get(common_prefix..)
        .unwrap_or_default()
        .join(LABEL_SEPARATOR)
}

/// "All tests" followed by every test that produced per-test coverage
pub fn filter_choices(coverage: &dyn CoverageResult) -> Vec<FilterChoice> {
    let tests = coverage.all_per_test_ids();
    let common_prefix = TestId::common_prefix_len(&tests);

    std::iter::once(FilterChoice {
        label: ALL_TESTS_LABEL.to_string(),
        test: None,
    })
    .chain(tests.into_iter().map(|test| FilterChoice {
        label: label_for_test(coverage, &test, common_prefix),
        test: Some(test),
    }))
    .collect()
}

/// Find the test whose label or `\0`-joined id matches `query`
pub fn find_test(coverage: &dyn CoverageResult, query: &str) -> Option<TestId> {
    let tests = coverage.all_per_test_ids();
    if let Some(id) = tests.iter().find(|id| id.to_string() == query) {
        return Some(id.clone());
    }
    tests.into_iter().find(|id| {
        coverage
            .get_test_by_id(id)
            .is_some_and(|item| item.label == query)
    })
}
