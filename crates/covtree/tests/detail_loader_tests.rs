//! Loading declarations when a file row expands.

mod common;

use common::*;
use covtree::{
    CoverageElement, CoverageResult, CoverageTreeView, FileCoverage, OpenAction, TestCoverage,
    ViewConfig,
};
use covtree_core::{DetailEntry, Position, Range};
use std::sync::Arc;

fn slow_coverage() -> Arc<TestCoverage> {
    let coverage = Arc::new(TestCoverage::new());
    coverage.append(slow_file("file:///s/slow.rs"), []);
    coverage.append(file_with_ratio("file:///s/other.rs", 1, 1), []);
    coverage
}

#[tokio::test]
async fn asynchronous_details_show_a_loading_row_first() {
    let mut view = view_for(slow_coverage());
    let slow = file_key("file:///s/slow.rs");

    let pending = view.expand(&slow).expect("details to fetch");
    let children = view.tree().children(Some(&slow)).to_vec();
    assert_eq!(children.len(), 1);
    assert!(matches!(
        view.tree().element(&children[0]),
        Some(CoverageElement::Loading(_))
    ));
    assert!(outline(&view).contains(&"2:Loading Coverage Details...".to_string()));

    // Expanding again while loading does not start a second fetch.
    assert!(view.expand(&slow).is_none());

    let loaded = pending.fetch().await.unwrap();
    assert!(view.update_with_details(loaded));

    let labels: Vec<String> = view
        .tree()
        .children(Some(&slow))
        .iter()
        .filter_map(|key| view.tree().element(key))
        .map(CoverageElement::label)
        .collect();
    assert_eq!(labels, vec!["fn_0", "fn_1", "fn_2", "fn_3", "fn_4"]);
    assert!(!view.tree().has_element(&children[0]));
}

#[tokio::test]
async fn synchronous_details_skip_the_loading_row() {
    let mut view = view_for(sample_coverage());
    let nested = file_key("file:///repo/src/util/nested.rs");

    let pending = view.expand(&nested).expect("details to fetch");
    assert!(view.tree().children(Some(&nested)).is_empty());

    let loaded = pending.fetch().await.unwrap();
    assert_eq!(loaded.forest().len(), 2);
    assert!(view.update_with_details(loaded));

    let outer = key_of(&view, "outer");
    assert_eq!(view.tree().is_collapsed(&outer), Some(true));
    assert!(view.tree().has_pending_children(&outer));
    view.expand(&outer);
    let inner = key_of(&view, "inner");
    assert_eq!(view.tree().is_collapsible(&inner), Some(false));

    let rows = view.rows();
    let outer_row = rows.iter().find(|r| r.key == outer).expect("outer row");
    assert_eq!(outer_row.tpc, Some(0.5));
    assert_eq!(outer_row.aria_label, "outer coverage: 50.00%");
    let inner_row = rows.iter().find(|r| r.key == inner).expect("inner row");
    assert_eq!(inner_row.tpc, Some(1.0));
}

#[tokio::test]
async fn stale_details_are_dropped_silently() {
    let coverage = slow_coverage();
    let mut view = view_for(Arc::clone(&coverage));
    let slow = file_key("file:///s/slow.rs");
    let pending = view.expand(&slow).expect("details to fetch");

    // The run is replaced while the fetch is in flight.
    let replacement = Arc::new(TestCoverage::new());
    replacement.append(file_with_ratio("file:///t/x.rs", 1, 1), []);
    view.set_input(replacement as Arc<dyn CoverageResult>, None);
    let before = view.tree().visible_rows();

    let loaded = pending.fetch().await.unwrap();
    assert!(!view.update_with_details(loaded));
    assert_eq!(view.tree().visible_rows(), before);
    assert!(!view.tree().has_element(&slow));
}

#[tokio::test]
async fn details_of_a_replaced_value_are_dropped() {
    let coverage = slow_coverage();
    let mut view = view_for(Arc::clone(&coverage));
    let slow = file_key("file:///s/slow.rs");
    let pending = view.expand(&slow).expect("details to fetch");

    // New coverage for the same file lands while the fetch is in flight.
    coverage.append(
        FileCoverage::with_details(
            "file:///s/slow.rs",
            vec![DetailEntry::declaration("fresh", Range::lines(0, 5), 1)],
        ),
        [],
    );
    view.process_pending_updates();
    assert!(view.tree().children(Some(&slow)).is_empty());

    let stale = pending.fetch().await.unwrap();
    assert!(!view.update_with_details(stale));
    assert!(view.tree().children(Some(&slow)).is_empty());

    assert!(view.expand_and_load(&slow).await.unwrap());
    let labels: Vec<String> = view
        .tree()
        .children(Some(&slow))
        .iter()
        .filter_map(|key| view.tree().element(key))
        .map(CoverageElement::label)
        .collect();
    assert_eq!(labels, vec!["fresh"]);
}

#[tokio::test]
async fn fetch_errors_reach_the_caller() {
    let coverage = Arc::new(TestCoverage::new());
    coverage.append(failing_file("file:///f/broken.rs"), []);
    coverage.append(file_with_ratio("file:///f/fine.rs", 1, 1), []);
    let mut view = view_for(coverage);

    let error = view
        .expand_and_load(&file_key("file:///f/broken.rs"))
        .await
        .unwrap_err();
    assert!(error.to_string().contains("coverage backend went away"));
}

#[tokio::test]
async fn expanding_directories_needs_no_fetch() {
    let mut view = view_for(sample_coverage());
    let util = file_key("file:///repo/src/util");
    view.collapse(&util);
    assert!(view.expand(&util).is_none());
    assert!(!view.expand_and_load(&util).await.unwrap());
}

#[tokio::test]
async fn opening_a_declaration_selects_its_range() {
    let mut view = view_for(sample_coverage());
    let nested = file_key("file:///repo/src/util/nested.rs");
    view.expand_and_load(&nested).await.unwrap();

    let outer = key_of(&view, "outer");
    assert_eq!(
        view.open(&outer),
        Some(OpenAction::Editor {
            uri: "file:///repo/src/util/nested.rs".into(),
            selection: Some(Range::lines(0, 100)),
        })
    );
}

#[tokio::test]
async fn point_declarations_open_an_empty_selection() {
    let coverage = Arc::new(TestCoverage::new());
    coverage.append(
        FileCoverage::with_details(
            "file:///p/lib.rs",
            vec![DetailEntry::declaration("main", Position::new(3, 4), 1)],
        ),
        [],
    );
    let mut view = view_for(coverage);
    view.expand_and_load(&file_key("file:///p/lib.rs")).await.unwrap();

    let main = key_of(&view, "main");
    let at = Position::new(3, 4);
    assert_eq!(
        view.open(&main),
        Some(OpenAction::Editor {
            uri: "file:///p/lib.rs".into(),
            selection: Some(Range::new(at, at)),
        })
    );
}

fn folding_view(coverage: Arc<TestCoverage>) -> CoverageTreeView {
    let config = ViewConfig {
        fold_uncovered_declarations: true,
        ..ViewConfig::default()
    };
    let mut view = CoverageTreeView::new(config);
    view.set_input(coverage as Arc<dyn CoverageResult>, None);
    view
}

#[tokio::test]
async fn uncovered_declarations_fold_into_one_row() {
    let coverage = Arc::new(TestCoverage::new());
    coverage.append(
        FileCoverage::with_details(
            "file:///m/mod.rs",
            vec![
                DetailEntry::declaration("used", Range::lines(0, 5), 2),
                DetailEntry::declaration("unused_b", Range::lines(10, 15), 0),
                DetailEntry::declaration("unused_a", Range::lines(20, 25), 0),
            ],
        ),
        [],
    );
    let mut view = folding_view(coverage);
    let file = file_key("file:///m/mod.rs");
    assert!(view.expand_and_load(&file).await.unwrap());

    assert_eq!(
        outline(&view),
        vec!["0:mod.rs", "1:used", "1:2 declarations without coverage..."]
    );

    let fold = key_of(&view, "2 declarations without coverage...");
    assert_eq!(view.open(&fold), None);
    assert_eq!(
        outline(&view),
        vec!["0:mod.rs", "1:used", "1:unused_b", "1:unused_a"]
    );
    assert!(!view.tree().has_element(&fold));
}
