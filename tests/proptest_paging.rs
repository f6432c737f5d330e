//! Property-based tests using proptest
//!
//! These tests check the offset paginator against simulated list APIs and
//! the defaulting behaviour of path extraction on randomized inputs.

use hwc_provider::resource::{collect_offset_pages, path_search, Page};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::cell::Cell;

/// Serve `items` in pages of `page_size`, reporting the total when asked
fn run_collector(
    items: &[u32],
    page_size: usize,
    report_total: bool,
) -> (Vec<u32>, usize, Vec<usize>) {
    let calls = Cell::new(0usize);
    let offsets = std::cell::RefCell::new(Vec::new());

    let collected = tokio_test::block_on(collect_offset_pages(|offset| {
        calls.set(calls.get() + 1);
        offsets.borrow_mut().push(offset);
        let end = (offset + page_size).min(items.len());
        let page = if offset < items.len() {
            items[offset..end].to_vec()
        } else {
            Vec::new()
        };
        let total = report_total.then_some(items.len());
        async move { Ok(Page::new(page, total)) }
    }))
    .unwrap();

    (collected, calls.get(), offsets.into_inner())
}

proptest! {
    /// Every item comes back exactly once and in order
    #[test]
    fn test_collects_all_items_in_order(
        items in prop::collection::vec(any::<u32>(), 0..300),
        page_size in 1usize..60,
        report_total in any::<bool>()
    ) {
        let (collected, _, _) = run_collector(&items, page_size, report_total);
        prop_assert_eq!(collected, items);
    }

    /// Paging ends after at most one request beyond the last full page
    #[test]
    fn test_request_count_is_bounded(
        len in 0usize..300,
        page_size in 1usize..60,
        report_total in any::<bool>()
    ) {
        let items: Vec<u32> = (0..len as u32).collect();
        let (_, calls, _) = run_collector(&items, page_size, report_total);

        let bound = len.div_ceil(page_size) + 1;
        prop_assert!(calls <= bound, "{} calls for {} items / page {}", calls, len, page_size);
        prop_assert!(calls >= 1);
        if report_total && len > 0 {
            prop_assert_eq!(calls, len.div_ceil(page_size));
        }
    }

    /// Offsets advance by exactly the number of items each page returned
    #[test]
    fn test_offsets_follow_returned_counts(
        len in 0usize..200,
        page_size in 1usize..40
    ) {
        let items: Vec<u32> = (0..len as u32).collect();
        let (_, _, offsets) = run_collector(&items, page_size, false);

        for (i, offset) in offsets.iter().enumerate() {
            prop_assert_eq!(*offset, (i * page_size).min(len));
        }
    }

    /// Looking up a key that is not there yields the default, whatever the default is
    #[test]
    fn test_missing_path_yields_default(
        key in "[a-z]{1,12}",
        default in prop_oneof![
            Just(Value::Null),
            any::<i64>().prop_map(Value::from),
            "[a-z0-9 ]{0,16}".prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ]
    ) {
        let root = json!({"present": {"nested": 1}});
        prop_assume!(key != "present");
        prop_assert_eq!(path_search(&key, &root, default.clone()), default);
    }

    /// An existing top-level string comes back untouched
    #[test]
    fn test_existing_path_is_returned(
        key in "[a-z]{1,12}",
        value in "[ -~]{0,32}"
    ) {
        let root = json!({ key.clone(): value.clone() });
        prop_assert_eq!(path_search(&key, &root, Value::Null), Value::String(value));
    }
}
