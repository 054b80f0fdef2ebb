//! Presentation-layer slicing of fully materialized, ordered collections.

use crate::cursor;
use serde::Serialize;
use std::collections::BTreeMap;

/// One page of an ordered collection plus the token needed to resume after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: usize,
    pub has_next: bool,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Page { items: Vec::new(), count: 0, has_next: false, next_cursor: None }
    }
}

/// Slice `items` starting at the cursor's index.
///
/// `limit` must already be validated (`None` = no cap, otherwise >= 1).
/// A start index past the end yields an empty, terminal page.
pub fn paginate<T>(items: Vec<T>, limit: Option<usize>, token: Option<&str>) -> Page<T> {
    let start = cursor::decode(token).index;
    slice(items, limit, start, &BTreeMap::new())
}

/// Like [`paginate`], but the issued cursor carries `filters`, and a cursor
/// issued under different filters restarts from the beginning.
pub fn paginate_filtered<T>(
    items: Vec<T>,
    limit: Option<usize>,
    token: Option<&str>,
    filters: &BTreeMap<String, String>,
) -> Page<T> {
    let decoded = cursor::decode(token);
    let start = if decoded.filters == *filters { decoded.index } else { 0 };
    slice(items, limit, start, filters)
}

fn slice<T>(
    items: Vec<T>,
    limit: Option<usize>,
    start: usize,
    filters: &BTreeMap<String, String>,
) -> Page<T> {
    let total = items.len();
    let start = start.min(total);
    let end = match limit {
        Some(limit) => start.saturating_add(limit).min(total),
        None => total,
    };
    let has_next = end < total;
    let page: Vec<T> = items.into_iter().skip(start).take(end - start).collect();
    Page {
        count: page.len(),
        items: page,
        has_next,
        next_cursor: has_next.then(|| cursor::encode_with_filters(end, filters)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(items: &[u32], limit: usize) -> (Vec<u32>, usize) {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = paginate(items.to_vec(), Some(limit), token.as_deref());
            pages += 1;
            assert_eq!(page.count, page.items.len());
            assert_eq!(page.has_next, page.next_cursor.is_some());
            out.extend(page.items);
            if !page.has_next {
                break;
            }
            token = page.next_cursor;
            assert!(pages <= items.len() + 1, "pagination did not terminate");
        }
        (out, pages)
    }

    #[test]
    fn following_cursors_reassembles_collection() {
        let items: Vec<u32> = (0..23).collect();
        for limit in 1..=25 {
            let (out, pages) = drain(&items, limit);
            assert_eq!(out, items, "limit {limit}");
            assert_eq!(pages, items.len().div_ceil(limit).max(1), "limit {limit}");
        }
    }

    #[test]
    fn empty_collection_yields_terminal_page() {
        let page = paginate(Vec::<u32>::new(), Some(2), None);
        assert_eq!(page, Page::empty());
    }

    #[test]
    fn no_limit_returns_remainder() {
        let page = paginate(vec![1, 2, 3, 4], None, Some(&cursor::encode(1)));
        assert_eq!(page.items, vec![2, 3, 4]);
        assert!(!page.has_next);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn start_past_end_is_empty_and_terminal() {
        let page = paginate(vec![1, 2, 3], Some(2), Some(&cursor::encode(50)));
        assert!(page.items.is_empty());
        assert_eq!(page.count, 0);
        assert!(!page.has_next);
    }

    #[test]
    fn invalid_cursor_matches_no_cursor() {
        let items = vec!["a", "b", "c"];
        let fresh = paginate(items.clone(), Some(2), None);
        let bad = paginate(items, Some(2), Some("not-a-cursor"));
        assert_eq!(fresh, bad);
    }

    #[test]
    fn last_page_has_no_cursor() {
        let first = paginate(vec![1, 2, 3], Some(2), None);
        assert_eq!(first.items, vec![1, 2]);
        let second = paginate(vec![1, 2, 3], Some(2), first.next_cursor.as_deref());
        assert_eq!(second.items, vec![3]);
        assert!(!second.has_next);
        assert!(second.next_cursor.is_none());
    }

    #[test]
    fn filtered_cursor_resets_when_filters_change() {
        let open: BTreeMap<String, String> = [("state".to_string(), "open".to_string())].into();
        let closed: BTreeMap<String, String> = [("state".to_string(), "closed".to_string())].into();
        let first = paginate_filtered(vec![1, 2, 3, 4], Some(2), None, &open);
        let token = first.next_cursor.clone().unwrap();
        assert_eq!(cursor::decode(Some(&token)).filters, open);

        let same = paginate_filtered(vec![1, 2, 3, 4], Some(2), Some(&token), &open);
        assert_eq!(same.items, vec![3, 4]);

        let changed = paginate_filtered(vec![1, 2, 3, 4], Some(2), Some(&token), &closed);
        assert_eq!(changed.items, vec![1, 2]);
    }
}
