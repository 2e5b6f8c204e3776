//! Binary search helpers over key-sorted slices.
//!
//! Every helper takes a `key_of` projection so the same code serves
//! primary record stores and index record stores.

use shelfdb_codec::{Key, KeyRange};
use std::cmp::Ordering;
use std::ops::Range;

/// Finds `key` in a slice sorted by unique keys.
///
/// `Ok(i)` is the position of the match, `Err(i)` the insertion point.
pub(crate) fn index_of<T>(items: &[T], key: &Key, key_of: impl Fn(&T) -> &Key) -> Result<usize, usize> {
    items.binary_search_by(|item| key_of(item).cmp(key))
}

/// Finds the slot for `(key, secondary)` in a slice sorted by that pair.
pub(crate) fn index_of_pair<T>(
    items: &[T],
    key: &Key,
    secondary: &Key,
    pair_of: impl Fn(&T) -> (&Key, &Key),
) -> Result<usize, usize> {
    items.binary_search_by(|item| {
        let (k, s) = pair_of(item);
        match k.cmp(key) {
            Ordering::Equal => s.cmp(secondary),
            other => other,
        }
    })
}

/// Returns the first position whose key is not below `range`'s lower bound.
pub(crate) fn lower_bound<T>(items: &[T], range: &KeyRange, key_of: impl Fn(&T) -> &Key) -> usize {
    items.partition_point(|item| !range.above_lower(key_of(item)))
}

/// Returns the first position whose key is above `range`'s upper bound.
pub(crate) fn upper_bound<T>(items: &[T], range: &KeyRange, key_of: impl Fn(&T) -> &Key) -> usize {
    items.partition_point(|item| range.below_upper(key_of(item)))
}

/// Returns the positions of every item whose key lies in `range`.
pub(crate) fn window<T>(items: &[T], range: &KeyRange, key_of: impl Fn(&T) -> &Key + Copy) -> Range<usize> {
    let start = lower_bound(items, range, key_of);
    let end = upper_bound(items, range, key_of).max(start);
    start..end
}

/// Converts a request's `count` into an iterator bound; zero means no limit.
pub(crate) fn limit(count: Option<u32>) -> usize {
    match count {
        None | Some(0) => usize::MAX,
        Some(n) => n as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ns: &[i32]) -> Vec<Key> {
        ns.iter().map(|&n| Key::from(n)).collect()
    }

    #[test]
    fn index_of_finds_and_inserts() {
        let items = keys(&[1, 3, 5]);
        assert_eq!(index_of(&items, &Key::from(3), |k| k), Ok(1));
        assert_eq!(index_of(&items, &Key::from(4), |k| k), Err(2));
        assert_eq!(index_of(&items, &Key::from(0), |k| k), Err(0));
    }

    #[test]
    fn window_respects_open_bounds() {
        let items = keys(&[1, 2, 3, 4, 5]);
        let closed = KeyRange::bound(Key::from(2), Key::from(4), false, false).unwrap();
        assert_eq!(window(&items, &closed, |k| k), 1..4);

        let open = KeyRange::bound(Key::from(2), Key::from(4), true, true).unwrap();
        assert_eq!(window(&items, &open, |k| k), 2..3);
    }

    #[test]
    fn window_with_duplicates() {
        let items = keys(&[1, 2, 2, 2, 3]);
        let only = KeyRange::only(Key::from(2));
        assert_eq!(window(&items, &only, |k| k), 1..4);
    }

    #[test]
    fn window_outside_items_is_empty() {
        let items = keys(&[1, 2, 3]);
        let above = KeyRange::lower_bound(Key::from(10), false);
        assert!(window(&items, &above, |k| k).is_empty());
        let below = KeyRange::upper_bound(Key::from(0), false);
        assert!(window(&items, &below, |k| k).is_empty());
    }

    #[test]
    fn zero_or_missing_count_is_unlimited() {
        assert_eq!(limit(None), usize::MAX);
        assert_eq!(limit(Some(0)), usize::MAX);
        assert_eq!(limit(Some(7)), 7);
    }

    #[test]
    fn pair_search_orders_by_secondary() {
        let items = vec![
            (Key::from("a"), Key::from(1)),
            (Key::from("a"), Key::from(3)),
            (Key::from("b"), Key::from(2)),
        ];
        fn pair(item: &(Key, Key)) -> (&Key, &Key) {
            (&item.0, &item.1)
        }
        assert_eq!(index_of_pair(&items, &Key::from("a"), &Key::from(3), pair), Ok(1));
        assert_eq!(index_of_pair(&items, &Key::from("a"), &Key::from(2), pair), Err(1));
        assert_eq!(index_of_pair(&items, &Key::from("b"), &Key::from(0), pair), Err(2));
    }
}
