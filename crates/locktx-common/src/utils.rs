//! Utility functions for locktx
//!
//! Collection helpers shared across the workspace.

use std::collections::HashSet;
use std::hash::Hash;

/// Remove duplicate elements, keeping the first occurrence of each
///
/// Order of the surviving elements is preserved. An empty slice yields an
/// empty `Vec`.
///
/// # Examples
///
/// ```
/// use locktx_common::distinct;
///
/// assert_eq!(distinct(&["a", "b", "a", "c"]), vec!["a", "b", "c"]);
/// assert!(distinct::<u8>(&[]).is_empty());
/// ```
pub fn distinct<T>(items: &[T]) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let mut seen = HashSet::with_capacity(items.len());
    items
        .iter()
        .filter(|item| seen.insert(*item))
        .cloned()
        .collect()
}
