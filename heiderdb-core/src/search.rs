/// Result of a binary search algorithm.
///
/// # Cases
///
/// * `Ok(index)` - The index of the key if found.
/// * `Err(index)` - The index where the key should be inserted.
pub(crate) type SearchIndex = Result<usize, usize>;

/// Generates code for a binary search algorithm that searches for a given key in a collection.
///
/// Returns the index of the key if found, or and error indicating where the key should be
/// inserted to maintain a sorted order.
///
/// # Arguments
///
/// * `key` - The value you're searching for in the collection.
/// * `len` - The length of the collection.
/// * `obtain` - An expression that takes an index and returns the value at that index in the collection.
macro_rules! search {
    ($key:expr, $len:expr, $index:ident => $obtain:expr) => {{
        let mut result = None;
        let mut range = 0..$len;

        while !range.is_empty() {
            let $index = (range.start + range.end) / 2;
            let record = $obtain;

            if record < $key {
                range.start = $index + 1;
            } else if record > $key {
                range.end = $index;
            } else {
                result = Some($index);
                break;
            }
        }

        result.ok_or(range.start)
    }};
}

pub(crate) use search;

/// The index of the first element greater than the key.
#[inline]
pub(crate) fn upper_bound(index: SearchIndex) -> usize {
    index.map_or_else(|i| i, |i| i + 1)
}

/// The index of the last element less than or equal to the key, if any.
#[inline]
pub(crate) fn floor(index: SearchIndex) -> Option<usize> {
    match index {
        Ok(i) => Some(i),
        Err(i) => i.checked_sub(1),
    }
}
