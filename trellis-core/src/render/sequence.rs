//! Longest Increasing Subsequence
//!
//! The keyed child diff records, for every new child, the position of its
//! old counterpart plus one (zero for children that have none). Children
//! whose old positions already form an increasing run can stay where they
//! are; only the rest must be moved. The run is found with patience
//! sorting in O(n log n).

/// Indices of one longest strictly increasing subsequence of the non-zero
/// entries of `seq`, in ascending order.
///
/// Zero entries never take part in the result.
///
/// # Example
///
/// ```rust,ignore
/// // old positions + 1 of the new children; 0 = newly mounted
/// let seq = [3, 4, 1, 0];
/// assert_eq!(longest_increasing_subsequence(&seq), vec![0, 1]);
/// ```
pub fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    if seq.is_empty() {
        return Vec::new();
    }

    // predecessor[i] is the index before i in the best run ending at i
    let mut predecessor: Vec<usize> = vec![0; seq.len()];
    // tails[k] is the index of the smallest tail of a run of length k + 1
    let mut tails: Vec<usize> = vec![0];

    for (i, &value) in seq.iter().enumerate() {
        if value == 0 {
            continue;
        }

        let last = tails[tails.len() - 1];
        if seq[last] < value {
            predecessor[i] = last;
            tails.push(i);
            continue;
        }

        let (mut lo, mut hi) = (0, tails.len() - 1);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if seq[tails[mid]] < value {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if value < seq[tails[lo]] {
            if lo > 0 {
                predecessor[i] = tails[lo - 1];
            }
            tails[lo] = i;
        }
    }

    let mut cursor = tails[tails.len() - 1];
    for slot in tails.iter_mut().rev() {
        *slot = cursor;
        cursor = predecessor[cursor];
    }

    // A leading zero seeds the search but is not part of any run.
    if seq[tails[0]] == 0 {
        tails.remove(0);
    }
    tails
}
