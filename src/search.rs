//! Search algorithms over an ordered sequence of lines.
//!
//! Five interchangeable strategies:
//! - `linear`: single pass, valid on any sequence
//! - `jump`: block probes of size sqrt(n), requires ascending order
//! - `binary`: interval halving, requires ascending order
//! - `kmp`: substring search over the newline-joined text
//! - `exponential`: doubling probe then bounded binary search, requires
//!   ascending order
//!
//! Only `linear` is used on the lookup path since the dataset is not sorted.
//! The others are reached through the benchmark harness. On unsorted input
//! they return "not found" for present values rather than failing, so their
//! timings on such input measure throughput only.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;

/// Find the first index holding `target`.
pub fn linear_search<T, Q>(items: &[T], target: &Q) -> Option<usize>
where
    T: Borrow<Q>,
    Q: PartialEq + ?Sized,
{
    items.iter().position(|item| item.borrow() == target)
}

/// Jump search. `items` must be sorted ascending.
pub fn jump_search<T, Q>(items: &[T], target: &Q) -> Option<usize>
where
    T: Borrow<Q>,
    Q: Ord + ?Sized,
{
    let len = items.len();
    if len == 0 {
        return None;
    }

    let block = ((len as f64).sqrt() as usize).max(1);
    let mut start = 0;
    let mut end = block.min(len);

    // Probe the last element of each block until it reaches the target
    while items[end - 1].borrow() < target {
        start = end;
        if start >= len {
            return None;
        }
        end = (end + block).min(len);
    }

    items[start..end]
        .iter()
        .position(|item| item.borrow() == target)
        .map(|offset| start + offset)
}

/// Binary search. `items` must be sorted ascending; ordering is not checked.
pub fn binary_search<T, Q>(items: &[T], target: &Q) -> Option<usize>
where
    T: Borrow<Q>,
    Q: Ord + ?Sized,
{
    let mut low = 0;
    let mut high = items.len();

    while low < high {
        let mid = low + (high - low) / 2;
        match items[mid].borrow().cmp(target) {
            Ordering::Less => low = mid + 1,
            Ordering::Greater => high = mid,
            Ordering::Equal => return Some(mid),
        }
    }
    None
}

/// Exponential search. `items` must be sorted ascending.
pub fn exponential_search<T, Q>(items: &[T], target: &Q) -> Option<usize>
where
    T: Borrow<Q>,
    Q: Ord + ?Sized,
{
    let first = items.first()?;
    if first.borrow() == target {
        return Some(0);
    }

    let mut bound = 1;
    while bound < items.len() && items[bound].borrow() <= target {
        bound *= 2;
    }

    let start = bound / 2;
    let end = (bound + 1).min(items.len());
    binary_search(&items[start..end], target).map(|offset| start + offset)
}

/// Knuth-Morris-Pratt substring search.
///
/// Returns the byte offset of the first occurrence of `pattern` in `text`.
/// An empty pattern matches at offset 0.
pub fn kmp_search(text: &[u8], pattern: &[u8]) -> Option<usize> {
    if pattern.is_empty() {
        return Some(0);
    }

    let fallback = prefix_table(pattern);
    let mut matched = 0;

    for (i, &byte) in text.iter().enumerate() {
        while matched > 0 && pattern[matched] != byte {
            matched = fallback[matched - 1];
        }
        if pattern[matched] == byte {
            matched += 1;
        }
        if matched == pattern.len() {
            return Some(i + 1 - matched);
        }
    }
    None
}

/// Length of the longest proper prefix of `pattern[..=i]` that is also a
/// suffix of it, for every `i`.
fn prefix_table(pattern: &[u8]) -> Vec<usize> {
    let mut table = vec![0; pattern.len()];
    let mut len = 0;

    for i in 1..pattern.len() {
        while len > 0 && pattern[i] != pattern[len] {
            len = table[len - 1];
        }
        if pattern[i] == pattern[len] {
            len += 1;
        }
        table[i] = len;
    }
    table
}

/// The lines being searched, plus their newline-joined text for `Kmp`.
#[derive(Debug, Clone)]
pub struct Corpus {
    lines: Vec<String>,
    text: String,
}

impl Corpus {
    pub fn new(lines: Vec<String>) -> Self {
        let text = lines.join("\n");
        Corpus { lines, text }
    }

    /// Build a corpus with its lines sorted ascending.
    pub fn sorted(mut lines: Vec<String>) -> Self {
        lines.sort_unstable();
        Self::new(lines)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// The closed set of search strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchAlgorithm {
    Linear,
    Jump,
    Binary,
    Kmp,
    Exponential,
}

impl SearchAlgorithm {
    pub const ALL: [SearchAlgorithm; 5] = [
        SearchAlgorithm::Linear,
        SearchAlgorithm::Jump,
        SearchAlgorithm::Binary,
        SearchAlgorithm::Kmp,
        SearchAlgorithm::Exponential,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SearchAlgorithm::Linear => "Linear Search",
            SearchAlgorithm::Jump => "Jump Search",
            SearchAlgorithm::Binary => "Binary Search",
            SearchAlgorithm::Kmp => "KMP Search",
            SearchAlgorithm::Exponential => "Exponential Search",
        }
    }

    /// Whether results are only meaningful on ascending input.
    pub fn requires_sorted(&self) -> bool {
        matches!(
            self,
            SearchAlgorithm::Jump | SearchAlgorithm::Binary | SearchAlgorithm::Exponential
        )
    }

    /// Search `corpus` for `target`.
    ///
    /// Returns a line index, except for `Kmp` which returns a byte offset
    /// into the joined text.
    pub fn search(&self, corpus: &Corpus, target: &str) -> Option<usize> {
        match self {
            SearchAlgorithm::Linear => linear_search(&corpus.lines, target),
            SearchAlgorithm::Jump => jump_search(&corpus.lines, target),
            SearchAlgorithm::Binary => binary_search(&corpus.lines, target),
            SearchAlgorithm::Kmp => kmp_search(corpus.text.as_bytes(), target.as_bytes()),
            SearchAlgorithm::Exponential => exponential_search(&corpus.lines, target),
        }
    }
}

impl fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_linear_unordered_matches_brute_force() {
        let items = lines(&["pear", "apple", "fig", "apple", "kiwi", ""]);

        for (i, item) in items.iter().enumerate() {
            let expected = items.iter().position(|x| x == item);
            assert_eq!(linear_search(&items, item.as_str()), expected);
            assert!(linear_search(&items, item.as_str()).unwrap() <= i);
        }
        assert_eq!(linear_search(&items, "plum"), None);
    }

    #[test]
    fn test_linear_empty() {
        let items: Vec<String> = Vec::new();
        assert_eq!(linear_search(&items, "x"), None);
    }

    #[test]
    fn test_sorted_strategies_find_every_element() {
        let items: Vec<u32> = (0..100).map(|i| i * 3).collect();

        for (i, value) in items.iter().enumerate() {
            assert_eq!(binary_search(&items, value), Some(i), "binary {value}");
            assert_eq!(jump_search(&items, value), Some(i), "jump {value}");
            assert_eq!(exponential_search(&items, value), Some(i), "exponential {value}");
        }
    }

    #[test]
    fn test_sorted_strategies_absent_targets() {
        let items: Vec<u32> = (0..100).map(|i| i * 3).collect();

        for value in [1u32, 2, 148, 500] {
            assert_eq!(binary_search(&items, &value), None);
            assert_eq!(jump_search(&items, &value), None);
            assert_eq!(exponential_search(&items, &value), None);
        }
    }

    #[test]
    fn test_sorted_strategies_on_strings() {
        let mut items = lines(&["25;0;23;16;0;19;3;0;", "6;0;1;26;0;7;3;0;", "11;0;2;"]);
        items.sort();

        for (i, item) in items.iter().enumerate() {
            assert_eq!(binary_search(&items, item.as_str()), Some(i));
            assert_eq!(jump_search(&items, item.as_str()), Some(i));
            assert_eq!(exponential_search(&items, item.as_str()), Some(i));
        }
        assert_eq!(binary_search(&items, "nope"), None);
    }

    #[test]
    fn test_sorted_strategies_empty_and_single() {
        let empty: Vec<u32> = Vec::new();
        assert_eq!(binary_search(&empty, &1u32), None);
        assert_eq!(jump_search(&empty, &1u32), None);
        assert_eq!(exponential_search(&empty, &1u32), None);

        let single = vec![7u32];
        assert_eq!(binary_search(&single, &7u32), Some(0));
        assert_eq!(jump_search(&single, &7u32), Some(0));
        assert_eq!(exponential_search(&single, &7u32), Some(0));
        assert_eq!(jump_search(&single, &8u32), None);
    }

    #[test]
    fn test_kmp_search() {
        assert_eq!(kmp_search(b"abxabcabcaby", b"abcaby"), Some(6));
        assert_eq!(kmp_search(b"aaaaab", b"aab"), Some(3));
        assert_eq!(kmp_search(b"hello", b"world"), None);
        assert_eq!(kmp_search(b"short", b"much longer"), None);
        assert_eq!(kmp_search(b"anything", b""), Some(0));
    }

    #[test]
    fn test_prefix_table() {
        assert_eq!(prefix_table(b"aabaaab"), vec![0, 1, 0, 1, 2, 2, 3]);
        assert_eq!(prefix_table(b"abcd"), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_algorithm_dispatch_on_sorted_corpus() {
        let corpus = Corpus::sorted(lines(&["delta", "alpha", "charlie", "bravo"]));

        for algorithm in SearchAlgorithm::ALL {
            let found = algorithm.search(&corpus, "charlie");
            assert!(found.is_some(), "{algorithm} missed a present line");
            assert_eq!(algorithm.search(&corpus, "echo"), None, "{algorithm}");
        }

        assert_eq!(SearchAlgorithm::Linear.search(&corpus, "charlie"), Some(2));
        // "alpha\nbravo\n" precedes the match
        assert_eq!(SearchAlgorithm::Kmp.search(&corpus, "charlie"), Some(12));
    }

    #[test]
    fn test_unsorted_corpus_only_linear_is_reliable() {
        let corpus = Corpus::new(lines(&["m", "z", "a", "q", "b"]));

        for line in corpus.lines() {
            assert!(SearchAlgorithm::Linear.search(&corpus, line).is_some());
        }
        // Halving past "a" and "b" never reaches "z" at index 1
        assert_eq!(SearchAlgorithm::Binary.search(&corpus, "z"), None);
    }

    #[test]
    fn test_requires_sorted() {
        assert!(!SearchAlgorithm::Linear.requires_sorted());
        assert!(!SearchAlgorithm::Kmp.requires_sorted());
        assert!(SearchAlgorithm::Jump.requires_sorted());
        assert!(SearchAlgorithm::Binary.requires_sorted());
        assert!(SearchAlgorithm::Exponential.requires_sorted());
    }
}
