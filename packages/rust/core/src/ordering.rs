//! Deterministic document ordering.
//!
//! Paths compare segment by segment. A segment with a leading numeric prefix
//! (`01_intro`) sorts before any segment without one, numbered segments
//! compare by value, and ties fall back to plain text comparison. The result
//! is a strict total order over distinct paths.

use std::cmp::Ordering;

use docweave_shared::DocumentId;

/// Leading ASCII digits of a segment with leading zeros removed.
/// `None` when the segment does not start with a digit.
fn numeric_prefix(segment: &str) -> Option<&str> {
    let end = segment
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(segment.len());
    if end == 0 {
        return None;
    }
    let digits = segment[..end].trim_start_matches('0');
    Some(if digits.is_empty() { "0" } else { digits })
}

/// Compare digit strings without leading zeros by numeric value, at any length.
fn compare_digits(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_segments(a: &str, b: &str) -> Ordering {
    match (numeric_prefix(a), numeric_prefix(b)) {
        (Some(x), Some(y)) => compare_digits(x, y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Compare two `/`-separated relative paths.
pub fn compare_paths(a: &str, b: &str) -> Ordering {
    let mut left = a.split('/');
    let mut right = b.split('/');
    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) => match compare_segments(x, y) {
                Ordering::Equal => continue,
                other => return other,
            },
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        }
    }
}

/// Sort documents into consolidation order.
pub fn sort_documents(docs: &mut [DocumentId]) {
    docs.sort_by(|a, b| compare_paths(a.as_str(), b.as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(paths: &[&str]) -> Vec<String> {
        let mut docs: Vec<DocumentId> = paths.iter().map(|p| DocumentId::from(*p)).collect();
        sort_documents(&mut docs);
        docs.into_iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn numbered_before_unnumbered() {
        assert_eq!(
            sorted(&["02_b.md", "no_prefix.md", "01_a.md"]),
            vec!["01_a.md", "02_b.md", "no_prefix.md"]
        );
    }

    #[test]
    fn numeric_not_lexicographic() {
        assert_eq!(
            sorted(&["10_ten.md", "9_nine.md", "100_hundred.md"]),
            vec!["9_nine.md", "10_ten.md", "100_hundred.md"]
        );
    }

    #[test]
    fn applies_per_segment() {
        assert_eq!(
            sorted(&["02_part/01_x.md", "01_part/zeta.md", "01_part/02_y.md", "appendix.md"]),
            vec!["01_part/02_y.md", "01_part/zeta.md", "02_part/01_x.md", "appendix.md"]
        );
    }

    #[test]
    fn equal_numbers_tie_break_on_text() {
        assert_eq!(compare_paths("01_a.md", "1_a.md"), Ordering::Less);
        assert_eq!(compare_paths("1_a.md", "01_a.md"), Ordering::Greater);
        assert_eq!(compare_paths("1_a.md", "1_a.md"), Ordering::Equal);
    }

    #[test]
    fn huge_prefixes_do_not_overflow() {
        let a = "99999999999999999999999999999999999999999_a.md";
        let b = "100000000000000000000000000000000000000000_b.md";
        assert_eq!(compare_paths(a, b), Ordering::Less);
    }

    #[test]
    fn order_is_stable_under_permutation() {
        let input = ["b.md", "03_c.md", "a.md", "01_a.md", "x/01.md", "x/a.md"];
        let forward = sorted(&input);
        let mut reversed = input;
        reversed.reverse();
        assert_eq!(forward, sorted(&reversed));
    }
}
