//! CVS dotted revision numbers.
//!
//! Branch numbers come in three shapes in `symbolic names:` tables:
//!
//! ```text
//! 1.1.1      vendor branch (even number of dots)
//! 1.3.0.5    branch with the magic `0` component, normalized to 1.3.5
//! 1.5        tag (anything else)
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Branch name assigned to trunk revisions (`x.y`).
pub const HEAD_BRANCH: &str = "HEAD";

/// Sentinel for revisions whose branch prefix has no symbolic name.
pub const UNKNOWN_BRANCH: &str = "UNKNOWN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Branch,
    Tag,
}

/// Classify a symbolic revision number and return it normalized.
///
/// Returns `None` when the number has no dot at all.
pub fn classify_symbol(rev: &str) -> Option<(SymbolKind, String)> {
    let dots: Vec<usize> = rev.match_indices('.').map(|(i, _)| i).collect();
    match dots.len() {
        0 => None,
        1 => Some((SymbolKind::Tag, rev.to_string())),
        n if n % 2 == 0 => Some((SymbolKind::Branch, rev.to_string())),
        n => {
            let prev_dot = dots[n - 2];
            let last_dot = dots[n - 1];
            let penultimate = &rev[prev_dot + 1..last_dot];
            if penultimate.parse::<u32>().unwrap_or(0) == 0 {
                let mut normalized = String::with_capacity(rev.len());
                normalized.push_str(&rev[..prev_dot]);
                normalized.push_str(&rev[last_dot..]);
                Some((SymbolKind::Branch, normalized))
            } else {
                Some((SymbolKind::Tag, rev.to_string()))
            }
        }
    }
}

/// Strip trailing lock annotations such as `1.4\tlocked by: joe;`.
pub fn trim_revision(rev: &str) -> &str {
    let end = rev
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rev.len());
    &rev[..end]
}

/// Split off the last component: `1.2.2.7` -> (`1.2.2`, 7).
pub fn split_last(rev: &str) -> Option<(&str, u32)> {
    let idx = rev.rfind('.')?;
    let num = rev[idx + 1..].parse().ok()?;
    Some((&rev[..idx], num))
}

/// Bump the last component: `1.4` -> `1.5`. Fails on a zero or missing
/// last component.
pub fn increment(rev: &str) -> Option<String> {
    let (prefix, num) = split_last(rev)?;
    if num == 0 {
        return None;
    }
    Some(format!("{}.{}", prefix, num + 1))
}

/// Branch number a revision lives on, `None` for trunk.
pub fn branch_number(rev: &str) -> Option<&str> {
    let (prefix, _) = split_last(rev)?;
    if prefix.contains('.') {
        Some(prefix)
    } else {
        None
    }
}

/// Parsed dotted revision number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevisionNumber(Vec<u32>);

impl RevisionNumber {
    pub fn components(&self) -> &[u32] {
        &self.0
    }

    pub fn is_trunk(&self) -> bool {
        self.0.len() == 2
    }

    /// `self` is `other` or lies on the line of history leading to it.
    pub fn is_ancestor_or_equal(&self, other: &RevisionNumber) -> bool {
        let k = self.0.len();
        if k < 2 || k % 2 != 0 || k > other.0.len() {
            return false;
        }
        if k == 2 {
            return self.0[..] <= other.0[..2];
        }
        self.0[..k - 1] == other.0[..k - 1] && self.0[k - 1] <= other.0[k - 1]
    }

    /// `next` is the revision committed right after `self` on the same file
    /// history: next number on the same line, the first revision of a branch
    /// sprouting from `self`, or a trunk major-number bump.
    pub fn is_direct_successor(&self, next: &RevisionNumber) -> bool {
        let (a, b) = (&self.0, &next.0);
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if a.len() == b.len() {
            let n = a.len();
            if a[..n - 1] == b[..n - 1] && b[n - 1] == a[n - 1] + 1 {
                return true;
            }
            return n == 2 && b[0] > a[0] && b[1] == 1;
        }
        b.len() == a.len() + 2 && b[..a.len()] == a[..] && b[b.len() - 1] == 1
    }
}

impl FromStr for RevisionNumber {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('.')
            .map(str::parse)
            .collect::<Result<Vec<u32>, _>>()
            .map(RevisionNumber)
    }
}

impl fmt::Display for RevisionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, n) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", n)?;
        }
        Ok(())
    }
}

impl PartialOrd for RevisionNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RevisionNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rev(s: &str) -> RevisionNumber {
        s.parse().unwrap()
    }

    #[test]
    fn test_classify_magic_branch() {
        assert_eq!(
            classify_symbol("1.3.0.5"),
            Some((SymbolKind::Branch, "1.3.5".to_string()))
        );
        assert_eq!(
            classify_symbol("1.2.4.1.0.2"),
            Some((SymbolKind::Branch, "1.2.4.1.2".to_string()))
        );
    }

    #[test]
    fn test_classify_vendor_branch() {
        assert_eq!(
            classify_symbol("1.1.1"),
            Some((SymbolKind::Branch, "1.1.1".to_string()))
        );
        assert_eq!(
            classify_symbol("1.5.2"),
            Some((SymbolKind::Branch, "1.5.2".to_string()))
        );
    }

    #[test]
    fn test_classify_tags() {
        assert_eq!(classify_symbol("1.5"), Some((SymbolKind::Tag, "1.5".to_string())));
        assert_eq!(
            classify_symbol("1.1.1.1"),
            Some((SymbolKind::Tag, "1.1.1.1".to_string()))
        );
        assert_eq!(
            classify_symbol("1.5.2.1"),
            Some((SymbolKind::Tag, "1.5.2.1".to_string()))
        );
        assert_eq!(classify_symbol("7"), None);
    }

    #[test]
    fn test_trim_revision() {
        assert_eq!(trim_revision("1.4\tlocked by: joe;"), "1.4");
        assert_eq!(trim_revision("1.2.2.1"), "1.2.2.1");
        assert_eq!(trim_revision(""), "");
    }

    #[test]
    fn test_split_and_branch_number() {
        assert_eq!(split_last("1.2.2.7"), Some(("1.2.2", 7)));
        assert_eq!(split_last("1"), None);
        assert_eq!(branch_number("1.7"), None);
        assert_eq!(branch_number("1.2.2.7"), Some("1.2.2"));
    }

    #[test]
    fn test_increment() {
        assert_eq!(increment("1.4").as_deref(), Some("1.5"));
        assert_eq!(increment("1.2.2.9").as_deref(), Some("1.2.2.10"));
        assert_eq!(increment("1.0"), None);
        assert_eq!(increment("1"), None);
    }

    #[test]
    fn test_ancestry() {
        assert!(rev("1.2").is_ancestor_or_equal(&rev("1.2")));
        assert!(rev("1.2").is_ancestor_or_equal(&rev("1.5")));
        assert!(rev("1.2").is_ancestor_or_equal(&rev("1.2.2.3")));
        assert!(rev("1.9").is_ancestor_or_equal(&rev("2.1")));
        assert!(rev("1.2.2.1").is_ancestor_or_equal(&rev("1.2.2.3")));
        assert!(!rev("1.3").is_ancestor_or_equal(&rev("1.2.2.3")));
        assert!(!rev("1.2.2.4").is_ancestor_or_equal(&rev("1.2.2.3")));
        assert!(!rev("1.2.4.1").is_ancestor_or_equal(&rev("1.2.2.3")));
    }

    #[test]
    fn test_direct_successor() {
        assert!(rev("1.4").is_direct_successor(&rev("1.5")));
        assert!(rev("1.4").is_direct_successor(&rev("1.4.2.1")));
        assert!(rev("1.9").is_direct_successor(&rev("2.1")));
        assert!(rev("1.2.2.1").is_direct_successor(&rev("1.2.2.2")));
        assert!(!rev("1.4").is_direct_successor(&rev("1.6")));
        assert!(!rev("1.4").is_direct_successor(&rev("1.4.2.2")));
    }

    #[test]
    fn test_display_roundtrip() {
        assert_eq!(rev("1.2.2.10").to_string(), "1.2.2.10");
    }

    proptest! {
        #[test]
        fn prop_increment_is_direct_successor(major in 1u32..50, minor in 1u32..500) {
            let base = format!("{}.{}", major, minor);
            let next = increment(&base).unwrap();
            prop_assert!(rev(&base).is_direct_successor(&rev(&next)));
            prop_assert!(rev(&base).is_ancestor_or_equal(&rev(&next)));
            prop_assert!(!rev(&next).is_ancestor_or_equal(&rev(&base)));
        }
    }
}
