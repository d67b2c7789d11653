//! Rank vectors: the positions publishers occupy in the reactive DAG.
//!
//! Every publisher owns a fixed vector of non-negative integers assigned at
//! creation. The reactor delivers ticks in ascending rank order within one
//! logical instant, so the order on ranks is what makes an instant a single
//! topological sweep: a publisher created while another publisher's process
//! is executing becomes that process's upstream input and sorts strictly
//! before its creator; siblings sort in birth order; later top-level
//! publishers sort after earlier ones.
//!
//! The order is lexicographic with one twist: when one vector is a proper
//! prefix of the other, the *longer* vector sorts first. This is what puts
//! nested (upstream) publishers ahead of the publisher they were created
//! under.

use core::cmp::Ordering;
use core::fmt;
use smallvec::SmallVec;

/// Rank vectors rarely nest deeper than a handful of levels; keep them
/// inline.
type RankVec = SmallVec<[u32; 8]>;

/// A publisher's position in the reactive DAG.
///
/// Ranks never change after creation. Comparison is total: for any two
/// distinct publishers one strictly precedes the other.
#[derive(Clone, PartialEq, Eq)]
pub struct Rank(RankVec);

impl Rank {
    /// Rank of a fresh top-level publisher (no process was executing when it
    /// was created).
    #[must_use]
    pub(crate) fn root(birth: u32) -> Self {
        let mut v = RankVec::new();
        v.push(birth);
        Self(v)
    }

    /// Rank of a publisher created under `self` as its `child`-th creation.
    #[must_use]
    pub fn child(&self, child: u32) -> Self {
        let mut v = self.0.clone();
        v.push(child);
        Self(v)
    }

    /// Builds a rank from raw components.
    ///
    /// Intended for tests and diagnostics; the engine derives ranks itself.
    #[must_use]
    pub fn from_parts(parts: &[u32]) -> Self {
        Self(SmallVec::from_slice(parts))
    }

    /// Returns the rank's components.
    #[must_use]
    pub fn parts(&self) -> &[u32] {
        &self.0
    }

    /// Returns the nesting depth of the publisher this rank belongs to.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.cmp(b) {
                Ordering::Equal => {}
                diff => return diff,
            }
        }
        // Prefix-equal: the longer vector sorts first.
        other.0.len().cmp(&self.0.len())
    }
}

impl fmt::Debug for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rank{:?}", self.0.as_slice())
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(parts: &[u32]) -> Rank {
        Rank::from_parts(parts)
    }

    #[test]
    fn siblings_sort_in_birth_order() {
        let parent = rank(&[2]);
        let a = parent.child(0);
        let b = parent.child(1);
        assert!(a < b);
        assert_eq!(a.parts(), &[2, 0]);
        assert_eq!(b.parts(), &[2, 1]);
    }

    #[test]
    fn top_level_publishers_sort_by_birth() {
        assert!(Rank::root(0) < Rank::root(1));
        assert!(Rank::root(1) < Rank::root(7));
    }

    #[test]
    fn nested_publisher_precedes_its_creator() {
        let creator = rank(&[3, 1]);
        let nested = creator.child(0);
        assert!(nested < creator);
    }

    #[test]
    fn lexicographic_on_first_difference() {
        assert!(rank(&[1, 9, 9]) < rank(&[2]));
        assert!(rank(&[2, 0]) < rank(&[2, 1, 5]));
    }

    #[test]
    fn longer_prefix_equal_sorts_first() {
        assert!(rank(&[4, 0]) < rank(&[4]));
        assert!(rank(&[4, 0, 0]) < rank(&[4, 0]));
    }

    #[test]
    fn order_is_total_and_consistent_with_eq() {
        let ranks = [
            rank(&[0]),
            rank(&[0, 0]),
            rank(&[0, 1]),
            rank(&[1]),
            rank(&[1, 0, 2]),
        ];
        for x in &ranks {
            for y in &ranks {
                let lt = x < y;
                let gt = x > y;
                let eq = x == y;
                assert_eq!(
                    [lt, gt, eq].iter().filter(|b| **b).count(),
                    1,
                    "exactly one of <, >, == must hold for {x} vs {y}"
                );
            }
        }
    }
}
