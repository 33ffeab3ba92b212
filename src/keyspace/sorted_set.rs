//! Score-ordered set of byte members
//!
//! Ordering is by `(score, insertion sequence)`, so members sharing a score
//! come back in the order they were first added. Members are unique by
//! content: re-adding identical bytes with the same score changes nothing,
//! with a different score the member moves.

use ahash::AHashMap;
use bytes::Bytes;
use std::collections::BTreeMap;

/// Position of a member in the ordered index
type Slot = (i64, u64);

/// Up to this size every mutation re-walks the whole set in debug builds;
/// above it only the touched slot is checked.
#[cfg(debug_assertions)]
const FULL_CHECK_LIMIT: usize = 128;

#[derive(Clone, Debug, Default)]
pub struct OrderedSet {
    /// Member -> slot, for O(1) dedup and score lookup
    members: AHashMap<Bytes, Slot>,
    /// Slot -> member, for ordered range scans
    index: BTreeMap<Slot, Bytes>,
    next_seq: u64,
}

impl OrderedSet {
    pub fn new() -> Self {
        OrderedSet {
            members: AHashMap::new(),
            index: BTreeMap::new(),
            next_seq: 0,
        }
    }

    #[cfg(debug_assertions)]
    fn verify_invariants(&self, touched: Slot) {
        debug_assert_eq!(
            self.members.len(),
            self.index.len(),
            "Invariant violated: members.len() ({}) != index.len() ({})",
            self.members.len(),
            self.index.len()
        );

        debug_assert!(
            self.index
                .get(&touched)
                .is_some_and(|member| self.members.get(member) == Some(&touched)),
            "Invariant violated: slot {:?} not linked both ways",
            touched
        );

        if self.members.len() <= FULL_CHECK_LIMIT {
            for (member, slot) in &self.members {
                debug_assert!(
                    self.index.get(slot) == Some(member),
                    "Invariant violated: member at slot {:?} missing from index",
                    slot
                );
            }
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn verify_invariants(&self, _touched: Slot) {}

    /// Add member with score. Returns true if the member is new.
    pub fn add(&mut self, member: Bytes, score: i64) -> bool {
        use std::collections::hash_map::Entry;

        #[cfg(debug_assertions)]
        let pre_len = self.members.len();

        let seq = self.next_seq;
        let added = match self.members.entry(member) {
            Entry::Occupied(mut entry) => {
                let old_slot = *entry.get();
                if old_slot.0 == score {
                    return false;
                }
                let new_slot = (score, seq);
                entry.insert(new_slot);
                let member = entry.key().clone();
                self.index.remove(&old_slot);
                self.index.insert(new_slot, member);
                false
            }
            Entry::Vacant(entry) => {
                let new_slot = (score, seq);
                self.index.insert(new_slot, entry.key().clone());
                entry.insert(new_slot);
                true
            }
        };
        self.next_seq += 1;

        #[cfg(debug_assertions)]
        {
            if added {
                debug_assert_eq!(
                    self.members.len(),
                    pre_len + 1,
                    "Postcondition violated: len must increase by 1"
                );
            }
            self.verify_invariants((score, seq));
        }

        added
    }

    pub fn score(&self, member: &[u8]) -> Option<i64> {
        self.members.get(member).map(|slot| slot.0)
    }

    /// Members with `min <= score <= max`, ascending. An inverted range is empty.
    pub fn range_by_score(&self, min: i64, max: i64) -> Vec<(Bytes, i64)> {
        if min > max {
            return Vec::new();
        }
        self.index
            .range((min, 0)..=(max, u64::MAX))
            .map(|(slot, member)| (member.clone(), slot.0))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, i64)> {
        self.index.iter().map(|(slot, member)| (member, slot.0))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Scores ascend across the whole set; checked by the pipeline simulation
    pub fn is_sorted(&self) -> bool {
        let mut prev: Option<i64> = None;
        for (_, score) in self.iter() {
            if prev.is_some_and(|p| score < p) {
                return false;
            }
            prev = Some(score);
        }
        true
    }
}

impl PartialEq for OrderedSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .members
                .iter()
                .all(|(m, slot)| other.score(m) == Some(slot.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn members(set: &OrderedSet, min: i64, max: i64) -> Vec<String> {
        set.range_by_score(min, max)
            .into_iter()
            .map(|(m, _)| String::from_utf8(m.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_range_is_inclusive_and_ordered() {
        let mut set = OrderedSet::new();
        set.add(b("c"), 300);
        set.add(b("a"), 100);
        set.add(b("b"), 200);

        assert_eq!(members(&set, 150, 300), vec!["b", "c"]);
        assert_eq!(members(&set, 100, 100), vec!["a"]);
        assert_eq!(members(&set, i64::MIN, i64::MAX), vec!["a", "b", "c"]);
        assert!(members(&set, 301, 400).is_empty());
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let mut set = OrderedSet::new();
        set.add(b("a"), 100);
        assert!(set.range_by_score(200, 100).is_empty());
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let mut set = OrderedSet::new();
        set.add(b("zebra"), 100);
        set.add(b("apple"), 100);
        set.add(b("mango"), 100);

        assert_eq!(members(&set, 100, 100), vec!["zebra", "apple", "mango"]);
    }

    #[test]
    fn test_readd_same_score_is_noop() {
        let mut set = OrderedSet::new();
        assert!(set.add(b("x"), 10));
        set.add(b("y"), 10);
        assert!(!set.add(b("x"), 10));

        assert_eq!(set.len(), 2);
        // x keeps its original position
        assert_eq!(members(&set, 10, 10), vec!["x", "y"]);
    }

    #[test]
    fn test_readd_new_score_moves_member() {
        let mut set = OrderedSet::new();
        set.add(b("x"), 10);
        set.add(b("y"), 20);
        assert!(!set.add(b("x"), 30));

        assert_eq!(set.len(), 2);
        assert_eq!(set.score(b"x"), Some(30));
        assert_eq!(members(&set, 0, 100), vec!["y", "x"]);
        assert!(set.is_sorted());
    }

    #[test]
    fn test_large_set_stays_ordered() {
        let mut set = OrderedSet::new();
        // descending scores with repeats, well past the full-walk size
        for i in 0..50_000i64 {
            assert!(set.add(Bytes::from(i.to_le_bytes().to_vec()), (50_000 - i) / 3));
        }

        assert_eq!(set.len(), 50_000);
        assert!(set.is_sorted());
        assert_eq!(set.range_by_score(0, 0).len(), 2);
        assert_eq!(set.range_by_score(i64::MIN, i64::MAX).len(), 50_000);
    }
}
