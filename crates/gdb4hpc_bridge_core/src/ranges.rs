//! Rank ranges: canonical sets of disjoint closed integer intervals.
//!
//! gdb4hpc addresses groups of ranks with compact text such as `0,3..5,7`
//! (ranks {0,3,4,5,7}) and scopes them to a process set as `App0{0..3}`.
//! Every constructor canonicalises its input (sorted, overlapping and
//! adjacent intervals merged), so the algebra below can assume it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Rank = u64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid rank '{0}'")]
    InvalidRank(String),

    #[error("descending interval {lo}..{hi}")]
    Descending { lo: Rank, hi: Rank },

    #[error("missing '{{' in scoped range '{0}'")]
    MissingScope(String),
}

/// A closed interval `[lo, hi]`, `lo <= hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub lo: Rank,
    pub hi: Rank,
}

impl Interval {
    pub fn new(lo: Rank, hi: Rank) -> Self {
        debug_assert!(lo <= hi);
        Self { lo, hi }
    }

    fn width(&self) -> u64 {
        (self.hi - self.lo).saturating_add(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RangeSet {
    intervals: Vec<Interval>,
}

impl RangeSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(rank: Rank) -> Self {
        Self {
            intervals: vec![Interval::new(rank, rank)],
        }
    }

    pub fn span(lo: Rank, hi: Rank) -> Self {
        if lo > hi {
            return Self::empty();
        }
        Self {
            intervals: vec![Interval::new(lo, hi)],
        }
    }

    /// Every rank. Used where the backend does not scope a value to a group.
    pub fn all() -> Self {
        Self::span(0, Rank::MAX)
    }

    /// Builds a canonical set from intervals in any order, possibly overlapping.
    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let mut sorted: Vec<Interval> = intervals.into_iter().collect();
        sorted.sort_unstable();

        let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
        for next in sorted {
            match merged.last_mut() {
                // touching intervals merge too: 0..2 and 3..5 become 0..5
                Some(last) if next.lo <= last.hi.saturating_add(1) => {
                    last.hi = last.hi.max(next.hi);
                }
                _ => merged.push(next),
            }
        }

        Self { intervals: merged }
    }

    pub fn parse(text: &str) -> Result<Self, RangeError> {
        let text = text.trim();
        let text = text
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .unwrap_or(text);

        let mut intervals = Vec::new();
        for item in text.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }

            let interval = match item.split_once("..") {
                Some((lo, hi)) => {
                    let lo = parse_rank(lo)?;
                    let hi = parse_rank(hi)?;
                    if lo > hi {
                        return Err(RangeError::Descending { lo, hi });
                    }
                    Interval::new(lo, hi)
                }
                None => {
                    let rank = parse_rank(item)?;
                    Interval::new(rank, rank)
                }
            };
            intervals.push(interval);
        }

        Ok(Self::from_intervals(intervals))
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of ranks in the set, saturating at `u64::MAX`.
    pub fn len(&self) -> u64 {
        self.intervals
            .iter()
            .fold(0u64, |acc, interval| acc.saturating_add(interval.width()))
    }

    pub fn contains(&self, rank: Rank) -> bool {
        self.intervals
            .binary_search_by(|interval| {
                if interval.hi < rank {
                    std::cmp::Ordering::Less
                } else if interval.lo > rank {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn first(&self) -> Option<Rank> {
        self.intervals.first().map(|interval| interval.lo)
    }

    /// Iterates every rank in ascending order.
    pub fn ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        self.intervals
            .iter()
            .flat_map(|interval| interval.lo..=interval.hi)
    }

    pub fn intersect(&self, other: &RangeSet) -> RangeSet {
        let (a, b) = (&self.intervals, &other.intervals);
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < a.len() && j < b.len() {
            let lo = a[i].lo.max(b[j].lo);
            let hi = a[i].hi.min(b[j].hi);
            if lo <= hi {
                out.push(Interval::new(lo, hi));
            }
            if a[i].hi < b[j].hi {
                i += 1;
            } else {
                j += 1;
            }
        }

        // sweep output is already sorted and disjoint
        RangeSet { intervals: out }
    }

    pub fn intersects(&self, other: &RangeSet) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Ranks of `self` that are not in `remove`.
    pub fn subtract(&self, remove: &RangeSet) -> RangeSet {
        let mut out = Vec::new();
        let mut j = 0;

        for base in &self.intervals {
            // skip removals entirely left of this base interval
            while j < remove.intervals.len() && remove.intervals[j].hi < base.lo {
                j += 1;
            }

            let mut cursor = Some(base.lo);
            let mut k = j;
            while let Some(start) = cursor {
                let Some(cut) = remove.intervals.get(k).filter(|cut| cut.lo <= base.hi) else {
                    out.push(Interval::new(start, base.hi));
                    break;
                };

                if cut.lo > start {
                    out.push(Interval::new(start, cut.lo - 1));
                }
                cursor = match cut.hi.checked_add(1) {
                    Some(next) if next <= base.hi => Some(next),
                    _ => None,
                };
                k += 1;
            }
        }

        RangeSet { intervals: out }
    }

    pub fn union(&self, other: &RangeSet) -> RangeSet {
        RangeSet::from_intervals(
            self.intervals
                .iter()
                .chain(other.intervals.iter())
                .copied(),
        )
    }
}

fn parse_rank(text: &str) -> Result<Rank, RangeError> {
    let text = text.trim();
    text.parse::<Rank>()
        .map_err(|_| RangeError::InvalidRank(text.to_string()))
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, interval) in self.intervals.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            if interval.lo == interval.hi {
                write!(f, "{}", interval.lo)?;
            } else {
                write!(f, "{}..{}", interval.lo, interval.hi)?;
            }
        }
        Ok(())
    }
}

impl FromStr for RangeSet {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RangeSet::parse(s)
    }
}

impl Serialize for RangeSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RangeSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        RangeSet::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Parses process-set scoped text such as `App0{0..3,7}` or `$App0{2}`.
pub fn parse_scoped(text: &str) -> Result<(String, RangeSet), RangeError> {
    let text = text.trim();
    let text = text.strip_prefix('$').unwrap_or(text);
    let Some((name, rest)) = text.split_once('{') else {
        return Err(RangeError::MissingScope(text.to_string()));
    };
    let ranges = rest.strip_suffix('}').unwrap_or(rest);
    Ok((name.trim().to_string(), RangeSet::parse(ranges)?))
}

/// Parses a list of scoped ranges, e.g. `$App0{0..3},$App1{2}`.
///
/// Commas inside braces belong to the range, so the list is split on
/// brace depth rather than on every comma. Repeated names are unioned.
pub fn parse_scoped_list(text: &str) -> Result<Vec<(String, RangeSet)>, RangeError> {
    let mut items: Vec<(String, RangeSet)> = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (idx, ch) in text.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                push_scoped(&text[start..idx], &mut items)?;
                start = idx + 1;
            }
            _ => {}
        }
    }
    push_scoped(&text[start..], &mut items)?;

    Ok(items)
}

fn push_scoped(chunk: &str, items: &mut Vec<(String, RangeSet)>) -> Result<(), RangeError> {
    if chunk.trim().is_empty() {
        return Ok(());
    }
    let (name, ranges) = parse_scoped(chunk)?;
    match items.iter_mut().find(|(existing, _)| *existing == name) {
        Some((_, existing)) => *existing = existing.union(&ranges),
        None => items.push((name, ranges)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rs(text: &str) -> RangeSet {
        RangeSet::parse(text).expect("test range should parse")
    }

    #[test]
    fn format_round_trips_canonical_text() {
        for text in ["1,3..5,7", "0", "0..3,7", "2..9,11..12,100", ""] {
            assert_eq!(rs(text).to_string(), text);
        }
    }

    #[test]
    fn parse_canonicalises_unsorted_and_overlapping_input() {
        assert_eq!(rs("7,0..3,2..5").to_string(), "0..5,7");
        assert_eq!(rs("4,3,2").to_string(), "2..4");
        assert_eq!(rs("0..2,3..5").to_string(), "0..5");
        assert_eq!(rs("{1, 3..4}").to_string(), "1,3..4");
    }

    #[test]
    fn parse_rejects_non_numeric_and_descending_items() {
        assert_eq!(
            RangeSet::parse("1,x,3"),
            Err(RangeError::InvalidRank("x".to_string()))
        );
        assert_eq!(
            RangeSet::parse("5..2"),
            Err(RangeError::Descending { lo: 5, hi: 2 })
        );
        assert!(RangeSet::parse("1..").is_err());
    }

    #[test]
    fn intersect_sweeps_both_lists() {
        assert_eq!(rs("0..3,6..9").intersect(&rs("2..7")).to_string(), "2..3,6..7");
        assert_eq!(rs("0..9").intersect(&rs("3")).to_string(), "3");
        assert!(rs("0..3").intersect(&rs("4..8")).is_empty());
        assert!(rs("0,2,4").intersect(&rs("1,3,5")).is_empty());
    }

    #[test]
    fn subtract_self_is_empty() {
        for text in ["0", "0..3", "1,3..5,7", "0..18446744073709551615"] {
            let set = rs(text);
            assert!(set.subtract(&set).is_empty(), "{text} minus itself");
        }
    }

    #[test]
    fn subtract_covers_every_overlap_shape() {
        // full cover
        assert!(rs("2..4").subtract(&rs("0..9")).is_empty());
        // removal strictly inside splits in two
        assert_eq!(rs("0..9").subtract(&rs("3..5")).to_string(), "0..2,6..9");
        // removal touching one edge trims
        assert_eq!(rs("0..9").subtract(&rs("0..4")).to_string(), "5..9");
        assert_eq!(rs("0..9").subtract(&rs("7..12")).to_string(), "0..6");
        // disjoint passes through
        assert_eq!(rs("0..3,8").subtract(&rs("5..6")).to_string(), "0..3,8");
        // several removals inside one base interval
        assert_eq!(rs("0..10").subtract(&rs("1,4..5,9")).to_string(), "0,2..3,6..8,10");
    }

    #[test]
    fn subtract_is_overflow_safe_at_the_edges() {
        let all = RangeSet::all();
        assert_eq!(all.subtract(&rs("0")).first(), Some(1));
        let top = RangeSet::single(Rank::MAX);
        assert_eq!(all.subtract(&top).intervals()[0].hi, Rank::MAX - 1);
    }

    #[test]
    fn union_and_membership() {
        let set = rs("0..2").union(&rs("3,7"));
        assert_eq!(set.to_string(), "0..3,7");
        assert!(set.contains(3));
        assert!(!set.contains(5));
        assert_eq!(set.len(), 5);
        assert_eq!(set.ranks().collect::<Vec<_>>(), vec![0, 1, 2, 3, 7]);
    }

    #[test]
    fn scoped_ranges_parse_with_optional_dollar() {
        assert_eq!(parse_scoped("App0{0..3,7}").unwrap(), ("App0".to_string(), rs("0..3,7")));
        assert_eq!(parse_scoped("$App1{2}").unwrap(), ("App1".to_string(), rs("2")));
        assert!(matches!(parse_scoped("App0"), Err(RangeError::MissingScope(_))));
    }

    #[test]
    fn scoped_list_splits_on_top_level_commas_only() {
        let items = parse_scoped_list("$App0{0..3,7},$App1{2},$App0{9}").unwrap();
        assert_eq!(
            items,
            vec![
                ("App0".to_string(), rs("0..3,7,9")),
                ("App1".to_string(), rs("2")),
            ]
        );
    }

    #[test]
    fn serde_uses_text_form() {
        let json = serde_json::to_string(&rs("1,3..5")).unwrap();
        assert_eq!(json, "\"1,3..5\"");
        let back: RangeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rs("1,3..5"));
    }
}
