// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Integer intervals and interval boxes
//!
//! `i64::MIN` and `i64::MAX` endpoints stand for -inf and +inf. An
//! `IntervalMap` is the axis-aligned box over integer variables and
//! select-terms produced by strengthening.

use crate::expr::Expr;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Width of the window sampled next to the finite endpoint of a one-sided
/// infinite interval.
const ONE_SIDED_WINDOW: i64 = 1 << 32;

/// Half-width of the window sampled from a doubly-infinite interval.
const INFINITE_WINDOW: i64 = 1 << 32;

/// The product of interval widths does not fit in a u64, or some interval
/// is infinite. The box is only marked infinite for statistics; sampling
/// still proceeds.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("interval box size overflows")]
pub struct OverflowInSize;

/// An integer interval [low, high]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    low: i64,
    high: i64,
}

impl Default for Interval {
    /// The full interval (-inf, +inf)
    fn default() -> Self {
        Self {
            low: i64::MIN,
            high: i64::MAX,
        }
    }
}

impl Interval {
    pub fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }

    pub fn top() -> Self {
        Self::default()
    }

    pub fn low(&self) -> i64 {
        self.low
    }

    pub fn high(&self) -> i64 {
        self.high
    }

    /// Monotone tightening: widening to a smaller lower bound is a no-op
    pub fn set_lower_bound(&mut self, bound: i64) {
        if bound > self.low {
            self.low = bound;
        }
    }

    /// Monotone tightening: widening to a larger upper bound is a no-op
    pub fn set_upper_bound(&mut self, bound: i64) {
        if bound < self.high {
            self.high = bound;
        }
    }

    pub fn is_low_minf(&self) -> bool {
        self.low == i64::MIN
    }

    pub fn is_high_inf(&self) -> bool {
        self.high == i64::MAX
    }

    /// Empty interval
    pub fn is_bottom(&self) -> bool {
        self.low > self.high
    }

    /// Bilateral infinite interval
    pub fn is_top(&self) -> bool {
        self.is_low_minf() && self.is_high_inf()
    }

    /// Infinite on at least one side
    pub fn is_infinite(&self) -> bool {
        self.is_low_minf() || self.is_high_inf()
    }

    pub fn is_in_range(&self, value: i64) -> bool {
        self.low <= value && value <= self.high
    }

    /// Number of integers in the interval; `Err` when infinite
    pub fn width(&self) -> Result<u64, OverflowInSize> {
        if self.is_infinite() {
            return Err(OverflowInSize);
        }
        if self.is_bottom() {
            return Ok(0);
        }
        Ok((self.high as i128 - self.low as i128 + 1) as u64)
    }

    /// A uniform draw from the interval. Infinite endpoints are replaced
    /// by a finite window so the draw itself cannot overflow.
    pub fn random_in_range(&self, rng: &mut StdRng) -> i64 {
        debug_assert!(!self.is_bottom());
        let (low, high) = if self.is_top() {
            (-INFINITE_WINDOW, INFINITE_WINDOW)
        } else if self.is_low_minf() {
            (self.high.saturating_sub(ONE_SIDED_WINDOW), self.high)
        } else if self.is_high_inf() {
            (self.low, self.low.saturating_add(ONE_SIDED_WINDOW))
        } else {
            (self.low, self.high)
        };
        rng.gen_range(low as i128..=high as i128) as i64
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_low_minf(), self.is_high_inf()) {
            (true, true) => write!(f, "[-inf,inf]"),
            (true, false) => write!(f, "[-inf,{}]", self.high),
            (false, true) => write!(f, "[{},inf]", self.low),
            (false, false) => write!(f, "[{},{}]", self.low, self.high),
        }
    }
}

/// Mapping from variables and select-terms to their intervals
#[derive(Debug, Clone, Default)]
pub struct IntervalMap {
    intervals: HashMap<Expr, Interval>,
}

impl IntervalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn get(&self, key: &Expr) -> Option<&Interval> {
        self.intervals.get(key)
    }

    /// Interval for `key`, inserting the full interval if absent
    pub fn entry(&mut self, key: Expr) -> &mut Interval {
        self.intervals.entry(key).or_default()
    }

    pub fn insert(&mut self, key: Expr, interval: Interval) {
        self.intervals.insert(key, interval);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Expr, &Interval)> {
        self.intervals.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Expr> {
        self.intervals.keys()
    }

    /// True if any interval is infinite on at least one side
    pub fn is_infinite(&self) -> bool {
        self.intervals.values().any(|i| i.is_infinite())
    }

    /// True if any interval is empty; such a box must not be sampled
    pub fn has_bottom(&self) -> bool {
        self.intervals.values().any(|i| i.is_bottom())
    }

    /// Total number of points in the box
    pub fn size(&self) -> Result<u64, OverflowInSize> {
        let mut size: u64 = 1;
        for interval in self.intervals.values() {
            size = size
                .checked_mul(interval.width()?)
                .ok_or(OverflowInSize)?;
        }
        Ok(size)
    }
}

impl fmt::Display for IntervalMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<String> = self
            .intervals
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect();
        entries.sort();
        write!(f, "{}", entries.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_default_is_top() {
        let i = Interval::default();
        assert!(i.is_top());
        assert!(i.is_infinite());
        assert!(!i.is_bottom());
    }

    #[test]
    fn test_tightening_is_monotone() {
        let mut i = Interval::top();
        i.set_lower_bound(0);
        i.set_upper_bound(10);
        // widening attempts are no-ops
        i.set_lower_bound(-5);
        i.set_upper_bound(20);
        assert_eq!((i.low(), i.high()), (0, 10));
        i.set_lower_bound(3);
        assert_eq!(i.low(), 3);
    }

    #[test]
    fn test_bottom_after_crossing_bounds() {
        let mut i = Interval::top();
        i.set_lower_bound(5);
        i.set_upper_bound(2);
        assert!(i.is_bottom());
        assert_eq!(i.width(), Ok(0));
    }

    #[test]
    fn test_one_sided_is_infinite_not_top() {
        let mut i = Interval::top();
        i.set_lower_bound(3);
        assert!(i.is_infinite());
        assert!(!i.is_top());
        assert!(i.is_high_inf());
    }

    #[test]
    fn test_membership() {
        let i = Interval::new(-2, 7);
        assert!(i.is_in_range(-2));
        assert!(i.is_in_range(7));
        assert!(!i.is_in_range(8));
    }

    #[test]
    fn test_random_in_range_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let i = Interval::new(-3, 3);
        for _ in 0..200 {
            assert!(i.is_in_range(i.random_in_range(&mut rng)));
        }
    }

    #[test]
    fn test_random_in_range_extreme_endpoints() {
        // i64-extreme endpoints are treated as infinity; the draw must not
        // overflow and must stay inside the interval.
        let mut rng = StdRng::seed_from_u64(11);
        let top = Interval::top();
        let low_inf = Interval::new(i64::MIN, 10);
        let high_inf = Interval::new(-10, i64::MAX);
        for _ in 0..100 {
            assert!(top.is_in_range(top.random_in_range(&mut rng)));
            assert!(low_inf.is_in_range(low_inf.random_in_range(&mut rng)));
            assert!(high_inf.is_in_range(high_inf.random_in_range(&mut rng)));
        }
    }

    #[test]
    fn test_map_size_and_infinity() {
        let mut map = IntervalMap::new();
        map.insert(Expr::int_var("x"), Interval::new(0, 9));
        map.insert(Expr::int_var("y"), Interval::new(1, 2));
        assert_eq!(map.size(), Ok(20));
        assert!(!map.is_infinite());

        map.entry(Expr::int_var("z")).set_lower_bound(0);
        assert!(map.is_infinite());
        assert_eq!(map.size(), Err(OverflowInSize));
    }

    #[test]
    fn test_map_size_overflow() {
        let mut map = IntervalMap::new();
        map.insert(Expr::int_var("x"), Interval::new(0, i64::MAX - 1));
        map.insert(Expr::int_var("y"), Interval::new(0, i64::MAX - 1));
        assert_eq!(map.size(), Err(OverflowInSize));
    }

    #[test]
    fn test_entry_meet_semantics() {
        let mut map = IntervalMap::new();
        let x = Expr::int_var("x");
        map.entry(x.clone()).set_lower_bound(0);
        map.entry(x.clone()).set_upper_bound(10);
        map.entry(x.clone()).set_lower_bound(2);
        let i = map.get(&x).unwrap();
        assert_eq!((i.low(), i.high()), (2, 10));
    }
}
