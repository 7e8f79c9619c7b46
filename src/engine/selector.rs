// SPDX-License-Identifier: MIT

//! Weighted response selection
//!
//! One uniform draw in `[0, 100)` per fired trigger. Numeric weights claim
//! consecutive slices of that range in ascending key order; `default` takes
//! whatever is left.

use crate::engine::types::ResponseKey;
use rand::Rng;
use std::collections::HashSet;

/// Exclusive upper bound of a draw
pub const DRAW_RANGE: u8 = 100;

/// Source of the uniform draw used to pick a response
pub trait DrawSource {
    /// Returns a value in `0..DRAW_RANGE`
    fn draw(&mut self) -> u8;
}

/// Thread-local RNG draws
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDraw;

impl DrawSource for RandomDraw {
    fn draw(&mut self) -> u8 {
        rand::thread_rng().gen_range(0..DRAW_RANGE)
    }
}

/// Always returns the same value (dry runs and tests)
#[derive(Debug, Clone, Copy)]
pub struct FixedDraw(pub u8);

impl DrawSource for FixedDraw {
    fn draw(&mut self) -> u8 {
        self.0 % DRAW_RANGE
    }
}

/// Validated weight table
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTable<T> {
    /// Sorted by weight, ascending
    weighted: Vec<(u8, T)>,
    default: Option<T>,
}

impl<T> ResponseTable<T> {
    /// Validate raw keys and build the table. Rejects negative weights,
    /// weights above 100, unknown text keys, duplicates and totals above 100.
    pub fn build<I>(entries: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (ResponseKey, T)>,
    {
        let mut weighted = Vec::new();
        let mut default = None;
        let mut seen = HashSet::new();
        let mut total: u32 = 0;

        for (key, value) in entries {
            if !seen.insert(key.clone()) {
                return Err(format!("duplicate response key {}", key));
            }
            match key {
                ResponseKey::Name(name) if name == "default" => default = Some(value),
                ResponseKey::Name(_) => {
                    return Err(format!(
                        "response key {} is neither an integer weight nor \"default\"",
                        key
                    ))
                }
                ResponseKey::Invalid(_) => {
                    return Err(format!(
                        "response key {} is neither an integer weight nor \"default\"",
                        key
                    ))
                }
                ResponseKey::Weight(w) if w < 0 => {
                    return Err(format!("negative response weight {}", w))
                }
                ResponseKey::Weight(w) if w > i64::from(DRAW_RANGE) => {
                    return Err(format!("response weight {} is more than 100", w))
                }
                ResponseKey::Weight(w) => {
                    let w = w as u8;
                    total += u32::from(w);
                    weighted.push((w, value));
                }
            }
        }

        if total > u32::from(DRAW_RANGE) {
            return Err(format!("response weights sum to {}, more than 100", total));
        }

        weighted.sort_by_key(|(w, _)| *w);
        Ok(Self { weighted, default })
    }

    /// Pick the response for a draw. Weighted entries are tried first in
    /// ascending order; `default` only when none of them covers the draw.
    pub fn select(&self, draw: u8) -> Option<&T> {
        let draw = u32::from(draw);
        let mut running: u32 = 0;
        for (weight, value) in &self.weighted {
            let weight = u32::from(*weight);
            if running <= draw && draw < running + weight {
                return Some(value);
            }
            running += weight;
        }
        self.default.as_ref()
    }

    /// Sum of the numeric weights
    pub fn total_weight(&self) -> u32 {
        self.weighted.iter().map(|(w, _)| u32::from(*w)).sum()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(ResponseKey, &'static str)]) -> ResponseTable<&'static str> {
        ResponseTable::build(entries.iter().cloned()).unwrap()
    }

    fn w(n: i64) -> ResponseKey {
        ResponseKey::Weight(n)
    }

    fn default() -> ResponseKey {
        ResponseKey::Name("default".into())
    }

    #[test]
    fn test_default_only_always_selected() {
        let t = table(&[(default(), "X")]);
        for draw in 0..DRAW_RANGE {
            assert_eq!(t.select(draw), Some(&"X"));
        }
    }

    #[test]
    fn test_single_weight_without_default() {
        let t = table(&[(w(10), "A")]);
        for draw in 0..10 {
            assert_eq!(t.select(draw), Some(&"A"));
        }
        for draw in 10..DRAW_RANGE {
            assert_eq!(t.select(draw), None);
        }
    }

    #[test]
    fn test_every_draw_hits_exactly_its_slice() {
        let t = table(&[(w(50), "big"), (w(20), "mid"), (w(5), "small"), (default(), "rest")]);
        let mut counts = std::collections::HashMap::new();
        for draw in 0..DRAW_RANGE {
            *counts.entry(*t.select(draw).unwrap()).or_insert(0) += 1;
        }
        assert_eq!(counts["small"], 5);
        assert_eq!(counts["mid"], 20);
        assert_eq!(counts["big"], 50);
        assert_eq!(counts["rest"], 25);
    }

    #[test]
    fn test_ascending_order_decides_adjacent_slices() {
        // file order is irrelevant: 5 owns 0..5, 20 owns 5..25
        let t = table(&[(w(20), "twenty"), (w(5), "five")]);
        assert_eq!(t.select(0), Some(&"five"));
        assert_eq!(t.select(4), Some(&"five"));
        assert_eq!(t.select(5), Some(&"twenty"));
        assert_eq!(t.select(24), Some(&"twenty"));
        assert_eq!(t.select(25), None);
    }

    #[test]
    fn test_full_weight_never_reaches_default() {
        let t = table(&[(w(100), "always"), (default(), "never")]);
        for draw in 0..DRAW_RANGE {
            assert_eq!(t.select(draw), Some(&"always"));
        }
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let t = table(&[(w(0), "ghost"), (default(), "d")]);
        assert_eq!(t.select(0), Some(&"d"));
        assert_eq!(t.total_weight(), 0);
    }

    #[test]
    fn test_rejects_total_over_100() {
        let err = ResponseTable::build(vec![(w(60), "a"), (w(50), "b")]).unwrap_err();
        assert!(err.contains("sum to 110"));
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(ResponseTable::build(vec![(w(-1), "a")])
            .unwrap_err()
            .contains("negative"));
        assert!(ResponseTable::build(vec![(w(101), "a")]).is_err());
        assert!(
            ResponseTable::build(vec![(ResponseKey::Name("often".into()), "a")])
                .unwrap_err()
                .contains("neither")
        );
        assert!(ResponseTable::build(vec![(w(5), "a"), (w(5), "b")])
            .unwrap_err()
            .contains("duplicate"));
    }

    #[test]
    fn test_rejects_non_integer_scalar_keys() {
        let err = ResponseTable::build(vec![(ResponseKey::Invalid("10.5".into()), "a")])
            .unwrap_err();
        assert!(err.contains("10.5"));
        assert!(err.contains("neither"));
    }

    #[test]
    fn test_fixed_draw_wraps_into_range() {
        assert_eq!(FixedDraw(42).draw(), 42);
        assert_eq!(FixedDraw(142).draw(), 42);
    }

    #[test]
    fn test_random_draw_in_range() {
        let mut source = RandomDraw;
        for _ in 0..1000 {
            assert!(source.draw() < DRAW_RANGE);
        }
    }
}
