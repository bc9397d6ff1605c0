//! Bounded iteration guard
//!
//! Any operation whose cost scales with a user-controlled collection is capped
//! by one shared ceiling: response admission per validation request and the
//! page size of every enumeration query.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

use crate::error::ErrorClass;

/// Default ceiling for responses per request and page size
pub const DEFAULT_CEILING: usize = 100;

/// Guard configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Maximum responses per request and maximum page size
    pub ceiling: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
        }
    }
}

/// Guard errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("Invalid page limit {limit} (must be 1..={ceiling})")]
    InvalidLimit { limit: usize, ceiling: usize },

    #[error("Offset {offset} out of bounds for collection of {total}")]
    OffsetOutOfBounds { offset: usize, total: usize },

    #[error("Capacity of {ceiling} entries reached")]
    CapacityReached { ceiling: usize },
}

impl GuardError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Capacity
    }
}

/// One page of an enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// At most `limit` contiguous items starting at `offset`
    pub items: Vec<T>,
    /// Offset the page starts at
    pub offset: usize,
    /// Size of the whole collection
    pub total_count: usize,
}

impl<T> Page<T> {
    /// Offset of the following page, if any items remain
    pub fn next_offset(&self) -> Option<usize> {
        let next = self.offset + self.items.len();
        (next < self.total_count).then_some(next)
    }

    /// Transform the items while keeping the pagination metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            offset: self.offset,
            total_count: self.total_count,
        }
    }
}

/// Enforces the ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationGuard {
    ceiling: usize,
}

impl Default for IterationGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

impl IterationGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            ceiling: config.ceiling,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Check that one more entry may be added to a collection of `current` entries
    pub fn admit(&self, current: usize) -> Result<(), GuardError> {
        if current >= self.ceiling {
            return Err(GuardError::CapacityReached {
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }

    /// Compute the index range for `(offset, limit)` over `total` entries
    pub fn window(&self, total: usize, offset: usize, limit: usize) -> Result<Range<usize>, GuardError> {
        if limit == 0 || limit > self.ceiling {
            return Err(GuardError::InvalidLimit {
                limit,
                ceiling: self.ceiling,
            });
        }
        if offset >= total {
            return Err(GuardError::OffsetOutOfBounds { offset, total });
        }
        let end = offset + limit.min(total - offset);
        Ok(offset..end)
    }

    /// Return one page of `items`
    pub fn page<'a, T>(&self, items: &'a [T], offset: usize, limit: usize) -> Result<Page<&'a T>, GuardError> {
        let range = self.window(items.len(), offset, limit)?;
        Ok(Page {
            items: items[range].iter().collect(),
            offset,
            total_count: items.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn guard(ceiling: usize) -> IterationGuard {
        IterationGuard::new(GuardConfig { ceiling })
    }

    #[test]
    fn test_rejects_zero_and_oversized_limits() {
        let g = guard(10);
        let items: Vec<u32> = (0..20).collect();
        assert_eq!(
            g.page(&items, 0, 0).unwrap_err(),
            GuardError::InvalidLimit { limit: 0, ceiling: 10 }
        );
        assert_eq!(
            g.page(&items, 0, 11).unwrap_err(),
            GuardError::InvalidLimit { limit: 11, ceiling: 10 }
        );
    }

    #[test]
    fn test_offset_past_end_fails_even_for_empty_collection() {
        let g = guard(10);
        let empty: Vec<u32> = Vec::new();
        assert_eq!(
            g.page(&empty, 0, 5).unwrap_err(),
            GuardError::OffsetOutOfBounds { offset: 0, total: 0 }
        );
    }

    #[test]
    fn test_paginates_to_completion() {
        let g = guard(4);
        let items: Vec<u32> = (0..10).collect();
        let mut offset = Some(0);
        let mut seen = Vec::new();
        while let Some(o) = offset {
            let page = g.page(&items, o, 4).unwrap();
            assert_eq!(page.total_count, 10);
            seen.extend(page.items.iter().copied().copied());
            offset = page.next_offset();
        }
        assert_eq!(seen, items);
    }

    #[test]
    fn test_admit_stops_at_ceiling() {
        let g = guard(100);
        assert!(g.admit(99).is_ok());
        assert_eq!(g.admit(100).unwrap_err(), GuardError::CapacityReached { ceiling: 100 });
    }

    proptest! {
        #[test]
        fn prop_page_is_contiguous_slice(n in 0usize..300, offset in 0usize..320, limit in 1usize..=100) {
            let g = guard(100);
            let items: Vec<usize> = (0..n).collect();
            match g.page(&items, offset, limit) {
                Ok(page) => {
                    prop_assert!(offset < n);
                    prop_assert_eq!(page.items.len(), limit.min(n - offset));
                    prop_assert_eq!(page.total_count, n);
                    for (i, item) in page.items.iter().enumerate() {
                        prop_assert_eq!(**item, offset + i);
                    }
                }
                Err(e) => {
                    prop_assert!(offset >= n);
                    prop_assert_eq!(e, GuardError::OffsetOutOfBounds { offset, total: n });
                }
            }
        }
    }
}
