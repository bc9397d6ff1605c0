//! Agreement counting over a bounded response set

use serde::{Deserialize, Serialize};
use sigil_core::{ValidationStatus, BPS_DENOMINATOR};

use crate::request::ValidationResponse;

/// Outcome of evaluating a tally against the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Validated,
    Failed,
    /// Neither side reached the threshold
    Inconclusive,
}

impl Verdict {
    /// Terminal status for a decisive verdict
    pub fn status(&self) -> Option<ValidationStatus> {
        match self {
            Self::Validated => Some(ValidationStatus::Validated),
            Self::Failed => Some(ValidationStatus::Failed),
            Self::Inconclusive => None,
        }
    }
}

/// Agree/disagree counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub agree: usize,
    pub disagree: usize,
}

impl Tally {
    pub fn from_responses<'a>(responses: impl IntoIterator<Item = &'a ValidationResponse>) -> Self {
        let mut tally = Self::default();
        for response in responses {
            tally.add(response.agrees);
        }
        tally
    }

    pub fn add(&mut self, agrees: bool) {
        if agrees {
            self.agree += 1;
        } else {
            self.disagree += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.agree + self.disagree
    }

    /// Evaluate with a symmetric threshold in basis points.
    ///
    /// `agree / total >= threshold` validates, `disagree / total >= threshold`
    /// fails, anything in between is inconclusive. Integer arithmetic only.
    pub fn verdict(&self, threshold_bps: u32) -> Verdict {
        let total = self.total() as u128;
        if total == 0 {
            return Verdict::Inconclusive;
        }
        let denominator = BPS_DENOMINATOR as u128;
        let required = threshold_bps as u128 * total;

        if self.agree as u128 * denominator >= required {
            Verdict::Validated
        } else if self.disagree as u128 * denominator >= required {
            Verdict::Failed
        } else {
            Verdict::Inconclusive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(agree: usize, disagree: usize) -> Tally {
        Tally { agree, disagree }
    }

    #[test]
    fn test_two_of_three_meets_default_threshold() {
        assert_eq!(tally(2, 1).verdict(6_600), Verdict::Validated);
        assert_eq!(tally(1, 2).verdict(6_600), Verdict::Failed);
    }

    #[test]
    fn test_even_split_is_inconclusive() {
        assert_eq!(tally(50, 50).verdict(6_600), Verdict::Inconclusive);
        assert_eq!(tally(0, 0).verdict(6_600), Verdict::Inconclusive);
    }

    #[test]
    fn test_unanimous_threshold() {
        assert_eq!(tally(3, 0).verdict(10_000), Verdict::Validated);
        assert_eq!(tally(0, 3).verdict(10_000), Verdict::Failed);
        assert_eq!(tally(2, 1).verdict(10_000), Verdict::Inconclusive);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        // 66/100 = 6600 bps exactly
        assert_eq!(tally(66, 34).verdict(6_600), Verdict::Validated);
        assert_eq!(tally(65, 35).verdict(6_600), Verdict::Inconclusive);
    }
}
