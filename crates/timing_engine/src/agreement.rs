//! Estimation by consecutive agreement.
//!
//! A candidate value is only accepted once it has been observed repeatedly in a
//! row, which makes the filter single-pass and immune to isolated glitches.

use std::collections::HashSet;
use std::hash::Hash;

/// Consensus filter over a stream of discrete values.
///
/// `update(v)` compares `v` with the previously observed value. Each repeat
/// bumps the agreement counter; once it reaches `min_agreement` the value is
/// promoted to the estimate, unless an allow-list is set and rejects it.
#[derive(Debug, Clone)]
pub struct AgreementEstimator<T> {
    /// Required number of consecutive agreements before an estimate changes
    min_agreement: u32,
    /// Estimate reported before any agreement
    default_value: T,
    /// Value given to the previous `update`
    last_value: T,
    /// Current estimate
    estimate: T,
    /// Consecutive agreements, clamped at `min_agreement`
    agreements: u32,
    /// Whether an agreement has been reached since construction or reset
    confirmed: bool,
    /// Confirmable values; empty means unrestricted. Survives `reset`.
    allowed: HashSet<T>,
}

impl<T> AgreementEstimator<T>
where
    T: Copy + Eq + Hash + Default,
{
    pub fn new(min_agreement: u32, default_value: T) -> Self {
        Self {
            min_agreement,
            default_value,
            last_value: T::default(),
            estimate: default_value,
            agreements: 0,
            confirmed: false,
            allowed: HashSet::new(),
        }
    }

    /// Feed a new candidate value.
    pub fn update(&mut self, value: T) {
        if value == self.last_value {
            self.agreements = self.agreements.saturating_add(1);
            if self.agreements >= self.min_agreement {
                self.agreements = self.min_agreement;

                if self.accepts(&value) {
                    self.estimate = value;
                    self.confirmed = true;
                }
            }
        } else {
            self.agreements = 0;
        }

        self.last_value = value;
    }

    /// Last confirmed estimate, or the default if none yet
    pub fn estimate(&self) -> T {
        self.estimate
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn consecutive_agreements(&self) -> u32 {
        self.agreements
    }

    pub fn min_agreement(&self) -> u32 {
        self.min_agreement
    }

    /// Replace the allow-list. Does not re-evaluate the current estimate.
    pub fn set_allowed_values(&mut self, values: HashSet<T>) {
        self.allowed = values;
    }

    pub fn allowed_values(&self) -> &HashSet<T> {
        &self.allowed
    }

    /// Whether `value` may become the estimate
    pub fn accepts(&self, value: &T) -> bool {
        self.allowed.is_empty() || self.allowed.contains(value)
    }

    /// Start over from scratch, keeping the allow-list.
    pub fn reset(&mut self) {
        self.last_value = T::default();
        self.estimate = self.default_value;
        self.agreements = 0;
        self.confirmed = false;
    }
}
