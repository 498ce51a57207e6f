//! Rate inference from counter wraparound.
//!
//! If a value repeatedly goes from 23 back to 0, the counter's modulus (its
//! rate, when it counts frames within a second) is 24.

use std::collections::HashSet;
use std::hash::Hash;

use crate::agreement::AgreementEstimator;

/// Unsigned counter that increases and wraps to zero.
pub trait Counter: Copy + Eq + Hash + Default {
    fn is_zero(self) -> bool;

    /// `self + 1`, wrapping at the type's width
    fn successor(self) -> Self;
}

macro_rules! impl_counter {
    ($($ty:ty),*) => {
        $(
            impl Counter for $ty {
                #[inline]
                fn is_zero(self) -> bool {
                    self == 0
                }

                #[inline]
                fn successor(self) -> Self {
                    self.wrapping_add(1)
                }
            }
        )*
    };
}

impl_counter!(u8, u16, u32, u64);

/// Infers the modulus of a wrapping counter.
///
/// Every nonzero-to-zero transition proposes `previous + 1` to an embedded
/// [`AgreementEstimator`].
#[derive(Debug, Clone)]
pub struct OverflowRateInferrer<T> {
    /// Value given to the previous `update`
    last_value: T,
    /// Whether the previous `update` wrapped
    overflowed: bool,
    /// Modulus estimator
    rate: AgreementEstimator<T>,
}

impl<T: Counter> OverflowRateInferrer<T> {
    pub fn new(min_agreement: u32, default_rate: T) -> Self {
        Self {
            last_value: T::default(),
            overflowed: false,
            rate: AgreementEstimator::new(min_agreement, default_rate),
        }
    }

    /// Feed the next counter value.
    pub fn update(&mut self, value: T) {
        self.overflowed = false;

        // Repeated zeroes (including the initial state) are not overflows.
        if value.is_zero() && !self.last_value.is_zero() {
            self.rate.update(self.last_value.successor());
            self.overflowed = true;
        }

        self.last_value = value;
    }

    /// True only if the most recent `update` wrapped to zero
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn estimate(&self) -> T {
        self.rate.estimate()
    }

    pub fn is_confirmed(&self) -> bool {
        self.rate.is_confirmed()
    }

    pub fn set_allowed_values(&mut self, values: HashSet<T>) {
        self.rate.set_allowed_values(values);
    }

    pub fn allowed_values(&self) -> &HashSet<T> {
        self.rate.allowed_values()
    }

    pub fn reset(&mut self) {
        self.last_value = T::default();
        self.overflowed = false;
        self.rate.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_cycles(inferrer: &mut OverflowRateInferrer<u8>, rate: u8, cycles: usize) {
        for _ in 0..cycles {
            for frame in 0..rate {
                inferrer.update(frame);
            }
        }
    }

    #[test]
    fn test_nonzero_to_zero_is_overflow() {
        let mut inferrer = OverflowRateInferrer::new(1, 24u8);
        inferrer.update(5);
        assert!(!inferrer.overflowed());
        inferrer.update(0);
        assert!(inferrer.overflowed());

        inferrer.update(5);
        inferrer.update(0);
        assert!(inferrer.is_confirmed());
        assert_eq!(inferrer.estimate(), 6, "previous value + 1 is proposed");
    }

    #[test]
    fn test_repeated_zeroes_are_not_overflows() {
        let mut inferrer = OverflowRateInferrer::new(1, 24u8);
        inferrer.update(0);
        assert!(!inferrer.overflowed(), "initial zero is not an overflow");
        inferrer.update(0);
        assert!(!inferrer.overflowed());
    }

    #[test]
    fn test_overflow_flag_not_sticky() {
        let mut inferrer = OverflowRateInferrer::new(1, 24u8);
        inferrer.update(9);
        inferrer.update(0);
        assert!(inferrer.overflowed());
        inferrer.update(1);
        assert!(!inferrer.overflowed());
    }

    #[test]
    fn test_infers_rate_after_agreement() {
        let mut inferrer = OverflowRateInferrer::new(2, 30u8);
        feed_cycles(&mut inferrer, 25, 3);
        assert!(!inferrer.is_confirmed(), "only two overflows seen so far");
        inferrer.update(0);
        assert!(inferrer.is_confirmed());
        assert_eq!(inferrer.estimate(), 25);
    }

    #[test]
    fn test_allow_list_blocks_odd_rate() {
        let mut inferrer = OverflowRateInferrer::new(1, 24u8);
        inferrer.set_allowed_values(HashSet::from([24, 25, 30]));
        feed_cycles(&mut inferrer, 26, 4);
        assert!(!inferrer.is_confirmed());
        assert_eq!(inferrer.estimate(), 24);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut inferrer = OverflowRateInferrer::new(1, 24u8);
        inferrer.set_allowed_values(HashSet::from([50]));
        feed_cycles(&mut inferrer, 50, 3);
        assert!(inferrer.is_confirmed());

        inferrer.update(7);
        inferrer.reset();
        assert!(!inferrer.overflowed());
        assert!(!inferrer.is_confirmed());
        assert_eq!(inferrer.estimate(), 24);
        assert!(inferrer.allowed_values().contains(&50));

        inferrer.update(0);
        assert!(!inferrer.overflowed(), "reset forgets the previous value");
    }

    #[test]
    fn test_wider_counter() {
        let mut inferrer = OverflowRateInferrer::new(1, 0u16);
        for _ in 0..3 {
            for value in 0..1000u16 {
                inferrer.update(value);
            }
        }
        assert_eq!(inferrer.estimate(), 1000);
    }
}
