use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Numeric type usable as an arc capacity.
///
/// Flow is accumulated in the wider `Flow` type, so the total flow (bounded by the sum of all
/// source capacities) can't overflow once the graph passed validation.
pub trait Capacity:
    Copy
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + AddAssign
    + SubAssign
    + Neg<Output = Self>
    + Debug
    + Display
    + Send
    + Sync
    + 'static
{
    /// Accumulator of the total flow.
    type Flow: Copy + PartialOrd + Add<Output = Self::Flow> + AddAssign + Debug + Display + Send;

    const ZERO: Self;
    const FLOW_ZERO: Self::Flow;

    /// Finite and non-negative.
    fn is_valid(self) -> bool;

    fn checked_add(self, rhs: Self) -> Option<Self>;

    fn widen(self) -> Self::Flow;

    fn checked_add_flow(lhs: Self::Flow, rhs: Self::Flow) -> Option<Self::Flow>;
}

macro_rules! impl_capacity_int {
    ($t:ty, $flow:ty) => {
        impl Capacity for $t {
            type Flow = $flow;
            const ZERO: Self = 0;
            const FLOW_ZERO: Self::Flow = 0;

            #[inline(always)]
            fn is_valid(self) -> bool {
                self >= 0
            }

            #[inline(always)]
            fn checked_add(self, rhs: Self) -> Option<Self> {
                <$t>::checked_add(self, rhs)
            }

            #[inline(always)]
            fn widen(self) -> Self::Flow {
                self as $flow
            }

            #[inline(always)]
            fn checked_add_flow(lhs: Self::Flow, rhs: Self::Flow) -> Option<Self::Flow> {
                lhs.checked_add(rhs)
            }
        }
    };
}

macro_rules! impl_capacity_float {
    ($t:ty, $flow:ty) => {
        impl Capacity for $t {
            type Flow = $flow;
            const ZERO: Self = 0.0;
            const FLOW_ZERO: Self::Flow = 0.0;

            #[inline(always)]
            fn is_valid(self) -> bool {
                self.is_finite() && self >= 0.0
            }

            #[inline(always)]
            fn checked_add(self, rhs: Self) -> Option<Self> {
                let sum = self + rhs;
                sum.is_finite().then_some(sum)
            }

            #[inline(always)]
            fn widen(self) -> Self::Flow {
                self as $flow
            }

            #[inline(always)]
            fn checked_add_flow(lhs: Self::Flow, rhs: Self::Flow) -> Option<Self::Flow> {
                let sum = lhs + rhs;
                sum.is_finite().then_some(sum)
            }
        }
    };
}

impl_capacity_int!(i32, i64);
impl_capacity_int!(i64, i128);
impl_capacity_float!(f32, f64);
impl_capacity_float!(f64, f64);

#[cfg(test)]
mod tests {
    use super::Capacity;

    #[test]
    fn capacity_validity_test() {
        assert!(Capacity::is_valid(0i32));
        assert!(!Capacity::is_valid(-1i64));
        assert!(Capacity::is_valid(1.5f32));
        assert!(!Capacity::is_valid(f32::INFINITY));
        assert!(!Capacity::is_valid(f64::NAN));
        assert!(!Capacity::is_valid(-0.5f64));
    }

    #[test]
    fn capacity_overflow_test() {
        assert_eq!(Capacity::checked_add(i32::MAX, 1), None);
        assert_eq!(Capacity::checked_add(f32::MAX, f32::MAX), None);
        assert_eq!(i32::MAX.widen() + 1, i32::MAX as i64 + 1);
        assert_eq!(<i64 as Capacity>::checked_add_flow(i128::MAX, 1), None);
        assert_eq!(<f32 as Capacity>::checked_add_flow(1.0, 2.0), Some(3.0));
    }
}
