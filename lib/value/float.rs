//! Floating point values with a single knowledge flag.
//!
//! Floats are not tracked per bit. Any operation with an unknown operand
//! produces an unknown result.

use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Trilean;
use crate::value::{Integer32, Integer64};

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PartialFloat<T> {
    value: T,
    known: bool,
}

pub type Float32 = PartialFloat<f32>;
pub type Float64 = PartialFloat<f64>;

impl<T: Float> PartialFloat<T> {
    pub fn known(value: T) -> PartialFloat<T> {
        PartialFloat { value, known: true }
    }

    pub fn unknown() -> PartialFloat<T> {
        PartialFloat {
            value: T::zero(),
            known: false,
        }
    }

    pub fn is_known(&self) -> bool {
        self.known
    }

    /// The raw value. Zero when unknown.
    pub fn value(&self) -> T {
        self.value
    }

    pub fn known_value(&self) -> Option<T> {
        if self.known {
            Some(self.value)
        } else {
            None
        }
    }

    fn binary<F>(&self, other: &PartialFloat<T>, f: F) -> PartialFloat<T>
    where
        F: Fn(T, T) -> T,
    {
        match (self.known_value(), other.known_value()) {
            (Some(lhs), Some(rhs)) => PartialFloat::known(f(lhs, rhs)),
            _ => PartialFloat::unknown(),
        }
    }

    fn predicate<F>(&self, other: &PartialFloat<T>, f: F) -> Trilean
    where
        F: Fn(T, T) -> bool,
    {
        match (self.known_value(), other.known_value()) {
            (Some(lhs), Some(rhs)) => Trilean::from(f(lhs, rhs)),
            _ => Trilean::Unknown,
        }
    }

    pub fn add(&self, other: &PartialFloat<T>) -> PartialFloat<T> {
        self.binary(other, |lhs, rhs| lhs + rhs)
    }

    pub fn sub(&self, other: &PartialFloat<T>) -> PartialFloat<T> {
        self.binary(other, |lhs, rhs| lhs - rhs)
    }

    pub fn mul(&self, other: &PartialFloat<T>) -> PartialFloat<T> {
        self.binary(other, |lhs, rhs| lhs * rhs)
    }

    /// IEEE division. Dividing by zero yields an infinity or NaN.
    pub fn div(&self, other: &PartialFloat<T>) -> PartialFloat<T> {
        self.binary(other, |lhs, rhs| lhs / rhs)
    }

    pub fn rem(&self, other: &PartialFloat<T>) -> PartialFloat<T> {
        self.binary(other, |lhs, rhs| lhs % rhs)
    }

    pub fn neg(&self) -> PartialFloat<T> {
        match self.known_value() {
            Some(value) => PartialFloat::known(-value),
            None => PartialFloat::unknown(),
        }
    }

    /// Ordered equality. NaN is never equal to anything.
    pub fn is_equal_to(&self, other: &PartialFloat<T>) -> Trilean {
        self.predicate(other, |lhs, rhs| lhs == rhs)
    }

    /// Less-than. When `unordered` is set, a NaN operand makes the result
    /// true instead of false.
    pub fn is_less_than(&self, other: &PartialFloat<T>, unordered: bool) -> Trilean {
        self.predicate(other, |lhs, rhs| {
            lhs < rhs || (unordered && (lhs.is_nan() || rhs.is_nan()))
        })
    }

    pub fn is_greater_than(&self, other: &PartialFloat<T>, unordered: bool) -> Trilean {
        other.is_less_than(self, unordered)
    }

    pub fn is_unordered_with(&self, other: &PartialFloat<T>) -> Trilean {
        self.predicate(other, |lhs, rhs| lhs.is_nan() || rhs.is_nan())
    }

    pub fn is_zero(&self) -> Trilean {
        match self.known_value() {
            Some(value) => Trilean::from(value == T::zero()),
            None => Trilean::Unknown,
        }
    }

    pub fn is_positive(&self) -> Trilean {
        match self.known_value() {
            Some(value) => Trilean::from(value.is_sign_positive()),
            None => Trilean::Unknown,
        }
    }

    pub fn is_negative(&self) -> Trilean {
        self.is_positive().not()
    }

    pub fn is_finite(&self) -> Trilean {
        match self.known_value() {
            Some(value) => Trilean::from(value.is_finite()),
            None => Trilean::Unknown,
        }
    }
}

impl Float32 {
    /// Reinterpret the bits of an integer. Any unknown bit makes the float
    /// unknown.
    pub fn from_bits(bits: &Integer32) -> Float32 {
        match bits.known_value() {
            Some(bits) => Float32::known(f32::from_bits(bits)),
            None => Float32::unknown(),
        }
    }

    pub fn to_bits(&self) -> Integer32 {
        match self.known_value() {
            Some(value) => Integer32::known(value.to_bits()),
            None => Integer32::unknown(),
        }
    }

    pub fn widen(&self) -> Float64 {
        match self.known_value() {
            Some(value) => Float64::known(value as f64),
            None => Float64::unknown(),
        }
    }
}

impl Float64 {
    pub fn from_bits(bits: &Integer64) -> Float64 {
        match bits.known_value() {
            Some(bits) => Float64::known(f64::from_bits(bits)),
            None => Float64::unknown(),
        }
    }

    pub fn to_bits(&self) -> Integer64 {
        match self.known_value() {
            Some(value) => Integer64::known(value.to_bits()),
            None => Integer64::unknown(),
        }
    }

    /// Round to single precision.
    pub fn narrow(&self) -> Float32 {
        match self.known_value() {
            Some(value) => Float32::known(value as f32),
            None => Float32::unknown(),
        }
    }
}

impl<T: Float + fmt::Display> fmt::Display for PartialFloat<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.known_value() {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "?"),
        }
    }
}
