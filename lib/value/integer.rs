//! Fixed-width integers with per-bit knowledge.
//!
//! A `PartialInteger` pairs a raw bit pattern with a mask of the same width.
//! Bit `i` of the mask is set when bit `i` of the value is authoritative.
//! Unknown bits of the raw value are always stored as zero.

use num_traits::{
    CheckedAdd, CheckedDiv, CheckedMul, CheckedRem, CheckedSub, PrimInt, Signed, Unsigned, WrappingAdd, WrappingMul,
    WrappingNeg, WrappingSub,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

use crate::types::Trilean;
use crate::Error;

/// An unsigned machine word which can back a `PartialInteger`.
pub trait Word:
    PrimInt + Unsigned + WrappingAdd + WrappingSub + WrappingMul + WrappingNeg + fmt::Debug + fmt::UpperHex + Hash
{
    /// The signed view of this word.
    type Signed: PrimInt + Signed + CheckedRem + WrappingNeg + fmt::Display;

    const BITS: u32;

    fn to_signed(self) -> Self::Signed;
    fn from_signed(value: Self::Signed) -> Self;
    fn widen(self) -> u64;
    fn truncate(value: u64) -> Self;
}

macro_rules! impl_word {
    ($unsigned:ty, $signed:ty) => {
        impl Word for $unsigned {
            type Signed = $signed;

            const BITS: u32 = <$unsigned>::BITS;

            fn to_signed(self) -> $signed {
                self as $signed
            }

            fn from_signed(value: $signed) -> $unsigned {
                value as $unsigned
            }

            fn widen(self) -> u64 {
                self as u64
            }

            fn truncate(value: u64) -> $unsigned {
                value as $unsigned
            }
        }
    };
}

impl_word!(u8, i8);
impl_word!(u16, i16);
impl_word!(u32, i32);
impl_word!(u64, i64);

/// An integer whose bits may only be partially known.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct PartialInteger<T> {
    value: T,
    known: T,
}

pub type Integer8 = PartialInteger<u8>;
pub type Integer16 = PartialInteger<u16>;
pub type Integer32 = PartialInteger<u32>;
pub type Integer64 = PartialInteger<u64>;

impl<T: Word> PartialInteger<T> {
    /// Create a new integer from raw bits and a known-mask.
    pub fn new(value: T, known: T) -> PartialInteger<T> {
        PartialInteger {
            value: value & known,
            known,
        }
    }

    /// Create a fully known integer.
    pub fn known(value: T) -> PartialInteger<T> {
        PartialInteger::new(value, T::max_value())
    }

    /// Create a fully known integer from its signed representation.
    pub fn from_signed(value: T::Signed) -> PartialInteger<T> {
        PartialInteger::known(T::from_signed(value))
    }

    /// Create a fully unknown integer.
    pub fn unknown() -> PartialInteger<T> {
        PartialInteger::new(T::zero(), T::zero())
    }

    /// Encode a `Trilean` as 1, 0, or a value where only the lowest bit is
    /// unknown.
    pub fn from_trilean(value: Trilean) -> PartialInteger<T> {
        match value {
            Trilean::True => PartialInteger::known(T::one()),
            Trilean::False => PartialInteger::known(T::zero()),
            Trilean::Unknown => PartialInteger::new(T::zero(), !T::one()),
        }
    }

    /// Parse a bit string, most significant bit first.
    ///
    /// Every character is one of `0`, `1` or `?`, and the string must name
    /// exactly as many bits as this integer is wide. Underscores are ignored.
    pub fn parse_bits(bits: &str) -> Result<PartialInteger<T>, Error> {
        let mut value = T::zero();
        let mut known = T::zero();
        let mut count = 0;

        for c in bits.chars().filter(|&c| c != '_') {
            value = value << 1;
            known = known << 1;
            match c {
                '0' => known = known | T::one(),
                '1' => {
                    value = value | T::one();
                    known = known | T::one();
                }
                '?' => {}
                _ => return Err(Error::InvalidBitString(bits.to_string())),
            }
            count += 1;
        }

        if count != T::BITS {
            return Err(Error::InvalidBitString(bits.to_string()));
        }

        Ok(PartialInteger::new(value, known))
    }

    /// The width of this integer in bits.
    pub fn bits(&self) -> u32 {
        T::BITS
    }

    /// The raw bits of this integer, with unknown bits set to zero.
    pub fn value(&self) -> T {
        self.value
    }

    /// The raw bits of this integer interpreted as a signed value.
    pub fn signed(&self) -> T::Signed {
        self.value.to_signed()
    }

    /// The mask of known bits.
    pub fn known_mask(&self) -> T {
        self.known
    }

    /// Returns true if every bit of this integer is known.
    pub fn is_known(&self) -> bool {
        self.known == T::max_value()
    }

    /// Returns true if no bit of this integer is known.
    pub fn is_fully_unknown(&self) -> bool {
        self.known == T::zero()
    }

    /// The value of this integer, if fully known.
    pub fn known_value(&self) -> Option<T> {
        if self.is_known() {
            Some(self.value)
        } else {
            None
        }
    }

    pub fn mark_fully_unknown(&mut self) {
        self.value = T::zero();
        self.known = T::zero();
    }

    /// Get a single bit of this integer.
    pub fn bit(&self, index: u32) -> Result<Trilean, Error> {
        if index >= T::BITS {
            return Err(Error::BitIndexOutOfRange(index));
        }
        Ok(self.bit_unchecked(index))
    }

    /// Set a single bit of this integer.
    pub fn set_bit(&mut self, index: u32, bit: Trilean) -> Result<(), Error> {
        if index >= T::BITS {
            return Err(Error::BitIndexOutOfRange(index));
        }
        let mask = T::one() << index as usize;
        match bit {
            Trilean::True => {
                self.value = self.value | mask;
                self.known = self.known | mask;
            }
            Trilean::False => {
                self.value = self.value & !mask;
                self.known = self.known | mask;
            }
            Trilean::Unknown => {
                self.value = self.value & !mask;
                self.known = self.known & !mask;
            }
        }
        Ok(())
    }

    fn bit_unchecked(&self, index: u32) -> Trilean {
        let mask = T::one() << index as usize;
        if self.known & mask == T::zero() {
            Trilean::Unknown
        } else {
            Trilean::from(self.value & mask != T::zero())
        }
    }

    fn sign_bit(&self) -> Trilean {
        self.bit_unchecked(T::BITS - 1)
    }

    /// Render this integer as a bit string, most significant bit first.
    pub fn to_bit_string(&self) -> String {
        (0..T::BITS)
            .rev()
            .map(|index| match self.bit_unchecked(index) {
                Trilean::True => '1',
                Trilean::False => '0',
                Trilean::Unknown => '?',
            })
            .collect()
    }

    fn known_pair(&self, other: &PartialInteger<T>) -> Option<(T, T)> {
        if self.is_known() && other.is_known() {
            Some((self.value, other.value))
        } else {
            None
        }
    }

    pub fn not(&self) -> PartialInteger<T> {
        PartialInteger::new(!self.value, self.known)
    }

    /// Bitwise AND. A bit known to be zero in either operand is known in the
    /// result.
    pub fn and(&self, other: &PartialInteger<T>) -> PartialInteger<T> {
        let known = (self.known & other.known)
            | (self.known & !self.value)
            | (other.known & !other.value);
        PartialInteger::new(self.value & other.value, known)
    }

    /// Bitwise OR. A bit known to be one in either operand is known in the
    /// result.
    pub fn or(&self, other: &PartialInteger<T>) -> PartialInteger<T> {
        let known =
            (self.known & other.known) | (self.known & self.value) | (other.known & other.value);
        PartialInteger::new(self.value | other.value, known)
    }

    pub fn xor(&self, other: &PartialInteger<T>) -> PartialInteger<T> {
        PartialInteger::new(self.value ^ other.value, self.known & other.known)
    }

    /// Shift left. The shift amount is taken modulo the width.
    pub fn shl(&self, amount: u32) -> PartialInteger<T> {
        let amount = (amount % T::BITS) as usize;
        let shifted_in = !(T::max_value() << amount);
        PartialInteger::new(self.value << amount, (self.known << amount) | shifted_in)
    }

    /// Shift right, either logically or arithmetically. The shift amount is
    /// taken modulo the width.
    pub fn shr(&self, amount: u32, signed: bool) -> PartialInteger<T> {
        let amount = amount % T::BITS;
        if signed {
            PartialInteger::new(
                self.value.signed_shr(amount),
                self.known.signed_shr(amount),
            )
        } else {
            let shifted_in = !(T::max_value() >> amount as usize);
            PartialInteger::new(
                self.value >> amount as usize,
                (self.known >> amount as usize) | shifted_in,
            )
        }
    }

    pub fn add(&self, other: &PartialInteger<T>) -> PartialInteger<T> {
        match self.known_pair(other) {
            Some((lhs, rhs)) => PartialInteger::known(lhs.wrapping_add(&rhs)),
            None => PartialInteger::unknown(),
        }
    }

    pub fn sub(&self, other: &PartialInteger<T>) -> PartialInteger<T> {
        match self.known_pair(other) {
            Some((lhs, rhs)) => PartialInteger::known(lhs.wrapping_sub(&rhs)),
            None => PartialInteger::unknown(),
        }
    }

    pub fn mul(&self, other: &PartialInteger<T>) -> PartialInteger<T> {
        match self.known_pair(other) {
            Some((lhs, rhs)) => PartialInteger::known(lhs.wrapping_mul(&rhs)),
            None => PartialInteger::unknown(),
        }
    }

    pub fn neg(&self) -> PartialInteger<T> {
        match self.known_value() {
            Some(value) => PartialInteger::known(value.wrapping_neg()),
            None => PartialInteger::unknown(),
        }
    }

    /// Addition which fails when the result does not fit the signed or
    /// unsigned interpretation of this width.
    pub fn checked_add(
        &self,
        other: &PartialInteger<T>,
        signed: bool,
    ) -> Result<PartialInteger<T>, Error> {
        let (lhs, rhs) = match self.known_pair(other) {
            Some(pair) => pair,
            None => return Ok(PartialInteger::unknown()),
        };
        let result = if signed {
            lhs.to_signed().checked_add(&rhs.to_signed()).map(T::from_signed)
        } else {
            lhs.checked_add(&rhs)
        };
        result
            .map(PartialInteger::known)
            .ok_or(Error::ArithmeticOverflow)
    }

    pub fn checked_sub(
        &self,
        other: &PartialInteger<T>,
        signed: bool,
    ) -> Result<PartialInteger<T>, Error> {
        let (lhs, rhs) = match self.known_pair(other) {
            Some(pair) => pair,
            None => return Ok(PartialInteger::unknown()),
        };
        let result = if signed {
            lhs.to_signed().checked_sub(&rhs.to_signed()).map(T::from_signed)
        } else {
            lhs.checked_sub(&rhs)
        };
        result
            .map(PartialInteger::known)
            .ok_or(Error::ArithmeticOverflow)
    }

    pub fn checked_mul(
        &self,
        other: &PartialInteger<T>,
        signed: bool,
    ) -> Result<PartialInteger<T>, Error> {
        let (lhs, rhs) = match self.known_pair(other) {
            Some(pair) => pair,
            None => return Ok(PartialInteger::unknown()),
        };
        let result = if signed {
            lhs.to_signed().checked_mul(&rhs.to_signed()).map(T::from_signed)
        } else {
            lhs.checked_mul(&rhs)
        };
        result
            .map(PartialInteger::known)
            .ok_or(Error::ArithmeticOverflow)
    }

    /// Division. A fully known zero divisor is an error regardless of the
    /// dividend, as is signed division of the minimum value by -1.
    pub fn div(&self, other: &PartialInteger<T>, signed: bool) -> Result<PartialInteger<T>, Error> {
        if other.known_value() == Some(T::zero()) {
            return Err(Error::DivideByZero);
        }
        let (lhs, rhs) = match self.known_pair(other) {
            Some(pair) => pair,
            None => return Ok(PartialInteger::unknown()),
        };
        if signed {
            lhs.to_signed()
                .checked_div(&rhs.to_signed())
                .map(PartialInteger::from_signed)
                .ok_or(Error::ArithmeticOverflow)
        } else {
            Ok(PartialInteger::known(lhs / rhs))
        }
    }

    /// Remainder, with the same zero-divisor policy as `div`.
    pub fn rem(&self, other: &PartialInteger<T>, signed: bool) -> Result<PartialInteger<T>, Error> {
        if other.known_value() == Some(T::zero()) {
            return Err(Error::DivideByZero);
        }
        let (lhs, rhs) = match self.known_pair(other) {
            Some(pair) => pair,
            None => return Ok(PartialInteger::unknown()),
        };
        if signed {
            // x % -1 is zero, even for the minimum value
            if rhs == T::max_value() {
                return Ok(PartialInteger::known(T::zero()));
            }
            lhs.to_signed()
                .checked_rem(&rhs.to_signed())
                .map(PartialInteger::from_signed)
                .ok_or(Error::ArithmeticOverflow)
        } else {
            Ok(PartialInteger::known(lhs % rhs))
        }
    }

    /// Equality is False as soon as a bit known in both operands differs.
    pub fn is_equal_to(&self, other: &PartialInteger<T>) -> Trilean {
        let both = self.known & other.known;
        if (self.value ^ other.value) & both != T::zero() {
            return Trilean::False;
        }
        match self.known_pair(other) {
            Some(_) => Trilean::True,
            None => Trilean::Unknown,
        }
    }

    pub fn is_less_than(&self, other: &PartialInteger<T>, signed: bool) -> Trilean {
        match self.known_pair(other) {
            Some((lhs, rhs)) if signed => Trilean::from(lhs.to_signed() < rhs.to_signed()),
            Some((lhs, rhs)) => Trilean::from(lhs < rhs),
            None => Trilean::Unknown,
        }
    }

    pub fn is_greater_than(&self, other: &PartialInteger<T>, signed: bool) -> Trilean {
        other.is_less_than(self, signed)
    }

    /// False as soon as any known bit is set.
    pub fn is_zero(&self) -> Trilean {
        if self.value != T::zero() {
            Trilean::False
        } else if self.is_known() {
            Trilean::True
        } else {
            Trilean::Unknown
        }
    }

    pub fn is_non_zero(&self) -> Trilean {
        self.is_zero().not()
    }

    /// True when the sign bit is known to be clear. Zero is positive.
    pub fn is_positive(&self) -> Trilean {
        self.sign_bit().not()
    }

    /// True when the sign bit is known to be set.
    pub fn is_negative(&self) -> Trilean {
        self.sign_bit()
    }

    /// Convert to another width. Narrowing truncates. Widening either
    /// zero-extends, making the new bits known, or sign-extends, giving the new
    /// bits the knowledge of the sign bit.
    pub fn resize<U: Word>(&self, sign_extend: bool) -> PartialInteger<U> {
        let mut value = self.value.widen();
        let mut known = self.known.widen();

        if U::BITS > T::BITS {
            let high = u64::MAX << T::BITS;
            match (sign_extend, self.sign_bit()) {
                (true, Trilean::Unknown) => {}
                (true, Trilean::True) => {
                    value |= high;
                    known |= high;
                }
                _ => known |= high,
            }
        }

        PartialInteger::new(U::truncate(value), U::truncate(known))
    }

    /// Little-endian encoding of the raw bits and the known-mask.
    pub fn to_le_bytes(&self) -> (Vec<u8>, Vec<u8>) {
        let size = (T::BITS / 8) as usize;
        let value = self.value.widen();
        let known = self.known.widen();
        (
            (0..size).map(|i| (value >> (i * 8)) as u8).collect(),
            (0..size).map(|i| (known >> (i * 8)) as u8).collect(),
        )
    }

    /// Decode little-endian raw bits and known-mask. Missing bytes are unknown.
    pub fn from_le_bytes(bits: &[u8], mask: &[u8]) -> PartialInteger<T> {
        let size = (T::BITS / 8) as usize;
        let mut value = 0u64;
        let mut known = 0u64;
        for i in 0..size {
            if let (Some(&bits), Some(&mask)) = (bits.get(i), mask.get(i)) {
                value |= (bits as u64) << (i * 8);
                known |= (mask as u64) << (i * 8);
            }
        }
        PartialInteger::new(T::truncate(value), T::truncate(known))
    }
}

impl<T: Word> fmt::Display for PartialInteger<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_known() {
            write!(f, "0x{:X}:{}", self.value, T::BITS)
        } else {
            write!(f, "0b{}:{}", self.to_bit_string(), T::BITS)
        }
    }
}
