//! Useful types used across multiple modules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops;

/// A three-valued boolean.
///
/// `Trilean` is the result of any question asked about a value whose bits
/// may only be partially known. Logical operators follow Kleene's strong
/// three-valued logic: `False` absorbs AND, `True` absorbs OR, and `Unknown`
/// propagates otherwise.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Trilean {
    False,
    True,
    Unknown,
}

impl Trilean {
    /// Returns true if this value is `True` or `False`.
    pub fn is_known(self) -> bool {
        self != Trilean::Unknown
    }

    pub fn is_true(self) -> bool {
        self == Trilean::True
    }

    pub fn is_false(self) -> bool {
        self == Trilean::False
    }

    pub fn is_unknown(self) -> bool {
        self == Trilean::Unknown
    }

    /// Get the boolean value of this `Trilean`, if it is known.
    pub fn to_bool(self) -> Option<bool> {
        match self {
            Trilean::True => Some(true),
            Trilean::False => Some(false),
            Trilean::Unknown => None,
        }
    }

    /// Get the boolean value of this `Trilean`, treating `Unknown` as `false`.
    pub fn to_bool_or_false(self) -> bool {
        self == Trilean::True
    }

    pub fn and(self, other: Trilean) -> Trilean {
        match (self, other) {
            (Trilean::False, _) | (_, Trilean::False) => Trilean::False,
            (Trilean::True, Trilean::True) => Trilean::True,
            _ => Trilean::Unknown,
        }
    }

    pub fn or(self, other: Trilean) -> Trilean {
        match (self, other) {
            (Trilean::True, _) | (_, Trilean::True) => Trilean::True,
            (Trilean::False, Trilean::False) => Trilean::False,
            _ => Trilean::Unknown,
        }
    }

    pub fn xor(self, other: Trilean) -> Trilean {
        match (self.to_bool(), other.to_bool()) {
            (Some(lhs), Some(rhs)) => Trilean::from(lhs ^ rhs),
            _ => Trilean::Unknown,
        }
    }

    pub fn not(self) -> Trilean {
        match self {
            Trilean::True => Trilean::False,
            Trilean::False => Trilean::True,
            Trilean::Unknown => Trilean::Unknown,
        }
    }

    /// Material implication, `!self | other`.
    pub fn implies(self, other: Trilean) -> Trilean {
        self.not().or(other)
    }
}

impl Default for Trilean {
    fn default() -> Trilean {
        Trilean::Unknown
    }
}

impl From<bool> for Trilean {
    fn from(b: bool) -> Trilean {
        if b {
            Trilean::True
        } else {
            Trilean::False
        }
    }
}

impl From<Option<bool>> for Trilean {
    fn from(b: Option<bool>) -> Trilean {
        match b {
            Some(b) => Trilean::from(b),
            None => Trilean::Unknown,
        }
    }
}

impl ops::Not for Trilean {
    type Output = Trilean;
    fn not(self) -> Trilean {
        Trilean::not(self)
    }
}

impl ops::BitAnd for Trilean {
    type Output = Trilean;
    fn bitand(self, rhs: Trilean) -> Trilean {
        self.and(rhs)
    }
}

impl ops::BitOr for Trilean {
    type Output = Trilean;
    fn bitor(self, rhs: Trilean) -> Trilean {
        self.or(rhs)
    }
}

impl ops::BitXor for Trilean {
    type Output = Trilean;
    fn bitxor(self, rhs: Trilean) -> Trilean {
        self.xor(rhs)
    }
}

impl fmt::Display for Trilean {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Trilean::True => write!(f, "true"),
            Trilean::False => write!(f, "false"),
            Trilean::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Trilean; 3] = [Trilean::False, Trilean::True, Trilean::Unknown];

    #[test]
    fn and_truth_table() {
        assert_eq!(Trilean::True & Trilean::True, Trilean::True);
        assert_eq!(Trilean::True & Trilean::Unknown, Trilean::Unknown);
        assert_eq!(Trilean::Unknown & Trilean::Unknown, Trilean::Unknown);
        for value in ALL {
            assert_eq!(Trilean::False & value, Trilean::False);
            assert_eq!(value & Trilean::False, Trilean::False);
        }
    }

    #[test]
    fn or_truth_table() {
        assert_eq!(Trilean::False | Trilean::False, Trilean::False);
        assert_eq!(Trilean::False | Trilean::Unknown, Trilean::Unknown);
        for value in ALL {
            assert_eq!(Trilean::True | value, Trilean::True);
            assert_eq!(value | Trilean::True, Trilean::True);
        }
    }

    #[test]
    fn xor_and_not() {
        assert_eq!(Trilean::True ^ Trilean::False, Trilean::True);
        assert_eq!(Trilean::True ^ Trilean::True, Trilean::False);
        assert_eq!(Trilean::True ^ Trilean::Unknown, Trilean::Unknown);
        assert_eq!(!Trilean::True, Trilean::False);
        assert_eq!(!Trilean::Unknown, Trilean::Unknown);
    }

    #[test]
    fn de_morgan_holds() {
        for a in ALL {
            for b in ALL {
                assert_eq!(!(a & b), !a | !b);
                assert_eq!(!(a | b), !a & !b);
            }
        }
    }

    #[test]
    fn conversions() {
        assert_eq!(Trilean::from(true), Trilean::True);
        assert_eq!(Trilean::from(None), Trilean::Unknown);
        assert_eq!(Trilean::Unknown.to_bool(), None);
        assert!(!Trilean::Unknown.to_bool_or_false());
        assert!(Trilean::False.is_known());
        assert_eq!(Trilean::False.implies(Trilean::Unknown), Trilean::True);
    }
}
