use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Trilean;

/// Where execution continues after an instruction.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Successor {
    /// Continue with the next instruction.
    FallThrough,
    /// Continue at the given offset.
    Branch(u32),
    /// The condition is unknown. Every listed offset is a live successor.
    Fork(Vec<u32>),
    Return,
    Throw,
    EndFinally,
    /// A filter finished, deciding whether its handler runs.
    EndFilter(Trilean),
}

impl Successor {
    /// The successor offsets, given the offset of the next instruction.
    /// Returns, throws and the ends of handlers have none within the method.
    pub fn targets(&self, next: u32) -> Vec<u32> {
        match self {
            Successor::FallThrough => vec![next],
            Successor::Branch(target) => vec![*target],
            Successor::Fork(targets) => targets.clone(),
            Successor::Return | Successor::Throw | Successor::EndFinally | Successor::EndFilter(_) => Vec::new(),
        }
    }
}

impl fmt::Display for Successor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Successor::FallThrough => write!(f, "fallthrough"),
            Successor::Branch(target) => write!(f, "branch IL_{:04x}", target),
            Successor::Fork(targets) => {
                let targets = targets
                    .iter()
                    .map(|target| format!("IL_{:04x}", target))
                    .collect::<Vec<String>>();
                write!(f, "fork [{}]", targets.join(", "))
            }
            Successor::Return => write!(f, "return"),
            Successor::Throw => write!(f, "throw"),
            Successor::EndFinally => write!(f, "endfinally"),
            Successor::EndFilter(accept) => write!(f, "endfilter {}", accept),
        }
    }
}
