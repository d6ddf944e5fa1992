use serde::{Deserialize, Serialize};
use std::fmt;

use crate::graph;

/// How control moves along an edge.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum EdgeType {
    /// Execution runs off the end of the head block.
    FallThrough,
    Unconditional,
    Conditional,
    /// An exception transfers control to a handler.
    Abnormal,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EdgeType::FallThrough => write!(f, "fallthrough"),
            EdgeType::Unconditional => write!(f, "unconditional"),
            EdgeType::Conditional => write!(f, "conditional"),
            EdgeType::Abnormal => write!(f, "abnormal"),
        }
    }
}

/// An edge between two blocks of a `ControlFlowGraph`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Edge {
    head: usize,
    tail: usize,
    edge_type: EdgeType,
}

impl Edge {
    pub(crate) fn new(head: usize, tail: usize, edge_type: EdgeType) -> Edge {
        Edge {
            head,
            tail,
            edge_type,
        }
    }

    /// Retrieve the index of the head `Vertex` for this `Edge`.
    pub fn head(&self) -> usize {
        self.head
    }

    /// Retrieve the index of the tail `Vertex` for this `Edge`.
    pub fn tail(&self) -> usize {
        self.tail
    }

    pub fn edge_type(&self) -> EdgeType {
        self.edge_type
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(0x{:X}->0x{:X}) {}", self.head, self.tail, self.edge_type)
    }
}

impl graph::Edge for Edge {
    fn head(&self) -> usize {
        self.head
    }

    fn tail(&self) -> usize {
        self.tail
    }

    fn dot_label(&self) -> String {
        match self.edge_type {
            EdgeType::Conditional => "cond".to_string(),
            _ => String::new(),
        }
    }

    fn dot_style(&self) -> String {
        match self.edge_type {
            EdgeType::Abnormal => "dashed".to_string(),
            _ => "solid".to_string(),
        }
    }

    fn dot_color(&self) -> String {
        match self.edge_type {
            EdgeType::Abnormal => "#aa0000".to_string(),
            _ => "#000000".to_string(),
        }
    }
}
