use thiserror::Error;

use crate::executor::DispatchFault;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Custom(String),
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,
    #[error("Division by zero")]
    DivideByZero,
    #[error("Invalid bit string: {0}")]
    InvalidBitString(String),
    #[error("Bit index {0} is out of range")]
    BitIndexOutOfRange(u32),
    #[error("Memory access at offset {offset} of size {size} is out of bounds")]
    MemoryAccessOutOfBounds { offset: i64, size: usize },
    #[error("Memory block {0} not found")]
    MemoryBlockNotFound(usize),
    #[error("The vertex id {0} does not exist in the graph")]
    GraphVertexNotFound(usize),
    #[error("The edge with head {0} and tail {1} does not exist in the graph")]
    GraphEdgeNotFound(usize, usize),
    #[error("Region {0} does not exist in the region tree")]
    RegionNotFound(usize),
    #[error("Region {0} is not a scope region")]
    RegionNotScope(usize),
    #[error("Block 0x{0:04X} already belongs to a region")]
    BlockAlreadyPlaced(usize),
    #[error("Method body contains no instructions")]
    EmptyMethodBody,
    #[error("No instruction at offset 0x{0:04X}")]
    InstructionNotFound(u32),
    #[error("Branch at 0x{branch:04X} targets 0x{target:04X}, which is not an instruction boundary")]
    DanglingBranchTarget { branch: u32, target: u32 },
    #[error("Invalid exception handler: {0}")]
    InvalidExceptionHandler(String),
    #[error("Protected range at 0x{0:04X} overlaps range at 0x{1:04X} without nesting")]
    OverlappingRegions(u32, u32),
    #[error("Stack underflow at 0x{offset:04X}")]
    StackUnderflow { offset: u32 },
    #[error("Stack height mismatch at 0x{offset:04X}: expected {expected}, found {found}")]
    StackImbalance {
        offset: u32,
        expected: usize,
        found: usize,
    },
    #[error("Stack dependency is already owned by a node")]
    DependencyAlreadyOwned,
    #[error("Data source belongs to a different data flow graph")]
    ForeignDataSource,
    #[error("Value pushed at 0x{producer:04X} is also consumed at 0x{consumer:04X}")]
    SharedProducer { producer: u32, consumer: u32 },
    #[error("Dispatch of instruction at 0x{offset:04X} failed: {fault}")]
    Dispatch { offset: u32, fault: DispatchFault },
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
