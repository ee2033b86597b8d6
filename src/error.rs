use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Failed to load program image: {0}")]
    LoadError(#[from] LoadError),

    #[error("CPU execution error: {0}")]
    ExecutionError(#[from] ExecutionError),

    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("Instruction at PC={0:#010x} faulted: {1}")]
    InstructionFault(u32, #[source] ExecutionError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Errors related to loading a binary image
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read program file '{0}': {1}")]
    FileReadError(PathBuf, #[source] std::io::Error),

    #[error("Program image is {0} bytes long, which is not a whole number of words")]
    Truncated(usize),

    #[error("Program of {words} words does not fit in {capacity} words of RAM")]
    TooLarge { words: usize, capacity: usize },
}

/// Errors related to CPU execution
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Malformed instruction {raw:#010x}: {reason}")]
    MalformedInstruction { raw: u32, reason: &'static str },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Execution limit reached: {0} cycles")]
    CycleLimitReached(u64),
}

/// Errors related to memory operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Address {0:#010x} cannot be mapped to simulated memory")]
    OutOfRange(u32),

    #[error("Invalid memory service state: {0}")]
    InvalidState(&'static str),
}

/// Type alias for Result with SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;
