pub mod alu;
pub mod cpu;
pub mod flags;
pub mod instruction;
pub mod loader;
pub mod memory;
pub mod registers;
pub mod run_wrapper;

pub mod pipelined;

pub mod error;
