//! Utility functions for preparing the CPU and memory for execution

use std::fs;
use std::path::Path;

use crate::cpu::CPUState;
use crate::error::LoadError;
use crate::error::SimulatorResult;
use crate::memory::ram::Ram;

const WORD_BYTES: usize = 4;

/// Reads a program image of little-endian 32-bit words
pub fn read_image(path: &Path) -> Result<Vec<u32>, LoadError> {
    let bytes =
        fs::read(path).map_err(|e| LoadError::FileReadError(path.to_path_buf(), e))?;
    words_from_bytes(&bytes)
}

pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, LoadError> {
    if bytes.len() % WORD_BYTES != 0 {
        return Err(LoadError::Truncated(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(WORD_BYTES)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect())
}

/// Flashes `program` into RAM at word 0 and points the CPU at it
pub fn load_program(
    cpu: &mut CPUState,
    ram: &mut Ram,
    program: &[u32],
) -> SimulatorResult<()> {
    ram.flash(program)?;
    cpu.pc = 0;

    if cpu.policy.verbose {
        eprintln!(
            "[VERBOSE] Loaded {} words; initial PC: {:#010x}",
            program.len(),
            cpu.pc
        );
    }
    Ok(())
}
