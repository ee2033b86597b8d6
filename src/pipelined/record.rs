//! The record each instruction carries through the pipeline

use std::fmt;

use crate::alu::FlagRegister;
use crate::error::ExecutionError;
use crate::instruction::Instruction;
use crate::registers::RegisterFile;
use crate::registers::ZERO;

/// Set of registers blocked on behalf of one record
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterClaims(u32);

impl RegisterClaims {
    pub fn insert(&mut self, r: u8) {
        if r != ZERO {
            self.0 |= 1 << r;
        }
    }

    pub fn contains(&self, r: u8) -> bool {
        self.0 & (1 << r) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..32u8).filter(move |r| self.contains(*r))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationRecord {
    /// Address the word was fetched from
    pub pc: u32,
    pub raw_inst: u32,
    /// Set by decode
    pub inst: Option<Instruction>,

    /// Sign-extended immediate or Rs value
    pub operand: u32,
    /// Old Rd value until execute or memory replaces it
    pub result: u32,
    /// Load/store address or branch target
    pub dest_mem_addr: u32,
    /// Second register written at retirement: SP for push/pop, LR for call
    pub aux_dest: Option<u8>,
    pub aux_result: u32,

    pub branch_taken: bool,
    pub write_back: bool,

    /// Flags produced by execute, committed at retirement
    pub flags: Option<FlagRegister>,
    pub claims: RegisterClaims,
    /// Raised when the record retires
    pub fault: Option<ExecutionError>,
}

impl OperationRecord {
    pub fn fetched(pc: u32, raw_inst: u32) -> Self {
        Self { pc, raw_inst, ..Default::default() }
    }

    /// Blocks `r` until this record retires or is squashed
    pub fn claim(&mut self, registers: &mut RegisterFile, r: u8) {
        registers.block(r);
        self.claims.insert(r);
    }

    pub fn release(&mut self, registers: &mut RegisterFile) {
        for r in self.claims.iter() {
            registers.unblock(r);
        }
        self.claims = RegisterClaims::default();
    }
}

impl fmt::Display for OperationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inst {
            Some(inst) => write!(f, "{:#06x}: {}", self.pc, inst),
            None => write!(f, "{:#06x}: {:#010x}", self.pc, self.raw_inst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_claims_skip_zero_register() {
        let mut claims = RegisterClaims::default();
        claims.insert(0);
        assert!(claims.is_empty());
        claims.insert(30);
        claims.insert(4);
        assert_eq!(claims.iter().collect::<Vec<u8>>(), vec![4, 30]);
    }

    #[test]
    fn test_release_unblocks_claims() {
        let mut registers = RegisterFile::default();
        let mut record = OperationRecord::fetched(0, 0);
        record.claim(&mut registers, 5);
        record.claim(&mut registers, 31);
        assert!(registers.is_blocked(5));

        record.release(&mut registers);
        assert!(!registers.is_blocked(5));
        assert!(!registers.is_blocked(31));
        assert!(record.claims.is_empty());
    }
}
