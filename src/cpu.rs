//! RISC-Y-8 CPU state

use log::info;

use crate::alu::FlagRegister;
use crate::registers::RegisterFile;

/// CPU state
#[derive(Clone, Debug, Default)]
pub struct CPUState {
    /// Program counter, in words
    pub pc: u32,
    /// Global clock
    pub clock: u64,
    /// General purpose registers
    pub registers: RegisterFile,
    /// Flags as seen by the execute stage, including unretired producers
    pub flags: FlagRegister,
    /// Flags produced by retired instructions
    pub committed_flags: FlagRegister,
    pub halted: bool,

    /// CPU policy
    pub policy: CPUPolicy,

    /// History of execution
    pub history: CPUHistory,
}

impl CPUState {
    pub fn make(policy: CPUPolicy) -> Self {
        Self { policy, ..Default::default() }
    }

    /// Stops further clocking; halting twice is harmless
    pub fn halt(&mut self) {
        if !self.halted {
            info!("CPU halted at PC={:#x} after {} cycles", self.pc, self.clock);
        }
        self.halted = true;
    }

    /// Drops flag values produced by squashed instructions
    pub fn restore_flags(&mut self) {
        self.flags = self.committed_flags;
    }
}

/// CPU policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CPUPolicy {
    pub verbose: bool,
    pub history: bool,
    /// Keep at most one instruction in flight
    pub scalar_mode: bool,
    /// Give up after this many cycles
    pub max_cycles: Option<u64>,
}

/// History module
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CPUHistory {
    pub cycle_count: u64,
    /// Retired instructions
    pub inst_count: u64,
    pub fetch_stall_count: u64,
    pub mem_stall_count: u64,
    pub hazard_stall_count: u64,
    pub squash_count: u64,
}

impl CPUHistory {
    pub fn cpi(&self) -> f64 {
        if self.inst_count == 0 {
            return 0.;
        }
        self.cycle_count as f64 / self.inst_count as f64
    }
}
