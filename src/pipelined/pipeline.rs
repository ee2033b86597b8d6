//! Five-stage pipeline controller

use log::debug;

use super::record::OperationRecord;
use super::stages::decode::DecodeStage;
use super::stages::execute::ExecuteStage;
use super::stages::fetch::FetchStage;
use super::stages::memory::MemoryStage;
use super::stages::write_back::WriteBackStage;
use super::stages::PipelineSignals;
use super::stages::StageContext;
use crate::cpu::CPUState;
use crate::error::SimulatorResult;
use crate::memory::StorageInterface;

/// Pipeline state = 5 stages, each holding at most one record
#[derive(Debug)]
pub struct Pipeline {
    pub fetch: FetchStage,
    pub decode: DecodeStage,
    pub execute: ExecuteStage,
    pub memory: MemoryStage,
    pub write_back: WriteBackStage,

    /// Keep at most one instruction in flight
    scalar_mode: bool,
    /// Cleared in scalar mode from fetch until the next retirement
    can_fetch: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Pipeline {
    pub fn new(scalar_mode: bool) -> Self {
        Self {
            fetch: FetchStage::default(),
            decode: DecodeStage::default(),
            execute: ExecuteStage::default(),
            memory: MemoryStage::default(),
            write_back: WriteBackStage::default(),
            scalar_mode,
            can_fetch: true,
        }
    }

    /// One clock: execute W, M, X, D, F, then advance from the tail.
    /// A halted CPU is not clocked.
    pub fn clock<M: StorageInterface>(
        &mut self,
        cpu: &mut CPUState,
        mem: &mut M,
    ) -> SimulatorResult<()> {
        if cpu.halted {
            return Ok(());
        }

        let mut signals = PipelineSignals {
            fetch_enabled: self.can_fetch,
            ..Default::default()
        };
        let executed = self.execute_stages(&mut StageContext {
            cpu: &mut *cpu,
            mem: &mut *mem,
            signals: &mut signals,
        });
        if let Err(e) = executed {
            cpu.halt();
            return Err(e);
        }

        if signals.squash {
            self.squash_all(cpu, mem);
        } else {
            self.advance_stages();
        }

        cpu.clock += 1;
        cpu.history.cycle_count += 1;
        Ok(())
    }

    fn execute_stages<M: StorageInterface>(
        &mut self,
        ctx: &mut StageContext<'_, M>,
    ) -> SimulatorResult<()> {
        self.write_back.execute(ctx)?;
        if ctx.signals.retired {
            self.can_fetch = true;
            ctx.signals.fetch_enabled = true;
        }
        if ctx.signals.squash {
            return Ok(());
        }

        self.memory.execute(ctx)?;
        self.execute.execute(ctx)?;

        ctx.signals.downstream_empty =
            self.execute.is_empty() && self.memory.is_empty();
        self.decode.execute(ctx)?;
        if ctx.signals.squash {
            return Ok(());
        }

        self.fetch.execute(ctx)?;
        if ctx.signals.fetched && self.scalar_mode {
            self.can_fetch = false;
        }
        Ok(())
    }

    /// Hands each record to its successor if the successor's slot is free
    fn advance_stages(&mut self) {
        self.write_back.advance(self.memory.take());
        if self.memory.is_empty() {
            self.memory.advance(self.execute.take());
        }
        if self.execute.is_empty() {
            self.execute.advance(self.decode.take());
        }
        if self.decode.is_empty() {
            self.decode.advance(self.fetch.take());
        }
    }

    /// Drops every in-flight record and releases what it holds
    pub fn squash_all<M: StorageInterface>(&mut self, cpu: &mut CPUState, mem: &mut M) {
        debug!(
            "squashing {} records at clock {}, PC={:#x}",
            self.occupancy(),
            cpu.clock,
            cpu.pc
        );
        cpu.history.squash_count += 1;
        self.write_back.squash(cpu, mem);
        self.memory.squash(cpu, mem);
        self.execute.squash(cpu, mem);
        self.decode.squash(cpu, mem);
        self.fetch.squash(cpu, mem);
        cpu.restore_flags();
        self.can_fetch = true;
    }

    /// Number of stages holding a record
    pub fn occupancy(&self) -> usize {
        self.records().iter().filter(|(_, r)| r.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    fn records(&self) -> [(&'static str, Option<&OperationRecord>); 5] {
        [
            (self.fetch.name(), self.fetch.current()),
            (self.decode.name(), self.decode.current()),
            (self.execute.name(), self.execute.current()),
            (self.memory.name(), self.memory.current()),
            (self.write_back.name(), self.write_back.current()),
        ]
    }

    /// One line per stage with the record it holds
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (name, record) in self.records() {
            let held = match record {
                Some(record) => record.to_string(),
                None => "-".to_string(),
            };
            out.push_str(&format!("{:>10}: {}\n", name, held));
        }
        out
    }
}
