//! Data memory access

use log::trace;

use super::wrap_address;
use super::StageContext;
use crate::cpu::CPUState;
use crate::error::SimulatorResult;
use crate::instruction::MemMode;
use crate::instruction::Operation;
use crate::memory::MemoryState;
use crate::memory::Requester;
use crate::memory::StorageInterface;
use crate::pipelined::record::OperationRecord;

#[derive(Debug, Default)]
pub struct MemoryStage {
    current: Option<OperationRecord>,
    /// A request is outstanding
    waiting: bool,
    done: bool,
}

impl MemoryStage {
    pub fn name(&self) -> &'static str {
        "memory"
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn execute<M: StorageInterface>(
        &mut self,
        ctx: &mut StageContext<'_, M>,
    ) -> SimulatorResult<()> {
        let name = self.name();
        let Some(record) = self.current.as_mut() else {
            return Ok(());
        };
        if self.done {
            return Ok(());
        }

        let mode = match record.inst.map(|inst| inst.operation) {
            Some(Operation::LoadStore { mode, .. }) if record.fault.is_none() => mode,
            _ => {
                self.done = true;
                return Ok(());
            }
        };

        let size = ctx.mem.size_words();
        let address = match mode {
            MemMode::Pop => wrap_address(record.dest_mem_addr, -1, size),
            _ => record.dest_mem_addr,
        };

        let state = if mode.writes_rd() {
            let response = ctx.mem.read(address, Requester::Memory)?;
            if response.state == MemoryState::Success {
                record.result = response.value;
            }
            response.state
        } else {
            ctx.mem.write(address, Requester::Memory, record.result)?.state
        };

        if state.is_waiting() {
            self.waiting = true;
            ctx.cpu.history.mem_stall_count += 1;
            return Ok(());
        }
        self.waiting = false;
        self.done = true;

        match mode {
            MemMode::Pop => {
                record.dest_mem_addr = address;
                record.aux_result = address;
            }
            MemMode::Push => {
                record.dest_mem_addr = address;
                record.aux_result = wrap_address(address, 1, size);
            }
            MemMode::Ldw | MemMode::Stw => {}
        }
        trace!(
            "[{}] {} {:#x} = {:#x}",
            name,
            mode.mnemonic(),
            address,
            record.result
        );
        Ok(())
    }

    pub fn can_advance(&self) -> bool {
        self.current.is_some() && self.done
    }

    pub fn take(&mut self) -> Option<OperationRecord> {
        if !self.can_advance() {
            return None;
        }
        self.current.take()
    }

    /// Accepts a record from execute, or a bubble
    pub fn advance(&mut self, incoming: Option<OperationRecord>) {
        self.current = incoming;
        self.waiting = false;
        self.done = false;
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn current(&self) -> Option<&OperationRecord> {
        self.current.as_ref()
    }

    pub fn squash<M: StorageInterface>(&mut self, cpu: &mut CPUState, mem: &mut M) {
        if let Some(record) = self.current.as_mut() {
            record.release(&mut cpu.registers);
        }
        if self.waiting {
            mem.cancel(Requester::Memory);
        }
        self.current = None;
        self.waiting = false;
        self.done = false;
    }
}
