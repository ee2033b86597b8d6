//! Instruction decode and register read

use log::debug;
use log::trace;

use super::StageContext;
use crate::cpu::CPUState;
use crate::error::SimulatorResult;
use crate::instruction::decode_helper;
use crate::instruction::decode_helper::sign_extend;
use crate::instruction::Instruction;
use crate::instruction::Operation;
use crate::memory::StorageInterface;
use crate::pipelined::record::OperationRecord;
use crate::registers::RegisterFile;
use crate::registers::SP;
use crate::registers::ZERO;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeState {
    /// Empty, or holding a decoded record
    #[default]
    Free,
    /// Holding a record that has not been decoded yet
    Busy,
    /// A source register is claimed by an older instruction
    AwaitingRegRead,
    /// Holding the halt sentinel while older instructions retire
    AwaitingDrain,
}

#[derive(Debug, Default)]
pub struct DecodeStage {
    current: Option<OperationRecord>,
    state: DecodeState,
}

impl DecodeStage {
    pub fn name(&self) -> &'static str {
        "decode"
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn execute<M: StorageInterface>(
        &mut self,
        ctx: &mut StageContext<'_, M>,
    ) -> SimulatorResult<()> {
        let name = self.name();
        let Some(record) = self.current.as_mut() else {
            return Ok(());
        };
        if self.state == DecodeState::Free {
            return Ok(());
        }

        // Halts even when the condition bits name no condition
        if decode_helper::is_halt_word(record.raw_inst) {
            if !ctx.signals.downstream_empty {
                self.state = DecodeState::AwaitingDrain;
                return Ok(());
            }
            ctx.cpu.halt();
            ctx.signals.squash = true;
            return Ok(());
        }

        let inst = match Instruction::new(record.raw_inst) {
            Ok(inst) => inst,
            Err(fault) => {
                // Raised only if the word retires
                debug!("[{}] {} at {:#x}", name, fault, record.pc);
                record.fault = Some(fault);
                self.state = DecodeState::Free;
                return Ok(());
            }
        };

        if read_operands(record, &inst, &mut ctx.cpu.registers) {
            trace!("[{}] {}", name, inst);
            record.inst = Some(inst);
            self.state = DecodeState::Free;
        } else {
            trace!("[{}] {} stalls on a register", name, inst);
            ctx.cpu.history.hazard_stall_count += 1;
            self.state = DecodeState::AwaitingRegRead;
        }
        Ok(())
    }

    pub fn can_advance(&self) -> bool {
        self.current.is_some() && self.state == DecodeState::Free
    }

    pub fn take(&mut self) -> Option<OperationRecord> {
        if !self.can_advance() {
            return None;
        }
        self.current.take()
    }

    /// Accepts a record from fetch, or a bubble
    pub fn advance(&mut self, incoming: Option<OperationRecord>) {
        self.state = match incoming {
            Some(_) => DecodeState::Busy,
            None => DecodeState::Free,
        };
        self.current = incoming;
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn current(&self) -> Option<&OperationRecord> {
        self.current.as_ref()
    }

    pub fn squash<M: StorageInterface>(&mut self, cpu: &mut CPUState, _mem: &mut M) {
        if let Some(record) = self.current.as_mut() {
            record.release(&mut cpu.registers);
        }
        self.current = None;
        self.state = DecodeState::Free;
    }
}

/// Reads and claims the registers of `inst`.
/// Returns false, claiming nothing, if any of them is blocked.
fn read_operands(
    record: &mut OperationRecord,
    inst: &Instruction,
    registers: &mut RegisterFile,
) -> bool {
    match inst.operation {
        Operation::RegImm { rd, imm, .. } => {
            let Ok(value) = registers.read(rd) else {
                return false;
            };
            record.claim(registers, rd);
            record.result = value;
            record.operand = sign_extend(imm);
            record.write_back = rd != ZERO;
        }
        Operation::RegReg { rd, rs, .. } => {
            let (Ok(value), Ok(operand)) = (registers.read(rd), registers.read(rs))
            else {
                return false;
            };
            record.claim(registers, rd);
            record.claim(registers, rs);
            record.result = value;
            record.operand = operand;
            record.write_back = rd != ZERO;
        }
        Operation::LoadStore { rd, mode, rmem, imm } => {
            let base_register = if mode.uses_stack() { SP } else { rmem };
            let (Ok(value), Ok(base)) =
                (registers.read(rd), registers.read(base_register))
            else {
                return false;
            };
            record.claim(registers, rd);
            record.claim(registers, base_register);
            record.result = value;
            record.dest_mem_addr = base;
            record.operand = sign_extend(imm);
            record.write_back = mode.writes_rd();
            if mode.uses_stack() {
                record.aux_dest = Some(SP);
            }
        }
        Operation::Control { rmem, imm, .. } => {
            let Ok(base) = registers.read(rmem) else {
                return false;
            };
            // r0 as base means PC-relative
            record.dest_mem_addr = if rmem == ZERO { record.pc } else { base };
            record.operand = sign_extend(imm);
            record.write_back = true;
        }
    }
    true
}
