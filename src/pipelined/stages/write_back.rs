//! Retirement: register writes, flag commit and taken branches

use log::debug;
use log::trace;

use super::StageContext;
use crate::cpu::CPUState;
use crate::error::ExecutionError;
use crate::error::SimulatorError;
use crate::error::SimulatorResult;
use crate::instruction::Operation;
use crate::memory::StorageInterface;
use crate::pipelined::record::OperationRecord;

#[derive(Debug, Default)]
pub struct WriteBackStage {
    current: Option<OperationRecord>,
}

impl WriteBackStage {
    pub fn name(&self) -> &'static str {
        "write_back"
    }

    /// Retires the held record, if any
    pub fn execute<M: StorageInterface>(
        &mut self,
        ctx: &mut StageContext<'_, M>,
    ) -> SimulatorResult<()> {
        let Some(mut record) = self.current.take() else {
            return Ok(());
        };
        ctx.signals.retired = true;
        record.release(&mut ctx.cpu.registers);

        if let Some(fault) = record.fault {
            ctx.cpu.halt();
            return Err(SimulatorError::InstructionFault(record.pc, fault));
        }
        let Some(inst) = record.inst else {
            return Err(SimulatorError::InstructionFault(
                record.pc,
                ExecutionError::MalformedInstruction {
                    raw: record.raw_inst,
                    reason: "retired without being decoded",
                },
            ));
        };

        ctx.cpu.history.inst_count += 1;
        if let Some(flags) = record.flags {
            ctx.cpu.committed_flags = flags;
        }

        let registers = &mut ctx.cpu.registers;
        match inst.operation {
            Operation::Control { .. } => {
                if !record.branch_taken {
                    trace!("[{}] {} not taken", self.name(), record);
                    return Ok(());
                }
                if let Some(link) = record.aux_dest {
                    registers.write_nonblocking(link, record.aux_result);
                }
                debug!(
                    "[{}] {} taken to {:#x}",
                    self.name(),
                    record,
                    record.dest_mem_addr
                );
                ctx.cpu.pc = record.dest_mem_addr;
                ctx.signals.squash = true;
            }
            Operation::RegImm { rd, .. }
            | Operation::RegReg { rd, .. }
            | Operation::LoadStore { rd, .. } => {
                if record.write_back {
                    registers.write_nonblocking(rd, record.result);
                }
                if let Some(aux) = record.aux_dest {
                    registers.write_nonblocking(aux, record.aux_result);
                }
                trace!("[{}] {}", self.name(), record);
            }
        }
        Ok(())
    }

    /// Accepts a record from memory, or a bubble
    pub fn advance(&mut self, incoming: Option<OperationRecord>) {
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alu::FlagRegister;
    use crate::alu::ImmAluOp;
    use crate::alu::ZF;
    use crate::instruction::Condition;
    use crate::instruction::Instruction;
    use crate::instruction::MemMode;
    use crate::pipelined::stages::test_support::Bench;
    use crate::registers::LR;
    use crate::registers::SP;
    use pretty_assertions::assert_eq;

    fn retire(bench: &mut Bench, record: OperationRecord) -> SimulatorResult<()> {
        let mut stage = WriteBackStage::default();
        stage.advance(Some(record));
        let result = stage.execute(&mut bench.ctx());
        assert!(stage.is_empty());
        result
    }

    fn decoded(op: Operation) -> OperationRecord {
        let mut record = OperationRecord::fetched(4, op.encode());
        record.inst = Some(Instruction::from(op));
        record.write_back = true;
        record
    }

    #[test]
    fn test_register_write_and_flag_commit() {
        let mut bench = Bench::new(0);
        let mut record = decoded(Operation::RegImm { rd: 1, alu: ImmAluOp::Sub, imm: 1 });
        record.claim(&mut bench.cpu.registers, 1);
        record.result = 0;
        record.flags = Some(FlagRegister::new(ZF));

        retire(&mut bench, record).unwrap();
        assert_eq!(bench.cpu.registers.read_nonblocking(1), 0);
        assert!(!bench.cpu.registers.is_blocked(1));
        assert_eq!(bench.cpu.committed_flags, FlagRegister::new(ZF));
        assert_eq!(bench.cpu.history.inst_count, 1);
        assert!(bench.signals.retired);
        assert!(!bench.signals.squash);
    }

    #[test]
    fn test_writes_to_zero_register_are_dropped() {
        let mut bench = Bench::new(0);
        let mut record = decoded(Operation::RegImm { rd: 0, alu: ImmAluOp::Ldi, imm: 9 });
        record.result = 9;
        retire(&mut bench, record).unwrap();
        assert_eq!(bench.cpu.registers.read_nonblocking(0), 0);
    }

    #[test]
    fn test_pop_updates_stack_pointer() {
        let mut bench = Bench::new(0);
        let mut record = decoded(Operation::LoadStore {
            rd: 2,
            mode: MemMode::Pop,
            rmem: 0,
            imm: 0,
        });
        record.result = 77;
        record.aux_dest = Some(SP);
        record.aux_result = 11;

        retire(&mut bench, record).unwrap();
        assert_eq!(bench.cpu.registers.read_nonblocking(2), 77);
        assert_eq!(bench.cpu.registers.read_nonblocking(SP), 11);
    }

    #[test]
    fn test_push_updates_only_stack_pointer() {
        let mut bench = Bench::new(0);
        bench.cpu.registers.write_nonblocking(1, 5);
        let mut record = decoded(Operation::LoadStore {
            rd: 1,
            mode: MemMode::Push,
            rmem: 0,
            imm: 0,
        });
        record.write_back = false;
        record.result = 99;
        record.aux_dest = Some(SP);
        record.aux_result = 12;

        retire(&mut bench, record).unwrap();
        assert_eq!(bench.cpu.registers.read_nonblocking(1), 5);
        assert_eq!(bench.cpu.registers.read_nonblocking(SP), 12);
    }

    #[test]
    fn test_taken_call_redirects_and_links() {
        let mut bench = Bench::new(0);
        bench.cpu.pc = 9;
        let mut record = decoded(Operation::Control {
            rmem: 3,
            condition: Condition::Call,
            imm: 0,
        });
        record.branch_taken = true;
        record.dest_mem_addr = 40;
        record.aux_dest = Some(LR);
        record.aux_result = 5;

        retire(&mut bench, record).unwrap();
        assert_eq!(bench.cpu.pc, 40);
        assert_eq!(bench.cpu.registers.read_nonblocking(LR), 5);
        assert!(bench.signals.squash);
    }

    #[test]
    fn test_untaken_branch_keeps_pc() {
        let mut bench = Bench::new(0);
        bench.cpu.pc = 9;
        let mut record = decoded(Operation::Control {
            rmem: 0,
            condition: Condition::Ne,
            imm: -4,
        });
        record.write_back = false;
        record.dest_mem_addr = 4;

        retire(&mut bench, record).unwrap();
        assert_eq!(bench.cpu.pc, 9);
        assert!(!bench.signals.squash);
        assert_eq!(bench.cpu.history.inst_count, 1);
    }

    #[test]
    fn test_fault_raised_at_retirement() {
        let mut bench = Bench::new(0);
        let mut record = OperationRecord::fetched(6, 0x2);
        record.fault = Some(ExecutionError::DivisionByZero);

        let err = retire(&mut bench, record).unwrap_err();
        assert!(matches!(
            err,
            SimulatorError::InstructionFault(6, ExecutionError::DivisionByZero)
        ));
        assert!(bench.cpu.halted);
        assert_eq!(bench.cpu.history.inst_count, 0);
    }
}
