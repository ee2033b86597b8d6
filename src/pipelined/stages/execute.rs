//! ALU work, address calculation and branch resolution

use log::trace;

use super::wrap_address;
use super::StageContext;
use crate::alu;
use crate::alu::AluOutput;
use crate::cpu::CPUState;
use crate::error::SimulatorResult;
use crate::instruction::Condition;
use crate::instruction::Operation;
use crate::memory::StorageInterface;
use crate::pipelined::record::OperationRecord;
use crate::registers::LR;

#[derive(Debug, Default)]
pub struct ExecuteStage {
    current: Option<OperationRecord>,
    /// The held record has been executed
    done: bool,
}

impl ExecuteStage {
    pub fn name(&self) -> &'static str {
        "execute"
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
        self.done = true;

        // Records that failed to decode pass through untouched
        let Some(inst) = record.inst else {
            return Ok(());
        };

        match inst.operation {
            Operation::RegImm { alu, .. } => {
                let output = alu::alu_imm(alu, record.result, record.operand);
                apply(record, output, ctx.cpu);
            }
            Operation::RegReg { alu, .. } => {
                match alu::alu_reg(alu, record.result, record.operand) {
                    Ok(output) => apply(record, output, ctx.cpu),
                    Err(fault) => record.fault = Some(fault),
                }
            }
            Operation::LoadStore { mode, .. } => {
                // Stack addressing is resolved by the memory stage
                if !mode.uses_stack() {
                    record.dest_mem_addr = wrap_address(
                        record.dest_mem_addr,
                        record.operand as i32 as i64,
                        ctx.mem.size_words(),
                    );
                }
            }
            Operation::Control { condition, .. } => {
                record.branch_taken = condition.is_taken(ctx.cpu.flags);
                if record.branch_taken {
                    record.dest_mem_addr = wrap_address(
                        record.dest_mem_addr,
                        record.operand as i32 as i64,
                        ctx.mem.size_words(),
                    );
                    if condition == Condition::Call {
                        record.aux_dest = Some(LR);
                        record.aux_result = record.pc.wrapping_add(1);
                    }
                } else {
                    record.write_back = false;
                }
            }
        }

        trace!(
            "[{}] {} -> result {:#x}, address {:#x}",
            name,
            inst,
            record.result,
            record.dest_mem_addr
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

    /// Accepts a record from decode, or a bubble
    pub fn advance(&mut self, incoming: Option<OperationRecord>) {
        self.current = incoming;
        self.done = false;
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
        self.done = false;
    }
}

fn apply(record: &mut OperationRecord, output: AluOutput, cpu: &mut CPUState) {
    if let Some(flags) = output.flags {
        cpu.flags = flags;
        record.flags = Some(flags);
    }
    record.result = output.result;
    if !output.write_back {
        record.write_back = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alu::FlagRegister;
    use crate::alu::ImmAluOp;
    use crate::alu::RegAluOp;
    use crate::alu::ZF;
    use crate::error::ExecutionError;
    use crate::instruction::Instruction;
    use crate::instruction::MemMode;
    use crate::pipelined::stages::test_support::Bench;
    use pretty_assertions::assert_eq;

    /// Runs a decoded record with the given operand values through execute
    fn run(
        bench: &mut Bench,
        op: Operation,
        result: u32,
        operand: u32,
        dest: u32,
    ) -> OperationRecord {
        let mut record = OperationRecord::fetched(2, op.encode());
        record.inst = Some(Instruction::from(op));
        record.result = result;
        record.operand = operand;
        record.dest_mem_addr = dest;
        record.write_back = true;

        let mut stage = ExecuteStage::default();
        stage.advance(Some(record));
        stage.execute(&mut bench.ctx()).unwrap();
        // A second execute in the same slot is a no-op
        stage.execute(&mut bench.ctx()).unwrap();
        stage.take().unwrap()
    }

    #[test]
    fn test_alu_result_and_flags() {
        let mut bench = Bench::new(0);
        let record = run(
            &mut bench,
            Operation::RegImm { rd: 1, alu: ImmAluOp::Add, imm: 5 },
            10,
            5,
            0,
        );
        assert_eq!(record.result, 15);
        assert_eq!(record.flags, Some(FlagRegister::default()));
        assert!(record.write_back);
    }

    #[test]
    fn test_compare_sets_flags_only() {
        let mut bench = Bench::new(0);
        let record = run(
            &mut bench,
            Operation::RegImm { rd: 6, alu: ImmAluOp::Cmp, imm: 0x200 },
            512,
            0x200,
            0,
        );
        assert_eq!(record.result, 512);
        assert!(!record.write_back);
        assert_eq!(bench.cpu.flags, FlagRegister::new(ZF));
        // Not committed until retirement
        assert_eq!(bench.cpu.committed_flags, FlagRegister::default());
    }

    #[test]
    fn test_division_by_zero_is_deferred() {
        let mut bench = Bench::new(0);
        let record = run(
            &mut bench,
            Operation::RegReg { rd: 1, alu: RegAluOp::Div, rs: 2 },
            10,
            0,
            0,
        );
        assert_eq!(record.fault, Some(ExecutionError::DivisionByZero));
    }

    #[test]
    fn test_load_address_wraps() {
        let mut bench = Bench::new(0);
        // 64 words of RAM
        let record = run(
            &mut bench,
            Operation::LoadStore { rd: 6, mode: MemMode::Ldw, rmem: 5, imm: 40 },
            0,
            40,
            32,
        );
        assert_eq!(record.dest_mem_addr, 8);
    }

    #[test]
    fn test_branch_resolution() {
        let mut bench = Bench::new(0);
        let beq = Operation::Control { rmem: 0, condition: Condition::Eq, imm: 3 };

        let record = run(&mut bench, beq, 0, 3, 2);
        assert!(!record.branch_taken);
        assert!(!record.write_back);

        bench.cpu.flags = FlagRegister::new(ZF);
        let record = run(&mut bench, beq, 0, 3, 2);
        assert!(record.branch_taken);
        assert_eq!(record.dest_mem_addr, 5);
        assert_eq!(record.aux_dest, None);
    }

    #[test]
    fn test_call_links_return_address() {
        let mut bench = Bench::new(0);
        let call = Operation::Control { rmem: 7, condition: Condition::Call, imm: -1 };
        let record = run(&mut bench, call, 0, 0xFFFF_FFFF, 20);
        assert!(record.branch_taken);
        assert_eq!(record.dest_mem_addr, 19);
        assert_eq!(record.aux_dest, Some(LR));
        assert_eq!(record.aux_result, 3);
    }
}
