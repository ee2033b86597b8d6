//! Instruction fetch

use log::trace;

use super::StageContext;
use crate::cpu::CPUState;
use crate::error::SimulatorResult;
use crate::memory::Requester;
use crate::memory::StorageInterface;
use crate::pipelined::record::OperationRecord;

#[derive(Debug, Default)]
pub struct FetchStage {
    current: Option<OperationRecord>,
}

impl FetchStage {
    pub fn name(&self) -> &'static str {
        "fetch"
    }

    /// Reads the word at PC unless a fetched record is still waiting for decode
    pub fn execute<M: StorageInterface>(
        &mut self,
        ctx: &mut StageContext<'_, M>,
    ) -> SimulatorResult<()> {
        if self.current.is_some() || !ctx.signals.fetch_enabled {
            return Ok(());
        }

        let pc = ctx.cpu.pc;
        let response = ctx.mem.read(pc, Requester::Fetch)?;
        if response.state.is_waiting() {
            ctx.cpu.history.fetch_stall_count += 1;
            return Ok(());
        }
        // An all-zero word is not an instruction
        if response.value == 0 {
            trace!("[{}] no instruction at {:#x}", self.name(), pc);
            return Ok(());
        }

        trace!("[{}] {:#010x} from {:#x}", self.name(), response.value, pc);
        self.current = Some(OperationRecord::fetched(pc, response.value));
        ctx.cpu.pc = pc.wrapping_add(1);
        ctx.signals.fetched = true;
        Ok(())
    }

    pub fn can_advance(&self) -> bool {
        self.current.is_some()
    }

    pub fn take(&mut self) -> Option<OperationRecord> {
        self.current.take()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn current(&self) -> Option<&OperationRecord> {
        self.current.as_ref()
    }

    pub fn squash<M: StorageInterface>(&mut self, _cpu: &mut CPUState, mem: &mut M) {
        self.current = None;
        mem.cancel(Requester::Fetch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::HALT;
    use crate::memory::ram::Ram;
    use crate::pipelined::stages::test_support::Bench;
    use pretty_assertions::assert_eq;

    fn flash(bench: &mut Bench, program: &[u32]) {
        let ram: &mut Ram = bench.mem.lower_mut();
        ram.flash(program).unwrap();
    }

    #[test]
    fn test_fetch_waits_for_memory() {
        let mut bench = Bench::new(2);
        flash(&mut bench, &[HALT]);
        let mut fetch = FetchStage::default();

        for _ in 0..2 {
            fetch.execute(&mut bench.ctx()).unwrap();
            assert!(fetch.is_empty());
        }
        fetch.execute(&mut bench.ctx()).unwrap();
        assert_eq!(fetch.current().map(|r| r.raw_inst), Some(HALT));
        assert_eq!(bench.cpu.pc, 1);
        assert_eq!(bench.cpu.history.fetch_stall_count, 2);
        assert!(bench.signals.fetched);
    }

    #[test]
    fn test_fetch_holds_record_until_taken() {
        let mut bench = Bench::new(0);
        flash(&mut bench, &[HALT, HALT]);
        let mut fetch = FetchStage::default();

        fetch.execute(&mut bench.ctx()).unwrap();
        fetch.execute(&mut bench.ctx()).unwrap();
        assert_eq!(bench.cpu.pc, 1);

        let record = fetch.take().unwrap();
        assert_eq!(record.pc, 0);
        fetch.execute(&mut bench.ctx()).unwrap();
        assert_eq!(bench.cpu.pc, 2);
    }

    #[test]
    fn test_zero_word_does_not_advance_pc() {
        let mut bench = Bench::new(0);
        let mut fetch = FetchStage::default();
        fetch.execute(&mut bench.ctx()).unwrap();
        assert!(fetch.is_empty());
        assert_eq!(bench.cpu.pc, 0);
    }

    #[test]
    fn test_squash_cancels_request() {
        let mut bench = Bench::new(3);
        let mut fetch = FetchStage::default();
        fetch.execute(&mut bench.ctx()).unwrap();
        assert!(bench.mem.is_busy());

        fetch.squash(&mut bench.cpu, &mut bench.mem);
        assert!(!bench.mem.is_busy());
    }

    #[test]
    fn test_fetch_gated() {
        let mut bench = Bench::new(0);
        flash(&mut bench, &[HALT]);
        bench.signals.fetch_enabled = false;
        let mut fetch = FetchStage::default();
        fetch.execute(&mut bench.ctx()).unwrap();
        assert!(fetch.is_empty());
        assert_eq!(bench.mem.request_state().requester, None);
    }
}
