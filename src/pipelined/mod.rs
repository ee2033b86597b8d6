//! Pipelined implementation

use crate::cpu::CPUState;
use crate::error::ExecutionError;
use crate::error::SimulatorResult;
use crate::memory::StorageInterface;
use crate::pipelined::pipeline::Pipeline;

pub mod pipeline;
pub mod record;
pub mod stages;

/// Clocks the pipeline until the CPU halts.
/// Returns the number of cycles spent by this call.
pub fn run(
    cpu: &mut CPUState,
    mem: &mut impl StorageInterface,
    pipeline: &mut Pipeline,
) -> SimulatorResult<u64> {
    let start = cpu.clock;
    while !cpu.halted {
        if let Some(limit) = cpu.policy.max_cycles {
            if cpu.clock >= limit {
                cpu.halt();
                return Err(ExecutionError::CycleLimitReached(limit).into());
            }
        }

        if cpu.policy.verbose {
            eprintln!("[VERBOSE] Cycle {}; PC: {:#010x}", cpu.clock, cpu.pc);
        }
        pipeline.clock(cpu, mem)?;
        if cpu.policy.verbose {
            eprint!("{}", pipeline.describe());
        }
    }
    Ok(cpu.clock - start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CPUPolicy;
    use crate::error::SimulatorError;
    use crate::instruction::Condition;
    use crate::instruction::Operation;
    use crate::memory::ram::Ram;
    use crate::memory::ram::RamPolicy;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cycle_limit() {
        // bunc [r0 + 0] spins forever
        let spin = Operation::Control { rmem: 0, condition: Condition::Unc, imm: 0 };
        let mut ram = Ram::make(RamPolicy { lines: 4, words_per_line: 4, delay: 0 });
        ram.flash(&[spin.encode()]).unwrap();
        let mut cpu = CPUState::make(CPUPolicy {
            max_cycles: Some(50),
            ..Default::default()
        });

        let err = run(&mut cpu, &mut ram, &mut Pipeline::default()).unwrap_err();
        assert!(matches!(
            err,
            SimulatorError::ExecutionError(ExecutionError::CycleLimitReached(50))
        ));
        assert_eq!(cpu.clock, 50);
        assert!(cpu.halted);
    }
}
