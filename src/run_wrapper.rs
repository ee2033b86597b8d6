//! A simulator wrapper

use std::fmt;
use std::path::Path;

use crate::cpu::CPUPolicy;
use crate::cpu::CPUState;
use crate::error::SimulatorError;
use crate::error::SimulatorResult;
use crate::loader;
use crate::memory::cache::Cache;
use crate::memory::cache::CachePolicy;
use crate::memory::ram::Ram;
use crate::memory::ram::RamPolicy;
use crate::memory::StorageInterface;
use crate::pipelined;
use crate::pipelined::pipeline::Pipeline;

/// Summary of one finished run
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunStats {
    pub cycles: u64,
    pub instructions: u64,
    pub cpi: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub miss_rate: f64,
}

/// CPU, L1 cache over RAM, and the pipeline driving them
pub struct Simulator {
    pub cpu: CPUState,
    pub mem: Cache<Ram>,
    pub pipeline: Pipeline,
}

impl Simulator {
    pub fn make(
        policy: CPUPolicy,
        ram: RamPolicy,
        cache: CachePolicy,
    ) -> SimulatorResult<Self> {
        if ram.size_words() == 0 {
            return Err(SimulatorError::ConfigError(
                "RAM must hold at least one word".to_string(),
            ));
        }
        if !cache.is_valid() {
            return Err(SimulatorError::ConfigError(format!(
                "cache geometry {:?} needs power-of-two sets and line size",
                cache
            )));
        }
        Ok(Self {
            cpu: CPUState::make(policy),
            mem: Cache::make(cache, Ram::make(ram), 1),
            pipeline: Pipeline::new(policy.scalar_mode),
        })
    }

    /// Loads a binary image from disk
    pub fn load(&mut self, path: &Path) -> SimulatorResult<()> {
        let program = loader::read_image(path)?;
        self.load_program(&program)
    }

    pub fn load_program(&mut self, program: &[u32]) -> SimulatorResult<()> {
        loader::load_program(&mut self.cpu, self.mem.lower_mut(), program)
    }

    /// Advances one clock
    pub fn step(&mut self) -> SimulatorResult<()> {
        self.pipeline.clock(&mut self.cpu, &mut self.mem)
    }

    /// Clocks until halt; returns the cycles spent
    pub fn run(&mut self) -> SimulatorResult<u64> {
        pipelined::run(&mut self.cpu, &mut self.mem, &mut self.pipeline)
    }

    pub fn is_halted(&self) -> bool {
        self.cpu.halted
    }

    pub fn register(&self, r: u8) -> u32 {
        self.cpu.registers.read_nonblocking(r)
    }

    /// The value a load from `address` would see
    pub fn peek(&self, address: u32) -> u32 {
        self.mem.peek(address)
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            cycles: self.cpu.history.cycle_count,
            instructions: self.cpu.history.inst_count,
            cpi: self.cpu.history.cpi(),
            cache_hits: self.mem.history.num_hit,
            cache_misses: self.mem.history.num_miss,
            miss_rate: self.mem.get_miss_rate(),
        }
    }

    pub fn print_history(&self) {
        let history = &self.cpu.history;
        let stats = self.stats();
        eprintln!(
            "[HISTORY] # cycles = {}, # instructions = {}",
            stats.cycles, stats.instructions
        );
        eprintln!("[HISTORY] CPI = {:.2}", stats.cpi);
        eprintln!(
            "[HISTORY] stalls: fetch = {}, memory = {}, hazard = {}; squashes = {}",
            history.fetch_stall_count,
            history.mem_stall_count,
            history.hazard_stall_count,
            history.squash_count
        );
        eprintln!("[HISTORY] {:?}", self.mem.history);
        eprintln!("[HISTORY] miss rate = {:.4}", stats.miss_rate);
    }
}

impl fmt::Display for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PC = {:#010x}, clock = {}", self.cpu.pc, self.cpu.clock)?;
        writeln!(f, "Flags: {}", self.cpu.committed_flags)?;
        write!(f, "{}", self.cpu.registers)?;
        write!(f, "{}", self.mem)
    }
}

/// Run simulation on the given binary image
pub fn run(
    path: &Path,
    policy: CPUPolicy,
    cache: CachePolicy,
) -> SimulatorResult<RunStats> {
    let mut sim = Simulator::make(policy, RamPolicy::default(), cache)?;
    sim.load(path)?;
    sim.run()?;

    if policy.history {
        sim.print_history();
    }
    Ok(sim.stats())
}
