use std::path::PathBuf;

use crate::cpu::CPUPolicy;
use crate::memory::cache::CachePolicy;

xflags::xflags! {
    /// RISC-Y-8 cycle-accurate pipeline simulator.
    cmd SimArgs {
        /// Path to the program image (little-endian 32-bit words).
        required binary: PathBuf

        /// Enables history module, printing cycle, stall and cache counts after simulation.
        optional --history

        /// Steps through the program one clock at a time, reading commands from stdin.
        optional --step

        /// Keeps at most one instruction in flight.
        optional --scalar

        /// Sends every access straight to RAM.
        optional --disable-cache

        /// Stops with an error after this many cycles.
        optional --max-cycles cycles: u64

        /// Enables verbose mode, tracing every stage of every cycle.
        /// Largely used for debugging purposes.
        optional -v, --verbose
    }
}

impl From<&SimArgs> for CPUPolicy {
    fn from(args: &SimArgs) -> Self {
        CPUPolicy {
            verbose: args.verbose,
            history: args.history,
            scalar_mode: args.scalar,
            max_cycles: args.max_cycles,
        }
    }
}

impl SimArgs {
    pub fn cache_policy(&self) -> CachePolicy {
        if self.disable_cache {
            CachePolicy::disabled()
        } else {
            CachePolicy::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_flags() {
        let args = SimArgs::from_vec(vec![
            "prog.bin".into(),
            "--scalar".into(),
            "--max-cycles".into(),
            "500".into(),
            "--disable-cache".into(),
        ])
        .unwrap();

        assert_eq!(args.binary, PathBuf::from("prog.bin"));
        let policy = CPUPolicy::from(&args);
        assert!(policy.scalar_mode);
        assert!(!policy.history);
        assert_eq!(policy.max_cycles, Some(500));
        assert!(args.cache_policy().is_bypassed());
    }

    #[test]
    fn test_defaults() {
        let args = SimArgs::from_vec(vec!["prog.bin".into()]).unwrap();
        assert_eq!(CPUPolicy::from(&args), CPUPolicy::default());
        assert_eq!(args.cache_policy(), CachePolicy::default());
    }
}
