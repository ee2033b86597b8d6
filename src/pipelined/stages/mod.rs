//! Pipeline stages

pub mod decode;
pub mod execute;
pub mod fetch;
pub mod memory;
pub mod write_back;

use crate::cpu::CPUState;
use crate::memory::StorageInterface;

/// Per-cycle view of the machine handed to each stage
pub struct StageContext<'a, M: StorageInterface> {
    pub cpu: &'a mut CPUState,
    pub mem: &'a mut M,
    pub signals: &'a mut PipelineSignals,
}

/// Flags raised by stages during one cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineSignals {
    /// Squash every stage once the current stage returns
    pub squash: bool,
    /// Fetch may issue a new request
    pub fetch_enabled: bool,
    /// Execute and memory hold no records
    pub downstream_empty: bool,
    /// Fetch produced a record
    pub fetched: bool,
    /// Write-back retired a record
    pub retired: bool,
}

/// `base + offset`, wrapped onto a memory of `size` words
pub fn wrap_address(base: u32, offset: i64, size: u32) -> u32 {
    let target = base as i64 + offset;
    if size == 0 {
        return target as u32;
    }
    target.rem_euclid(size as i64) as u32
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::memory::cache::Cache;
    use crate::memory::cache::CachePolicy;
    use crate::memory::ram::Ram;
    use crate::memory::ram::RamPolicy;

    /// A machine with an immediate-response memory of 64 words
    pub struct Bench {
        pub cpu: CPUState,
        pub mem: Cache<Ram>,
        pub signals: PipelineSignals,
    }

    impl Bench {
        pub fn new(ram_delay: u32) -> Self {
            let ram = Ram::make(RamPolicy {
                lines: 16,
                words_per_line: 4,
                delay: ram_delay,
            });
            Self {
                cpu: CPUState::default(),
                mem: Cache::make(CachePolicy::default(), ram, 1),
                signals: PipelineSignals {
                    fetch_enabled: true,
                    downstream_empty: true,
                    ..Default::default()
                },
            }
        }

        pub fn ctx(&mut self) -> StageContext<'_, Cache<Ram>> {
            StageContext {
                cpu: &mut self.cpu,
                mem: &mut self.mem,
                signals: &mut self.signals,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wrap_address() {
        assert_eq!(wrap_address(2, 3, 1024), 5);
        assert_eq!(wrap_address(0, -1, 1024), 1023);
        assert_eq!(wrap_address(0, -1, 800), 799);
        assert_eq!(wrap_address(799, 2, 800), 1);
    }
}
