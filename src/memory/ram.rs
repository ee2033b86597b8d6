//! Word-addressed main memory

use log::trace;

use super::LineResult;
use super::MemoryState;
use super::ReadResult;
use super::RequestState;
use super::Requester;
use super::StorageInterface;
use super::WriteResult;
use crate::error::LoadError;
use crate::error::MemoryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RamPolicy {
    pub lines: usize,
    pub words_per_line: usize,
    /// Service latency in cycles
    pub delay: u32,
}

impl Default for RamPolicy {
    fn default() -> Self {
        Self { lines: 128, words_per_line: 8, delay: 10 }
    }
}

impl RamPolicy {
    pub fn size_words(&self) -> usize {
        self.lines * self.words_per_line
    }
}

/// Flat RAM with a single requester slot
pub struct Ram {
    pub policy: RamPolicy,
    contents: Vec<u32>,
    state: RequestState,
}

impl Ram {
    pub fn make(policy: RamPolicy) -> Self {
        Self {
            policy,
            contents: vec![0; policy.size_words()],
            state: RequestState::new(policy.delay),
        }
    }

    fn wrap(&self, address: u32) -> Result<usize, MemoryError> {
        if self.contents.is_empty() {
            return Err(MemoryError::OutOfRange(address));
        }
        Ok(address as usize % self.contents.len())
    }

    /// Copies a program image to word 0 onwards
    pub fn flash(&mut self, program: &[u32]) -> Result<(), LoadError> {
        if program.len() > self.contents.len() {
            return Err(LoadError::TooLarge {
                words: program.len(),
                capacity: self.contents.len(),
            });
        }
        self.contents[..program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Untimed write, for setting up memory images
    pub fn poke(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        let i = self.wrap(address)?;
        self.contents[i] = value;
        Ok(())
    }

    pub fn contents(&self) -> &[u32] {
        &self.contents
    }
}

impl StorageInterface for Ram {
    fn read(
        &mut self,
        address: u32,
        who: Requester,
    ) -> Result<ReadResult, MemoryError> {
        let i = self.wrap(address)?;
        if !self.state.service(who) {
            return Ok(ReadResult::waiting(MemoryState::Wait));
        }
        self.state.release();
        trace!("RAM read {:#x} for {:?}", address, who);
        Ok(ReadResult::success(self.contents[i]))
    }

    fn read_multi(
        &mut self,
        address: u32,
        words: usize,
        offset: usize,
        who: Requester,
    ) -> Result<LineResult, MemoryError> {
        if words == 0 || offset >= words {
            return Err(MemoryError::InvalidState(
                "line offset outside requested line",
            ));
        }
        let size = self.contents.len();
        let i = self.wrap(address)?;
        if !self.state.service(who) {
            return Ok(LineResult::waiting(MemoryState::Wait));
        }
        self.state.release();

        let base = (i + size - offset % size) % size;
        let line = (0..words).map(|k| self.contents[(base + k) % size]).collect();
        trace!("RAM line read {:#x}+{} for {:?}", base, words, who);
        Ok(LineResult::success(line))
    }

    fn write(
        &mut self,
        address: u32,
        who: Requester,
        value: u32,
    ) -> Result<WriteResult, MemoryError> {
        let i = self.wrap(address)?;
        if !self.state.service(who) {
            return Ok(WriteResult::waiting(MemoryState::Wait));
        }
        self.state.release();
        self.contents[i] = value;
        trace!("RAM write {:#x} <- {:#x} for {:?}", address, value, who);
        Ok(WriteResult::success(value))
    }

    fn cancel(&mut self, who: Requester) {
        self.state.cancel(who);
    }

    fn size_words(&self) -> u32 {
        self.contents.len() as u32
    }

    fn request_state(&self) -> RequestState {
        self.state
    }

    fn peek(&self, address: u32) -> u32 {
        match self.wrap(address) {
            Ok(i) => self.contents[i],
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn small_ram(delay: u32) -> Ram {
        Ram::make(RamPolicy { lines: 4, words_per_line: 4, delay })
    }

    #[test]
    fn test_read_takes_delay_plus_one_calls() {
        let mut ram = small_ram(2);
        ram.poke(3, 0xAB).unwrap();
        for _ in 0..2 {
            let r = ram.read(3, Requester::Fetch).unwrap();
            assert_eq!(r.state, MemoryState::Wait);
        }
        let r = ram.read(3, Requester::Fetch).unwrap();
        assert_eq!(r, ReadResult::success(0xAB));
        assert_eq!(ram.is_busy(), false);
    }

    #[test]
    fn test_single_requester() {
        let mut ram = small_ram(1);
        assert!(ram.write(1, Requester::Memory, 7).unwrap().state.is_waiting());
        // The fetcher is shut out until the write completes
        assert!(ram.read(1, Requester::Fetch).unwrap().state.is_waiting());
        assert_eq!(
            ram.write(1, Requester::Memory, 7).unwrap(),
            WriteResult::success(7)
        );
        assert!(ram.read(1, Requester::Fetch).unwrap().state.is_waiting());
        assert_eq!(
            ram.read(1, Requester::Fetch).unwrap(),
            ReadResult::success(7)
        );
    }

    #[test]
    fn test_addresses_wrap() {
        let mut ram = small_ram(0);
        ram.write(17, Requester::Memory, 9).unwrap();
        assert_eq!(ram.peek(1), 9);
        assert_eq!(ram.size_words(), 16);
    }

    #[test]
    fn test_read_multi_is_line_aligned() {
        let mut ram = small_ram(0);
        ram.flash(&(0..16).collect::<Vec<u32>>()).unwrap();
        let r = ram.read_multi(6, 4, 2, Requester::Cache(1)).unwrap();
        assert_eq!(r, LineResult::success(vec![4, 5, 6, 7]));
        assert!(ram.read_multi(6, 4, 4, Requester::Cache(1)).is_err());
    }

    #[test]
    fn test_flash_rejects_oversized_image() {
        let mut ram = small_ram(0);
        assert!(ram.flash(&[1; 17]).is_err());
    }

    #[test]
    fn test_empty_ram_is_out_of_range() {
        let mut ram = Ram::make(RamPolicy { lines: 0, words_per_line: 4, delay: 0 });
        assert_eq!(
            ram.read(0, Requester::Fetch),
            Err(MemoryError::OutOfRange(0))
        );
    }
}
