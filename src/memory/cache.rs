//! Cache implementation

use std::fmt;

use log::debug;

use super::LineResult;
use super::MemoryState;
use super::ReadResult;
use super::RequestState;
use super::Requester;
use super::StorageInterface;
use super::WriteResult;
use crate::error::MemoryError;

/// Set-associative write-through, write-allocate cache with LRU replacement
pub struct Cache<L: StorageInterface> {
    pub policy: CachePolicy,

    pub history: CacheHistory,

    /// Level tag used when requesting from `lower`
    level: u8,
    lower: L,

    sets: Vec<Vec<CacheLine>>,

    state: RequestState,
    /// The current request is waiting on the lower level
    wait_next: bool,
    /// The current request missed at this level
    missed: bool,
}

enum LineAccess {
    Ready { index: usize, way: usize },
    Pending(MemoryState),
}

// A word address looks like this:
// | tag | index | offset |
impl<L: StorageInterface> Cache<L> {
    pub fn make(policy: CachePolicy, lower: L, level: u8) -> Self {
        assert!(policy.is_valid());

        let sets = if policy.is_bypassed() {
            Vec::new()
        } else {
            (0..policy.sets)
                .map(|_| {
                    (0..policy.ways)
                        .map(|way| CacheLine {
                            valid: false,
                            tag: 0,
                            data: vec![0; policy.words_per_line],
                            // Way 0 is the first victim
                            lru: policy.ways - 1 - way,
                        })
                        .collect()
                })
                .collect()
        };

        Self {
            policy,
            history: CacheHistory::default(),
            level,
            lower,
            sets,
            state: RequestState::new(policy.delay),
            wait_next: false,
            missed: false,
        }
    }

    pub fn lower(&self) -> &L {
        &self.lower
    }

    pub fn lower_mut(&mut self) -> &mut L {
        &mut self.lower
    }

    pub fn sets(&self) -> &[Vec<CacheLine>] {
        &self.sets
    }

    pub fn is_waiting_next_level(&self) -> bool {
        self.wait_next
    }

    fn requester_tag(&self) -> Requester {
        Requester::Cache(self.level)
    }

    fn normalize(&self, address: u32) -> u32 {
        match self.lower.size_words() {
            0 => address,
            size => address % size,
        }
    }

    pub fn get_offset(&self, address: u32) -> usize {
        address as usize % self.policy.words_per_line
    }

    pub fn get_index(&self, address: u32) -> usize {
        (address as usize / self.policy.words_per_line) % self.policy.sets
    }

    pub fn get_tag(&self, address: u32) -> u32 {
        (address as usize / (self.policy.words_per_line * self.policy.sets))
            as u32
    }

    /// Returns (index, way) of the valid line holding `address`
    pub fn lookup(&self, address: u32) -> Option<(usize, usize)> {
        if self.policy.is_bypassed() {
            return None;
        }
        let index = self.get_index(address);
        let tag = self.get_tag(address);
        self.sets[index]
            .iter()
            .position(|line| line.valid && line.tag == tag)
            .map(|way| (index, way))
    }

    pub fn is_in_cache(&self, address: u32) -> bool {
        self.lookup(self.normalize(address)).is_some()
    }

    /// The way holding the largest LRU rank
    pub fn get_way_to_replace(&self, index: usize) -> usize {
        let mut victim = 0;
        for (way, line) in self.sets[index].iter().enumerate() {
            if line.lru > self.sets[index][victim].lru {
                victim = way;
            }
        }
        victim
    }

    /// Makes `way` the most recently used line of its set
    fn touch(&mut self, index: usize, way: usize) {
        let set = &mut self.sets[index];
        let rank = set[way].lru;
        if rank == 0 {
            return;
        }
        for line in set.iter_mut() {
            if line.lru < rank {
                line.lru += 1;
            }
        }
        set[way].lru = 0;
    }

    /// Services `who` until the line holding `address` is resident
    fn locate_line(
        &mut self,
        address: u32,
        who: Requester,
    ) -> Result<LineAccess, MemoryError> {
        if !self.state.service(who) {
            return Ok(LineAccess::Pending(MemoryState::Wait));
        }
        if let Some((index, way)) = self.lookup(address) {
            return Ok(LineAccess::Ready { index, way });
        }

        self.missed = true;
        let words = self.policy.words_per_line;
        let offset = self.get_offset(address);
        let below = self.requester_tag();
        let fill = self.lower.read_multi(address, words, offset, below)?;
        if fill.state.is_waiting() {
            self.wait_next = true;
            return Ok(LineAccess::Pending(MemoryState::WaitNextLevel));
        }
        if fill.line.len() != words {
            return Err(MemoryError::InvalidState(
                "lower level returned a line of the wrong length",
            ));
        }
        self.wait_next = false;

        let index = self.get_index(address);
        let way = self.get_way_to_replace(index);
        let tag = self.get_tag(address);
        debug!(
            "L{} fill: address {:#x} into set {} way {}",
            self.level, address, index, way
        );
        let line = &mut self.sets[index][way];
        line.valid = true;
        line.tag = tag;
        line.data = fill.line;
        Ok(LineAccess::Ready { index, way })
    }

    /// Completes the current request and frees the slot
    fn finish(&mut self) {
        if self.missed {
            self.history.num_miss += 1;
        } else {
            self.history.num_hit += 1;
        }
        self.state.release();
        self.wait_next = false;
        self.missed = false;
    }

    /// Computes the current miss rate of the cache
    pub fn get_miss_rate(&self) -> f64 {
        let total = self.history.num_hit + self.history.num_miss;
        if total == 0 {
            return 0.;
        }
        self.history.num_miss as f64 / total as f64
    }
}

impl<L: StorageInterface> StorageInterface for Cache<L> {
    fn read(
        &mut self,
        address: u32,
        who: Requester,
    ) -> Result<ReadResult, MemoryError> {
        if self.policy.is_bypassed() {
            return self.lower.read(address, who);
        }
        let address = self.normalize(address);
        match self.locate_line(address, who)? {
            LineAccess::Pending(state) => Ok(ReadResult::waiting(state)),
            LineAccess::Ready { index, way } => {
                self.touch(index, way);
                let value = self.sets[index][way].data[self.get_offset(address)];
                self.finish();
                Ok(ReadResult::success(value))
            }
        }
    }

    fn read_multi(
        &mut self,
        address: u32,
        words: usize,
        offset: usize,
        who: Requester,
    ) -> Result<LineResult, MemoryError> {
        if self.policy.is_bypassed() {
            return self.lower.read_multi(address, words, offset, who);
        }
        let address = self.normalize(address);
        let own_offset = self.get_offset(address);
        if words == 0
            || offset >= words
            || offset > own_offset
            || own_offset - offset + words > self.policy.words_per_line
        {
            return Err(MemoryError::InvalidState(
                "requested line does not fit in one cache line",
            ));
        }
        match self.locate_line(address, who)? {
            LineAccess::Pending(state) => Ok(LineResult::waiting(state)),
            LineAccess::Ready { index, way } => {
                self.touch(index, way);
                let start = own_offset - offset;
                let line = self.sets[index][way].data[start..start + words].to_vec();
                self.finish();
                Ok(LineResult::success(line))
            }
        }
    }

    fn write(
        &mut self,
        address: u32,
        who: Requester,
        value: u32,
    ) -> Result<WriteResult, MemoryError> {
        if self.policy.is_bypassed() {
            return self.lower.write(address, who, value);
        }
        let address = self.normalize(address);
        let (index, way) = match self.locate_line(address, who)? {
            LineAccess::Pending(state) => return Ok(WriteResult::waiting(state)),
            LineAccess::Ready { index, way } => (index, way),
        };

        // The cached copy changes only once the level below has it
        let tag = self.requester_tag();
        let through = self.lower.write(address, tag, value)?;
        if through.state.is_waiting() {
            self.wait_next = true;
            return Ok(WriteResult::waiting(MemoryState::WaitNextLevel));
        }
        let offset = self.get_offset(address);
        self.sets[index][way].data[offset] = value;
        self.touch(index, way);
        self.finish();
        Ok(WriteResult::success(value))
    }

    fn cancel(&mut self, who: Requester) {
        if self.policy.is_bypassed() {
            self.lower.cancel(who);
            return;
        }
        if self.state.cancel(who) {
            self.wait_next = false;
            self.missed = false;
            let tag = self.requester_tag();
            self.lower.cancel(tag);
        }
    }

    fn size_words(&self) -> u32 {
        self.lower.size_words()
    }

    fn request_state(&self) -> RequestState {
        if self.policy.is_bypassed() {
            return self.lower.request_state();
        }
        self.state
    }

    fn peek(&self, address: u32) -> u32 {
        let address = self.normalize(address);
        match self.lookup(address) {
            Some((index, way)) => self.sets[index][way].data[self.get_offset(address)],
            None => self.lower.peek(address),
        }
    }
}

impl<L: StorageInterface> fmt::Display for Cache<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.policy.is_bypassed() {
            return writeln!(f, "L{} cache bypassed", self.level);
        }
        writeln!(
            f,
            "L{} cache: {} sets x {} ways x {} words, {:?}",
            self.level,
            self.policy.sets,
            self.policy.ways,
            self.policy.words_per_line,
            self.history
        )?;
        for (index, set) in self.sets.iter().enumerate() {
            for (way, line) in set.iter().enumerate().filter(|(_, l)| l.valid) {
                writeln!(
                    f,
                    "  set {:>2} way {} tag {:#x} lru {}: {:x?}",
                    index, way, line.tag, line.lru, line.data
                )?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheLine {
    pub valid: bool,
    pub tag: u32,
    pub data: Vec<u32>,
    pub lru: usize,
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct CacheHistory {
    pub num_hit: u64,
    pub num_miss: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    pub sets: usize,
    pub ways: usize,
    pub words_per_line: usize,

    /// Service latency in cycles
    pub delay: u32,
}

impl Default for CachePolicy {
    /// 8 sets, 2 ways, 4 words per line, no extra latency
    fn default() -> Self {
        Self::make(8, 2, 4, 0)
    }
}

impl CachePolicy {
    pub fn make(sets: usize, ways: usize, words_per_line: usize, delay: u32) -> Self {
        Self { sets, ways, words_per_line, delay }
    }

    /// A geometry that sends every access straight to the lower level
    pub fn disabled() -> Self {
        Self::make(0, 0, 0, 0)
    }

    pub fn is_bypassed(&self) -> bool {
        self.sets == 0 || self.ways == 0 || self.words_per_line == 0
    }

    pub fn is_valid(&self) -> bool {
        if self.is_bypassed() {
            return true;
        }
        // Set count and line length must be powers of 2
        self.sets.is_power_of_two() && self.words_per_line.is_power_of_two()
    }
}
