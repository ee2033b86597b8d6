//! Memory structure

pub mod cache;
pub mod ram;

use crate::error::MemoryError;

/// Identifies the party a memory service is currently working for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requester {
    Fetch,
    Memory,
    /// A cache requesting from its lower level, tagged by its level
    Cache(u8),
}

/// Outcome of one call into a memory service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryState {
    Success,
    /// This level is busy or still counting down its latency
    Wait,
    /// This level is waiting on the level below it
    WaitNextLevel,
}

impl MemoryState {
    pub fn is_waiting(self) -> bool {
        self != MemoryState::Success
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadResult {
    pub state: MemoryState,
    pub value: u32,
}

impl ReadResult {
    pub fn success(value: u32) -> Self {
        Self { state: MemoryState::Success, value }
    }

    pub fn waiting(state: MemoryState) -> Self {
        Self { state, value: 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineResult {
    pub state: MemoryState,
    pub line: Vec<u32>,
}

impl LineResult {
    pub fn success(line: Vec<u32>) -> Self {
        Self { state: MemoryState::Success, line }
    }

    pub fn waiting(state: MemoryState) -> Self {
        Self { state, line: Vec::new() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteResult {
    pub state: MemoryState,
    pub written: u32,
}

impl WriteResult {
    pub fn success(written: u32) -> Self {
        Self { state: MemoryState::Success, written }
    }

    pub fn waiting(state: MemoryState) -> Self {
        Self { state, written: 0 }
    }
}

/// Single-requester arbitration with a fixed service latency.
///
/// The first call from an idle service latches the caller and loads the
/// latency counter. Every later call from the same caller counts it down;
/// the call that finds it at zero may complete. Calls from anyone else are
/// refused without touching the state. With a delay of `d` cycles a request
/// completes on its `d + 1`-th call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestState {
    pub requester: Option<Requester>,
    pub cycles_left: u32,
    pub delay: u32,
}

impl RequestState {
    pub fn new(delay: u32) -> Self {
        Self { requester: None, cycles_left: 0, delay }
    }

    /// Returns true once `who` may be served
    pub fn service(&mut self, who: Requester) -> bool {
        match self.requester {
            None => {
                self.requester = Some(who);
                self.cycles_left = self.delay;
            }
            Some(current) if current != who => return false,
            Some(_) => {}
        }

        if self.cycles_left > 0 {
            self.cycles_left -= 1;
            return false;
        }
        true
    }

    pub fn release(&mut self) {
        self.requester = None;
        self.cycles_left = 0;
    }

    /// Drops the request of `who`, if it holds the slot
    pub fn cancel(&mut self, who: Requester) -> bool {
        if self.requester == Some(who) {
            self.release();
            return true;
        }
        false
    }

    pub fn is_busy(&self) -> bool {
        self.requester.is_some()
    }
}

/// Memory interface shared by every level of the hierarchy
pub trait StorageInterface {
    /// Reads one word
    fn read(
        &mut self,
        address: u32,
        who: Requester,
    ) -> Result<ReadResult, MemoryError>;

    /// Reads `words` consecutive words starting at `address - offset`
    fn read_multi(
        &mut self,
        address: u32,
        words: usize,
        offset: usize,
        who: Requester,
    ) -> Result<LineResult, MemoryError>;

    /// Writes one word
    fn write(
        &mut self,
        address: u32,
        who: Requester,
        value: u32,
    ) -> Result<WriteResult, MemoryError>;

    /// Abandons the outstanding request of `who`
    fn cancel(&mut self, who: Requester);

    /// Number of addressable words behind this level
    fn size_words(&self) -> u32;

    /// Current arbitration state of this level
    fn request_state(&self) -> RequestState;

    /// Untimed read of the value a load would observe
    fn peek(&self, address: u32) -> u32;

    fn is_busy(&self) -> bool {
        self.request_state().is_busy()
    }
}
