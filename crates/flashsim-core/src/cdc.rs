//! Clock-domain-crossing queue
//!
//! When the protocol engine's clock is derived independently from the
//! requester's clock, every value crossing the boundary goes through a
//! depth-2 valid/ready handshake queue; any other crossing signal is
//! undefined. The hardware's metastability-hardening synchronizer has no
//! software meaning, so it is modeled as a fixed settle delay: an entry
//! becomes visible to the consumer only after two consumer-domain ticks.
//! Depth 2 absorbs that latency without stalling steady-state throughput.
//!
//! [`CdcReadBridge`] is the engine-domain half of a cross-domain read: it
//! pops one request at a time, runs the host poll protocol against a
//! [`ReadPort`], and pushes a completion back across. The timeout outcome
//! crosses the same way, so even the fault path goes through the queue.

use heapless::Deque;

use crate::reader::{ReadPort, READ_DONE_TIMEOUT};

/// Consumer-domain ticks an entry needs to settle before it may be popped,
/// matching the two-stage synchronizer of the original hardware.
pub const SYNC_STAGES: u8 = 2;

#[derive(Debug)]
struct Slot<T> {
    value: T,
    settle: u8,
}

/// Depth-2 handshake queue moving values between two clock domains.
///
/// The producer side calls [`try_push`](Self::try_push) and stalls (keeps
/// the value) while the queue is full; the consumer side calls
/// [`tick`](Self::tick) once per consumer-domain edge and
/// [`try_pop`](Self::try_pop), which stalls while the queue is empty or the
/// head entry has not settled. Entries are never reordered or duplicated.
#[derive(Debug)]
pub struct CdcFifo<T> {
    slots: Deque<Slot<T>, 2>,
}

impl<T> CdcFifo<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            slots: Deque::new(),
        }
    }

    /// Number of in-flight entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the queue is at depth; the producer must stall.
    pub fn is_full(&self) -> bool {
        self.slots.is_full()
    }

    /// Producer-domain push. Returns the value back when the queue is full.
    pub fn try_push(&mut self, value: T) -> core::result::Result<(), T> {
        self.slots
            .push_back(Slot {
                value,
                settle: SYNC_STAGES,
            })
            .map_err(|slot| slot.value)
    }

    /// Consumer-domain clock edge: advance the settle pipeline.
    pub fn tick(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.settle = slot.settle.saturating_sub(1);
        }
    }

    /// Consumer-domain pop. Returns `None` while empty or while the head
    /// entry is still crossing.
    pub fn try_pop(&mut self) -> Option<T> {
        if self.slots.front().is_some_and(|slot| slot.settle == 0) {
            self.slots.pop_front().map(|slot| slot.value)
        } else {
            None
        }
    }
}

impl<T> Default for CdcFifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a cross-domain read, carried back through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The transfer finished and the buffer is quiescent.
    Done,
    /// "Read done" failed to deassert within the allowed edges.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BridgeState {
    Idle,
    WaitDone,
    Drain { edges: u32 },
    Complete { outcome: Completion },
}

/// Engine-domain driver for reads requested from another clock domain.
///
/// The requester pushes addresses with [`try_request`](Self::try_request)
/// and collects outcomes with [`poll_completion`](Self::poll_completion),
/// calling [`requester_tick`](Self::requester_tick) once per requester-domain
/// edge. The engine domain calls [`engine_tick`](Self::engine_tick) once per
/// engine-domain edge with the reader's host port; after a `Done` completion
/// the buffer is quiescent and may be read out through the port at arbitrary
/// latency.
#[derive(Debug)]
pub struct CdcReadBridge {
    requests: CdcFifo<u32>,
    completions: CdcFifo<Completion>,
    state: BridgeState,
}

impl CdcReadBridge {
    /// Create an idle bridge.
    pub fn new() -> Self {
        Self {
            requests: CdcFifo::new(),
            completions: CdcFifo::new(),
            state: BridgeState::Idle,
        }
    }

    /// Requester-domain: queue a read of `address`. Returns `false` (and
    /// does nothing) while the request queue is full.
    pub fn try_request(&mut self, address: u32) -> bool {
        self.requests.try_push(address).is_ok()
    }

    /// Requester-domain: collect a finished read's outcome, if one has
    /// crossed back.
    pub fn poll_completion(&mut self) -> Option<Completion> {
        self.completions.try_pop()
    }

    /// Requester-domain clock edge.
    pub fn requester_tick(&mut self) {
        self.completions.tick();
    }

    /// Engine-domain clock edge: advance the bridge state machine and the
    /// underlying assembly by one edge.
    pub fn engine_tick<P: ReadPort + ?Sized>(&mut self, port: &mut P) {
        self.requests.tick();

        match self.state {
            BridgeState::Idle => {
                if let Some(address) = self.requests.try_pop() {
                    log::debug!("cdc: starting read of 0x{:06X}", address);
                    port.set_address(address);
                    port.set_read(true);
                    self.state = BridgeState::WaitDone;
                }
            }
            BridgeState::WaitDone => {
                if port.read_done() {
                    port.set_read(false);
                    self.state = BridgeState::Drain { edges: 0 };
                }
            }
            BridgeState::Drain { edges } => {
                if !port.read_done() {
                    self.state = BridgeState::Complete {
                        outcome: Completion::Done,
                    };
                } else if edges >= READ_DONE_TIMEOUT {
                    log::warn!("cdc: read-done stuck, reporting timeout");
                    self.state = BridgeState::Complete {
                        outcome: Completion::TimedOut,
                    };
                } else {
                    self.state = BridgeState::Drain { edges: edges + 1 };
                }
            }
            BridgeState::Complete { outcome } => {
                // Stall here until the completion queue accepts the outcome.
                if self.completions.try_push(outcome).is_ok() {
                    self.state = BridgeState::Idle;
                }
            }
        }

        port.step();
    }
}

impl Default for CdcReadBridge {
    fn default() -> Self {
        Self::new()
    }
}
