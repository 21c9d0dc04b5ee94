//! Quad-lane DTR flash emulation

use alloc::vec::Vec;

use flashsim_core::bus::{Lanes, QuadBusDevice, QuadWires};
use flashsim_core::config::DtrConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Command,
    Address,
    Mode,
    Dummy,
    Data,
}

/// In-memory quad-lane DTR flash chip.
///
/// Tracks the reset-enable/reset handshake (each opcode must be followed by
/// a chip-select deassertion, and reset must follow reset-enable), decodes
/// the read address at a nibble per half clock, checks the mode byte and
/// the lane directionality in every phase, and serves payload nibbles on
/// both clock edges, wrapping modulo the payload length.
///
/// Everything observed on the wires is recorded: decoded opcodes and
/// addresses, output-enable faults, protocol faults, chip-select idle gaps
/// and the dummy half-clocks preceding each data phase.
#[derive(Debug)]
pub struct DummyQuadFlash {
    cfg: DtrConfig,
    payload: Vec<u8>,
    state: State,
    prev_sclk: bool,
    command: u32,
    command_bits: u32,
    address: u32,
    address_bits: u32,
    index: usize,
    dummy_halves: u32,
    reset_pending: bool,
    io: u8,
    seen_select: bool,
    gap_run: u32,
    commands: Vec<u32>,
    addresses: Vec<u32>,
    cs_gaps: Vec<u32>,
    dummy_halves_seen: Vec<u32>,
    oe_faults: usize,
    protocol_faults: usize,
}

impl DummyQuadFlash {
    /// Create a chip serving `payload`, which must not be empty.
    pub fn new(cfg: DtrConfig, payload: Vec<u8>) -> Self {
        assert!(!payload.is_empty());
        Self {
            cfg,
            payload,
            state: State::Idle,
            prev_sclk: true,
            command: 0,
            command_bits: 0,
            address: 0,
            address_bits: 0,
            index: 0,
            dummy_halves: 0,
            reset_pending: false,
            io: 0,
            seen_select: false,
            gap_run: 0,
            commands: Vec::new(),
            addresses: Vec::new(),
            cs_gaps: Vec::new(),
            dummy_halves_seen: Vec::new(),
            oe_faults: 0,
            protocol_faults: 0,
        }
    }

    /// The backing payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Opcodes decoded from the wire, in order.
    pub fn commands(&self) -> &[u32] {
        &self.commands
    }

    /// Addresses decoded from the wire, in order (before the modulo wrap).
    pub fn addresses(&self) -> &[u32] {
        &self.addresses
    }

    /// Lengths of the chip-select idle gaps observed between frames,
    /// counted in driving-clock edges.
    pub fn cs_gaps(&self) -> &[u32] {
        &self.cs_gaps
    }

    /// Dummy half-clocks observed before each data phase.
    pub fn dummy_halves_seen(&self) -> &[u32] {
        &self.dummy_halves_seen
    }

    /// Edges on which the controller drove lanes it should have released,
    /// or released lanes it should have driven.
    pub fn oe_faults(&self) -> usize {
        self.oe_faults
    }

    /// Sequencing violations: unexpected opcodes, reset ordering, non-zero
    /// mode bits, or a missing chip-select deassertion after a reset opcode.
    pub fn protocol_faults(&self) -> usize {
        self.protocol_faults
    }

    fn finish_command(&mut self, at_deselect: bool) {
        self.commands.push(self.command);
        if self.command == self.cfg.reset_enable_opcode {
            // Must be followed immediately by a chip-select deassertion,
            // and must not repeat without an intervening reset.
            if self.reset_pending || !at_deselect {
                self.protocol_faults += 1;
            }
            self.reset_pending = true;
            self.state = State::Idle;
        } else if self.command == self.cfg.reset_opcode {
            if !self.reset_pending || !at_deselect {
                self.protocol_faults += 1;
            }
            self.reset_pending = false;
            self.state = State::Idle;
        } else if self.command == self.cfg.read_opcode {
            if self.reset_pending || at_deselect {
                self.protocol_faults += 1;
            }
            self.state = if at_deselect { State::Idle } else { State::Address };
        } else {
            log::warn!("dummy quad flash: unexpected opcode 0x{:X}", self.command);
            self.protocol_faults += 1;
            self.state = State::Idle;
        }
    }
}

impl QuadBusDevice for DummyQuadFlash {
    fn edge(&mut self, wires: &QuadWires) -> u8 {
        let rising = wires.sclk && !self.prev_sclk;
        let falling = !wires.sclk && self.prev_sclk;
        self.prev_sclk = wires.sclk;

        // Chip-select is active-low. Reset opcodes are framed by the
        // deassertion itself, so a complete command is closed out here.
        if wires.cs_n {
            if self.state == State::Command && self.command_bits == self.cfg.command_width {
                self.finish_command(true);
            }
            if self.seen_select {
                self.gap_run += 1;
            }
            self.state = State::Idle;
            return self.io;
        }
        if self.seen_select && self.gap_run > 0 {
            self.cs_gaps.push(self.gap_run);
            self.gap_run = 0;
        }
        self.seen_select = true;

        match self.state {
            State::Idle => {
                self.command = 0;
                self.command_bits = 0;
                self.address = 0;
                self.address_bits = 0;
                self.dummy_halves = 0;

                if rising {
                    if !wires.oe.contains(Lanes::IO0) {
                        self.oe_faults += 1;
                    }
                    self.command = u32::from(wires.io_out & 1);
                    self.command_bits = 1;
                    self.state = State::Command;
                }
            }
            State::Command => {
                if rising {
                    if !wires.oe.contains(Lanes::IO0) {
                        self.oe_faults += 1;
                    }
                    self.command = (self.command << 1) | u32::from(wires.io_out & 1);
                    self.command_bits += 1;
                }
                // A read command stays selected and continues with the
                // address on the next edge; reset commands never get here
                // because chip-select drops first.
                if falling && self.command_bits == self.cfg.command_width {
                    self.finish_command(false);
                }
            }
            State::Address => {
                // One nibble per half clock, MSB nibble first
                if rising || falling {
                    if wires.oe != Lanes::all() {
                        self.oe_faults += 1;
                    }
                    self.address = (self.address << 4) | u32::from(wires.io_out & 0xF);
                    self.address_bits += 4;
                    if self.address_bits == self.cfg.address_width {
                        self.addresses.push(self.address);
                        self.index = self.address as usize % self.payload.len();
                        self.state = State::Mode;
                    }
                }
            }
            State::Mode => {
                if rising || falling {
                    if wires.oe != Lanes::all() {
                        self.oe_faults += 1;
                    }
                    if wires.io_out & 0xF != 0 {
                        // Non-zero mode bits would arm continuous read
                        self.protocol_faults += 1;
                    }
                }
                // 8 mode bits: entered on a falling edge, left on the next
                if falling {
                    self.state = State::Dummy;
                    self.dummy_halves = 0;
                }
            }
            State::Dummy => {
                if rising {
                    if !wires.oe.is_empty() {
                        self.oe_faults += 1;
                    }
                    self.dummy_halves += 1;
                }
                // The first dummy cycle overlapped the mode bits
                if falling && self.dummy_halves == self.cfg.dummy_cycles - 1 {
                    if !wires.oe.is_empty() {
                        self.oe_faults += 1;
                    }
                    self.dummy_halves_seen.push(self.dummy_halves);
                    self.io = self.payload[self.index] >> 4;
                    self.state = State::Data;
                }
            }
            State::Data => {
                if !wires.oe.is_empty() {
                    self.oe_faults += 1;
                }
                if rising {
                    self.io = self.payload[self.index] & 0xF;
                    self.index = (self.index + 1) % self.payload.len();
                }
                if falling {
                    self.io = self.payload[self.index] >> 4;
                }
            }
        }

        self.io
    }
}
