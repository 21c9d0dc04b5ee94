//! Single-lane flash emulation

use alloc::vec::Vec;

use flashsim_core::bus::{SdrBusDevice, SdrWires};
use flashsim_core::config::SdrConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Command,
    Address,
    Data,
}

/// In-memory single-lane flash chip.
///
/// Decodes the command and address MSB-first from COPI on protocol-clock
/// rising edges, then serves payload bits on falling edges so they are
/// stable for the controller's sampling edge (CPHA=1). The payload repeats
/// modulo its length. Decoded opcodes and addresses are recorded for test
/// assertions.
#[derive(Debug)]
pub struct DummySdrFlash {
    cfg: SdrConfig,
    payload: Vec<u8>,
    state: State,
    prev_sclk: bool,
    command: u32,
    command_bits: u32,
    address: u32,
    address_bits: u32,
    index: usize,
    current_bit: i32,
    cipo: bool,
    commands: Vec<u32>,
    addresses: Vec<u32>,
    protocol_faults: usize,
}

impl DummySdrFlash {
    /// Create a chip serving `payload`, which must not be empty.
    pub fn new(cfg: SdrConfig, payload: Vec<u8>) -> Self {
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
            current_bit: 7,
            cipo: false,
            commands: Vec::new(),
            addresses: Vec::new(),
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

    /// Observed protocol violations (unexpected opcodes).
    pub fn protocol_faults(&self) -> usize {
        self.protocol_faults
    }
}

impl SdrBusDevice for DummySdrFlash {
    fn edge(&mut self, wires: &SdrWires) -> bool {
        let rising = wires.sclk && !self.prev_sclk;
        let falling = !wires.sclk && self.prev_sclk;
        self.prev_sclk = wires.sclk;

        // Chip-select is active-low; deassertion aborts any frame.
        if wires.cs_n {
            self.state = State::Idle;
            return self.cipo;
        }

        match self.state {
            State::Idle => {
                self.command = 0;
                self.command_bits = 0;
                self.address = 0;
                self.address_bits = 0;
                self.current_bit = 7;

                if rising {
                    self.command = wires.copi as u32;
                    self.command_bits = 1;
                    self.state = State::Command;
                    self.finish_command_if_complete();
                }
            }
            State::Command => {
                if rising {
                    self.command = (self.command << 1) | wires.copi as u32;
                    self.command_bits += 1;
                    self.finish_command_if_complete();
                }
            }
            State::Address => {
                if rising {
                    self.address = (self.address << 1) | wires.copi as u32;
                    self.address_bits += 1;
                    if self.address_bits == self.cfg.address_width {
                        self.addresses.push(self.address);
                        self.index = self.address as usize % self.payload.len();
                        self.state = State::Data;
                    }
                }
            }
            State::Data => {
                // Shift data out on the falling edge so it is stable when
                // the controller samples on the rising edge.
                if falling {
                    self.cipo = (self.payload[self.index] >> self.current_bit) & 1 != 0;
                    self.current_bit -= 1;
                    if self.current_bit < 0 {
                        self.index = (self.index + 1) % self.payload.len();
                        self.current_bit = 7;
                    }
                }
            }
        }

        self.cipo
    }
}

impl DummySdrFlash {
    fn finish_command_if_complete(&mut self) {
        if self.command_bits == self.cfg.command_width {
            self.commands.push(self.command);
            if self.command != self.cfg.read_opcode {
                log::warn!("dummy sdr flash: unexpected opcode 0x{:X}", self.command);
                self.protocol_faults += 1;
            }
            self.state = State::Address;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{expected_bytes, Lcg};
    use flashsim_core::reader::{read_into, SdrReader};

    fn seeded_payload() -> Vec<u8> {
        Lcg::new(0x5EED_BEEF).bytes(1024)
    }

    #[test]
    fn test_read_observed_wire_protocol() {
        let cfg = SdrConfig {
            command_width: 8,
            address_width: 24,
            read_opcode: 0x03,
        };
        let payload = seeded_payload();
        let dev = DummySdrFlash::new(cfg, payload.clone());
        let mut reader: SdrReader<_, 8> = SdrReader::new(cfg, dev).unwrap();

        let mut out = [0u8; 4];
        let n = read_into(&mut reader, 0x001234, &mut out).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&out[..], &expected_bytes(&payload, 0x001234, 4)[..]);

        let dev = reader.device();
        assert_eq!(dev.commands(), &[0x03]);
        assert_eq!(dev.addresses(), &[0x001234]);
        assert_eq!(dev.protocol_faults(), 0);
    }

    #[test]
    fn test_repeated_reads_are_idempotent() {
        let payload = seeded_payload();
        let dev = DummySdrFlash::new(SdrConfig::default(), payload.clone());
        let mut reader: SdrReader<_, 8> = SdrReader::new(SdrConfig::default(), dev).unwrap();

        let address = 0x00ABCD;
        let expected = expected_bytes(&payload, address, 8);
        for _ in 0..5 {
            let mut out = [0u8; 8];
            assert_eq!(read_into(&mut reader, address, &mut out).unwrap(), 8);
            assert_eq!(&out[..], &expected[..]);
        }
        assert_eq!(reader.device().commands(), &[0x03; 5]);
    }

    #[test]
    fn test_reads_wrap_modulo_payload_length() {
        let payload = seeded_payload();
        let dev = DummySdrFlash::new(SdrConfig::default(), payload.clone());
        let mut reader: SdrReader<_, 8> = SdrReader::new(SdrConfig::default(), dev).unwrap();

        // 1020 % 1024 leaves only 4 bytes before the wrap
        let mut out = [0u8; 8];
        read_into(&mut reader, 1020, &mut out).unwrap();
        assert_eq!(&out[..], &expected_bytes(&payload, 1020, 8)[..]);
        assert_eq!(out[4], payload[0]);
    }

    #[test]
    fn test_random_addresses_roundtrip() {
        let mut rng = Lcg::new(0xA11A_D12E);
        let payload = seeded_payload();
        let dev = DummySdrFlash::new(SdrConfig::default(), payload.clone());
        let mut reader: SdrReader<_, 8> = SdrReader::new(SdrConfig::default(), dev).unwrap();

        for _ in 0..10 {
            let address = rng.below(1 << 24);
            let mut out = [0u8; 8];
            read_into(&mut reader, address, &mut out).unwrap();
            assert_eq!(&out[..], &expected_bytes(&payload, address, 8)[..]);
        }
        assert_eq!(reader.device().protocol_faults(), 0);
    }
}
