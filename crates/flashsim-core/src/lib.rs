//! flashsim-core - Cycle-accurate serial-flash read controllers
//!
//! This crate reimplements the read protocol of an external SPI flash
//! device as deterministic clocked automata: a single-data-rate single-lane
//! controller, a double-data-rate quad-lane controller with a
//! reset/configure handshake, buffering read-request wrappers, and a
//! depth-2 clock-domain-crossing queue. Every component advances exactly
//! once per driving-clock edge from its previous state and that edge's
//! inputs, reproducing the original hardware's bit stream and timing
//! exactly.
//!
//! # Features
//!
//! - `std` - Enable standard library support (`std::error::Error` impls)
//! - `serde` - Serde derives on the configuration types
//!
//! # Example
//!
//! ```ignore
//! use flashsim_core::config::SdrConfig;
//! use flashsim_core::reader::{read_into, SdrReader};
//!
//! let mut reader: SdrReader<_, 8> = SdrReader::new(SdrConfig::default(), device)?;
//! let mut buf = [0u8; 8];
//! let n = read_into(&mut reader, 0x001234, &mut buf)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod bus;
pub mod cdc;
pub mod clock;
pub mod config;
pub mod dtr;
pub mod error;
pub mod opcodes;
pub mod reader;
pub mod sdr;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod testutil {
    /// Small deterministic generator for randomized test coverage.
    pub struct Lcg(u32);

    impl Lcg {
        pub fn new(seed: u32) -> Self {
            Self(seed)
        }

        pub fn next_u32(&mut self) -> u32 {
            self.0 = self.0.wrapping_mul(1664525).wrapping_add(1013904223);
            self.0
        }

        /// Uniform-ish value in `0..n`.
        pub fn below(&mut self, n: u32) -> u32 {
            self.next_u32() % n
        }
    }
}
