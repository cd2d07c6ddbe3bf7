//! YMF262 (OPL3) FM synthesis chip emulator
//!
//! A sample-accurate emulation of the Yamaha YMF262 as found on
//! AdLib-compatible sound cards: 36 FM operators composed into 2- and
//! 4-operator voices, the cross-coupled percussion mode, and the
//! chip-wide tremolo and vibrato LFOs. The chip is driven entirely
//! through register writes and produces interleaved stereo samples at
//! its native rate of 49716 Hz.
//!
//! # Features
//! - Full two-bank register map with silent tolerance of reserved
//!   addresses, as real hardware behaves
//! - Measured envelope timing tables (exponential attack, linear
//!   decay/release) with key-scale-rate adjustment
//! - All eight waveforms, masked to the first four in legacy mode
//! - 4-operator channel merging with the four routing algorithms
//! - Rhythm mode with the five percussion voices and their documented
//!   phase cross-coupling
//! - Four output buses with per-channel routing for stereo panning
//! - Deterministic, seedable percussion noise
//!
//! # Crate feature flags
//! - `emulator` (default): core chip emulation
//! - `export-wav` (optional): WAV rendering via `hound`
//!
//! # Quick start
//! ```
//! use ymf262::Ymf262;
//!
//! let mut chip = Ymf262::new();
//!
//! // Program a two-operator voice on channel 0
//! chip.write_register(0x20, 0x21); // modulator: sustaining, mult 1
//! chip.write_register(0x23, 0x21); // carrier: sustaining, mult 1
//! chip.write_register(0x40, 0x18); // modulator level
//! chip.write_register(0x60, 0xF5); // attack/decay rates
//! chip.write_register(0x63, 0xF5);
//! chip.write_register(0x80, 0x77); // sustain/release
//! chip.write_register(0x83, 0x77);
//! chip.write_register(0xA0, 0x98); // f-number low byte
//! chip.write_register(0xB0, 0x31); // key on, block 4
//!
//! let mut buffer = vec![0.0f32; 1024];
//! chip.generate_samples(&mut buffer);
//! ```
//!
//! The emulator performs no resampling: callers running an output
//! device at another rate convert externally. Each [`Ymf262`] value is
//! fully self-contained, so independent chips (for example a
//! dual-chip stereo pair, see [`OplBank`]) never share state.

#![warn(missing_docs)]

pub mod chip;
pub mod chip_bank;
pub mod envelope;
pub mod noise;
pub mod operator;
pub mod phase;
pub mod registers;

mod channel;
mod tables;

#[cfg(feature = "export-wav")]
pub mod export;

/// Error type for chip emulator operations
///
/// The core emulation never fails at runtime; these errors only occur
/// on the optional I/O surfaces such as WAV export.
#[derive(thiserror::Error, Debug)]
pub enum Ymf262Error {
    /// IO error from the filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio file writing error
    #[error("audio file error: {0}")]
    AudioFile(String),
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, Ymf262Error>;

// Public API exports
pub use chip::{Ymf262, SAMPLE_RATE};
pub use chip_bank::OplBank;
pub use envelope::{EnvelopeGenerator, Stage};
pub use noise::NoiseGenerator;
pub use operator::Operator;
pub use phase::PhaseGenerator;
pub use registers::{OutputBuses, RegisterBank, RhythmControl};
