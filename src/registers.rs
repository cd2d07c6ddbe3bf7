//! Register bank and address map
//!
//! The chip is programmed through two banks of 256 byte-wide
//! registers; bank selection is bit 8 of the address. The bank is the
//! single source of truth: every derived quantity elsewhere in the
//! crate is a cache recomputed when a register changes.

use bitflags::bitflags;

/// Total addressable register slots (two banks of 256)
pub const REGISTER_COUNT: usize = 512;

/// Operators addressed per bank
pub(crate) const OPERATORS_PER_BANK: usize = 18;

// Per-operator register group bases within a bank.
pub(crate) const AM_VIB_EGT_KSR_MULT_BASE: usize = 0x20;
pub(crate) const KSL_TL_BASE: usize = 0x40;
pub(crate) const AR_DR_BASE: usize = 0x60;
pub(crate) const SL_RR_BASE: usize = 0x80;
pub(crate) const WS_BASE: usize = 0xE0;

// Per-channel register group bases within a bank.
pub(crate) const FNUML_BASE: usize = 0xA0;
pub(crate) const KON_BLOCK_FNUMH_BASE: usize = 0xB0;
pub(crate) const CHD_CHC_CHB_CHA_FB_CNT_BASE: usize = 0xC0;

// Global control registers.
pub(crate) const NOTE_SELECT_OFFSET: usize = 0x08; // bank 0, bit 6
pub(crate) const RHYTHM_OFFSET: usize = 0xBD; // bank 0
pub(crate) const CONNECTION_SELECT_OFFSET: usize = 0x04; // bank 1
pub(crate) const NEW_OFFSET: usize = 0x05; // bank 1

/// Map a per-operator register offset (relative to its group base) to
/// a dense operator slot.
///
/// The hardware leaves gaps: offsets 0x06-0x07 and 0x0E-0x0F address
/// nothing.
pub(crate) fn operator_slot(offset: usize) -> Option<usize> {
    match offset {
        0x00..=0x05 => Some(offset),
        0x08..=0x0D => Some(offset - 2),
        0x10..=0x15 => Some(offset - 4),
        _ => None,
    }
}

bitflags! {
    /// Rhythm control register (bank 0, address 0xBD)
    ///
    /// Besides rhythm mode and the five percussion key-on bits, this
    /// register selects the depth of the two chip-wide LFOs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RhythmControl: u8 {
        /// DAM: deep tremolo (-4.8 dB instead of -1 dB)
        const TREMOLO_DEPTH = 0x80;
        /// DVB: deep vibrato (14 cents instead of 7)
        const VIBRATO_DEPTH = 0x40;
        /// Repurpose channels 6-8 as percussion voices
        const RHYTHM_MODE = 0x20;
        /// Bass drum key-on
        const BASS_DRUM = 0x10;
        /// Snare drum key-on
        const SNARE_DRUM = 0x08;
        /// Tom tom key-on
        const TOM_TOM = 0x04;
        /// Top cymbal key-on
        const TOP_CYMBAL = 0x02;
        /// High hat key-on
        const HIGH_HAT = 0x01;
    }
}

bitflags! {
    /// Output bus enables from the channel C0 register (bits 4-7)
    ///
    /// Only honored in extended mode; legacy mode mirrors the mono
    /// output onto all four buses.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OutputBuses: u8 {
        /// Bus A (summed into the left output)
        const A = 0x10;
        /// Bus B (summed into the right output)
        const B = 0x20;
        /// Bus C (summed into the left output)
        const C = 0x40;
        /// Bus D (summed into the right output)
        const D = 0x80;
    }
}

/// Raw register bank: two banks of 256 byte-wide registers
#[derive(Debug, Clone)]
pub struct RegisterBank {
    registers: [u8; REGISTER_COUNT],
}

impl RegisterBank {
    /// Create a bank with all registers zeroed
    pub fn new() -> Self {
        Self {
            registers: [0; REGISTER_COUNT],
        }
    }

    /// Read a register value
    #[inline]
    pub fn read(&self, address: usize) -> u8 {
        debug_assert!(address < REGISTER_COUNT);
        self.registers[address]
    }

    /// Write a register value
    #[inline]
    pub fn write(&mut self, address: usize, value: u8) {
        debug_assert!(address < REGISTER_COUNT);
        self.registers[address] = value;
    }

    /// Zero every register
    pub fn reset(&mut self) {
        self.registers = [0; REGISTER_COUNT];
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_bank_read_write() {
        let mut bank = RegisterBank::new();
        assert_eq!(bank.read(0x00), 0);
        bank.write(0x1A0, 0x42);
        assert_eq!(bank.read(0x1A0), 0x42);
        bank.reset();
        assert_eq!(bank.read(0x1A0), 0);
    }

    #[test]
    fn test_operator_slot_decode() {
        assert_eq!(operator_slot(0x00), Some(0));
        assert_eq!(operator_slot(0x05), Some(5));
        assert_eq!(operator_slot(0x06), None);
        assert_eq!(operator_slot(0x07), None);
        assert_eq!(operator_slot(0x08), Some(6));
        assert_eq!(operator_slot(0x0D), Some(11));
        assert_eq!(operator_slot(0x0E), None);
        assert_eq!(operator_slot(0x10), Some(12));
        assert_eq!(operator_slot(0x15), Some(17));
        assert_eq!(operator_slot(0x16), None);
    }

    #[test]
    fn test_rhythm_control_decode() {
        let flags = RhythmControl::from_bits_truncate(0x25);
        assert!(flags.contains(RhythmControl::RHYTHM_MODE));
        assert!(flags.contains(RhythmControl::TOM_TOM));
        assert!(flags.contains(RhythmControl::HIGH_HAT));
        assert!(!flags.contains(RhythmControl::BASS_DRUM));
    }
}
