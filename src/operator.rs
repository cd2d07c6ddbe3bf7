//! FM operator
//!
//! One operator couples a phase generator, an envelope generator and a
//! waveform table lookup. Channels feed the output of one operator
//! into the phase of the next to build FM voices.
//!
//! The percussion voices reuse this struct with alternative output
//! functions: the top cymbal and high hat cross-read each other's
//! phase, and the snare drum runs at twice the high hat's phase. Their
//! cross-read inputs arrive as explicit parameters so the wiring is
//! visible at the call site.

use crate::chip::TickState;
use crate::envelope::{EnvelopeGenerator, Stage};
use crate::phase::PhaseGenerator;
use crate::tables::{self, WAVEFORM_LENGTH};

/// Modulation input for operators at the head of a chain
pub(crate) const NO_MODULATOR: f64 = 0.0;

/// A single FM operator: phase accumulator, envelope and waveform
#[derive(Clone, Debug)]
pub struct Operator {
    pub(crate) phase_generator: PhaseGenerator,
    pub(crate) envelope_generator: EnvelopeGenerator,

    // Register-mapped parameters
    pub(crate) am: bool,
    pub(crate) vib: bool,
    pub(crate) egt: bool,
    pub(crate) ksr: bool,
    pub(crate) mult: u8,
    pub(crate) ksl: u8,
    pub(crate) total_level: u8,
    pub(crate) attack_rate: u8,
    pub(crate) decay_rate: u8,
    pub(crate) sustain_level: u8,
    pub(crate) release_rate: u8,
    pub(crate) waveform_select: u8,

    // Derived from the owning channel's frequency registers
    pub(crate) key_scale_number: u8,
    pub(crate) f_number: u16,
    pub(crate) block: u8,

    // Linear gain of the last envelope value, kept for the noise
    // substitution paths
    envelope_gain: f64,
}

impl Operator {
    /// Create an operator matching the all-zero register state
    pub fn new() -> Self {
        Self {
            phase_generator: PhaseGenerator::new(),
            envelope_generator: EnvelopeGenerator::new(),
            am: false,
            vib: false,
            egt: false,
            ksr: false,
            mult: 0,
            ksl: 0,
            total_level: 0,
            attack_rate: 0,
            decay_rate: 0,
            sustain_level: 0,
            release_rate: 0,
            waveform_select: 0,
            key_scale_number: 0,
            f_number: 0,
            block: 0,
            envelope_gain: 0.0,
        }
    }

    /// Apply the AM/VIB/EGT/KSR/MULT register byte
    pub(crate) fn set_am_vib_egt_ksr_mult(&mut self, value: u8) {
        self.am = value & 0x80 != 0;
        self.vib = value & 0x40 != 0;
        self.egt = value & 0x20 != 0;
        self.ksr = value & 0x10 != 0;
        self.mult = value & 0x0F;
        self.phase_generator
            .set_frequency(self.f_number, self.block, self.mult);
        self.update_rates();
    }

    /// Apply the KSL/TL register byte
    pub(crate) fn set_ksl_tl(&mut self, value: u8) {
        self.ksl = value >> 6;
        self.total_level = value & 0x3F;
        self.envelope_generator.set_total_level(self.total_level);
        self.envelope_generator
            .set_key_scale_attenuation(self.f_number, self.block, self.ksl);
    }

    /// Apply the AR/DR register byte
    pub(crate) fn set_ar_dr(&mut self, value: u8) {
        self.attack_rate = value >> 4;
        self.decay_rate = value & 0x0F;
        self.envelope_generator
            .set_actual_attack_rate(self.attack_rate, self.ksr, self.key_scale_number);
        self.envelope_generator
            .set_actual_decay_rate(self.decay_rate, self.ksr, self.key_scale_number);
    }

    /// Apply the SL/RR register byte
    pub(crate) fn set_sl_rr(&mut self, value: u8) {
        self.sustain_level = value >> 4;
        self.release_rate = value & 0x0F;
        self.envelope_generator.set_sustain_level(self.sustain_level);
        self.envelope_generator
            .set_actual_release_rate(self.release_rate, self.ksr, self.key_scale_number);
    }

    /// Apply the waveform select register byte
    pub(crate) fn set_waveform(&mut self, value: u8) {
        self.waveform_select = value & 0x07;
    }

    /// Push new channel frequency parameters into the operator and
    /// recompute everything derived from them
    pub(crate) fn update_frequency(&mut self, key_scale_number: u8, f_number: u16, block: u8) {
        self.key_scale_number = key_scale_number;
        self.f_number = f_number;
        self.block = block;
        self.phase_generator
            .set_frequency(self.f_number, self.block, self.mult);
        self.envelope_generator
            .set_key_scale_attenuation(self.f_number, self.block, self.ksl);
        self.update_rates();
    }

    fn update_rates(&mut self) {
        self.envelope_generator
            .set_actual_attack_rate(self.attack_rate, self.ksr, self.key_scale_number);
        self.envelope_generator
            .set_actual_decay_rate(self.decay_rate, self.ksr, self.key_scale_number);
        self.envelope_generator
            .set_actual_release_rate(self.release_rate, self.ksr, self.key_scale_number);
    }

    /// Current envelope stage
    #[inline]
    pub(crate) fn stage(&self) -> Stage {
        self.envelope_generator.stage()
    }

    /// Compute one output sample with the given phase-modulation input
    ///
    /// Returns 0 without touching any state while the envelope is Off.
    pub(crate) fn output(&mut self, modulator: f64, tick: &TickState) -> f64 {
        if self.envelope_generator.stage() == Stage::Off {
            return 0.0;
        }
        let envelope_db = self
            .envelope_generator
            .advance(self.egt, self.am, tick.tremolo_db);
        self.envelope_gain = 10f64.powf(envelope_db / 10.0);
        let waveform = &tables::waveforms()[(self.waveform_select & tick.wave_mask) as usize];
        let phase = self.phase_generator.advance(self.vib, tick.vibrato);
        waveform_output(modulator, phase, waveform, self.envelope_gain)
    }

    /// Top cymbal voice output
    ///
    /// `high_hat_phase` is the high hat operator's current phase
    /// scaled by its own frequency multiplier.
    pub(crate) fn top_cymbal_output(&mut self, high_hat_phase: f64, tick: &TickState) -> f64 {
        self.cymbal_output(high_hat_phase, tick)
    }

    /// High hat voice output
    ///
    /// The same computation as the top cymbal with the roles reversed:
    /// `top_cymbal_phase` is the top cymbal operator's phase scaled by
    /// its multiplier. Exact zeros are replaced with noise.
    pub(crate) fn high_hat_output(
        &mut self,
        top_cymbal_phase: f64,
        noise: f64,
        tick: &TickState,
    ) -> f64 {
        let output = self.cymbal_output(top_cymbal_phase, tick);
        if output == 0.0 {
            noise * self.envelope_gain
        } else {
            output
        }
    }

    /// Snare drum voice output
    ///
    /// The phase is always twice the high hat operator's phase.
    /// Samples off the waveform extremes are replaced with noise
    /// carrying the sample's sign, then the result is doubled.
    pub(crate) fn snare_drum_output(
        &mut self,
        modulator: f64,
        high_hat_phase: f64,
        noise: f64,
        tick: &TickState,
    ) -> f64 {
        if self.envelope_generator.stage() == Stage::Off {
            return 0.0;
        }
        let envelope_db = self
            .envelope_generator
            .advance(self.egt, self.am, tick.tremolo_db);
        self.envelope_gain = 10f64.powf(envelope_db / 10.0);
        let waveform = &tables::waveforms()[(self.waveform_select & tick.wave_mask) as usize];
        let phase = (high_hat_phase * 2.0) % 1.0;
        let mut output = waveform_output(modulator, phase, waveform, self.envelope_gain);
        if output.abs() != self.envelope_gain {
            output = if output > 0.0 {
                noise * self.envelope_gain
            } else if output < 0.0 {
                -(noise * self.envelope_gain)
            } else {
                0.0
            };
        }
        output * 2.0
    }

    /// Shared cymbal computation used by the top cymbal and high hat
    fn cymbal_output(&mut self, external_phase: f64, tick: &TickState) -> f64 {
        let envelope_db = self
            .envelope_generator
            .advance(self.egt, self.am, tick.tremolo_db);
        self.envelope_gain = 10f64.powf(envelope_db / 10.0);
        let phase = self.phase_generator.advance(self.vib, tick.vibrato);
        let waveform = &tables::waveforms()[(self.waveform_select & tick.wave_mask) as usize];
        // The carrier runs at eight times the generated phase; only
        // the leading edge of each burst is let through.
        let carrier_phase = (8.0 * phase) % 1.0;
        let modulator_output =
            waveform_output(NO_MODULATOR, external_phase, waveform, self.envelope_gain);
        let mut carrier_output =
            waveform_output(modulator_output, carrier_phase, waveform, self.envelope_gain);
        let cycles = 4.0;
        if (carrier_phase * cycles) % cycles > 0.1 {
            carrier_output = 0.0;
        }
        carrier_output * 2.0
    }

    /// Key the operator on, restarting envelope and phase
    pub(crate) fn key_on(&mut self) {
        self.envelope_generator.key_on();
        if self.envelope_generator.stage() != Stage::Off {
            self.phase_generator.key_on();
        }
    }

    /// Key the operator off
    pub(crate) fn key_off(&mut self) {
        self.envelope_generator.key_off();
    }
}

impl Default for Operator {
    fn default() -> Self {
        Self::new()
    }
}

/// Waveform lookup at `(phase + modulator) mod 1`, scaled by the
/// envelope gain
#[inline]
pub(crate) fn waveform_output(
    modulator: f64,
    phase: f64,
    waveform: &[f64; WAVEFORM_LENGTH],
    gain: f64,
) -> f64 {
    let mut output_phase = (phase + modulator) % 1.0;
    if output_phase < 0.0 {
        output_phase += 1.0;
        // A tiny negative value can round back up to exactly 1.0.
        output_phase %= 1.0;
    }
    let index = (output_phase * WAVEFORM_LENGTH as f64) as usize;
    waveform[index] * gain
}
