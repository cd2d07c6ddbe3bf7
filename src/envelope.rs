//! Envelope generator
//!
//! Implements the per-operator ADSR attenuation state machine in the
//! dB domain. The attack follows an exponential curve modeled as
//! `envelope = -2^x` with `x` stepped linearly; decay and release are
//! linear dB ramps. All slopes are derived from the measured timing
//! tables in [`crate::tables`], combined with the key-scale-rate
//! adjustment into an "actual rate" of 0-63.
//!
//! Stage flow is one-directional: Attack to Decay at 0 dB, Decay to
//! Sustain at the sustain level, Sustain to Release on key-off (or
//! immediately for percussive envelopes), Release to Off at full
//! attenuation. Key-on re-enters Attack from any stage; a nominal
//! attack rate of 0 forces Off instead, which is chip behavior rather
//! than an error.

use crate::tables::{
    self, ATTACK_TIMES_MS, DECAY_RELEASE_TIMES_MS, KSL_3DB_TABLE,
};
use crate::chip::SAMPLE_RATE;

/// Full attenuation in dB; envelopes live in [SILENCE_DB, 0]
pub const SILENCE_DB: f64 = -96.0;

/// Envelope resolution per level step (YMF278B manual, OPL3 section)
const RESOLUTION_DB: f64 = 0.1875;

/// The exponential attack never reaches 0 dB exactly, so the peak is
/// detected one resolution step below it.
const PEAK_DB: f64 = -RESOLUTION_DB;

/// Envelope stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Rising from full attenuation toward 0 dB
    Attack,
    /// Falling toward the sustain level
    Decay,
    /// Held while the key is on (sustaining envelopes only)
    Sustain,
    /// Falling toward full attenuation
    Release,
    /// Fully attenuated; terminal until the next key-on
    Off,
}

/// Per-operator envelope generator
#[derive(Clone, Debug)]
pub struct EnvelopeGenerator {
    stage: Stage,
    nominal_attack_rate: u8,
    actual_attack_rate: usize,
    actual_decay_rate: usize,
    actual_release_rate: usize,

    // Attack curve parameters: x steps linearly, envelope = -2^x
    x: f64,
    x_attack_increment: f64,
    x_minimum_in_attack: f64,

    // Linear dB slopes
    decay_increment_db: f64,
    release_increment_db: f64,

    // Static attenuation terms added to the output
    key_scale_attenuation_db: f64,
    total_level_db: f64,
    sustain_level_db: f64,

    envelope_db: f64,
}

impl EnvelopeGenerator {
    /// Create an envelope generator at rest (fully attenuated, Off)
    pub fn new() -> Self {
        Self {
            stage: Stage::Off,
            nominal_attack_rate: 0,
            actual_attack_rate: 0,
            actual_decay_rate: 0,
            actual_release_rate: 0,
            x: db_to_x(SILENCE_DB),
            x_attack_increment: 0.0,
            x_minimum_in_attack: percentage_to_x(0.1),
            decay_increment_db: 0.0,
            release_increment_db: 0.0,
            key_scale_attenuation_db: 0.0,
            total_level_db: 0.0,
            sustain_level_db: 0.0,
            envelope_db: SILENCE_DB,
        }
    }

    /// Current stage
    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Set the sustain level from the 4-bit SL field
    ///
    /// Each step is -3 dB; the all-ones value means -93 dB.
    pub fn set_sustain_level(&mut self, sl: u8) {
        let sl = sl & 0x0F;
        self.sustain_level_db = if sl == 0x0F { -93.0 } else { -3.0 * sl as f64 };
    }

    /// Set the static attenuation from the 6-bit total level field
    /// (0.75 dB per step)
    pub fn set_total_level(&mut self, tl: u8) {
        self.total_level_db = (tl & 0x3F) as f64 * -0.75;
    }

    /// Recompute the key-scale-level attenuation
    ///
    /// KSL 0 disables it; 1, 2 and 3 select roughly 3, 1.5 and
    /// 6 dB/octave by scaling the measured 3 dB table.
    pub fn set_key_scale_attenuation(&mut self, f_number: u16, block: u8, ksl: u8) {
        let hi4 = ((f_number >> 6) & 0x0F) as usize;
        let base = KSL_3DB_TABLE[hi4][(block & 0x07) as usize];
        self.key_scale_attenuation_db = match ksl & 0x03 {
            0 => 0.0,
            1 => base,
            2 => base / 2.0,
            _ => base * 2.0,
        };
    }

    /// Recompute the attack slope from the nominal rate, KSR flag and
    /// key scale number
    ///
    /// The measured table gives the 0%-100% and 10%-90% periods of the
    /// exponential rise. The 10%-90% section fixes the step of the
    /// curve parameter; the leftover samples of the full period fix
    /// how far below the 10% point the curve starts.
    pub fn set_actual_attack_rate(&mut self, attack_rate: u8, ksr: bool, key_scale_number: u8) {
        self.nominal_attack_rate = attack_rate;
        self.actual_attack_rate = actual_rate(attack_rate, ksr, key_scale_number);
        let times = ATTACK_TIMES_MS[self.actual_attack_rate];
        if times[0].is_infinite() {
            // Rates 0-3: the curve never moves.
            self.x_attack_increment = 0.0;
            self.x_minimum_in_attack = percentage_to_x(0.1);
        } else if times[1] <= 0.0 {
            // Rates 60-63: immediate jump to the peak.
            self.x_attack_increment = f64::NEG_INFINITY;
            self.x_minimum_in_attack = percentage_to_x(0.1);
        } else {
            let period_0_to_100 = times[0] / 1000.0;
            let period_10_to_90 = times[1] / 1000.0;
            let samples_0_to_100 = (period_0_to_100 * SAMPLE_RATE as f64).floor();
            let samples_10_to_90 = (period_10_to_90 * SAMPLE_RATE as f64).floor();
            self.x_attack_increment =
                tables::db_increment(percentage_to_x(0.1), percentage_to_x(0.9), period_10_to_90);
            let samples_10_to_100 = samples_10_to_90
                + ((db_to_x(PEAK_DB) - percentage_to_x(0.9)) / self.x_attack_increment).floor();
            self.x_minimum_in_attack = percentage_to_x(0.1)
                - (samples_0_to_100 - samples_10_to_100) * self.x_attack_increment;
        }
    }

    /// Recompute the decay slope
    pub fn set_actual_decay_rate(&mut self, decay_rate: u8, ksr: bool, key_scale_number: u8) {
        self.actual_decay_rate = actual_rate(decay_rate, ksr, key_scale_number);
        self.decay_increment_db = linear_increment(self.actual_decay_rate);
    }

    /// Recompute the release slope
    pub fn set_actual_release_rate(&mut self, release_rate: u8, ksr: bool, key_scale_number: u8) {
        self.actual_release_rate = actual_rate(release_rate, ksr, key_scale_number);
        self.release_increment_db = linear_increment(self.actual_release_rate);
    }

    /// Advance one sample and return the output attenuation in dB
    ///
    /// `egt` selects sustaining envelopes; `am` applies the chip-wide
    /// tremolo value passed in `tremolo_db`. The returned value folds
    /// in the total level and key-scale attenuation. Table figures are
    /// halved on the way out to match levels measured from the chip.
    pub fn advance(&mut self, egt: bool, am: bool, tremolo_db: f64) -> f64 {
        let sustain = self.sustain_level_db / 2.0;

        match self.stage {
            Stage::Attack => {
                if self.envelope_db < PEAK_DB && self.x_attack_increment.is_finite() {
                    self.envelope_db = -(2f64.powf(self.x));
                    self.x += self.x_attack_increment;
                } else {
                    // The exponential overshoots the last resolution
                    // step, so the peak is pinned at 0 dB.
                    self.envelope_db = 0.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                if self.envelope_db > sustain {
                    self.envelope_db -= self.decay_increment_db;
                } else {
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {
                // Held while the key is on; percussive envelopes fall
                // straight through to the release slope.
                if !egt {
                    self.stage = Stage::Release;
                }
            }
            Stage::Release => {
                if self.envelope_db > SILENCE_DB {
                    self.envelope_db -= self.release_increment_db;
                } else {
                    self.envelope_db = SILENCE_DB;
                    self.stage = Stage::Off;
                }
            }
            Stage::Off => {}
        }

        let mut output = self.envelope_db;
        if am {
            output += tremolo_db / 2.0;
        }
        output += self.key_scale_attenuation_db / 2.0;
        output += self.total_level_db / 2.0;
        output
    }

    /// Key the envelope on
    ///
    /// Re-enters Attack from any stage, resuming the curve from the
    /// current level. A nominal attack rate of 0 forces Off instead:
    /// the stage would otherwise never start.
    pub fn key_on(&mut self) {
        if self.nominal_attack_rate == 0 {
            self.stage = Stage::Off;
            return;
        }
        let x_current = if self.envelope_db < 0.0 {
            db_to_x(self.envelope_db)
        } else {
            self.x_minimum_in_attack
        };
        self.x = x_current.min(self.x_minimum_in_attack);
        self.stage = Stage::Attack;
    }

    /// Key the envelope off, entering Release from any active stage
    pub fn key_off(&mut self) {
        if self.stage != Stage::Off {
            self.stage = Stage::Release;
        }
    }

    /// Reset to the constructed state
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine a nominal 4-bit rate with the key-scale offset into the
/// actual rate (0-63)
fn actual_rate(rate: u8, ksr: bool, key_scale_number: u8) -> usize {
    ((rate & 0x0F) as usize * 4 + tables::rate_offset(ksr, key_scale_number)).min(63)
}

/// Per-sample dB step for a linear decay/release slope at the given
/// actual rate; 0 when the rate never advances
fn linear_increment(actual_rate: usize) -> f64 {
    let period_10_to_90 = DECAY_RELEASE_TIMES_MS[actual_rate][1] / 1000.0;
    // An infinite period yields a zero increment here.
    tables::db_increment(percentage_to_db(0.1), percentage_to_db(0.9), period_10_to_90)
}

#[inline]
fn db_to_x(db: f64) -> f64 {
    (-db).log2()
}

#[inline]
fn percentage_to_db(percentage: f64) -> f64 {
    percentage.log10() * 10.0
}

#[inline]
fn percentage_to_x(percentage: f64) -> f64 {
    db_to_x(percentage_to_db(percentage))
}
