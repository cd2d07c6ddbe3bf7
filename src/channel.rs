//! Channel composition
//!
//! A channel slot composes two or four operators into one voice
//! according to its routing algorithm, applies the first operator's
//! feedback path and spreads the result over the four output buses.
//! The composition to run is a plain tag on the slot; the rhythm
//! channels are further tags whose output functions hand the
//! cross-read phases to the percussion operators explicitly.

use crate::chip::TickState;
use crate::envelope::Stage;
use crate::noise::NoiseGenerator;
use crate::operator::{Operator, NO_MODULATOR};
use crate::registers::OutputBuses;
use crate::tables::{FEEDBACK_TABLE, MULT_TABLE};

// Flat operator indices of the five rhythm voices (bank 0,
// channels 6-8).
pub(crate) const HIGH_HAT_OP: usize = 13;
pub(crate) const TOM_TOM_OP: usize = 14;
pub(crate) const SNARE_DRUM_OP: usize = 16;
pub(crate) const TOP_CYMBAL_OP: usize = 17;

/// How a channel slot composes its operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelKind {
    /// Standard two-operator voice
    TwoOp,
    /// Primary slot of a merged four-operator voice
    FourOp,
    /// Secondary slot of a merged pair; always silent
    Disabled,
    /// Rhythm: channel 6 drives the bass drum
    BassDrum,
    /// Rhythm: channel 7 drives the high hat and snare drum
    HighHatSnare,
    /// Rhythm: channel 8 drives the tom tom and top cymbal
    TomTomTopCymbal,
}

/// State of one channel slot, derived from its three registers
#[derive(Debug, Clone)]
pub(crate) struct ChannelState {
    pub kind: ChannelKind,
    /// Flat operator indices; two-operator kinds use the first two
    pub ops: [usize; 4],
    pub f_number: u16,
    pub block: u8,
    pub key_on: bool,
    /// Raw CNT bit of this slot
    pub cnt: u8,
    /// Effective routing algorithm: the CNT bit for 2-op voices, the
    /// combined 2-bit code for a 4-op primary
    pub algorithm: u8,
    pub feedback_index: usize,
    pub buses: OutputBuses,
    /// Last two outputs of the first operator, unscaled
    pub feedback: [f64; 2],
}

impl ChannelState {
    /// Create the slot for `index` (0-8) in `bank`, initially 2-op
    pub fn new(bank: usize, index: usize) -> Self {
        let base = bank * 18 + (index / 3) * 6 + index % 3;
        Self {
            kind: ChannelKind::TwoOp,
            ops: [base, base + 3, base + 6, base + 9],
            f_number: 0,
            block: 0,
            key_on: false,
            cnt: 0,
            algorithm: 0,
            feedback_index: 0,
            buses: OutputBuses::empty(),
            feedback: [0.0; 2],
        }
    }

    /// Compute this channel's contribution to the four buses for one
    /// sample
    pub fn output(
        &mut self,
        operators: &mut [Operator],
        noise: &mut NoiseGenerator,
        tick: &TickState,
    ) -> [f64; 4] {
        match self.kind {
            ChannelKind::Disabled => [0.0; 4],
            ChannelKind::TwoOp | ChannelKind::BassDrum => self.two_op_output(operators, tick),
            ChannelKind::FourOp => self.four_op_output(operators, tick),
            ChannelKind::HighHatSnare => self.high_hat_snare_output(operators, noise, tick),
            ChannelKind::TomTomTopCymbal => self.tom_tom_top_cymbal_output(operators, tick),
        }
    }

    fn two_op_output(&mut self, operators: &mut [Operator], tick: &TickState) -> [f64; 4] {
        let (op1, op2) = (self.ops[0], self.ops[1]);
        let feedback_input = self.feedback_input();
        let output = if self.algorithm & 0x01 == 0 {
            // Serial: operator 1 modulates operator 2.
            if operators[op2].stage() == Stage::Off {
                return [0.0; 4];
            }
            let op1_output = operators[op1].output(feedback_input, tick);
            self.push_feedback(op1_output);
            operators[op2].output(op1_output, tick)
        } else {
            // Parallel: both operators feed the output directly.
            if operators[op1].stage() == Stage::Off && operators[op2].stage() == Stage::Off {
                return [0.0; 4];
            }
            let op1_output = operators[op1].output(feedback_input, tick);
            self.push_feedback(op1_output);
            let op2_output = operators[op2].output(NO_MODULATOR, tick);
            (op1_output + op2_output) / 2.0
        };
        self.route(output, tick.extended)
    }

    fn four_op_output(&mut self, operators: &mut [Operator], tick: &TickState) -> [f64; 4] {
        let [op1, op2, op3, op4] = self.ops;
        let feedback_input = self.feedback_input();
        let output = match self.algorithm & 0x03 {
            0 => {
                // Single chain 1 -> 2 -> 3 -> 4
                if is_off(operators, op4) {
                    return [0.0; 4];
                }
                let o1 = operators[op1].output(feedback_input, tick);
                self.push_feedback(o1);
                let o2 = operators[op2].output(o1, tick);
                let o3 = operators[op3].output(o2, tick);
                operators[op4].output(o3, tick)
            }
            1 => {
                // (1 -> 2) in parallel with (3 -> 4)
                if is_off(operators, op2) && is_off(operators, op4) {
                    return [0.0; 4];
                }
                let o1 = operators[op1].output(feedback_input, tick);
                self.push_feedback(o1);
                let o2 = operators[op2].output(o1, tick);
                let o3 = operators[op3].output(NO_MODULATOR, tick);
                let o4 = operators[op4].output(o3, tick);
                (o2 + o4) / 2.0
            }
            2 => {
                // 1 in parallel with (2 -> 3 -> 4)
                if is_off(operators, op1) && is_off(operators, op4) {
                    return [0.0; 4];
                }
                let o1 = operators[op1].output(feedback_input, tick);
                self.push_feedback(o1);
                let o2 = operators[op2].output(NO_MODULATOR, tick);
                let o3 = operators[op3].output(o2, tick);
                let o4 = operators[op4].output(o3, tick);
                (o1 + o4) / 2.0
            }
            _ => {
                // 1, (2 -> 3) and 4 all in parallel
                if is_off(operators, op1) && is_off(operators, op3) && is_off(operators, op4) {
                    return [0.0; 4];
                }
                let o1 = operators[op1].output(feedback_input, tick);
                self.push_feedback(o1);
                let o2 = operators[op2].output(NO_MODULATOR, tick);
                let o3 = operators[op3].output(o2, tick);
                let o4 = operators[op4].output(NO_MODULATOR, tick);
                (o1 + o3 + o4) / 3.0
            }
        };
        self.route(output, tick.extended)
    }

    fn high_hat_snare_output(
        &mut self,
        operators: &mut [Operator],
        noise: &mut NoiseGenerator,
        tick: &TickState,
    ) -> [f64; 4] {
        // The high hat modulates against the top cymbal's phase.
        let top_cymbal = &operators[TOP_CYMBAL_OP];
        let top_cymbal_phase =
            top_cymbal.phase_generator.phase() * MULT_TABLE[(top_cymbal.mult & 0x0F) as usize];
        let output = if self.algorithm & 0x01 == 0 {
            if operators[SNARE_DRUM_OP].stage() == Stage::Off {
                return [0.0; 4];
            }
            let high_hat_output =
                operators[HIGH_HAT_OP].high_hat_output(top_cymbal_phase, noise.next_sample(), tick);
            self.push_feedback(high_hat_output);
            let high_hat_phase = operators[HIGH_HAT_OP].phase_generator.phase();
            operators[SNARE_DRUM_OP].snare_drum_output(
                high_hat_output,
                high_hat_phase,
                noise.next_sample(),
                tick,
            )
        } else {
            if operators[HIGH_HAT_OP].stage() == Stage::Off
                && operators[SNARE_DRUM_OP].stage() == Stage::Off
            {
                return [0.0; 4];
            }
            let high_hat_output =
                operators[HIGH_HAT_OP].high_hat_output(top_cymbal_phase, noise.next_sample(), tick);
            self.push_feedback(high_hat_output);
            let high_hat_phase = operators[HIGH_HAT_OP].phase_generator.phase();
            let snare_output = operators[SNARE_DRUM_OP].snare_drum_output(
                NO_MODULATOR,
                high_hat_phase,
                noise.next_sample(),
                tick,
            );
            (high_hat_output + snare_output) / 2.0
        };
        self.route(output, tick.extended)
    }

    fn tom_tom_top_cymbal_output(
        &mut self,
        operators: &mut [Operator],
        tick: &TickState,
    ) -> [f64; 4] {
        // The top cymbal modulates against the high hat's phase.
        let high_hat = &operators[HIGH_HAT_OP];
        let high_hat_phase =
            high_hat.phase_generator.phase() * MULT_TABLE[(high_hat.mult & 0x0F) as usize];
        let feedback_input = self.feedback_input();
        let output = if self.algorithm & 0x01 == 0 {
            if operators[TOP_CYMBAL_OP].stage() == Stage::Off {
                return [0.0; 4];
            }
            let tom_tom_output = operators[TOM_TOM_OP].output(feedback_input, tick);
            self.push_feedback(tom_tom_output);
            operators[TOP_CYMBAL_OP].top_cymbal_output(high_hat_phase, tick)
        } else {
            if operators[TOM_TOM_OP].stage() == Stage::Off
                && operators[TOP_CYMBAL_OP].stage() == Stage::Off
            {
                return [0.0; 4];
            }
            let tom_tom_output = operators[TOM_TOM_OP].output(feedback_input, tick);
            self.push_feedback(tom_tom_output);
            let top_cymbal_output = operators[TOP_CYMBAL_OP].top_cymbal_output(high_hat_phase, tick);
            (tom_tom_output + top_cymbal_output) / 2.0
        };
        self.route(output, tick.extended)
    }

    /// Key every operator this slot drives on and clear the feedback
    /// history
    pub fn key_on(&mut self, operators: &mut [Operator]) {
        for &op in self.active_ops() {
            operators[op].key_on();
        }
        self.feedback = [0.0; 2];
    }

    /// Key every operator this slot drives off
    pub fn key_off(&mut self, operators: &mut [Operator]) {
        for &op in self.active_ops() {
            operators[op].key_off();
        }
    }

    fn active_ops(&self) -> &[usize] {
        match self.kind {
            ChannelKind::FourOp => &self.ops[..4],
            ChannelKind::Disabled => &[],
            _ => &self.ops[..2],
        }
    }

    /// Modulation input for the first operator: the mean of its last
    /// two outputs scaled by the feedback depth
    #[inline]
    fn feedback_input(&self) -> f64 {
        (self.feedback[0] + self.feedback[1]) / 2.0 * FEEDBACK_TABLE[self.feedback_index]
    }

    #[inline]
    fn push_feedback(&mut self, op1_output: f64) {
        self.feedback[0] = self.feedback[1];
        self.feedback[1] = op1_output;
    }

    /// Spread the mono output over the four buses
    fn route(&self, output: f64, extended: bool) -> [f64; 4] {
        if !extended {
            return [output; 4];
        }
        let gate = |bus: OutputBuses| if self.buses.contains(bus) { output } else { 0.0 };
        [
            gate(OutputBuses::A),
            gate(OutputBuses::B),
            gate(OutputBuses::C),
            gate(OutputBuses::D),
        ]
    }
}

#[inline]
fn is_off(operators: &[Operator], index: usize) -> bool {
    operators[index].stage() == Stage::Off
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tick() -> TickState {
        TickState {
            vibrato: 1.0,
            tremolo_db: 0.0,
            wave_mask: 0x07,
            extended: false,
        }
    }

    /// 36 operators in the all-zero register state
    fn operators() -> Vec<Operator> {
        (0..36).map(|_| Operator::new()).collect()
    }

    /// Configure an operator as a keyed square wave at frequency 0,
    /// which outputs a constant +1.
    fn make_constant(op: &mut Operator) {
        op.set_am_vib_egt_ksr_mult(0x21);
        op.set_ar_dr(0xF0);
        op.set_sl_rr(0x00);
        op.set_waveform(6);
        op.key_on();
    }

    #[test]
    fn test_disabled_channel_is_all_zero() {
        let mut ops = operators();
        make_constant(&mut ops[0]);
        let mut chan = ChannelState::new(0, 0);
        chan.kind = ChannelKind::Disabled;
        let mut noise = NoiseGenerator::new();
        assert_eq!(chan.output(&mut ops, &mut noise, &tick()), [0.0; 4]);
    }

    #[test]
    fn test_serial_channel_short_circuits_on_silent_carrier() {
        let mut ops = operators();
        make_constant(&mut ops[0]);
        // Operator 2 (index 3) stays off
        let mut chan = ChannelState::new(0, 0);
        let mut noise = NoiseGenerator::new();
        assert_eq!(chan.output(&mut ops, &mut noise, &tick()), [0.0; 4]);
    }

    #[test]
    fn test_parallel_channel_short_circuits_only_when_both_off() {
        let mut ops = operators();
        make_constant(&mut ops[0]);
        let mut chan = ChannelState::new(0, 0);
        chan.algorithm = 1;
        let mut noise = NoiseGenerator::new();
        let out = chan.output(&mut ops, &mut noise, &tick());
        // Operator 1 contributes half of the averaged pair
        assert_abs_diff_eq!(out[0], 0.5, epsilon = 1e-12);

        let mut silent = ChannelState::new(0, 1);
        silent.algorithm = 1;
        assert_eq!(silent.output(&mut ops, &mut noise, &tick()), [0.0; 4]);
    }

    #[test]
    fn test_four_op_algorithm_3_averages_three_branches() {
        let mut ops = operators();
        let mut chan = ChannelState::new(0, 0);
        chan.kind = ChannelKind::FourOp;
        chan.algorithm = 3;
        for &op in &chan.ops {
            make_constant(&mut ops[op]);
        }
        let mut noise = NoiseGenerator::new();
        let out = chan.output(&mut ops, &mut noise, &tick());
        assert_abs_diff_eq!(out[0], 1.0, epsilon = 1e-12);

        // Attenuating operator 2 must not change the average: it only
        // phase-modulates operator 3, and a square wave shrugs small
        // phase offsets off.
        let mut ops2 = operators();
        let mut chan2 = ChannelState::new(0, 0);
        chan2.kind = ChannelKind::FourOp;
        chan2.algorithm = 3;
        for &op in &chan2.ops {
            make_constant(&mut ops2[op]);
        }
        ops2[chan2.ops[1]].set_ksl_tl(0x20); // heavy total level
        let out2 = chan2.output(&mut ops2, &mut noise, &tick());
        assert_abs_diff_eq!(out2[0], out[0], epsilon = 1e-12);
    }

    #[test]
    fn test_four_op_algorithm_0_follows_terminal_operator() {
        let mut ops = operators();
        let mut chan = ChannelState::new(0, 0);
        chan.kind = ChannelKind::FourOp;
        chan.algorithm = 0;
        for &op in &chan.ops {
            make_constant(&mut ops[op]);
        }
        let mut noise = NoiseGenerator::new();
        let out = chan.output(&mut ops, &mut noise, &tick());
        // Chain of square waves at phase 0 stays at +1
        assert_abs_diff_eq!(out[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_feedback_index_zero_ignores_history() {
        let mut noise = NoiseGenerator::new();

        let mut ops_clean = operators();
        make_constant(&mut ops_clean[0]);
        make_constant(&mut ops_clean[3]);
        let mut clean = ChannelState::new(0, 0);
        let clean_out = clean.output(&mut ops_clean, &mut noise, &tick());

        let mut ops_dirty = operators();
        make_constant(&mut ops_dirty[0]);
        make_constant(&mut ops_dirty[3]);
        let mut dirty = ChannelState::new(0, 0);
        dirty.feedback = [0.7, 0.3];
        let dirty_out = dirty.output(&mut ops_dirty, &mut noise, &tick());

        assert_eq!(clean_out, dirty_out);
    }

    #[test]
    fn test_feedback_history_shifts() {
        let mut ops = operators();
        make_constant(&mut ops[0]);
        make_constant(&mut ops[3]);
        let mut chan = ChannelState::new(0, 0);
        chan.feedback_index = 3;
        let mut noise = NoiseGenerator::new();
        chan.output(&mut ops, &mut noise, &tick());
        // Operator 1 output (+1) lands in the newest history slot
        assert_eq!(chan.feedback[1], 1.0);
        assert_eq!(chan.feedback[0], 0.0);
        chan.output(&mut ops, &mut noise, &tick());
        assert_eq!(chan.feedback[0], 1.0);
    }

    #[test]
    fn test_bus_routing_in_extended_mode() {
        let mut ops = operators();
        make_constant(&mut ops[0]);
        make_constant(&mut ops[3]);
        let mut chan = ChannelState::new(0, 0);
        chan.buses = OutputBuses::B;
        let extended = TickState {
            extended: true,
            ..tick()
        };
        let mut noise = NoiseGenerator::new();
        let out = chan.output(&mut ops, &mut noise, &extended);
        assert_eq!(out[0], 0.0);
        assert!(out[1] != 0.0);
        assert_eq!(out[2], 0.0);
        assert_eq!(out[3], 0.0);
    }

    #[test]
    fn test_key_on_clears_feedback_history() {
        let mut ops = operators();
        let mut chan = ChannelState::new(0, 0);
        chan.feedback = [0.5, 0.25];
        chan.key_on(&mut ops);
        assert_eq!(chan.feedback, [0.0; 2]);
    }
}
