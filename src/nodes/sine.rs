//! Sine wave oscillator.

use crate::buffer::SampleBuffer;
use crate::node::{AudioNode, RenderContext};

/// A fixed-frequency mono sine source.
///
/// Deterministic given a sample rate, which makes it the reference source
/// for graph tests and benchmarks; also usable as a speaker test tone.
pub struct Sine {
    frequency: f32,
    amplitude: f32,
    phase: f32,
}

impl Sine {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency: frequency.max(0.0),
            amplitude: 0.25, // -12dB
            phase: 0.0,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    #[inline]
    pub fn frequency(&self) -> f32 {
        self.frequency
    }
}

impl AudioNode for Sine {
    fn render(
        &mut self,
        ctx: &RenderContext,
        _inputs: &[SampleBuffer],
        outputs: &mut [SampleBuffer],
        frames: usize,
    ) {
        let Some(out) = outputs.first_mut() else {
            return;
        };

        let phase_inc = self.frequency / ctx.sample_rate as f32;
        let amplitude = self.amplitude;

        for sample in &mut out[..frames] {
            *sample = (self.phase * std::f32::consts::TAU).sin() * amplitude;
            self.phase += phase_inc;
            // Branchless phase wrap (phase is always positive)
            self.phase -= (self.phase >= 1.0) as u32 as f32;
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        0
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        1
    }
}
