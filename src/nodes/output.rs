//! Terminal node representing the hardware output channels.

use crate::buffer::SampleBuffer;
use crate::node::{AudioNode, RenderContext};

/// The graph's output bus.
///
/// Declares one input and one output channel per hardware channel; each
/// render copies the routed inputs into its output region, which the
/// real-time callback interleaves into the device buffer. Channels with no
/// incoming connection stay silent.
pub struct Output {
    channels: usize,
}

impl Output {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl AudioNode for Output {
    fn render(
        &mut self,
        _ctx: &RenderContext,
        inputs: &[SampleBuffer],
        outputs: &mut [SampleBuffer],
        frames: usize,
    ) {
        for (ch, out) in outputs.iter_mut().enumerate() {
            match inputs.get(ch) {
                Some(input) => out.copy_from(input, frames),
                None => out[..frames].fill(0.0),
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        self.channels
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}
