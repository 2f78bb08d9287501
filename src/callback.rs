//! The real-time render entry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::RuntimeFault;
use crate::graph::AudioGraph;

/// One-shot diagnostic flags raised on the real-time path.
///
/// The callback only ever stores into these; the controller reads them after
/// playback ends. Faults are never propagated as errors across the real-time
/// boundary.
#[derive(Debug, Default)]
pub struct FaultFlags {
    overrun: AtomicBool,
}

impl FaultFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any callback missed its deadline during the session.
    pub fn callback_overrun(&self) -> bool {
        self.overrun.load(Ordering::Relaxed)
    }

    /// Faults recorded so far, for post-session reporting.
    pub fn faults(&self) -> Vec<RuntimeFault> {
        let mut faults = Vec::new();
        if self.callback_overrun() {
            faults.push(RuntimeFault::CallbackOverrun);
        }
        faults
    }

    fn raise_overrun(&self) {
        self.overrun.store(true, Ordering::Relaxed);
    }

    /// Clear all flags for a new session. Non-real-time only.
    pub(crate) fn reset(&self) {
        self.overrun.store(false, Ordering::Relaxed);
    }
}

/// Renders the graph into the hardware buffer, one fixed-size block at a
/// time.
///
/// Owns the graph for the lifetime of the stream, which is what enforces
/// stop-before-mutate: as long as the device may invoke this callback,
/// nothing else can touch the topology, and closing the stream drops the
/// callback (and the graph with it) before any further teardown.
///
/// The fill path performs no allocation, locking, I/O, or error
/// propagation. A hardware buffer larger than the graph's block size is
/// processed in consecutive sub-blocks.
pub struct RealtimeCallback {
    graph: AudioGraph,
    channels: usize,
    faults: Arc<FaultFlags>,
}

impl RealtimeCallback {
    /// Wrap `graph`, interleaving its terminal node into `channels` hardware
    /// channels.
    pub fn new(graph: AudioGraph, channels: usize, faults: Arc<FaultFlags>) -> Self {
        Self {
            graph,
            channels: channels.max(1),
            faults,
        }
    }

    /// Fill an interleaved f32 hardware buffer.
    pub fn fill_f32(&mut self, data: &mut [f32]) {
        self.fill_samples(data, |s| s);
    }

    /// Fill an interleaved i16 hardware buffer.
    pub fn fill_i16(&mut self, data: &mut [i16]) {
        self.fill_samples(data, |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
    }

    /// Fill an interleaved u16 hardware buffer.
    pub fn fill_u16(&mut self, data: &mut [u16]) {
        self.fill_samples(data, |s| {
            ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16
        });
    }

    fn fill_samples<T, F>(&mut self, data: &mut [T], convert: F)
    where
        F: Fn(f32) -> T,
    {
        let started = Instant::now();
        let channels = self.channels;
        let block = self.graph.block_frames();

        for chunk in data.chunks_mut(block * channels) {
            let frames = chunk.len() / channels;
            self.graph.render(frames);
            let rendered = self.graph.output_channels();

            for (i, frame) in chunk.chunks_exact_mut(channels).enumerate() {
                for (ch, sample) in frame.iter_mut().enumerate() {
                    let value = rendered.get(ch).map_or(0.0, |buf| buf[i]);
                    *sample = convert(value);
                }
            }
        }

        self.check_deadline(started, data.len() / channels);
    }

    /// Record a one-shot overrun diagnostic when a fill exceeded the buffer
    /// duration it had to produce.
    fn check_deadline(&self, started: Instant, frames: usize) {
        let budget = frames as f64 / f64::from(self.graph.sample_rate());
        if started.elapsed().as_secs_f64() > budget {
            self.faults.raise_overrun();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use crate::nodes::{Output, Sine};

    /// Graph with a tone on the last channel; any others stay silent.
    fn callback(channels: usize) -> RealtimeCallback {
        let mut graph = AudioGraph::new(48_000, 64);
        let out = graph.add_node(NodeKind::Output(Output::new(channels)));
        graph.set_output(out).unwrap();
        let sine = graph.add_node(NodeKind::Sine(Sine::new(480.0).with_amplitude(1.0)));
        graph.connect(sine, 0, out, channels - 1).unwrap();
        RealtimeCallback::new(graph, channels, Arc::new(FaultFlags::new()))
    }

    #[test]
    fn interleaves_terminal_channels() {
        let mut cb = callback(2);
        let mut data = vec![0.0f32; 2 * 64];
        cb.fill_f32(&mut data);

        // Channel 0 unconnected, channel 1 carries the tone.
        assert!(data.iter().step_by(2).all(|s| *s == 0.0));
        assert!(data.iter().skip(1).step_by(2).any(|s| *s != 0.0));
    }

    #[test]
    fn oversized_hardware_buffers_are_chunked() {
        let mut cb = callback(2);
        // 5.5 blocks worth of frames.
        let mut data = vec![0.0f32; 2 * 352];
        cb.fill_f32(&mut data);
        assert!(data.iter().skip(1).step_by(2).any(|s| *s != 0.0));
    }

    #[test]
    fn i16_conversion_produces_signal() {
        let mut cb = callback(1);
        let mut data = vec![0i16; 64];
        cb.fill_i16(&mut data);
        assert!(data.iter().any(|s| *s != 0));
        assert!(data.iter().all(|s| *s > i16::MIN));
    }
}
