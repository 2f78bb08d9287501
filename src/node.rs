//! Core node contract and the closed set of node kinds.

use crate::buffer::SampleBuffer;
use crate::nodes::{FilePlayer, Output, Sine};

/// Information available during a render pass.
#[derive(Clone, Copy, Debug)]
pub struct RenderContext {
    /// Sample rate of the graph in Hz (e.g. 44100, 48000).
    pub sample_rate: u32,
    /// Maximum frames per render pass, fixed at graph construction.
    pub block_frames: usize,
}

/// Unique identifier for a node within a graph.
///
/// Ids are handed out monotonically and never reused, so a stale id held
/// after [`remove_node`](crate::AudioGraph::remove_node) can never alias a
/// newer node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u64);

/// The render contract every node kind implements.
///
/// `render` must complete in time proportional to `frames`, touch no state
/// outside the node's own cursor, and never allocate, lock, or perform I/O.
/// `inputs` holds one routed block per declared input channel (unconnected
/// channels arrive silenced); `outputs` one block per output channel. Only
/// the first `frames` samples of each block are meaningful.
pub trait AudioNode: Send {
    fn render(
        &mut self,
        ctx: &RenderContext,
        inputs: &[SampleBuffer],
        outputs: &mut [SampleBuffer],
        frames: usize,
    );

    /// Number of audio input channels (0 for sources).
    fn num_inputs(&self) -> usize {
        0
    }

    /// Number of audio output channels.
    fn num_outputs(&self) -> usize {
        1
    }
}

/// The closed set of node variants a graph can hold.
///
/// Dispatch is a plain match, so the render path never inspects types
/// dynamically.
pub enum NodeKind {
    /// Streams decoded file audio from a lock-free ring.
    FilePlayer(FilePlayer),
    /// Terminal node representing the hardware output channels.
    Output(Output),
    /// Fixed-frequency test tone.
    Sine(Sine),
}

impl AudioNode for NodeKind {
    fn render(
        &mut self,
        ctx: &RenderContext,
        inputs: &[SampleBuffer],
        outputs: &mut [SampleBuffer],
        frames: usize,
    ) {
        match self {
            NodeKind::FilePlayer(n) => n.render(ctx, inputs, outputs, frames),
            NodeKind::Output(n) => n.render(ctx, inputs, outputs, frames),
            NodeKind::Sine(n) => n.render(ctx, inputs, outputs, frames),
        }
    }

    fn num_inputs(&self) -> usize {
        match self {
            NodeKind::FilePlayer(n) => n.num_inputs(),
            NodeKind::Output(n) => n.num_inputs(),
            NodeKind::Sine(n) => n.num_inputs(),
        }
    }

    fn num_outputs(&self) -> usize {
        match self {
            NodeKind::FilePlayer(n) => n.num_outputs(),
            NodeKind::Output(n) => n.num_outputs(),
            NodeKind::Sine(n) => n.num_outputs(),
        }
    }
}
