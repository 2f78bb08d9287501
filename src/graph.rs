//! Audio graph - owns nodes, per-channel connections, and the render sweep.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use hashbrown::HashMap;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::buffer::SampleBuffer;
use crate::error::ConnectionError;
use crate::node::{AudioNode, NodeId, NodeKind, RenderContext};

/// A directed routing edge: one source output channel into one destination
/// input channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Wire {
    src_ch: usize,
    dst_ch: usize,
}

/// A node plus its per-channel input scratch and output blocks.
struct Slot {
    kind: NodeKind,
    inputs: Vec<SampleBuffer>,
    outputs: Vec<SampleBuffer>,
}

/// One entry of the cached render schedule.
struct Step {
    slot: usize,
    /// (source slot, source channel, destination channel)
    wires: Vec<(usize, usize, usize)>,
    /// Input channels with no incoming wire; silenced each pass.
    silent: Vec<usize>,
}

/// An audio processing graph at a fixed sample rate and block size.
///
/// Topology (nodes and connections) is mutated from the non-real-time thread
/// only, and only while no render pass can be in flight; every mutation
/// recomputes the render schedule so that [`render`](Self::render) itself is
/// allocation-free and safe on the real-time thread.
///
/// Connections route a single source output channel into a single
/// destination input channel. A destination channel accepts at most one
/// incoming connection (mixing requires an explicit mixer node), and the
/// graph stays acyclic: a render pass is one topological sweep with no
/// feedback. Ready-node ties are broken by insertion order, so rendering is
/// deterministic given deterministic node state.
pub struct AudioGraph {
    ctx: RenderContext,
    topo: StableDiGraph<NodeId, Wire>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    ids: HashMap<NodeId, (NodeIndex, usize)>,
    next_id: u64,
    output: Option<NodeId>,
    schedule: Vec<Step>,
}

impl AudioGraph {
    /// Create an empty graph rendering blocks of at most `block_frames`.
    pub fn new(sample_rate: u32, block_frames: usize) -> Self {
        Self {
            ctx: RenderContext {
                sample_rate,
                block_frames: block_frames.max(1),
            },
            topo: StableDiGraph::with_capacity(8, 8),
            slots: Vec::with_capacity(8),
            free: Vec::new(),
            ids: HashMap::new(),
            next_id: 0,
            output: None,
            schedule: Vec::new(),
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate
    }

    #[inline]
    pub fn block_frames(&self) -> usize {
        self.ctx.block_frames
    }

    pub fn node_count(&self) -> usize {
        self.topo.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.topo.edge_count()
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.ids.contains_key(&id)
    }

    /// Add a node, allocating its channel blocks at the graph's block size.
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let inputs = (0..kind.num_inputs())
            .map(|_| SampleBuffer::new(self.ctx.block_frames))
            .collect();
        let outputs = (0..kind.num_outputs())
            .map(|_| SampleBuffer::new(self.ctx.block_frames))
            .collect();
        let slot = Slot {
            kind,
            inputs,
            outputs,
        };

        let slot_idx = match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(slot);
                i
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };

        let idx = self.topo.add_node(id);
        self.ids.insert(id, (idx, slot_idx));
        self.rebuild_schedule();
        id
    }

    /// Remove a node and every connection touching it.
    ///
    /// Returns `false` if the id is not in this graph. Node ids are never
    /// reused, so stale ids stay invalid forever.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some((idx, slot_idx)) = self.ids.remove(&id) else {
            return false;
        };
        self.topo.remove_node(idx);
        self.slots[slot_idx] = None;
        self.free.push(slot_idx);
        if self.output == Some(id) {
            self.output = None;
        }
        self.rebuild_schedule();
        true
    }

    /// Mark the terminal node whose output blocks the callback reads.
    pub fn set_output(&mut self, id: NodeId) -> Result<(), ConnectionError> {
        if !self.ids.contains_key(&id) {
            return Err(ConnectionError::NoSuchNode);
        }
        self.output = Some(id);
        Ok(())
    }

    /// Connect `src`'s output channel `src_ch` into `dst`'s input channel
    /// `dst_ch`.
    ///
    /// Fails without touching the topology when a channel is out of range,
    /// the destination channel already has an incoming connection, or the
    /// edge would close a cycle.
    pub fn connect(
        &mut self,
        src: NodeId,
        src_ch: usize,
        dst: NodeId,
        dst_ch: usize,
    ) -> Result<(), ConnectionError> {
        let &(src_idx, src_slot) = self.ids.get(&src).ok_or(ConnectionError::NoSuchNode)?;
        let &(dst_idx, dst_slot) = self.ids.get(&dst).ok_or(ConnectionError::NoSuchNode)?;

        let src_outputs = self.slots[src_slot].as_ref().map_or(0, |s| s.outputs.len());
        if src_ch >= src_outputs {
            return Err(ConnectionError::ChannelOutOfRange {
                channel: src_ch,
                available: src_outputs,
            });
        }
        let dst_inputs = self.slots[dst_slot].as_ref().map_or(0, |s| s.inputs.len());
        if dst_ch >= dst_inputs {
            return Err(ConnectionError::ChannelOutOfRange {
                channel: dst_ch,
                available: dst_inputs,
            });
        }

        let occupied = self
            .topo
            .edges_directed(dst_idx, Direction::Incoming)
            .any(|e| e.weight().dst_ch == dst_ch);
        if occupied {
            return Err(ConnectionError::DestinationOccupied(dst_ch));
        }

        if has_path_connecting(&self.topo, dst_idx, src_idx, None) {
            return Err(ConnectionError::WouldCycle);
        }

        self.topo.add_edge(src_idx, dst_idx, Wire { src_ch, dst_ch });
        self.rebuild_schedule();
        Ok(())
    }

    /// Render one block of up to `frames` frames.
    ///
    /// One topological sweep: each node's routed inputs are copied in, then
    /// the node renders, exactly once per call. Safe on the real-time thread:
    /// no allocation, locking, or I/O. `frames` is clamped to the graph's
    /// block size.
    pub fn render(&mut self, frames: usize) {
        let frames = frames.min(self.ctx.block_frames);
        let ctx = self.ctx;
        let slots = &mut self.slots;

        for step in &self.schedule {
            if let Some(slot) = slots[step.slot].as_mut() {
                for &ch in &step.silent {
                    slot.inputs[ch].silence();
                }
            }
            for &(src, src_ch, dst_ch) in &step.wires {
                copy_wire(slots, src, step.slot, src_ch, dst_ch, frames);
            }
            if let Some(slot) = slots[step.slot].as_mut() {
                let Slot {
                    kind,
                    inputs,
                    outputs,
                } = slot;
                kind.render(&ctx, inputs, outputs, frames);
            }
        }
    }

    /// Planar output blocks of the terminal node, one per hardware channel.
    ///
    /// Empty when no terminal is set. Only the frames of the most recent
    /// [`render`](Self::render) call are meaningful.
    pub fn output_channels(&self) -> &[SampleBuffer] {
        self.output
            .and_then(|id| self.ids.get(&id))
            .and_then(|&(_, slot)| self.slots[slot].as_ref())
            .map_or(&[][..], |s| s.outputs.as_slice())
    }

    /// Recompute the render schedule: Kahn's sweep over the current topology,
    /// ready ties broken by node id (= insertion order).
    fn rebuild_schedule(&mut self) {
        self.schedule.clear();

        let mut indegree: HashMap<NodeIndex, usize> =
            HashMap::with_capacity(self.topo.node_count());
        let mut ready = BinaryHeap::new();
        for idx in self.topo.node_indices() {
            let degree = self.topo.edges_directed(idx, Direction::Incoming).count();
            indegree.insert(idx, degree);
            if degree == 0 {
                ready.push(Reverse((self.topo[idx].0, idx)));
            }
        }

        while let Some(Reverse((_, idx))) = ready.pop() {
            let id = self.topo[idx];
            let Some(&(_, slot)) = self.ids.get(&id) else {
                continue;
            };

            let mut wires = Vec::new();
            for edge in self.topo.edges_directed(idx, Direction::Incoming) {
                let src_id = self.topo[edge.source()];
                if let Some(&(_, src_slot)) = self.ids.get(&src_id) {
                    let wire = edge.weight();
                    wires.push((src_slot, wire.src_ch, wire.dst_ch));
                }
            }

            let num_inputs = self.slots[slot].as_ref().map_or(0, |s| s.inputs.len());
            let silent = (0..num_inputs)
                .filter(|ch| !wires.iter().any(|&(_, _, dst_ch)| dst_ch == *ch))
                .collect();

            self.schedule.push(Step { slot, wires, silent });

            for edge in self.topo.edges_directed(idx, Direction::Outgoing) {
                let next = edge.target();
                if let Some(degree) = indegree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((self.topo[next].0, next)));
                    }
                }
            }
        }

        // Connect validation keeps the topology acyclic, so the sweep
        // always covers every node.
        debug_assert_eq!(self.schedule.len(), self.topo.node_count());
    }
}

/// Copy one wire's worth of samples between two distinct slots.
#[inline]
fn copy_wire(
    slots: &mut [Option<Slot>],
    src: usize,
    dst: usize,
    src_ch: usize,
    dst_ch: usize,
    frames: usize,
) {
    if src == dst {
        return;
    }
    let (src_slot, dst_slot) = if src < dst {
        let (head, tail) = slots.split_at_mut(dst);
        (head[src].as_ref(), tail[0].as_mut())
    } else {
        let (head, tail) = slots.split_at_mut(src);
        (tail[0].as_ref(), head[dst].as_mut())
    };
    if let (Some(src_slot), Some(dst_slot)) = (src_slot, dst_slot) {
        dst_slot.inputs[dst_ch].copy_from(&src_slot.outputs[src_ch], frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Output, Sine};

    fn graph() -> AudioGraph {
        AudioGraph::new(48_000, 64)
    }

    fn sine(g: &mut AudioGraph, hz: f32) -> NodeId {
        g.add_node(NodeKind::Sine(Sine::new(hz).with_amplitude(1.0)))
    }

    fn output(g: &mut AudioGraph, channels: usize) -> NodeId {
        let id = g.add_node(NodeKind::Output(Output::new(channels)));
        g.set_output(id).unwrap();
        id
    }

    #[test]
    fn render_fills_exactly_the_requested_frames() {
        let mut g = graph();
        let out = output(&mut g, 2);
        let src = sine(&mut g, 480.0);
        g.connect(src, 0, out, 0).unwrap();

        g.render(48);

        let channels = g.output_channels();
        assert_eq!(channels.len(), 2);
        assert!(channels[0][..48].iter().any(|s| *s != 0.0));
        // The unconnected channel stays silent.
        assert!(channels[1][..48].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn render_is_deterministic() {
        let build = || {
            let mut g = graph();
            let out = output(&mut g, 2);
            let a = sine(&mut g, 131.0);
            let b = sine(&mut g, 196.0);
            g.connect(a, 0, out, 0).unwrap();
            g.connect(b, 0, out, 1).unwrap();
            g
        };

        let mut g1 = build();
        let mut g2 = build();
        for _ in 0..4 {
            g1.render(64);
            g2.render(64);
        }

        assert_eq!(&g1.output_channels()[0][..], &g2.output_channels()[0][..]);
        assert_eq!(&g1.output_channels()[1][..], &g2.output_channels()[1][..]);
    }

    #[test]
    fn second_connection_into_occupied_channel_fails_cleanly() {
        let mut g = graph();
        let out = output(&mut g, 2);
        let a = sine(&mut g, 131.0);
        let b = sine(&mut g, 196.0);

        g.connect(a, 0, out, 0).unwrap();
        let before = g.connection_count();

        let err = g.connect(b, 0, out, 0).unwrap_err();
        assert_eq!(err, ConnectionError::DestinationOccupied(0));
        assert_eq!(g.connection_count(), before);
    }

    #[test]
    fn out_of_range_channels_are_rejected() {
        let mut g = graph();
        let out = output(&mut g, 4);
        let src = sine(&mut g, 480.0);

        let err = g.connect(src, 0, out, 98).unwrap_err();
        assert_eq!(
            err,
            ConnectionError::ChannelOutOfRange {
                channel: 98,
                available: 4
            }
        );

        let err = g.connect(src, 1, out, 0).unwrap_err();
        assert_eq!(
            err,
            ConnectionError::ChannelOutOfRange {
                channel: 1,
                available: 1
            }
        );
        assert_eq!(g.connection_count(), 0);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut g = graph();
        let a = g.add_node(NodeKind::Output(Output::new(1)));
        let b = g.add_node(NodeKind::Output(Output::new(1)));

        g.connect(a, 0, b, 0).unwrap();
        let err = g.connect(b, 0, a, 0).unwrap_err();
        assert_eq!(err, ConnectionError::WouldCycle);

        // Self-loops are cycles too.
        let err = g.connect(a, 0, a, 0).unwrap_err();
        assert_eq!(err, ConnectionError::WouldCycle);
        assert_eq!(g.connection_count(), 1);
    }

    #[test]
    fn removing_a_node_drops_its_connections() {
        let mut g = graph();
        let out = output(&mut g, 2);
        let a = sine(&mut g, 131.0);
        let b = sine(&mut g, 196.0);
        g.connect(a, 0, out, 0).unwrap();
        g.connect(b, 0, out, 1).unwrap();

        assert!(g.remove_node(a));
        assert!(!g.has_node(a));
        assert_eq!(g.connection_count(), 1);
        assert_eq!(g.node_count(), 2);

        // The freed channel is silent again, the other keeps playing.
        g.render(64);
        let channels = g.output_channels();
        assert!(channels[0][..64].iter().all(|s| *s == 0.0));
        assert!(channels[1][..64].iter().any(|s| *s != 0.0));

        // Stale ids stay invalid.
        assert!(!g.remove_node(a));
        assert_eq!(g.connect(a, 0, out, 0).unwrap_err(), ConnectionError::NoSuchNode);
    }

    #[test]
    fn disconnected_input_goes_silent_after_source_removal() {
        let mut g = graph();
        let out = output(&mut g, 1);
        let src = sine(&mut g, 480.0);
        g.connect(src, 0, out, 0).unwrap();

        g.render(64);
        assert!(g.output_channels()[0][..64].iter().any(|s| *s != 0.0));

        g.remove_node(src);
        g.render(64);
        assert!(g.output_channels()[0][..64].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn render_clamps_to_block_size() {
        let mut g = AudioGraph::new(48_000, 32);
        let out = output(&mut g, 1);
        let src = sine(&mut g, 480.0);
        g.connect(src, 0, out, 0).unwrap();

        // Oversized requests render one full block, no more.
        g.render(4096);
        assert_eq!(g.output_channels()[0].frames(), 32);
    }

    #[test]
    fn graph_without_terminal_renders_nothing() {
        let mut g = graph();
        let _src = sine(&mut g, 480.0);
        g.render(64);
        assert!(g.output_channels().is_empty());
    }
}
