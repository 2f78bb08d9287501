//! File-backed player node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rtrb::Consumer;

use crate::buffer::SampleBuffer;
use crate::node::{AudioNode, RenderContext};

/// Transport state shared between the player node (real-time consumer), the
/// decode worker (non-real-time producer), and the controller. Touched with
/// atomic loads and stores only.
#[derive(Debug)]
struct PlayerShared {
    playing: AtomicBool,
    exhausted: AtomicBool,
    starved: AtomicBool,
}

/// Observer handle for a [`FilePlayer`]'s transport state.
///
/// Cloneable and safe to use from any non-real-time thread.
#[derive(Clone, Debug)]
pub struct PlayerHandle {
    shared: Arc<PlayerShared>,
}

impl PlayerHandle {
    /// Whether the player still has audio to emit.
    ///
    /// Flips to `false` once the decode ring has drained after the source
    /// was marked exhausted.
    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    /// Signal that no more samples will be pushed into the ring.
    ///
    /// Called by the producer side once decoding reaches end-of-stream; the
    /// player then finishes the remaining ring contents and stops.
    pub fn mark_exhausted(&self) {
        self.shared.exhausted.store(true, Ordering::Release);
    }

    /// One-shot diagnostic: the ring ran empty while the source was live.
    pub fn was_starved(&self) -> bool {
        self.shared.starved.load(Ordering::Relaxed)
    }
}

/// Plays mono samples from a lock-free decode ring.
///
/// The ring is filled by a non-real-time worker; `render` only pops, so the
/// real-time thread never touches the file or the decoder. An empty ring
/// yields silence: end-of-playback when the producer has marked the source
/// exhausted, a starvation diagnostic otherwise.
pub struct FilePlayer {
    ring: Consumer<f32>,
    shared: Arc<PlayerShared>,
}

impl FilePlayer {
    /// Create a player reading from `ring`, plus an observer handle for the
    /// producer and controller sides.
    pub fn new(ring: Consumer<f32>) -> (Self, PlayerHandle) {
        let shared = Arc::new(PlayerShared {
            playing: AtomicBool::new(true),
            exhausted: AtomicBool::new(false),
            starved: AtomicBool::new(false),
        });
        let handle = PlayerHandle {
            shared: Arc::clone(&shared),
        };
        (Self { ring, shared }, handle)
    }

    /// Whether the player still has audio to emit.
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }
}

impl AudioNode for FilePlayer {
    fn render(
        &mut self,
        _ctx: &RenderContext,
        _inputs: &[SampleBuffer],
        outputs: &mut [SampleBuffer],
        frames: usize,
    ) {
        let Some(out) = outputs.first_mut() else {
            return;
        };

        if !self.shared.playing.load(Ordering::Acquire) {
            out[..frames].fill(0.0);
            return;
        }

        let mut filled = 0;
        while filled < frames {
            match self.ring.pop() {
                Ok(sample) => {
                    out[filled] = sample;
                    filled += 1;
                }
                Err(_) => break,
            }
        }

        if filled < frames {
            out[filled..frames].fill(0.0);
            if self.shared.exhausted.load(Ordering::Acquire) {
                self.shared.playing.store(false, Ordering::Release);
            } else {
                self.shared.starved.store(true, Ordering::Relaxed);
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use rtrb::RingBuffer;

    fn ctx() -> RenderContext {
        RenderContext {
            sample_rate: 48_000,
            block_frames: 8,
        }
    }

    #[test]
    fn plays_ring_contents_then_stops_when_exhausted() {
        let (mut producer, consumer) = RingBuffer::new(16);
        let (mut player, handle) = FilePlayer::new(consumer);
        for i in 0..4 {
            producer.push(i as f32).ok();
        }
        handle.mark_exhausted();

        let mut out = vec![SampleBuffer::new(8)];
        player.render(&ctx(), &[], &mut out, 8);

        assert_eq!(&out[0][..4], &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(&out[0][4..8], &[0.0; 4]);
        assert!(!handle.is_playing());
        assert!(!handle.was_starved());
    }

    #[test]
    fn empty_ring_without_exhaustion_is_starvation() {
        let (_producer, consumer) = RingBuffer::<f32>::new(16);
        let (mut player, handle) = FilePlayer::new(consumer);

        let mut out = vec![SampleBuffer::new(8)];
        player.render(&ctx(), &[], &mut out, 8);

        assert!(handle.is_playing());
        assert!(handle.was_starved());
        assert_eq!(&out[0][..8], &[0.0; 8]);
    }
}
