//! Fixed-size per-channel sample blocks.

use std::ops::{Deref, DerefMut};

/// A fixed-length block of f32 samples for one channel.
///
/// Buffers are allocated when a node joins the graph and are never resized
/// mid-stream; render passes fill them in place. Nothing retains a reference
/// past its render call.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    data: Box<[f32]>,
}

impl SampleBuffer {
    /// Allocate a zeroed block of `frames` samples.
    pub fn new(frames: usize) -> Self {
        Self {
            data: vec![0.0; frames].into_boxed_slice(),
        }
    }

    /// Block length in frames.
    #[inline]
    pub fn frames(&self) -> usize {
        self.data.len()
    }

    /// Zero the whole block.
    #[inline]
    pub fn silence(&mut self) {
        self.data.fill(0.0);
    }

    /// Copy the first `frames` samples from `other` into this block.
    #[inline]
    pub fn copy_from(&mut self, other: &SampleBuffer, frames: usize) {
        self.data[..frames].copy_from_slice(&other.data[..frames]);
    }
}

impl Deref for SampleBuffer {
    type Target = [f32];

    #[inline]
    fn deref(&self) -> &[f32] {
        &self.data
    }
}

impl DerefMut for SampleBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_silent() {
        let buf = SampleBuffer::new(64);
        assert_eq!(buf.frames(), 64);
        assert!(buf.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn copy_from_is_bounded() {
        let mut a = SampleBuffer::new(8);
        let mut b = SampleBuffer::new(8);
        b.iter_mut().for_each(|s| *s = 1.0);

        a.copy_from(&b, 4);
        assert_eq!(&a[..4], &[1.0; 4]);
        assert_eq!(&a[4..], &[0.0; 4]);

        a.silence();
        assert!(a.iter().all(|s| *s == 0.0));
    }
}
