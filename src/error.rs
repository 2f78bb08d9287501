//! Error taxonomy for device, decode, graph, and playback failures.

use std::path::PathBuf;

use thiserror::Error;

/// Failures opening or enumerating output devices.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The requested (or default) device could not be found or claimed.
    #[error("audio device unavailable: {0}")]
    Unavailable(String),

    /// The device exists but cannot honor the requested channel count,
    /// sample rate, or sample format.
    #[error("unsupported device configuration: {0}")]
    UnsupportedConfiguration(String),
}

/// Failures opening or decoding a sound file.
///
/// These surface at [`SampleSource::open`](crate::SampleSource::open) time
/// wherever possible; decode faults mid-stream are demoted to end-of-stream
/// and reported through [`SampleSource::take_error`](crate::SampleSource::take_error).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot open {path}: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported audio format in {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("corrupt audio data: {0}")]
    CorruptData(String),
}

/// Failures wiring nodes together in an [`AudioGraph`](crate::AudioGraph).
///
/// A failed connect leaves the graph's topology unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("channel {channel} out of range (node has {available})")]
    ChannelOutOfRange { channel: usize, available: usize },

    #[error("destination channel {0} already has an incoming connection")]
    DestinationOccupied(usize),

    #[error("connection would introduce a cycle")]
    WouldCycle,

    #[error("no such node in this graph")]
    NoSuchNode,
}

/// Diagnostic faults recorded on the real-time path.
///
/// Never propagated as errors across the callback boundary; the render path
/// emits silence instead, raises a one-shot flag, and the controller reports
/// the fault after playback ends.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFault {
    #[error("audio callback overran its deadline")]
    CallbackOverrun,

    #[error("decode ring ran empty while the source was still live")]
    RingStarved,
}

/// Top-level playback failure carried by the controller's `Failed` state.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Graph(#[from] ConnectionError),
}
