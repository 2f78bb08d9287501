//! Audio-graph playback engine with a real-time device callback.
//!
//! Design principles:
//! - Nodes are a closed set of variants with a uniform render contract
//! - Topology changes only happen while the callback is not registered
//! - The real-time path never allocates, locks, or performs I/O
//! - Decoded audio crosses threads through a lock-free SPSC ring

pub mod buffer;
pub mod callback;
pub mod controller;
pub mod device;
pub mod error;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod source;

pub use buffer::SampleBuffer;
pub use callback::{FaultFlags, RealtimeCallback};
pub use controller::{ControllerState, Outcome, PlaybackController, PlaybackSession, StopHandle};
pub use device::{DesiredConfig, DeviceDescriptor, DeviceManager, OpenDevice, StreamHandle};
pub use error::{ConnectionError, DecodeError, DeviceError, PlaybackError, RuntimeFault};
pub use graph::AudioGraph;
pub use node::{AudioNode, NodeId, NodeKind, RenderContext};
pub use nodes::{FilePlayer, Output, PlayerHandle, Sine};
pub use source::SampleSource;
