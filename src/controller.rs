//! Non-real-time playback orchestration.
//!
//! The controller owns the device manager and drives one playback session
//! end to end: open the device, build the graph, hand the graph to the
//! real-time callback, then block until the decode worker signals the
//! outcome. All topology work happens strictly before the callback is
//! registered and after the stream is closed.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};

use rtrb::RingBuffer;
use tracing::{info, warn};

use crate::callback::{FaultFlags, RealtimeCallback};
use crate::device::{DesiredConfig, DeviceManager};
use crate::error::{ConnectionError, PlaybackError, RuntimeFault};
use crate::graph::AudioGraph;
use crate::node::NodeKind;
use crate::nodes::{FilePlayer, Output};
use crate::source::{DecodeWorker, SampleSource};

/// How a playback session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The source was exhausted and the ring drained.
    Finished,
    /// An external stop request ended the session early.
    Stopped,
}

/// Controller lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    DeviceOpen,
    GraphBuilt,
    Playing,
    Finished,
    Stopped,
    Failed,
}

/// The (file, channel, device) tuple for one invocation.
#[derive(Clone, Debug)]
pub struct PlaybackSession {
    pub file: PathBuf,
    /// 1-based output channel index on the opened device.
    pub channel: u16,
    /// Output device name; `None` uses the system default.
    pub device: Option<String>,
}

/// Condvar-backed session outcome, set exactly once.
///
/// Signalled only from non-real-time threads (the decode worker or a stop
/// request); the real-time callback never synchronizes.
#[derive(Debug)]
pub(crate) struct Completion {
    outcome: Mutex<Option<Outcome>>,
    cond: Condvar,
}

impl Completion {
    pub(crate) fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    /// First signal wins; later ones are ignored.
    pub(crate) fn signal(&self, outcome: Outcome) {
        let mut slot = self.outcome.lock().unwrap();
        if slot.is_none() {
            *slot = Some(outcome);
            self.cond.notify_all();
        }
    }

    /// Clear the slot for the next session. Must not be called while a
    /// session is running.
    fn reset(&self) {
        *self.outcome.lock().unwrap() = None;
    }

    pub(crate) fn is_set(&self) -> bool {
        self.outcome.lock().unwrap().is_some()
    }

    /// Block until a signal arrives.
    fn wait(&self) -> Outcome {
        let mut slot = self.outcome.lock().unwrap();
        loop {
            match *slot {
                Some(outcome) => return outcome,
                None => slot = self.cond.wait(slot).unwrap(),
            }
        }
    }
}

/// Requests an early end to a running session.
///
/// Cloneable and safe from any thread; stopping an already-ended session is
/// a no-op.
#[derive(Clone)]
pub struct StopHandle {
    completion: Arc<Completion>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.completion.signal(Outcome::Stopped);
    }
}

/// Orchestrates one playback session.
pub struct PlaybackController {
    manager: DeviceManager,
    completion: Arc<Completion>,
    faults: Arc<FaultFlags>,
    state: ControllerState,
}

impl PlaybackController {
    pub fn new(manager: DeviceManager) -> Self {
        Self {
            manager,
            completion: Arc::new(Completion::new()),
            faults: Arc::new(FaultFlags::new()),
            state: ControllerState::Idle,
        }
    }

    #[inline]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Handle for stopping the session driven by [`play`](Self::play).
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            completion: Arc::clone(&self.completion),
        }
    }

    /// Drive a session end to end, blocking until it finishes, is stopped,
    /// or fails.
    ///
    /// Any setup failure short-circuits before the real-time callback is
    /// registered and leaves the controller in `Failed`; the device handle
    /// is released on the way out. The controller is reusable: each call
    /// starts from `Idle` with fresh session state, and previously handed
    /// out [`StopHandle`]s keep targeting whichever session is running.
    pub fn play(&mut self, session: PlaybackSession) -> Result<Outcome, PlaybackError> {
        self.completion.reset();
        self.faults.reset();
        self.state = ControllerState::Idle;
        match self.run_session(&session) {
            Ok(outcome) => {
                self.state = match outcome {
                    Outcome::Finished => ControllerState::Finished,
                    Outcome::Stopped => ControllerState::Stopped,
                };
                Ok(outcome)
            }
            Err(err) => {
                self.state = ControllerState::Failed;
                Err(err)
            }
        }
    }

    fn run_session(&mut self, session: &PlaybackSession) -> Result<Outcome, PlaybackError> {
        let device = self
            .manager
            .open(session.device.as_deref(), &DesiredConfig::default())?;
        self.state = ControllerState::DeviceOpen;
        info!(
            device = device.name(),
            sample_rate = device.sample_rate(),
            channels = device.channels(),
            "device open"
        );

        let source = SampleSource::open(&session.file)?;
        if source.sample_rate() != device.sample_rate() {
            warn!(
                file_rate = source.sample_rate(),
                device_rate = device.sample_rate(),
                "sample rate mismatch; playing without conversion"
            );
        }

        let out_channels = usize::from(device.channels());
        let mut graph = AudioGraph::new(device.sample_rate(), device.block_frames());
        let output = graph.add_node(NodeKind::Output(Output::new(out_channels)));
        graph.set_output(output)?;

        // Half a second of decoded mono audio between the worker and the
        // player.
        let ring_capacity = (device.sample_rate() as usize / 2).next_power_of_two();
        let (producer, consumer) = RingBuffer::new(ring_capacity);
        let (player_node, player) = FilePlayer::new(consumer);
        let player_id = graph.add_node(NodeKind::FilePlayer(player_node));

        let Some(dst_ch) = usize::from(session.channel).checked_sub(1) else {
            return Err(ConnectionError::ChannelOutOfRange {
                channel: 0,
                available: out_channels,
            }
            .into());
        };
        graph.connect(player_id, 0, output, dst_ch)?;
        self.state = ControllerState::GraphBuilt;

        let mut worker = DecodeWorker::new(
            source,
            producer,
            player.clone(),
            Arc::clone(&self.completion),
        );
        worker.prime();
        let worker = worker.spawn();

        let callback = RealtimeCallback::new(graph, out_channels, Arc::clone(&self.faults));
        let mut stream = match device.start(callback) {
            Ok(stream) => stream,
            Err(err) => {
                // Reap the worker before reporting the failure.
                self.completion.signal(Outcome::Stopped);
                let _ = worker.join();
                return Err(err.into());
            }
        };
        self.state = ControllerState::Playing;
        info!(
            file = %session.file.display(),
            channel = session.channel,
            "playing"
        );

        let outcome = self.completion.wait();

        // Unregister the callback (dropping the graph with it) before any
        // further teardown, then reap the worker.
        stream.close();
        if worker.join().is_err() {
            warn!("decode worker panicked");
        }

        for fault in self.faults.faults() {
            warn!(%fault, "realtime fault during playback");
        }
        if player.was_starved() {
            warn!(fault = %RuntimeFault::RingStarved, "realtime fault during playback");
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_keeps_the_first_signal() {
        let completion = Completion::new();
        completion.signal(Outcome::Stopped);
        completion.signal(Outcome::Finished);
        assert_eq!(completion.wait(), Outcome::Stopped);
        assert!(completion.is_set());
    }

    #[test]
    fn reset_clears_the_way_for_the_next_session() {
        let completion = Completion::new();
        completion.signal(Outcome::Finished);
        completion.reset();
        assert!(!completion.is_set());

        completion.signal(Outcome::Stopped);
        assert_eq!(completion.wait(), Outcome::Stopped);
    }

    #[test]
    fn stop_handle_unblocks_a_waiter() {
        let controller = PlaybackController::new(DeviceManager::new());
        let stop = controller.stop_handle();
        let completion = Arc::clone(&controller.completion);

        let waiter = std::thread::spawn(move || completion.wait());
        stop.stop();
        assert_eq!(waiter.join().unwrap(), Outcome::Stopped);
    }

    #[test]
    fn unknown_device_fails_before_any_stream_exists() {
        let mut controller = PlaybackController::new(DeviceManager::new());
        let err = controller
            .play(PlaybackSession {
                file: PathBuf::from("ignored.wav"),
                channel: 1,
                device: Some("kanal-test-no-such-device".into()),
            })
            .unwrap_err();

        assert!(matches!(err, PlaybackError::Device(_)));
        assert_eq!(controller.state(), ControllerState::Failed);
    }
}
