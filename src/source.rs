//! File decoding and the decode-ahead worker.
//!
//! [`SampleSource`] wraps a symphonia format reader + decoder and hands out
//! interleaved f32 frames. It is strictly non-real-time: the real-time
//! player never calls into it. [`DecodeWorker`] bridges the two domains by
//! topping up a lock-free ring ahead of the callback's demand.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtrb::Producer;
use symphonia::core::audio::SampleBuffer as DecodedBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::controller::{Completion, Outcome};
use crate::error::DecodeError;
use crate::nodes::PlayerHandle;

/// Frames decoded per refill chunk.
const CHUNK_FRAMES: usize = 4096;
/// How long the worker naps when the ring has no room for a chunk.
const REFILL_INTERVAL: Duration = Duration::from_millis(10);
/// Poll cadence of the post-exhaustion drain watch.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Decodes an audio file into interleaved f32 frames.
///
/// `open` fails fast on a missing or undecodable file. Decode faults after
/// that are demoted to end-of-stream: `read_frames` simply comes up short,
/// [`is_exhausted`](Self::is_exhausted) flips, and the fault is held for the
/// controller in [`take_error`](Self::take_error). A file with a valid
/// header but no audio frames opens fine and reports exhaustion on the
/// first read.
pub struct SampleSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    converted: Option<DecodedBuffer<f32>>,
    pending: Vec<f32>,
    pending_pos: usize,
    exhausted: bool,
    error: Option<DecodeError>,
}

impl SampleSource {
    /// Probe `path` and set up a decoder for its first audio track.
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path).map_err(|source| DecodeError::NotFound {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "no audio track".into(),
            })?;
        let track_id = track.id;

        let sample_rate =
            track
                .codec_params
                .sample_rate
                .ok_or_else(|| DecodeError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    reason: "unknown sample rate".into(),
                })?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .filter(|c| *c > 0)
            .ok_or_else(|| DecodeError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "unknown channel layout".into(),
            })?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        debug!(
            path = %path.display(),
            sample_rate,
            channels,
            "opened sample source"
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            converted: None,
            pending: Vec::new(),
            pending_pos: 0,
            exhausted: false,
            error: None,
        })
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whether the stream has ended (cleanly or via a demoted decode fault).
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.pending_pos >= self.pending.len()
    }

    /// Take the decode fault that ended the stream early, if any.
    pub fn take_error(&mut self) -> Option<DecodeError> {
        self.error.take()
    }

    /// Append up to `max_frames` interleaved frames to `out`.
    ///
    /// Returns the number of frames appended; fewer than requested only at
    /// end-of-stream.
    pub fn read_frames(&mut self, out: &mut Vec<f32>, max_frames: usize) -> usize {
        let mut appended = 0;
        while appended < max_frames {
            if self.pending_pos >= self.pending.len() && !self.decode_next_packet() {
                break;
            }
            let want = (max_frames - appended) * self.channels;
            let avail = self.pending.len() - self.pending_pos;
            let take = want.min(avail);
            out.extend_from_slice(&self.pending[self.pending_pos..self.pending_pos + take]);
            self.pending_pos += take;
            appended += take / self.channels;
        }
        appended
    }

    /// Decode packets until one yields samples for our track. Returns false
    /// at end-of-stream.
    fn decode_next_packet(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.exhausted = true;
                    return false;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.exhausted = true;
                    return false;
                }
                Err(e) => {
                    self.exhausted = true;
                    self.error = Some(DecodeError::CorruptData(e.to_string()));
                    return false;
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }
                    let converted = self.converted.get_or_insert_with(|| {
                        DecodedBuffer::new(decoded.capacity() as u64, *decoded.spec())
                    });
                    converted.copy_interleaved_ref(decoded);
                    self.pending.clear();
                    self.pending.extend_from_slice(converted.samples());
                    self.pending_pos = 0;
                    return true;
                }
                // Per symphonia's contract a DecodeError is recoverable:
                // skip the bad packet and keep going.
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("skipping undecodable packet: {e}");
                    continue;
                }
                Err(e) => {
                    self.exhausted = true;
                    self.error = Some(DecodeError::CorruptData(e.to_string()));
                    return false;
                }
            }
        }
    }
}

/// Decode-ahead worker: keeps the player's ring topped up from its own
/// thread, then watches for drain and reports the session outcome.
///
/// The worker is the non-real-time observer of the player's transport flags;
/// the real-time callback itself never signals anything.
pub(crate) struct DecodeWorker {
    source: SampleSource,
    ring: Producer<f32>,
    player: PlayerHandle,
    completion: Arc<Completion>,
    scratch: Vec<f32>,
}

impl DecodeWorker {
    pub(crate) fn new(
        source: SampleSource,
        ring: Producer<f32>,
        player: PlayerHandle,
        completion: Arc<Completion>,
    ) -> Self {
        let channels = source.channels();
        Self {
            source,
            ring,
            player,
            completion,
            scratch: Vec::with_capacity(CHUNK_FRAMES * channels),
        }
    }

    /// Fill the ring as far as possible before playback starts, so the first
    /// callbacks never see an empty ring for a readable file.
    pub(crate) fn prime(&mut self) {
        while !self.source.is_exhausted() && self.ring.slots() >= CHUNK_FRAMES {
            self.push_chunk();
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        thread::Builder::new()
            .name("kanal-decode".into())
            .spawn(move || self.run())
            .expect("spawn decode worker thread")
    }

    fn run(mut self) {
        loop {
            if self.completion.is_set() {
                return;
            }
            if self.source.is_exhausted() {
                break;
            }
            if self.ring.slots() >= CHUNK_FRAMES {
                self.push_chunk();
            } else {
                thread::sleep(REFILL_INTERVAL);
            }
        }

        self.player.mark_exhausted();
        if let Some(err) = self.source.take_error() {
            warn!("decode ended early: {err}");
        }

        // Drain watch: the player clears its flag once the ring empties out.
        while !self.completion.is_set() {
            if !self.player.is_playing() {
                self.completion.signal(Outcome::Finished);
                return;
            }
            thread::sleep(DRAIN_POLL);
        }
    }

    /// Decode one chunk, downmix to mono, push into the ring.
    ///
    /// Callers guarantee at least [`CHUNK_FRAMES`] free slots, so the pushes
    /// cannot fail.
    fn push_chunk(&mut self) {
        self.scratch.clear();
        let got = self.source.read_frames(&mut self.scratch, CHUNK_FRAMES);
        if got == 0 {
            return;
        }
        let channels = self.source.channels();
        for frame in self.scratch.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() / channels as f32;
            if self.ring.push(mono).is_err() {
                return;
            }
        }
    }
}
