//! Output device discovery, opening, and stream management.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use tracing::{debug, warn};

use crate::callback::RealtimeCallback;
use crate::error::DeviceError;

/// Render block size used when the device does not report a fixed buffer
/// size. The callback splits larger hardware buffers into sub-blocks, so
/// this only bounds per-pass work.
const DEFAULT_BLOCK_FRAMES: usize = 1024;

/// A discovered output device.
#[derive(Clone, Debug)]
pub struct DeviceDescriptor {
    pub name: String,
    /// Audio backend (host) the device belongs to, e.g. ALSA or CoreAudio.
    pub backend: String,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Desired stream parameters for [`DeviceManager::open`].
///
/// `None` fields accept the device default.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesiredConfig {
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
}

/// Enumerates and opens output devices on the platform's default audio host.
pub struct DeviceManager {
    host: cpal::Host,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// Enumerate output devices.
    ///
    /// Non-real-time: hardware probing may take a while. Devices that fail
    /// to report a name or default configuration are skipped.
    pub fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, DeviceError> {
        let backend = self.host.id().name();
        let devices = self
            .host
            .output_devices()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        Ok(devices
            .filter_map(|device| {
                let name = device.name().ok()?;
                let config = device.default_output_config().ok()?;
                Some(DeviceDescriptor {
                    name,
                    backend: backend.to_string(),
                    channels: config.channels(),
                    sample_rate: config.sample_rate().0,
                })
            })
            .collect())
    }

    /// Open an output device by exact name, or the system default when
    /// `name` is `None`.
    ///
    /// No fallback: a named device that cannot be found or claimed is
    /// `Unavailable`, and a device that cannot honor the desired channel
    /// count / sample rate / sample format is `UnsupportedConfiguration`.
    pub fn open(
        &self,
        name: Option<&str>,
        desired: &DesiredConfig,
    ) -> Result<OpenDevice, DeviceError> {
        let device = match name {
            Some(wanted) => {
                let mut devices = self
                    .host
                    .output_devices()
                    .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
                devices
                    .find(|d| d.name().ok().as_deref() == Some(wanted))
                    .ok_or_else(|| {
                        DeviceError::Unavailable(format!("output device '{wanted}' not found"))
                    })?
            }
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| DeviceError::Unavailable("no default output device".into()))?,
        };

        let default = device
            .default_output_config()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        let channels = desired.channels.unwrap_or_else(|| default.channels());
        let sample_rate = desired.sample_rate.unwrap_or_else(|| default.sample_rate().0);

        let supported = device
            .supported_output_configs()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?
            .find(|range| {
                range.channels() == channels
                    && range.min_sample_rate().0 <= sample_rate
                    && range.max_sample_rate().0 >= sample_rate
            })
            .ok_or_else(|| {
                DeviceError::UnsupportedConfiguration(format!(
                    "{channels} channels at {sample_rate} Hz"
                ))
            })?;

        let sample_format = supported.sample_format();
        if !matches!(
            sample_format,
            SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
        ) {
            return Err(DeviceError::UnsupportedConfiguration(format!(
                "sample format {sample_format:?}"
            )));
        }

        let config = supported.with_sample_rate(SampleRate(sample_rate)).config();
        let name = device.name().unwrap_or_else(|_| "unknown".into());

        debug!(
            device = %name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            format = ?sample_format,
            "opened output device"
        );

        Ok(OpenDevice {
            device,
            config,
            sample_format,
            name,
        })
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// An exclusively claimed output device, configured but not yet streaming.
pub struct OpenDevice {
    device: cpal::Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    name: String,
}

impl OpenDevice {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Frames per render block for graphs feeding this device.
    pub fn block_frames(&self) -> usize {
        match self.config.buffer_size {
            BufferSize::Fixed(frames) => frames as usize,
            BufferSize::Default => DEFAULT_BLOCK_FRAMES,
        }
    }

    /// Install `callback` as the real-time entry point and start the stream.
    ///
    /// Consumes the device handle; the callback (and the graph inside it)
    /// lives exactly as long as the returned stream.
    pub fn start(self, mut callback: RealtimeCallback) -> Result<StreamHandle, DeviceError> {
        let err_fn = |err: cpal::StreamError| warn!("output stream error: {err}");

        let stream = match self.sample_format {
            SampleFormat::F32 => self.device.build_output_stream(
                &self.config,
                move |data: &mut [f32], _| callback.fill_f32(data),
                err_fn,
                None,
            ),
            SampleFormat::I16 => self.device.build_output_stream(
                &self.config,
                move |data: &mut [i16], _| callback.fill_i16(data),
                err_fn,
                None,
            ),
            SampleFormat::U16 => self.device.build_output_stream(
                &self.config,
                move |data: &mut [u16], _| callback.fill_u16(data),
                err_fn,
                None,
            ),
            format => {
                return Err(DeviceError::UnsupportedConfiguration(format!(
                    "sample format {format:?}"
                )))
            }
        }
        .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        Ok(StreamHandle {
            stream: Some(stream),
        })
    }
}

/// A running output stream.
///
/// Closing (or dropping) the handle stops the stream and unregisters the
/// real-time callback, destroying the graph it owns.
pub struct StreamHandle {
    stream: Option<cpal::Stream>,
}

impl StreamHandle {
    /// Stop the stream and drop the callback. Idempotent, and safe to call
    /// during teardown even if playback never started.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("failed to pause output stream: {e}");
            }
            drop(stream);
        }
    }

    /// Whether the stream has already been closed.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}
