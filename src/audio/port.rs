// Audio hardware port - cpal output stream feeding the channel router
//
// cpal streams are not Send, so each port owns a thread that builds the stream,
// keeps it alive and drops it when the port is closed. The render callback
// try_locks the router and outputs silence when it cannot.
//
// Supported device sample formats: F32, I16, U16. Rendering is always f32 and
// converted per sample with `FromSample<f32>`.

use super::dsp_utils::hard_clip;
use super::routing::ChannelRouter;
use crate::connection::{DeviceError, DevicePort, FaultReporter, PortConnector};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream,
    StreamConfig,
};
use std::convert::Infallible;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

/// Largest block rendered in one go; longer callbacks are split
const MAX_RENDER_FRAMES: usize = 4096;

/// Opens output devices and attaches them to a shared router
#[derive(Clone)]
pub struct CpalConnector {
    router: Arc<Mutex<ChannelRouter>>,
    sample_rate: u32,
    buffer_frames: Option<u32>,
}

impl CpalConnector {
    pub fn new(router: Arc<Mutex<ChannelRouter>>, sample_rate: u32, buffer_frames: Option<u32>) -> Self {
        Self {
            router,
            sample_rate,
            buffer_frames,
        }
    }

    fn channels(&self) -> usize {
        self.router
            .lock()
            .map(|r| r.channels())
            .unwrap_or_else(|poisoned| poisoned.into_inner().channels())
    }
}

/// A running output stream. Dropping it stops the stream.
pub struct CpalPort {
    name: String,
    shutdown: Option<mpsc::Sender<()>>,
}

impl CpalPort {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DevicePort for CpalPort {
    // The audio port is pull-based: nothing is ever sent to it
    type Message = Infallible;

    fn send(&mut self, message: &Infallible) -> Result<(), DeviceError> {
        match *message {}
    }
}

impl Drop for CpalPort {
    fn drop(&mut self) {
        // The owner thread drops the stream once the channel closes. Not joined:
        // this may run on a driver thread.
        self.shutdown.take();
    }
}

fn find_device(name: &str) -> Result<Device, DeviceError> {
    let host = cpal::default_host();

    if name.eq_ignore_ascii_case("default") {
        return host
            .default_output_device()
            .ok_or_else(|| DeviceError::NotFound(name.to_string()));
    }

    let devices = host.output_devices().map_err(|e| DeviceError::Open {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    let pattern = name.to_lowercase();
    let mut partial = None;
    for device in devices {
        let Ok(device_name) = device.name() else { continue };
        if device_name == name {
            return Ok(device);
        }
        if partial.is_none() && device_name.to_lowercase().contains(&pattern) {
            partial = Some(device);
        }
    }
    partial.ok_or_else(|| DeviceError::NotFound(name.to_string()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    router: Arc<Mutex<ChannelRouter>>,
    faults: FaultReporter,
) -> Result<Stream, DeviceError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let mut scratch = vec![0.0f32; MAX_RENDER_FRAMES * channels];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // No allocations, no I/O, no blocking locks
                let Ok(mut router) = router.try_lock() else {
                    data.fill(T::EQUILIBRIUM);
                    return;
                };

                for block in data.chunks_mut(MAX_RENDER_FRAMES * channels) {
                    let frames = block.len() / channels;
                    let rendered = &mut scratch[..frames * channels];
                    router.render(rendered, frames);
                    for (out, sample) in block.iter_mut().zip(rendered.iter()) {
                        *out = T::from_sample(hard_clip(*sample));
                    }
                }
            },
            move |err| {
                // Runs outside the render callback
                faults.report(DeviceError::Stream(err.to_string()));
            },
            None,
        )
        .map_err(|e| DeviceError::Open {
            name: device.name().unwrap_or_default(),
            reason: e.to_string(),
        })
}

fn open_stream(
    name: &str,
    sample_rate: u32,
    buffer_frames: Option<u32>,
    channels: usize,
    router: Arc<Mutex<ChannelRouter>>,
    faults: FaultReporter,
) -> Result<Stream, DeviceError> {
    let device = find_device(name)?;
    let supported = device.default_output_config().map_err(|e| DeviceError::Open {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    let config = StreamConfig {
        channels: channels as u16,
        sample_rate: SampleRate(sample_rate),
        buffer_size: buffer_frames.map_or(BufferSize::Default, BufferSize::Fixed),
    };
    log::info!(
        "Audio: '{}' {} Hz, {} channels, {:?}",
        device.name().unwrap_or_else(|_| name.to_string()),
        sample_rate,
        channels,
        supported.sample_format()
    );

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, router, faults),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, router, faults),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, router, faults),
        other => Err(DeviceError::Open {
            name: name.to_string(),
            reason: format!("unsupported sample format {:?}", other),
        }),
    }?;

    stream.play().map_err(|e| DeviceError::Open {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(stream)
}

impl PortConnector for CpalConnector {
    type Port = CpalPort;

    fn open(&self, name: &str, faults: FaultReporter) -> Result<CpalPort, DeviceError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let device_name = name.to_string();
        let sample_rate = self.sample_rate;
        let buffer_frames = self.buffer_frames;
        let channels = self.channels();
        let router = Arc::clone(&self.router);

        thread::Builder::new()
            .name(format!("audio-{}", name))
            .spawn(move || {
                let stream = match open_stream(
                    &device_name,
                    sample_rate,
                    buffer_frames,
                    channels,
                    router,
                    faults,
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until the port is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                log::debug!("Audio stream '{}' closed", device_name);
            })
            .map_err(|e| DeviceError::Open {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(CpalPort {
                name: name.to_string(),
                shutdown: Some(shutdown_tx),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DeviceError::Open {
                name: name.to_string(),
                reason: "audio thread exited".to_string(),
            }),
        }
    }

    fn available(&self) -> Vec<String> {
        match cpal::default_host().output_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                log::warn!("Audio: Failed to enumerate devices: {}", e);
                Vec::new()
            }
        }
    }
}
