// Audio Routing - Channel-pair compositing onto the hardware buffer
//
// Each registered stereo source owns one pair of output channels. Sources
// render into a preallocated scratch buffer, which is then added into the
// interleaved hardware buffer at the source's channel offset.
//
// Real-time constraints:
// - No allocations during rendering (scratch is sized at construction)
// - Long requests are rendered in scratch-sized chunks

use thiserror::Error;

/// Pull-based renderer over the audio callback contract
pub trait AudioSource: Send {
    /// Interleaved channel count this source produces
    fn channels(&self) -> usize;

    /// Render up to `frames` interleaved frames into `out`.
    /// Returns the number of frames actually produced; the rest is treated as silence.
    fn render(&mut self, out: &mut [f32], frames: usize) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("Source must be stereo, got {0} channels")]
    NotStereo(usize),

    #[error("Channel offset {offset} leaves no room for a stereo pair in {channels} channels")]
    OffsetOutOfRange { offset: usize, channels: usize },

    #[error("Output needs at least 2 channels, got {0}")]
    TooFewChannels(usize),
}

struct RoutedSource {
    source: Box<dyn AudioSource>,
    offset: usize,
}

/// Composites stereo sources into one interleaved multi-channel output
pub struct ChannelRouter {
    channels: usize,
    max_chunk_frames: usize,
    scratch: Vec<f32>,
    sources: Vec<RoutedSource>,
}

impl ChannelRouter {
    /// `max_chunk_frames` sizes the scratch buffer; larger requests are split
    pub fn new(channels: usize, max_chunk_frames: usize) -> Result<Self, RoutingError> {
        if channels < 2 {
            return Err(RoutingError::TooFewChannels(channels));
        }
        let max_chunk_frames = max_chunk_frames.max(1);

        Ok(Self {
            channels,
            max_chunk_frames,
            scratch: vec![0.0; max_chunk_frames * 2],
            sources: Vec::new(),
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Register a stereo source on channels `offset` and `offset + 1`
    pub fn add_source(
        &mut self,
        source: Box<dyn AudioSource>,
        offset: usize,
    ) -> Result<(), RoutingError> {
        if source.channels() != 2 {
            return Err(RoutingError::NotStereo(source.channels()));
        }
        // channels >= 2, checked in new
        if offset >= self.channels - 1 {
            return Err(RoutingError::OffsetOutOfRange {
                offset,
                channels: self.channels,
            });
        }

        log::debug!("Routing source to channels {}-{}", offset, offset + 1);
        self.sources.push(RoutedSource { source, offset });
        Ok(())
    }

    /// Fill `out` with `frames` interleaved frames. Frames beyond what `out`
    /// can hold are not rendered.
    pub fn render(&mut self, out: &mut [f32], frames: usize) {
        let channels = self.channels;
        let frames = frames.min(out.len() / channels);
        let out = &mut out[..frames * channels];
        out.fill(0.0);

        let mut start = 0;
        while start < frames {
            let chunk = (frames - start).min(self.max_chunk_frames);
            let window = &mut out[start * channels..(start + chunk) * channels];

            for routed in self.sources.iter_mut() {
                let scratch = &mut self.scratch[..chunk * 2];
                let produced = routed.source.render(scratch, chunk).min(chunk);
                scratch[produced * 2..].fill(0.0);

                for (frame, pair) in window
                    .chunks_exact_mut(channels)
                    .zip(scratch.chunks_exact(2))
                {
                    frame[routed.offset] += pair[0];
                    frame[routed.offset + 1] += pair[1];
                }
            }

            start += chunk;
        }
    }
}
