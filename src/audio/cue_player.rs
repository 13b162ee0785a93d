// Cue player - plays pre-decoded samples when the timeline fires audio cues
//
// The trigger side (dispatch thread) looks samples up and pushes play commands
// through a lock-free ring buffer. The player side (audio thread) drains the
// queue at the start of each render and mixes a fixed pool of voices.

use super::dsp_utils::{db_to_gain, flush_denormals_to_zero};
use super::routing::AudioSource;
use crate::sequencer::{AudioCue, Tick, TimelineObserver};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::collections::HashMap;
use std::sync::Arc;

/// Decoded audio, interleaved stereo
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    name: String,
    sample_rate: u32,
    data: Vec<f32>,
}

impl SampleBuffer {
    /// From interleaved stereo data; a trailing half frame is dropped
    pub fn stereo(name: impl Into<String>, sample_rate: u32, mut data: Vec<f32>) -> Self {
        data.truncate(data.len() / 2 * 2);
        Self {
            name: name.into(),
            sample_rate,
            data,
        }
    }

    /// From mono data, copied to both channels
    pub fn mono(name: impl Into<String>, sample_rate: u32, samples: &[f32]) -> Self {
        let data = samples.iter().flat_map(|s| [*s, *s]).collect();
        Self {
            name: name.into(),
            sample_rate,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.data.len() / 2
    }

    #[inline]
    fn frame(&self, index: usize) -> (f32, f32) {
        (self.data[index * 2], self.data[index * 2 + 1])
    }
}

/// Samples addressable by the `sample_ref` of audio cues
#[derive(Debug, Default, Clone)]
pub struct SampleLibrary {
    samples: HashMap<String, Arc<SampleBuffer>>,
}

impl SampleLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a buffer under its own name, replacing any previous one
    pub fn insert(&mut self, buffer: SampleBuffer) {
        self.samples
            .insert(buffer.name().to_string(), Arc::new(buffer));
    }

    pub fn get(&self, name: &str) -> Option<Arc<SampleBuffer>> {
        self.samples.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

enum CueCommand {
    Play { sample: Arc<SampleBuffer>, gain: f32 },
    StopAll,
}

struct Voice {
    sample: Arc<SampleBuffer>,
    position: usize,
    gain: f32,
}

/// Create a connected trigger/player pair
pub fn cue_channel(
    library: Arc<SampleLibrary>,
    sample_rate: u32,
    max_voices: usize,
    queue_capacity: usize,
) -> (CueTrigger, CuePlayer) {
    let (producer, consumer) = HeapRb::<CueCommand>::new(queue_capacity.max(1)).split();

    let trigger = CueTrigger {
        producer,
        library,
        sample_rate,
    };
    let player = CuePlayer {
        consumer,
        voices: (0..max_voices.max(1)).map(|_| None).collect(),
    };
    (trigger, player)
}

/// Timeline observer that starts cue playback
pub struct CueTrigger {
    producer: HeapProd<CueCommand>,
    library: Arc<SampleLibrary>,
    sample_rate: u32,
}

impl CueTrigger {
    /// Queue a sample by name. Returns false when the name is unknown or the
    /// queue is full.
    pub fn trigger(&mut self, sample_ref: &str, gain_db: f32) -> bool {
        let Some(sample) = self.library.get(sample_ref) else {
            log::warn!("Audio cue '{}' has no loaded sample, ignored", sample_ref);
            return false;
        };
        if sample.sample_rate() != self.sample_rate {
            log::warn!(
                "Sample '{}' is {} Hz, output runs at {} Hz",
                sample_ref,
                sample.sample_rate(),
                self.sample_rate
            );
        }

        let command = CueCommand::Play {
            sample,
            gain: db_to_gain(gain_db),
        };
        if self.producer.try_push(command).is_err() {
            log::warn!("Cue queue full, '{}' dropped", sample_ref);
            return false;
        }
        true
    }

    /// Silence every playing cue
    pub fn stop_all(&mut self) {
        let _ = self.producer.try_push(CueCommand::StopAll);
    }
}

impl TimelineObserver for CueTrigger {
    fn on_cue_fired(&mut self, _tick: Tick, cue: &AudioCue) {
        self.trigger(&cue.sample_ref, cue.gain_db);
    }
}

/// Stereo source mixing the active cues
pub struct CuePlayer {
    consumer: HeapCons<CueCommand>,
    voices: Vec<Option<Voice>>,
}

impl CuePlayer {
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_some()).count()
    }

    fn apply_commands(&mut self) {
        while let Some(command) = self.consumer.try_pop() {
            match command {
                CueCommand::Play { sample, gain } => {
                    let voice = Voice {
                        sample,
                        position: 0,
                        gain,
                    };
                    // Free slot first, otherwise steal the voice closest to its end
                    let slot = match self.voices.iter().position(Option::is_none) {
                        Some(free) => free,
                        None => self
                            .voices
                            .iter()
                            .enumerate()
                            .max_by_key(|(_, v)| {
                                v.as_ref().map_or(0, |v| v.position * 1000 / v.sample.frames().max(1))
                            })
                            .map_or(0, |(i, _)| i),
                    };
                    self.voices[slot] = Some(voice);
                }
                CueCommand::StopAll => self.voices.iter_mut().for_each(|v| *v = None),
            }
        }
    }
}

impl AudioSource for CuePlayer {
    fn channels(&self) -> usize {
        2
    }

    fn render(&mut self, out: &mut [f32], frames: usize) -> usize {
        let frames = frames.min(out.len() / 2);
        let out = &mut out[..frames * 2];
        out.fill(0.0);
        self.apply_commands();

        for slot in self.voices.iter_mut() {
            let Some(voice) = slot.as_mut() else { continue };

            let remaining = voice.sample.frames() - voice.position;
            let count = remaining.min(frames);
            for (i, frame) in out.chunks_exact_mut(2).take(count).enumerate() {
                let (left, right) = voice.sample.frame(voice.position + i);
                frame[0] += left * voice.gain;
                frame[1] += right * voice.gain;
            }
            voice.position += count;

            if voice.position >= voice.sample.frames() {
                *slot = None;
            }
        }

        for sample in out.iter_mut() {
            *sample = flush_denormals_to_zero(*sample);
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> Arc<SampleLibrary> {
        let mut library = SampleLibrary::new();
        library.insert(SampleBuffer::mono("hit", 48000, &[1.0; 4]));
        library.insert(SampleBuffer::stereo("pad", 48000, [0.5, -0.5].repeat(100)));
        Arc::new(library)
    }

    #[test]
    fn test_cue_plays_once_at_gain() {
        let (mut trigger, mut player) = cue_channel(library(), 48000, 4, 16);
        assert!(trigger.trigger("hit", -6.0));

        let mut out = vec![0.0; 16];
        assert_eq!(player.render(&mut out, 8), 8);

        let gain = db_to_gain(-6.0);
        assert!(out[..8].iter().all(|s| (*s - gain).abs() < 1e-6));
        assert!(out[8..].iter().all(|s| *s == 0.0));
        assert_eq!(player.active_voices(), 0);
    }

    #[test]
    fn test_unknown_sample_is_ignored() {
        let (mut trigger, mut player) = cue_channel(library(), 48000, 4, 16);
        assert!(!trigger.trigger("missing", 0.0));

        let mut out = vec![1.0; 8];
        player.render(&mut out, 4);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_voices_mix_and_are_bounded() {
        let (mut trigger, mut player) = cue_channel(library(), 48000, 2, 16);
        trigger.trigger("pad", 0.0);
        trigger.trigger("pad", 0.0);
        trigger.trigger("pad", 0.0);

        let mut out = vec![0.0; 4];
        player.render(&mut out, 2);

        assert_eq!(player.active_voices(), 2);
        assert_eq!(&out, &[1.0, -1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_stop_all() {
        let (mut trigger, mut player) = cue_channel(library(), 48000, 2, 16);
        trigger.trigger("pad", 0.0);
        let mut out = vec![0.0; 4];
        player.render(&mut out, 2);
        assert_eq!(player.active_voices(), 1);

        trigger.stop_all();
        player.render(&mut out, 2);
        assert_eq!(player.active_voices(), 0);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_observer_triggers_cue() {
        let (mut trigger, mut player) = cue_channel(library(), 48000, 2, 16);
        trigger.on_cue_fired(
            0,
            &AudioCue {
                sample_ref: "pad".into(),
                gain_db: 0.0,
            },
        );

        let mut out = vec![0.0; 4];
        player.render(&mut out, 2);
        assert_eq!(&out, &[0.5, -0.5, 0.5, -0.5]);
    }
}
