// Integration test: tick clock behaviour independent of the audio buffer size

use rand::{Rng, SeedableRng, rngs::StdRng};
use stageclock::sequencer::{ClockListener, Tempo, Tick, TickClock, TimeSignature};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct TickLog {
    ticks: Arc<Mutex<Vec<Tick>>>,
    beats: Arc<Mutex<Vec<(u32, u64)>>>,
}

impl ClockListener for TickLog {
    fn on_tick(&mut self, tick: Tick) {
        self.ticks.lock().unwrap().push(tick);
    }

    fn on_beat(&mut self, beat: u32, bar: u64) {
        self.beats.lock().unwrap().push((beat, bar));
    }
}

fn running_clock(sample_rate: u32, tempo: Tempo) -> (TickClock, TickLog) {
    let mut clock = TickClock::new(sample_rate, 480, tempo).unwrap();
    let log = TickLog::default();
    clock.add_listener(Box::new(log.clone()));
    clock.start();
    (clock, log)
}

fn render_in_random_blocks(clock: &mut TickClock, total_frames: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buffer = vec![0.0f32; 2 * 4096];
    let mut rendered = 0;
    while rendered < total_frames {
        let frames = rng.gen_range(1..=4096).min(total_frames - rendered);
        rendered += clock.render_stereo(&mut buffer, frames);
    }
}

#[test]
fn test_tick_count_independent_of_buffer_size() {
    const TOTAL_FRAMES: usize = 44100 * 3;

    let (mut reference, _) = running_clock(44100, Tempo::default());
    let mut buffer = vec![0.0f32; TOTAL_FRAMES * 2];
    reference.render_stereo(&mut buffer, TOTAL_FRAMES);

    for seed in 0..8 {
        let (mut clock, _) = running_clock(44100, Tempo::default());
        render_in_random_blocks(&mut clock, TOTAL_FRAMES, seed);
        assert_eq!(clock.tick(), reference.tick(), "seed {}", seed);
    }
    // 3 s at 120 BPM is 6 beats
    assert_eq!(reference.tick(), 6 * 480);
}

#[test]
fn test_ticks_are_consecutive_and_beats_follow_meter() {
    let tempo = Tempo::new(120.0, TimeSignature::three_four()).unwrap();
    let (mut clock, log) = running_clock(44100, tempo);
    render_in_random_blocks(&mut clock, 44100 * 4, 42);

    let ticks = log.ticks.lock().unwrap().clone();
    assert_eq!(ticks.len() as u64, clock.tick());
    assert!(ticks.iter().enumerate().all(|(i, t)| *t == i as u64 + 1));

    // 8 beats in 4 s; beat index cycles through the 3/4 bar
    let beats = log.beats.lock().unwrap().clone();
    assert_eq!(
        beats,
        vec![(1, 0), (2, 0), (0, 1), (1, 1), (2, 1), (0, 2), (1, 2), (2, 2)]
    );
}

#[test]
fn test_doubling_bpm_halves_frames_per_tick() {
    let (mut slow, _) = running_clock(44100, Tempo::with_bpm(120.0).unwrap());
    let (mut fast, _) = running_clock(44100, Tempo::with_bpm(240.0).unwrap());

    let mut buffer = vec![0.0f32; 44100 * 2];
    slow.render_stereo(&mut buffer, 44100);
    fast.render_stereo(&mut buffer, 22050);

    assert_eq!(slow.tick(), 960);
    assert_eq!(fast.tick(), slow.tick());
}

#[test]
fn test_tempo_change_takes_effect_mid_stream() {
    let (mut clock, _) = running_clock(44100, Tempo::default());
    let mut buffer = vec![0.0f32; 44100 * 2];

    clock.render_stereo(&mut buffer, 22050);
    assert_eq!(clock.tick(), 480);

    clock.change_tempo(Tempo::with_bpm(240.0).unwrap());
    clock.render_stereo(&mut buffer, 22050);
    assert_eq!(clock.tick(), 480 + 960);
}

#[test]
fn test_click_lands_on_every_beat() {
    let (mut clock, _) = running_clock(48000, Tempo::default());
    let mut buffer = vec![0.0f32; 48000 * 2];
    clock.render_stereo(&mut buffer, 48000);

    // Beats at 0.5 s and 1.0 s; the second starts one frame before the end
    let first_beat = 24000;
    let left: Vec<f32> = buffer.iter().step_by(2).copied().collect();
    assert!(left[..first_beat - 1].iter().all(|s| *s == 0.0));
    assert!(left[first_beat..first_beat + 480].iter().any(|s| s.abs() > 0.1));
}
