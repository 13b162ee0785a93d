// Notification sinks and the adapters feeding them
//
// Control threads share an `Arc<dyn NotificationSink>`; the ring-buffer sink
// serializes them on a lock and only drops when the ring is full. The audio
// thread never shares a producer: `BeatForwarder` owns a ring of its own.

use super::channels::{NotificationConsumer, NotificationProducer, create_notification_channel};
use super::notification::{Notification, NotificationCategory, NotificationKind};
use crate::sequencer::{
    AudioCue, ClockListener, MidiPreset, Section, Setlist, Song, Tick, TimelineObserver,
};
use ringbuf::traits::Producer;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives notifications for user-facing display
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink backed by the notification ring buffer, for control threads
pub struct RingNotifier {
    producer: Mutex<NotificationProducer>,
}

impl RingNotifier {
    pub fn new(producer: NotificationProducer) -> Self {
        Self {
            producer: Mutex::new(producer),
        }
    }

    /// Sink plus the consumer end the display side drains
    pub fn channel(capacity: usize) -> (Arc<Self>, NotificationConsumer) {
        let (tx, rx) = create_notification_channel(capacity);
        (Arc::new(Self::new(tx)), rx)
    }
}

impl NotificationSink for RingNotifier {
    fn notify(&self, notification: Notification) {
        let mut producer = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        if producer.try_push(notification).is_err() {
            // Full queue: the display is behind
            log::debug!("Notification ring full, dropping notification");
        }
    }
}

/// Sink that writes every notification to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notification: Notification) {
        use super::notification::NotificationLevel;
        match notification.level {
            NotificationLevel::Info => log::info!("{}", notification.message()),
            NotificationLevel::Warning => log::warn!("{}", notification.message()),
            NotificationLevel::Error => log::error!("{}", notification.message()),
        }
    }
}

/// Timeline observer that turns domain events into notifications
pub struct NotificationForwarder {
    sink: Arc<dyn NotificationSink>,
}

impl NotificationForwarder {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    fn send(&self, kind: NotificationKind) {
        self.sink
            .notify(Notification::of(NotificationCategory::Transport, kind));
    }
}

impl TimelineObserver for NotificationForwarder {
    fn on_song_started(&mut self, index: usize, song: &Song) {
        self.send(NotificationKind::SongStarted {
            index,
            title: song.title.clone(),
        });
    }

    fn on_section_changed(&mut self, _tick: Tick, section: &Section) {
        self.send(NotificationKind::SectionChanged {
            name: section.name.clone(),
            bpm: section.bpm,
            time_signature: section.time_signature,
        });
    }

    fn on_preset_changed(&mut self, preset: &MidiPreset) {
        self.send(NotificationKind::PresetChanged {
            device: preset.device,
            channel: preset.channel,
            program: preset.program_change,
        });
    }

    fn on_cue_fired(&mut self, _tick: Tick, cue: &AudioCue) {
        self.send(NotificationKind::CueFired {
            sample_ref: cue.sample_ref.clone(),
            gain_db: cue.gain_db,
        });
    }

    fn on_song_finished(&mut self, index: usize, song: &Song) {
        self.send(NotificationKind::SongFinished {
            index,
            title: song.title.clone(),
        });
    }

    fn on_setlist_completed(&mut self, setlist: &Setlist) {
        self.send(NotificationKind::SetlistCompleted {
            name: setlist.name.clone(),
        });
    }
}

/// Clock listener pushing beats into its own ring. Runs on the audio thread:
/// the producer is owned, so there is no lock to contend on.
pub struct BeatForwarder {
    producer: NotificationProducer,
}

impl BeatForwarder {
    pub fn new(producer: NotificationProducer) -> Self {
        Self { producer }
    }

    /// Forwarder plus the consumer end the display side drains
    pub fn channel(capacity: usize) -> (Self, NotificationConsumer) {
        let (tx, rx) = create_notification_channel(capacity);
        (Self::new(tx), rx)
    }
}

impl ClockListener for BeatForwarder {
    fn on_beat(&mut self, beat: u32, bar: u64) {
        // Full: the display missed a beat, the next one supersedes it
        let _ = self.producer.try_push(Notification::of(
            NotificationCategory::Transport,
            NotificationKind::Beat { beat, bar },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::{DeviceId, TimeSignature};
    use ringbuf::traits::Consumer;

    #[test]
    fn test_ring_notifier_drops_when_full() {
        let (sink, mut rx) = RingNotifier::channel(1);
        sink.notify(Notification::info(NotificationCategory::Generic, "first".into()));
        sink.notify(Notification::info(NotificationCategory::Generic, "second".into()));

        assert_eq!(rx.try_pop().map(|n| n.message()), Some("first".to_string()));
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn test_forwarder_maps_timeline_events() {
        let (sink, mut rx) = RingNotifier::channel(8);
        let mut forwarder = NotificationForwarder::new(sink);

        let section = Section {
            name: "Chorus".into(),
            bpm: 128.0,
            time_signature: TimeSignature::four_four(),
            presets: Vec::new(),
        };
        forwarder.on_section_changed(960, &section);
        forwarder.on_preset_changed(&MidiPreset::new(DeviceId::DeviceA, 0, 3));

        let first = rx.try_pop().unwrap();
        assert!(matches!(first.kind, NotificationKind::SectionChanged { ref name, .. } if name == "Chorus"));
        let second = rx.try_pop().unwrap();
        assert_eq!(
            second.kind,
            NotificationKind::PresetChanged {
                device: DeviceId::DeviceA,
                channel: 0,
                program: 3
            }
        );
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let (sink, mut rx) = RingNotifier::channel(4096);
        let producers: Vec<_> = (0..2)
            .map(|_| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for i in 0..1500 {
                        sink.notify(Notification::info(NotificationCategory::Generic, i.to_string()));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut received = 0;
        while rx.try_pop().is_some() {
            received += 1;
        }
        assert_eq!(received, 3000);
    }

    #[test]
    fn test_beat_forwarder() {
        let (mut beats, mut rx) = BeatForwarder::channel(4);
        beats.on_tick(480);
        beats.on_beat(1, 0);

        let n = rx.try_pop().unwrap();
        assert_eq!(n.kind, NotificationKind::Beat { beat: 1, bar: 0 });
        assert!(rx.try_pop().is_none());
    }
}
