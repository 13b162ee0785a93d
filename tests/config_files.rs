// Integration test: configuration and setlist files on disk

use stageclock::config::{ConfigError, EngineConfig, load_setlist};
use stageclock::sequencer::{DeviceId, SongEvent, TimeSignature};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_save_and_load_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.ron");

    let mut config = EngineConfig::default();
    config.audio.device = Some("USB Interface".into());
    config.midi.devices.insert(DeviceId::DeviceA, "Synth".into());
    config.midi.clock_targets.push(DeviceId::DeviceA);
    config.save(&path).unwrap();

    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.midi.clock_ports(), vec!["Synth".to_string()]);
}

#[test]
fn test_load_rejects_bad_files() {
    let dir = TempDir::new().unwrap();

    let missing = dir.path().join("missing.ron");
    assert!(matches!(EngineConfig::load(&missing), Err(ConfigError::Io(_))));

    let garbage = dir.path().join("garbage.ron");
    fs::write(&garbage, "(audio: (channels: \"four\"))").unwrap();
    assert!(matches!(EngineConfig::load(&garbage), Err(ConfigError::Parse(_))));

    let mono = dir.path().join("mono.ron");
    fs::write(&mono, "(audio: (channels: 1))").unwrap();
    assert!(matches!(EngineConfig::load(&mono), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_setlist_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("friday.ron");
    fs::write(
        &path,
        r#"(
            name: "Friday",
            ppqn: 480,
            songs: [
                (
                    title: "Opener",
                    duration_ticks: 7680,
                    events: [
                        (tick: 0, event: SectionChange((
                            name: "Intro",
                            bpm: 128.0,
                            time_signature: (numerator: 4, denominator: 4),
                            presets: [(device: DeviceA, channel: 0, program_change: 12, control_changes: [])],
                        ))),
                        (tick: 1920, event: AudioCue((sample_ref: "riser", gain_db: -6.0))),
                    ],
                ),
                (title: "Closer", duration_ticks: 1920),
            ],
        )"#,
    )
    .unwrap();

    let setlist = load_setlist(&path).unwrap();
    assert_eq!(setlist.songs.len(), 2);
    assert_eq!(setlist.songs[1].artist, "");

    let opening = setlist.songs[0].opening_section().unwrap();
    assert_eq!(opening.bpm, 128.0);
    assert_eq!(opening.time_signature, TimeSignature::four_four());
    assert!(matches!(
        &setlist.songs[0].events[1].event,
        SongEvent::AudioCue(cue) if cue.sample_ref == "riser"
    ));
}

#[test]
fn test_setlist_with_bad_meter_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.ron");
    fs::write(
        &path,
        r#"(name: "Bad", ppqn: 480, songs: [(title: "X", duration_ticks: 10, events: [
            (tick: 0, event: SectionChange((name: "S", bpm: 120.0, time_signature: (numerator: 4, denominator: 5)))),
        ])])"#,
    )
    .unwrap();

    assert!(matches!(load_setlist(&path), Err(ConfigError::Timing(_))));
}
