use clap::Parser;
use ringbuf::traits::Consumer;
use stageclock::audio::{CpalConnector, SampleLibrary, cue_channel};
use stageclock::config::{self, EngineConfig};
use stageclock::connection::PortConnector;
use stageclock::messaging::{
    BeatForwarder, LogNotifier, NotificationCategory, NotificationConsumer,
    NotificationForwarder, NotificationSink, RingNotifier,
};
use stageclock::midi::MidirConnector;
use stageclock::{
    AudioDeviceManager, ChannelRouter, ClockSync, DeviceError, DispatchLoop, MidiDeviceManager,
    PresetRouter, Tempo, TickClock, TimelineDispatcher,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// Ringbuffer capacity constants
// Beats arrive a few per second on their own ring; 256 covers several seconds
// of a stalled display either way.
const NOTIFICATION_RINGBUFFER_CAPACITY: usize = 256;
const BEAT_RINGBUFFER_CAPACITY: usize = 256;
const CUE_QUEUE_CAPACITY: usize = 64;
const MAX_RENDER_FRAMES: usize = 4096;
const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "stageclock", version, about = "Click track, MIDI clock and setlist playback")]
struct Cli {
    /// Configuration file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Setlist to play (RON)
    #[arg(short, long)]
    setlist: Option<PathBuf>,

    /// List audio and MIDI output devices, then exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn list_devices(router: Arc<Mutex<ChannelRouter>>, sample_rate: u32) {
    println!("Audio outputs:");
    for name in CpalConnector::new(router, sample_rate, None).available() {
        println!("  {}", name);
    }
    println!("MIDI outputs:");
    for name in MidirConnector.available() {
        println!("  {}", name);
    }
}

fn drain(consumer: &mut NotificationConsumer) {
    while let Some(notification) = consumer.try_pop() {
        LogNotifier.notify(notification);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load_or_default(cli.config.as_deref())?;
    let audio = &config.audio;

    let router = Arc::new(Mutex::new(ChannelRouter::new(
        audio.channels as usize,
        MAX_RENDER_FRAMES,
    )?));

    if cli.list_devices {
        list_devices(router, audio.sample_rate);
        return Ok(());
    }

    let Some(setlist_path) = cli.setlist else {
        return Err("no setlist given (--setlist <file>)".into());
    };
    let setlist = config::load_setlist(&setlist_path)?;
    log::info!(
        "Setlist '{}': {} songs",
        setlist.name,
        setlist.songs.len()
    );
    // Event ticks are written against the setlist's resolution
    let ppqn = setlist.ppqn;
    if ppqn != config.ppqn {
        log::warn!(
            "Setlist resolution {} ppqn overrides the configured {}",
            ppqn,
            config.ppqn
        );
    }

    let (notifier, mut notifications) = RingNotifier::channel(NOTIFICATION_RINGBUFFER_CAPACITY);
    let sink: Arc<dyn NotificationSink> = notifier;

    // MIDI outputs
    let midi = Arc::new(MidiDeviceManager::new(
        MidirConnector,
        config.midi.reconnect_policy(),
        NotificationCategory::Midi,
        Arc::clone(&sink),
    ));
    let mut ports: Vec<&String> = config.midi.devices.values().collect();
    ports.sort();
    ports.dedup();
    for port in ports {
        midi.initialize(Some(port.as_str()))?;
    }
    let clock_sync = ClockSync::for_targets(Arc::clone(&midi), config.midi.clock_ports(), ppqn)?;

    // Click and cues on the output router
    // Each song's opening section sets the tempo when the dispatcher starts it
    let mut clock = TickClock::new(audio.sample_rate, ppqn, Tempo::default())?;
    if let Some(sync) = &clock_sync {
        clock.add_listener(Box::new(sync.clone()));
    }
    let (beats, mut beat_notifications) = BeatForwarder::channel(BEAT_RINGBUFFER_CAPACITY);
    clock.add_listener(Box::new(beats));
    let handle = clock.handle();
    handle.set_master_volume(audio.master_volume);
    handle.set_beat_volume(audio.beat_volume);

    // Sample decoding is left to the host application; cues without a
    // loaded sample are logged and skipped
    let library = Arc::new(SampleLibrary::new());
    let (cue_trigger, cue_player) = cue_channel(
        library,
        audio.sample_rate,
        audio.max_cue_voices,
        CUE_QUEUE_CAPACITY,
    );

    {
        let mut router = router.lock().map_err(|_| "router lock poisoned")?;
        router.add_source(Box::new(clock), audio.click_offset)?;
        router.add_source(Box::new(cue_player), audio.cue_offset)?;
    }

    let audio_manager = AudioDeviceManager::new(
        CpalConnector::new(Arc::clone(&router), audio.sample_rate, audio.buffer_frames),
        audio.reconnect_policy(),
        NotificationCategory::Audio,
        Arc::clone(&sink),
    );
    if let Err(e) = audio_manager.initialize(audio.device.as_deref()) {
        if matches!(e, DeviceError::Configuration(_)) {
            log::error!("Audio output is not configured");
        }
        return Err(e.into());
    }

    let mut dispatcher = TimelineDispatcher::new(handle.clone());
    dispatcher.subscribe(Box::new(NotificationForwarder::new(Arc::clone(&sink))));
    dispatcher.subscribe(Box::new(PresetRouter::new(
        Arc::clone(&midi),
        config.midi.routes(),
    )));
    dispatcher.subscribe(Box::new(cue_trigger));
    if let Some(sync) = clock_sync {
        dispatcher.subscribe(Box::new(sync));
    }
    dispatcher.load(setlist)?;
    dispatcher.play()?;

    handle.start();
    let dispatch = DispatchLoop::spawn(dispatcher)?;

    while !dispatch.is_finished() {
        drain(&mut beat_notifications);
        drain(&mut notifications);
        thread::sleep(DRAIN_INTERVAL);
    }
    // MIDI Stop went out with the setlist completion
    let _ = dispatch.join();

    handle.stop();
    drain(&mut beat_notifications);
    drain(&mut notifications);

    audio_manager.dispose();
    midi.dispose();
    log::info!("Setlist finished");
    Ok(())
}
