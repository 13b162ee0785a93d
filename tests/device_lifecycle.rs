// Integration test: device faults, reconnection and queued delivery
//
// A scripted connector stands in for the hardware: opens and sends can be
// made to fail, and the fault reporter of every opened port is kept so tests
// can raise driver faults.

use ringbuf::traits::Consumer;
use stageclock::connection::{
    DeviceError, DeviceManager, DevicePort, DeviceStatus, FaultReporter, PortConnector,
    ReconnectPolicy,
};
use stageclock::messaging::{
    NotificationCategory, NotificationConsumer, NotificationKind, NotificationLevel, RingNotifier,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Default)]
struct Rig {
    delivered: Arc<Mutex<Vec<u32>>>,
    opens: Arc<AtomicUsize>,
    fail_open: Arc<AtomicBool>,
    fail_send: Arc<AtomicBool>,
    /// Ports whose open hangs for a while and then fails
    stalled: Arc<Mutex<Vec<String>>>,
    reporters: Arc<Mutex<Vec<FaultReporter>>>,
}

impl Rig {
    fn delivered(&self) -> Vec<u32> {
        self.delivered.lock().unwrap().clone()
    }

    fn reporter(&self, index: usize) -> FaultReporter {
        self.reporters.lock().unwrap()[index].clone()
    }
}

struct RigPort(Rig);

impl DevicePort for RigPort {
    type Message = u32;

    fn send(&mut self, message: &u32) -> Result<(), DeviceError> {
        if self.0.fail_send.load(Ordering::SeqCst) {
            return Err(DeviceError::SendFailed("cable pulled".into()));
        }
        self.0.delivered.lock().unwrap().push(*message);
        Ok(())
    }
}

impl PortConnector for Rig {
    type Port = RigPort;

    fn open(&self, name: &str, faults: FaultReporter) -> Result<RigPort, DeviceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.stalled.lock().unwrap().iter().any(|port| port == name) {
            thread::sleep(Duration::from_millis(40));
            return Err(DeviceError::NotFound(name.to_string()));
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(DeviceError::NotFound(name.to_string()));
        }
        self.reporters.lock().unwrap().push(faults);
        Ok(RigPort(self.clone()))
    }
}

fn manager(rig: &Rig) -> (DeviceManager<Rig>, NotificationConsumer) {
    let (sink, rx) = RingNotifier::channel(128);
    let manager = DeviceManager::new(
        rig.clone(),
        ReconnectPolicy::new(POLL),
        NotificationCategory::Midi,
        sink,
    );
    (manager, rx)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn kinds(rx: &mut NotificationConsumer) -> Vec<NotificationKind> {
    let mut kinds = Vec::new();
    while let Some(notification) = rx.try_pop() {
        kinds.push(notification.kind);
    }
    kinds
}

fn faults(kinds: &[NotificationKind]) -> usize {
    kinds
        .iter()
        .filter(|k| matches!(k, NotificationKind::Fault { .. }))
        .count()
}

fn reconnects(kinds: &[NotificationKind]) -> usize {
    kinds
        .iter()
        .filter(|k| matches!(k, NotificationKind::Reconnected { .. }))
        .count()
}

#[test]
fn test_missing_device_faults_once_then_replays_queue() {
    let rig = Rig::default();
    rig.fail_open.store(true, Ordering::SeqCst);
    let (manager, mut rx) = manager(&rig);

    manager.initialize(Some("Synth")).unwrap();
    assert_eq!(manager.status("Synth"), DeviceStatus::Faulted);
    assert!(manager.is_reconnect_running());

    let first = rx.try_pop().unwrap();
    assert_eq!(first.level, NotificationLevel::Error);
    assert_eq!(
        first.kind,
        NotificationKind::Fault {
            device: "Synth".into(),
            cause: "Device 'Synth' not found".into(),
        }
    );

    for message in [1, 2, 3] {
        manager.send_reliable("Synth", message).unwrap();
    }
    assert_eq!(manager.queued("Synth"), 3);

    // Several failed polls, still a single fault notification
    assert!(wait_until(|| rig.opens.load(Ordering::SeqCst) >= 4));
    assert!(kinds(&mut rx).is_empty());

    rig.fail_open.store(false, Ordering::SeqCst);
    assert!(wait_until(|| manager.status("Synth") == DeviceStatus::Connected));
    assert!(wait_until(|| manager.queued("Synth") == 0));

    assert_eq!(rig.delivered(), vec![1, 2, 3]);
    let after = kinds(&mut rx);
    assert_eq!(faults(&after), 0);
    assert_eq!(reconnects(&after), 1);
}

#[test]
fn test_send_failure_keeps_order_across_reconnect() {
    let rig = Rig::default();
    let (manager, mut rx) = manager(&rig);
    manager.initialize(Some("Synth")).unwrap();
    manager.send_reliable("Synth", 1).unwrap();

    rig.fail_send.store(true, Ordering::SeqCst);
    rig.fail_open.store(true, Ordering::SeqCst);
    manager.send_reliable("Synth", 2).unwrap();
    manager.send_reliable("Synth", 3).unwrap();
    assert!(manager.is_faulted("Synth"));
    assert_eq!(manager.queued("Synth"), 2);
    assert_eq!(faults(&kinds(&mut rx)), 1);

    rig.fail_send.store(false, Ordering::SeqCst);
    rig.fail_open.store(false, Ordering::SeqCst);
    assert!(wait_until(|| manager.queued("Synth") == 0));
    manager.send_reliable("Synth", 4).unwrap();

    assert_eq!(rig.delivered(), vec![1, 2, 3, 4]);
}

#[test]
fn test_best_effort_is_dropped_while_faulted() {
    let rig = Rig::default();
    rig.fail_open.store(true, Ordering::SeqCst);
    let (manager, _rx) = manager(&rig);
    manager.initialize(Some("Clock")).unwrap();

    manager.send_best_effort("Clock", &10);
    manager.send_best_effort("Clock", &11);
    assert_eq!(manager.queued("Clock"), 0);

    rig.fail_open.store(false, Ordering::SeqCst);
    assert!(wait_until(|| manager.status("Clock") == DeviceStatus::Connected));
    manager.send_best_effort("Clock", &12);

    assert_eq!(rig.delivered(), vec![12]);
}

#[test]
fn test_best_effort_failure_is_announced_by_supervisor() {
    let rig = Rig::default();
    let (manager, mut rx) = manager(&rig);
    manager.initialize(Some("Clock")).unwrap();

    rig.fail_send.store(true, Ordering::SeqCst);
    manager.send_best_effort("Clock", &1);
    assert!(manager.is_faulted("Clock"));

    rig.fail_send.store(false, Ordering::SeqCst);
    let mut seen = Vec::new();
    assert!(wait_until(|| {
        seen.extend(kinds(&mut rx));
        reconnects(&seen) == 1
    }));
    assert_eq!(faults(&seen), 1);
    assert_eq!(manager.status("Clock"), DeviceStatus::Connected);
}

#[test]
fn test_driver_fault_reconnects_and_stale_reports_are_ignored() {
    let rig = Rig::default();
    let (manager, mut rx) = manager(&rig);
    manager.initialize(Some("Interface")).unwrap();

    rig.reporter(0)
        .report(DeviceError::Stream("device unplugged".into()));
    assert_eq!(manager.status("Interface"), DeviceStatus::Faulted);

    let mut seen = Vec::new();
    assert!(wait_until(|| {
        seen.extend(kinds(&mut rx));
        reconnects(&seen) == 1
    }));
    assert_eq!(faults(&seen), 1);
    assert_eq!(rig.opens.load(Ordering::SeqCst), 2);

    // The first handle is gone: its reporter no longer affects the port
    rig.reporter(0).report(DeviceError::Stream("late".into()));
    assert_eq!(manager.status("Interface"), DeviceStatus::Connected);
    assert!(!manager.is_faulted("Interface"));
}

#[test]
fn test_each_port_recovers_independently() {
    let rig = Rig::default();
    let (manager, _rx) = manager(&rig);
    manager.initialize(Some("A")).unwrap();
    manager.initialize(Some("B")).unwrap();

    rig.reporter(1).report(DeviceError::Stream("B lost".into()));
    assert_eq!(manager.status("A"), DeviceStatus::Connected);
    assert_eq!(manager.status("B"), DeviceStatus::Faulted);

    assert!(wait_until(|| manager.status("B") == DeviceStatus::Connected));
    assert_eq!(manager.port_names(), vec!["A".to_string(), "B".to_string()]);
}

#[test]
fn test_dispose_stops_reconnecting() {
    let rig = Rig::default();
    rig.fail_open.store(true, Ordering::SeqCst);
    let (manager, _rx) = manager(&rig);
    manager.initialize(Some("Synth")).unwrap();
    assert!(wait_until(|| rig.opens.load(Ordering::SeqCst) >= 2));

    manager.dispose();
    assert!(!manager.is_reconnect_running());
    assert!(manager.is_disposed());

    let opens = rig.opens.load(Ordering::SeqCst);
    thread::sleep(POLL * 5);
    assert_eq!(rig.opens.load(Ordering::SeqCst), opens);
    assert_eq!(manager.send_reliable("Synth", 1), Err(DeviceError::Disposed));

    // Second dispose is a no-op
    manager.dispose();
}

#[test]
fn test_slow_reconnect_never_costs_a_healthy_port_a_message() {
    let rig = Rig::default();
    rig.stalled.lock().unwrap().push("Pedal".into());
    let (manager, _rx) = manager(&rig);
    manager.initialize(Some("Clock")).unwrap();
    manager.initialize(Some("Pedal")).unwrap();
    assert!(manager.is_faulted("Pedal"));

    let opens_before = rig.opens.load(Ordering::SeqCst);
    let start = Instant::now();
    let mut sent = Vec::new();
    let mut next = 0u32;
    while start.elapsed() < Duration::from_millis(500) {
        manager.send_best_effort("Clock", &next);
        sent.push(next);
        if next % 50 == 0 {
            // Reliable traffic to the dead port queues up meanwhile
            manager.send_reliable("Pedal", 1_000_000 + next).unwrap();
        }
        next += 1;
        thread::sleep(Duration::from_micros(500));
    }

    // The stalled port was retried several times during the run
    assert!(rig.opens.load(Ordering::SeqCst) >= opens_before + 3);
    assert_eq!(rig.delivered(), sent);
    assert!(manager.queued("Pedal") > 0);
}
