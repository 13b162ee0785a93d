// Device Lifecycle Manager - fault-tolerant wrapper around hardware ports
//
// Two send paths:
// - reliable: messages go through a per-port FIFO and are replayed in order
//   once the port is back
// - best-effort: sent immediately or dropped; never opens a port and never
//   waits on a reconnect, so it is safe on the audio thread
//
// Every port has its own lock. Opening a port (which can take as long as the
// driver likes) happens with no lock held, so a slow or missing device never
// stalls traffic to the others.
//
// One supervisor thread per manager polls at the policy interval, disposes
// faulted handles, reopens ports and drains their queues. Faults raised off
// the control threads (best-effort failures, driver callbacks) are only
// flagged there; the supervisor is woken to announce them.

use super::DeviceError;
use super::port::{DevicePort, FaultReporter, FaultTarget, PortConnector};
use super::reconnect::{CancellationToken, ReconnectPolicy};
use super::status::{AtomicDeviceStatus, DeviceStatus};
use crate::messaging::{Notification, NotificationCategory, NotificationSink};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread::{self, JoinHandle};

type MessageOf<C> = <<C as PortConnector>::Port as DevicePort>::Message;
type Slot<P> = Arc<Mutex<PortSlot<P>>>;

struct PortSlot<P: DevicePort> {
    handle: Option<P>,
    faulted: bool,
    /// An open is in flight on some thread
    opening: bool,
    /// Fault flagged off the control path, not yet announced
    pending_fault: Option<DeviceError>,
    generation: u64,
    status: AtomicDeviceStatus,
    queue: VecDeque<P::Message>,
}

impl<P: DevicePort> PortSlot<P> {
    fn new() -> Self {
        Self {
            handle: None,
            faulted: false,
            opening: false,
            pending_fault: None,
            generation: 0,
            status: AtomicDeviceStatus::default(),
            queue: VecDeque::new(),
        }
    }

    fn is_up(&self) -> bool {
        self.handle.is_some() && !self.faulted
    }

    /// Never opened and nobody opening it
    fn is_fresh(&self) -> bool {
        self.handle.is_none() && !self.faulted && !self.opening
    }

    /// Mark faulted and hand back the handle so it can be dropped outside the
    /// lock. Returns true only for a fresh fault.
    fn mark_faulted(&mut self) -> (Option<P>, bool) {
        let fresh = !self.faulted;
        self.faulted = true;
        self.status.set(DeviceStatus::Faulted);
        (self.handle.take(), fresh)
    }

    /// Flag a fault for the supervisor to announce. Returns true if it was new.
    fn flag_fault(&mut self, error: DeviceError) -> bool {
        if self.faulted {
            return false;
        }
        self.faulted = true;
        self.status.set(DeviceStatus::Faulted);
        self.pending_fault = Some(error);
        true
    }

    /// Replay queued messages in FIFO order. A failed message stays at the front.
    fn drain(&mut self) -> Result<usize, DeviceError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(0);
        };

        let mut sent = 0;
        while let Some(message) = self.queue.front() {
            handle.send(message)?;
            self.queue.pop_front();
            sent += 1;
        }
        Ok(sent)
    }
}

fn lock_slot<P: DevicePort>(slot: &Mutex<PortSlot<P>>) -> MutexGuard<'_, PortSlot<P>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Work produced under a slot lock and carried out after releasing it
struct Deferred<P> {
    retired: Vec<P>,
    notifications: Vec<Notification>,
}

impl<P> Deferred<P> {
    fn new() -> Self {
        Self {
            retired: Vec::new(),
            notifications: Vec::new(),
        }
    }
}

struct Inner<C: PortConnector> {
    connector: C,
    policy: ReconnectPolicy,
    category: NotificationCategory,
    sink: Arc<dyn NotificationSink>,
    /// Written only when a port is first used and on dispose
    ports: RwLock<HashMap<String, Slot<C::Port>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    token: CancellationToken,
    disposed: AtomicBool,
    weak: Weak<Inner<C>>,
}

impl<C: PortConnector> Inner<C> {
    fn slot(&self, name: &str) -> Option<Slot<C::Port>> {
        self.ports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn slot_or_insert(&self, name: &str) -> Slot<C::Port> {
        if let Some(slot) = self.slot(name) {
            return slot;
        }
        let mut ports = self.ports.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            ports
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(PortSlot::new()))),
        )
    }

    fn snapshot(&self) -> Vec<(String, Slot<C::Port>)> {
        self.ports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
            .collect()
    }

    /// Open `name` with no lock held, then install the handle and replay the
    /// queue. Returns the number of replayed messages once the port is up;
    /// None when the open or the replay failed, or another thread is opening it.
    fn connect(
        &self,
        name: &str,
        slot: &Mutex<PortSlot<C::Port>>,
        deferred: &mut Deferred<C::Port>,
    ) -> Option<usize> {
        let generation = {
            let mut slot = lock_slot(slot);
            if slot.opening {
                return None;
            }
            slot.opening = true;
            slot.status.set(DeviceStatus::Connecting);
            slot.generation + 1
        };

        let target: Weak<dyn FaultTarget> = self.weak.clone();
        let reporter = FaultReporter::new(target, name, generation);
        let opened = self.connector.open(name, reporter);

        let mut slot = lock_slot(slot);
        slot.opening = false;
        match opened {
            Ok(port) => {
                if self.disposed.load(Ordering::Acquire) {
                    deferred.retired.push(port);
                    return None;
                }
                slot.generation = generation;
                deferred.retired.extend(slot.handle.replace(port));
                slot.faulted = false;
                slot.pending_fault = None;
                slot.status.set(DeviceStatus::Connected);

                match slot.drain() {
                    Ok(replayed) => Some(replayed),
                    Err(e) => {
                        self.fault_now(name, &mut slot, &e, deferred);
                        None
                    }
                }
            }
            Err(e) => {
                log::debug!("Opening '{}' failed: {}", name, e);
                self.fault_now(name, &mut slot, &e, deferred);
                None
            }
        }
    }

    /// Fault raised on a control thread: announce it right away
    fn fault_now(
        &self,
        name: &str,
        slot: &mut PortSlot<C::Port>,
        error: &DeviceError,
        deferred: &mut Deferred<C::Port>,
    ) {
        let (handle, fresh) = slot.mark_faulted();
        deferred.retired.extend(handle);
        if fresh {
            log::warn!("Device '{}' faulted: {}", name, error);
            deferred
                .notifications
                .push(Notification::fault(self.category, name, error.to_string()));
        }
    }

    fn finish(&self, deferred: Deferred<C::Port>) {
        drop(deferred.retired);
        for notification in deferred.notifications {
            self.sink.notify(notification);
        }
    }

    /// Get the slot for `name`, opening the port on first use
    fn slot_or_open(&self, name: &str, deferred: &mut Deferred<C::Port>) -> Slot<C::Port> {
        let slot = self.slot_or_insert(name);
        let fresh = lock_slot(&slot).is_fresh();
        if fresh {
            self.connect(name, &slot, deferred);
        }
        slot
    }

    /// One reconnect poll over every port. A fault announced by this poll is
    /// retried on the next one.
    fn poll(&self) {
        for (name, slot) in self.snapshot() {
            let mut deferred = Deferred::new();
            let retry = {
                let mut slot = lock_slot(&slot);
                if let Some(error) = slot.pending_fault.take() {
                    deferred.retired.extend(slot.handle.take());
                    log::warn!("Device '{}' faulted: {}", name, error);
                    deferred
                        .notifications
                        .push(Notification::fault(self.category, &name, error.to_string()));
                    false
                } else {
                    slot.faulted && !slot.opening
                }
            };

            if retry {
                if let Some(replayed) = self.connect(&name, &slot, &mut deferred) {
                    log::info!("Device '{}' reconnected ({} queued replayed)", name, replayed);
                    deferred
                        .notifications
                        .push(Notification::reconnected(self.category, &name));
                }
            }
            self.finish(deferred);
        }
    }

    fn ensure_supervisor(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let mut supervisor = self.supervisor.lock().unwrap_or_else(PoisonError::into_inner);
        if supervisor.is_some() {
            return;
        }

        let weak = self.weak.clone();
        let token = self.token.clone();
        let interval = self.policy.interval();
        let spawned = thread::Builder::new()
            .name("device-reconnect".to_string())
            .spawn(move || {
                log::debug!("Reconnect loop started ({:?} interval)", interval);
                while !token.wait_timeout(interval) {
                    let Some(inner) = weak.upgrade() else { break };
                    if inner.disposed.load(Ordering::Acquire) {
                        break;
                    }
                    inner.poll();
                }
                log::debug!("Reconnect loop exited");
            });

        match spawned {
            Ok(handle) => *supervisor = Some(handle),
            Err(e) => log::error!("Failed to start reconnect loop: {}", e),
        }
    }
}

impl<C: PortConnector> FaultTarget for Inner<C> {
    fn report_fault(&self, port: &str, generation: u64, error: DeviceError) {
        let Some(slot) = self.slot(port) else {
            return;
        };
        let flagged = {
            let mut slot = lock_slot(&slot);
            slot.generation == generation && slot.flag_fault(error)
        };
        if flagged {
            self.token.wake();
        }
    }
}

impl<C: PortConnector> Drop for Inner<C> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Fault-tolerant owner of all ports of one transport (audio or MIDI)
pub struct DeviceManager<C: PortConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: PortConnector> DeviceManager<C> {
    pub fn new(
        connector: C,
        policy: ReconnectPolicy,
        category: NotificationCategory,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| Inner {
            connector,
            policy,
            category,
            sink,
            ports: RwLock::new(HashMap::new()),
            supervisor: Mutex::new(None),
            token: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            weak: weak.clone(),
        });
        Self { inner }
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.inner.policy
    }

    /// Open the configured device. A missing name is a fatal configuration
    /// error; an open failure is a fault handled by the reconnect loop.
    pub fn initialize(&self, device: Option<&str>) -> Result<(), DeviceError> {
        let name = match device.map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => {
                log::error!("No device configured");
                return Err(DeviceError::Configuration(
                    "no device name configured".to_string(),
                ));
            }
        };
        if self.is_disposed() {
            return Err(DeviceError::Disposed);
        }

        let mut deferred = Deferred::new();
        let slot = self.inner.slot_or_open(name, &mut deferred);
        if lock_slot(&slot).is_up() {
            log::info!("Device '{}' connected", name);
        }
        self.inner.finish(deferred);
        self.inner.ensure_supervisor();
        Ok(())
    }

    /// Queued send: delivered now if the port is up, otherwise replayed in
    /// FIFO order after reconnect. Port faults are notified, not returned.
    pub fn send_reliable(&self, name: &str, message: MessageOf<C>) -> Result<(), DeviceError> {
        if self.is_disposed() {
            return Err(DeviceError::Disposed);
        }

        let mut deferred = Deferred::new();
        let slot = self.inner.slot_or_open(name, &mut deferred);
        {
            let mut slot = lock_slot(&slot);
            slot.queue.push_back(message);

            if slot.is_up() {
                if let Err(e) = slot.drain() {
                    self.inner.fault_now(name, &mut slot, &e, &mut deferred);
                }
            }
        }
        self.inner.finish(deferred);
        self.inner.ensure_supervisor();
        Ok(())
    }

    /// Immediate send or silent drop. Never opens ports; waits at most for
    /// another send on the same port, never for a reconnect.
    pub fn send_best_effort(&self, name: &str, message: &MessageOf<C>) {
        if self.is_disposed() {
            return;
        }
        let Some(slot) = self.inner.slot(name) else {
            return;
        };

        let flagged = {
            let mut slot = lock_slot(&slot);
            if slot.faulted {
                return;
            }
            let Some(handle) = slot.handle.as_mut() else {
                return;
            };
            match handle.send(message) {
                Ok(()) => false,
                Err(e) => slot.flag_fault(e),
            }
        };
        if flagged {
            self.inner.token.wake();
        }
    }

    fn read_slot<R>(&self, name: &str, read: impl FnOnce(&PortSlot<C::Port>) -> R) -> Option<R> {
        let slot = self.inner.slot(name)?;
        let slot = lock_slot(&slot);
        Some(read(&*slot))
    }

    pub fn status(&self, name: &str) -> DeviceStatus {
        self.read_slot(name, |slot| slot.status.get())
            .unwrap_or(DeviceStatus::Disconnected)
    }

    /// Shared status cell of a port, for display polling
    pub fn status_handle(&self, name: &str) -> Option<AtomicDeviceStatus> {
        self.read_slot(name, |slot| slot.status.clone())
    }

    pub fn is_faulted(&self, name: &str) -> bool {
        self.read_slot(name, |slot| slot.faulted).unwrap_or(false)
    }

    /// Reliable messages waiting for the port to come back
    pub fn queued(&self, name: &str) -> usize {
        self.read_slot(name, |slot| slot.queue.len()).unwrap_or(0)
    }

    pub fn port_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .ports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn is_reconnect_running(&self) -> bool {
        self.inner
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Cancel and join the reconnect loop, then close every port. Later
    /// reliable sends fail with `Disposed`.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.token.cancel();

        let handle = self
            .inner
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }

        let slots: Vec<_> = self
            .inner
            .ports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        let closed: Vec<_> = slots
            .iter()
            .filter_map(|slot| lock_slot(slot).handle.take())
            .collect();
        log::debug!(
            "Device manager disposed ({} ports, {} open)",
            slots.len(),
            closed.len()
        );
        drop(closed);
    }
}

impl<C: PortConnector> Drop for DeviceManager<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}
