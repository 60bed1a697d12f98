// MIDI connection manager - keeps a live device attached across unplugs
// Device loss is recoverable: playback continues on the file timeline while
// the monitor retries with backoff

use crate::messaging::channels::{LiveEventProducer, NotificationProducer};
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::midi::connection::{AtomicDeviceStatus, DeviceStatus, ReconnectBackoff};
use crate::midi::input;
use midir::MidiInputConnection;
use ringbuf::traits::Producer;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

type SharedConnection = Arc<Mutex<Option<MidiInputConnection<()>>>>;

/// How often the monitor thread re-evaluates the connection.
const MONITOR_INTERVAL: Duration = Duration::from_secs(2);

pub struct MidiInputManager {
    connection: SharedConnection,
    status: AtomicDeviceStatus,
    target_device: Arc<Mutex<Option<String>>>,
    live_tx: Arc<Mutex<LiveEventProducer>>,
    _monitor: thread::JoinHandle<()>,
}

impl MidiInputManager {
    /// Connect to the first available device (if any) and start the
    /// reconnection monitor. Starting with no device present is not an
    /// error: the engine runs file-only until one shows up.
    pub fn new(
        live_tx: LiveEventProducer,
        notification_tx: NotificationProducer,
    ) -> MidiInputManager {
        let connection: SharedConnection = Arc::new(Mutex::new(None));
        let status = AtomicDeviceStatus::default();
        let target_device = Arc::new(Mutex::new(None));
        let live_tx = Arc::new(Mutex::new(live_tx));
        let notification_tx = Arc::new(Mutex::new(notification_tx));

        let manager = MidiInputManager {
            connection: connection.clone(),
            status: status.clone(),
            target_device: target_device.clone(),
            live_tx: live_tx.clone(),
            _monitor: Self::spawn_monitor(
                connection,
                status.clone(),
                target_device.clone(),
                live_tx.clone(),
                notification_tx,
            ),
        };

        manager.connect_first_available();
        manager
    }

    pub fn status(&self) -> DeviceStatus {
        self.status.get()
    }

    pub fn target_device(&self) -> Option<String> {
        self.target_device.lock().ok().and_then(|t| t.clone())
    }

    /// Switch to a specific device by port name.
    pub fn set_target_device(&self, device_name: String) {
        if let Ok(mut target) = self.target_device.lock() {
            *target = Some(device_name.clone());
        }
        if let Ok(mut connection) = self.connection.lock() {
            *connection = None;
        }
        self.status.set(DeviceStatus::Connecting);
        Self::try_connect(
            Some(&device_name),
            &self.connection,
            &self.status,
            &self.target_device,
            &self.live_tx,
        );
    }

    fn connect_first_available(&self) {
        let ports = input::available_ports();
        if ports.is_empty() {
            info!("no MIDI input devices found, running file-only");
            self.status.set(DeviceStatus::Disconnected);
            return;
        }
        Self::try_connect(
            None,
            &self.connection,
            &self.status,
            &self.target_device,
            &self.live_tx,
        );
    }

    fn try_connect(
        device_name: Option<&str>,
        connection: &SharedConnection,
        status: &AtomicDeviceStatus,
        target_device: &Arc<Mutex<Option<String>>>,
        live_tx: &Arc<Mutex<LiveEventProducer>>,
    ) -> bool {
        status.set(DeviceStatus::Connecting);
        match input::open_connection(device_name, live_tx.clone()) {
            Ok((conn, port_name)) => {
                if let Ok(mut slot) = connection.lock() {
                    *slot = Some(conn);
                }
                if let Ok(mut target) = target_device.lock() {
                    *target = Some(port_name.clone());
                }
                status.set(DeviceStatus::Connected);
                info!(device = %port_name, "MIDI input connected");
                true
            }
            Err(err) => {
                warn!(%err, "MIDI connection attempt failed");
                status.set(DeviceStatus::Disconnected);
                false
            }
        }
    }

    /// Monitor loop: while disconnected, retry the target device with
    /// exponential backoff; when attempts run out, fall back to whatever
    /// device is available and start over.
    ///
    /// midir gives no unplug callback, so loss is observed indirectly (a
    /// reconnect attempt to a vanished device fails and keeps the status
    /// at Disconnected).
    fn spawn_monitor(
        connection: SharedConnection,
        status: AtomicDeviceStatus,
        target_device: Arc<Mutex<Option<String>>>,
        live_tx: Arc<Mutex<LiveEventProducer>>,
        notification_tx: Arc<Mutex<NotificationProducer>>,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let mut backoff = ReconnectBackoff::new();
            let mut was_connected = false;

            loop {
                thread::sleep(MONITOR_INTERVAL);

                match status.get() {
                    DeviceStatus::Connected => {
                        backoff.reset();
                        was_connected = true;
                    }
                    DeviceStatus::Connecting => {}
                    DeviceStatus::Disconnected | DeviceStatus::Error => {
                        if was_connected {
                            was_connected = false;
                            if let Ok(mut tx) = notification_tx.lock() {
                                let _ = tx.try_push(Notification::warning(
                                    NotificationCategory::Midi,
                                    "MIDI device disconnected, continuing file-only".to_string(),
                                ));
                            }
                        }

                        if !backoff.should_retry() {
                            // Give up on the remembered device and take the
                            // first one that exists now
                            if let Some(first) = input::available_ports().into_iter().next()
                                && let Ok(mut target) = target_device.lock()
                            {
                                *target = Some(first);
                            }
                            backoff.reset();
                            continue;
                        }

                        if let Some(delay) = backoff.next_delay() {
                            info!(attempt = backoff.attempt(), ?delay, "MIDI reconnect scheduled");
                            thread::sleep(delay);
                        }

                        let target = target_device.lock().ok().and_then(|t| t.clone());
                        let reconnected = Self::try_connect(
                            target.as_deref(),
                            &connection,
                            &status,
                            &target_device,
                            &live_tx,
                        );
                        if reconnected && let Ok(mut tx) = notification_tx.lock() {
                            let _ = tx.try_push(Notification::info(
                                NotificationCategory::Midi,
                                "MIDI device reconnected".to_string(),
                            ));
                        }
                    }
                }
            }
        })
    }
}
