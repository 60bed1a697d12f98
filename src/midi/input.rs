// MIDI live input - device callback into the lock-free live queue

use crate::messaging::channels::LiveEventProducer;
use crate::midi::event::{LiveEvent, MidiEvent};
use midir::{MidiInput, MidiInputConnection};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::warn;

pub const CLIENT_NAME: &str = "keylight";

/// Names of the currently available input ports.
pub fn available_ports() -> Vec<String> {
    let Ok(midi_in) = MidiInput::new(CLIENT_NAME) else {
        return Vec::new();
    };
    midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect()
}

/// Open a connection to the named port (or the first one when `None`).
///
/// The callback runs on the driver's thread: it stamps arrival time, parses
/// the raw bytes, and pushes into the ring buffer. `try_lock` plus
/// `try_push` keep it from ever blocking there; a contended or full queue
/// costs one event, not the device thread.
pub fn open_connection(
    device_name: Option<&str>,
    live_tx: Arc<Mutex<LiveEventProducer>>,
) -> Result<(MidiInputConnection<()>, String), String> {
    let midi_in =
        MidiInput::new(CLIENT_NAME).map_err(|e| format!("MIDI init error: {e}"))?;

    let ports = midi_in.ports();
    let port = match device_name {
        Some(name) => ports
            .iter()
            .find(|p| {
                midi_in
                    .port_name(p)
                    .map(|candidate| candidate == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| format!("MIDI device '{name}' not found"))?,
        None => ports.first().ok_or("no MIDI input ports available")?,
    };

    let port_name = midi_in
        .port_name(port)
        .unwrap_or_else(|_| "Unknown".to_string());

    let connection = midi_in
        .connect(
            port,
            CLIENT_NAME,
            move |_timestamp, bytes, _| {
                let received_at = Instant::now();
                let Some(channel_event) = MidiEvent::from_bytes(bytes) else {
                    return;
                };
                if let Ok(mut tx) = live_tx.try_lock() {
                    use ringbuf::traits::Producer;
                    if tx.try_push(LiveEvent::new(channel_event, received_at)).is_err() {
                        warn!("live event ring buffer full, event dropped");
                    }
                }
            },
            (),
        )
        .map_err(|e| format!("MIDI connection failed: {e}"))?;

    Ok((connection, port_name))
}
