// Device connection state - shared status flag and reconnect pacing

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Error = 3,
}

impl From<u8> for DeviceStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => DeviceStatus::Connecting,
            2 => DeviceStatus::Connected,
            3 => DeviceStatus::Error,
            _ => DeviceStatus::Disconnected,
        }
    }
}

/// Connection status shared between the monitor thread and whoever asks.
#[derive(Clone)]
pub struct AtomicDeviceStatus {
    inner: Arc<AtomicU8>,
}

impl AtomicDeviceStatus {
    pub fn new(status: DeviceStatus) -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(status as u8)),
        }
    }

    pub fn get(&self) -> DeviceStatus {
        DeviceStatus::from(self.inner.load(Ordering::Relaxed))
    }

    pub fn set(&self, status: DeviceStatus) {
        self.inner.store(status as u8, Ordering::Relaxed);
    }
}

impl Default for AtomicDeviceStatus {
    fn default() -> Self {
        Self::new(DeviceStatus::Disconnected)
    }
}

/// Exponential backoff for reconnection attempts: `base × 2^attempt`,
/// capped, with a bounded attempt count before the caller falls back to
/// whatever device is available.
pub struct ReconnectBackoff {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts run out.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << self.attempt.min(20))
            .min(self.max_delay_ms);
        self.attempt += 1;
        Some(Duration::from_millis(delay_ms))
    }

    /// Called after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn should_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        let status = AtomicDeviceStatus::default();
        assert_eq!(status.get(), DeviceStatus::Disconnected);

        status.set(DeviceStatus::Connected);
        assert_eq!(status.get(), DeviceStatus::Connected);

        let shared = status.clone();
        shared.set(DeviceStatus::Error);
        assert_eq!(status.get(), DeviceStatus::Error);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = ReconnectBackoff::new();

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1000)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(2000)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(4000)));

        // Later attempts cap at the maximum delay
        for _ in 0..5 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(30_000)));
    }

    #[test]
    fn test_backoff_exhausts_and_resets() {
        let mut backoff = ReconnectBackoff::new();
        backoff.max_attempts = 2;

        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert!(!backoff.should_retry());

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.should_retry());
    }
}
