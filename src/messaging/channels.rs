// Lock-free communication channels
// SPSC ring buffers on the realtime paths; the device callback and the tick
// loop never block on each other

use crate::messaging::notification::Notification;
use crate::midi::event::LiveEvent;
use ringbuf::{HeapRb, traits::Split};

pub type LiveEventProducer = ringbuf::HeapProd<LiveEvent>;
pub type LiveEventConsumer = ringbuf::HeapCons<LiveEvent>;

/// Channel from the MIDI device callback into the router.
pub fn create_live_event_channel(capacity: usize) -> (LiveEventProducer, LiveEventConsumer) {
    let rb = HeapRb::<LiveEvent>::new(capacity);
    rb.split()
}

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

/// Side channel for runtime fault reports (overflow, device loss, cache
/// trouble). Bounded: losing a report under pressure is acceptable, blocking
/// the tick loop is not.
pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}
