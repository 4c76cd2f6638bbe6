//! Multi-subscriber broadcast fan-out.
//!
//! Subscribers are keyed by id under a readers-writer lock and invoked
//! synchronously in registration order; send functions must not block
//! (real subscribers hand off to their own queues). Proximity broadcasts
//! filter by hex distance when the message carries a position.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tellus_data::{GameMessage, HexCoord};
use uuid::Uuid;

pub type SendFn = Arc<dyn Fn(&GameMessage) + Send + Sync>;

struct Subscriber {
    order: u64,
    send: SendFn,
}

#[derive(Default)]
pub struct Broadcaster {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    next_order: std::sync::atomic::AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, id: Uuid, send: F)
    where
        F: Fn(&GameMessage) + Send + Sync + 'static,
    {
        let order = self
            .next_order
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut subs = self.subscribers.write().expect("broadcast lock poisoned");
        subs.insert(
            id,
            Subscriber {
                order,
                send: Arc::new(send),
            },
        );
    }

    /// Deregistration is explicit; there is no weak auto-cleanup.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let mut subs = self.subscribers.write().expect("broadcast lock poisoned");
        subs.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .expect("broadcast lock poisoned")
            .len()
    }

    /// Delivers to every subscriber, in stable registration order so each
    /// subscriber observes messages FIFO.
    pub fn broadcast_event(&self, message: &GameMessage) {
        let subs = self.subscribers.read().expect("broadcast lock poisoned");
        let mut ordered: Vec<&Subscriber> = subs.values().collect();
        ordered.sort_by_key(|s| s.order);
        for sub in ordered {
            (sub.send)(message);
        }
    }

    /// Delivers only to subscribers within `max_distance` hex cells of
    /// the message position. Messages without a position fall back to a
    /// global broadcast. Delivered copies carry `data.distance`.
    pub fn broadcast_proximity<P>(&self, message: &GameMessage, max_distance: u32, player_pos: P)
    where
        P: Fn(Uuid) -> Option<HexCoord>,
    {
        let Some(origin) = message.position else {
            self.broadcast_event(message);
            return;
        };
        let subs = self.subscribers.read().expect("broadcast lock poisoned");
        let mut ordered: Vec<(Uuid, &Subscriber)> = subs.iter().map(|(id, s)| (*id, s)).collect();
        ordered.sort_by_key(|(_, s)| s.order);
        for (id, sub) in ordered {
            let Some(pos) = player_pos(id) else { continue };
            let distance = origin.distance(&pos);
            if distance <= max_distance {
                let delivered = message
                    .clone()
                    .with_data("distance", serde_json::json!(distance));
                (sub.send)(&delivered);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_broadcast_reaches_all_subscribers() {
        let bus = Broadcaster::new();
        let counter1 = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::new(AtomicUsize::new(0));

        let c1 = counter1.clone();
        bus.subscribe(Uuid::new_v4(), move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = counter2.clone();
        bus.subscribe(Uuid::new_v4(), move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        bus.broadcast_event(&GameMessage::simulation("year_tick", "year 1"));
        assert_eq!(counter1.load(Ordering::SeqCst), 1);
        assert_eq!(counter2.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fifo_per_subscriber() {
        let bus = Broadcaster::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(Uuid::new_v4(), move |msg| {
            sink.lock().unwrap().push(msg.content.clone());
        });
        for i in 0..5 {
            bus.broadcast_event(&GameMessage::simulation("year_tick", format!("{i}")));
        }
        assert_eq!(*seen.lock().unwrap(), vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_unsubscribe_is_explicit() {
        let bus = Broadcaster::new();
        let id = Uuid::new_v4();
        bus.subscribe(id, |_| {});
        assert_eq!(bus.subscriber_count(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_proximity_filters_by_hex_distance() {
        let bus = Broadcaster::new();
        let near_id = Uuid::new_v4();
        let far_id = Uuid::new_v4();
        let near_count = Arc::new(AtomicUsize::new(0));
        let far_count = Arc::new(AtomicUsize::new(0));

        let n = near_count.clone();
        bus.subscribe(near_id, move |msg| {
            assert_eq!(msg.data.get("distance"), Some(&serde_json::json!(2)));
            n.fetch_add(1, Ordering::SeqCst);
        });
        let f = far_count.clone();
        bus.subscribe(far_id, move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        let msg = GameMessage::game("tectonic", "the ground shakes").at(HexCoord::new(0, 0));
        bus.broadcast_proximity(&msg, 5, |id| {
            if id == near_id {
                Some(HexCoord::new(2, 0))
            } else {
                Some(HexCoord::new(20, 20))
            }
        });
        assert_eq!(near_count.load(Ordering::SeqCst), 1);
        assert_eq!(far_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_proximity_without_position_goes_global() {
        let bus = Broadcaster::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(Uuid::new_v4(), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let msg = GameMessage::game("climate", "a chill settles");
        bus.broadcast_proximity(&msg, 1, |_| None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
