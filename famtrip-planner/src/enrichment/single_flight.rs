//! In-flight request coalescing
//!
//! When several callers ask for the same key while a lookup is outstanding,
//! only the first one (the leader) starts the work; the rest subscribe to a
//! broadcast channel and receive the leader's result.
//!
//! The work runs on its own task, so it finishes (and fills the cache) even
//! if every waiting caller gives up.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

type FlightMap<K, V> = Arc<Mutex<HashMap<K, broadcast::Sender<V>>>>;

/// Outcome of [`SingleFlight::run`]
#[derive(Debug)]
pub struct Flight<V> {
    /// `None` if the work task died without producing a value
    pub value: Option<V>,
    /// True when this caller attached to another caller's lookup
    pub coalesced: bool,
}

pub struct SingleFlight<K, V> {
    in_flight: FlightMap<K, V>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `work` for `key`, or wait for the identical lookup already running
    pub async fn run<F>(&self, key: K, work: F) -> Flight<V>
    where
        F: Future<Output = V> + Send + 'static,
    {
        let (mut rx, leader) = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(&key) {
                Some(tx) => (tx.subscribe(), false),
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    in_flight.insert(key.clone(), tx);
                    (rx, true)
                }
            }
        };

        if leader {
            let guard = FlightGuard {
                in_flight: Arc::clone(&self.in_flight),
                key: Some(key),
            };
            tokio::spawn(async move {
                let value = work.await;
                guard.complete(value);
            });
        }

        Flight {
            value: rx.recv().await.ok(),
            coalesced: !leader,
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the in-flight entry when the work finishes or unwinds
///
/// Dropping the sender without sending closes every waiter's receiver, so a
/// panicking lookup never leaves followers hanging.
struct FlightGuard<K: Eq + Hash, V> {
    in_flight: FlightMap<K, V>,
    key: Option<K>,
}

impl<K: Eq + Hash, V> FlightGuard<K, V> {
    fn complete(mut self, value: V) {
        if let Some(tx) = self.take_sender() {
            // Receivers may all have gone away
            let _ = tx.send(value);
        }
    }

    fn take_sender(&mut self) -> Option<broadcast::Sender<V>> {
        let key = self.key.take()?;
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
    }
}

impl<K: Eq + Hash, V> Drop for FlightGuard<K, V> {
    fn drop(&mut self) {
        self.take_sender();
    }
}
