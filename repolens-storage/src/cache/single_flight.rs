//! Per-key request coalescing.
//!
//! The first caller for a key becomes the leader: its work is started on a
//! detached task and published as a shared future. Callers arriving while
//! that work runs join as followers and await the same output instead of
//! starting their own. The entry is removed as soon as the work finishes,
//! so a later caller starts a new flight.
//!
//! The detached task keeps the work running to completion even if every
//! waiter is dropped (for example when HTTP clients disconnect).

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

type Flight<V> = Shared<BoxFuture<'static, V>>;
type FlightMap<K, V> = Arc<DashMap<K, Flight<V>>>;

/// How a caller took part in a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
    /// Started the work.
    Leader,
    /// Awaited work started by another caller.
    Follower,
}

/// Counters describing coalescing activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlightStats {
    /// Flights started.
    pub led: u64,
    /// Callers that joined an existing flight.
    pub joined: u64,
}

/// Removes its flight from the map when the flight's future is done or dropped.
struct FlightGuard<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    flights: FlightMap<K, V>,
    key: K,
}

impl<K, V> Drop for FlightGuard<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn drop(&mut self) {
        self.flights.remove(&self.key);
    }
}

/// Coalesces concurrent work by key.
pub struct SingleFlight<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    flights: FlightMap<K, V>,
    led: AtomicU64,
    joined: AtomicU64,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            led: AtomicU64::new(0),
            joined: AtomicU64::new(0),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or join the flight already running for it.
    ///
    /// `work` is only called when this caller becomes the leader. Must be
    /// called from within a tokio runtime.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> (V, FlightRole)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (flight, role) = match self.flights.entry(key.clone()) {
            Entry::Occupied(existing) => {
                self.joined.fetch_add(1, Ordering::Relaxed);
                (existing.get().clone(), FlightRole::Follower)
            }
            Entry::Vacant(slot) => {
                let guard = FlightGuard {
                    flights: Arc::clone(&self.flights),
                    key,
                };
                let fut = work();
                let flight = async move {
                    let _guard = guard;
                    fut.await
                }
                .boxed()
                .shared();
                slot.insert(flight.clone());
                self.led.fetch_add(1, Ordering::Relaxed);
                (flight, FlightRole::Leader)
            }
        };

        if role == FlightRole::Leader {
            // Drive the flight independently of this caller.
            tokio::spawn(flight.clone());
        }

        (flight.await, role)
    }

    /// Number of flights currently running.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    pub fn stats(&self) -> FlightStats {
        FlightStats {
            led: self.led.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_single_caller_leads() {
        let flights: SingleFlight<String, u32> = SingleFlight::new();
        let (value, role) = flights.run("a".to_string(), || async { 7 }).await;
        assert_eq!(value, 7);
        assert_eq!(role, FlightRole::Leader);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let flights: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = Arc::clone(&flights);
            let executions = Arc::clone(&executions);
            let release = Arc::clone(&release);
            handles.push(tokio::spawn(async move {
                flights
                    .run("key".to_string(), move || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        42
                    })
                    .await
            }));
        }

        while flights.stats().joined < 7 {
            tokio::task::yield_now().await;
        }
        release.notify_one();

        let mut leaders = 0;
        for handle in handles {
            let (value, role) = handle.await.unwrap();
            assert_eq!(value, 42);
            if role == FlightRole::Leader {
                leaders += 1;
            }
        }

        assert_eq!(leaders, 1);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(flights.stats(), FlightStats { led: 1, joined: 7 });
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flights: SingleFlight<String, String> = SingleFlight::new();
        let (a, role_a) = flights
            .run("a".to_string(), || async { "a".to_string() })
            .await;
        let (b, role_b) = flights
            .run("b".to_string(), || async { "b".to_string() })
            .await;
        assert_eq!((a.as_str(), b.as_str()), ("a", "b"));
        assert_eq!(role_a, FlightRole::Leader);
        assert_eq!(role_b, FlightRole::Leader);
        assert_eq!(flights.stats().led, 2);
    }

    #[tokio::test]
    async fn test_sequential_calls_start_new_flights() {
        let flights: SingleFlight<u8, u8> = SingleFlight::new();
        let executions = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let executions = Arc::clone(&executions);
            flights
                .run(1, move || async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    1
                })
                .await;
        }
        assert_eq!(executions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_work_completes_after_caller_is_dropped() {
        let flights: Arc<SingleFlight<u8, u8>> = Arc::new(SingleFlight::new());
        let finished = Arc::new(Notify::new());

        let caller = {
            let flights = Arc::clone(&flights);
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                flights
                    .run(1, move || async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        finished.notify_one();
                        1
                    })
                    .await
            })
        };

        while flights.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        caller.abort();

        tokio::time::timeout(Duration::from_secs(5), finished.notified())
            .await
            .expect("detached work should still finish");
    }
}
