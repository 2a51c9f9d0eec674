//! Collapse concurrent identical work into one execution
//!
//! The first caller for a key starts the work in its own task; callers that
//! arrive while it runs await the same handle and receive a clone of the same
//! outcome. The key is released when the task ends, whether it succeeded,
//! failed, panicked or was dropped with the runtime.

use crate::error::{ChartError, ChartResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

type Flight<T> = Shared<BoxFuture<'static, ChartResult<T>>>;
type FlightMap<K, T> = Arc<Mutex<HashMap<K, Flight<T>>>>;

pub struct SingleFlight<K, T> {
    flights: FlightMap<K, T>,
}

impl<K, T> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `key`, or start one running `work`
    ///
    /// `work` is only polled when no flight for `key` exists. Dropping the
    /// returned future does not abort a started flight.
    pub async fn run<F>(&self, key: K, work: F) -> ChartResult<T>
    where
        F: Future<Output = ChartResult<T>> + Send + 'static,
    {
        let flight = {
            let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
            match flights.get(&key) {
                Some(existing) => {
                    debug!("Joining in-flight work for {:?}", key);
                    existing.clone()
                }
                None => {
                    // The guard blocks on this lock, so removal always
                    // happens after the insert below.
                    let guard = FlightGuard {
                        flights: Arc::clone(&self.flights),
                        key: key.clone(),
                    };
                    let handle = tokio::spawn(async move {
                        let _guard = guard;
                        work.await
                    });
                    let flight = async move {
                        handle.await.unwrap_or_else(|e| {
                            Err(ChartError::Internal(format!("in-flight task failed: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();
                    flights.insert(key, flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    /// Number of keys with work in progress
    pub fn in_flight(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct FlightGuard<K: Eq + Hash, T> {
    flights: FlightMap<K, T>,
    key: K,
}

impl<K: Eq + Hash, T> Drop for FlightGuard<K, T> {
    fn drop(&mut self) {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
