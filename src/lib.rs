pub mod config;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod events;
pub mod habits;
pub mod prom_metrics;
pub mod sync;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering from poisoning.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
