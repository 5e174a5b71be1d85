//! Utilities for concurrency.

use std::sync::Mutex as StdMutex;


pub use std::sync::MutexGuard;


//------------ Mutex ---------------------------------------------------------

/// A wrapper around a std mutex that shrugs off poisoning.
///
/// Everything we keep behind a mutex is a cache of some sort that stays
/// consistent between individual operations, so a panic in another holder
/// of the lock does not leave it in a state we can’t use.
#[derive(Debug, Default)]
pub struct Mutex<T: ?Sized>(StdMutex<T>);

impl<T> Mutex<T> {
    /// Creates a new mutex in unlocked state.
    pub fn new(t: T) -> Self {
        Mutex(StdMutex::new(t))
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Acquires the mutex.
    ///
    /// The current thread will be blocked until nobody else holds the mutex.
    pub fn lock(&self) -> MutexGuard<T> {
        self.0.lock().unwrap_or_else(|err| err.into_inner())
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn lock_after_poison() {
        let mutex = Arc::new(Mutex::new(5u32));
        let other = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = other.lock();
            panic!("poisoning");
        }).join();
        *mutex.lock() += 1;
        assert_eq!(*mutex.lock(), 6);
    }
}
