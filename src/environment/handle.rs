use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::error::EnvironmentError;

use super::{Environment, RawObservation, Transition};

struct Inner {
    env: Mutex<Box<dyn Environment>>,
    width: usize,
    /// Set by the first `release`; every later call is a no-op.
    released: AtomicBool,
    /// Set once `Environment::close` has actually run.
    closed: AtomicBool,
}

/// Shared, release-once handle to a running environment.
///
/// The runner steps through the handle while the dispatcher may release it
/// concurrently. `release` never waits for an in-flight step: if the backend
/// is busy, whichever side finishes last performs the close.
#[derive(Clone)]
pub struct EnvironmentHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentHandle")
            .field("width", &self.inner.width)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

impl EnvironmentHandle {
    /// Wraps `env`; its width is read once here.
    #[must_use]
    pub fn new(env: Box<dyn Environment>) -> Self {
        let width = env.observation_width();
        Self {
            inner: Arc::new(Inner {
                env: Mutex::new(env),
                width,
                released: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Declared observation width.
    #[must_use]
    pub fn observation_width(&self) -> usize {
        self.inner.width
    }

    /// Returns true once `release` has been called.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Returns true once the backend's `close` has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Forwards to [`Environment::launch`]. Fails with `Closed` after release.
    pub fn launch(&self) -> Result<(), EnvironmentError> {
        self.with_env(|env| env.launch())
    }

    /// Forwards to [`Environment::reset`].
    pub fn reset(&self) -> Result<RawObservation, EnvironmentError> {
        self.with_env(|env| env.reset())
    }

    /// Forwards to [`Environment::step`].
    pub fn step(&self, action: i64) -> Result<Transition, EnvironmentError> {
        self.with_env(|env| env.step(action))
    }

    /// Releases the environment. Idempotent; the backend is closed once.
    ///
    /// Returns true if this call performed the release.
    pub fn release(&self) -> bool {
        let first = !self.inner.released.swap(true, Ordering::AcqRel);
        self.try_close();
        first
    }

    /// Closes now unless a call is in flight; that call closes on its way out.
    fn try_close(&self) {
        match self.inner.env.try_lock() {
            Ok(mut env) => self.close_locked(&mut env),
            Err(TryLockError::Poisoned(poisoned)) => self.close_locked(&mut poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {}
        }
    }

    fn with_env<T>(
        &self,
        f: impl FnOnce(&mut dyn Environment) -> Result<T, EnvironmentError>,
    ) -> Result<T, EnvironmentError> {
        if self.is_released() {
            self.try_close();
            return Err(EnvironmentError::Closed);
        }
        let mut env = self.lock();
        let result = f(env.as_mut());
        if self.is_released() {
            self.close_locked(&mut env);
        }
        result
    }

    fn close_locked(&self, env: &mut MutexGuard<'_, Box<dyn Environment>>) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            env.close();
            tracing::debug!("environment closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Environment>> {
        // A panicking backend is reported by the runner; the box itself is
        // still safe to close.
        self.inner.env.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct Counting {
        closes: Arc<AtomicUsize>,
    }

    impl Environment for Counting {
        fn observation_width(&self) -> usize {
            1
        }

        fn reset(&mut self) -> Result<RawObservation, EnvironmentError> {
            Ok(RawObservation::Scalar(0.0))
        }

        fn step(&mut self, _action: i64) -> Result<Transition, EnvironmentError> {
            Ok(Transition {
                observation: RawObservation::Scalar(1.0),
                reward: 1.0,
                done: false,
            })
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn release_closes_exactly_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let handle = EnvironmentHandle::new(Box::new(Counting {
            closes: Arc::clone(&closes),
        }));
        let clone = handle.clone();

        assert!(handle.release());
        assert!(!handle.release());
        assert!(!clone.release());
        assert!(handle.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn released_handle_refuses_work() {
        let handle = EnvironmentHandle::new(Box::new(Counting {
            closes: Arc::new(AtomicUsize::new(0)),
        }));
        handle.reset().unwrap();
        handle.release();
        assert!(matches!(handle.step(0), Err(EnvironmentError::Closed)));
        assert!(matches!(handle.reset(), Err(EnvironmentError::Closed)));
    }

    #[test]
    fn release_during_step_defers_close() {
        let closes = Arc::new(AtomicUsize::new(0));
        let handle = EnvironmentHandle::new(Box::new(Counting {
            closes: Arc::clone(&closes),
        }));

        // Simulate an in-flight call by holding the backend lock.
        let guard = handle.lock();
        assert!(handle.release());
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        drop(guard);

        // The next caller through the handle closes it.
        assert!(matches!(handle.step(1), Err(EnvironmentError::Closed)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(handle.is_closed());
    }
}
