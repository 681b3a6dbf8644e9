//! The process-wide registry lock.
//!
//! One global critical section serializes every registry mutation; there are
//! no per-entry locks. The backing primitive is fixed at build time and
//! invisible to callers: `parking_lot::RawMutex` by default, `std::sync`
//! condvar-based under the `std-lock` feature, and an atomic spin flag with
//! yield backoff under `spin-lock`.
//!
//! The primitive is constructed lazily on the first `acquire`, guarded by an
//! atomic tri-state that is independent of the lock itself. Acquisition is
//! not reentrant: a thread that acquires twice deadlocks by design.

use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

const STATE_UNINIT: u8 = 0;
const STATE_INITIALIZING: u8 = 1;
const STATE_READY: u8 = 2;
const STATE_DOWN: u8 = 3;

#[cfg(not(any(feature = "std-lock", feature = "spin-lock")))]
mod backend {
    use parking_lot::lock_api::RawMutex as _;
    use parking_lot::RawMutex;

    /// parking_lot backend: the richest primitive available.
    pub struct LockImpl {
        raw: RawMutex,
    }

    impl LockImpl {
        pub fn new() -> Self {
            Self {
                raw: RawMutex::INIT,
            }
        }

        pub fn lock(&self) {
            self.raw.lock();
        }

        pub fn unlock(&self) {
            // SAFETY: the caller holds the lock; GlobalLock only unlocks from
            // the guard that performed the matching lock().
            unsafe { self.raw.unlock() }
        }
    }
}

#[cfg(all(feature = "std-lock", not(feature = "spin-lock")))]
mod backend {
    use std::sync::{Condvar, Mutex};

    /// std backend: a binary semaphore over Mutex + Condvar, so acquire and
    /// release do not have to happen in the same scope.
    pub struct LockImpl {
        held: Mutex<bool>,
        cv: Condvar,
    }

    impl LockImpl {
        pub fn new() -> Self {
            Self {
                held: Mutex::new(false),
                cv: Condvar::new(),
            }
        }

        pub fn lock(&self) {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            while *held {
                held = self.cv.wait(held).unwrap_or_else(|e| e.into_inner());
            }
            *held = true;
        }

        pub fn unlock(&self) {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            *held = false;
            drop(held);
            self.cv.notify_one();
        }
    }
}

#[cfg(feature = "spin-lock")]
mod backend {
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Last-resort backend: an atomic flag with pause/yield backoff.
    pub struct LockImpl {
        flag: AtomicBool,
    }

    impl LockImpl {
        pub fn new() -> Self {
            Self {
                flag: AtomicBool::new(false),
            }
        }

        pub fn lock(&self) {
            let mut spins = 0u32;
            while self
                .flag
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                spins = spins.wrapping_add(1);
                if spins % 64 == 0 {
                    std::thread::yield_now();
                } else {
                    std::hint::spin_loop();
                }
            }
        }

        pub fn unlock(&self) {
            self.flag.store(false, Ordering::Release);
        }
    }
}

use backend::LockImpl;

/// The registry's global mutual-exclusion primitive.
pub struct GlobalLock {
    state: AtomicU8,
    backend: AtomicPtr<LockImpl>,
}

impl GlobalLock {
    /// A lock with no backend yet; the backend is built on first `acquire`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_UNINIT),
            backend: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Construct the backend exactly once, racing threads spinning until the
    /// winner publishes it.
    fn ensure_backend(&self) -> &LockImpl {
        loop {
            match self.state.load(Ordering::Acquire) {
                STATE_READY => {
                    let ptr = self.backend.load(Ordering::Acquire);
                    // SAFETY: READY is only published after a valid backend
                    // pointer was stored, and the pointer lives until
                    // teardown (process exit).
                    return unsafe { &*ptr };
                }
                STATE_UNINIT => {
                    if self
                        .state
                        .compare_exchange(
                            STATE_UNINIT,
                            STATE_INITIALIZING,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        let boxed = Box::into_raw(Box::new(LockImpl::new()));
                        self.backend.store(boxed, Ordering::Release);
                        self.state.store(STATE_READY, Ordering::Release);
                    }
                }
                STATE_INITIALIZING => std::hint::spin_loop(),
                _ => panic!("global lock used after teardown"),
            }
        }
    }

    /// Block until exclusive access is obtained. Not reentrant.
    pub fn acquire(&self) {
        self.ensure_backend().lock();
    }

    /// Relinquish exclusive access. Must pair with a prior `acquire` on the
    /// same thread.
    pub fn release(&self) {
        let ptr = self.backend.load(Ordering::Acquire);
        debug_assert!(!ptr.is_null(), "release without acquire");
        // SAFETY: acquire() ran first, so the backend exists and is READY.
        unsafe { (*ptr).unlock() }
    }

    /// Destroy the backing primitive. Only called during process-exit
    /// ordering (or when a test-owned registry is dropped); any later use is
    /// a bug and panics.
    pub fn teardown(&self) {
        let prev = self.state.swap(STATE_DOWN, Ordering::AcqRel);
        if prev == STATE_READY {
            let ptr = self.backend.swap(std::ptr::null_mut(), Ordering::AcqRel);
            if !ptr.is_null() {
                // SAFETY: the pointer came from Box::into_raw in
                // ensure_backend and is dropped exactly once here.
                drop(unsafe { Box::from_raw(ptr) });
            }
        }
    }
}

impl Default for GlobalLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GlobalLock {
    fn drop(&mut self) {
        self.teardown();
    }
}
