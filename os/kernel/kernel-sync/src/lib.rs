//! # Kernel synchronization primitives
//!
//! Only what the memory subsystem needs: a named test-and-test-and-set
//! [`SpinLock`] for short, non-blocking critical sections such as the
//! free-frame list. Longer-lived state (reference counts) uses atomics
//! directly instead of a lock.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
