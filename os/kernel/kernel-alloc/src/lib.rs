//! # Physical Frame Allocation with Copy-on-Write
//!
//! This crate owns physical memory at 4 KiB granularity and lets address
//! spaces share frames copy-on-write.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Copy-on-Write (cow)                │
//! │    • share_page: mark COW, add an owner, map child  │
//! │    • resolve_cow: allocate, copy, unmap, remap      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                Frame Pool (pool)                    │
//! │    • intrusive free list behind a spin lock         │
//! │    • poison fills on allocate / free                │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Reference Counts (refcount)                  │
//! │    • one atomic owner count per managed frame       │
//! │    • indexed through validated FrameIndex values    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Frame contents are reached through a [`PhysMapper`](kernel_vmem::PhysMapper);
//! [`phys_mapper::DirectMapper`] covers the kernel's direct map.
//!
//! ## Lifecycle
//!
//! 1. Kernel initialization creates one [`FramePool`] for
//!    `[end of kernel image, top of RAM)` ([`ManagedRange::above_kernel`]) and
//!    passes it by reference to everything that needs frames.
//! 2. [`FramePool::init`] releases every frame into the pool. Owner counts are
//!    still zero during this bootstrap phase, so the double-free check is off.
//! 3. From then on [`FramePool::allocate`] hands out frames with one owner,
//!    [`ReferenceCountTable::increment`] adds owners when a frame is shared,
//!    and [`FramePool::release`] drops them; the last release frees the frame.
//!
//! ## Failure model
//!
//! Running out of frames is an ordinary `None` / [`CowError::OutOfMemory`].
//! Broken accounting (double free, foreign frames, copy-on-write faults that
//! violate their preconditions) goes through [`fatal::abort`] and never
//! returns.
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::{FramePool, ManagedRange};
//! use kernel_alloc::phys_mapper::DirectMapper;
//! use kernel_vmem::addresses::PhysicalAddress;
//!
//! #[repr(C, align(4096))]
//! struct Ram([u8; 4 * 4096]);
//! let mut ram = Box::new(Ram([0; 4 * 4096]));
//!
//! const RAM_BASE: u64 = 0x8000_0000;
//! let mapper = DirectMapper::new((ram.0.as_mut_ptr() as u64).wrapping_sub(RAM_BASE));
//! let range = ManagedRange::new(
//!     PhysicalAddress::new(RAM_BASE),
//!     PhysicalAddress::new(RAM_BASE + 4 * 4096),
//! );
//!
//! let pool = FramePool::new(mapper, range);
//! pool.init();
//! assert_eq!(pool.free_frames(), 4);
//!
//! let frame = pool.allocate().expect("frame");
//! assert_eq!(pool.references().get(frame), 1);
//! pool.release(frame);
//! assert_eq!(pool.free_frames(), 4);
//! # drop(pool);
//! # drop(ram);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod cow;
pub mod fatal;
pub mod phys_mapper;
pub mod pool;
pub mod range;
pub mod refcount;

pub use crate::cow::{CowError, resolve_cow, resolve_write_fault, share_page};
pub use crate::fatal::InvariantViolation;
pub use crate::pool::{ALLOC_POISON, FREE_POISON, FramePool, PoolStats};
pub use crate::range::{FrameError, FrameIndex, ManagedRange};
pub use crate::refcount::ReferenceCountTable;
