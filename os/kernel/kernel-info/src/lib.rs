//! # Kernel Memory Configuration
//!
//! Compile-time layout constants shared by the physical frame allocator,
//! the page-table code and the kernel proper. This crate is the single
//! source of truth for where physical RAM lives and how the kernel reaches it.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! PHYS_MEMORY_BASE  ┌─────────────────────────────────┐ 0x8000_0000
//!                   │       Kernel Image              │
//!                   │   (Text, Data, BSS)             │
//! end of image      ├─────────────────────────────────┤ (linker-provided)
//!                   │    Available RAM                │
//!                   │  (Managed by the frame pool)    │
//! PHYS_MEMORY_TOP   └─────────────────────────────────┘ 0x8800_0000
//! ```
//!
//! The frame pool manages `[end of image, PHYS_MEMORY_TOP)`. The end of the
//! kernel image is only known at link time and is handed to the allocator at
//! boot; everything else is fixed here.
//!
//! ## Direct Map
//!
//! All of physical memory is mapped at [`HHDM_BASE`](memory::HHDM_BASE) `+ pa`,
//! which is how the allocator writes the free list and poison patterns into
//! frames it does not otherwise have a pointer to.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
