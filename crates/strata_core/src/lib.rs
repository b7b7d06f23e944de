//! # STRATA Core
//!
//! Small building blocks shared by the world generator and the simulation.
//!
//! ## Contents
//!
//! - [`Pool`]: a generational arena. Entities live in slots and are addressed
//!   by [`Handle`]s (index + generation). A stale handle never resolves to a
//!   newer occupant of the same slot.
//! - [`VersionedSlot`]: a value that can be replaced wholesale while readers
//!   keep the `Arc` snapshot they already took. Replacement bumps a version
//!   counter and then notifies subscribers.
//!
//! ## Example
//!
//! ```rust
//! use strata_core::{Pool, VersionedSlot};
//!
//! let mut mobs: Pool<&str> = Pool::with_capacity(4);
//! let zombie = mobs.insert("zombie").unwrap();
//! assert_eq!(mobs.get(zombie), Some(&"zombie"));
//!
//! let slot = VersionedSlot::new(1u32);
//! let before = slot.load();
//! slot.replace(2);
//! assert_eq!(*before, 1);
//! assert_eq!(*slot.load(), 2);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod pool;
pub mod versioned;

pub use pool::{Handle, Pool};
pub use versioned::{SubscriptionId, VersionedSlot};
