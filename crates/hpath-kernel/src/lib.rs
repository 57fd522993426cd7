//! Discrete-event simulation kernel for the histopathology lab model.
//!
//! Ten components live here or in `hpath-model` (spec §2); this crate owns
//! the first six, leaf-first:
//!
//! - [`clock`]: the logical clock and its min-heap event queue.
//! - [`process`]: cooperative processes (stackful `corosensei` coroutines)
//!   and the suspending operations they may perform.
//! - [`scheduler`]: the single-dispatch loop interpreting every suspension.
//! - [`resource`]: capacity-limited assets with time-varying capacity.
//! - [`store`]: typed FIFO/priority queues.
//! - [`monitor`]: time-stamped level recorders.
//! - [`rng`]: seeded distribution sampling.
//! - [`priority`]: the four specimen/request priority levels.

pub mod clock;
pub mod monitor;
pub mod priority;
pub mod process;
pub mod resource;
pub mod rng;
pub mod scheduler;
pub mod store;

pub use clock::{Clock, EventQueue, SimClock};
pub use monitor::Monitor;
pub use priority::Priority;
pub use process::{Process, ProcessContext, ProcessId, ResourceClaim, Suspend};
pub use resource::{Resource, ResourceId};
pub use rng::{Distribution, Duration, IntDistribution, RngService};
pub use scheduler::Scheduler;
pub use store::{AnyStore, Store, StoreId};
