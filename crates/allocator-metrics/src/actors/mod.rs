//! Allocator actor.
//!
//! A single actor owns the allocator state and both metrics registries.
//! Callers interact with it through [`AllocatorActorHandle`]; pull gauges
//! reach it through [`AllocatorRef`].
//!
//! - [`allocator`] - the actor, its handle and the weak query source
//! - [`messages`] - request types and replies
//! - [`state`] - allocator bookkeeping (agents, frameworks, quotas, filters)
//! - [`mailbox`] - mailbox depth monitoring

pub mod allocator;
pub mod mailbox;
pub mod messages;
pub mod state;

pub use allocator::{AllocatorActorHandle, AllocatorOptions, AllocatorRef, DEFAULT_MAILBOX_CAPACITY};
pub use mailbox::{MailboxLevel, MailboxMonitor};
pub use messages::{AllocationRunSummary, AllocatorMessage, AllocatorStatus};
pub use state::{AllocatorState, DrfPosition, RoleChanges, MAX_OFFER_FILTER_DURATION};
