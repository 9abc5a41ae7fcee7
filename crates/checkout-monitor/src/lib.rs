//! Transaction monitoring for the token-checkout system.
//!
//! Settlement submits a transfer and enqueues a monitor request; this
//! module owns everything that happens afterwards. [`watch`] opens a
//! filtered log watch that resolves to exactly one terminal signal for
//! one target transaction, and [`ReconcileWorker`] races that watch
//! against a bounded timeout to move the order to its final payment
//! status.

mod watch;
mod worker;

pub use watch::{watch, LogWatch, WatchTarget};
pub use worker::{ReconcileError, ReconcileWorker};

/// Indexed topic count of an ERC-20 Transfer event: the event signature
/// plus the two indexed addresses.
pub const TRANSFER_TOPICS: usize = 3;

#[cfg(test)]
pub(crate) mod test_support;
