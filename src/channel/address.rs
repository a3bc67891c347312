//! Per-worker channel addresses.
//!
//! Every worker gets its own local-socket name derived from a numeric
//! identifier, so two workers never collide on the same address. The
//! identifiers are handed out monotonically and are never reused within one
//! supervisor lifetime, which keeps a slow-exiting old worker from racing a
//! fresh one for the same name.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::{AppError, Result};

/// Local-socket name a single worker's reply channel is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelAddress {
    id: u32,
    name: String,
}

impl ChannelAddress {
    /// Build the address `<prefix>-<id>.sock`.
    #[must_use]
    pub fn new(prefix: &str, id: u32) -> Self {
        Self {
            id,
            name: format!("{prefix}-{id}.sock"),
        }
    }

    /// Numeric identifier the address was derived from.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Socket name passed to the worker on its command line.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl Display for ChannelAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Monotonic allocator of [`ChannelAddress`] values.
#[derive(Debug)]
pub struct AddressAllocator {
    prefix: String,
    next: AtomicU32,
}

impl AddressAllocator {
    /// Create an allocator whose first address uses `base` as identifier.
    #[must_use]
    pub fn new(prefix: impl Into<String>, base: u32) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU32::new(base),
        }
    }

    /// Hand out the next unused address.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bind` once the identifier space is exhausted.
    pub fn allocate(&self) -> Result<ChannelAddress> {
        let id = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| AppError::Bind("channel address space exhausted".into()))?;
        Ok(ChannelAddress::new(&self.prefix, id))
    }
}
