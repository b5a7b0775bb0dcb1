//! Single-slot guards for user-initiated asynchronous operations.
//!
//! An [`InFlight`] slot holds at most one request at a time. Acquiring the slot is a single
//! atomic compare-and-set, so two callers racing on different threads cannot both start the
//! same operation. The returned [`RequestToken`] frees the slot when it is dropped, whether
//! the operation completed, failed or was cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An identifier for an in-flight request. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct Slot {
    // 0 when empty, otherwise the id of the active request.
    active: AtomicU64,
    next_id: AtomicU64,
}

/// A slot that admits one request at a time.
#[derive(Clone, Debug, Default)]
pub struct InFlight {
    slot: Arc<Slot>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot, returning `None` if another request already holds it.
    pub fn try_acquire(&self) -> Option<RequestToken> {
        let id = self.slot.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let id = if id == 0 { 1 } else { id };
        self.slot
            .active
            .compare_exchange(0, id, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RequestToken {
                slot: Arc::clone(&self.slot),
                id: RequestId(id),
            })
    }

    /// Returns the id of the request currently holding the slot.
    pub fn current(&self) -> Option<RequestId> {
        match self.slot.active.load(Ordering::Acquire) {
            0 => None,
            id => Some(RequestId(id)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }
}

/// Proof of holding an [`InFlight`] slot. Releases the slot on drop.
#[derive(Debug)]
pub struct RequestToken {
    slot: Arc<Slot>,
    id: RequestId,
}

impl RequestToken {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Drop for RequestToken {
    fn drop(&mut self) {
        // Only clear the slot if it still names this request.
        let _ = self.slot.active.compare_exchange(
            self.id.0,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
