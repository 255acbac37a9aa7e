//! Interrupt to main-loop event handoff.
//!
//! The radio interrupt pushes decoded advertisements, the main loop drains
//! them. Both sides touch the buffer only inside a critical section, and the
//! drain swaps the whole buffer out instead of iterating it in place, so the
//! critical section never grows with the number of pending events.

use crate::model::AdvertisementEvent;
use critical_section::Mutex;
use std::cell::RefCell;

/// Ordered, critical-section guarded buffer of pending advertisements.
pub struct DeferredEventQueue {
    pending: Mutex<RefCell<Vec<AdvertisementEvent>>>,
}

impl DeferredEventQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Append an event. Called from interrupt context.
    pub fn push(&self, event: AdvertisementEvent) {
        critical_section::with(|cs| self.pending.borrow_ref_mut(cs).push(event));
    }

    /// Take every pending event, oldest first.
    ///
    /// The interrupt side keeps appending to a fresh buffer while the caller
    /// works through the returned batch.
    pub fn drain_all(&self) -> Vec<AdvertisementEvent> {
        critical_section::with(|cs| std::mem::take(&mut *self.pending.borrow_ref_mut(cs)))
    }

    /// Discard every pending event, returning how many were dropped.
    pub fn clear(&self) -> usize {
        self.drain_all().len()
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.pending.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeferredEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeferredEventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredEventQueue")
            .field("pending", &self.len())
            .finish()
    }
}
