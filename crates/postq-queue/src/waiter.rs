//! Single-use rendezvous cell for a blocked consumer
//!
//! A `Waiter` is registered by a consumer that found its queue empty. Exactly
//! one of two parties finalizes it: a producer delivering a message, or the
//! consumer giving up after its timeout. Both transitions run while the owning
//! queue's lock is held, so the outcome is decided by whichever acquires that
//! lock first.

use parking_lot::Mutex;
use postq_types::Message;
use tokio::sync::Notify;

/// State of a rendezvous cell
#[derive(Debug)]
enum WaiterState {
    /// Registered, nothing delivered yet
    Pending,
    /// A producer handed over a message that the consumer has not taken yet
    Fulfilled(Message),
    /// The consumer took the delivered message
    Claimed,
    /// The consumer gave up before any delivery
    Abandoned,
}

/// A pending consumer handle
#[derive(Debug)]
pub(crate) struct Waiter {
    id: u64,
    state: Mutex<WaiterState>,
    notify: Notify,
}

impl Waiter {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            state: Mutex::new(WaiterState::Pending),
            notify: Notify::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Deliver a message into the cell.
    ///
    /// Hands the message back if the cell is no longer pending.
    pub(crate) fn fulfill(&self, message: Message) -> Result<(), Message> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, WaiterState::Pending) {
                return Err(message);
            }
            *state = WaiterState::Fulfilled(message);
        }
        // notify_one stores a permit, so a consumer that has not started
        // waiting yet still wakes up.
        self.notify.notify_one();
        Ok(())
    }

    /// Wait until a producer fulfills the cell.
    pub(crate) async fn delivered(&self) {
        self.notify.notified().await
    }

    /// Finalize the cell from the consumer side.
    ///
    /// A fulfilled cell yields its message and becomes `Claimed`; a pending
    /// cell becomes `Abandoned` and yields nothing. Must be called with the
    /// owning queue locked so it cannot interleave with `fulfill`.
    pub(crate) fn settle(&self) -> Option<Message> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, WaiterState::Claimed) {
            WaiterState::Fulfilled(message) => Some(message),
            WaiterState::Claimed => None,
            WaiterState::Pending | WaiterState::Abandoned => {
                *state = WaiterState::Abandoned;
                None
            }
        }
    }

    #[cfg(test)]
    fn is_pending(&self) -> bool {
        matches!(*self.state.lock(), WaiterState::Pending)
    }
}
