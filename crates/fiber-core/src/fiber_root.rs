use slotmap::new_key_type;

use crate::element::Child;
use crate::error::FiberError;
use crate::expiration_time::{ExpirationTime, NO_WORK};
use crate::fiber::FiberId;
use crate::host::NodeId;
use crate::scheduler::CallbackId;
use crate::update_queue::MergeState;

new_key_type! {
    pub struct RootId;
}

/// State carried by a host root fiber: the top-level description.
#[derive(Clone, Debug, Default)]
pub struct RootState {
    pub element: Child,
}

impl MergeState for RootState {
    fn merge(&self, partial: &Self) -> Self {
        partial.clone()
    }
}

/// A container rendered into, plus its scheduling bookkeeping.
#[derive(Debug)]
pub struct FiberRoot {
    pub container: NodeId,
    pub current: FiberId,
    pub finished_work: Option<FiberId>,
    /// Highest expiration time with work pending anywhere under the root.
    pub first_pending_time: ExpirationTime,
    /// Lowest expiration time seen since the root was last fully caught up.
    pub last_pending_time: ExpirationTime,
    pub ping_time: ExpirationTime,
    /// Expiration time of the last committed pass.
    pub pending_commit_expiration_time: ExpirationTime,
    pub callback_node: Option<CallbackId>,
    pub callback_expiration_time: ExpirationTime,
    /// Fatal errors from passes the scheduler ran on this root's behalf.
    pub errors: Vec<FiberError>,
}

impl FiberRoot {
    pub(crate) fn new(container: NodeId, current: FiberId) -> Self {
        Self {
            container,
            current,
            finished_work: None,
            first_pending_time: NO_WORK,
            last_pending_time: NO_WORK,
            ping_time: NO_WORK,
            pending_commit_expiration_time: NO_WORK,
            callback_node: None,
            callback_expiration_time: NO_WORK,
            errors: Vec::new(),
        }
    }

    pub(crate) fn mark_pending_time(&mut self, expiration_time: ExpirationTime) {
        if expiration_time > self.first_pending_time {
            self.first_pending_time = expiration_time;
        }
        if self.last_pending_time == NO_WORK || expiration_time < self.last_pending_time {
            self.last_pending_time = expiration_time;
        }
    }

    /// Records what is left after a commit.
    pub(crate) fn mark_committed(
        &mut self,
        committed: ExpirationTime,
        remaining: ExpirationTime,
    ) {
        self.pending_commit_expiration_time = committed;
        self.first_pending_time = remaining;
        if remaining == NO_WORK {
            self.last_pending_time = NO_WORK;
        } else if remaining < self.last_pending_time {
            self.last_pending_time = remaining;
        }
        if self.ping_time != NO_WORK && self.ping_time > remaining {
            self.ping_time = NO_WORK;
        }
    }
}
