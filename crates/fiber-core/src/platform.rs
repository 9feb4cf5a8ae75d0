//! Clock and yield contract between the scheduler and its host.
//!
//! The scheduler never reads wall-clock time or blocks on its own. A host
//! supplies the current time, decides when a requested callback actually
//! runs and tells the scheduler when the current time slice is exhausted.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Callback handed to the host; the argument reports whether the requested
/// timeout elapsed before the host got around to running it.
pub type HostCallback = Box<dyn FnOnce(bool)>;

/// Timing services for the scheduler.
pub trait HostClock {
    /// Monotonic time in milliseconds.
    fn now(&self) -> u64;

    /// Arrange for `callback` to run, ideally during idle time before
    /// `absolute_timeout_ms` elapses. Replaces any previously requested callback.
    fn request_host_callback(&self, callback: HostCallback, absolute_timeout_ms: i64);

    /// Drop the pending callback, if any.
    fn cancel_host_callback(&self);

    /// Whether the current time slice is used up.
    fn should_yield_now(&self) -> bool;
}

/// Deterministic clock driven explicitly by its owner.
///
/// Time only moves through [`ManualClock::advance`] or [`ManualClock::set_now`],
/// and the pending host callback only runs from
/// [`ManualClock::run_host_callback`]. Yielding is controlled with
/// [`ManualClock::set_should_yield`] or a budget of yield checks.
#[derive(Default)]
pub struct ManualClock {
    now: Cell<u64>,
    should_yield: Cell<bool>,
    yield_budget: Cell<Option<usize>>,
    yield_checks: Cell<usize>,
    pending: RefCell<Option<(HostCallback, i64)>>,
}

impl ManualClock {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn set_now(&self, ms: u64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set_should_yield(&self, should_yield: bool) {
        self.should_yield.set(should_yield);
        self.yield_budget.set(None);
    }

    /// Allows `checks` more yield checks to answer `false`, then answers `true`
    /// until reconfigured.
    pub fn yield_after(&self, checks: usize) {
        self.should_yield.set(false);
        self.yield_budget.set(Some(checks));
    }

    /// Number of times the scheduler asked whether to yield.
    pub fn yield_checks(&self) -> usize {
        self.yield_checks.get()
    }

    pub fn has_pending_callback(&self) -> bool {
        self.pending.borrow().is_some()
    }

    pub fn pending_timeout(&self) -> Option<i64> {
        self.pending.borrow().as_ref().map(|(_, timeout)| *timeout)
    }

    /// Runs the pending callback, reporting a timeout if the clock already
    /// passed its deadline. Returns `false` if nothing was pending.
    pub fn run_host_callback(&self) -> bool {
        let pending = self.pending.borrow_mut().take();
        match pending {
            Some((callback, timeout)) => {
                let did_timeout = self.now.get() as i64 >= timeout;
                callback(did_timeout);
                true
            }
            None => false,
        }
    }

    /// Keeps running host callbacks until none is requested, bounded by
    /// `max_rounds`. Returns the number of callbacks run.
    pub fn run_until_idle(&self, max_rounds: usize) -> usize {
        let mut rounds = 0;
        while rounds < max_rounds && self.run_host_callback() {
            rounds += 1;
        }
        rounds
    }
}

impl HostClock for ManualClock {
    fn now(&self) -> u64 {
        self.now.get()
    }

    fn request_host_callback(&self, callback: HostCallback, absolute_timeout_ms: i64) {
        *self.pending.borrow_mut() = Some((callback, absolute_timeout_ms));
    }

    fn cancel_host_callback(&self) {
        self.pending.borrow_mut().take();
    }

    fn should_yield_now(&self) -> bool {
        self.yield_checks.set(self.yield_checks.get() + 1);
        match self.yield_budget.get() {
            Some(0) => true,
            Some(remaining) => {
                self.yield_budget.set(Some(remaining - 1));
                false
            }
            None => self.should_yield.get(),
        }
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now.get())
            .field("should_yield", &self.should_yield.get())
            .field("yield_budget", &self.yield_budget.get())
            .field("pending_timeout", &self.pending_timeout())
            .finish()
    }
}
