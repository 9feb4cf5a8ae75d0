//! Standard runtime services backed by Rust's `std` library.
//!
//! [`StdClock`] implements the [`fiber_core::HostClock`] contract on top of
//! [`std::time::Instant`]. It carves each display frame into a time slice:
//! the host event loop calls [`StdClock::run_frame`] once per frame, the
//! pending scheduler callback runs inside that frame, and
//! [`HostClock::should_yield_now`] turns true once the frame deadline passes.
//! The frame length adapts to the observed frame rate unless it is pinned
//! with [`StdClock::force_frame_rate`].
//!
//! [`StdRuntime`] bundles a clock with a [`Scheduler`] so several reconcilers
//! can share one task queue.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use fiber_core::{HostCallback, HostClock, HostConfig, Reconciler, Scheduler};

/// Frame length assumed until the real frame rate is known (about 30 Hz).
pub const DEFAULT_FRAME_TIME_MS: u64 = 33;

/// Shortest frame the adaptive estimate will settle on.
pub const MIN_FRAME_TIME_MS: u64 = 8;

/// Highest rate accepted by [`StdClock::force_frame_rate`].
pub const MAX_FRAME_RATE: u32 = 125;

#[derive(Debug)]
struct FrameState {
    /// Absolute end of the current frame, in clock milliseconds.
    deadline: u64,
    previous_frame_time: u64,
    active_frame_time: u64,
    fps_locked: bool,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            deadline: 0,
            previous_frame_time: DEFAULT_FRAME_TIME_MS,
            active_frame_time: DEFAULT_FRAME_TIME_MS,
            fps_locked: false,
        }
    }
}

impl FrameState {
    fn begin(&mut self, frame_start: u64) {
        let mut next_frame_time =
            (frame_start + self.active_frame_time).saturating_sub(self.deadline);
        if next_frame_time < self.active_frame_time
            && self.previous_frame_time < self.active_frame_time
            && !self.fps_locked
        {
            // Two short frames in a row: the display runs faster than assumed.
            next_frame_time = next_frame_time.max(MIN_FRAME_TIME_MS);
            self.active_frame_time = next_frame_time.max(self.previous_frame_time);
        } else {
            self.previous_frame_time = next_frame_time;
        }
        self.deadline = frame_start + self.active_frame_time;
    }
}

struct PendingCallback {
    callback: HostCallback,
    timeout: i64,
}

/// Frame-paced [`HostClock`] backed by [`Instant`].
pub struct StdClock {
    origin: Instant,
    frame: RefCell<FrameState>,
    pending: RefCell<Option<PendingCallback>>,
    frame_requested: Cell<bool>,
    frame_waker: RefCell<Option<Rc<dyn Fn()>>>,
}

impl StdClock {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            origin: Instant::now(),
            frame: RefCell::new(FrameState::default()),
            pending: RefCell::new(None),
            frame_requested: Cell::new(false),
            frame_waker: RefCell::new(None),
        })
    }

    /// Time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Current frame length in milliseconds.
    pub fn frame_time(&self) -> u64 {
        self.frame.borrow().active_frame_time
    }

    /// Absolute deadline of the current frame in clock milliseconds.
    pub fn frame_deadline(&self) -> u64 {
        self.frame.borrow().deadline
    }

    /// Pins the frame length to `1000 / fps` milliseconds, or returns to the
    /// adaptive default when `fps` is zero. Rates above
    /// [`MAX_FRAME_RATE`] are rejected.
    pub fn force_frame_rate(&self, fps: u32) {
        if fps > MAX_FRAME_RATE {
            log::error!(
                "force_frame_rate takes a value between 0 and {MAX_FRAME_RATE}, got {fps}"
            );
            return;
        }
        let mut frame = self.frame.borrow_mut();
        if fps > 0 {
            frame.active_frame_time = 1000 / u64::from(fps);
            frame.fps_locked = true;
        } else {
            frame.active_frame_time = DEFAULT_FRAME_TIME_MS;
            frame.fps_locked = false;
        }
    }

    /// Starts a frame at `frame_start` (clock milliseconds) and updates the
    /// frame length estimate.
    pub fn begin_frame(&self, frame_start: u64) {
        self.frame.borrow_mut().begin(frame_start);
    }

    /// Ends the current frame early, for hosts that spent it elsewhere.
    pub fn end_frame(&self) {
        self.frame.borrow_mut().deadline = 0;
    }

    /// Starts a frame now and runs the pending callback inside it.
    pub fn run_frame(&self) -> bool {
        self.begin_frame(self.now());
        self.run_idle_callback()
    }

    /// Runs the pending callback if the current frame still has idle time or
    /// its timeout already elapsed. Otherwise the callback stays pending and
    /// another frame is requested. Returns whether a callback ran.
    pub fn run_idle_callback(&self) -> bool {
        let Some(pending) = self.pending.borrow_mut().take() else {
            return false;
        };
        let current_time = self.now();
        let mut did_timeout = false;
        if self.frame_deadline() <= current_time {
            if pending.timeout <= current_time as i64 {
                did_timeout = true;
            } else {
                log::trace!("no idle time left in this frame; callback deferred");
                *self.pending.borrow_mut() = Some(pending);
                self.request_frame();
                return false;
            }
        }
        (pending.callback)(did_timeout);
        true
    }

    /// Runs up to `max_frames` frames, stopping once no callback is pending.
    /// Returns the number of frames that ran a callback.
    pub fn run_until_idle(&self, max_frames: usize) -> usize {
        let mut frames = 0;
        for _ in 0..max_frames {
            if !self.has_pending_callback() {
                break;
            }
            if self.run_frame() {
                frames += 1;
            }
        }
        frames
    }

    pub fn has_pending_callback(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// Returns whether a frame has been requested since the last call.
    pub fn take_frame_request(&self) -> bool {
        self.frame_requested.replace(false)
    }

    /// Registers a waker that will be invoked whenever a new frame is requested.
    pub fn set_frame_waker(&self, waker: impl Fn() + 'static) {
        *self.frame_waker.borrow_mut() = Some(Rc::new(waker));
    }

    /// Clears any registered frame waker.
    pub fn clear_frame_waker(&self) {
        self.frame_waker.borrow_mut().take();
    }

    fn request_frame(&self) {
        self.frame_requested.set(true);
        let waker = self.frame_waker.borrow().clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl HostClock for StdClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn request_host_callback(&self, callback: HostCallback, absolute_timeout_ms: i64) {
        *self.pending.borrow_mut() = Some(PendingCallback {
            callback,
            timeout: absolute_timeout_ms,
        });
        self.request_frame();
    }

    fn cancel_host_callback(&self) {
        self.pending.borrow_mut().take();
    }

    fn should_yield_now(&self) -> bool {
        self.frame_deadline() <= self.now()
    }
}

impl fmt::Debug for StdClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdClock")
            .field("frame", &*self.frame.borrow())
            .field("has_pending_callback", &self.has_pending_callback())
            .field("frame_requested", &self.frame_requested.get())
            .finish()
    }
}

/// Convenience container bundling the standard clock and a scheduler.
#[derive(Clone)]
pub struct StdRuntime {
    clock: Rc<StdClock>,
    scheduler: Scheduler,
}

impl StdRuntime {
    /// Creates a new standard runtime instance.
    pub fn new() -> Self {
        let clock = StdClock::new();
        let scheduler = Scheduler::new(clock.clone());
        Self { clock, scheduler }
    }

    /// Returns the clock implementation.
    pub fn clock(&self) -> Rc<StdClock> {
        Rc::clone(&self.clock)
    }

    /// Returns a handle to the shared scheduler.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// Creates a reconciler for `host` that schedules on this runtime.
    pub fn reconciler<H: HostConfig + 'static>(&self, host: H) -> Reconciler<H> {
        Reconciler::with_scheduler(host, self.scheduler.clone())
    }

    /// Returns whether a frame was requested since the last poll.
    pub fn take_frame_request(&self) -> bool {
        self.clock.take_frame_request()
    }

    /// Registers a waker to be called when the runtime requests a new frame.
    pub fn set_frame_waker(&self, waker: impl Fn() + 'static) {
        self.clock.set_frame_waker(waker);
    }

    /// Clears any previously registered frame waker.
    pub fn clear_frame_waker(&self) {
        self.clock.clear_frame_waker();
    }

    /// Runs one frame of scheduled work.
    pub fn run_frame(&self) -> bool {
        self.clock.run_frame()
    }

    pub fn run_until_idle(&self, max_frames: usize) -> usize {
        self.clock.run_until_idle(max_frames)
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("clock", &self.clock)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/std_runtime_tests.rs"]
mod tests;
