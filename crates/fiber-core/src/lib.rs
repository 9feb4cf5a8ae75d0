#![doc = r"Incremental fiber reconciler with a cooperative expiration-time scheduler."]

pub extern crate self as fiber_core;

mod begin_work;
pub mod child_fiber;
mod collections;
mod commit_work;
mod complete_work;
pub mod element;
mod error;
pub mod expiration_time;
pub mod fiber;
mod fiber_root;
pub mod hooks;
pub mod host;
pub mod memory_host;
pub mod platform;
mod reconciler;
mod render_context;
pub mod scheduler;
pub mod update_queue;
mod work_loop;

pub use child_fiber::{ChildReconciler, MOUNT_CHILD_FIBERS, RECONCILE_CHILD_FIBERS};
pub use element::{Child, Component, Element, ElementType, Key, Props};
pub use error::FiberError;
pub use expiration_time::{ExpirationTime, NEVER, NO_WORK, SYNC};
pub use fiber::{EffectTag, Fiber, FiberArena, FiberId, FiberProps, StateNode, WorkTag};
pub use fiber_root::{FiberRoot, RootId, RootState};
pub use hooks::{
    current_fiber, try_use_reducer, try_use_state, use_callback, use_effect, use_layout_effect,
    use_memo, use_reducer, use_state, Dep, Deps, Destroy, Dispatch, HookEffectTag, HookKind,
    SetState, StateAction, RE_RENDER_LIMIT,
};
pub use host::{HostConfig, NodeId};
pub use memory_host::{HostOp, MemoryHost, MemoryNode};
pub use platform::{HostCallback, HostClock, ManualClock};
pub use reconciler::Reconciler;
pub use scheduler::{CallbackId, PriorityLevel, Scheduler, Task, TaskResult};
pub use update_queue::{
    MergeState, ProcessedState, Update, UpdatePayload, UpdateQueue, UpdateTag,
};
pub use work_loop::NESTED_UPDATE_LIMIT;
