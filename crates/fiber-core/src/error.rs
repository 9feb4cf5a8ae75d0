use crate::hooks::RE_RENDER_LIMIT;
use crate::work_loop::NESTED_UPDATE_LIMIT;

/// Fatal reconciler failures.
///
/// Every variant aborts the render pass it happened in; nothing is retried
/// automatically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FiberError {
    /// A hook was called while no component was rendering.
    InvalidHookCall { hook: &'static str },
    /// A component kept scheduling updates on itself while rendering.
    TooManyReRenders { component: String },
    /// Commits kept scheduling synchronous updates on the same root.
    NestedUpdateLimit,
    /// The root handle does not belong to this reconciler.
    UnknownRoot,
}

impl std::fmt::Display for FiberError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FiberError::InvalidHookCall { hook } => write!(
                f,
                "invalid hook call: {hook} can only be called while a function component renders"
            ),
            FiberError::TooManyReRenders { component } => write!(
                f,
                "too many re-renders in {component}: render-phase updates were replayed {RE_RENDER_LIMIT} times"
            ),
            FiberError::NestedUpdateLimit => write!(
                f,
                "maximum update depth exceeded: more than {NESTED_UPDATE_LIMIT} nested synchronous updates"
            ),
            FiberError::UnknownRoot => write!(f, "root is not owned by this reconciler"),
        }
    }
}

impl std::error::Error for FiberError {}
