//! Lifecycle hooks and their arguments.

use crate::effects::{Context, StateMachine};
use crate::error::MachineError;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The lifecycle point a hook is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Before a state is entered; may veto.
    Enter,
    /// Before a state is left; may veto.
    Leave,
    /// After a state was entered; failures are logged and ignored.
    Done,
    /// After entering another state failed, on the state that stays current.
    Resume,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Enter => "enter",
            Phase::Leave => "leave",
            Phase::Done => "done",
            Phase::Resume => "resume",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a hook decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// Refuse the transition.
    Veto,
    /// Run the hook again after the delay.
    Retry(Duration),
}

/// Errors a hook can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),

    /// The hook left the world in a state the engine cannot recover from.
    #[error("unrecoverable side effect: {0}")]
    SideEffect(String),

    #[error("vetoed")]
    Vetoed,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

impl HookError {
    pub fn failed(message: impl Into<String>) -> Self {
        HookError::Failed(message.into())
    }

    pub fn side_effect(message: impl Into<String>) -> Self {
        HookError::SideEffect(message.into())
    }
}

pub type HookResult = Result<Verdict, HookError>;

type HookFn = Arc<dyn Fn(HookArgs) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// An async callback bound to a state's lifecycle.
///
/// # Example
///
/// ```rust
/// use statehook::{Hook, Verdict};
/// use std::time::Duration;
///
/// let hook = Hook::new(|args| async move {
///     if args.attempt() < 2 {
///         return args.retry(Duration::from_millis(10));
///     }
///     Ok(Verdict::Continue)
/// })
/// .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(hook.timeout(), Duration::from_secs(5));
/// ```
///
/// A hook built with [`Hook::new`] or [`Hook::from_fn`] has no time limit.
#[derive(Clone)]
pub struct Hook {
    callback: HookFn,
    timeout: Duration,
}

impl Hook {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        Self {
            callback: Arc::new(move |args: HookArgs| f(args).boxed()),
            timeout: Duration::ZERO,
        }
    }

    /// Wrap a synchronous callback.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&HookArgs) -> HookResult + Send + Sync + 'static,
    {
        Self::new(move |args| futures::future::ready(f(&args)))
    }

    /// Set the per-invocation timeout. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn invoke(&self, args: HookArgs) -> BoxFuture<'static, HookResult> {
        (self.callback)(args)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("timeout", &self.timeout).finish()
    }
}

/// Arguments handed to every hook invocation.
#[derive(Clone)]
pub struct HookArgs {
    pub(crate) machine: StateMachine,
    pub(crate) from: String,
    pub(crate) to: String,
    pub(crate) params: Value,
    pub(crate) error: Option<MachineError>,
    pub(crate) attempt: u32,
}

impl HookArgs {
    pub(crate) fn new(
        machine: StateMachine,
        from: impl Into<String>,
        to: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            machine,
            from: from.into(),
            to: to.into(),
            params,
            error: None,
            attempt: 0,
        }
    }

    pub(crate) fn with_error(mut self, error: MachineError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    /// The failure being recovered from, for `resume` hooks and ERROR's
    /// `done` hooks.
    pub fn error(&self) -> Option<&MachineError> {
        self.error.as_ref()
    }

    /// Zero on the first invocation, incremented on every retry.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The machine running this hook.
    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// The machine's execution context, if it has one of type `T`.
    pub fn context<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.machine.context::<T>()
    }

    pub fn raw_context(&self) -> Option<Context> {
        self.machine.raw_context()
    }

    /// Ask to be invoked again after `delay`.
    pub fn retry(&self, delay: Duration) -> HookResult {
        Ok(Verdict::Retry(delay))
    }
}

impl fmt::Debug for HookArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookArgs")
            .field("machine", &self.machine.name())
            .field("from", &self.from)
            .field("to", &self.to)
            .field("params", &self.params)
            .field("error", &self.error)
            .field("attempt", &self.attempt)
            .finish()
    }
}
