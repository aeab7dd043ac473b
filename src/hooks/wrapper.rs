//! Runs a hook under timeout, retry and cancellation discipline.

use super::bus::HookBus;
use super::hook::{Hook, HookArgs, HookError, HookResult, Phase, Verdict};
use futures::future::BoxFuture;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Invoke `hook` until it continues, vetoes, fails or is cancelled.
///
/// Each invocation is bounded by the hook's own timeout. A retry verdict
/// bumps the attempt counter and sleeps before the next invocation; the
/// sleep is interrupted by cancellation like the invocation itself.
pub(crate) async fn run_hook(
    hook: &Hook,
    mut args: HookArgs,
    cancel: &CancellationToken,
) -> Result<(), HookError> {
    loop {
        if cancel.is_cancelled() {
            return Err(HookError::Cancelled);
        }

        let call = hook.invoke(args.clone());
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HookError::Cancelled),
            result = bounded(hook.timeout(), call) => result,
        };

        match outcome? {
            Verdict::Continue => return Ok(()),
            Verdict::Veto => return Err(HookError::Vetoed),
            Verdict::Retry(delay) => {
                args.attempt += 1;
                debug!(
                    from = %args.from,
                    to = %args.to,
                    attempt = args.attempt,
                    ?delay,
                    "hook asked to retry"
                );
                let interrupted = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if interrupted {
                    return Err(HookError::Cancelled);
                }
            }
        }
    }
}

async fn bounded(timeout: Duration, call: BoxFuture<'static, HookResult>) -> HookResult {
    if timeout.is_zero() {
        return call.await;
    }
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(HookError::Timeout(timeout)),
    }
}

/// Run every hook subscribed to `phase` of `state`, in subscription order,
/// stopping at the first failure.
pub(crate) async fn run_phase(
    bus: &HookBus,
    state: &str,
    phase: Phase,
    args: HookArgs,
    cancel: &CancellationToken,
) -> Result<(), HookError> {
    for hook in bus.hooks_for(state, phase) {
        run_hook(&hook, args.clone(), cancel).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StateBuilder, StateMachine};
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn args() -> HookArgs {
        let machine = StateMachine::builder()
            .autostart(false)
            .state(StateBuilder::new("Idle", 0))
            .build()
            .unwrap();
        HookArgs::new(machine, "NULL", "Idle", Value::Null)
    }

    #[tokio::test]
    async fn continue_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let hook = Hook::from_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Verdict::Continue)
        });

        run_hook(&hook, args(), &CancellationToken::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_invokes_again_with_incremented_attempt() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = seen.clone();
        let hook = Hook::from_fn(move |args| {
            log.lock().push(args.attempt());
            if args.attempt() < 3 {
                args.retry(Duration::from_millis(100))
            } else {
                Ok(Verdict::Continue)
            }
        });

        run_hook(&hook, args(), &CancellationToken::new()).await.unwrap();
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn veto_is_reported() {
        let hook = Hook::from_fn(|_| Ok(Verdict::Veto));
        let result = run_hook(&hook, args(), &CancellationToken::new()).await;
        assert_eq!(result, Err(HookError::Vetoed));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_hook_times_out() {
        let hook = Hook::new(|_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Verdict::Continue)
        })
        .with_timeout(Duration::from_secs(1));

        let result = run_hook(&hook, args(), &CancellationToken::new()).await;
        assert_eq!(result, Err(HookError::Timeout(Duration::from_secs(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_waits_indefinitely() {
        let hook = Hook::new(|_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Verdict::Continue)
        })
        .with_timeout(Duration::ZERO);

        assert!(run_hook(&hook, args(), &CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let hook = Hook::from_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Verdict::Continue)
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(run_hook(&hook, args(), &cancel).await, Err(HookError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_pending_hook() {
        let hook = Hook::new(|_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Verdict::Continue)
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        assert_eq!(run_hook(&hook, args(), &cancel).await, Err(HookError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_retry_delay() {
        let hook = Hook::from_fn(|args| args.retry(Duration::from_secs(30)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        assert_eq!(run_hook(&hook, args(), &cancel).await, Err(HookError::Cancelled));
    }

    #[tokio::test]
    async fn phase_stops_at_first_failure() {
        let bus = HookBus::default();
        let calls = Arc::new(AtomicU32::new(0));
        let first = calls.clone();
        let third = calls.clone();
        bus.subscribe(
            Some("Idle"),
            Phase::Enter,
            Hook::from_fn(move |_| {
                first.fetch_add(1, Ordering::SeqCst);
                Ok(Verdict::Continue)
            }),
        );
        bus.subscribe(
            Some("Idle"),
            Phase::Enter,
            Hook::from_fn(|_| Err(HookError::failed("nope"))),
        );
        bus.subscribe(
            Some("Idle"),
            Phase::Enter,
            Hook::from_fn(move |_| {
                third.fetch_add(1, Ordering::SeqCst);
                Ok(Verdict::Continue)
            }),
        );

        let result = run_phase(&bus, "Idle", Phase::Enter, args(), &CancellationToken::new()).await;
        assert_eq!(result, Err(HookError::failed("nope")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
