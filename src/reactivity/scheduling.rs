// ============================================================================
// spark-state - Handler Scheduling
// Drains pending handler sets with reentrancy and loop protection
// ============================================================================
//
// There is no batching: every write drains its pending set before it
// returns. A callback that writes state marks a new set one level deeper,
// which is drained completely before the outer round continues
// (depth-first propagation).
//
// Loop protection: before a handler runs, its callback identity is looked
// up on the live call stack. If it is already executing, the whole round is
// discarded and `StateError::InfiniteLoop` is latched in the context; every
// enclosing round sees the latch after its current handler returns, aborts
// as well, and the outermost write returns the error.
// ============================================================================

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::core::config::config;
use crate::core::context::with_context;
use crate::core::error::{StateError, StateResult};
use crate::core::types::AnyHandler;

// =============================================================================
// CALL HANDLERS
// =============================================================================

/// Drain the pending set of the current depth.
///
/// Returns the latched abort error if this round (or a nested one) was
/// aborted. Only the outermost round clears the latch.
pub fn call_handlers() -> StateResult<()> {
    let (round, depth) = with_context(|ctx| ctx.enter_round());

    let outcome = {
        let _round = RoundGuard;
        drain(round, depth)
    };

    outcome.map_err(|error| {
        with_context(|ctx| {
            if ctx.dispatch_depth() == 0 {
                ctx.take_abort()
            } else {
                ctx.abort_error()
            }
        })
        .unwrap_or(error)
    })
}

fn drain(round: Vec<Rc<dyn AnyHandler>>, depth: usize) -> StateResult<()> {
    // A callback that keeps writing after its round was aborted
    if let Some(error) = with_context(|ctx| ctx.abort_error()) {
        return Err(error);
    }

    if round.is_empty() {
        return Ok(());
    }

    let cfg = config();
    if depth > cfg.max_dispatch_depth {
        log::debug!("dispatch depth {depth} exceeds {}", cfg.max_dispatch_depth);
        return Err(latch(StateError::DispatchDepthExceeded(cfg.max_dispatch_depth)));
    }

    log::trace!("dispatching {} handler(s) at depth {depth}", round.len());

    for handler in round {
        if with_context(|ctx| ctx.is_running(handler.original())) {
            log::debug!("callback re-entered at depth {depth}, discarding round");
            return Err(latch(StateError::InfiniteLoop));
        }

        run_handler(&handler, cfg.catch_callback_panics);

        if let Some(error) = with_context(|ctx| ctx.abort_error()) {
            return Err(error);
        }
    }

    Ok(())
}

fn latch(error: StateError) -> StateError {
    debug_assert!(error.aborts_round());
    with_context(|ctx| ctx.set_abort(error.clone()));
    error
}

// =============================================================================
// RUN HANDLER
// =============================================================================

fn run_handler(handler: &Rc<dyn AnyHandler>, catch_panics: bool) {
    with_context(|ctx| ctx.push_call(handler.clone()));
    let _call = CallGuard;

    if !catch_panics {
        handler.fire();
        return;
    }

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.fire())) {
        log::error!("subscriber callback panicked: {}", panic_message(&*payload));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

// =============================================================================
// GUARDS
// =============================================================================

/// Pops the call stack even if the callback unwinds.
struct CallGuard;

impl Drop for CallGuard {
    fn drop(&mut self) {
        with_context(|ctx| {
            ctx.pop_call();
        });
    }
}

/// Returns to the enclosing pending level even if a callback unwinds.
struct RoundGuard;

impl Drop for RoundGuard {
    fn drop(&mut self) {
        with_context(|ctx| {
            ctx.exit_round();
            if std::thread::panicking() && ctx.dispatch_depth() == 0 {
                ctx.take_abort();
            }
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================
