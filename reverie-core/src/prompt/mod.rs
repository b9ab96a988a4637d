//! `Prompt` — one pending decision raced by every attached input method.
//!
//! ## Protocol
//!
//! ```text
//! Prompt::new(choices, input_methods)
//!     └─► show()            → every InputMethod::show(handle), registration order
//!         └─► wait(timeout) → blocks on the condvar, lock released while asleep
//!             └─► dismiss() → every InputMethod::dismiss(), idempotent
//! ```
//!
//! Producers hold a [`PromptHandle`] and call `resolve` from their own
//! threads. The result slot lives under a `parking_lot::Mutex`; the first
//! resolve to take that lock settles the prompt and every later attempt is
//! dropped. A timeout, an [`Interrupter`] or `dismiss()` settles a pending
//! prompt as [`Cancelled`], after which late resolves are dropped as well.
//!
//! ## Locking
//!
//! Two locks, always taken in this order: the input-method registry, then
//! the result slot. The consumer may hold the slot lock through the whole
//! `lock()` → `show()` → `wait()` sequence: `PromptGuard::show` and
//! `PromptGuard::dismiss` release it while producers run and take it back
//! before returning, the same way `wait` does while asleep. A producer that
//! resolves inline from inside its own `show` therefore never blocks on the
//! consumer's guard.

pub mod choice;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, ReverieError},
    events::{CancelReason, InputDiagnostic, InputKind},
    input::InputMethods,
};

use choice::{Choice, Choices};

static NEXT_PROMPT_ID: AtomicU64 = AtomicU64::new(1);

/// The winning outcome of a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub index: usize,
    pub choice: Choice,
    pub source: InputKind,
}

/// A prompt finished without a winner. This is a normal outcome, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Cancelled {
    #[error("timed out waiting for a choice")]
    TimedOut,
    #[error("wait was interrupted")]
    Interrupted,
    #[error("prompt was dismissed before a choice was made")]
    Dismissed,
}

impl Cancelled {
    pub fn reason(self) -> CancelReason {
        match self {
            Cancelled::TimedOut => CancelReason::TimedOut,
            Cancelled::Interrupted => CancelReason::Interrupted,
            Cancelled::Dismissed => CancelReason::Dismissed,
        }
    }
}

#[derive(Debug)]
enum Slot {
    Pending,
    Resolved(Resolution),
    Cancelled(Cancelled),
}

#[derive(Debug)]
struct PromptState {
    slot: Slot,
    dismissed: bool,
}

struct Shared {
    id: u64,
    choices: Choices,
    state: Mutex<PromptState>,
    settled: Condvar,
    diagnostics: Option<broadcast::Sender<InputDiagnostic>>,
}

impl Shared {
    /// Settle a pending slot. Caller holds the state lock.
    fn settle(&self, state: &mut PromptState, slot: Slot) -> bool {
        if !matches!(state.slot, Slot::Pending) {
            return false;
        }

        let diagnostic = match &slot {
            Slot::Resolved(r) => InputDiagnostic::Resolved {
                prompt_id: self.id,
                index: r.index,
                source: r.source,
            },
            Slot::Cancelled(c) => InputDiagnostic::Cancelled {
                prompt_id: self.id,
                reason: c.reason(),
            },
            Slot::Pending => return false,
        };

        state.slot = slot;
        self.settled.notify_all();
        self.report(diagnostic);
        true
    }

    fn report(&self, diagnostic: InputDiagnostic) {
        if let Some(tx) = &self.diagnostics {
            // No subscribers is fine.
            let _ = tx.send(diagnostic);
        }
    }
}

/// Producer-side handle: cheap to clone, safe to move to any thread.
#[derive(Clone)]
pub struct PromptHandle {
    shared: Arc<Shared>,
}

impl PromptHandle {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn choices(&self) -> &Choices {
        &self.shared.choices
    }

    /// Offer `index` as the answer. Returns `true` only for the winning call.
    ///
    /// Calls after the prompt settled (resolved, cancelled or dismissed) are
    /// dropped and return `false`.
    pub fn resolve(&self, index: usize, source: InputKind) -> bool {
        let Some(choice) = self.shared.choices.get(index) else {
            warn!(
                prompt_id = self.shared.id,
                index,
                %source,
                "ignoring resolve with out-of-range index"
            );
            return false;
        };

        let resolution = Resolution {
            index,
            choice: choice.clone(),
            source,
        };

        let mut state = self.shared.state.lock();
        if self.shared.settle(&mut state, Slot::Resolved(resolution)) {
            drop(state);
            info!(prompt_id = self.shared.id, index, %source, "prompt resolved");
            true
        } else {
            drop(state);
            debug!(
                prompt_id = self.shared.id,
                index,
                %source,
                "dropping resolve on settled prompt"
            );
            false
        }
    }

    /// Offer a choice by value. Unknown choices are ignored.
    pub fn resolve_choice(&self, choice: &Choice, source: InputKind) -> bool {
        match self.shared.choices.position(choice) {
            Some(index) => self.resolve(index, source),
            None => {
                warn!(
                    prompt_id = self.shared.id,
                    text = choice.text(),
                    "ignoring resolve with unknown choice"
                );
                false
            }
        }
    }

    /// Whether the prompt already has a final outcome.
    pub fn is_settled(&self) -> bool {
        !matches!(self.shared.state.lock().slot, Slot::Pending)
    }

    /// Forward a producer diagnostic to the host's subscribers.
    pub fn report(&self, diagnostic: InputDiagnostic) {
        self.shared.report(diagnostic);
    }
}

impl std::fmt::Debug for PromptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptHandle")
            .field("id", &self.shared.id)
            .finish_non_exhaustive()
    }
}

/// Cancels a pending wait from another thread.
#[derive(Clone)]
pub struct Interrupter {
    shared: Arc<Shared>,
}

impl Interrupter {
    /// Settle a pending prompt as `Cancelled::Interrupted` and wake the waiter.
    /// Returns `false` if the prompt had already settled.
    pub fn interrupt(&self) -> bool {
        let mut state = self.shared.state.lock();
        let interrupted = self
            .shared
            .settle(&mut state, Slot::Cancelled(Cancelled::Interrupted));
        if interrupted {
            info!(prompt_id = self.shared.id, "prompt wait interrupted");
        }
        interrupted
    }
}

/// Scoped hold on the prompt's result slot. Dropping it releases the lock.
pub struct PromptGuard<'a> {
    shared: &'a Arc<Shared>,
    methods: &'a Mutex<InputMethods>,
    state: MutexGuard<'a, PromptState>,
}

impl PromptGuard<'_> {
    /// Present the prompt to every input method, in registration order.
    ///
    /// The slot lock is released while producers run and held again on
    /// return. A producer that fails to show is logged and skipped; the rest
    /// stay live.
    ///
    /// # Errors
    /// `ReverieError::PromptDismissed` if `dismiss()` already ran.
    pub fn show(&mut self) -> Result<()> {
        if self.state.dismissed {
            return Err(ReverieError::PromptDismissed);
        }
        let (shared, methods) = (self.shared, self.methods);
        MutexGuard::unlocked(&mut self.state, || show_methods(shared, methods))
    }

    /// Tear down every input method; see [`Prompt::dismiss`]. The slot lock
    /// is released while producers stop and held again on return.
    pub fn dismiss(&mut self) {
        if self.state.dismissed {
            return;
        }
        let (shared, methods) = (self.shared, self.methods);
        MutexGuard::unlocked(&mut self.state, || dismiss_methods(shared, methods));
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self.state.slot, Slot::Pending)
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        match &self.state.slot {
            Slot::Resolved(r) => Some(r),
            _ => None,
        }
    }

    /// Block until the prompt settles or `timeout` elapses.
    ///
    /// The lock is released while asleep and held again on return. A prompt
    /// that settled before the call (including a resolve made inside `show`)
    /// returns immediately. Once settled, every call returns the same outcome.
    pub fn wait(&mut self, timeout: Option<Duration>) -> std::result::Result<Resolution, Cancelled> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            match &self.state.slot {
                Slot::Resolved(r) => return Ok(r.clone()),
                Slot::Cancelled(c) => return Err(*c),
                Slot::Pending => {}
            }

            match deadline {
                Some(deadline) => {
                    let result = self.shared.settled.wait_until(&mut self.state, deadline);
                    if result.timed_out()
                        && self
                            .shared
                            .settle(&mut self.state, Slot::Cancelled(Cancelled::TimedOut))
                    {
                        info!(prompt_id = self.shared.id, "prompt timed out");
                    }
                }
                None => self.shared.settled.wait(&mut self.state),
            }
        }
    }
}

/// One decision point and the producers racing to settle it.
pub struct Prompt {
    shared: Arc<Shared>,
    input_methods: Mutex<InputMethods>,
}

impl Prompt {
    pub fn new(choices: Choices, input_methods: InputMethods) -> Self {
        Self::build(choices, input_methods, None)
    }

    /// Like `new`, but resolutions, cancellations and producer diagnostics
    /// are also sent to `diagnostics`.
    pub fn with_diagnostics(
        choices: Choices,
        input_methods: InputMethods,
        diagnostics: broadcast::Sender<InputDiagnostic>,
    ) -> Self {
        Self::build(choices, input_methods, Some(diagnostics))
    }

    fn build(
        choices: Choices,
        input_methods: InputMethods,
        diagnostics: Option<broadcast::Sender<InputDiagnostic>>,
    ) -> Self {
        let shared = Shared {
            id: NEXT_PROMPT_ID.fetch_add(1, Ordering::Relaxed),
            choices,
            state: Mutex::new(PromptState {
                slot: Slot::Pending,
                dismissed: false,
            }),
            settled: Condvar::new(),
            diagnostics,
        };

        Self {
            shared: Arc::new(shared),
            input_methods: Mutex::new(input_methods),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn choices(&self) -> &Choices {
        &self.shared.choices
    }

    pub fn handle(&self) -> PromptHandle {
        PromptHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Take the result-slot lock. The guard can be held across `show()`,
    /// `wait()` and `dismiss()`.
    pub fn lock(&self) -> PromptGuard<'_> {
        PromptGuard {
            shared: &self.shared,
            methods: &self.input_methods,
            state: self.shared.state.lock(),
        }
    }

    /// `lock().show()`.
    ///
    /// # Errors
    /// `ReverieError::PromptDismissed` if `dismiss()` already ran.
    pub fn show(&self) -> Result<()> {
        show_methods(&self.shared, &self.input_methods)
    }

    /// `lock().wait(timeout)`.
    pub fn wait(&self, timeout: Option<Duration>) -> std::result::Result<Resolution, Cancelled> {
        self.lock().wait(timeout)
    }

    /// Tear down every input method. Safe to call any number of times, with
    /// or without a prior `show()`. A still-pending prompt settles as
    /// `Cancelled::Dismissed`.
    pub fn dismiss(&self) {
        dismiss_methods(&self.shared, &self.input_methods);
    }

    /// show → wait → dismiss, with dismiss on every exit path.
    pub fn decide(&self, timeout: Option<Duration>) -> std::result::Result<Resolution, Cancelled> {
        let outcome = match self.show() {
            Ok(()) => self.wait(timeout),
            Err(e) => {
                warn!(prompt_id = self.shared.id, "cannot show prompt: {e}");
                Err(Cancelled::Dismissed)
            }
        };
        self.dismiss();
        outcome
    }
}

/// Runs without the slot lock held; takes it only briefly after the registry.
fn show_methods(shared: &Arc<Shared>, methods: &Mutex<InputMethods>) -> Result<()> {
    let mut methods = methods.lock();
    if shared.state.lock().dismissed {
        return Err(ReverieError::PromptDismissed);
    }

    info!(
        prompt_id = shared.id,
        choices = shared.choices.len(),
        methods = methods.len(),
        "showing prompt"
    );

    let handle = PromptHandle {
        shared: Arc::clone(shared),
    };
    methods.for_each(|method| {
        if let Err(e) = method.show(handle.clone()) {
            warn!(
                prompt_id = shared.id,
                source = %method.kind(),
                "input method failed to show prompt: {e}"
            );
        }
    });
    Ok(())
}

fn dismiss_methods(shared: &Shared, methods: &Mutex<InputMethods>) {
    let mut methods = methods.lock();
    {
        let mut state = shared.state.lock();
        if state.dismissed {
            return;
        }
        state.dismissed = true;
        shared.settle(&mut state, Slot::Cancelled(Cancelled::Dismissed));
    }

    methods.for_each(|method| method.dismiss());
    debug!(prompt_id = shared.id, "prompt dismissed");
}

impl Drop for Prompt {
    fn drop(&mut self) {
        self.dismiss();
    }
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field("id", &self.shared.id)
            .field("choices", &self.shared.choices)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use super::*;
    use crate::input::InputMethod;

    /// Resolves inline from inside `show`, before the consumer reaches `wait`.
    struct EagerMethod {
        index: usize,
        dismissed: Arc<AtomicUsize>,
    }

    impl InputMethod for EagerMethod {
        fn kind(&self) -> InputKind {
            InputKind::Click
        }

        fn show(&mut self, prompt: PromptHandle) -> Result<()> {
            prompt.resolve(self.index, InputKind::Click);
            Ok(())
        }

        fn dismiss(&mut self) {
            self.dismissed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingMethod;

    impl InputMethod for FailingMethod {
        fn kind(&self) -> InputKind {
            InputKind::Speech
        }

        fn show(&mut self, _prompt: PromptHandle) -> Result<()> {
            Err(ReverieError::Recognizer("engine offline".into()))
        }

        fn dismiss(&mut self) {}
    }

    fn two_choices() -> Choices {
        Choices::decide(["Left", "Right"], "en-US").expect("valid choices")
    }

    #[test]
    fn resolve_inside_show_is_not_lost() {
        let dismissed = Arc::new(AtomicUsize::new(0));
        let methods = InputMethods::new(vec![Box::new(EagerMethod {
            index: 1,
            dismissed: Arc::clone(&dismissed),
        })]);
        let prompt = Prompt::new(two_choices(), methods);

        let resolution = prompt
            .decide(Some(Duration::from_secs(1)))
            .expect("inline resolve should win");
        assert_eq!(resolution.index, 1);
        assert_eq!(resolution.choice.text(), "Right");
        assert_eq!(dismissed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn consumer_can_hold_lock_through_show_wait_and_dismiss() {
        let dismissed = Arc::new(AtomicUsize::new(0));
        let methods = InputMethods::new(vec![Box::new(EagerMethod {
            index: 1,
            dismissed: Arc::clone(&dismissed),
        })]);
        let prompt = Arc::new(Prompt::new(two_choices(), methods));
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        let consumer = {
            let prompt = Arc::clone(&prompt);
            thread::spawn(move || {
                let mut guard = prompt.lock();
                let shown = guard.show();
                let outcome = guard.wait(Some(Duration::from_secs(1)));
                guard.dismiss();
                guard.dismiss();
                let _ = done_tx.send((shown.is_ok(), outcome));
            })
        };

        let (shown, outcome) = done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("consumer holding the lock should not block itself");
        consumer.join().expect("consumer panicked");
        assert!(shown);
        let resolution = outcome.expect("inline resolve should win");
        assert_eq!(resolution.index, 1);
        assert_eq!(resolution.choice.text(), "Right");

        assert_eq!(dismissed.load(Ordering::SeqCst), 1);
        assert!(matches!(
            prompt.lock().show(),
            Err(ReverieError::PromptDismissed)
        ));
    }

    #[test]
    fn failing_producer_does_not_block_others() {
        let methods = InputMethods::new(vec![
            Box::new(FailingMethod),
            Box::new(EagerMethod {
                index: 0,
                dismissed: Arc::new(AtomicUsize::new(0)),
            }),
        ]);
        let prompt = Prompt::new(two_choices(), methods);
        let resolution = prompt
            .decide(Some(Duration::from_secs(1)))
            .expect("second producer should resolve");
        assert_eq!(resolution.index, 0);
    }

    #[test]
    fn first_resolve_wins_and_later_ones_are_dropped() {
        let prompt = Prompt::new(two_choices(), InputMethods::default());
        let handle = prompt.handle();

        assert!(handle.resolve(0, InputKind::Gesture));
        assert!(!handle.resolve(1, InputKind::Speech));
        assert!(!handle.resolve_choice(&Choice::new("Right"), InputKind::Click));

        let first = prompt.wait(None).expect("resolved");
        let second = prompt.wait(None).expect("still resolved");
        assert_eq!(first, second);
        assert_eq!(first.source, InputKind::Gesture);
    }

    #[test]
    fn out_of_range_and_unknown_choices_are_ignored() {
        let prompt = Prompt::new(two_choices(), InputMethods::default());
        let handle = prompt.handle();
        assert!(!handle.resolve(7, InputKind::Click));
        assert!(!handle.resolve_choice(&Choice::new("Up"), InputKind::Click));
        assert!(!handle.is_settled());
    }

    #[test]
    fn timeout_cancels_and_rejects_late_resolve() {
        let prompt = Prompt::new(two_choices(), InputMethods::default());
        let outcome = prompt.wait(Some(Duration::from_millis(20)));
        assert_eq!(outcome, Err(Cancelled::TimedOut));
        assert!(!prompt.handle().resolve(0, InputKind::Click));
        assert_eq!(prompt.wait(None), Err(Cancelled::TimedOut));
    }

    #[test]
    fn interrupt_unblocks_waiter_and_releases_lock() {
        let prompt = Arc::new(Prompt::new(two_choices(), InputMethods::default()));
        let interrupter = prompt.interrupter();

        let waiter = {
            let prompt = Arc::clone(&prompt);
            thread::spawn(move || prompt.wait(None))
        };

        thread::sleep(Duration::from_millis(30));
        assert!(interrupter.interrupt());

        let outcome = waiter.join().expect("waiter panicked");
        assert_eq!(outcome, Err(Cancelled::Interrupted));

        // Lock must be free again.
        let guard = prompt.lock();
        assert!(guard.is_settled());
        assert!(guard.resolution().is_none());
        drop(guard);
        assert!(!interrupter.interrupt());
    }

    #[test]
    fn dismiss_is_idempotent_and_blocks_show() {
        let dismissed = Arc::new(AtomicUsize::new(0));
        let methods = InputMethods::new(vec![Box::new(EagerMethod {
            index: 0,
            dismissed: Arc::clone(&dismissed),
        })]);
        let prompt = Prompt::new(two_choices(), methods);

        prompt.dismiss();
        prompt.dismiss();
        assert_eq!(dismissed.load(Ordering::SeqCst), 1);
        assert!(matches!(prompt.show(), Err(ReverieError::PromptDismissed)));
        assert_eq!(prompt.wait(None), Err(Cancelled::Dismissed));

        drop(prompt);
        assert_eq!(dismissed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn diagnostics_report_resolution() {
        let (tx, mut rx) = broadcast::channel(8);
        let prompt = Prompt::with_diagnostics(two_choices(), InputMethods::default(), tx);
        prompt.handle().resolve(1, InputKind::Speech);

        let event = rx.try_recv().expect("resolution diagnostic");
        assert_eq!(
            event,
            InputDiagnostic::Resolved {
                prompt_id: prompt.id(),
                index: 1,
                source: InputKind::Speech,
            }
        );
    }
}
