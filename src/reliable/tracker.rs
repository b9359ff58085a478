//! # Readiness Tracker
//!
//! Ready/unready state of one upstream dependency, with subscribers.
//!
//! - A new subscriber of a ready source is replayed the current ready args
//! - Subscriber failures (errors or panics) are logged and contained
//! - A closed source rejects new subscribers

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::errors::{HorizonError, HorizonResult};
use crate::observability::{log_event_with_fields, Event};

type ReadyFn<T> = Box<dyn Fn(&T) -> HorizonResult<()> + Send + Sync>;
type UnreadyFn = Box<dyn Fn(Option<&HorizonError>) -> HorizonResult<()> + Send + Sync>;

/// A readiness message, as passed to `Reliable::emit`
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness<T> {
    /// The source is ready; carries the ready args
    Ready(T),
    /// The source is not ready; carries the cause if known
    Unready(Option<HorizonError>),
}

/// Subscriber callbacks; both are optional
pub struct Callbacks<T> {
    on_ready: Option<ReadyFn<T>>,
    on_unready: Option<UnreadyFn>,
}

impl<T> Callbacks<T> {
    /// Callbacks that do nothing
    pub fn new() -> Self {
        Self {
            on_ready: None,
            on_unready: None,
        }
    }

    /// Set the ready callback
    pub fn on_ready(
        mut self,
        f: impl Fn(&T) -> HorizonResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_ready = Some(Box::new(f));
        self
    }

    /// Set the unready callback
    pub fn on_unready(
        mut self,
        f: impl Fn(Option<&HorizonError>) -> HorizonResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.on_unready = Some(Box::new(f));
        self
    }
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything a gate can be asked about
pub trait ReadinessGate: Send + Sync {
    /// Whether requests may proceed
    fn is_ready(&self) -> bool;

    /// Source name, for error messages
    fn name(&self) -> &str;
}

/// Removes a subscription from its source
pub(crate) trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: u64);
}

/// Handle returned by `subscribe`
pub struct ReliableSubscription {
    id: u64,
    source: Weak<dyn Unsubscribe>,
}

impl ReliableSubscription {
    /// Stop receiving callbacks. Closing twice is a no-op.
    pub fn close(&self) {
        if let Some(source) = self.source.upgrade() {
            source.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for ReliableSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliableSubscription")
            .field("id", &self.id)
            .finish()
    }
}

struct State<T> {
    /// Last ready args; `None` while unready
    ready: Option<T>,
    closed: bool,
    next_id: u64,
    subscribers: BTreeMap<u64, Arc<Callbacks<T>>>,
}

/// Readiness of one upstream dependency
pub struct Reliable<T> {
    name: String,
    state: Mutex<State<T>>,
}

impl<T> Reliable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an unready source
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(State {
                ready: None,
                closed: false,
                next_id: 0,
                subscribers: BTreeMap::new(),
            }),
        })
    }

    /// Create a source that starts ready with `args`
    pub fn ready_with(name: impl Into<String>, args: T) -> Arc<Self> {
        let reliable = Self::new(name);
        if let Ok(mut state) = reliable.state.lock() {
            state.ready = Some(args);
        }
        reliable
    }

    fn lock(&self) -> HorizonResult<MutexGuard<'_, State<T>>> {
        self.state
            .lock()
            .map_err(|_| HorizonError::internal("Readiness lock poisoned"))
    }

    /// Subscribe to ready/unready transitions
    pub fn subscribe(self: &Arc<Self>, callbacks: Callbacks<T>) -> HorizonResult<ReliableSubscription> {
        let callbacks = Arc::new(callbacks);
        let (id, replay) = {
            let mut state = self.lock()?;
            if state.closed {
                return Err(HorizonError::Closed(format!(
                    "{} no longer accepts subscribers",
                    self.name
                )));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(id, Arc::clone(&callbacks));
            (id, state.ready.clone())
        };

        if let (Some(args), Some(on_ready)) = (replay, callbacks.on_ready.as_ref()) {
            self.invoke(|| on_ready(&args));
        }

        let source: Arc<dyn Unsubscribe> = Arc::clone(self) as Arc<dyn Unsubscribe>;
        Ok(ReliableSubscription {
            id,
            source: Arc::downgrade(&source),
        })
    }

    /// Publish a readiness message to every live subscriber
    pub fn emit(&self, message: Readiness<T>) -> HorizonResult<()> {
        match message {
            Readiness::Ready(args) => self.emit_ready(args),
            Readiness::Unready(reason) => self.emit_unready(reason),
        }
    }

    /// Store `args` as the ready state and notify subscribers
    pub fn emit_ready(&self, args: T) -> HorizonResult<()> {
        let (subscribers, transitioned) = {
            let mut state = self.lock()?;
            if state.closed {
                return Err(HorizonError::Closed(self.name.clone()));
            }
            let transitioned = state.ready.is_none();
            state.ready = Some(args.clone());
            (snapshot(&state), transitioned)
        };

        if transitioned {
            log_event_with_fields(Event::ReadinessReady, &[("source", &self.name)]);
        }
        for callbacks in subscribers {
            if let Some(on_ready) = callbacks.on_ready.as_ref() {
                self.invoke(|| on_ready(&args));
            }
        }
        Ok(())
    }

    /// Clear the ready state and notify subscribers
    pub fn emit_unready(&self, reason: Option<HorizonError>) -> HorizonResult<()> {
        let (subscribers, transitioned) = {
            let mut state = self.lock()?;
            if state.closed {
                return Err(HorizonError::Closed(self.name.clone()));
            }
            let transitioned = state.ready.take().is_some();
            (snapshot(&state), transitioned)
        };

        if transitioned {
            let cause = reason.as_ref().map(|e| e.to_string()).unwrap_or_default();
            log_event_with_fields(
                Event::ReadinessUnready,
                &[("source", &self.name), ("reason", &cause)],
            );
        }
        self.notify_unready(&subscribers, reason.as_ref());
        Ok(())
    }

    /// Close permanently. A ready source gets one final unready carrying
    /// `reason`. Closing twice is a no-op.
    pub fn close(&self, reason: &str) {
        let (subscribers, was_ready) = {
            let Ok(mut state) = self.lock() else {
                return;
            };
            if state.closed {
                return;
            }
            state.closed = true;
            let was_ready = state.ready.take().is_some();
            let subscribers = snapshot(&state);
            state.subscribers.clear();
            (subscribers, was_ready)
        };

        log_event_with_fields(
            Event::ReadinessClosed,
            &[("source", &self.name), ("reason", reason)],
        );
        if was_ready {
            let error = HorizonError::Closed(reason.to_string());
            self.notify_unready(&subscribers, Some(&error));
        }
    }

    fn notify_unready(&self, subscribers: &[Arc<Callbacks<T>>], reason: Option<&HorizonError>) {
        for callbacks in subscribers {
            if let Some(on_unready) = callbacks.on_unready.as_ref() {
                self.invoke(|| on_unready(reason));
            }
        }
    }

    fn invoke(&self, f: impl FnOnce() -> HorizonResult<()>) {
        let failure = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "callback panicked".to_string(),
        };
        log_event_with_fields(
            Event::ReadinessCallbackFailed,
            &[("source", &self.name), ("error", &failure)],
        );
    }

    /// Current ready args, if ready
    pub fn ready_args(&self) -> Option<T> {
        self.lock().ok().and_then(|s| s.ready.clone())
    }

    /// Whether the source has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().map(|s| s.closed).unwrap_or(true)
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.lock().map(|s| s.subscribers.len()).unwrap_or(0)
    }
}

fn snapshot<T>(state: &State<T>) -> Vec<Arc<Callbacks<T>>> {
    state.subscribers.values().cloned().collect()
}

impl<T> Unsubscribe for Reliable<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn unsubscribe(&self, id: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.subscribers.remove(&id);
        }
    }
}

impl<T> ReadinessGate for Reliable<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn is_ready(&self) -> bool {
        self.lock().map(|s| s.ready.is_some()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
