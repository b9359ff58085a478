//! # Session
//!
//! Routes one client's requests. Each pipeline request runs on its own
//! task keyed by `request_id`; ending a subscription or closing the
//! session aborts the task, which drops its change cursor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::{HorizonError, HorizonResult};
use crate::observability::{log_event_with_fields, Event};
use crate::pipeline::PipelineExecutor;
use crate::protocol::{ClientContext, Request, RequestType, ResponseReceiver, ResponseSink};

type InFlight = Arc<Mutex<HashMap<u64, JoinHandle<()>>>>;

fn lock(in_flight: &InFlight) -> HorizonResult<MutexGuard<'_, HashMap<u64, JoinHandle<()>>>> {
    in_flight
        .lock()
        .map_err(|_| HorizonError::internal("Session lock poisoned"))
}

/// One connected client
pub struct Session {
    id: String,
    executor: Arc<PipelineExecutor>,
    client: ClientContext,
    sink: ResponseSink,
    in_flight: InFlight,
    closed: AtomicBool,
}

impl Session {
    /// Open a session; the receiver carries every response to the transport
    pub fn new(executor: Arc<PipelineExecutor>, client: ClientContext) -> (Self, ResponseReceiver) {
        let (sink, receiver) = ResponseSink::channel();
        let id = Uuid::new_v4().to_string();
        log_event_with_fields(
            Event::SessionOpen,
            &[
                ("session_id", &id),
                ("user_id", client.user_id.as_deref().unwrap_or("anonymous")),
            ],
        );
        let session = Self {
            id,
            executor,
            client,
            sink,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            closed: AtomicBool::new(false),
        };
        (session, receiver)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of requests still running
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).map_or(0, |map| map.len())
    }

    /// Dispatch a request. Must be called within a tokio runtime. Fails
    /// only if the session is closed or the client channel is gone.
    pub fn handle(&self, request: Request) -> HorizonResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HorizonError::Closed(format!("Session {} is closed", self.id)));
        }
        let sink = self.sink.for_request(request.request_id);
        match request.request_type {
            RequestType::Keepalive => sink.end(),
            RequestType::EndSubscription => {
                let handle = lock(&self.in_flight)?.remove(&request.request_id);
                match handle {
                    Some(handle) if !handle.is_finished() => {
                        handle.abort();
                        sink.end()
                    }
                    // Already terminated on its own
                    _ => Ok(()),
                }
            }
            RequestType::Request => self.spawn(request),
        }
    }

    fn spawn(&self, request: Request) -> HorizonResult<()> {
        let request_id = request.request_id;
        let sink = self.sink.for_request(request_id);
        let mut in_flight = lock(&self.in_flight)?;

        if in_flight.contains_key(&request_id) {
            return sink.error(&HorizonError::validation(format!(
                "Request {} is already in progress",
                request_id
            )));
        }
        let limit = self.executor.config().max_requests_per_session;
        if in_flight.len() >= limit {
            return sink.error(&HorizonError::validation(format!(
                "Too many concurrent requests (limit {})",
                limit
            )));
        }

        let executor = Arc::clone(&self.executor);
        let client = self.client.clone();
        let registry = Arc::clone(&self.in_flight);
        // The map lock is held until the handle is inserted, so the task's
        // own removal always finds it
        let handle = tokio::spawn(async move {
            // Fails only when the client is gone
            let _ = executor.execute(request, client, sink).await;
            if let Ok(mut map) = registry.lock() {
                map.remove(&request_id);
            }
        });
        in_flight.insert(request_id, handle);
        Ok(())
    }

    /// Abort every in-flight request
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let aborted = match lock(&self.in_flight) {
            Ok(mut map) => {
                let n = map.len();
                for (_, handle) in map.drain() {
                    handle.abort();
                }
                n
            }
            Err(_) => 0,
        };
        log_event_with_fields(
            Event::SessionClose,
            &[("session_id", &self.id), ("aborted", &aborted.to_string())],
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
