//! # Pipeline Executor
//!
//! Runs one request through its methods:
//!
//! 1. Readiness gate (`NotReady` when unready)
//! 2. Watch rewrites, then validation of the option set before any handler
//! 3. Required prereqs, dependencies first
//! 4. Options, in the order the client listed them
//! 5. The single terminal
//!
//! The first failing handler aborts the request. Exactly one terminator
//! (`complete` or an error) is sent per request.

use std::sync::Arc;

use super::method::{
    Method, MethodDescriptor, MethodKind, OptionHandler, PrereqHandler, RequestScope,
    TerminalHandler,
};
use super::params::Params;
use super::registry::MethodRegistry;
use crate::config::HorizonConfig;
use crate::errors::{HorizonError, HorizonResult};
use crate::materializer::watch_rewrites;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::protocol::{ClientContext, Request, RequestOptions, RequestSink};
use crate::reliable::ReadinessGate;

/// Resolved handlers of one request
struct Plan {
    prereqs: Vec<(String, Arc<dyn PrereqHandler>)>,
    options: Vec<(String, Arc<dyn OptionHandler>)>,
    terminal: (String, Arc<dyn TerminalHandler>),
}

/// Executes requests against a method registry
pub struct PipelineExecutor {
    registry: Arc<MethodRegistry>,
    readiness: Arc<dyn ReadinessGate>,
    config: Arc<HorizonConfig>,
    metrics: Arc<MetricsRegistry>,
}

impl PipelineExecutor {
    pub fn new(
        registry: Arc<MethodRegistry>,
        readiness: Arc<dyn ReadinessGate>,
        config: Arc<HorizonConfig>,
    ) -> Self {
        Self {
            registry,
            readiness,
            config,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Share a metrics registry
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Arc<HorizonConfig> {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Run a request to completion and send its terminator. Fails only if
    /// the terminator could not be delivered.
    pub async fn execute(
        &self,
        request: Request,
        client: ClientContext,
        sink: RequestSink,
    ) -> HorizonResult<()> {
        let request_id = request.request_id.to_string();
        self.metrics.increment_requests_started();
        log_event_with_fields(Event::RequestStart, &[("request_id", &request_id)]);

        match self.run(request, client, &sink).await {
            Ok(()) => {
                log_event_with_fields(Event::RequestComplete, &[("request_id", &request_id)]);
                sink.end()
            }
            Err(err) => {
                self.metrics.increment_requests_failed();
                log_event_with_fields(
                    Event::RequestFailed,
                    &[
                        ("request_id", &request_id),
                        ("error_code", err.code()),
                        ("error", &err.to_string()),
                    ],
                );
                sink.error(&err)
            }
        }
    }

    async fn run(
        &self,
        request: Request,
        client: ClientContext,
        sink: &RequestSink,
    ) -> HorizonResult<()> {
        if !self.readiness.is_ready() {
            return Err(HorizonError::not_ready(format!(
                "{} is not ready",
                self.readiness.name()
            )));
        }

        let mut options = request.options;
        watch_rewrites(&mut options, self.config.implicit_watch_limit);
        let plan = self.plan(&options)?;

        let mut scope = RequestScope {
            request_id: request.request_id,
            client,
            options,
            params: Params::new(),
            config: Arc::clone(&self.config),
            metrics: Arc::clone(&self.metrics),
        };

        for (name, handler) in &plan.prereqs {
            let param = handler.run(&scope).await?;
            scope.params.insert(name.clone(), param)?;
        }

        for (name, handler) in &plan.options {
            let param = {
                let args = scope.options.get(name).unwrap_or_default();
                handler.run(args, &scope).await?
            };
            scope.params.insert(name.clone(), param)?;
        }

        let (name, handler) = &plan.terminal;
        let args = scope.options.get(name).unwrap_or_default();
        handler.run(args, &scope, sink).await
    }

    /// Resolve and validate the option set without running anything
    fn plan(&self, options: &RequestOptions) -> HorizonResult<Plan> {
        let mut used: Vec<Arc<MethodDescriptor>> = Vec::with_capacity(options.len());
        for name in options.names() {
            let descriptor = self
                .registry
                .get(name)?
                .ok_or_else(|| HorizonError::validation(format!("Unknown method \"{}\"", name)))?;
            if descriptor.kind() == MethodKind::Prereq {
                return Err(HorizonError::validation(format!(
                    "\"{}\" cannot be requested directly",
                    name
                )));
            }
            used.push(descriptor);
        }

        for descriptor in &used {
            if let Some(other) = descriptor.conflicts.iter().find(|c| options.contains(c)) {
                return Err(HorizonError::validation(format!(
                    "\"{}\" cannot be used with \"{}\"",
                    descriptor.name, other
                )));
            }
        }

        let mut option_handlers = Vec::new();
        let mut terminals = Vec::new();
        for descriptor in &used {
            match &descriptor.method {
                Method::Option(h) => option_handlers.push((descriptor.name.clone(), Arc::clone(h))),
                Method::Terminal(h) => terminals.push((descriptor.name.clone(), Arc::clone(h))),
                Method::Prereq(_) => {}
            }
        }
        if terminals.len() != 1 {
            let names: Vec<&str> = terminals.iter().map(|(n, _)| n.as_str()).collect();
            return Err(HorizonError::validation(if names.is_empty() {
                "No terminal method was specified".to_string()
            } else {
                format!("Multiple terminal methods: {}", names.join(", "))
            }));
        }
        let terminal = terminals.remove(0);

        let mut prereqs = Vec::new();
        for descriptor in self.registry.prereq_order(&used)? {
            match &descriptor.method {
                Method::Prereq(h) => prereqs.push((descriptor.name.clone(), Arc::clone(h))),
                _ => {
                    return Err(HorizonError::internal(format!(
                        "\"{}\" resolved as a prereq",
                        descriptor.name
                    )))
                }
            }
        }

        Ok(Plan {
            prereqs,
            options: option_handlers,
            terminal,
        })
    }
}
