//! Method descriptors
//!
//! A method is a named handler tagged with the stage it runs in. The
//! executor switches on the tag; handlers never decide their own order.

use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use serde_json::Value;

use super::params::{Param, Params};
use crate::config::HorizonConfig;
use crate::errors::HorizonResult;
use crate::observability::MetricsRegistry;
use crate::protocol::{ClientContext, RequestOptions, RequestSink};

/// Stage a method runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// Computed before options, only when something requires it
    Prereq,
    /// Client-specified request modifier, run in client order
    Option,
    /// The single operation of a request
    Terminal,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Prereq => "prereq",
            MethodKind::Option => "option",
            MethodKind::Terminal => "terminal",
        }
    }
}

impl std::fmt::Display for MethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler sees of its request
pub struct RequestScope {
    pub request_id: u64,
    pub client: ClientContext,
    /// Options after rewrites, in client order
    pub options: RequestOptions,
    pub params: Params,
    pub config: Arc<HorizonConfig>,
    pub metrics: Arc<MetricsRegistry>,
}

/// Produces a parameter before any option runs
pub trait PrereqHandler: Send + Sync {
    fn run<'a>(&'a self, scope: &'a RequestScope) -> BoxFuture<'a, HorizonResult<Param>>;
}

/// Validates and normalizes one option's arguments into a parameter
pub trait OptionHandler: Send + Sync {
    fn run<'a>(
        &'a self,
        args: &'a [Value],
        scope: &'a RequestScope,
    ) -> BoxFuture<'a, HorizonResult<Param>>;
}

/// Performs the request's read, subscription or write
pub trait TerminalHandler: Send + Sync {
    fn run<'a>(
        &'a self,
        args: &'a [Value],
        scope: &'a RequestScope,
        sink: &'a RequestSink,
    ) -> BoxFuture<'a, HorizonResult<()>>;
}

/// A handler tagged with its stage
#[derive(Clone)]
pub enum Method {
    Prereq(Arc<dyn PrereqHandler>),
    Option(Arc<dyn OptionHandler>),
    Terminal(Arc<dyn TerminalHandler>),
}

impl Method {
    pub fn kind(&self) -> MethodKind {
        match self {
            Method::Prereq(_) => MethodKind::Prereq,
            Method::Option(_) => MethodKind::Option,
            Method::Terminal(_) => MethodKind::Terminal,
        }
    }

    pub fn prereq(handler: impl PrereqHandler + 'static) -> Self {
        Method::Prereq(Arc::new(handler))
    }

    pub fn option(handler: impl OptionHandler + 'static) -> Self {
        Method::Option(Arc::new(handler))
    }

    pub fn terminal(handler: impl TerminalHandler + 'static) -> Self {
        Method::Terminal(Arc::new(handler))
    }

    /// A prereq from a synchronous function
    pub fn prereq_fn(
        f: impl Fn(&RequestScope) -> HorizonResult<Param> + Send + Sync + 'static,
    ) -> Self {
        Self::prereq(SyncPrereq(f))
    }

    /// An option from a synchronous function of its args and earlier params
    pub fn option_fn(
        f: impl Fn(&[Value], &Params) -> HorizonResult<Param> + Send + Sync + 'static,
    ) -> Self {
        Self::option(SyncOption(f))
    }

    /// A terminal from a synchronous function
    pub fn terminal_fn(
        f: impl Fn(&[Value], &RequestScope, &RequestSink) -> HorizonResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self::terminal(SyncTerminal(f))
    }
}

struct SyncPrereq<F>(F);

impl<F> PrereqHandler for SyncPrereq<F>
where
    F: Fn(&RequestScope) -> HorizonResult<Param> + Send + Sync,
{
    fn run<'a>(&'a self, scope: &'a RequestScope) -> BoxFuture<'a, HorizonResult<Param>> {
        Box::pin(future::ready((self.0)(scope)))
    }
}

struct SyncOption<F>(F);

impl<F> OptionHandler for SyncOption<F>
where
    F: Fn(&[Value], &Params) -> HorizonResult<Param> + Send + Sync,
{
    fn run<'a>(
        &'a self,
        args: &'a [Value],
        scope: &'a RequestScope,
    ) -> BoxFuture<'a, HorizonResult<Param>> {
        Box::pin(future::ready((self.0)(args, &scope.params)))
    }
}

struct SyncTerminal<F>(F);

impl<F> TerminalHandler for SyncTerminal<F>
where
    F: Fn(&[Value], &RequestScope, &RequestSink) -> HorizonResult<()> + Send + Sync,
{
    fn run<'a>(
        &'a self,
        args: &'a [Value],
        scope: &'a RequestScope,
        sink: &'a RequestSink,
    ) -> BoxFuture<'a, HorizonResult<()>> {
        Box::pin(future::ready((self.0)(args, scope, sink)))
    }
}

/// A named method and its dependencies
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    /// Prereqs that must run before this method
    pub requires: Vec<String>,
    /// Methods that must not appear in the same request
    pub conflicts: Vec<String>,
    pub method: Method,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, method: Method) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            conflicts: Vec::new(),
            method,
        }
    }

    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn conflicts<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflicts.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn kind(&self) -> MethodKind {
        self.method.kind()
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("requires", &self.requires)
            .field("conflicts", &self.conflicts)
            .finish()
    }
}
