//! Write terminals
//!
//! `store`, `insert`, `upsert`, `update`, `replace` and `remove` share one
//! terminal parameterized by its [`WriteKind`].

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::time::Instant;

use super::names::TIMEOUT;
use super::reads::{require_collection, require_validator};
use crate::errors::{HorizonError, HorizonResult};
use crate::pipeline::{RequestScope, TerminalHandler};
use crate::protocol::RequestSink;
use crate::writes::{render_results, retry_loop, WriteKind, WriteStrategy, WriteTarget};

/// Rows passed as arguments; an array argument contributes its elements
fn rows_of(args: &[Value]) -> Vec<Value> {
    let mut rows = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Array(items) => rows.extend(items.iter().cloned()),
            other => rows.push(other.clone()),
        }
    }
    rows
}

pub struct WriteTerminal {
    kind: WriteKind,
}

impl WriteTerminal {
    pub fn new(kind: WriteKind) -> Self {
        Self { kind }
    }

    async fn write(&self, args: &[Value], scope: &RequestScope, sink: &RequestSink) -> HorizonResult<()> {
        let method = self.kind.name();
        let collection = require_collection(scope, method)?;
        let validator = require_validator(scope)?;

        let rows = rows_of(args);
        if rows.is_empty() {
            return Err(HorizonError::validation(format!(
                "\"{}\" expects at least one row",
                method
            )));
        }

        let timeout = match scope.params.timeout(TIMEOUT)? {
            Some(timeout) => *timeout,
            None => scope.config.write_timeout(),
        };
        let target = WriteTarget {
            collection,
            validator: &**validator,
            metrics: &scope.metrics,
        };
        let results = retry_loop(&self.kind, &target, rows, Instant::now() + timeout).await?;
        sink.patch(vec![render_results(&results)])
    }
}

impl TerminalHandler for WriteTerminal {
    fn run<'a>(
        &'a self,
        args: &'a [Value],
        scope: &'a RequestScope,
        sink: &'a RequestSink,
    ) -> BoxFuture<'a, HorizonResult<()>> {
        Box::pin(self.write(args, scope, sink))
    }
}
