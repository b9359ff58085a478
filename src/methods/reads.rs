//! Read terminals: `fetch` and `watch`

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use super::names::{COLLECTION, FETCH, WATCH};
use super::options::build_query;
use crate::collections::Collection;
use crate::errors::{HorizonError, HorizonResult};
use crate::materializer::change_to_patches;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::permissions::{PermissionValidator, PERMISSIONS_METHOD};
use crate::pipeline::{RequestScope, TerminalHandler};
use crate::protocol::patch::{VAL, VAL_ANY};
use crate::protocol::{Patch, RequestSink, ValueType};
use crate::store::QuerySpec;

pub(crate) fn require_collection<'a>(
    scope: &'a RequestScope,
    method: &str,
) -> HorizonResult<&'a Arc<Collection>> {
    scope.params.collection(COLLECTION)?.ok_or_else(|| {
        HorizonError::validation(format!("\"{}\" requires \"{}\"", method, COLLECTION))
    })
}

pub(crate) fn require_validator(scope: &RequestScope) -> HorizonResult<&Arc<dyn PermissionValidator>> {
    scope.params.validator(PERMISSIONS_METHOD)?.ok_or_else(|| {
        HorizonError::configuration(format!("\"{}\" did not run", PERMISSIONS_METHOD))
    })
}

fn no_args(method: &str, args: &[Value]) -> HorizonResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(HorizonError::validation(format!(
            "\"{}\" takes no arguments",
            method
        )))
    }
}

fn value_type(spec: &QuerySpec) -> ValueType {
    if spec.selector.is_singleton() {
        ValueType::Value
    } else {
        ValueType::Set
    }
}

fn denied_read(collection: &Collection, doc: &Value) -> HorizonError {
    HorizonError::Unauthorized(format!(
        "Read of {} in \"{}\"",
        doc.get("id").unwrap_or(&Value::Null),
        collection.name()
    ))
}

/// One-shot read
pub struct Fetch;

impl Fetch {
    async fn fetch(&self, args: &[Value], scope: &RequestScope, sink: &RequestSink) -> HorizonResult<()> {
        no_args(FETCH, args)?;
        let collection = require_collection(scope, FETCH)?;
        let validator = require_validator(scope)?;
        let spec = build_query(&scope.params)?;
        let value_type = value_type(&spec);

        let rows = collection.query(&spec).await?;
        if let Some(denied) = rows.iter().find(|row| !validator.can_read(collection.name(), row)) {
            return Err(denied_read(collection, denied));
        }

        sink.patch(vec![Patch::initial(value_type)])?;
        match value_type {
            ValueType::Value => {
                let row = rows.into_iter().next().unwrap_or(Value::Null);
                sink.patch(vec![Patch::replace(VAL, row)])?;
            }
            ValueType::Set => {
                let batch_size = scope.config.fetch_batch_size.max(1);
                for batch in rows.chunks(batch_size) {
                    sink.patch(batch.iter().map(|row| Patch::add(VAL_ANY, row.clone())).collect())?;
                }
            }
        }
        sink.patch(vec![Patch::synced(true)])
    }
}

impl TerminalHandler for Fetch {
    fn run<'a>(
        &'a self,
        args: &'a [Value],
        scope: &'a RequestScope,
        sink: &'a RequestSink,
    ) -> BoxFuture<'a, HorizonResult<()>> {
        Box::pin(self.fetch(args, scope, sink))
    }
}

/// Counts a subscription as open until dropped
struct OpenSubscription {
    metrics: Arc<MetricsRegistry>,
    request_id: String,
    collection: String,
}

impl OpenSubscription {
    fn open(metrics: &Arc<MetricsRegistry>, request_id: u64, collection: &str) -> Self {
        let open = Self {
            metrics: Arc::clone(metrics),
            request_id: request_id.to_string(),
            collection: collection.to_string(),
        };
        open.metrics.increment_subscriptions_opened();
        log_event_with_fields(
            Event::SubscriptionOpen,
            &[("collection", &open.collection), ("request_id", &open.request_id)],
        );
        open
    }
}

impl Drop for OpenSubscription {
    fn drop(&mut self) {
        self.metrics.increment_subscriptions_closed();
        log_event_with_fields(
            Event::SubscriptionClose,
            &[("collection", &self.collection), ("request_id", &self.request_id)],
        );
    }
}

/// Live subscription; runs until the feed ends, fails or is cancelled.
/// A change exposing an unreadable document ends it with `Unauthorized`.
pub struct Watch;

impl Watch {
    async fn watch(&self, args: &[Value], scope: &RequestScope, sink: &RequestSink) -> HorizonResult<()> {
        no_args(WATCH, args)?;
        let collection = require_collection(scope, WATCH)?;
        let validator = require_validator(scope)?;
        let spec = build_query(&scope.params)?;
        let value_type = value_type(&spec);

        let mut cursor = collection.changes(&spec).await?;
        let _open = OpenSubscription::open(&scope.metrics, scope.request_id, collection.name());
        sink.patch(vec![Patch::initial(value_type)])?;

        while let Some(change) = cursor.next().await {
            let change = match change {
                Ok(change) => change,
                Err(err) => {
                    cursor.close();
                    return Err(err);
                }
            };
            if let Some(denied) = change
                .documents()
                .find(|doc| !validator.can_read(collection.name(), doc))
            {
                cursor.close();
                return Err(denied_read(collection, denied));
            }
            sink.patch(change_to_patches(&change, value_type))?;
        }
        Ok(())
    }
}

impl TerminalHandler for Watch {
    fn run<'a>(
        &'a self,
        args: &'a [Value],
        scope: &'a RequestScope,
        sink: &'a RequestSink,
    ) -> BoxFuture<'a, HorizonResult<()>> {
        Box::pin(self.watch(args, scope, sink))
    }
}
