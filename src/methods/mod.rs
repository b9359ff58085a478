//! # Built-in Methods
//!
//! The plugin providing the standard request vocabulary:
//!
//! - Prereq: `hz_permissions`
//! - Options: `collection`, `find`, `find_all`, `order`, `limit`, `above`,
//!   `below`, `timeout`
//! - Terminals: `fetch`, `watch`, `store`, `insert`, `upsert`, `update`,
//!   `replace`, `remove`

pub mod names;
mod options;
mod reads;
mod writes;

pub use options::build_query;
pub use reads::{Fetch, Watch};
pub use writes::WriteTerminal;

use names::{
    ABOVE, BELOW, COLLECTION, FETCH, FIND, FIND_ALL, LIMIT, ORDER, QUERY_OPTIONS, TIMEOUT, WATCH,
};

use crate::errors::HorizonResult;
use crate::permissions::{Permissions, PERMISSIONS_METHOD};
use crate::pipeline::{Method, MethodDescriptor, Param, Plugin, PluginContext};
use crate::writes::{WriteKind, WriteStrategy};

/// Name of the built-in plugin
pub const CORE_PLUGIN: &str = "core";

/// The standard methods
#[derive(Debug, Default)]
pub struct CoreMethods;

impl Plugin for CoreMethods {
    fn name(&self) -> &str {
        CORE_PLUGIN
    }

    fn activate(&self, ctx: &PluginContext) -> HorizonResult<Vec<MethodDescriptor>> {
        let permissions = Permissions::from_config(&ctx.config.permissions);
        let mut methods = vec![
            MethodDescriptor::new(
                PERMISSIONS_METHOD,
                Method::prereq_fn(move |scope| {
                    Ok(Param::Validator(permissions.validator(&scope.client)))
                }),
            ),
            MethodDescriptor::new(
                COLLECTION,
                Method::option(options::CollectionOption::new(ctx.metadata.clone())),
            ),
            MethodDescriptor::new(FIND, Method::option_fn(|args, _| options::parse_find(args)))
                .conflicts([FIND_ALL, ORDER, LIMIT, ABOVE, BELOW]),
            MethodDescriptor::new(
                FIND_ALL,
                Method::option_fn(|args, _| options::parse_find_all(args)),
            ),
            MethodDescriptor::new(ORDER, Method::option_fn(|args, _| options::parse_order(args))),
            MethodDescriptor::new(LIMIT, Method::option_fn(|args, _| options::parse_limit(args))),
            MethodDescriptor::new(ABOVE, Method::option_fn(|args, _| options::parse_above(args))),
            MethodDescriptor::new(BELOW, Method::option_fn(|args, _| options::parse_below(args))),
            MethodDescriptor::new(
                TIMEOUT,
                Method::option_fn(|args, _| options::parse_timeout(args)),
            ),
            MethodDescriptor::new(FETCH, Method::terminal(Fetch))
                .requires([PERMISSIONS_METHOD])
                .conflicts([TIMEOUT]),
            MethodDescriptor::new(WATCH, Method::terminal(Watch))
                .requires([PERMISSIONS_METHOD])
                .conflicts([TIMEOUT]),
        ];
        for kind in WriteKind::ALL {
            methods.push(
                MethodDescriptor::new(kind.name(), Method::terminal(WriteTerminal::new(kind)))
                    .requires([PERMISSIONS_METHOD])
                    .conflicts(QUERY_OPTIONS),
            );
        }
        Ok(methods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::{json, Value};

    use crate::collections::Metadata;
    use crate::config::HorizonConfig;
    use crate::pipeline::{MethodRegistry, PipelineExecutor};
    use crate::protocol::{ClientContext, Request, RequestOptions, Response, ResponseBody, ResponseSink};
    use crate::store::{DocumentStore, MemoryStore};

    struct Env {
        store: Arc<MemoryStore>,
        executor: PipelineExecutor,
    }

    fn env() -> Env {
        let store = Arc::new(MemoryStore::with_tables(&["people"]));
        let config = Arc::new(HorizonConfig::permissive());
        let metadata =
            Metadata::new(Arc::clone(&store) as Arc<dyn DocumentStore>, &config).unwrap();
        let registry = Arc::new(MethodRegistry::new());
        let ctx = PluginContext {
            config: Arc::clone(&config),
            metadata: Arc::clone(&metadata),
        };
        registry.add_plugin(Arc::new(CoreMethods), &ctx).unwrap();
        let executor = PipelineExecutor::new(registry, metadata.readiness(), config);
        Env { store, executor }
    }

    async fn run(env: &Env, options: RequestOptions) -> Vec<Response> {
        let (sink, mut rx) = ResponseSink::channel();
        env.executor
            .execute(Request::new(1, options), ClientContext::anonymous(), sink.for_request(1))
            .await
            .unwrap();
        drop(sink);
        let mut responses = Vec::new();
        while let Some(r) = rx.recv().await {
            responses.push(r);
        }
        responses
    }

    fn patches(responses: &[Response]) -> Vec<Value> {
        responses
            .iter()
            .filter_map(|r| match &r.body {
                ResponseBody::Patch { patch } => Some(patch.clone()),
                _ => None,
            })
            .flatten()
            .map(|p| serde_json::to_value(p).unwrap())
            .collect()
    }

    #[test]
    fn test_registers_every_method() {
        let env = env();
        let names = env.executor.registry().names().unwrap();
        for name in [
            "hz_permissions", "collection", "find", "find_all", "order", "limit", "above",
            "below", "timeout", "fetch", "watch", "store", "insert", "upsert", "update",
            "replace", "remove",
        ] {
            assert!(names.iter().any(|n| n == name), "missing {}", name);
        }
    }

    #[tokio::test]
    async fn test_fetch_ordered_set() {
        let env = env();
        env.store
            .load("people", vec![json!({"id": 1, "age": 40}), json!({"id": 2, "age": 30})])
            .unwrap();

        let responses = run(
            &env,
            RequestOptions::new()
                .with("collection", vec![json!("people")])
                .with("order", vec![json!("age")])
                .with("fetch", vec![]),
        )
        .await;

        assert_eq!(
            patches(&responses),
            vec![
                json!({"op": "replace", "path": "", "value": {"type": "set", "synced": false, "val": []}}),
                json!({"op": "add", "path": "/val/-", "value": {"id": 2, "age": 30, "$hz_v$": 0}}),
                json!({"op": "add", "path": "/val/-", "value": {"id": 1, "age": 40, "$hz_v$": 0}}),
                json!({"op": "replace", "path": "/synced", "value": true}),
            ]
        );
        assert_eq!(responses.last(), Some(&Response::end(1)));
    }

    #[tokio::test]
    async fn test_fetch_find_is_a_value() {
        let env = env();
        env.store.load("people", vec![json!({"id": 1, "age": 40})]).unwrap();

        let responses = run(
            &env,
            RequestOptions::new()
                .with("collection", vec![json!("people")])
                .with("find", vec![json!({"id": 1})])
                .with("fetch", vec![]),
        )
        .await;

        let p = patches(&responses);
        assert_eq!(p[0]["value"]["type"], json!("value"));
        assert_eq!(p[1], json!({"op": "replace", "path": "/val", "value": {"id": 1, "age": 40, "$hz_v$": 0}}));
    }

    #[tokio::test]
    async fn test_insert_then_conflict() {
        let env = env();
        let insert = || {
            RequestOptions::new()
                .with("collection", vec![json!("people")])
                .with("insert", vec![json!({"id": 7, "name": "a"})])
        };

        let first = patches(&run(&env, insert()).await);
        assert_eq!(first[0]["value"]["val"], json!([{"id": 7, "$hz_v$": 0}]));

        let second = patches(&run(&env, insert()).await);
        assert_eq!(second[0]["value"]["val"][0]["error_code"], json!("DOCUMENT_EXISTS"));
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let env = env();
        let responses = run(
            &env,
            RequestOptions::new()
                .with("collection", vec![json!("nope")])
                .with("fetch", vec![]),
        )
        .await;
        assert!(matches!(
            &responses[0].body,
            ResponseBody::Error { error_code, .. } if error_code == "VALIDATION_ERROR"
        ));
    }

    #[tokio::test]
    async fn test_write_rejects_query_options() {
        let env = env();
        let responses = run(
            &env,
            RequestOptions::new()
                .with("collection", vec![json!("people")])
                .with("limit", vec![json!(1)])
                .with("store", vec![json!({"id": 1})]),
        )
        .await;
        assert_eq!(responses.len(), 1);
        assert!(matches!(&responses[0].body, ResponseBody::Error { .. }));
    }
}
