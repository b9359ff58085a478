//! Shared setup for integration tests: an engine over any document store.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use horizon::collections::Metadata;
use horizon::methods::CoreMethods;
use horizon::observability::MetricsRegistry;
use horizon::pipeline::{MethodRegistry, PipelineExecutor, PluginContext};
use horizon::protocol::{
    ClientContext, Patch, Request, RequestOptions, Response, ResponseBody, ResponseReceiver,
    ResponseSink,
};
use horizon::store::DocumentStore;
use horizon::HorizonConfig;
use serde_json::Value;

pub struct Engine {
    pub metadata: Arc<Metadata>,
    pub executor: Arc<PipelineExecutor>,
    pub metrics: Arc<MetricsRegistry>,
}

impl Engine {
    pub fn new(store: Arc<dyn DocumentStore>, config: HorizonConfig) -> Self {
        let config = Arc::new(config);
        let metadata = Metadata::new(store, &config).unwrap();
        let registry = Arc::new(MethodRegistry::new());
        let ctx = PluginContext {
            config: Arc::clone(&config),
            metadata: Arc::clone(&metadata),
        };
        registry.add_plugin(Arc::new(CoreMethods), &ctx).unwrap();
        let metrics = Arc::new(MetricsRegistry::new());
        let executor = PipelineExecutor::new(registry, metadata.readiness(), config)
            .with_metrics(Arc::clone(&metrics));
        Self {
            metadata,
            executor: Arc::new(executor),
            metrics,
        }
    }

    /// Run a request as `client` and collect every response it sent
    pub async fn run_as(&self, client: ClientContext, options: RequestOptions) -> Vec<Response> {
        let (sink, mut rx) = ResponseSink::channel();
        self.executor
            .execute(Request::new(1, options), client, sink.for_request(1))
            .await
            .unwrap();
        drop(sink);
        let mut responses = Vec::new();
        while let Some(response) = rx.recv().await {
            responses.push(response);
        }
        responses
    }

    pub async fn run(&self, options: RequestOptions) -> Vec<Response> {
        self.run_as(ClientContext::anonymous(), options).await
    }

    /// Start a long-running request on its own task
    pub fn spawn(&self, request_id: u64, options: RequestOptions) -> (tokio::task::JoinHandle<()>, ResponseReceiver) {
        self.spawn_as(ClientContext::anonymous(), request_id, options)
    }

    pub fn spawn_as(
        &self,
        client: ClientContext,
        request_id: u64,
        options: RequestOptions,
    ) -> (tokio::task::JoinHandle<()>, ResponseReceiver) {
        let (sink, rx) = ResponseSink::channel();
        let executor = Arc::clone(&self.executor);
        let handle = tokio::spawn(async move {
            let _ = executor
                .execute(Request::new(request_id, options), client, sink.for_request(request_id))
                .await;
        });
        (handle, rx)
    }
}

/// Every patch of a response list, in order
pub fn patches(responses: &[Response]) -> Vec<Patch> {
    responses
        .iter()
        .filter_map(|r| match &r.body {
            ResponseBody::Patch { patch } => Some(patch.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

/// The per-row results of a write request
pub fn write_results(responses: &[Response]) -> Vec<Value> {
    let patches = patches(responses);
    assert_eq!(patches.len(), 1, "a write sends exactly one patch");
    let value = patches[0].value.clone().unwrap();
    value["val"].as_array().cloned().unwrap()
}

/// The error code of the terminator, if the request failed
pub fn error_code(responses: &[Response]) -> Option<String> {
    match &responses.last()?.body {
        ResponseBody::Error { error_code, .. } => Some(error_code.clone()),
        _ => None,
    }
}

pub async fn recv(rx: &mut ResponseReceiver) -> Response {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a response")
        .expect("response channel closed")
}
