use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use drover_core::error::{DroverError, Result};
use drover_core::job::{DroverJob, HandlerFuture, JobContext, JobHandler};

/// Adapts a typed job to the raw-payload handler interface.
struct TypedHandler<J>(PhantomData<fn() -> J>);

impl<J: DroverJob> JobHandler for TypedHandler<J> {
    fn handle<'a>(&'a self, ctx: &'a JobContext, payload: &'a [u8]) -> HandlerFuture<'a> {
        Box::pin(async move {
            let args: J::Args = serde_json::from_slice(payload)
                .map_err(|e| DroverError::MalformedPayload(e.to_string()))?;
            J::execute(ctx, args).await
        })
    }
}

/// Handler built from a closure.
struct FnHandler<F>(F);

impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobContext, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle<'a>(&'a self, ctx: &'a JobContext, payload: &'a [u8]) -> HandlerFuture<'a> {
        Box::pin((self.0)(ctx.clone(), payload.to_vec()))
    }
}

/// Handlers by queue name.
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a typed job on its queue.
    pub fn register<J: DroverJob>(&mut self) {
        self.register_handler(J::queue(), TypedHandler::<J>(PhantomData));
    }

    /// Register a raw-payload handler; replaces any previous one.
    pub fn register_handler(&mut self, queue: impl Into<String>, handler: impl JobHandler) {
        let queue = queue.into();
        if self.handlers.insert(queue.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(queue = %queue, "Replacing existing job handler");
        }
    }

    /// Register a closure as the handler for `queue`.
    pub fn register_fn<F, Fut>(&mut self, queue: impl Into<String>, f: F)
    where
        F: Fn(JobContext, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register_handler(queue, FnHandler(f));
    }

    /// Get the handler for a queue.
    pub fn get(&self, queue: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(queue).cloned()
    }

    /// Queues with a handler, sorted.
    pub fn queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.handlers.keys().cloned().collect();
        queues.sort();
        queues
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::cluster::WorkerId;
    use drover_core::job::{Job, JobLogRecorder};
    use serde::{Deserialize, Serialize};

    use crate::store::MemoryStore;

    #[derive(Serialize, Deserialize)]
    struct Frame {
        number: u32,
    }

    struct RenderFrame;

    impl DroverJob for RenderFrame {
        type Args = Frame;

        fn queue() -> &'static str {
            "render"
        }

        fn execute(_ctx: &JobContext, args: Frame) -> HandlerFuture<'_> {
            Box::pin(async move {
                if args.number == 13 {
                    return Err(DroverError::Handler("unlucky frame".into()));
                }
                Ok(())
            })
        }
    }

    fn context(queue: &str) -> JobContext {
        let logger = JobLogRecorder::new(Arc::new(MemoryStore::new()), true);
        JobContext::new(&Job::new(queue, Vec::new()), 3, WorkerId::new(), logger)
    }

    #[test]
    fn test_empty_registry() {
        let registry = JobRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get("nonexistent").is_none());
    }

    #[tokio::test]
    async fn test_typed_job_decodes_payload() {
        let mut registry = JobRegistry::new();
        registry.register::<RenderFrame>();
        assert!(registry.get("render").is_some());

        let handler = registry.get("render").unwrap();
        let ctx = context("render");

        assert!(handler.handle(&ctx, br#"{"number": 7}"#).await.is_ok());
        let err = handler.handle(&ctx, br#"{"number": 13}"#).await.unwrap_err();
        assert!(matches!(err, DroverError::Handler(_)));
    }

    #[tokio::test]
    async fn test_typed_job_rejects_malformed_payload() {
        let mut registry = JobRegistry::new();
        registry.register::<RenderFrame>();

        let handler = registry.get("render").unwrap();
        let err = handler.handle(&context("render"), b"not json").await.unwrap_err();
        assert!(matches!(err, DroverError::MalformedPayload(_)));
        assert!(!err.is_retryable_job_error());
    }

    #[tokio::test]
    async fn test_closure_handler_sees_raw_bytes() {
        let mut registry = JobRegistry::new();
        registry.register_fn("email", |ctx: JobContext, payload: Vec<u8>| async move {
            assert_eq!(ctx.queue, "email");
            if payload == b"\x00\xff" {
                Ok(())
            } else {
                Err(DroverError::Handler("unexpected payload".into()))
            }
        });

        let handler = registry.get("email").unwrap();
        assert!(handler.handle(&context("email"), b"\x00\xff").await.is_ok());
        assert_eq!(registry.queues(), vec!["email".to_string()]);
    }
}
