//! Deferred-job capability: enqueue now, execute later, decoupled from the
//! request/response cycle that produced the job.

use std::{collections::HashMap, future::Future, sync::Mutex};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};

/// Hands data to a named durable queue. Returns immediately; delivery is
/// at-least-once and may be delayed arbitrarily, so consumers must keep
/// their side effects idempotent or fallback-safe.
pub trait JobDispatcher: Send + Sync {
    fn enqueue(&self, job_name: &str, data: Value) -> Result<()>;
}

struct JobChannel {
    tx: mpsc::UnboundedSender<Value>,
    rx: Option<mpsc::UnboundedReceiver<Value>>,
}

fn new_channel() -> JobChannel {
    let (tx, rx) = mpsc::unbounded_channel();
    JobChannel { tx, rx: Some(rx) }
}

#[derive(Default)]
/// In-process implementation of the deferred-job capability over named
/// unbounded channels. Jobs enqueued before the consumer registers are
/// buffered and delivered once it does.
pub struct InProcessJobQueue {
    channels: Mutex<HashMap<String, JobChannel>>,
}

impl InProcessJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the single consumer for `job_name` and spawns its worker
    /// loop. Each delivered job runs to completion before the next starts.
    /// A handler error is contained here: logged with full detail and
    /// dropped, never propagated, never retried.
    pub fn consume<F, Fut>(&self, job_name: &str, handler: F) -> Result<JoinHandle<()>>
    where
        F: Fn(Value) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send,
    {
        let mut rx = {
            let mut channels = self
                .channels
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let channel = channels
                .entry(job_name.to_string())
                .or_insert_with(new_channel);
            match channel.rx.take() {
                Some(rx) => rx,
                None => bail!("job {job_name} already has a consumer"),
            }
        };
        let job_name = job_name.to_string();
        Ok(tokio::spawn(async move {
            while let Some(data) = rx.recv().await {
                if let Err(error) = handler(data).await {
                    tracing::error!(job = %job_name, "job handler failed: {error:#}");
                }
            }
        }))
    }
}

impl JobDispatcher for InProcessJobQueue {
    fn enqueue(&self, job_name: &str, data: Value) -> Result<()> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let channel = channels
            .entry(job_name.to_string())
            .or_insert_with(new_channel);
        channel
            .tx
            .send(data)
            .with_context(|| format!("job queue {job_name} is closed"))
    }
}
