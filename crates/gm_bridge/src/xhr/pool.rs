//! Bounded execution of asynchronous requests
//!
//! The pool owns its own multi-threaded runtime so hosts without one can
//! still issue requests. A fixed set of worker tasks drains a bounded queue,
//! which caps both the requests in flight and the requests waiting.

use std::sync::Arc;
use std::time::Duration;

use gm_config::pool::PoolConfig;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::executor::{ExecutorError, XmlHttpRequest};
use super::response::ResponseState;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Failed starting request runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("Request queue is full")]
    Full,
    #[error("Request pool is shut down")]
    Closed,
}

type Queue = Arc<Mutex<mpsc::Receiver<XmlHttpRequest>>>;

pub struct RequestPool {
    runtime: Option<Runtime>,
    handle: Handle,
    sender: Option<mpsc::Sender<XmlHttpRequest>>,
    queue: Queue,
    workers: Vec<JoinHandle<()>>,
    grace: Duration,
}

impl std::fmt::Debug for RequestPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPool")
            .field("workers", &self.workers.len())
            .field("open", &self.sender.is_some())
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

impl RequestPool {
    /// Starts the runtime and its workers
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime threads cannot be spawned
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        let workers = config.workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("gm-request")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let queue: Queue = Arc::new(Mutex::new(receiver));
        let workers = (0..workers)
            .map(|worker| handle.spawn(work(worker, Arc::clone(&queue))))
            .collect();

        info!(
            workers = config.workers.max(1),
            queue_capacity = config.queue_capacity.max(1),
            "Request pool started"
        );

        Ok(Self {
            runtime: Some(runtime),
            handle,
            sender: Some(sender),
            queue,
            workers,
            grace: config.shutdown_grace(),
        })
    }

    /// Queues a request without waiting.
    ///
    /// A request that cannot be queued is reported to the script through
    /// `onerror` with its unsent state before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Full`] or [`PoolError::Closed`] when the request
    /// was refused
    pub fn submit(&self, request: XmlHttpRequest) -> Result<(), PoolError> {
        let Some(sender) = &self.sender else {
            warn!(request_id = %request.id(), "Request pool is shut down, refusing request");
            request.reject();
            return Err(PoolError::Closed);
        };

        match sender.try_send(request) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(request)) => {
                warn!(request_id = %request.id(), "Request queue is full, refusing request");
                request.reject();
                Err(PoolError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                warn!(request_id = %request.id(), "Request queue is closed, refusing request");
                request.reject();
                Err(PoolError::Closed)
            }
        }
    }

    /// Runs a request to completion on the calling thread
    ///
    /// # Errors
    ///
    /// Propagates environment failures from [`XmlHttpRequest::run`]
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context
    pub fn block_on(&self, request: XmlHttpRequest) -> Result<ResponseState, ExecutorError> {
        self.handle.block_on(request.run())
    }

    /// Stops accepting requests and waits up to the grace period for
    /// queued and in-flight requests to finish.
    ///
    /// Requests still running or waiting when the grace period ends are
    /// cancelled and reported through `onerror`.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context
    pub fn shutdown(mut self) {
        self.sender.take();
        let mut workers = std::mem::take(&mut self.workers);
        let queue = Arc::clone(&self.queue);
        let grace = self.grace;

        self.handle.block_on(async move {
            let mut joined = 0;
            let drained = tokio::time::timeout(grace, async {
                for worker in &mut workers {
                    if let Err(e) = worker.await {
                        error!(error = %e, "Request worker failed");
                    }
                    joined += 1;
                }
            })
            .await;
            if drained.is_ok() {
                return;
            }

            warn!(?grace, "Grace period elapsed with requests still running");
            let pending = &mut workers[joined..];
            for worker in pending.iter() {
                worker.abort();
            }
            for worker in pending {
                if let Err(e) = worker.await
                    && e.is_panic()
                {
                    error!(error = %e, "Request worker failed");
                }
            }

            let mut receiver = queue.lock().await;
            while let Ok(request) = receiver.try_recv() {
                warn!(request_id = %request.id(), "Request never started, refusing it");
                request.reject();
            }
        });

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        info!("Request pool stopped");
    }
}

impl Drop for RequestPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn work(worker: usize, queue: Queue) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(request) = next else {
            break;
        };
        let request_id = request.id();
        let in_flight = request.in_flight();
        let result = request.run().await;
        in_flight.finish();
        if let Err(e) = result {
            error!(%request_id, error = %e, "Request could not be executed");
        }
    }
    debug!(worker, "Request worker stopped");
}
