// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Supervisor for the bridge.
//!
//! Owns the shared queue and the cancellation token, spawns the forwarder pool,
//! the queue feeder and the ingestion client, then waits for a reason to stop.
//!
//! # Lifecycle
//!
//! 1. **Start** (`start()`): forwarders first so they are already waiting on the
//!    queue, then the feeder, then the ingestion client.
//! 2. **Wait** (`wait_for_shutdown()`): Ctrl+C, SIGTERM, a [`SupervisorHandle`]
//!    request, or the ingestion task ending on its own. The queue depth is logged
//!    periodically in the meantime.
//! 3. **Shutdown** (`shutdown()`): cancel the token, then join every task with a
//!    bounded wait and abort whatever does not stop in time.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::constants::{JOIN_TIMEOUT, POP_TIMEOUT, QUEUE_CHECK_INTERVAL, WORKER_COUNT};
use crate::errors::SupervisorError;
use crate::format::MessageFormatter;
use crate::forwarder::Forwarder;
use crate::ingest::{IngestClient, StreamConfig};
use crate::queue::EventQueue;
use crate::syslog::SyslogHeader;

/// Reasons for the bridge to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Requested through a [`SupervisorHandle`].
    Requested,
    /// Ctrl+C
    UserInterrupt,
    /// SIGTERM
    Terminated,
    /// The ingestion task ended without being asked to.
    IngestStopped,
    /// A signal listener could not be installed.
    FatalError,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub stream: StreamConfig,
    /// `host:port` of the syslog collector.
    pub collector_addr: String,
    pub header: SyslogHeader,
    pub worker_count: usize,
    pub pop_timeout: Duration,
    pub queue_check_interval: Duration,
    /// Bounded wait per task during shutdown.
    pub join_timeout: Duration,
}

impl SupervisorConfig {
    #[must_use]
    pub fn new(stream: StreamConfig, collector_addr: String) -> Self {
        Self {
            stream,
            collector_addr,
            header: SyslogHeader::default(),
            worker_count: WORKER_COUNT,
            pop_timeout: POP_TIMEOUT,
            queue_check_interval: QUEUE_CHECK_INTERVAL,
            join_timeout: JOIN_TIMEOUT,
        }
    }
}

/// Handle to a running bridge, used to request shutdown from elsewhere.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    cancel_token: CancellationToken,
}

impl SupervisorHandle {
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    formatter: Arc<MessageFormatter>,
    queue: EventQueue,
    cancel_token: CancellationToken,
    ingest_task: Option<JoinHandle<Checkpoint>>,
    feeder_task: Option<JoinHandle<()>>,
    worker_tasks: Vec<JoinHandle<u64>>,
    started: bool,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: SupervisorConfig, formatter: MessageFormatter) -> Self {
        Self {
            config,
            formatter: Arc::new(formatter),
            queue: EventQueue::new(),
            cancel_token: CancellationToken::new(),
            ingest_task: None,
            feeder_task: None,
            worker_tasks: Vec::new(),
            started: false,
        }
    }

    #[must_use]
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            cancel_token: self.cancel_token.clone(),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Spawns every task. Fails without spawning anything if the ingestion client
    /// cannot be built.
    pub fn start(&mut self, store: Box<dyn CheckpointStore>) -> Result<(), SupervisorError> {
        if self.started {
            return Err(SupervisorError::AlreadyStarted);
        }

        let (producer, feeder) = self.queue.producer(self.cancel_token.clone());
        let ingest = IngestClient::new(
            self.config.stream.clone(),
            store,
            producer,
            self.queue.clone(),
            self.cancel_token.clone(),
        )?;
        self.started = true;

        info!(
            "Starting {} forwarders for collector {}",
            self.config.worker_count, self.config.collector_addr
        );
        for id in 0..self.config.worker_count {
            let forwarder = Forwarder::new(
                id,
                self.queue.clone(),
                Arc::clone(&self.formatter),
                self.config.collector_addr.clone(),
                self.config.header.clone(),
                self.cancel_token.clone(),
            )
            .with_pop_timeout(self.config.pop_timeout);
            self.worker_tasks.push(tokio::spawn(forwarder.run()));
        }

        self.feeder_task = Some(tokio::spawn(feeder.run()));

        info!("Starting ingestion from checkpoint {}", ingest.checkpoint());
        self.ingest_task = Some(tokio::spawn(ingest.run()));
        Ok(())
    }

    /// Blocks until something asks the bridge to stop.
    pub async fn wait_for_shutdown(&mut self) -> ShutdownReason {
        let cancel_token = self.cancel_token.clone();
        let queue = self.queue.clone();
        let period = self.config.queue_check_interval;
        let mut ticker = interval_at(Instant::now() + period, period);

        let reason = {
            let ingest_task = &mut self.ingest_task;
            let ingest_finished = async {
                match ingest_task.as_mut() {
                    Some(task) => task.await,
                    None => future::pending().await,
                }
            };
            let ctrl_c = tokio::signal::ctrl_c();
            let terminated = terminated();
            tokio::pin!(ingest_finished, ctrl_c, terminated);

            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        info!("Shutdown requested via cancellation token");
                        break ShutdownReason::Requested;
                    }
                    result = &mut ctrl_c => {
                        match result {
                            Ok(()) => {
                                info!("Received Ctrl+C, initiating shutdown");
                                break ShutdownReason::UserInterrupt;
                            }
                            Err(e) => {
                                error!("Failed to listen for Ctrl+C: {e}");
                                break ShutdownReason::FatalError;
                            }
                        }
                    }
                    reason = &mut terminated => break reason,
                    result = &mut ingest_finished => {
                        match result {
                            Ok(checkpoint) => warn!("Ingestion stopped at checkpoint {checkpoint}"),
                            Err(e) => error!("Ingestion task failed: {e}"),
                        }
                        break ShutdownReason::IngestStopped;
                    }
                    _ = ticker.tick() => {
                        info!("Log queue contains approximately {} messages.", queue.len());
                    }
                }
            }
        };

        if reason == ShutdownReason::IngestStopped {
            self.ingest_task = None;
        }
        reason
    }

    /// Stops every task. The ingestion client is joined first so it can persist
    /// its final checkpoint.
    pub async fn shutdown(&mut self) {
        info!("Initiating shutdown");
        self.cancel_token.cancel();
        let join_timeout = self.config.join_timeout;

        if let Some(task) = self.ingest_task.take() {
            if let Some(checkpoint) = join_with_timeout("ingestion", task, join_timeout).await {
                info!("Ingestion stopped at checkpoint {checkpoint}");
            }
        }

        if let Some(task) = self.feeder_task.take() {
            join_with_timeout("queue feeder", task, join_timeout).await;
        }

        let mut sent = 0u64;
        for (idx, task) in std::mem::take(&mut self.worker_tasks).into_iter().enumerate() {
            if let Some(count) = join_with_timeout(&format!("forwarder {idx}"), task, join_timeout).await
            {
                sent += count;
            }
        }

        info!(
            "Shutdown complete: {sent} messages sent, {} left in queue",
            self.queue.len()
        );
    }

    /// Start, wait, shut down.
    pub async fn run(
        mut self,
        store: Box<dyn CheckpointStore>,
    ) -> Result<ShutdownReason, SupervisorError> {
        self.start(store)?;
        let reason = self.wait_for_shutdown().await;
        debug!("Shutting down: {reason:?}");
        self.shutdown().await;
        Ok(reason)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.cancel_token.cancel();

        if let Some(task) = &self.ingest_task {
            task.abort();
        }
        if let Some(task) = &self.feeder_task {
            task.abort();
        }
        for task in &self.worker_tasks {
            task.abort();
        }
    }
}

async fn join_with_timeout<T>(
    name: &str,
    mut task: JoinHandle<T>,
    join_timeout: Duration,
) -> Option<T> {
    match tokio::time::timeout(join_timeout, &mut task).await {
        Ok(Ok(value)) => {
            debug!("Task {name} completed");
            Some(value)
        }
        Ok(Err(e)) => {
            error!("Task {name} failed: {e}");
            None
        }
        Err(_) => {
            warn!("Task {name} did not stop within {join_timeout:?}, aborting");
            task.abort();
            None
        }
    }
}

#[cfg(unix)]
async fn terminated() -> ShutdownReason {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
            info!("Received SIGTERM, initiating shutdown");
            ShutdownReason::Terminated
        }
        Err(e) => {
            error!("Failed to listen for SIGTERM: {e}");
            future::pending().await
        }
    }
}

#[cfg(not(unix))]
async fn terminated() -> ShutdownReason {
    future::pending().await
}
