// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Forwarder workers: pop records off the shared queue, format them and send them
//! to the syslog collector.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::constants::POP_TIMEOUT;
use crate::format::MessageFormatter;
use crate::queue::EventQueue;
use crate::syslog::{SyslogClient, SyslogHeader};

/// One worker of the forwarder pool.
///
/// Each worker owns its collector connection. The connection is opened before a
/// record is taken from the queue, so records stay queued while the collector is
/// unreachable. A record whose send fails is lost; the worker drops the
/// connection and reconnects before taking the next one.
pub struct Forwarder {
    id: usize,
    queue: EventQueue,
    formatter: Arc<MessageFormatter>,
    collector_addr: String,
    header: SyslogHeader,
    pop_timeout: Duration,
    cancel_token: CancellationToken,
    client: Option<SyslogClient>,
}

impl Forwarder {
    #[must_use]
    pub fn new(
        id: usize,
        queue: EventQueue,
        formatter: Arc<MessageFormatter>,
        collector_addr: String,
        header: SyslogHeader,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            id,
            queue,
            formatter,
            collector_addr,
            header,
            pop_timeout: POP_TIMEOUT,
            cancel_token,
            client: None,
        }
    }

    /// Overrides how long a single pop waits before re-checking the exit signal.
    #[must_use]
    pub fn with_pop_timeout(mut self, pop_timeout: Duration) -> Self {
        self.pop_timeout = pop_timeout;
        self
    }

    /// Runs until the cancellation token fires. Returns the number of messages sent.
    pub async fn run(mut self) -> u64 {
        debug!("Forwarder {} started", self.id);
        let mut sent = 0u64;

        while !self.cancel_token.is_cancelled() {
            if self.client.is_none() {
                self.client = self.connect().await;
                continue;
            }

            let Some(record) = self.queue.pop(self.pop_timeout).await else {
                continue;
            };

            let line = match self.formatter.format(&record) {
                Ok(line) => line,
                Err(e) => {
                    error!("Forwarder {}: dropping record: {e}", self.id);
                    continue;
                }
            };

            let Some(client) = self.client.as_mut() else {
                continue;
            };
            match client.send(&line).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    error!(
                        "Forwarder {}: lost message after collector error: {e}",
                        self.id
                    );
                    self.client = None;
                }
            }
        }

        info!("Forwarder {} stopped after sending {sent} messages", self.id);
        sent
    }

    /// One connection attempt, abandoned if the exit signal fires first. The
    /// caller retries straight away on failure.
    async fn connect(&self) -> Option<SyslogClient> {
        let attempt = SyslogClient::connect(&self.collector_addr, self.header.clone());
        let result = tokio::select! {
            result = attempt => result,
            () = self.cancel_token.cancelled() => return None,
        };

        match result {
            Ok(client) => {
                debug!("Forwarder {} connected to {}", self.id, self.collector_addr);
                Some(client)
            }
            Err(e) => {
                warn!("Forwarder {}: {e}", self.id);
                // A refused loopback connect can complete without ever pending.
                tokio::task::yield_now().await;
                None
            }
        }
    }
}
