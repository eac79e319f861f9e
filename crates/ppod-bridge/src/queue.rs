// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event queue between the ingestion client and the forwarder pool.
//!
//! ```text
//!   read loop ──push──> QueueProducer ──(buffer)──> QueueFeeder ──push──> EventQueue
//!                                                                          │ pop
//!                                                       forwarder 1..N <───┘
//! ```
//!
//! The read loop only ever touches the producer buffer, which never blocks. The
//! feeder task is the single writer into the shared queue, where forwarders compete
//! for records.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::EventRecord;

/// FIFO of event records with competing consumers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<EventRecord>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<EventRecord>>>,
    depth: Arc<AtomicUsize>,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Appends a record. Never blocks.
    pub fn push(&self, record: EventRecord) {
        self.depth.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(record).is_err() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            error!("Event queue receiver dropped, record lost");
        }
    }

    /// Takes the oldest record, waiting at most `wait`. Each record goes to exactly
    /// one caller.
    pub async fn pop(&self, wait: Duration) -> Option<EventRecord> {
        let received = tokio::time::timeout(wait, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await;

        match received {
            Ok(Some(record)) => {
                self.depth.fetch_sub(1, Ordering::AcqRel);
                Some(record)
            }
            _ => None,
        }
    }

    /// Approximate number of queued records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates the buffered producer side and the feeder task that drains it into
    /// this queue until `cancel_token` fires.
    #[must_use]
    pub fn producer(&self, cancel_token: CancellationToken) -> (QueueProducer, QueueFeeder) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feeder = QueueFeeder {
            rx,
            queue: self.clone(),
            cancel_token,
        };
        (QueueProducer { tx }, feeder)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer-side buffer owned by the ingestion read loop.
#[derive(Debug)]
pub struct QueueProducer {
    tx: mpsc::UnboundedSender<EventRecord>,
}

impl QueueProducer {
    /// Buffers a record for the feeder. Never blocks.
    pub fn push(&self, record: EventRecord) {
        if self.tx.send(record).is_err() {
            error!("Queue feeder stopped, record lost");
        }
    }
}

/// Background task moving buffered records into the shared [`EventQueue`].
#[derive(Debug)]
pub struct QueueFeeder {
    rx: mpsc::UnboundedReceiver<EventRecord>,
    queue: EventQueue,
    cancel_token: CancellationToken,
}

impl QueueFeeder {
    pub async fn run(mut self) {
        debug!("Queue feeder started");

        loop {
            tokio::select! {
                record = self.rx.recv() => match record {
                    Some(record) => self.queue.push(record),
                    None => {
                        debug!("Queue producer dropped, feeder finished");
                        return;
                    }
                },
                () = self.cancel_token.cancelled() => {
                    // Whatever is already buffered still reaches the queue.
                    let mut drained = 0usize;
                    while let Ok(record) = self.rx.try_recv() {
                        self.queue.push(record);
                        drained += 1;
                    }
                    debug!("Queue feeder shutting down, drained {drained} buffered records");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_pop_preserves_fifo_order() {
        let queue = EventQueue::new();
        for i in 0..5 {
            queue.push(json!({ "n": i }));
        }
        assert_eq!(queue.len(), 5);

        for i in 0..5 {
            assert_eq!(queue.pop(WAIT).await.unwrap(), json!({ "n": i }));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pop_times_out_when_empty() {
        let queue = EventQueue::new();
        let started = tokio::time::Instant::now();
        assert!(queue.pop(WAIT).await.is_none());
        assert!(started.elapsed() >= WAIT);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_competing_consumers_receive_each_record_once() {
        let queue = EventQueue::new();
        let total = 500;
        for i in 0..total {
            queue.push(json!(i));
        }

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(record) = queue.pop(WAIT).await {
                    seen.push(record.as_i64().unwrap());
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            let seen = consumer.await.unwrap();
            // Each consumer observes insertion order for its own share.
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
            all.extend(seen);
        }
        assert_eq!(all.len(), total);
        assert_eq!(all.into_iter().collect::<HashSet<_>>().len(), total);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_feeder_moves_buffered_records() {
        let queue = EventQueue::new();
        let cancel_token = CancellationToken::new();
        let (producer, feeder) = queue.producer(cancel_token.clone());
        let feeder_task = tokio::spawn(feeder.run());

        producer.push(json!("a"));
        producer.push(json!("b"));

        assert_eq!(queue.pop(Duration::from_secs(1)).await.unwrap(), json!("a"));
        assert_eq!(queue.pop(Duration::from_secs(1)).await.unwrap(), json!("b"));

        cancel_token.cancel();
        feeder_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_feeder_drains_on_cancel() {
        let queue = EventQueue::new();
        let cancel_token = CancellationToken::new();
        let (producer, feeder) = queue.producer(cancel_token.clone());

        producer.push(json!(1));
        producer.push(json!(2));
        cancel_token.cancel();
        feeder.run().await;

        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_feeder_stops_when_producer_dropped() {
        let queue = EventQueue::new();
        let (producer, feeder) = queue.producer(CancellationToken::new());
        producer.push(json!(1));
        drop(producer);

        feeder.run().await;
        assert_eq!(queue.len(), 1);
    }
}
