// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ingestion client for the PPoD log stream.
//!
//! Keeps a websocket open to the stream, decodes every frame into an
//! [`EventRecord`], advances the [`Checkpoint`] and hands the record to the queue
//! producer. Any close or transport error leads straight to a new connection,
//! without backoff, until the cancellation token fires. When the stored
//! checkpoint is more than an hour old the new connection asks for a replay
//! with `sinceTime`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{
    HeaderValue, AUTHORIZATION, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_KEY,
};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::checkpoint::{parse_timestamp, Checkpoint, CheckpointStore};
use crate::constants::{CHECKPOINT_INTERVAL, STREAM_MESSAGE_TYPE, WS_EXTENSIONS, WS_KEY};
use crate::errors::{ConnectionError, DecodeError};
use crate::queue::{EventQueue, QueueProducer};
use crate::EventRecord;

/// Connection settings for the log stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Base websocket URL, without query string.
    pub url: String,
    /// Cluster id sent as the `cid` query parameter.
    pub cluster_id: String,
    /// Bearer token.
    pub api_key: String,
    /// Records with a `ts` field between two checkpoint writes.
    pub checkpoint_interval: u64,
}

impl StreamConfig {
    #[must_use]
    pub fn new(url: &str, cluster_id: &str, api_key: &str) -> Self {
        Self {
            url: url.to_string(),
            cluster_id: cluster_id.to_string(),
            api_key: api_key.to_string(),
            checkpoint_interval: CHECKPOINT_INTERVAL,
        }
    }
}

/// Result of decoding one stream message.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub record: EventRecord,
    pub checkpoint: Checkpoint,
    /// Whether the record carried a `ts` field.
    pub has_timestamp: bool,
}

/// Decodes `payload` and returns the record with the checkpoint advanced past its
/// `ts`, if any.
///
/// A `ts` that cannot be parsed leaves the checkpoint where it was; the record is
/// still forwarded.
pub fn decode_message(payload: &str, checkpoint: Checkpoint) -> Result<Decoded, DecodeError> {
    let record: EventRecord = serde_json::from_str(payload)?;
    if !record.is_object() {
        return Err(DecodeError::NotAnObject);
    }

    let (checkpoint, has_timestamp) = match record.get("ts") {
        None => (checkpoint, false),
        Some(ts) => match ts.as_str().and_then(parse_timestamp) {
            Some(ts) => (checkpoint.advance(ts), true),
            None => {
                warn!("Ignoring unparseable event timestamp {ts}");
                (checkpoint, true)
            }
        },
    };

    Ok(Decoded {
        record,
        checkpoint,
        has_timestamp,
    })
}

/// Builds the stream URL for a connection attempt made at `now`.
#[must_use]
pub fn build_stream_url(
    base: &Url,
    cluster_id: &str,
    checkpoint: Checkpoint,
    now: DateTime<Utc>,
) -> Url {
    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        query.append_pair("cid", cluster_id);
        query.append_pair("type", STREAM_MESSAGE_TYPE);
        if checkpoint.needs_replay(now) {
            query.append_pair("sinceTime", &checkpoint.since_time());
        }
    }
    url
}

/// Adds the bearer token and the fixed handshake headers the stream expects.
pub fn build_request(url: &Url, api_key: &str) -> Result<Request, ConnectionError> {
    let mut request = url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {api_key}"))?,
    );
    headers.insert(SEC_WEBSOCKET_KEY, HeaderValue::from_static(WS_KEY));
    headers.insert(
        SEC_WEBSOCKET_EXTENSIONS,
        HeaderValue::from_static(WS_EXTENSIONS),
    );
    Ok(request)
}

/// Long-running reader of the log stream.
pub struct IngestClient {
    base_url: Url,
    config: StreamConfig,
    store: Arc<dyn CheckpointStore>,
    checkpoint: Checkpoint,
    producer: QueueProducer,
    queue: EventQueue,
    cancel_token: CancellationToken,
    timestamped: u64,
}

impl IngestClient {
    /// Creates the client and restores the persisted checkpoint.
    ///
    /// A checkpoint that cannot be read is logged and replaced with the first-run
    /// sentinel, so the stream starts live instead of failing.
    pub fn new(
        config: StreamConfig,
        store: Box<dyn CheckpointStore>,
        producer: QueueProducer,
        queue: EventQueue,
        cancel_token: CancellationToken,
    ) -> Result<Self, ConnectionError> {
        let base_url = Url::parse(&config.url).map_err(|e| ConnectionError::InvalidUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;

        let checkpoint = store.load().unwrap_or_else(|e| {
            error!("Failed to restore checkpoint, starting from live data: {e}");
            Checkpoint::sentinel()
        });

        Ok(Self {
            base_url,
            config,
            store: Arc::from(store),
            checkpoint,
            producer,
            queue,
            cancel_token,
            timestamped: 0,
        })
    }

    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    /// Reconnect loop. Returns once the cancellation token fires.
    pub async fn run(mut self) -> Checkpoint {
        while !self.cancel_token.is_cancelled() {
            let url = build_stream_url(
                &self.base_url,
                &self.config.cluster_id,
                self.checkpoint,
                Utc::now(),
            );
            info!("Connecting to {} ...", redact_query(&url));

            match self.stream_session(&url).await {
                Ok(()) => debug!("Stream session ended"),
                Err(ConnectionError::Closed) => {
                    warn!("Connection to websocket unexpectedly closed. Retrying connection...");
                }
                Err(e) => error!("Stream connection failed: {e}"),
            }
        }

        self.persist_checkpoint().await;
        info!("Ingestion client stopped at checkpoint {}", self.checkpoint);
        self.checkpoint
    }

    /// One connection: handshake, then read until close, error or cancellation.
    async fn stream_session(&mut self, url: &Url) -> Result<(), ConnectionError> {
        let request = build_request(url, &self.config.api_key)?;

        let (mut stream, _) = tokio::select! {
            connected = connect_async(request) => connected?,
            () = self.cancel_token.cancelled() => return Ok(()),
        };
        info!("Connected!");

        loop {
            let frame = tokio::select! {
                frame = stream.next() => frame,
                () = self.cancel_token.cancelled() => {
                    if let Err(e) = stream.close(None).await {
                        debug!("Error closing stream on shutdown: {e}");
                    }
                    return Ok(());
                }
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.process_message(text.as_str()).await,
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.process_message(text).await,
                    Err(_) => error!("Dropping stream message: {}", DecodeError::NotUtf8),
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!("Stream sent close frame: {frame:?}");
                    return Err(ConnectionError::Closed);
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ConnectionError::Closed),
            }
        }
    }

    async fn process_message(&mut self, payload: &str) {
        let decoded = match decode_message(payload, self.checkpoint) {
            Ok(decoded) => decoded,
            Err(e) => {
                error!("Dropping stream message: {e}");
                return;
            }
        };

        self.checkpoint = decoded.checkpoint;
        self.producer.push(decoded.record);

        if decoded.has_timestamp {
            self.timestamped += 1;
            if self.timestamped % self.config.checkpoint_interval.max(1) == 0 {
                self.persist_checkpoint().await;
                info!(
                    "{} additional messages pulled; Log queue contains approximately {} messages.",
                    self.config.checkpoint_interval,
                    self.queue.len()
                );
            }
        }
    }

    /// Writes the checkpoint on the blocking pool. The reader waits for the write,
    /// so saves land in order.
    async fn persist_checkpoint(&self) {
        if self.checkpoint.is_sentinel() {
            return;
        }
        let store = Arc::clone(&self.store);
        let checkpoint = self.checkpoint;
        match tokio::task::spawn_blocking(move || store.save(checkpoint)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to persist checkpoint {checkpoint}: {e}"),
            Err(e) => error!("Checkpoint write task failed: {e}"),
        }
    }
}

/// The cluster id is the only identifying value in the query; keep it out of logs.
fn redact_query(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "cid" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}
