// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tokio_tungstenite::tungstenite;

/// Errors raised while decoding one inbound stream message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("message is not valid UTF-8")]
    NotUtf8,

    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,
}

/// Errors on the inbound websocket connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid stream URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] tungstenite::http::header::InvalidHeaderValue),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("connection closed by peer")]
    Closed,
}

/// Errors raised while mapping a record onto output fields.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("expected a byte count, got {0}")]
    InvalidByteCount(String),

    #[error("invalid timestamp {0}")]
    InvalidTimestamp(String),

    #[error("failed to map field '{field}': {source}")]
    Field {
        field: String,
        #[source]
        source: Box<TransformError>,
    },
}

/// Errors on the outbound syslog connection.
#[derive(Debug, thiserror::Error)]
pub enum TransmissionError {
    #[error("failed to connect to collector {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to send to collector: {0}")]
    Send(#[from] std::io::Error),
}

/// Errors from the checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid checkpoint value '{0}'")]
    InvalidValue(String),

    #[error("checkpoint store lock poisoned")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read field list {path}: {source}")]
    FieldsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that stop the supervisor from starting.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Services already started")]
    AlreadyStarted,

    #[error("Failed to start ingestion client: {0}")]
    IngestStart(#[from] ConnectionError),
}
