// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Log stream endpoint, without query string.
pub const DEFAULT_STREAM_URL: &str = "wss://logstream.proofpoint.com:443/v1/stream";

/// The log stream API documents this key as static for every customer.
pub const WS_KEY: &str = "SGVsbG8sIHdvcmxkIQ==";
pub const WS_EXTENSIONS: &str = "client_no_context_takeover; server_no_context_takeover";
pub const STREAM_MESSAGE_TYPE: &str = "message";

/// Vendor timestamp layout, e.g. `2024-01-01T00:00:00.000000+0000`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%z";
pub const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// A checkpoint older than this is replayed from with `sinceTime`.
pub const REPLAY_THRESHOLD_SECS: i64 = 3600;

/// Records carrying a `ts` between two checkpoint writes.
pub const CHECKPOINT_INTERVAL: u64 = 10_000;
pub const CHECKPOINT_KEY: &str = "LAST_TIMESTAMP";
pub const CHECKPOINT_DB: &str = "runtime_cfg.sqlite";

pub const FIELDS_FILE: &str = "LR_Syslog_Fields.txt";

pub const SYSLOG_PORT: u16 = 514;
/// daemon
pub const SYSLOG_FACILITY: u8 = 3;
/// notice
pub const SYSLOG_SEVERITY: u8 = 5;
pub const SYSLOG_APP_NAME: &str = "ppod-bridge";

/// Matches the line layout the Open Collector emits for webhook beats.
pub const MESSAGE_PREFIX: &str = "./image.binary[1]: ";
pub const FIELD_DELIMITER: char = '|';
pub const MISSING_VALUE: &str = "None";

pub const WORKER_COUNT: usize = 5;
pub const POP_TIMEOUT: Duration = Duration::from_secs(1);
pub const QUEUE_CHECK_INTERVAL: Duration = Duration::from_secs(300);
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);
