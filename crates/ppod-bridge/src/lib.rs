// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bridge between the Proofpoint on Demand (PPoD) log stream and a syslog collector.
//!
//! One ingestion client reads the vendor websocket, a pool of forwarders turns each
//! event into a pipe-delimited syslog line, and the supervisor ties their lifecycles
//! together through a shared [`tokio_util::sync::CancellationToken`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod errors;
pub mod format;
pub mod forwarder;
pub mod ingest;
pub mod logger;
pub mod mapping;
pub mod queue;
pub mod supervisor;
pub mod syslog;
pub mod transform;

/// One decoded security event as delivered by the log stream.
pub type EventRecord = serde_json::Value;
