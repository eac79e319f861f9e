// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimal RFC 5424 syslog client over a persistent TCP connection.

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::debug;

use crate::constants::{SYSLOG_APP_NAME, SYSLOG_FACILITY, SYSLOG_SEVERITY};
use crate::errors::TransmissionError;

/// Header fields that stay fixed for the lifetime of a client.
#[derive(Debug, Clone)]
pub struct SyslogHeader {
    pub facility: u8,
    pub severity: u8,
    pub hostname: String,
    pub app_name: String,
    pub proc_id: u32,
}

impl Default for SyslogHeader {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "-".to_string());
        Self {
            facility: SYSLOG_FACILITY,
            severity: SYSLOG_SEVERITY,
            hostname,
            app_name: SYSLOG_APP_NAME.to_string(),
            proc_id: std::process::id(),
        }
    }
}

impl SyslogHeader {
    #[must_use]
    pub fn priority(&self) -> u16 {
        u16::from(self.facility) * 8 + u16::from(self.severity)
    }

    /// Renders one newline-terminated RFC 5424 line.
    #[must_use]
    pub fn frame(&self, timestamp: DateTime<Utc>, message: &str) -> String {
        format!(
            "<{}>1 {} {} {} {} - - {}\n",
            self.priority(),
            timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.hostname,
            self.app_name,
            self.proc_id,
            message
        )
    }
}

/// An open connection to the collector.
#[derive(Debug)]
pub struct SyslogClient {
    stream: BufWriter<TcpStream>,
    header: SyslogHeader,
}

impl SyslogClient {
    pub async fn connect(addr: &str, header: SyslogHeader) -> Result<Self, TransmissionError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransmissionError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true).map_err(TransmissionError::Send)?;
        debug!("Connected to syslog collector {addr}");
        Ok(Self {
            stream: BufWriter::new(stream),
            header,
        })
    }

    /// Writes and flushes one message.
    pub async fn send(&mut self, message: &str) -> Result<(), TransmissionError> {
        let line = self.header.frame(Utc::now(), message);
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
