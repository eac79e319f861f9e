// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local stand-ins for the log stream and the syslog collector.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Handshake request as seen by the mock stream.
#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    /// Path and query, e.g. `/v1/stream?cid=...`
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded value of a query parameter.
    pub fn query(&self, key: &str) -> Option<String> {
        let url = Url::parse(&format!("ws://localhost{}", self.uri)).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// Websocket server playing one scripted session per accepted connection.
///
/// Every session but the last closes the connection after sending its
/// messages. The last session, and any connection past the script, stays open
/// until the client goes away.
#[derive(Clone)]
pub struct MockStream {
    pub addr: SocketAddr,
    pub received_requests: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl MockStream {
    pub async fn start(sessions: Vec<Vec<String>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock stream");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let received_requests = Arc::new(Mutex::new(Vec::new()));
        let requests = Arc::clone(&received_requests);

        tokio::spawn(async move {
            let mut index = 0usize;
            while let Ok((stream, _)) = listener.accept().await {
                let messages = sessions.get(index).cloned().unwrap_or_default();
                let keep_open = index + 1 >= sessions.len();
                index += 1;
                let requests = Arc::clone(&requests);

                tokio::spawn(async move {
                    let capture = |req: &Request, resp: Response| {
                        requests.lock().unwrap().push(ReceivedRequest {
                            uri: req.uri().to_string(),
                            headers: req
                                .headers()
                                .iter()
                                .map(|(k, v)| {
                                    (k.to_string(), v.to_str().unwrap_or("").to_string())
                                })
                                .collect(),
                        });
                        Ok::<_, ErrorResponse>(resp)
                    };

                    let Ok(mut ws) = accept_hdr_async(stream, capture).await else {
                        return;
                    };

                    for message in messages {
                        if ws.send(Message::text(message)).await.is_err() {
                            return;
                        }
                    }

                    if keep_open {
                        while let Some(Ok(_)) = ws.next().await {}
                    } else {
                        let _ = ws.close(None).await;
                    }
                });
            }
        });

        Self {
            addr,
            received_requests,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/v1/stream", self.addr)
    }

    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.received_requests.lock().unwrap().clone()
    }
}

/// TCP syslog collector recording every received line.
#[derive(Clone)]
pub struct MockCollector {
    pub addr: SocketAddr,
    pub lines: Arc<Mutex<Vec<String>>>,
}

impl MockCollector {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock collector");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let lines = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::clone(&lines);

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let received = Arc::clone(&received);
                tokio::spawn(async move {
                    let mut reader = BufReader::new(socket).lines();
                    while let Ok(Some(line)) = reader.next_line().await {
                        received.lock().unwrap().push(line);
                    }
                });
            }
        });

        Self { addr, lines }
    }

    /// Waits until at least `count` lines arrived, or panics after `timeout`.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let lines = self.lines.lock().unwrap().clone();
            if lines.len() >= count {
                return lines;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "collector received {} of {count} lines",
                lines.len()
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// One stream event in the vendor's layout.
pub fn event(ts: &str, ip: &str) -> String {
    serde_json::json!({
        "ts": ts,
        "guid": format!("guid-{ip}"),
        "connection": { "ip": ip, "host": "mx.example.com", "protocol": "smtp:smtp" },
        "filter": { "disposition": "continue", "routeDirection": "inbound" },
        "msg": { "sizeBytes": 4096 },
        "envelope": { "rcpts": ["alice@example.com", "bob@example.com"] }
    })
    .to_string()
}
