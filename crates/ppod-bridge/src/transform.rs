// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Named value transforms that a field mapping can apply to a resolved value.

use std::fmt;

use serde_json::Value;

use crate::checkpoint::parse_timestamp;
use crate::errors::TransformError;

/// Closed set of transforms, addressed by identifier in mapping tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    /// Integer byte count divided by 1000, rendered as a decimal.
    BytesToKilobytes,
    /// Recipient arrays joined with `;`. Scalars pass through unchanged.
    JoinRecipients,
    /// Vendor timestamp converted to Unix seconds.
    NormalizeTimestamp,
}

impl Transform {
    #[must_use]
    pub fn identifier(self) -> &'static str {
        match self {
            Self::BytesToKilobytes => "bytes2kilobytes",
            Self::JoinRecipients => "join_recipients",
            Self::NormalizeTimestamp => "normalize_time",
        }
    }

    pub fn apply(self, value: &Value) -> Result<Value, TransformError> {
        match self {
            Self::BytesToKilobytes => bytes_to_kilobytes(value),
            Self::JoinRecipients => Ok(join_recipients(value)),
            Self::NormalizeTimestamp => normalize_timestamp(value),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

fn bytes_to_kilobytes(value: &Value) -> Result<Value, TransformError> {
    let bytes = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| TransformError::InvalidByteCount(value.to_string()))?;

    Ok(Value::from(bytes as f64 / 1000.0))
}

fn join_recipients(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::String(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(";"),
        ),
        other => other.clone(),
    }
}

fn normalize_timestamp(value: &Value) -> Result<Value, TransformError> {
    value
        .as_str()
        .and_then(parse_timestamp)
        .map(|ts| Value::from(ts.timestamp()))
        .ok_or_else(|| TransformError::InvalidTimestamp(value.to_string()))
}
