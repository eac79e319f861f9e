// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Renders an event record as a pipe-delimited collector line.
//!
//! The output field list decides both which fields appear and in what order. Each
//! field is either one of the fixed beat fields or looked up in the
//! [`FieldMappingTable`]; anything else in the list is skipped.

use std::path::Path;

use serde_json::Value;

use crate::constants::{FIELD_DELIMITER, MESSAGE_PREFIX, MISSING_VALUE};
use crate::errors::{ConfigError, TransformError};
use crate::mapping::FieldMappingTable;

const BEAT_NAME: &str = "webhookbeat";
const FULLY_QUALIFIED_BEAT_NAME: &str = "webhookbeat_webhook_ppod";

/// Reads the ordered output field list, one name per line.
pub fn load_field_list(path: impl AsRef<Path>) -> Result<Vec<String>, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FieldsFile {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse_field_list(&contents))
}

#[must_use]
pub fn parse_field_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn static_field(name: &str, record: &Value) -> Option<String> {
    match name {
        "beatname" | "device_type" => Some(BEAT_NAME.to_string()),
        "fullyqualifiedbeatname" => Some(FULLY_QUALIFIED_BEAT_NAME.to_string()),
        "whsdp" => Some("True".to_string()),
        "original_message" => Some(record.to_string()),
        _ => None,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => MISSING_VALUE.to_string(),
        other => other.to_string(),
    }
}

/// Keeps a value from breaking field or line framing.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|&c| c != FIELD_DELIMITER)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// Formats records for the collector. Shared read-only across forwarders.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    fields: Vec<String>,
    mapping: FieldMappingTable,
}

impl MessageFormatter {
    #[must_use]
    pub fn new(fields: Vec<String>, mapping: FieldMappingTable) -> Self {
        Self { fields, mapping }
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Builds `<prefix>|name=value|name=value...` for one record.
    ///
    /// A path missing from the record renders as [`MISSING_VALUE`]. A value that a
    /// transform cannot handle fails the whole record.
    pub fn format(&self, record: &Value) -> Result<String, TransformError> {
        let mut parts = Vec::with_capacity(self.fields.len() + 1);
        parts.push(MESSAGE_PREFIX.to_string());

        for name in &self.fields {
            let value = if let Some(value) = static_field(name, record) {
                value
            } else if let Some(mapping) = self.mapping.get(name) {
                match (mapping.resolve(record), mapping.transform) {
                    (None, _) => MISSING_VALUE.to_string(),
                    (Some(value), None) => render(value),
                    (Some(value), Some(transform)) => {
                        let transformed =
                            transform
                                .apply(value)
                                .map_err(|source| TransformError::Field {
                                    field: name.clone(),
                                    source: Box::new(source),
                                })?;
                        render(&transformed)
                    }
                }
            } else {
                continue;
            };
            parts.push(format!("{name}={}", sanitize(&value)));
        }

        Ok(parts.join(&FIELD_DELIMITER.to_string()))
    }
}
