// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Field mapping table: output field name to record path plus optional transform.

use std::collections::HashMap;

use serde_json::Value;

use crate::transform::Transform;

/// Default separator between path segments.
pub const PATH_SEPARATOR: char = '.';

/// How one output field is extracted from an event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub name: String,
    pub path: String,
    pub separator: char,
    pub transform: Option<Transform>,
}

impl FieldMapping {
    #[must_use]
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            separator: PATH_SEPARATOR,
            transform: None,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// For vendor keys that themselves contain dots.
    #[must_use]
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Looks up this mapping's path in `record`.
    #[must_use]
    pub fn resolve<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        resolve_path(record, &self.path, self.separator)
    }
}

/// Walks `path` through nested objects. Numeric segments index into arrays.
#[must_use]
pub fn resolve_path<'a>(record: &'a Value, path: &str, separator: char) -> Option<&'a Value> {
    path.split(separator).try_fold(record, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Read-only set of field mappings, shared by every forwarder.
#[derive(Debug, Clone, Default)]
pub struct FieldMappingTable {
    entries: HashMap<String, FieldMapping>,
}

impl FieldMappingTable {
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = FieldMapping>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.name.clone(), entry))
                .collect(),
        }
    }

    /// Mapping of PPoD message events onto LogRhythm webhook beat fields.
    #[must_use]
    pub fn ppod_default() -> Self {
        Self::new([
            FieldMapping::new("action", "filter.disposition"),
            FieldMapping::new("kilobytes", "msg.sizeBytes")
                .with_transform(Transform::BytesToKilobytes),
            FieldMapping::new("protname", "connection.protocol"),
            FieldMapping::new("sender", "msg.normalizedHeader.from.0"),
            FieldMapping::new("recipient", "envelope.rcpts")
                .with_transform(Transform::JoinRecipients),
            FieldMapping::new("serialnumber", "msg.normalizedHeader.message-id.0"),
            FieldMapping::new("sip", "connection.ip"),
            FieldMapping::new("sname", "connection.host"),
            FieldMapping::new("status", "filter.routeDirection"),
            FieldMapping::new("subject", "msg.normalizedHeader.subject.0"),
            FieldMapping::new("tag1", "filter.disposition"),
            FieldMapping::new("tag2", "filter.routeDirection"),
            FieldMapping::new("timestamp.iso8601", "ts")
                .with_transform(Transform::NormalizeTimestamp),
            FieldMapping::new("vendorinfo", "filter.actions.0.rule"),
        ])
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldMapping> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
