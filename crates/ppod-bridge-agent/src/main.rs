// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;

use tracing::{debug, error, info};

use ppod_bridge::{
    checkpoint::SqliteCheckpointStore,
    config::BridgeConfig,
    format::{load_field_list, MessageFormatter},
    logger::{self, Formatter},
    mapping::FieldMappingTable,
    supervisor::Supervisor,
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("PPOD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = match logger::env_filter(&log_level) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return;
        }
    };

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .event_format(Formatter)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return;
    }

    debug!("Logging subsystem enabled");

    let config = match BridgeConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error loading bridge configuration: {e}");
            return;
        }
    };

    let fields = match load_field_list(&config.fields_file) {
        Ok(fields) => fields,
        Err(e) => {
            error!("{e}");
            return;
        }
    };
    let formatter = MessageFormatter::new(fields, FieldMappingTable::ppod_default());
    info!(
        "Loaded {} output fields from {}",
        formatter.fields().len(),
        config.fields_file.display()
    );

    let store = match SqliteCheckpointStore::open(&config.checkpoint_db) {
        Ok(store) => store,
        Err(e) => {
            error!(
                "Failed to open checkpoint database {}: {e}",
                config.checkpoint_db.display()
            );
            return;
        }
    };

    let supervisor = Supervisor::new(config.supervisor_config(), formatter);

    match supervisor.run(Box::new(store)).await {
        Ok(reason) => info!("Bridge stopped: {reason:?}"),
        Err(e) => error!("Bridge failed to start: {e}"),
    }
}
