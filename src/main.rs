mod address;
mod config;
mod models;
mod mqtt_service;
mod render;
mod service_utils;
mod tls;
mod topics;

use crate::address::resolve_target;
use crate::config::Config;
use crate::models::{ConnectionTarget, SubscriptionRequest};
use crate::mqtt_service::{MqttService, SessionError};
use crate::service_utils::{capture_local_offset, default_client_id, handle_shutdown, init_logging};
use crate::topics::plan_subscriptions;
use std::process::ExitCode;
use tracing::{error, info};

const EXIT_STARTUP_ERROR: u8 = 1;
const EXIT_INVALID_HOST: u8 = 2;

fn main() -> ExitCode {
    // Before the runtime spawns threads; see `capture_local_offset`.
    capture_local_offset();
    init_logging();

    let (config, qos) = match Config::load().and_then(|cfg| cfg.qos().map(|qos| (cfg, qos))) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(EXIT_STARTUP_ERROR);
        }
    };

    let target = match resolve_target(&config.host, config.port) {
        Ok(target) => target,
        Err(e) => {
            println!("Invalid host: {}", e);
            return ExitCode::from(EXIT_INVALID_HOST);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::from(EXIT_STARTUP_ERROR);
        }
    };

    let subscriptions = plan_subscriptions(&config.selection(), qos);

    match runtime.block_on(run(config, target, subscriptions)) {
        Ok(()) => {
            info!("Sniffer shut down.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Connection error: {}", e);
            ExitCode::from(EXIT_STARTUP_ERROR)
        }
    }
}

async fn run(
    config: Config,
    target: ConnectionTarget,
    subscriptions: Vec<SubscriptionRequest>,
) -> Result<(), SessionError> {
    let client_id = config.client_id.clone().unwrap_or_else(default_client_id);

    println!("{}", connecting_line(&target));
    let service = MqttService::new(
        &client_id,
        &target,
        config.credentials(),
        subscriptions,
        &config.session_settings(),
        std::io::stdout(),
    )?;

    service.run(handle_shutdown()).await
}

fn connecting_line(target: &ConnectionTarget) -> String {
    let tls = if target.use_encryption { "True" } else { "False" };
    format!("Connecting to {}:{} TLS={}", target.host, target.port, tls)
}
