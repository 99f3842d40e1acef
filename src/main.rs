use chrono::Local;
use dotenv::dotenv;
use log::{error, info, warn};
use std::env;
use std::path::{Path, PathBuf};

mod config;
mod error;
mod models;
mod repositories;
mod services;
mod utils;

use crate::config::Config;
use crate::repositories::snapshot_repository::{self, SNAPSHOT_PREFIX};
use crate::services::hive_rpc::HiveClient;
use crate::services::{notifier, payments, payout_engine};
use crate::utils::helpers::round3;
use crate::utils::logging;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let run_stamp = Local::now().format("%m-%d-%Y_%H-%M-%S").to_string();
    let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    let log_path = match logging::init(Path::new(&log_dir), &run_stamp) {
        Ok(path) => Some(path),
        Err(e) => {
            env_logger::init();
            warn!("Could not open a run log file under {}: {}", log_dir, e);
            None
        }
    };

    info!("Starting delegation payout run {}", run_stamp);

    // The only failure that aborts before finalization: without configuration
    // there is neither work to do nor anywhere to deliver results.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return;
        }
    };

    let snapshot = run(&config, &run_stamp).await;

    // Finalization always runs, delivering whatever this run produced.
    let mut files: Vec<&Path> = Vec::new();
    if let Some(path) = &snapshot {
        files.push(path);
    }
    if let Some(path) = &log_path {
        files.push(path);
    }
    let caption = format!("Delegation payout run {}", run_stamp);
    notifier::deliver_artifacts(&config, &caption, &files).await;

    info!("Run complete.");
}

/// One sequential payout run. Each stage logs its own failure; a stage whose
/// output is required downstream ends the run early (returning without a
/// snapshot), the rest degrade to defaults and continue.
async fn run(config: &Config, run_stamp: &str) -> Option<PathBuf> {
    let client = HiveClient::new(&config.hive_node);

    info!("Fetching VESTS->HP exchange ratio snapshot...");
    let ratio = match client.vesting_ratio().await {
        Ok(ratio) => ratio,
        Err(e) => {
            error!("Error fetching exchange ratio: {}", e);
            return None;
        }
    };

    info!("Fetching own HP for {}...", config.receiver_account);
    let own_hp = match client.account_hp(&config.receiver_account, &ratio).await {
        Ok(hp) => round3(hp),
        Err(e) => {
            error!("Error fetching own HP: {}", e);
            0.0
        }
    };

    info!("Fetching latest snapshot...");
    let latest = snapshot_repository::latest_snapshot(&config.data_dir, SNAPSHOT_PREFIX);
    let previous_own_hp = round3(snapshot_repository::previous_own_hp(
        latest.as_deref(),
        &config.receiver_account,
    ));
    let earnings = round3(own_hp - previous_own_hp);
    info!("Earnings for the period: {} HP", earnings);

    info!("Fetching delegators list...");
    let delegations = match client
        .fetch_delegators(&config.delegation_api, &config.receiver_account)
        .await
    {
        Ok(list) => list,
        Err(e) => {
            error!("Error fetching delegators: {}", e);
            return None;
        }
    };

    let (individual, partner_hp) =
        payout_engine::classify_delegations(&delegations, &config.partner_accounts, &ratio);
    let mut table =
        payout_engine::build_table(&config.receiver_account, own_hp, partner_hp, individual);

    info!("Calculating payout columns...");
    payout_engine::allocate(
        &mut table,
        earnings,
        config.token_fixed_price,
        config.hive_deduction_multiplier,
    );

    info!("Processing payments...");
    match payments::process_payments(&mut table, config).await {
        Ok(report) => info!(
            "Payment dispatch finished in state {:?} ({} payments)",
            report.state, report.payments_made
        ),
        Err(e) => error!("Payment stage failed: {}", e),
    }

    info!("Saving payout snapshot...");
    match snapshot_repository::write_snapshot(
        &config.data_dir,
        &config.token_name,
        &table,
        run_stamp,
    ) {
        Ok(path) => Some(path),
        Err(e) => {
            error!("Error writing snapshot: {}", e);
            None
        }
    }
}
