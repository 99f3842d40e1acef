use crate::error::ConfigError;
use log::warn;
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

#[derive(Debug)]
pub struct MessagingTarget {
    pub token: String,
    pub channel_id: String,
}

#[derive(Debug)]
pub struct Config {
    pub receiver_account: String,
    pub payment_account: String,
    pub active_key: Option<String>,
    pub posting_key: Option<String>,
    pub token_name: String,
    pub token_fixed_price: f64,
    pub hive_deduction_multiplier: f64,
    pub activate_payments: bool,
    pub partner_accounts: HashSet<String>,
    pub ignore_payment_accounts: HashSet<String>,
    pub hive_node: String,
    pub engine_node: String,
    pub delegation_api: String,
    pub data_dir: PathBuf,
    pub telegram: Option<MessagingTarget>,
    pub discord: Option<MessagingTarget>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();

        let receiver_account = required(&get, "RECEIVER_ACCOUNT", &mut missing);
        let payment_account = required(&get, "PAYMENT_ACCOUNT", &mut missing);

        let activate_payments = matches!(
            get("ACTIVATE_PAYMENTS").as_deref().map(str::trim),
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1"
        );

        // Keys are only demanded for runs that will actually sign transfers;
        // a reporting-only run must not require them.
        let (active_key, posting_key) = if activate_payments {
            (
                Some(required(&get, "HIVE_ENGINE_ACTIVE_PRIVATE_KEY", &mut missing)),
                Some(required(&get, "HIVE_ENGINE_POSTING_PRIVATE_KEY", &mut missing)),
            )
        } else {
            (
                get("HIVE_ENGINE_ACTIVE_PRIVATE_KEY"),
                get("HIVE_ENGINE_POSTING_PRIVATE_KEY"),
            )
        };

        if !missing.is_empty() {
            return Err(ConfigError::Missing { missing });
        }

        Ok(Self {
            receiver_account,
            payment_account,
            active_key,
            posting_key,
            token_name: get("TOKEN_NAME").unwrap_or_else(|| "NEXO".to_string()),
            token_fixed_price: parse_f64(&get, "TOKEN_FIXED_PRICE", 1.0)?,
            hive_deduction_multiplier: parse_f64(&get, "HIVE_DEDUCTION_MULTIPLIER", 1.0)?,
            activate_payments,
            partner_accounts: parse_list(get("PARTNER_ACCOUNTS")),
            ignore_payment_accounts: parse_list(get("IGNORE_PAYMENT_ACCOUNTS")),
            hive_node: get("HIVE_NODE").unwrap_or_else(|| "https://api.hive.blog".to_string()),
            engine_node: get("HIVE_ENGINE_NODE")
                .unwrap_or_else(|| "https://api.hive-engine.com/rpc/contracts".to_string()),
            delegation_api: get("DELEGATION_API")
                .unwrap_or_else(|| "https://ecency.com/private-api/received-vesting".to_string()),
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string())),
            telegram: messaging_pair(&get, "TELEGRAM_BOT_TOKEN", "TELEGRAM_CHAT_ID"),
            discord: messaging_pair(&get, "DISCORD_BOT_TOKEN", "DISCORD_CHANNEL_ID"),
        })
    }
}

fn required<F>(get: &F, name: &str, missing: &mut Vec<String>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(value) if !value.trim().is_empty() => value,
        _ => {
            missing.push(name.to_string());
            String::new()
        }
    }
}

fn parse_f64<F>(get: &F, name: &'static str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn parse_list(value: Option<String>) -> HashSet<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn messaging_pair<F>(get: &F, token_name: &str, channel_name: &str) -> Option<MessagingTarget>
where
    F: Fn(&str) -> Option<String>,
{
    match (get(token_name), get(channel_name)) {
        (Some(token), Some(channel_id)) => Some(MessagingTarget { token, channel_id }),
        (None, None) => None,
        _ => {
            warn!("{token_name}/{channel_name} set only in part, notifications to that service disabled");
            None
        }
    }
}
