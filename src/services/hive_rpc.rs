use crate::error::UpstreamError;
use crate::models::DelegationRecord;
use crate::utils::helpers::parse_asset;
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};

pub struct HiveClient {
    http: reqwest::Client,
    node: String,
}

#[derive(Debug, Clone)]
pub struct DynamicGlobalProperties {
    pub head_block_number: u32,
    pub head_block_id: String,
    pub time: String,
    pub total_vesting_fund_hive: f64,
    pub total_vesting_shares: f64,
}

impl DynamicGlobalProperties {
    pub fn from_value(value: &Value, url: &str) -> Result<Self, UpstreamError> {
        Ok(Self {
            head_block_number: u64_field(value, "head_block_number", url)? as u32,
            head_block_id: str_field(value, "head_block_id", url)?,
            time: str_field(value, "time", url)?,
            total_vesting_fund_hive: parse_asset(
                &str_field(value, "total_vesting_fund_hive", url)?,
                url,
            )?,
            total_vesting_shares: parse_asset(
                &str_field(value, "total_vesting_shares", url)?,
                url,
            )?,
        })
    }
}

/// Network-wide VESTS -> HP exchange ratio. Fetched once per run and reused
/// for every conversion, so one run's totals are internally consistent even
/// though the live ratio drifts block by block.
#[derive(Debug, Clone, Copy)]
pub struct VestingRatio {
    pub total_vesting_fund_hive: f64,
    pub total_vesting_shares: f64,
}

impl VestingRatio {
    pub fn vests_to_hp(&self, vesting_shares: f64) -> f64 {
        if self.total_vesting_shares == 0.0 {
            return 0.0;
        }
        vesting_shares * self.total_vesting_fund_hive / self.total_vesting_shares
    }
}

#[derive(Deserialize)]
struct DelegationList {
    list: Vec<DelegationRecord>,
}

impl HiveClient {
    pub fn new(node: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            node: node.to_string(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, UpstreamError> {
        info!("Querying RPC: {}", method);
        let body = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 1 });
        let response = self
            .http
            .post(&self.node)
            .json(&body)
            .send()
            .await
            .map_err(|source| UpstreamError::Http {
                url: self.node.clone(),
                source,
            })?;
        let payload: Value = response.json().await.map_err(|source| UpstreamError::Http {
            url: self.node.clone(),
            source,
        })?;
        if let Some(error) = payload.get("error") {
            return Err(UpstreamError::Rpc {
                url: self.node.clone(),
                message: error.to_string(),
            });
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| UpstreamError::Response {
                url: self.node.clone(),
                detail: "response carries neither result nor error".to_string(),
            })
    }

    pub async fn dynamic_global_properties(&self) -> Result<DynamicGlobalProperties, UpstreamError> {
        let result = self
            .call("condenser_api.get_dynamic_global_properties", json!([]))
            .await?;
        DynamicGlobalProperties::from_value(&result, &self.node)
    }

    pub async fn vesting_ratio(&self) -> Result<VestingRatio, UpstreamError> {
        let props = self.dynamic_global_properties().await?;
        Ok(VestingRatio {
            total_vesting_fund_hive: props.total_vesting_fund_hive,
            total_vesting_shares: props.total_vesting_shares,
        })
    }

    /// The account's own holdings converted to HP with this run's ratio
    /// snapshot.
    pub async fn account_hp(
        &self,
        account: &str,
        ratio: &VestingRatio,
    ) -> Result<f64, UpstreamError> {
        let result = self
            .call("condenser_api.get_accounts", json!([[account]]))
            .await?;
        let entry = result
            .as_array()
            .and_then(|accounts| accounts.first())
            .ok_or_else(|| UpstreamError::Response {
                url: self.node.clone(),
                detail: format!("account {account} not found"),
            })?;
        let vesting_shares = parse_asset(&str_field(entry, "vesting_shares", &self.node)?, &self.node)?;
        Ok(ratio.vests_to_hp(vesting_shares))
    }

    /// Incoming delegations, in the order the delegation API reports them.
    pub async fn fetch_delegators(
        &self,
        api_base: &str,
        account: &str,
    ) -> Result<Vec<DelegationRecord>, UpstreamError> {
        let url = format!("{}/{}", api_base, account);
        info!("Fetching delegators from {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| UpstreamError::Http {
                url: url.clone(),
                source,
            })?;
        let payload: DelegationList =
            response.json().await.map_err(|source| UpstreamError::Http {
                url: url.clone(),
                source,
            })?;
        info!("Fetched {} delegations", payload.list.len());
        Ok(payload.list)
    }

    pub async fn broadcast_transaction(&self, tx: &Value) -> Result<Value, UpstreamError> {
        self.call("condenser_api.broadcast_transaction_synchronous", json!([tx]))
            .await
    }
}

fn str_field(value: &Value, name: &str, url: &str) -> Result<String, UpstreamError> {
    value
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| UpstreamError::Response {
            url: url.to_string(),
            detail: format!("missing string field {name}"),
        })
}

fn u64_field(value: &Value, name: &str, url: &str) -> Result<u64, UpstreamError> {
    value
        .get(name)
        .and_then(Value::as_u64)
        .ok_or_else(|| UpstreamError::Response {
            url: url.to_string(),
            detail: format!("missing numeric field {name}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_vests_with_fixed_ratio() {
        let ratio = VestingRatio {
            total_vesting_fund_hive: 500.0,
            total_vesting_shares: 1000.0,
        };
        assert_eq!(ratio.vests_to_hp(0.0), 0.0);
        assert_eq!(ratio.vests_to_hp(200.0), 100.0);
        // Monotonic in vesting shares for a fixed snapshot.
        assert!(ratio.vests_to_hp(300.0) > ratio.vests_to_hp(200.0));
    }

    #[test]
    fn zero_share_supply_never_divides_by_zero() {
        let ratio = VestingRatio {
            total_vesting_fund_hive: 500.0,
            total_vesting_shares: 0.0,
        };
        assert_eq!(ratio.vests_to_hp(123.0), 0.0);
    }

    #[test]
    fn parses_dynamic_global_properties() {
        let value = json!({
            "head_block_number": 987654u64,
            "head_block_id": "000f1206aabbccdd00000000000000000000000000000000",
            "time": "2026-08-06T12:00:00",
            "total_vesting_fund_hive": "180000000.000 HIVE",
            "total_vesting_shares": "300000000000.000000 VESTS",
        });
        let props = DynamicGlobalProperties::from_value(&value, "test").unwrap();
        assert_eq!(props.head_block_number, 987654);
        assert_eq!(props.total_vesting_fund_hive, 180000000.0);
        assert_eq!(props.total_vesting_shares, 300000000000.0);
    }

    #[test]
    fn rejects_malformed_properties() {
        let value = json!({ "head_block_number": "not a number" });
        assert!(DynamicGlobalProperties::from_value(&value, "test").is_err());
    }
}
