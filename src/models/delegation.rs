use serde::Deserialize;

/// One incoming vesting delegation as reported by the delegation API.
/// `vesting_shares` keeps the upstream string form ("123.456 VESTS").
#[derive(Debug, Clone, Deserialize)]
pub struct DelegationRecord {
    pub delegator: String,
    pub vesting_shares: String,
}
