use crate::error::UpstreamError;

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Parses ledger asset strings such as "123.456 VESTS" or "0.500 HIVE",
/// tolerating a bare numeric value with no symbol suffix.
pub fn parse_asset(value: &str, url: &str) -> Result<f64, UpstreamError> {
    let amount = value.split_whitespace().next().unwrap_or("");
    amount.parse::<f64>().map_err(|_| UpstreamError::Response {
        url: url.to_string(),
        detail: format!("unparseable asset amount {value:?}"),
    })
}
