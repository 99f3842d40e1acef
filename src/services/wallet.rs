use crate::error::{PaymentError, UpstreamError};
use crate::services::hive_rpc::HiveClient;
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use k256::ecdsa::SigningKey;
use log::info;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

const HIVE_CHAIN_ID: &str = "beeab0de00000000000000000000000000000000000000000000000000000000";
const ENGINE_CUSTOM_JSON_ID: &str = "ssc-mainnet-hive";
const CUSTOM_JSON_OP: u64 = 18;
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const EXPIRATION_SECS: i64 = 60;
// Roughly half of all signatures come out canonical, so a handful of
// attempts is plenty.
const MAX_SIGNING_ATTEMPTS: i64 = 16;

#[async_trait]
pub trait TokenWallet {
    async fn transfer(
        &self,
        to: &str,
        token: &str,
        quantity: f64,
        memo: &str,
    ) -> Result<String, PaymentError>;

    async fn balance(&self, token: &str) -> Result<f64, PaymentError>;
}

/// Hive-Engine sidechain wallet: token transfers ride the main chain as
/// signed `custom_json` operations, balances live on the sidechain nodes.
pub struct EngineWallet {
    account: String,
    signing_key: SigningKey,
    client: HiveClient,
    engine_node: String,
    http: reqwest::Client,
}

impl EngineWallet {
    pub fn configure(
        account: &str,
        active_key_wif: &str,
        hive_node: &str,
        engine_node: &str,
    ) -> Result<Self, PaymentError> {
        let signing_key = parse_wif(active_key_wif)?;
        info!("Wallet configured for {}", account);
        Ok(Self {
            account: account.to_string(),
            signing_key,
            client: HiveClient::new(hive_node),
            engine_node: engine_node.to_string(),
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl TokenWallet for EngineWallet {
    async fn transfer(
        &self,
        to: &str,
        token: &str,
        quantity: f64,
        memo: &str,
    ) -> Result<String, PaymentError> {
        let props = self
            .client
            .dynamic_global_properties()
            .await
            .map_err(|source| PaymentError::Transfer {
                to: to.to_string(),
                source,
            })?;

        let ref_block_num = (props.head_block_number & 0xffff) as u16;
        let block_id = hex::decode(&props.head_block_id).map_err(|e| {
            PaymentError::Signing(format!("bad head block id {}: {e}", props.head_block_id))
        })?;
        let prefix_bytes: [u8; 4] = block_id
            .get(4..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                PaymentError::Signing(format!("short head block id {}", props.head_block_id))
            })?;
        let ref_block_prefix = u32::from_le_bytes(prefix_bytes);
        let head_time = NaiveDateTime::parse_from_str(&props.time, TIME_FORMAT)
            .map_err(|e| PaymentError::Signing(format!("bad head block time: {e}")))?;

        let payload = json!({
            "contractName": "tokens",
            "contractAction": "transfer",
            "contractPayload": {
                "symbol": token,
                "to": to,
                "quantity": format!("{quantity:.3}"),
                "memo": memo,
            },
        })
        .to_string();

        // The signature must be canonical for the chain to accept it. The
        // signer is deterministic, so re-signing the same bytes cannot help;
        // bump the expiration to vary the digest instead.
        for bump in 0..MAX_SIGNING_ATTEMPTS {
            let expiration = head_time + Duration::seconds(EXPIRATION_SECS + bump);
            let unsigned = serialize_custom_json_tx(
                ref_block_num,
                ref_block_prefix,
                expiration.and_utc().timestamp() as u32,
                &[self.account.as_str()],
                ENGINE_CUSTOM_JSON_ID,
                &payload,
            );

            let mut to_sign = hex::decode(HIVE_CHAIN_ID)
                .map_err(|e| PaymentError::Signing(e.to_string()))?;
            to_sign.extend_from_slice(&unsigned);
            let digest = Sha256::digest(&to_sign);

            let (signature, recovery_id) = self
                .signing_key
                .sign_prehash_recoverable(digest.as_slice())
                .map_err(|e| PaymentError::Signing(e.to_string()))?;
            let mut sig = [0u8; 65];
            sig[0] = 27 + 4 + recovery_id.to_byte();
            sig[1..].copy_from_slice(&signature.to_bytes());
            if !is_canonical(&sig) {
                continue;
            }

            let tx = json!({
                "ref_block_num": ref_block_num,
                "ref_block_prefix": ref_block_prefix,
                "expiration": expiration.format(TIME_FORMAT).to_string(),
                "operations": [[
                    "custom_json",
                    {
                        "required_auths": [&self.account],
                        "required_posting_auths": [],
                        "id": ENGINE_CUSTOM_JSON_ID,
                        "json": payload,
                    },
                ]],
                "extensions": [],
                "signatures": [hex::encode(sig)],
            });

            let result = self
                .client
                .broadcast_transaction(&tx)
                .await
                .map_err(|source| PaymentError::Transfer {
                    to: to.to_string(),
                    source,
                })?;
            let tx_id = result
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| hex::encode(&Sha256::digest(&unsigned)[..20]));
            return Ok(tx_id);
        }

        Err(PaymentError::Signing(
            "no canonical signature found".to_string(),
        ))
    }

    async fn balance(&self, token: &str) -> Result<f64, PaymentError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "findOne",
            "params": {
                "contract": "tokens",
                "table": "balances",
                "query": { "account": self.account, "symbol": token },
            },
        });
        let http_err = |source| {
            PaymentError::Balance(UpstreamError::Http {
                url: self.engine_node.clone(),
                source,
            })
        };
        let response = self
            .http
            .post(&self.engine_node)
            .json(&body)
            .send()
            .await
            .map_err(http_err)?;
        let payload: Value = response.json().await.map_err(http_err)?;
        match payload.get("result") {
            // No balance record yet for this token.
            None | Some(Value::Null) => Ok(0.0),
            Some(result) => result
                .get("balance")
                .and_then(Value::as_str)
                .and_then(|b| b.parse().ok())
                .ok_or_else(|| {
                    PaymentError::Balance(UpstreamError::Response {
                        url: self.engine_node.clone(),
                        detail: format!("unparseable balance in {result}"),
                    })
                }),
        }
    }
}

fn parse_wif(wif: &str) -> Result<SigningKey, PaymentError> {
    let data = bs58::decode(wif)
        .into_vec()
        .map_err(|e| PaymentError::Configure(format!("private key is not base58: {e}")))?;
    if data.len() != 37 || data[0] != 0x80 {
        return Err(PaymentError::Configure(
            "private key has an unexpected layout".to_string(),
        ));
    }
    let (payload, checksum) = data.split_at(33);
    let digest = Sha256::digest(Sha256::digest(payload));
    if digest[..4] != *checksum {
        return Err(PaymentError::Configure(
            "private key checksum mismatch".to_string(),
        ));
    }
    SigningKey::from_slice(&payload[1..])
        .map_err(|e| PaymentError::Configure(format!("private key rejected: {e}")))
}

/// Graphene canonicality: neither r nor s may carry a high bit or a
/// zero-padded leading byte.
fn is_canonical(sig: &[u8; 65]) -> bool {
    sig[1] & 0x80 == 0
        && !(sig[1] == 0 && sig[2] & 0x80 == 0)
        && sig[33] & 0x80 == 0
        && !(sig[33] == 0 && sig[34] & 0x80 == 0)
}

fn push_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn push_string(buf: &mut Vec<u8>, value: &str) {
    push_varint(buf, value.len() as u64);
    buf.extend_from_slice(value.as_bytes());
}

/// Hive wire format: little-endian scalars, varint-prefixed strings, one
/// `custom_json` operation, no extensions.
fn serialize_custom_json_tx(
    ref_block_num: u16,
    ref_block_prefix: u32,
    expiration_secs: u32,
    required_auths: &[&str],
    id: &str,
    json_payload: &str,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&ref_block_num.to_le_bytes());
    buf.extend_from_slice(&ref_block_prefix.to_le_bytes());
    buf.extend_from_slice(&expiration_secs.to_le_bytes());
    push_varint(&mut buf, 1);
    push_varint(&mut buf, CUSTOM_JSON_OP);
    push_varint(&mut buf, required_auths.len() as u64);
    for auth in required_auths {
        push_string(&mut buf, auth);
    }
    push_varint(&mut buf, 0);
    push_string(&mut buf, id);
    push_string(&mut buf, json_payload);
    push_varint(&mut buf, 0);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_encoding() {
        let mut buf = Vec::new();
        push_varint(&mut buf, 0);
        assert_eq!(buf, [0x00]);
        buf.clear();
        push_varint(&mut buf, 127);
        assert_eq!(buf, [0x7f]);
        buf.clear();
        push_varint(&mut buf, 128);
        assert_eq!(buf, [0x80, 0x01]);
        buf.clear();
        push_varint(&mut buf, 300);
        assert_eq!(buf, [0xac, 0x02]);
    }

    #[test]
    fn strings_are_length_prefixed() {
        let mut buf = Vec::new();
        push_string(&mut buf, "abc");
        assert_eq!(buf, [0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn custom_json_tx_serialization_layout() {
        let bytes = serialize_custom_json_tx(0x1234, 1, 2, &["ab"], "x", "{}");
        let expected = [
            0x34, 0x12, // ref block num, LE
            0x01, 0x00, 0x00, 0x00, // ref block prefix, LE
            0x02, 0x00, 0x00, 0x00, // expiration, LE
            0x01, // one operation
            0x12, // custom_json op id
            0x01, 0x02, b'a', b'b', // one required auth
            0x00, // no posting auths
            0x01, b'x', // id
            0x02, b'{', b'}', // json payload
            0x00, // no extensions
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn wif_round_trip_and_corruption() {
        let key = [7u8; 32];
        let mut payload = vec![0x80];
        payload.extend_from_slice(&key);
        let checksum = Sha256::digest(Sha256::digest(&payload));
        payload.extend_from_slice(&checksum[..4]);
        let wif = bs58::encode(&payload).into_string();

        let parsed = parse_wif(&wif).unwrap();
        assert_eq!(parsed.to_bytes().as_slice(), &key);

        let mut corrupted = payload;
        corrupted[10] ^= 0x01;
        let bad_wif = bs58::encode(&corrupted).into_string();
        assert!(parse_wif(&bad_wif).is_err());
        assert!(parse_wif("not-a-key").is_err());
    }

    #[test]
    fn canonicality_rejects_high_bit_components() {
        let mut sig = [0x01u8; 65];
        assert!(is_canonical(&sig));
        sig[1] = 0x80;
        assert!(!is_canonical(&sig));
        sig[1] = 0x01;
        sig[33] = 0x00;
        sig[34] = 0x01;
        assert!(!is_canonical(&sig));
    }
}
