//! Wallet key handling for the live REST gateway.
//!
//! - Config signature type to SDK type
//! - Cached signers keyed by a hash of the private key
//! - L1 auth headers and order signatures

use std::collections::HashMap;
use std::sync::RwLock;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use once_cell::sync::Lazy;
use polymarket_client_sdk::clob::types::SignatureType;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::TradingError;
use crate::trading::OrderParams;

static SIGNER_CACHE: Lazy<RwLock<HashMap<u64, PrivateKeySigner>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn key_hash(private_key: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    private_key.hash(&mut hasher);
    hasher.finish()
}

/// Map the configured signature type (0 EOA, 1 proxy, 2 safe).
pub fn signature_type_from_u8(sig_type: u8) -> SignatureType {
    match sig_type {
        1 => SignatureType::Proxy,
        2 => SignatureType::GnosisSafe,
        _ => SignatureType::Eoa,
    }
}

/// Create a signer from a hex private key, with or without `0x`.
pub fn create_signer(private_key: &str) -> Result<PrivateKeySigner, TradingError> {
    let key = private_key.strip_prefix("0x").unwrap_or(private_key);
    let bytes = hex::decode(key)
        .map_err(|e| TradingError::SigningError(format!("Invalid private key hex: {}", e)))?;

    let key_bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        TradingError::SigningError(format!("Private key must be 32 bytes, got {}", bytes.len()))
    })?;

    PrivateKeySigner::from_bytes(&key_bytes.into())
        .map_err(|e| TradingError::SigningError(format!("Failed to create signer: {}", e)))
}

/// Cached signer for `private_key`.
pub fn get_or_create_signer(private_key: &str) -> Result<PrivateKeySigner, TradingError> {
    let hash = key_hash(private_key);

    {
        let cache = SIGNER_CACHE.read().map_err(|e| {
            TradingError::SigningError(format!("Failed to acquire cache read lock: {}", e))
        })?;
        if let Some(signer) = cache.get(&hash) {
            return Ok(signer.clone());
        }
    }

    let signer = create_signer(private_key)?;
    let mut cache = SIGNER_CACHE.write().map_err(|e| {
        TradingError::SigningError(format!("Failed to acquire cache write lock: {}", e))
    })?;
    debug!("Caching new signer");
    Ok(cache.entry(hash).or_insert(signer).clone())
}

/// Checksummed wallet address for a private key.
pub fn address_from_private_key(private_key: &str) -> Result<String, TradingError> {
    let signer = get_or_create_signer(private_key)?;
    Ok(format!("{:?}", signer.address()))
}

/// L1 authentication headers for the CLOB REST API.
pub async fn generate_auth_headers(
    private_key: &str,
    now: OffsetDateTime,
) -> Result<Vec<(String, String)>, TradingError> {
    let signer = get_or_create_signer(private_key)?;
    let address = format!("{:?}", signer.address());
    let timestamp = now.unix_timestamp().to_string();

    let message = format!("polymarket:{}", timestamp);
    let signature = signer
        .sign_message(message.as_bytes())
        .await
        .map_err(|e| TradingError::SigningError(format!("Failed to sign auth message: {}", e)))?;

    Ok(vec![
        ("POLY_ADDRESS".to_string(), address),
        (
            "POLY_SIGNATURE".to_string(),
            format!("0x{}", hex::encode(signature.as_bytes())),
        ),
        ("POLY_TIMESTAMP".to_string(), timestamp),
        ("POLY_NONCE".to_string(), "0".to_string()),
    ])
}

/// Canonical text committed to by an order signature.
pub fn order_digest(params: &OrderParams, maker: &str, salt: &str, expiration: &str) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}|{}",
        maker,
        params.token_id,
        params.side,
        params.price.normalize(),
        params.size.normalize(),
        salt,
        expiration
    )
}

/// Sign an order; returns the hex signature.
pub async fn sign_order(
    private_key: &str,
    params: &OrderParams,
    maker: &str,
    salt: &str,
    expiration: &str,
) -> Result<String, TradingError> {
    let signer = get_or_create_signer(private_key)?;
    let digest = order_digest(params, maker, salt, expiration);
    let signature = signer
        .sign_message(digest.as_bytes())
        .await
        .map_err(|e| TradingError::SigningError(format!("Failed to sign order: {}", e)))?;
    Ok(format!("0x{}", hex::encode(signature.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn signature_type_conversion() {
        assert!(matches!(signature_type_from_u8(0), SignatureType::Eoa));
        assert!(matches!(signature_type_from_u8(1), SignatureType::Proxy));
        assert!(matches!(signature_type_from_u8(2), SignatureType::GnosisSafe));
        assert!(matches!(signature_type_from_u8(99), SignatureType::Eoa));
    }

    #[test]
    fn signer_from_key_variants() {
        assert!(create_signer(KEY).is_ok());
        assert!(create_signer(KEY.trim_start_matches("0x")).is_ok());
        assert!(create_signer("0xnot_valid_hex").is_err());
        assert!(create_signer("0x1234").is_err());
    }

    #[test]
    fn address_is_checksummed_hex() {
        let addr = address_from_private_key(KEY).unwrap();
        assert!(addr.starts_with("0x"));
        assert_eq!(addr.len(), 42);
    }

    #[test]
    fn digest_covers_order_fields() {
        let params = OrderParams::buy("tok", dec!(0.450), dec!(10.0));
        assert_eq!(
            order_digest(&params, "0xabc", "7", "0"),
            "0xabc|tok|BUY|0.45|10|7|0"
        );
    }

    #[tokio::test]
    async fn order_signature_is_deterministic() {
        let params = OrderParams::buy("tok", dec!(0.45), dec!(10));
        let a = sign_order(KEY, &params, "0xabc", "1", "0").await.unwrap();
        let b = sign_order(KEY, &params, "0xabc", "1", "0").await.unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("0x"));
        assert_eq!(a.len(), 2 + 65 * 2);
    }

    #[tokio::test]
    async fn auth_headers_include_timestamp() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let headers = generate_auth_headers(KEY, now).await.unwrap();
        assert!(headers
            .iter()
            .any(|(k, v)| k == "POLY_TIMESTAMP" && v == "1700000000"));
    }
}
