//! HMAC-SHA256 helpers for provider signatures

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `data`
pub fn sign_hex(secret: &str, data: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature
pub fn verify_hex(secret: &str, data: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(&expected).is_ok()
}

/// `k1=v1&k2=v2…` over the sorted top-level fields
///
/// `signature` and null fields are skipped. Strings are used verbatim, other
/// values in their JSON form.
pub fn canonical_string(payload: &Value) -> String {
    let Value::Object(map) = payload else {
        return String::new();
    };
    let mut keys: Vec<&String> = map
        .iter()
        .filter(|(k, v)| k.as_str() != "signature" && !v.is_null())
        .map(|(k, _)| k)
        .collect();
    keys.sort();

    keys.iter()
        .map(|k| {
            let value = match &map[k.as_str()] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{k}={value}")
        })
        .collect::<Vec<_>>()
        .join("&")
}
