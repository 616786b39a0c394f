use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Headers covered by the request signature. Field order is the serialized key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignHeaders {
    pub platform: String,
    pub timestamp: String,
    #[serde(rename = "dId")]
    pub d_id: String,
    #[serde(rename = "vName")]
    pub v_name: String,
}

impl SignHeaders {
    /// Empty placeholder fields plus the given timestamp.
    pub fn with_timestamp(timestamp: String) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    pub fn to_compact_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Seconds since the epoch for `now - 2s`, with six fractional digits.
pub fn signing_timestamp(now: DateTime<Utc>) -> String {
    let at = now - TimeDelta::seconds(2);
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

pub fn canonical_string(url: &str, timestamp: &str, headers: &SignHeaders) -> String {
    format!("{}{}{}", url, timestamp, headers.to_compact_json())
}

/// Lowercase hex HMAC-SHA256 of `canonical` keyed by `signing_key`.
pub fn sign(signing_key: &str, canonical: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(signing_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
