//! Frame envelope types
//!
//! Every decompressed frame is a JSON record with a schema reference, a
//! gateway header and a schema-specific message body. The body is kept
//! as a raw value here; each handler owns its typed message shape.

use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "$schemaRef")]
    pub schema_ref: String,
    #[serde(default)]
    pub header: Header,
    pub message: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct Header {
    #[serde(rename = "gatewayTimestamp")]
    pub gateway_timestamp: Option<String>,
    pub timestamp: Option<String>,
    pub gameversion: Option<String>,
}

impl Envelope {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Timestamp component of the dedup key: the gateway's receive time
    /// when present, the producer's own timestamp otherwise
    pub fn dedup_timestamp(&self) -> &str {
        self.header
            .gateway_timestamp
            .as_deref()
            .or(self.header.timestamp.as_deref())
            .unwrap_or("")
    }
}

/// Accepts integers, floats, numeric strings and the empty string some
/// senders put in bracket fields; everything unparseable reads as zero
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64().unwrap_or_else(|| {
            n.as_f64().map(|f| f as i64).unwrap_or(0)
        }),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_envelope() {
        let raw = br#"{
            "$schemaRef": "https://eddn.edcd.io/schemas/commodity/3",
            "header": {
                "gatewayTimestamp": "2026-01-01T00:00:00Z",
                "gameversion": "4.0.0.1900"
            },
            "message": {"marketId": 1}
        }"#;

        let envelope = Envelope::parse(raw).unwrap();
        assert!(envelope.schema_ref.ends_with("/commodity/3"));
        assert_eq!(envelope.header.gameversion.as_deref(), Some("4.0.0.1900"));
        assert_eq!(envelope.dedup_timestamp(), "2026-01-01T00:00:00Z");
    }

    #[test]
    fn test_dedup_timestamp_falls_back_to_message_timestamp() {
        let raw = br#"{
            "$schemaRef": "x",
            "header": {"timestamp": "2026-02-02T00:00:00Z"},
            "message": {}
        }"#;
        let envelope = Envelope::parse(raw).unwrap();
        assert_eq!(envelope.dedup_timestamp(), "2026-02-02T00:00:00Z");
    }

    #[test]
    fn test_missing_header_tolerated() {
        let envelope = Envelope::parse(br#"{"$schemaRef": "x", "message": {}}"#).unwrap();
        assert_eq!(envelope.dedup_timestamp(), "");
        assert!(envelope.header.gameversion.is_none());
    }

    #[test]
    fn test_lenient_i64_variants() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(deserialize_with = "lenient_i64", default)]
            bracket: i64,
        }

        let p: Probe = serde_json::from_str(r#"{"bracket": 2}"#).unwrap();
        assert_eq!(p.bracket, 2);
        let p: Probe = serde_json::from_str(r#"{"bracket": ""}"#).unwrap();
        assert_eq!(p.bracket, 0);
        let p: Probe = serde_json::from_str(r#"{"bracket": "3"}"#).unwrap();
        assert_eq!(p.bracket, 3);
    }
}
