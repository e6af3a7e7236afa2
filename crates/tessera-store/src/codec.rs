//! Persisted JSON wire format.
//!
//! Chunks are stored as UTF-8 JSON in which every timestamp is wrapped in a
//! `{"__date":true,"value":"<ISO-8601>"}` sentinel so the filesystem backend
//! can round-trip dates faithfully. The other backends reuse the same
//! encoding for their payload values. Readers accept a missing `expires` and
//! empty `links`; timestamps keep millisecond fidelity.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tessera_core::{Chunk, ChunkType, StoreError};

/// Wire shape of a persisted chunk; the file is the complete chunk.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChunk {
    id: String,
    file_key: String,
    #[serde(rename = "type")]
    chunk_type: ChunkType,
    #[serde(with = "sentinel_date")]
    created: DateTime<Utc>,
    #[serde(with = "sentinel_date")]
    last_accessed: DateTime<Utc>,
    #[serde(
        default,
        with = "sentinel_date_opt",
        skip_serializing_if = "Option::is_none"
    )]
    expires: Option<DateTime<Utc>>,
    data: Value,
    #[serde(default)]
    links: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct DateSentinel {
    #[serde(rename = "__date")]
    marker: bool,
    value: String,
}

impl DateSentinel {
    fn wrap(dt: &DateTime<Utc>) -> Self {
        Self {
            marker: true,
            value: dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    fn unwrap_date<E: serde::de::Error>(&self) -> Result<DateTime<Utc>, E> {
        DateTime::parse_from_rfc3339(&self.value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|err| E::custom(format!("invalid date sentinel: {err}")))
    }
}

mod sentinel_date {
    use super::{DateSentinel, DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        DateSentinel::wrap(dt).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        DateSentinel::deserialize(deserializer)?.unwrap_date()
    }
}

mod sentinel_date_opt {
    use super::{DateSentinel, DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        dt: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => DateSentinel::wrap(dt).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<DateSentinel>::deserialize(deserializer)?
            .map(|s| s.unwrap_date())
            .transpose()
    }
}

/// Truncate to the millisecond resolution the wire format carries.
fn to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

/// Encode a chunk into persisted JSON.
pub fn encode_chunk(chunk: &Chunk) -> Result<String, StoreError> {
    let wire = WireChunk {
        id: chunk.id.clone(),
        file_key: chunk.file_key.clone(),
        chunk_type: chunk.chunk_type,
        created: chunk.created,
        last_accessed: chunk.last_accessed,
        expires: chunk.expires,
        data: chunk.data.clone(),
        links: chunk.links.clone(),
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Decode persisted JSON into a chunk.
pub fn decode_chunk(raw: &str) -> Result<Chunk, StoreError> {
    let wire: WireChunk = serde_json::from_str(raw)?;
    Ok(Chunk {
        id: wire.id,
        file_key: wire.file_key,
        chunk_type: wire.chunk_type,
        created: to_millis(wire.created),
        last_accessed: to_millis(wire.last_accessed),
        expires: wire.expires.map(to_millis),
        data: wire.data,
        links: wire.links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn chunk() -> Chunk {
        let mut c = Chunk::new(
            "f:node:n1".to_string(),
            "f".to_string(),
            ChunkType::Node,
            json!({"id": "n1", "type": "FRAME"}),
        );
        c.links = vec!["f:node:c1".to_string()];
        c
    }

    #[test]
    fn test_dates_encoded_with_sentinel() {
        let encoded = encode_chunk(&chunk()).unwrap();
        let raw: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(raw["created"]["__date"], json!(true));
        assert!(raw["created"]["value"].as_str().unwrap().contains('T'));
        assert_eq!(raw["lastAccessed"]["__date"], json!(true));
        assert!(raw.get("expires").is_none());
    }

    #[test]
    fn test_round_trip_preserves_millisecond_fidelity() {
        let mut c = chunk();
        c.expires = Some(c.created + Duration::milliseconds(123));

        let decoded = decode_chunk(&encode_chunk(&c).unwrap()).unwrap();
        assert_eq!(decoded.id, c.id);
        assert_eq!(
            decoded.created.timestamp_millis(),
            c.created.timestamp_millis()
        );
        assert_eq!(
            decoded.expires.unwrap().timestamp_millis(),
            c.expires.unwrap().timestamp_millis()
        );
        assert_eq!(decoded.data, c.data);
        assert_eq!(decoded.links, c.links);
    }

    #[test]
    fn test_decode_accepts_missing_expires_and_links() {
        let raw = json!({
            "id": "f:node:n1",
            "fileKey": "f",
            "type": "node",
            "created": {"__date": true, "value": "2026-03-01T10:00:00.250Z"},
            "lastAccessed": {"__date": true, "value": "2026-03-01T10:00:00.250Z"},
            "data": {"id": "n1"}
        });
        let decoded = decode_chunk(&raw.to_string()).unwrap();
        assert!(decoded.expires.is_none());
        assert!(decoded.links.is_empty());
        assert_eq!(decoded.created.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_decode_rejects_bare_date_strings() {
        let raw = json!({
            "id": "f:node:n1",
            "fileKey": "f",
            "type": "node",
            "created": "2026-03-01T10:00:00Z",
            "lastAccessed": {"__date": true, "value": "2026-03-01T10:00:00Z"},
            "data": {}
        });
        assert!(decode_chunk(&raw.to_string()).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_chunk("not json").is_err());
        assert!(decode_chunk("{}").is_err());
    }
}
