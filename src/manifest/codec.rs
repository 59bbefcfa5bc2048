//! Encoded-blob persistence: a one-byte format version followed by a
//! self-describing JSON payload, so `manifest/app_*.data` files can migrate
//! forward without guessing at an opaque object-graph format.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{EngineError, Result};

const FORMAT_VERSION: u8 = 1;

/// `decode(encode(value)) == value` is a property test in
/// `tests/manifest_roundtrip.rs`.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(value).map_err(|e| EngineError::Decode {
        field_path: "$".into(),
        reason: e.to_string(),
    })?;
    let mut bytes = Vec::with_capacity(json.len() + 1);
    bytes.push(FORMAT_VERSION);
    bytes.extend(json);
    Ok(bytes)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (version, payload) = bytes.split_first().ok_or_else(|| EngineError::Decode {
        field_path: "$".into(),
        reason: "empty encoded file".into(),
    })?;
    if *version != FORMAT_VERSION {
        return Err(EngineError::Decode {
            field_path: "$".into(),
            reason: format!("unsupported format version {version}"),
        });
    }
    let mut deserializer = serde_json::Deserializer::from_slice(payload);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| EngineError::Decode {
        field_path: e.path().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Config, Manifest, Package, Resource, Resources};
    use std::time::Duration;

    fn sample() -> Manifest {
        let mut resources = Resources::default();
        resources.insert(Resource::new("https://cdn/r", "r.png").with_checksum("abc123"));
        Manifest {
            config: Config::new("1.0.0", Duration::from_secs(10)),
            package: Package {
                name: "host".into(),
                version: "1.0.0".into(),
                index: Resource::new("https://cdn/i", "index.jsbundle"),
                properties: Default::default(),
                important: vec![],
                lazy: vec![],
            },
            resources,
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let manifest = sample();
        let bytes = encode(&manifest).unwrap();
        assert_eq!(bytes[0], FORMAT_VERSION);
        let back: Manifest = decode(&bytes).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn rejects_unknown_format_version() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[0] = 99;
        let result: Result<Manifest> = decode(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_buffer() {
        let result: Result<Manifest> = decode(&[]);
        assert!(result.is_err());
    }
}
