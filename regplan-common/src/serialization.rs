use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Serialization format for written read plans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON format (human-readable, good for debugging).
    #[default]
    Json,

    /// CBOR format (compact binary, for handing plans to an embedded transport).
    Cbor,
}

impl Format {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Cbor => "application/cbor",
        }
    }

    /// Conventional file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Cbor => "cbor",
        }
    }
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec_pretty(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
    }
}

/// Try to auto-detect the format from the data.
///
/// Returns `Json` if the data starts with `{` or `[` (after leading
/// whitespace), otherwise `Cbor`.
pub fn detect_format(data: &[u8]) -> Format {
    match data.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') | Some(b'[') => Format::Json,
        _ => Format::Cbor,
    }
}

/// Decode bytes, auto-detecting the format.
pub fn decode_auto<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let format = detect_format(data);
    decode(data, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Batch {
        device: String,
        reads: Vec<(u16, u16)>,
    }

    fn sample() -> Batch {
        Batch {
            device: "meter01".to_string(),
            reads: vec![(0, 10), (40, 2), (100, 125)],
        }
    }

    #[test]
    fn test_json_decode_matches() {
        let encoded = encode(&sample(), Format::Json).unwrap();
        let decoded: Batch = decode(&encoded, Format::Json).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_cbor_decode_matches() {
        let encoded = encode(&sample(), Format::Cbor).unwrap();
        let decoded: Batch = decode(&encoded, Format::Cbor).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_cbor_is_smaller() {
        let json = encode(&sample(), Format::Json).unwrap();
        let cbor = encode(&sample(), Format::Cbor).unwrap();

        assert!(cbor.len() < json.len(), "CBOR should be smaller than JSON");
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(detect_format(b"{\"key\": \"value\"}"), Format::Json);
        assert_eq!(detect_format(b"[1, 2, 3]"), Format::Json);
        assert_eq!(detect_format(b"\n  [1]"), Format::Json);
        assert_eq!(detect_format(b"\xa1\x63key\x65value"), Format::Cbor);
    }

    #[test]
    fn test_auto_decode() {
        let json = encode(&sample(), Format::Json).unwrap();
        let decoded: Batch = decode_auto(&json).unwrap();
        assert_eq!(decoded.device, "meter01");

        let cbor = encode(&sample(), Format::Cbor).unwrap();
        let decoded: Batch = decode_auto(&cbor).unwrap();
        assert_eq!(decoded.reads.len(), 3);
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let result: Result<Batch> = decode(b"not json", Format::Json);
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(Format::Json.mime_type(), "application/json");
        assert_eq!(Format::Cbor.extension(), "cbor");
    }
}
