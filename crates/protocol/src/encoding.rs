//! Serde helpers for byte payloads carried as base64 strings.
//!
//! JSON has no byte type, so file contents travel as standard-alphabet base64
//! (with padding) in both directions.

/// Serde support for `Vec<u8>` fields (serializes as base64).
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        BASE64.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: String = Deserialize::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }

    /// Same encoding for `Option<Vec<u8>>`; `null` maps to `None`.
    pub mod option {
        use super::BASE64;
        use base64::Engine as _;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match bytes {
                Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let encoded: Option<String> = Deserialize::deserialize(deserializer)?;
            encoded
                .map(|s| BASE64.decode(s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Blob {
        #[serde(with = "super::base64_bytes")]
        data: Vec<u8>,
        #[serde(default, with = "super::base64_bytes::option")]
        extra: Option<Vec<u8>>,
    }

    #[test]
    fn test_bytes_encode_as_padded_base64() {
        let blob = Blob {
            data: b"hello".to_vec(),
            extra: None,
        };
        let json = serde_json::to_string(&blob).unwrap();
        assert_eq!(json, r#"{"data":"aGVsbG8=","extra":null}"#);
    }

    #[test]
    fn test_missing_and_null_option_decode_to_none() {
        let missing: Blob = serde_json::from_str(r#"{"data":""}"#).unwrap();
        assert_eq!(missing.data, Vec::<u8>::new());
        assert_eq!(missing.extra, None);

        let null: Blob = serde_json::from_str(r#"{"data":"","extra":null}"#).unwrap();
        assert_eq!(null.extra, None);
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let result = serde_json::from_str::<Blob>(r#"{"data":"not base64!"}"#);
        assert!(result.is_err());
    }
}
