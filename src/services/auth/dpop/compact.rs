//! Compact JWS decoding (`header.payload.signature`).
//!
//! Pure syntax: no trust decisions are made here. The signature segment is
//! kept encoded and only decoded when a verifier asks for it.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedTokenError {
    #[error("token must consist of exactly three segments")]
    SegmentCount,
    #[error("token {0} segment is empty")]
    EmptySegment(&'static str),
    #[error("token {0} segment is not valid base64url")]
    Base64(&'static str),
    #[error("token {0} segment is not a JSON object")]
    NotAnObject(&'static str),
    #[error("token {0} segment has no members")]
    EmptyObject(&'static str),
}

/// A syntactically valid compact token.
#[derive(Debug, Clone)]
pub struct CompactJwt {
    raw: String,
    // Byte offset of the second '.', i.e. the end of the signing input.
    signing_input_end: usize,
    header: JsonObject,
    payload: JsonObject,
}

impl CompactJwt {
    pub fn decode(token: &str) -> Result<Self, MalformedTokenError> {
        let mut segments = token.split('.');
        let (header_b64, payload_b64, signature_b64) = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(MalformedTokenError::SegmentCount),
        };

        if header_b64.is_empty() {
            return Err(MalformedTokenError::EmptySegment("header"));
        }
        if payload_b64.is_empty() {
            return Err(MalformedTokenError::EmptySegment("payload"));
        }
        if signature_b64.is_empty() {
            return Err(MalformedTokenError::EmptySegment("signature"));
        }

        let header = decode_object(header_b64, "header")?;
        let payload = decode_object(payload_b64, "payload")?;

        Ok(Self {
            raw: token.to_string(),
            signing_input_end: header_b64.len() + 1 + payload_b64.len(),
            header,
            payload,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn header(&self) -> &JsonObject {
        &self.header
    }

    pub fn payload(&self) -> &JsonObject {
        &self.payload
    }

    /// `base64url(header) "." base64url(payload)`, the bytes covered by the signature.
    pub fn signing_input(&self) -> &str {
        &self.raw[..self.signing_input_end]
    }

    pub fn signature(&self) -> Result<Vec<u8>, MalformedTokenError> {
        URL_SAFE_NO_PAD
            .decode(&self.raw[self.signing_input_end + 1..])
            .map_err(|_| MalformedTokenError::Base64("signature"))
    }
}

fn decode_object(segment: &str, name: &'static str) -> Result<JsonObject, MalformedTokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| MalformedTokenError::Base64(name))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) if map.is_empty() => Err(MalformedTokenError::EmptyObject(name)),
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(MalformedTokenError::NotAnObject(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(s: &str) -> String {
        URL_SAFE_NO_PAD.encode(s.as_bytes())
    }

    fn token(header: &str, payload: &str, signature: &str) -> String {
        format!("{}.{}.{}", b64(header), b64(payload), signature)
    }

    #[test]
    fn test_decodes_header_and_payload() {
        let raw = token(r#"{"alg":"ES256"}"#, r#"{"jti":"abc","iat":1}"#, "c2ln");
        let jwt = CompactJwt::decode(&raw).unwrap();

        assert_eq!(jwt.header()["alg"], "ES256");
        assert_eq!(jwt.payload()["jti"], "abc");
        assert_eq!(jwt.payload()["iat"], 1);
        assert_eq!(jwt.signature().unwrap(), b"sig");
        assert_eq!(jwt.raw(), raw);
    }

    #[test]
    fn test_signing_input_excludes_signature() {
        let raw = token(r#"{"alg":"ES256"}"#, r#"{"jti":"abc"}"#, "c2ln");
        let jwt = CompactJwt::decode(&raw).unwrap();

        assert_eq!(
            jwt.signing_input(),
            format!("{}.{}", b64(r#"{"alg":"ES256"}"#), b64(r#"{"jti":"abc"}"#))
        );
    }

    #[test]
    fn test_rejects_wrong_segment_count() {
        let header = b64(r#"{"alg":"ES256"}"#);
        let payload = b64(r#"{"jti":"abc"}"#);

        for raw in [
            String::new(),
            "no-dots-at-all".to_string(),
            format!("{header}.{payload}"),
            format!("{header}.{payload}.c2ln.extra"),
            format!("{header}.{payload}.c2ln.."),
            ".....".to_string(),
        ] {
            assert_eq!(
                CompactJwt::decode(&raw).unwrap_err(),
                MalformedTokenError::SegmentCount,
                "input: {raw:?}"
            );
        }
    }

    #[test]
    fn test_rejects_empty_segments() {
        let header = b64(r#"{"alg":"ES256"}"#);
        let payload = b64(r#"{"jti":"abc"}"#);

        assert_eq!(
            CompactJwt::decode(&format!(".{payload}.c2ln")).unwrap_err(),
            MalformedTokenError::EmptySegment("header")
        );
        assert_eq!(
            CompactJwt::decode(&format!("{header}..c2ln")).unwrap_err(),
            MalformedTokenError::EmptySegment("payload")
        );
        assert_eq!(
            CompactJwt::decode(&format!("{header}.{payload}.")).unwrap_err(),
            MalformedTokenError::EmptySegment("signature")
        );
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let payload = b64(r#"{"jti":"abc"}"#);
        assert_eq!(
            CompactJwt::decode(&format!("!!!.{payload}.c2ln")).unwrap_err(),
            MalformedTokenError::Base64("header")
        );

        // Standard alphabet / padding are not base64url.
        let padded = format!("{}=", b64(r#"{"alg":"ES256"}"#));
        assert!(CompactJwt::decode(&format!("{padded}.{payload}.c2ln")).is_err());
    }

    #[test]
    fn test_rejects_non_object_json() {
        for header in [r#"["ES256"]"#, r#""ES256""#, "42", "null", "{not json"] {
            let raw = token(header, r#"{"jti":"abc"}"#, "c2ln");
            assert_eq!(
                CompactJwt::decode(&raw).unwrap_err(),
                MalformedTokenError::NotAnObject("header"),
                "header: {header}"
            );
        }
    }

    #[test]
    fn test_rejects_empty_object() {
        let raw = token(r#"{"alg":"ES256"}"#, "{}", "c2ln");
        assert_eq!(
            CompactJwt::decode(&raw).unwrap_err(),
            MalformedTokenError::EmptyObject("payload")
        );
    }

    #[test]
    fn test_invalid_signature_encoding_is_reported_lazily() {
        let raw = token(r#"{"alg":"ES256"}"#, r#"{"jti":"abc"}"#, "%%%");
        let jwt = CompactJwt::decode(&raw).unwrap();

        assert_eq!(
            jwt.signature().unwrap_err(),
            MalformedTokenError::Base64("signature")
        );
    }
}
