//! Decoding of `data:` URLs as produced by mobile image pickers and camera
//! plugins (`data:image/jpeg;base64,...`).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("not a data URL")]
    MissingScheme,

    #[error("data URL has no ',' separator")]
    MissingSeparator,

    #[error("only base64 data URLs are supported")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// Media type from the header, `application/octet-stream` when omitted
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn parse(url: &str) -> Result<Self, DataUrlError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or(DataUrlError::MissingScheme)?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or(DataUrlError::MissingSeparator)?;

        let mut params = header.split(';');
        let mime = params
            .next()
            .filter(|m| !m.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();
        if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(DataUrlError::NotBase64);
        }

        // Some encoders wrap long payloads
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| DataUrlError::InvalidPayload(e.to_string()))?;

        Ok(Self { mime, bytes })
    }

    /// File extension matching the media type, used when naming uploads.
    pub fn extension(&self) -> &str {
        match self.mime.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/bmp" => "bmp",
            _ => "jpg",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_png_data_url() {
        let url = "data:image/png;base64,aGVsbG8=";
        let parsed = DataUrl::parse(url).unwrap();
        assert_eq!(parsed.mime, "image/png");
        assert_eq!(parsed.bytes, b"hello");
        assert_eq!(parsed.extension(), "png");
    }

    #[test]
    fn test_missing_mime_defaults_to_octet_stream() {
        let parsed = DataUrl::parse("data:;base64,aGVsbG8=").unwrap();
        assert_eq!(parsed.mime, "application/octet-stream");
        assert_eq!(parsed.extension(), "jpg");
    }

    #[test]
    fn test_rejects_plain_text_payload() {
        assert_eq!(
            DataUrl::parse("data:text/plain,hello"),
            Err(DataUrlError::NotBase64)
        );
    }

    #[test]
    fn test_rejects_non_data_scheme() {
        assert_eq!(
            DataUrl::parse("file:///tmp/eye.jpg"),
            Err(DataUrlError::MissingScheme)
        );
    }

    #[test]
    fn test_rejects_corrupt_base64() {
        assert!(matches!(
            DataUrl::parse("data:image/jpeg;base64,@@@"),
            Err(DataUrlError::InvalidPayload(_))
        ));
    }
}
