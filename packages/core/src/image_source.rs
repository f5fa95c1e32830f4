//! Image references handed in by the host app and their resolved bytes.

use crate::error::{InputError, PreprocessingError};
use smartsight_types::Bytes;
use smartsight_types::mime_guess;
use smartsight_types::tokio;
use smartsight_types::utils::data_url::DataUrl;
use std::path::{Path, PathBuf};

const DEFAULT_FILE_NAME: &str = "photo.jpg";
const DEFAULT_MIME: &str = "image/jpeg";

/// Where the image to analyze comes from.
#[derive(Clone, Debug)]
pub enum ImageSource {
    /// Local file path
    Path(PathBuf),
    /// `file://` or `data:` URI as produced by camera and picker plugins
    Uri(String),
    /// Image already in memory
    Bytes {
        bytes: Bytes,
        file_name: Option<String>,
    },
}

/// Resolved image ready to be uploaded or decoded.
#[derive(Clone, Debug)]
pub struct ImagePayload {
    pub bytes: Bytes,
    pub file_name: String,
    pub mime: String,
}

impl ImageSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        ImageSource::Path(path.into())
    }

    pub fn from_uri(uri: impl Into<String>) -> Self {
        ImageSource::Uri(uri.into())
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        ImageSource::Bytes {
            bytes: bytes.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(self, name: impl Into<String>) -> Self {
        match self {
            ImageSource::Bytes { bytes, .. } => ImageSource::Bytes {
                bytes,
                file_name: Some(name.into()),
            },
            other => other,
        }
    }

    /// Rejects references that carry nothing to analyze.
    pub fn validate(&self) -> Result<(), InputError> {
        match self {
            ImageSource::Path(path) if path.as_os_str().is_empty() => {
                Err(InputError::EmptyReference)
            }
            ImageSource::Uri(uri) if uri.trim().is_empty() => Err(InputError::EmptyReference),
            ImageSource::Bytes { bytes, .. } if bytes.is_empty() => Err(InputError::EmptyData),
            _ => Ok(()),
        }
    }

    /// Short description for logs and history records. Never contains
    /// inline image data.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Uri(uri) if uri.starts_with("data:") => {
                let header = uri.split(',').next().unwrap_or("data:");
                format!("{header},...")
            }
            ImageSource::Uri(uri) => uri.clone(),
            ImageSource::Bytes { bytes, file_name } => match file_name {
                Some(name) => format!("{name} ({} bytes)", bytes.len()),
                None => format!("<memory> ({} bytes)", bytes.len()),
            },
        }
    }

    pub async fn load(&self) -> Result<ImagePayload, PreprocessingError> {
        let payload = match self {
            ImageSource::Path(path) => read_file(path).await?,
            ImageSource::Uri(uri) => {
                if let Some(rest) = uri.strip_prefix("file://") {
                    read_file(&file_uri_path(uri, rest)?).await?
                } else if uri.starts_with("data:") {
                    let data = DataUrl::parse(uri)?;
                    ImagePayload {
                        file_name: format!("photo.{}", data.extension()),
                        mime: data.mime.clone(),
                        bytes: Bytes::from(data.bytes),
                    }
                } else if !uri.contains("://") {
                    read_file(Path::new(uri)).await?
                } else {
                    return Err(PreprocessingError::UnsupportedReference(uri.clone()));
                }
            }
            ImageSource::Bytes { bytes, file_name } => {
                let file_name = file_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
                ImagePayload {
                    mime: mime_for(&file_name),
                    file_name,
                    bytes: bytes.clone(),
                }
            }
        };

        if payload.bytes.is_empty() {
            return Err(PreprocessingError::Empty);
        }
        Ok(payload)
    }
}

async fn read_file(path: &Path) -> Result<ImagePayload, PreprocessingError> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
    Ok(ImagePayload {
        mime: mime_for(&file_name),
        file_name,
        bytes: Bytes::from(bytes),
    })
}

/// Path of a `file://` URI. Pickers percent-encode file names and some
/// emit the `localhost` authority.
fn file_uri_path(uri: &str, rest: &str) -> Result<PathBuf, PreprocessingError> {
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    if !rest.starts_with('/') {
        return Err(PreprocessingError::UnsupportedReference(uri.to_string()));
    }
    let decoded = urlencoding::decode(rest)
        .map_err(|_| PreprocessingError::UnsupportedReference(uri.to_string()))?;
    Ok(PathBuf::from(decoded.into_owned()))
}

fn mime_for(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first()
        .filter(|m| m.type_() == mime_guess::mime::IMAGE)
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_MIME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_references() {
        assert_eq!(
            ImageSource::from_path("").validate(),
            Err(InputError::EmptyReference)
        );
        assert_eq!(
            ImageSource::from_uri("   ").validate(),
            Err(InputError::EmptyReference)
        );
        assert_eq!(
            ImageSource::from_bytes(Vec::new()).validate(),
            Err(InputError::EmptyData)
        );
        assert!(ImageSource::from_uri("file:///tmp/eye.png").validate().is_ok());
    }

    #[test]
    fn test_mime_guessing() {
        assert_eq!(mime_for("eye.png"), "image/png");
        assert_eq!(mime_for("eye.JPG"), "image/jpeg");
        assert_eq!(mime_for("eye"), "image/jpeg");
        assert_eq!(mime_for("notes.txt"), "image/jpeg");
    }

    #[test]
    fn test_describe_hides_inline_data() {
        let source = ImageSource::from_uri("data:image/png;base64,aGVsbG8=");
        assert_eq!(source.describe(), "data:image/png;base64,...");
    }

    #[tokio::test]
    async fn test_load_data_uri() {
        let payload = ImageSource::from_uri("data:image/png;base64,aGVsbG8=")
            .load()
            .await
            .unwrap();
        assert_eq!(&payload.bytes[..], b"hello");
        assert_eq!(payload.mime, "image/png");
        assert_eq!(payload.file_name, "photo.png");
    }

    #[tokio::test]
    async fn test_load_file_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("left_eye.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        let uri = format!("file://{}", path.display());
        let payload = ImageSource::from_uri(uri).load().await.unwrap();
        assert_eq!(payload.file_name, "left_eye.png");
        assert_eq!(payload.mime, "image/png");
        assert_eq!(&payload.bytes[..], b"png-bytes");
    }

    #[tokio::test]
    async fn test_load_percent_encoded_file_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("left eye.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        let encoded = format!("{}/left%20eye.png", dir.path().display());
        for uri in [
            format!("file://{encoded}"),
            format!("file://localhost{encoded}"),
        ] {
            let payload = ImageSource::from_uri(uri).load().await.unwrap();
            assert_eq!(payload.file_name, "left eye.png");
            assert_eq!(&payload.bytes[..], b"png-bytes");
        }
    }

    #[test]
    fn test_file_uri_path_rejects_foreign_hosts() {
        assert!(matches!(
            file_uri_path("file://server/share/eye.png", "server/share/eye.png"),
            Err(PreprocessingError::UnsupportedReference(_))
        ));
        assert_eq!(
            file_uri_path("file:///a%2Fb/%C3%A4.jpg", "/a%2Fb/%C3%A4.jpg").unwrap(),
            PathBuf::from("/a/b/ä.jpg")
        );
    }

    #[tokio::test]
    async fn test_load_empty_references_resolve_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.jpg");
        std::fs::write(&path, b"").unwrap();

        for source in [
            ImageSource::from_uri("data:image/jpeg;base64,"),
            ImageSource::from_path(&path),
        ] {
            assert!(matches!(
                source.load().await,
                Err(PreprocessingError::Empty)
            ));
        }
    }

    #[tokio::test]
    async fn test_load_rejects_remote_uri() {
        let err = ImageSource::from_uri("https://example.com/eye.jpg")
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, PreprocessingError::UnsupportedReference(_)));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = ImageSource::from_path("/definitely/not/here.jpg")
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, PreprocessingError::Io(_)));
    }
}
