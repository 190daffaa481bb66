//! Input resolution: turn a picked URI into a local file and classify it.
//!
//! Pickers hand back three shapes of URI:
//!
//! * a plain path (`/storage/emulated/0/DCIM/bi.jpg`),
//! * a `file://` URI, percent-encoded (`file:///tmp/my%20bi.jpg`),
//! * a `data:` URI carrying base64 bytes (web pickers).
//!
//! Data URIs are decoded into the output directory so the rest of the
//! pipeline, and the multipart upload, only ever deal with files.

use crate::error::{ConversionError, OnboardingError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions the normaliser renders into a PDF.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// How the normaliser will treat a picked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    /// Raster image; will be rendered into a PDF.
    Image { extension: String },
    /// Anything else (including PDFs); uploaded unchanged.
    Passthrough { extension: String },
}

impl DocumentKind {
    pub fn extension(&self) -> &str {
        match self {
            DocumentKind::Image { extension } | DocumentKind::Passthrough { extension } => {
                extension
            }
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, DocumentKind::Image { .. })
    }
}

/// A picked document resolved to a local file.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub path: PathBuf,
    pub kind: DocumentKind,
    /// `true` when this crate wrote the file (decoded data URI).
    pub generated: bool,
}

/// Check if the input string is a `data:` URI.
pub fn is_data_uri(input: &str) -> bool {
    input.starts_with("data:")
}

/// Whether `ext` (lower-case) is one of [`IMAGE_EXTENSIONS`].
pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext)
}

/// Lower-cased text after the last `.` of the last path segment.
///
/// For `data:` URIs the MIME subtype is used instead (`image/jpeg` → `jpeg`).
/// Returns an empty string when there is no extension.
pub fn extension_of(uri: &str) -> String {
    if is_data_uri(uri) {
        return data_uri_mime(uri)
            .map(|mime| extension_for_mime(&mime))
            .unwrap_or_default();
    }

    let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
    let segment = without_query
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(without_query);
    segment
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Classify a picked URI by extension.
pub fn classify(uri: &str) -> DocumentKind {
    let extension = extension_of(uri);
    if is_image_extension(&extension) {
        DocumentKind::Image { extension }
    } else {
        DocumentKind::Passthrough { extension }
    }
}

/// Resolve a picked URI to a readable local file.
///
/// Data URIs are decoded into `scratch_dir` under a fresh unique name.
pub fn resolve_input(uri: &str, scratch_dir: &Path) -> Result<ResolvedInput, OnboardingError> {
    let kind = classify(uri);

    if is_data_uri(uri) {
        let path = decode_data_uri(uri, kind.extension(), scratch_dir)?;
        debug!("Decoded data URI → {}", path.display());
        return Ok(ResolvedInput {
            path,
            kind,
            generated: true,
        });
    }

    let path = local_path(uri);
    if !path.is_file() {
        return Err(OnboardingError::DocumentNotFound {
            uri: uri.to_string(),
        });
    }

    debug!("Resolved local document: {}", path.display());
    Ok(ResolvedInput {
        path,
        kind,
        generated: false,
    })
}

/// Map a plain path or `file://` URI to a filesystem path.
pub fn local_path(uri: &str) -> PathBuf {
    if uri.starts_with("file://") {
        if let Ok(parsed) = reqwest::Url::parse(uri) {
            if let Ok(path) = parsed.to_file_path() {
                return path;
            }
        }
        return PathBuf::from(uri.trim_start_matches("file://"));
    }
    PathBuf::from(uri)
}

// ── Data URIs ────────────────────────────────────────────────────────────

fn data_uri_mime(uri: &str) -> Option<String> {
    let header = uri.strip_prefix("data:")?.split_once(',')?.0;
    let mime = header.split(';').next()?.trim().to_lowercase();
    if mime.is_empty() {
        None
    } else {
        Some(mime)
    }
}

fn extension_for_mime(mime: &str) -> String {
    let subtype = mime.split_once('/').map(|(_, s)| s).unwrap_or(mime);
    let subtype = subtype.split('+').next().unwrap_or(subtype);
    match subtype {
        "x-ms-bmp" => "bmp".to_string(),
        other => other.to_string(),
    }
}

fn decode_data_uri(
    uri: &str,
    extension: &str,
    scratch_dir: &Path,
) -> Result<PathBuf, OnboardingError> {
    let invalid =
        |detail: String| OnboardingError::Conversion(ConversionError::InvalidDataUri { detail });

    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| invalid("missing 'data:' prefix".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("missing ',' separator".into()))?;
    if !header.split(';').any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(invalid("only base64 data URIs are supported".into()));
    }

    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| invalid(e.to_string()))?;

    std::fs::create_dir_all(scratch_dir).map_err(|source| OnboardingError::Io {
        path: scratch_dir.to_path_buf(),
        source,
    })?;

    let suffix = if extension.is_empty() {
        String::new()
    } else {
        format!(".{extension}")
    };
    let io_err = |source| OnboardingError::Io {
        path: scratch_dir.to_path_buf(),
        source,
    };
    let mut file = tempfile::Builder::new()
        .prefix("picked_")
        .suffix(&suffix)
        .tempfile_in(scratch_dir)
        .map_err(io_err)?;
    file.write_all(&bytes).map_err(io_err)?;
    let (_, path) = file.keep().map_err(|e| io_err(e.error))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_text_after_last_dot() {
        assert_eq!(extension_of("file:///sdcard/DCIM/IMG_001.JPG"), "jpg");
        assert_eq!(extension_of("/tmp/scan.final.pdf"), "pdf");
        assert_eq!(extension_of("/tmp/dir.d/noext"), "");
        assert_eq!(extension_of("https://cdn.example.org/a.png?size=2"), "png");
        assert_eq!(extension_of("/tmp/.hidden"), "hidden");
    }

    #[test]
    fn data_uri_extension_comes_from_mime() {
        assert_eq!(extension_of("data:image/jpeg;base64,AAAA"), "jpeg");
        assert_eq!(extension_of("data:image/svg+xml;base64,AAAA"), "svg");
        assert_eq!(extension_of("data:,hello"), "");
    }

    #[test]
    fn classify_images_and_passthrough() {
        for ext in IMAGE_EXTENSIONS {
            assert!(classify(&format!("/tmp/x.{ext}")).is_image(), "{ext}");
        }
        assert_eq!(
            classify("/tmp/x.pdf"),
            DocumentKind::Passthrough {
                extension: "pdf".into()
            }
        );
        assert!(!classify("/tmp/x.heic").is_image());
    }

    #[test]
    fn file_uri_is_percent_decoded() {
        let p = local_path("file:///tmp/my%20bi.jpg");
        assert_eq!(p, PathBuf::from("/tmp/my bi.jpg"));
        assert_eq!(local_path("/tmp/a.pdf"), PathBuf::from("/tmp/a.pdf"));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input("/definitely/not/here.jpg", dir.path()).unwrap_err();
        assert!(matches!(err, OnboardingError::DocumentNotFound { .. }));
    }

    #[test]
    fn data_uri_is_decoded_to_a_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("data:application/pdf;base64,{}", STANDARD.encode(b"%PDF-1.4 test"));

        let a = resolve_input(&uri, dir.path()).unwrap();
        let b = resolve_input(&uri, dir.path()).unwrap();
        assert!(a.generated);
        assert_ne!(a.path, b.path);
        assert_eq!(a.path.extension().unwrap(), "pdf");
        assert_eq!(std::fs::read(&a.path).unwrap(), b"%PDF-1.4 test");
    }

    #[test]
    fn non_base64_data_uri_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input("data:text/plain,hello", dir.path()).unwrap_err();
        assert!(matches!(
            err,
            OnboardingError::Conversion(ConversionError::InvalidDataUri { .. })
        ));
    }
}
