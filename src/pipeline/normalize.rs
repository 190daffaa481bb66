//! Document normalisation: raster image → single-page PDF.
//!
//! The backend only accepts PDFs for document slots. Photos picked from the
//! camera or gallery are decoded, downscaled to `max_image_pixels`, flattened
//! onto white and embedded full-bleed on one page. Everything that is not a
//! raster image (PDFs included) is uploaded as picked.
//!
//! ## Failing open
//!
//! [`Normalizer::normalize`] never loses the user's pick: when an image
//! cannot be converted the failure is raised as a blocking alert and the
//! original file comes back with `converted = false`. The assembler labels
//! that file by its real type instead of pretending it is a PDF.
//! [`Normalizer::try_normalize`] is the strict variant.
//!
//! Rendering is CPU-bound and runs in `spawn_blocking`.

use crate::config::{ClientConfig, PageSize};
use crate::error::{ConversionError, OnboardingError};
use crate::model::NormalizedDocument;
use crate::notify::{Alert, SharedAlertSink};
use crate::pipeline::input::{self, ResolvedInput};
use flate2::{write::ZlibEncoder, Compression};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Converts picked files into uploadable documents.
#[derive(Clone)]
pub struct Normalizer {
    output_dir: PathBuf,
    page_size: PageSize,
    max_image_pixels: u32,
    alerts: SharedAlertSink,
}

impl Normalizer {
    pub fn new(config: &ClientConfig, alerts: SharedAlertSink) -> Self {
        Self {
            output_dir: config.resolved_output_dir(),
            page_size: config.page_size,
            max_image_pixels: config.max_image_pixels,
            alerts,
        }
    }

    /// Directory receiving rendered PDFs and decoded data URIs.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Normalise `uri`, failing open on conversion errors.
    ///
    /// # Errors
    /// Only when the pick itself is unusable: the file does not exist or a
    /// `data:` URI is malformed. Conversion failures are alerted, not
    /// returned.
    pub async fn normalize(&self, uri: &str) -> Result<NormalizedDocument, OnboardingError> {
        let resolved = input::resolve_input(uri, &self.output_dir)?;
        match self.convert_resolved(uri, &resolved).await {
            Ok(doc) => Ok(doc),
            Err(e) => {
                warn!("Keeping original file for '{}': {}", uri, e);
                self.alerts.on_alert(&Alert::conversion(e.to_string()));
                let doc = passthrough(uri, &resolved);
                self.alerts.on_normalize_complete(&doc);
                Ok(doc)
            }
        }
    }

    /// Normalise `uri`, returning conversion failures as errors.
    pub async fn try_normalize(&self, uri: &str) -> Result<NormalizedDocument, OnboardingError> {
        let resolved = input::resolve_input(uri, &self.output_dir)?;
        Ok(self.convert_resolved(uri, &resolved).await?)
    }

    /// Delete a file this normaliser produced. User files are left alone,
    /// wherever they live.
    pub fn discard(&self, doc: &NormalizedDocument) {
        if !doc.generated {
            return;
        }
        match std::fs::remove_file(&doc.path) {
            Ok(()) => debug!("Removed superseded document {}", doc.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", doc.path.display(), e),
        }
    }

    async fn convert_resolved(
        &self,
        uri: &str,
        resolved: &ResolvedInput,
    ) -> Result<NormalizedDocument, ConversionError> {
        self.alerts.on_normalize_start(uri);

        if !resolved.kind.is_image() {
            debug!(
                "'{}' is not a raster image (.{}); passing through",
                uri,
                resolved.kind.extension()
            );
            let doc = passthrough(uri, resolved);
            self.alerts.on_normalize_complete(&doc);
            return Ok(doc);
        }

        let source = resolved.path.clone();
        let output_dir = self.output_dir.clone();
        let page_size = self.page_size;
        let max_pixels = self.max_image_pixels;

        let pdf_path = tokio::task::spawn_blocking(move || {
            convert_file_blocking(&source, &output_dir, page_size, max_pixels)
        })
        .await
        .map_err(|e| ConversionError::RenderFailed {
            path: resolved.path.clone(),
            detail: format!("render task panicked: {e}"),
        })??;

        // A decoded data URI is only an intermediate once the PDF exists.
        if resolved.generated {
            if let Err(e) = std::fs::remove_file(&resolved.path) {
                warn!("Could not remove decoded input {}: {}", resolved.path.display(), e);
            }
        }

        info!("Converted '{}' → {}", uri, pdf_path.display());
        let doc = NormalizedDocument {
            path: pdf_path,
            original_uri: uri.to_string(),
            extension: "pdf".into(),
            converted: true,
            generated: true,
        };
        self.alerts.on_normalize_complete(&doc);
        Ok(doc)
    }
}

fn passthrough(uri: &str, resolved: &ResolvedInput) -> NormalizedDocument {
    NormalizedDocument {
        path: resolved.path.clone(),
        original_uri: uri.to_string(),
        extension: resolved.kind.extension().to_string(),
        converted: false,
        generated: resolved.generated,
    }
}

/// Read `source`, render it and write a fresh PDF into `output_dir`.
fn convert_file_blocking(
    source: &Path,
    output_dir: &Path,
    page_size: PageSize,
    max_pixels: u32,
) -> Result<PathBuf, ConversionError> {
    let bytes = std::fs::read(source).map_err(|e| ConversionError::ReadFailed {
        path: source.to_path_buf(),
        detail: e.to_string(),
    })?;

    let pdf = render_image_to_pdf(&bytes, page_size, max_pixels).map_err(|e| match e {
        RenderError::Decode(detail) => ConversionError::DecodeFailed {
            path: source.to_path_buf(),
            detail,
        },
        RenderError::Pdf(detail) => ConversionError::RenderFailed {
            path: source.to_path_buf(),
            detail,
        },
    })?;

    let render_err = |e: std::io::Error| ConversionError::RenderFailed {
        path: source.to_path_buf(),
        detail: e.to_string(),
    };

    std::fs::create_dir_all(output_dir).map_err(render_err)?;

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_stem)
        .unwrap_or_else(|| "document".to_string());

    // Random suffix: a re-added slot never collides with an older render.
    let mut file = tempfile::Builder::new()
        .prefix(&format!("{stem}_"))
        .suffix(".pdf")
        .tempfile_in(output_dir)
        .map_err(render_err)?;
    file.write_all(&pdf).map_err(render_err)?;
    let (_, path) = file.keep().map_err(|e| render_err(e.error))?;

    Ok(path)
}

fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(40)
        .collect();
    if cleaned.is_empty() {
        "document".into()
    } else {
        cleaned
    }
}

// ── Rendering ────────────────────────────────────────────────────────────

/// Failure inside [`render_image_to_pdf`].
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("decode failed: {0}")]
    Decode(String),

    #[error("PDF build failed: {0}")]
    Pdf(String),
}

/// Render encoded image bytes into a one-page PDF.
pub fn render_image_to_pdf(
    image_bytes: &[u8],
    page_size: PageSize,
    max_pixels: u32,
) -> Result<Vec<u8>, RenderError> {
    let img =
        image::load_from_memory(image_bytes).map_err(|e| RenderError::Decode(e.to_string()))?;

    let img = if img.width().max(img.height()) > max_pixels {
        img.resize(max_pixels, max_pixels, FilterType::Triangle)
    } else {
        img
    };

    let rgb = flatten_onto_white(&img);
    let (w, h) = rgb.dimensions();
    debug!("Embedding {}x{} px image", w, h);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(rgb.as_raw())
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    let pixels = encoder.finish().map_err(|e| RenderError::Pdf(e.to_string()))?;

    let (page_w, page_h) = page_size.dimensions_pt(w, h);
    let (x, y, draw_w, draw_h) = page_size.placement(w, h);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => w as i64,
            "Height" => h as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        pixels,
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(draw_w),
                    0.into(),
                    0.into(),
                    Object::Real(draw_h),
                    Object::Real(x),
                    Object::Real(y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content.encode().map_err(|e| RenderError::Pdf(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "MediaBox" => vec![0.into(), 0.into(), Object::Real(page_w), Object::Real(page_h)],
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(out)
}

/// Drop the alpha channel by compositing over white.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u16 * a as u16 + 255 * (255 - a as u16)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}
