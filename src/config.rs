//! Configuration types for the onboarding client.
//!
//! All client behaviour is controlled through [`ClientConfig`], built via its
//! [`ClientConfigBuilder`]. One struct carries the HTTP settings and the
//! document-normalisation settings so the CLI, the orchestrator and tests
//! all share a single source of defaults.

use crate::error::OnboardingError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Base URL used when neither the caller nor the session store provides one.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Device label sent with the login request.
pub const DEFAULT_DEVICE_NAME: &str = "sirac-onboard";

/// Configuration for an onboarding session.
///
/// Built via [`ClientConfig::builder()`] or using [`ClientConfig::default()`].
///
/// # Example
/// ```rust
/// use sirac_onboarding::{ClientConfig, PageSize};
///
/// let config = ClientConfig::builder()
///     .base_url("https://sirac.example.org")
///     .timeout_secs(30)
///     .page_size(PageSize::FitImage)
///     .build()
///     .unwrap();
/// assert_eq!(config.timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend root, without the `/api/v1` prefix. Default: [`DEFAULT_BASE_URL`].
    ///
    /// A base URL saved in the session store (`sirac_api_base_url`) takes
    /// precedence; see [`crate::session::Session::base_url`].
    pub base_url: String,

    /// Whole-request timeout in seconds. Default: 15.
    ///
    /// Applies to login and submission alike. A timed-out call is reported
    /// as [`OnboardingError::Timeout`] and never retried automatically.
    pub timeout_secs: u64,

    /// Device label sent as `device_name` on login. Default: `"sirac-onboard"`.
    pub device_name: String,

    /// Where rendered PDFs are written. Default: `<tmp>/sirac-documents`.
    pub output_dir: Option<PathBuf>,

    /// Page geometry for rendered images. Default: [`PageSize::A4`].
    pub page_size: PageSize,

    /// Longest image edge in pixels before embedding. Default: 2000.
    ///
    /// Phone cameras produce 12+ megapixel photos; embedding them raw
    /// yields 30–40 MB uploads. Larger images are downscaled with their
    /// aspect ratio preserved.
    pub max_image_pixels: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 15,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            output_dir: None,
            page_size: PageSize::default(),
            max_image_pixels: 2000,
        }
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory for rendered PDFs, resolving the default.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("sirac-documents"))
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.config.device_name = name.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn max_image_pixels(mut self, px: u32) -> Self {
        self.config.max_image_pixels = px.max(100);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, OnboardingError> {
        let c = &self.config;
        if !is_http_url(&c.base_url) {
            return Err(OnboardingError::InvalidConfig(format!(
                "Base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.timeout_secs == 0 {
            return Err(OnboardingError::InvalidConfig(
                "Timeout must be ≥ 1 second".into(),
            ));
        }
        if c.device_name.trim().is_empty() {
            return Err(OnboardingError::InvalidConfig(
                "Device name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_http_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Page geometry for an image rendered into a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    /// ISO A4 portrait, 595 × 842 pt. (default)
    #[default]
    A4,
    /// US Letter portrait, 612 × 792 pt.
    Letter,
    /// Page matches the image aspect ratio exactly (1 px = 1 pt after capping).
    FitImage,
}

impl PageSize {
    /// Page width and height in points for an image of the given size.
    pub fn dimensions_pt(&self, image_width: u32, image_height: u32) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.0, 842.0),
            PageSize::Letter => (612.0, 792.0),
            PageSize::FitImage => (image_width.max(1) as f32, image_height.max(1) as f32),
        }
    }

    /// Placement `(x, y, width, height)` in points that fits the image inside
    /// the page with no margins, centred on the free axis.
    pub fn placement(&self, image_width: u32, image_height: u32) -> (f32, f32, f32, f32) {
        let (page_w, page_h) = self.dimensions_pt(image_width, image_height);
        let (iw, ih) = (image_width.max(1) as f32, image_height.max(1) as f32);
        let scale = (page_w / iw).min(page_h / ih);
        let (w, h) = (iw * scale, ih * scale);
        ((page_w - w) / 2.0, (page_h - h) / 2.0, w, h)
    }
}
