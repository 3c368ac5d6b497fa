//! Configuration for unlock, flatten and thumbnail runs.
//!
//! Every knob lives in [`UnlockConfig`], built through
//! [`UnlockConfigBuilder`] so callers only set what they care about.

use crate::error::UnlockError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration shared by the intake coordinator and the async entry points.
///
/// # Example
/// ```rust
/// use pdfunlock::UnlockConfig;
///
/// let config = UnlockConfig::builder()
///     .flatten_scale(3.0)
///     .password("hunter2")
///     .build()
///     .unwrap();
/// assert_eq!(config.flatten_scale, 3.0);
/// ```
#[derive(Clone)]
pub struct UnlockConfig {
    /// Render scale for grid thumbnails. Range: 0.1–2.0. Default: 0.5.
    pub thumbnail_scale: f32,

    /// Render scale used when flattening automatically. Range: 1.0–5.0. Default: 2.0.
    ///
    /// The output page keeps the source page's size in points; only the
    /// embedded bitmap grows with the scale.
    pub flatten_scale: f32,

    /// Render scale used for force-unlock. Range: 1.0–5.0. Default: 4.0.
    ///
    /// Force-unlocked output is only ever viewed as an image, so it gets
    /// the sharper render.
    pub force_flatten_scale: f32,

    /// Longest rendered edge in pixels. Default: 10 000.
    ///
    /// The effective scale of oversized pages (posters, A0 plans) is reduced
    /// so neither dimension exceeds this cap.
    pub max_rendered_pixels: u32,

    /// Password applied to every file that needs one.
    pub password: Option<String>,

    /// Skip lossless decryption and go straight to flattening.
    pub force_unlock: bool,

    /// Receives progress events for the active operation.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            thumbnail_scale: 0.5,
            flatten_scale: 2.0,
            force_flatten_scale: 4.0,
            max_rendered_pixels: 10_000,
            password: None,
            force_unlock: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for UnlockConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockConfig")
            .field("thumbnail_scale", &self.thumbnail_scale)
            .field("flatten_scale", &self.flatten_scale)
            .field("force_flatten_scale", &self.force_flatten_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("force_unlock", &self.force_unlock)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn UnlockProgressCallback>"),
            )
            .finish()
    }
}

impl UnlockConfig {
    pub fn builder() -> UnlockConfigBuilder {
        UnlockConfigBuilder {
            config: Self::default(),
        }
    }

    /// Flatten scale for the given force choice.
    pub fn scale_for(&self, force: bool) -> f32 {
        if force {
            self.force_flatten_scale
        } else {
            self.flatten_scale
        }
    }
}

/// Builder for [`UnlockConfig`].
#[derive(Debug)]
pub struct UnlockConfigBuilder {
    config: UnlockConfig,
}

impl UnlockConfigBuilder {
    pub fn thumbnail_scale(mut self, scale: f32) -> Self {
        self.config.thumbnail_scale = scale.clamp(0.1, 2.0);
        self
    }

    pub fn flatten_scale(mut self, scale: f32) -> Self {
        self.config.flatten_scale = scale.clamp(1.0, 5.0);
        self
    }

    pub fn force_flatten_scale(mut self, scale: f32) -> Self {
        self.config.force_flatten_scale = scale.clamp(1.0, 5.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn force_unlock(mut self, v: bool) -> Self {
        self.config.force_unlock = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<UnlockConfig, UnlockError> {
        let c = &self.config;
        for (name, value) in [
            ("thumbnail_scale", c.thumbnail_scale),
            ("flatten_scale", c.flatten_scale),
            ("force_flatten_scale", c.force_flatten_scale),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(UnlockError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(self.config)
    }
}

/// Specifies which pages of a PDF to extract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSelection::All => f.write_str("all"),
            PageSelection::Single(p) => write!(f, "{p}"),
            PageSelection::Range(s, e) => write!(f, "{s}-{e}"),
            PageSelection::Set(pages) => {
                let parts: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}
