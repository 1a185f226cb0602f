//! Built-in image processors.

use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use tracing::warn;

use crate::domain::errors::ProcessError;
use crate::domain::ports::ImageProcessor;

/// Identity processor. Images pass through untouched and keep their bare cache key.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProcessor;

impl ImageProcessor for DefaultProcessor {
    fn identifier(&self) -> String {
        String::new()
    }

    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, ProcessError> {
        Ok(image.clone())
    }
}

/// Runs processors in order. A failing step hands its input to the next step.
#[derive(Clone, Default)]
pub struct ProcessorChain {
    steps: Vec<Arc<dyn ImageProcessor>>,
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("identifier", &self.identifier())
            .finish()
    }
}

impl ProcessorChain {
    /// Creates an empty chain, equivalent to the identity processor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    #[must_use]
    pub fn then(mut self, step: impl ImageProcessor + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the chain has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl ImageProcessor for ProcessorChain {
    fn identifier(&self) -> String {
        self.steps
            .iter()
            .map(|step| step.identifier())
            .filter(|id| !id.is_empty())
            .collect::<Vec<_>>()
            .join("|")
    }

    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, ProcessError> {
        let mut current = image.clone();
        for step in &self.steps {
            match step.process(&current) {
                Ok(next) => current = next,
                Err(e) => {
                    warn!(step = %step.identifier(), error = %e, "Processing step failed, skipping");
                }
            }
        }
        Ok(current)
    }
}

/// How [`ResizeProcessor`] maps the source onto the target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMode {
    /// Stretch to exactly the target size.
    #[default]
    Fill,
    /// Keep aspect ratio, fit inside the target size.
    AspectFit,
}

/// Resizes to a target pixel size.
#[derive(Debug, Clone, Copy)]
pub struct ResizeProcessor {
    width: u32,
    height: u32,
    mode: ContentMode,
}

impl ResizeProcessor {
    /// Resizes to exactly `width` x `height`.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mode: ContentMode::Fill,
        }
    }

    /// Keeps the aspect ratio, fitting inside the target size.
    #[must_use]
    pub const fn aspect_fit(mut self) -> Self {
        self.mode = ContentMode::AspectFit;
        self
    }
}

impl ImageProcessor for ResizeProcessor {
    fn identifier(&self) -> String {
        format!("resize({}x{},{:?})", self.width, self.height, self.mode)
    }

    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, ProcessError> {
        if self.width == 0 || self.height == 0 {
            return Err(ProcessError::invalid("target size must be non-zero"));
        }
        Ok(match self.mode {
            ContentMode::Fill => image.resize_exact(self.width, self.height, FilterType::Lanczos3),
            ContentMode::AspectFit => image.resize(self.width, self.height, FilterType::Lanczos3),
        })
    }
}

/// Crops a centered region.
#[derive(Debug, Clone, Copy)]
pub struct CroppingProcessor {
    width: u32,
    height: u32,
}

impl CroppingProcessor {
    /// Crops to `width` x `height` around the center.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl ImageProcessor for CroppingProcessor {
    fn identifier(&self) -> String {
        format!("crop({}x{})", self.width, self.height)
    }

    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, ProcessError> {
        let (src_w, src_h) = image.dimensions();
        if self.width == 0 || self.height == 0 {
            return Err(ProcessError::invalid("crop size must be non-zero"));
        }
        if self.width > src_w || self.height > src_h {
            return Err(ProcessError::invalid(format!(
                "crop {}x{} exceeds image {src_w}x{src_h}",
                self.width, self.height
            )));
        }
        let x = (src_w - self.width) / 2;
        let y = (src_h - self.height) / 2;
        Ok(image.crop_imm(x, y, self.width, self.height))
    }
}

/// Gaussian blur.
#[derive(Debug, Clone, Copy)]
pub struct BlurProcessor {
    sigma: f32,
}

impl BlurProcessor {
    /// Blurs with the given standard deviation.
    #[must_use]
    pub const fn new(sigma: f32) -> Self {
        Self { sigma }
    }
}

impl ImageProcessor for BlurProcessor {
    fn identifier(&self) -> String {
        format!("blur({})", self.sigma)
    }

    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, ProcessError> {
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(ProcessError::invalid("blur sigma must be positive"));
        }
        Ok(image.blur(self.sigma))
    }
}

/// Blends a color over every pixel.
#[derive(Debug, Clone, Copy)]
pub struct TintProcessor {
    color: [u8; 4],
}

impl TintProcessor {
    /// Tints with `color`; its alpha sets the blend strength.
    #[must_use]
    pub const fn new(color: [u8; 4]) -> Self {
        Self { color }
    }
}

impl ImageProcessor for TintProcessor {
    fn identifier(&self) -> String {
        let [r, g, b, a] = self.color;
        format!("tint({r:02x}{g:02x}{b:02x}{a:02x})")
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, ProcessError> {
        let alpha = f32::from(self.color[3]) / 255.0;
        let mut rgba = image.to_rgba8();
        for pixel in rgba.pixels_mut() {
            for channel in 0..3 {
                let base = f32::from(pixel[channel]);
                let tint = f32::from(self.color[channel]);
                pixel[channel] = (base + (tint - base) * alpha).round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}

/// Brightness and contrast adjustment, optionally desaturating.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorControlsProcessor {
    brightness: i32,
    contrast: f32,
    grayscale: bool,
}

impl ColorControlsProcessor {
    /// Adjusts brightness (added to each channel) and contrast (percent).
    #[must_use]
    pub const fn new(brightness: i32, contrast: f32) -> Self {
        Self {
            brightness,
            contrast,
            grayscale: false,
        }
    }

    /// Converts to grayscale after adjusting.
    #[must_use]
    pub const fn grayscale(mut self) -> Self {
        self.grayscale = true;
        self
    }
}

impl ImageProcessor for ColorControlsProcessor {
    fn identifier(&self) -> String {
        format!(
            "color(b{},c{},g{})",
            self.brightness, self.contrast, self.grayscale
        )
    }

    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, ProcessError> {
        if !self.contrast.is_finite() {
            return Err(ProcessError::invalid("contrast must be finite"));
        }
        let mut adjusted = image.brighten(self.brightness).adjust_contrast(self.contrast);
        if self.grayscale {
            adjusted = DynamicImage::ImageRgba8(adjusted.grayscale().to_rgba8());
        }
        Ok(adjusted)
    }
}

/// Makes pixels outside rounded corners transparent.
#[derive(Debug, Clone, Copy)]
pub struct RoundCornerProcessor {
    radius: u32,
}

impl RoundCornerProcessor {
    /// Rounds corners with `radius` pixels.
    #[must_use]
    pub const fn new(radius: u32) -> Self {
        Self { radius }
    }
}

impl ImageProcessor for RoundCornerProcessor {
    fn identifier(&self) -> String {
        format!("round({})", self.radius)
    }

    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, ProcessError> {
        let mut rgba: RgbaImage = image.to_rgba8();
        let (w, h) = rgba.dimensions();
        let r = self.radius.min(w / 2).min(h / 2);
        if r == 0 {
            return Ok(DynamicImage::ImageRgba8(rgba));
        }
        let radius = f64::from(r);
        let (wf, hf) = (f64::from(w), f64::from(h));
        for (x, y, pixel) in rgba.enumerate_pixels_mut() {
            let px = f64::from(x) + 0.5;
            let py = f64::from(y) + 0.5;
            let cx = if px < radius {
                radius
            } else if px > wf - radius {
                wf - radius
            } else {
                continue;
            };
            let cy = if py < radius {
                radius
            } else if py > hf - radius {
                hf - radius
            } else {
                continue;
            };
            if (px - cx).hypot(py - cy) > radius {
                *pixel = Rgba([0, 0, 0, 0]);
            }
        }
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}
