//! Domain types for decoded images.

use std::io::Cursor;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, Delay, DynamicImage, ImageResult};

/// Frame duration used when a frame reports none or a degenerate one.
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(100);

/// Shortest frame duration honored as reported; anything below is replaced.
pub const MIN_FRAME_DURATION: Duration = Duration::from_millis(11);

/// Encoded format detected from a byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    /// Portable Network Graphics.
    Png,
    /// JPEG / JFIF.
    Jpeg,
    /// GIF, possibly multi-frame.
    Gif,
    /// Anything without a recognized signature.
    #[default]
    Unknown,
}

impl ImageFormat {
    /// Returns true for formats that may carry more than one frame.
    #[must_use]
    pub const fn is_multi_frame(self) -> bool {
        matches!(self, Self::Gif)
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
            Self::Gif => write!(f, "gif"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Parameters controlling how bytes become a [`DecodedImage`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeOptions {
    /// Pixels per point assigned to the result.
    pub scale: f32,
    /// Decode every frame of multi-frame content up front.
    pub preload_all_frames: bool,
    /// Decode only the first frame of multi-frame content.
    pub only_first_frame: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            preload_all_frames: false,
            only_first_frame: false,
        }
    }
}

/// Where a retrieved image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheType {
    /// Freshly downloaded, or not cached at all.
    #[default]
    None,
    /// Served from the in-memory cache.
    Memory,
    /// Served from the disk cache.
    Disk,
}

impl CacheType {
    /// Returns true if the value was found in a cache.
    #[must_use]
    pub const fn is_cached(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
        }
    }
}

/// Normalizes a reported frame duration.
///
/// Missing values and values below [`MIN_FRAME_DURATION`] become
/// [`DEFAULT_FRAME_DURATION`].
#[must_use]
pub fn normalize_frame_duration(reported: Option<Duration>) -> Duration {
    match reported {
        Some(duration) if duration >= MIN_FRAME_DURATION => duration,
        _ => DEFAULT_FRAME_DURATION,
    }
}

/// Converts a codec frame delay into a normalized duration.
#[must_use]
pub fn frame_duration(delay: Delay) -> Duration {
    let (numer, denom) = delay.numer_denom_ms();
    if denom == 0 {
        return normalize_frame_duration(None);
    }
    let millis = f64::from(numer) / f64::from(denom);
    normalize_frame_duration(Some(Duration::from_secs_f64(millis / 1000.0)))
}

/// One frame of an animated image.
#[derive(Debug, Clone)]
pub struct AnimationFrame {
    /// Frame pixels.
    pub image: Arc<DynamicImage>,
    /// How long the frame stays on screen.
    pub duration: Duration,
}

impl AnimationFrame {
    /// Creates a frame.
    #[must_use]
    pub fn new(image: DynamicImage, duration: Duration) -> Self {
        Self {
            image: Arc::new(image),
            duration,
        }
    }
}

fn gif_frames(source: &[u8]) -> ImageResult<image::Frames<'_>> {
    let decoder = GifDecoder::new(Cursor::new(source))?;
    Ok(decoder.into_frames())
}

/// Decodes every frame of a GIF byte stream in order.
///
/// # Errors
/// Returns error if the stream is not a decodable GIF.
pub fn decode_gif_frames(source: &[u8]) -> ImageResult<Vec<AnimationFrame>> {
    gif_frames(source)?
        .map(|frame| {
            let frame = frame?;
            let duration = frame_duration(frame.delay());
            Ok(AnimationFrame::new(
                DynamicImage::ImageRgba8(frame.into_buffer()),
                duration,
            ))
        })
        .collect()
}

/// Animated image backed by its source bytes; frames past the first are
/// decoded on demand.
#[derive(Debug)]
pub struct LazyAnimation {
    source: Bytes,
    first: AnimationFrame,
    frame_count: OnceLock<usize>,
}

impl LazyAnimation {
    /// Creates a lazy animation from its source stream and already decoded first frame.
    #[must_use]
    pub fn new(source: Bytes, first: AnimationFrame) -> Self {
        Self {
            source,
            first,
            frame_count: OnceLock::new(),
        }
    }

    /// Decodes the first frame of a GIF stream and keeps the stream for the rest.
    ///
    /// # Errors
    /// Returns error if the stream is not a GIF or holds no frame.
    pub fn from_source(source: Bytes) -> ImageResult<Self> {
        let first = {
            let Some(frame) = gif_frames(&source)?.next() else {
                return Err(image::ImageError::Parameter(
                    image::error::ParameterError::from_kind(
                        image::error::ParameterErrorKind::NoMoreData,
                    ),
                ));
            };
            let frame = frame?;
            let duration = frame_duration(frame.delay());
            AnimationFrame::new(DynamicImage::ImageRgba8(frame.into_buffer()), duration)
        };
        Ok(Self::new(source, first))
    }

    /// Retained source byte stream.
    #[must_use]
    pub const fn source(&self) -> &Bytes {
        &self.source
    }

    /// The eagerly decoded first frame.
    #[must_use]
    pub const fn first_frame(&self) -> &AnimationFrame {
        &self.first
    }

    /// Decodes the frame at `index`.
    ///
    /// # Errors
    /// Returns error if the stream cannot be decoded up to `index`.
    pub fn frame(&self, index: usize) -> ImageResult<Option<AnimationFrame>> {
        if index == 0 {
            return Ok(Some(self.first.clone()));
        }
        let Some(frame) = gif_frames(&self.source)?.nth(index) else {
            return Ok(None);
        };
        let frame = frame?;
        let duration = frame_duration(frame.delay());
        Ok(Some(AnimationFrame::new(
            DynamicImage::ImageRgba8(frame.into_buffer()),
            duration,
        )))
    }

    /// Number of frames in the source. Counted once, then remembered.
    pub fn frame_count(&self) -> usize {
        *self.frame_count.get_or_init(|| {
            gif_frames(&self.source)
                .map(|frames| frames.take_while(Result::is_ok).count())
                .unwrap_or(1)
                .max(1)
        })
    }

    /// Decodes every frame.
    ///
    /// # Errors
    /// Returns error if the stream cannot be decoded.
    pub fn materialize(&self) -> ImageResult<Vec<AnimationFrame>> {
        decode_gif_frames(&self.source)
    }
}

/// Pixel content of a decoded image.
#[derive(Debug, Clone)]
pub enum ImageFrames {
    /// A single frame.
    Static(Arc<DynamicImage>),
    /// Every frame decoded up front.
    Animated {
        /// Frames in presentation order.
        frames: Vec<AnimationFrame>,
        /// Sum of all frame durations.
        total_duration: Duration,
    },
    /// Frames decoded on demand from retained source bytes.
    Lazy(Arc<LazyAnimation>),
}

/// Renderable image value produced by the decode pipeline.
#[derive(Clone)]
pub struct DecodedImage {
    frames: ImageFrames,
    format: ImageFormat,
    scale: f32,
    animated_source: Option<Bytes>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("format", &self.format)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}

impl DecodedImage {
    /// Creates a single-frame image.
    #[must_use]
    pub fn from_static(image: DynamicImage, format: ImageFormat, scale: f32) -> Self {
        Self {
            frames: ImageFrames::Static(Arc::new(image)),
            format,
            scale: sanitize_scale(scale),
            animated_source: None,
        }
    }

    /// Creates a fully materialized animated image.
    ///
    /// Returns `None` for an empty frame list.
    #[must_use]
    pub fn animated(frames: Vec<AnimationFrame>, format: ImageFormat, scale: f32) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        let total_duration = frames.iter().map(|f| f.duration).sum();
        Some(Self {
            frames: ImageFrames::Animated {
                frames,
                total_duration,
            },
            format,
            scale: sanitize_scale(scale),
            animated_source: None,
        })
    }

    /// Creates an animated image whose frames are decoded on demand.
    #[must_use]
    pub fn lazy(animation: LazyAnimation, scale: f32) -> Self {
        let source = animation.source().clone();
        Self {
            frames: ImageFrames::Lazy(Arc::new(animation)),
            format: ImageFormat::Gif,
            scale: sanitize_scale(scale),
            animated_source: Some(source),
        }
    }

    /// Retains the original animated byte stream alongside the frames.
    #[must_use]
    pub fn with_animated_source(mut self, source: Bytes) -> Self {
        self.animated_source = Some(source);
        self
    }

    /// Replaces the frames while keeping format and scale. The retained
    /// animated source is dropped since it no longer matches the pixels.
    /// Animated frame lists passed here are never empty.
    #[must_use]
    pub(crate) fn with_frames(&self, frames: ImageFrames) -> Self {
        Self {
            frames,
            format: self.format,
            scale: self.scale,
            animated_source: None,
        }
    }

    /// Pixel content.
    #[must_use]
    pub const fn frames(&self) -> &ImageFrames {
        &self.frames
    }

    /// Format the image was decoded from.
    #[must_use]
    pub const fn format(&self) -> ImageFormat {
        self.format
    }

    /// Pixels per point.
    #[must_use]
    pub const fn scale(&self) -> f32 {
        self.scale
    }

    /// Original animated byte stream, when retained.
    #[must_use]
    pub const fn animated_source(&self) -> Option<&Bytes> {
        self.animated_source.as_ref()
    }

    /// First (or only) frame.
    #[must_use]
    pub fn first_frame(&self) -> &Arc<DynamicImage> {
        match &self.frames {
            ImageFrames::Static(image) => image,
            ImageFrames::Animated { frames, .. } => &frames[0].image,
            ImageFrames::Lazy(animation) => &animation.first_frame().image,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.first_frame().width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.first_frame().height()
    }

    /// Size in points, i.e. pixel size divided by scale.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn point_size(&self) -> (f32, f32) {
        (
            self.width() as f32 / self.scale,
            self.height() as f32 / self.scale,
        )
    }

    /// Returns true for multi-frame images.
    #[must_use]
    pub const fn is_animated(&self) -> bool {
        !matches!(self.frames, ImageFrames::Static(_))
    }

    /// Number of frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        match &self.frames {
            ImageFrames::Static(_) => 1,
            ImageFrames::Animated { frames, .. } => frames.len(),
            ImageFrames::Lazy(animation) => animation.frame_count(),
        }
    }

    /// Total animation duration, when frames are materialized.
    #[must_use]
    pub const fn total_duration(&self) -> Option<Duration> {
        match &self.frames {
            ImageFrames::Animated { total_duration, .. } => Some(*total_duration),
            _ => None,
        }
    }

    /// Approximate memory footprint in bytes, used as cache cost.
    #[must_use]
    pub fn cost(&self) -> usize {
        match &self.frames {
            ImageFrames::Static(image) => image.as_bytes().len(),
            ImageFrames::Animated { frames, .. } => {
                frames.iter().map(|f| f.image.as_bytes().len()).sum()
            }
            ImageFrames::Lazy(animation) => {
                animation.first_frame().image.as_bytes().len() + animation.source().len()
            }
        }
    }
}

fn sanitize_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}
