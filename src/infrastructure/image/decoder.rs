//! Decode and process pipeline: raw bytes to a cacheable [`DecodedImage`].

use std::sync::Arc;

use bytes::Bytes;
use image::DynamicImage;
use tracing::{debug, trace, warn};

use crate::domain::entities::{
    AnimationFrame, DecodeOptions, DecodedImage, ImageFormat, ImageFrames, LazyAnimation,
    decode_gif_frames,
};
use crate::domain::errors::RetrieveError;
use crate::domain::ports::ImageProcessor;

use super::format::{codec_format, sniff_format};

/// Decodes `bytes` into an image, honoring the frame options.
///
/// # Errors
/// Returns `DecodeFailed` if the bytes are not a decodable image.
pub fn decode(bytes: &Bytes, options: &DecodeOptions) -> Result<DecodedImage, RetrieveError> {
    if bytes.is_empty() {
        return Err(RetrieveError::decode("empty image data"));
    }

    let format = sniff_format(bytes);
    trace!(format = %format, size = bytes.len(), "Decoding image");

    match format {
        ImageFormat::Gif => decode_gif(bytes, options),
        ImageFormat::Png | ImageFormat::Jpeg => {
            let codec = codec_format(format)
                .ok_or_else(|| RetrieveError::decode(format!("no codec for {format}")))?;
            let image = image::load_from_memory_with_format(bytes, codec)
                .map_err(|e| RetrieveError::decode(format!("{format}: {e}")))?;
            Ok(DecodedImage::from_static(image, format, options.scale))
        }
        ImageFormat::Unknown => {
            let image = image::load_from_memory(bytes)
                .map_err(|e| RetrieveError::decode(format!("unrecognized data: {e}")))?;
            Ok(DecodedImage::from_static(image, format, options.scale))
        }
    }
}

fn decode_gif(bytes: &Bytes, options: &DecodeOptions) -> Result<DecodedImage, RetrieveError> {
    let gif_error = |e: image::ImageError| RetrieveError::decode(format!("gif: {e}"));

    if options.only_first_frame {
        let animation = LazyAnimation::from_source(bytes.clone()).map_err(gif_error)?;
        return Ok(first_frame_only(&animation, bytes, options));
    }

    if options.preload_all_frames {
        let mut frames = decode_gif_frames(bytes).map_err(gif_error)?;
        debug!(frames = frames.len(), "Decoded all animation frames");
        if frames.len() == 1 {
            let frame = frames.remove(0);
            let image = Arc::unwrap_or_clone(frame.image);
            return Ok(DecodedImage::from_static(image, ImageFormat::Gif, options.scale)
                .with_animated_source(bytes.clone()));
        }
        return DecodedImage::animated(frames, ImageFormat::Gif, options.scale)
            .map(|image| image.with_animated_source(bytes.clone()))
            .ok_or_else(|| RetrieveError::decode("gif contains no frames"));
    }

    let animation = LazyAnimation::from_source(bytes.clone()).map_err(gif_error)?;
    if matches!(animation.frame(1), Ok(None)) {
        return Ok(first_frame_only(&animation, bytes, options));
    }
    Ok(DecodedImage::lazy(animation, options.scale))
}

/// Static image of the first frame that still carries the full GIF stream
/// for the disk cache.
fn first_frame_only(
    animation: &LazyAnimation,
    bytes: &Bytes,
    options: &DecodeOptions,
) -> DecodedImage {
    let first = animation.first_frame().image.as_ref().clone();
    DecodedImage::from_static(first, ImageFormat::Gif, options.scale)
        .with_animated_source(bytes.clone())
}

/// Runs `processor` over every frame.
///
/// A failing processor leaves the image untouched; only the raw decode is fatal.
#[must_use]
pub fn apply_processor(image: DecodedImage, processor: &dyn ImageProcessor) -> DecodedImage {
    if processor.is_identity() {
        return image;
    }
    let identifier = processor.identifier();

    let frames = match image.frames() {
        ImageFrames::Static(frame) => match processor.process(frame) {
            Ok(processed) => ImageFrames::Static(Arc::new(processed)),
            Err(e) => {
                warn!(processor = %identifier, error = %e, "Processor failed, keeping input");
                return image;
            }
        },
        ImageFrames::Animated { frames, .. } => match process_frames(frames, processor) {
            Some(frames) => animated_frames(frames),
            None => {
                warn!(processor = %identifier, "Processor failed on a frame, keeping input");
                return image;
            }
        },
        ImageFrames::Lazy(animation) => {
            let materialized = match animation.materialize() {
                Ok(frames) => frames,
                Err(e) => {
                    warn!(error = %e, "Failed to materialize animation for processing");
                    return image;
                }
            };
            match process_frames(&materialized, processor) {
                Some(frames) => animated_frames(frames),
                None => {
                    warn!(processor = %identifier, "Processor failed on a frame, keeping input");
                    return image;
                }
            }
        }
    };

    debug!(processor = %identifier, "Processed image");
    image.with_frames(frames)
}

fn process_frames(
    frames: &[AnimationFrame],
    processor: &dyn ImageProcessor,
) -> Option<Vec<AnimationFrame>> {
    frames
        .iter()
        .map(|frame| {
            processor
                .process(&frame.image)
                .ok()
                .map(|image| AnimationFrame::new(image, frame.duration))
        })
        .collect()
}

fn animated_frames(frames: Vec<AnimationFrame>) -> ImageFrames {
    let total_duration = frames.iter().map(|f| f.duration).sum();
    ImageFrames::Animated {
        frames,
        total_duration,
    }
}

/// Converts every frame into an RGBA8 display buffer, materializing lazy animations.
#[must_use]
pub fn prepare_for_display(image: DecodedImage) -> DecodedImage {
    let to_rgba = |frame: &DynamicImage| match frame {
        DynamicImage::ImageRgba8(_) => None,
        other => Some(DynamicImage::ImageRgba8(other.to_rgba8())),
    };

    let frames = match image.frames() {
        ImageFrames::Static(frame) => match to_rgba(frame) {
            Some(converted) => ImageFrames::Static(Arc::new(converted)),
            None => return image,
        },
        ImageFrames::Animated { frames, .. } => animated_frames(
            frames
                .iter()
                .map(|f| match to_rgba(&f.image) {
                    Some(converted) => AnimationFrame::new(converted, f.duration),
                    None => f.clone(),
                })
                .collect(),
        ),
        ImageFrames::Lazy(animation) => match animation.materialize() {
            Ok(frames) if !frames.is_empty() => animated_frames(frames),
            Ok(_) => return image,
            Err(e) => {
                warn!(error = %e, "Failed to materialize animation, keeping lazy frames");
                return image;
            }
        },
    };

    let prepared = image.with_frames(frames);
    match image.animated_source() {
        Some(source) => prepared.with_animated_source(source.clone()),
        None => prepared,
    }
}

/// Full pipeline: decode, process, and optionally prepare for display.
///
/// # Errors
/// Returns `DecodeFailed` if the raw decode fails.
pub fn decode_and_process(
    bytes: &Bytes,
    options: &DecodeOptions,
    processor: &dyn ImageProcessor,
    background_decode: bool,
) -> Result<DecodedImage, RetrieveError> {
    let decoded = decode(bytes, options)?;
    let processed = apply_processor(decoded, processor);
    if background_decode {
        Ok(prepare_for_display(processed))
    } else {
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ProcessError;
    use crate::infrastructure::image::fixtures::{gif_bytes, jpeg_bytes, png_bytes};
    use crate::infrastructure::image::processor::{DefaultProcessor, ResizeProcessor};
    use std::time::Duration;

    struct FailingProcessor;

    impl ImageProcessor for FailingProcessor {
        fn identifier(&self) -> String {
            "failing".to_string()
        }

        fn process(&self, _image: &DynamicImage) -> Result<DynamicImage, ProcessError> {
            Err(ProcessError::failed("always fails"))
        }
    }

    fn options() -> DecodeOptions {
        DecodeOptions::default()
    }

    #[test]
    fn test_decode_png() {
        let image = decode(&png_bytes(12, 8), &options()).unwrap();
        assert_eq!(image.format(), ImageFormat::Png);
        assert_eq!((image.width(), image.height()), (12, 8));
        assert!(!image.is_animated());
    }

    #[test]
    fn test_decode_jpeg_with_scale() {
        let opts = DecodeOptions {
            scale: 2.0,
            ..options()
        };
        let image = decode(&jpeg_bytes(16, 16), &opts).unwrap();
        assert_eq!(image.format(), ImageFormat::Jpeg);
        assert_eq!(image.point_size(), (8.0, 8.0));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode(&Bytes::from_static(b"definitely not an image"), &options());
        assert!(matches!(result, Err(RetrieveError::DecodeFailed { .. })));
    }

    #[test]
    fn test_decode_empty_fails() {
        assert!(decode(&Bytes::new(), &options()).is_err());
    }

    #[test]
    fn test_gif_lazy_by_default() {
        let bytes = gif_bytes(&[([255, 0, 0, 255], 50), ([0, 255, 0, 255], 50)], 4, 4);
        let image = decode(&bytes, &options()).unwrap();
        assert!(matches!(image.frames(), ImageFrames::Lazy(_)));
        assert_eq!(image.frame_count(), 2);
        assert_eq!(image.animated_source(), Some(&bytes));
    }

    #[test]
    fn test_gif_preload_all_frames_keeps_order_and_durations() {
        let bytes = gif_bytes(
            &[
                ([255, 0, 0, 255], 50),
                ([0, 255, 0, 255], 0),
                ([0, 0, 255, 255], 200),
            ],
            4,
            4,
        );
        let opts = DecodeOptions {
            preload_all_frames: true,
            ..options()
        };
        let image = decode(&bytes, &opts).unwrap();

        let ImageFrames::Animated {
            frames,
            total_duration,
        } = image.frames()
        else {
            panic!("expected materialized frames");
        };
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].duration, Duration::from_millis(50));
        assert_eq!(frames[1].duration, Duration::from_millis(100));
        assert_eq!(frames[2].duration, Duration::from_millis(200));
        assert_eq!(*total_duration, Duration::from_millis(350));

        let red = frames[0].image.to_rgba8().get_pixel(0, 0).0;
        let blue = frames[2].image.to_rgba8().get_pixel(0, 0).0;
        assert!(red[0] > 200 && red[2] < 50);
        assert!(blue[2] > 200 && blue[0] < 50);
    }

    #[test]
    fn test_gif_only_first_frame() {
        let bytes = gif_bytes(&[([255, 0, 0, 255], 50), ([0, 255, 0, 255], 50)], 4, 4);
        let opts = DecodeOptions {
            only_first_frame: true,
            preload_all_frames: true,
            ..options()
        };
        let image = decode(&bytes, &opts).unwrap();
        assert!(!image.is_animated());
        assert_eq!(image.format(), ImageFormat::Gif);
        assert_eq!(image.animated_source(), Some(&bytes));
    }

    #[test]
    fn test_single_frame_gif_is_static() {
        let bytes = gif_bytes(&[([0, 0, 255, 255], 80)], 4, 4);

        let lazy = decode(&bytes, &options()).unwrap();
        assert!(!lazy.is_animated());
        assert_eq!(lazy.frame_count(), 1);
        assert_eq!(lazy.animated_source(), Some(&bytes));

        let preloaded = decode(
            &bytes,
            &DecodeOptions {
                preload_all_frames: true,
                ..options()
            },
        )
        .unwrap();
        assert!(!preloaded.is_animated());
        assert_eq!(preloaded.animated_source(), Some(&bytes));
    }

    #[test]
    fn test_failing_processor_returns_input() {
        let decoded = decode(&png_bytes(10, 10), &options()).unwrap();
        let result = apply_processor(decoded, &FailingProcessor);
        assert_eq!((result.width(), result.height()), (10, 10));
    }

    #[test]
    fn test_processor_applies_to_every_frame() {
        let bytes = gif_bytes(&[([255, 0, 0, 255], 50), ([0, 255, 0, 255], 50)], 8, 8);
        let opts = DecodeOptions {
            preload_all_frames: true,
            ..options()
        };
        let decoded = decode(&bytes, &opts).unwrap();
        let processed = apply_processor(decoded, &ResizeProcessor::new(4, 4));

        assert_eq!(processed.frame_count(), 2);
        assert_eq!((processed.width(), processed.height()), (4, 4));
        assert!(processed.animated_source().is_none());
    }

    #[test]
    fn test_background_decode_materializes_lazy_frames() {
        let bytes = gif_bytes(&[([255, 0, 0, 255], 50), ([0, 255, 0, 255], 50)], 4, 4);
        let image = decode_and_process(&bytes, &options(), &DefaultProcessor, true).unwrap();
        assert!(matches!(image.frames(), ImageFrames::Animated { .. }));
        assert_eq!(image.animated_source(), Some(&bytes));
    }

    #[test]
    fn test_background_decode_converts_to_rgba() {
        let image = decode_and_process(&jpeg_bytes(4, 4), &options(), &DefaultProcessor, true)
            .unwrap();
        assert!(matches!(
            image.first_frame().as_ref(),
            DynamicImage::ImageRgba8(_)
        ));
    }
}
