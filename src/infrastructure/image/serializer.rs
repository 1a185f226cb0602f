//! Format-aware conversion between decoded images and disk cache bytes.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::{Delay, DynamicImage, Frame, ImageResult};
use tracing::{debug, warn};

use crate::domain::entities::{AnimationFrame, DecodeOptions, DecodedImage, ImageFormat, ImageFrames};
use crate::domain::ports::CacheSerializer;

use super::decoder;
use super::format::sniff_format;

/// Default serializer.
///
/// PNG stays PNG, JPEG is re-encoded at full quality, GIF keeps its original
/// animated byte stream when available. Unknown formats are normalized to PNG.
#[derive(Debug, Clone, Copy)]
pub struct DefaultCacheSerializer {
    prefer_original_data: bool,
    jpeg_quality: u8,
}

impl Default for DefaultCacheSerializer {
    fn default() -> Self {
        Self {
            prefer_original_data: false,
            jpeg_quality: 100,
        }
    }
}

impl DefaultCacheSerializer {
    /// Creates the default serializer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the downloaded bytes verbatim whenever they are available.
    #[must_use]
    pub const fn prefer_original_data(mut self) -> Self {
        self.prefer_original_data = true;
        self
    }

    /// JPEG quality used when re-encoding, clamped to `1..=100`.
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    fn encode(&self, image: &DecodedImage, format: ImageFormat) -> ImageResult<Vec<u8>> {
        match format {
            ImageFormat::Gif => match image.animated_source() {
                Some(source) => Ok(source.to_vec()),
                None => encode_gif(image),
            },
            ImageFormat::Jpeg => {
                let mut buffer = Vec::new();
                let rgb = DynamicImage::ImageRgb8(image.first_frame().to_rgb8());
                rgb.write_with_encoder(JpegEncoder::new_with_quality(
                    &mut buffer,
                    self.jpeg_quality,
                ))?;
                Ok(buffer)
            }
            ImageFormat::Png | ImageFormat::Unknown => {
                let mut buffer = Cursor::new(Vec::new());
                image
                    .first_frame()
                    .write_to(&mut buffer, image::ImageFormat::Png)?;
                Ok(buffer.into_inner())
            }
        }
    }
}

fn encode_gif(image: &DecodedImage) -> ImageResult<Vec<u8>> {
    let frames: Vec<AnimationFrame> = match image.frames() {
        ImageFrames::Static(frame) => vec![AnimationFrame {
            image: frame.clone(),
            duration: crate::domain::entities::DEFAULT_FRAME_DURATION,
        }],
        ImageFrames::Animated { frames, .. } => frames.clone(),
        ImageFrames::Lazy(animation) => animation.materialize()?,
    };

    let mut buffer = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buffer);
        encoder.set_repeat(Repeat::Infinite)?;
        encoder.encode_frames(frames.into_iter().map(|frame| {
            Frame::from_parts(
                frame.image.to_rgba8(),
                0,
                0,
                Delay::from_saturating_duration(frame.duration),
            )
        }))?;
    }
    Ok(buffer)
}

impl CacheSerializer for DefaultCacheSerializer {
    fn serialize(&self, image: &DecodedImage, original: Option<&[u8]>) -> Option<Vec<u8>> {
        if self.prefer_original_data
            && let Some(original) = original
        {
            return Some(original.to_vec());
        }

        let format = original
            .map(sniff_format)
            .filter(|format| *format != ImageFormat::Unknown)
            .unwrap_or_else(|| image.format());

        match self.encode(image, format) {
            Ok(data) => {
                debug!(format = %format, size = data.len(), "Serialized image");
                Some(data)
            }
            Err(e) => {
                warn!(format = %format, error = %e, "Failed to serialize image");
                None
            }
        }
    }

    fn deserialize(&self, data: &[u8], options: &DecodeOptions) -> Option<DecodedImage> {
        match decoder::decode(&Bytes::copy_from_slice(data), options) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(error = %e, "Failed to deserialize cached image");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::image::fixtures::{gif_bytes, jpeg_bytes, png_bytes};

    fn decode(bytes: &Bytes, options: &DecodeOptions) -> DecodedImage {
        decoder::decode(bytes, options).unwrap()
    }

    #[test]
    fn test_png_round_trip_keeps_size_and_scale() {
        let options = DecodeOptions {
            scale: 2.0,
            ..DecodeOptions::default()
        };
        let image = decode(&png_bytes(6, 4), &options);
        let serializer = DefaultCacheSerializer::new();

        let data = serializer.serialize(&image, None).unwrap();
        assert_eq!(sniff_format(&data), ImageFormat::Png);

        let restored = serializer.deserialize(&data, &options).unwrap();
        assert_eq!((restored.width(), restored.height()), (6, 4));
        assert!((restored.scale() - image.scale()).abs() < f32::EPSILON);
    }

    #[test]
    fn test_jpeg_round_trip_stays_jpeg() {
        let options = DecodeOptions::default();
        let image = decode(&jpeg_bytes(9, 7), &options);
        let serializer = DefaultCacheSerializer::new();

        let data = serializer.serialize(&image, None).unwrap();
        assert_eq!(sniff_format(&data), ImageFormat::Jpeg);

        let restored = serializer.deserialize(&data, &options).unwrap();
        assert_eq!((restored.width(), restored.height()), (9, 7));
        assert_eq!(restored.format(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_gif_keeps_original_stream() {
        let bytes = gif_bytes(
            &[
                ([255, 0, 0, 255], 50),
                ([0, 255, 0, 255], 60),
                ([0, 0, 255, 255], 70),
            ],
            4,
            4,
        );
        let options = DecodeOptions {
            preload_all_frames: true,
            ..DecodeOptions::default()
        };
        let image = decode(&bytes, &options);
        let serializer = DefaultCacheSerializer::new();

        let data = serializer.serialize(&image, None).unwrap();
        assert_eq!(data, bytes.to_vec());

        let restored = serializer.deserialize(&data, &options).unwrap();
        assert_eq!(restored.frame_count(), 3);
    }

    #[test]
    fn test_processed_gif_is_re_encoded_with_frame_order() {
        let bytes = gif_bytes(&[([255, 0, 0, 255], 50), ([0, 0, 255, 255], 50)], 4, 4);
        let options = DecodeOptions {
            preload_all_frames: true,
            ..DecodeOptions::default()
        };
        let image = decode(&bytes, &options);
        let stripped = image.with_frames(image.frames().clone());
        assert!(stripped.animated_source().is_none());

        let serializer = DefaultCacheSerializer::new();
        let data = serializer.serialize(&stripped, None).unwrap();
        let restored = serializer.deserialize(&data, &options).unwrap();

        let ImageFrames::Animated { frames, .. } = restored.frames() else {
            panic!("expected animated frames");
        };
        assert_eq!(frames.len(), 2);
        assert!(frames[0].image.to_rgba8().get_pixel(0, 0)[0] > 200);
        assert!(frames[1].image.to_rgba8().get_pixel(0, 0)[2] > 200);
    }

    #[test]
    fn test_original_format_decides_encoding() {
        let image = decode(&png_bytes(3, 3), &DecodeOptions::default());
        let jpeg = jpeg_bytes(3, 3);
        let data = DefaultCacheSerializer::new()
            .serialize(&image, Some(&jpeg[..]))
            .unwrap();
        assert_eq!(sniff_format(&data), ImageFormat::Jpeg);
    }

    #[test]
    fn test_prefer_original_data() {
        let original = png_bytes(3, 3);
        let image = decode(&original, &DecodeOptions::default());
        let data = DefaultCacheSerializer::new()
            .prefer_original_data()
            .serialize(&image, Some(&original[..]))
            .unwrap();
        assert_eq!(data, original.to_vec());
    }

    #[test]
    fn test_deserialize_garbage_is_none() {
        let serializer = DefaultCacheSerializer::new();
        assert!(
            serializer
                .deserialize(b"garbage", &DecodeOptions::default())
                .is_none()
        );
    }
}
