//! Encoded sample images for tests.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, ImageFormat, Rgba, RgbaImage};

/// A `width` x `height` PNG with a gradient.
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        Rgba([(x * 16) as u8, (y * 16) as u8, 128, 255])
    });
    encode(&DynamicImage::ImageRgba8(image), ImageFormat::Png)
}

/// A `width` x `height` JPEG filled with a single color.
pub fn jpeg_bytes(width: u32, height: u32) -> Bytes {
    let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        width,
        height,
        image::Rgb([200, 40, 40]),
    ));
    encode(&image, ImageFormat::Jpeg)
}

/// A GIF with one solid-color frame per `(color, delay_ms)` entry.
pub fn gif_bytes(frames: &[([u8; 4], u32)], width: u32, height: u32) -> Bytes {
    let mut buffer = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buffer);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        let frames = frames.iter().map(|(color, delay)| {
            Frame::from_parts(
                RgbaImage::from_pixel(width, height, Rgba(*color)),
                0,
                0,
                Delay::from_numer_denom_ms(*delay, 1),
            )
        });
        encoder.encode_frames(frames).unwrap();
    }
    Bytes::from(buffer)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Bytes {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).unwrap();
    Bytes::from(buffer.into_inner())
}
