//! Header-based image format sniffing.

use crate::domain::entities::ImageFormat;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];
const GIF87_SIGNATURE: &[u8; 6] = b"GIF87a";
const GIF89_SIGNATURE: &[u8; 6] = b"GIF89a";

/// Classifies a byte buffer by its leading signature without decoding it.
#[must_use]
pub fn sniff_format(bytes: &[u8]) -> ImageFormat {
    if bytes.starts_with(&PNG_SIGNATURE) {
        ImageFormat::Png
    } else if bytes.starts_with(&JPEG_SIGNATURE) {
        ImageFormat::Jpeg
    } else if bytes.starts_with(GIF87_SIGNATURE) || bytes.starts_with(GIF89_SIGNATURE) {
        ImageFormat::Gif
    } else {
        ImageFormat::Unknown
    }
}

/// Maps a sniffed format to the codec used to decode it.
#[must_use]
pub const fn codec_format(format: ImageFormat) -> Option<image::ImageFormat> {
    match format {
        ImageFormat::Png => Some(image::ImageFormat::Png),
        ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
        ImageFormat::Gif => Some(image::ImageFormat::Gif),
        ImageFormat::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0], ImageFormat::Png ; "png")]
    #[test_case(&[0xFF, 0xD8, 0xFF, 0xE0], ImageFormat::Jpeg ; "jpeg")]
    #[test_case(b"GIF89a\x01\x00", ImageFormat::Gif ; "gif89")]
    #[test_case(b"GIF87a\x01\x00", ImageFormat::Gif ; "gif87")]
    #[test_case(b"RIFF\x00\x00\x00\x00WEBP", ImageFormat::Unknown ; "webp_is_generic")]
    #[test_case(&[0x89, b'P'], ImageFormat::Unknown ; "truncated_png")]
    #[test_case(&[], ImageFormat::Unknown ; "empty")]
    fn test_sniff_format(bytes: &[u8], expected: ImageFormat) {
        assert_eq!(sniff_format(bytes), expected);
    }

    #[test]
    fn test_codec_format() {
        assert_eq!(codec_format(ImageFormat::Gif), Some(image::ImageFormat::Gif));
        assert_eq!(codec_format(ImageFormat::Unknown), None);
    }
}
