//! Image payload handling: base64/raw decoding into pixel buffers and the
//! JPEG re-encoding used by the relay path.

use anyhow::anyhow;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use image::ImageEncoder;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use crate::errors::{Error, Result};

/// Matches the browser frontend's `canvas.toDataURL('image/jpeg', 0.8)`.
const JPEG_QUALITY: u8 = 80;

/// Decode a base64-encoded image payload into an RGB pixel buffer.
///
/// Accepts both a bare base64 string and a `data:<mime>;base64,...` URL, the
/// two shapes browsers produce.
pub fn decode_base64_image(payload: &str) -> Result<RgbImage> {
    let encoded = match payload.split_once(',') {
        Some((head, rest)) if head.starts_with("data:") => rest,
        _ => payload,
    };

    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::ImageDecode { detail: e.to_string() })?;

    decode_image_bytes(&bytes)
}

/// Parse raw image bytes (JPEG, PNG, ...) into an RGB pixel buffer.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(Error::InvalidImage);
    }

    let decoded = image::load_from_memory(bytes).map_err(|_| Error::InvalidImage)?;
    let frame = decoded.to_rgb8();

    tracing::debug!(width = frame.width(), height = frame.height(), "decoded image");
    Ok(frame)
}

/// Re-encode a frame as JPEG and base64 it for the relay body.
pub fn encode_jpeg_base64(frame: &RgbImage) -> Result<String> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    encoder
        .write_image(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| Error::Other(anyhow!("failed to encode frame as JPEG: {e}")))?;

    Ok(BASE64_STANDARD.encode(&buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn jpeg_round_trip_preserves_dimensions() {
        let frame = gradient_frame(64, 48);
        let encoded = encode_jpeg_base64(&frame).unwrap();
        let decoded = decode_base64_image(&encoded).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        let frame = gradient_frame(8, 8);
        let encoded = format!("data:image/jpeg;base64,{}", encode_jpeg_base64(&frame).unwrap());
        let decoded = decode_base64_image(&encoded).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let err = decode_base64_image("not-base64-@@@").unwrap_err();
        assert!(matches!(err, Error::ImageDecode { .. }));
    }

    #[test]
    fn empty_payload_is_an_invalid_image() {
        let err = decode_base64_image("").unwrap_err();
        assert!(matches!(err, Error::InvalidImage));
    }

    #[test]
    fn non_image_bytes_are_an_invalid_image() {
        // Valid base64, but decodes to text rather than an image
        let payload = BASE64_STANDARD.encode(b"hello, not an image");
        let err = decode_base64_image(&payload).unwrap_err();
        assert!(matches!(err, Error::InvalidImage));
    }
}
