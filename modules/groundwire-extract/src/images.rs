//! Prompt image preparation: download a post's archived media and
//! normalize it to a bounded JPEG before inlining it into the request.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

pub const IMAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_DIMENSION: u32 = 1024;
const JPEG_QUALITY: u8 = 85;

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(IMAGE_FETCH_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Download and normalize one image. Videos and undecodable payloads are
/// errors the caller treats as "no image for this post".
pub async fn fetch_prompt_image(http: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = http.get(url).send().await.context("image download")?;
    if !response.status().is_success() {
        anyhow::bail!("image download status {}", response.status());
    }
    let bytes = response.bytes().await.context("image body")?;
    normalize_jpeg(&bytes)
}

/// Decode, bound to 1024×1024 preserving aspect ratio, re-encode as JPEG
/// at quality 85. Alpha channels are flattened since JPEG has none.
pub fn normalize_jpeg(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes).context("image decode")?;

    let bounded = if decoded.width() > MAX_DIMENSION || decoded.height() > MAX_DIMENSION {
        decoded.thumbnail(MAX_DIMENSION, MAX_DIMENSION)
    } else {
        decoded
    };

    let rgb = DynamicImage::ImageRgb8(bounded.to_rgb8());

    let mut out = Vec::new();
    let mut cursor = Cursor::new(&mut out);
    let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
    rgb.write_with_encoder(encoder).context("jpeg encode")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 128])
            }
        });
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        png
    }

    #[test]
    fn large_images_are_bounded() {
        let png = checkerboard(2048, 512);
        let jpeg = normalize_jpeg(&png).unwrap();
        let reloaded = image::load_from_memory(&jpeg).unwrap();
        assert!(reloaded.width() <= 1024);
        assert!(reloaded.height() <= 1024);
        // Aspect ratio preserved.
        assert_eq!(reloaded.width() / reloaded.height(), 4);
    }

    #[test]
    fn small_images_keep_their_size() {
        let png = checkerboard(64, 64);
        let jpeg = normalize_jpeg(&png).unwrap();
        let reloaded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (64, 64));
    }

    #[test]
    fn garbage_bytes_fail() {
        assert!(normalize_jpeg(b"not an image").is_err());
    }
}
