//! Image encoding: `DynamicImage` → PNG bytes, or a base64 PNG data URI for
//! the page grid.
//!
//! PNG is lossless, so thumbnails of text pages stay crisp even at 0.5×.

use crate::workspace::Thumbnail;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::trace;

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Encode a rendered page as a `data:image/png;base64,…` thumbnail.
pub fn encode_thumbnail(img: &DynamicImage) -> Result<Thumbnail, image::ImageError> {
    let png = encode_png(img)?;
    let b64 = STANDARD.encode(&png);
    trace!("Encoded thumbnail {}x{} → {} bytes base64", img.width(), img.height(), b64.len());
    Ok(Thumbnail {
        width: img.width(),
        height: img.height(),
        data_uri: format!("data:image/png;base64,{b64}"),
    })
}
