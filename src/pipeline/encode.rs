//! Image encoding: rendered page PNG on disk → base64 `ImageData`.
//!
//! Pages are rendered once into the run's scratch directory; the pipeline
//! reads each file back only when its visual-description call is built, so at
//! most one page image is held in memory at a time.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

/// Read a rendered page PNG and wrap it for a multimodal request.
///
/// `detail: "high"` keeps small slide text legible for providers that
/// downsample images by default.
pub async fn load_page_image(path: &Path) -> std::io::Result<ImageData> {
    let bytes = tokio::fs::read(path).await?;
    Ok(encode_png(&bytes))
}

/// Base64-wrap PNG bytes.
pub fn encode_png(bytes: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}
