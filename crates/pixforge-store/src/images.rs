//! Image file helpers: JPEG normalisation, base64 decoding, result download
//!
//! Everything stored under the history directory is a JPEG named by a fresh
//! UUID. Transparent pixels are flattened onto white first.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use pixforge_core::{Error, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// JPEG quality for every stored image
pub const JPEG_QUALITY: u8 = 92;

/// Timeout for result downloads
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Upload file extensions accepted from browsers
pub const ACCEPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Whether a client file name has an accepted image extension
pub fn has_accepted_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode any supported image and store it as `<folder>/<uuid>.jpg`
pub fn save_as_jpeg(bytes: &[u8], folder: &Path) -> Result<PathBuf> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::invalid_input(format!("could not decode image: {}", e)))?;

    std::fs::create_dir_all(folder)?;
    let path = folder.join(format!("{}.jpg", uuid::Uuid::new_v4()));
    write_jpeg(&image, &path)?;
    debug!("Saved image {}", path.display());
    Ok(path)
}

/// Decode a data URL or bare base64 string and store it as JPEG
pub fn save_base64_as_jpeg(data: &str, folder: &Path) -> Result<PathBuf> {
    let bytes = decode_base64_image(data)?;
    save_as_jpeg(&bytes, folder)
}

/// [`save_as_jpeg`] on the blocking pool
pub async fn store_jpeg<B>(bytes: B, folder: &Path) -> Result<PathBuf>
where
    B: AsRef<[u8]> + Send + 'static,
{
    let folder = folder.to_path_buf();
    tokio::task::spawn_blocking(move || save_as_jpeg(bytes.as_ref(), &folder))
        .await
        .map_err(|e| Error::storage(format!("image task failed: {}", e)))?
}

/// [`save_base64_as_jpeg`] on the blocking pool
pub async fn store_base64_jpeg(data: String, folder: &Path) -> Result<PathBuf> {
    let folder = folder.to_path_buf();
    tokio::task::spawn_blocking(move || save_base64_as_jpeg(&data, &folder))
        .await
        .map_err(|e| Error::storage(format!("image task failed: {}", e)))?
}

/// Decode `data:image/...;base64,<payload>` or a bare base64 payload
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>> {
    let data = data.trim();
    let payload = if data.starts_with("data:") {
        data.split_once(',')
            .map(|(_, payload)| payload)
            .ok_or_else(|| Error::invalid_input("data URL without payload"))?
    } else {
        data
    };

    STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::invalid_input(format!("invalid base64: {}", e)))
}

/// Download an image into `folder`, converting non-JPEG content to JPEG
pub async fn download_to_folder(client: &reqwest::Client, url: &str, folder: &Path) -> Result<PathBuf> {
    let response = client
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .map_err(|e| Error::storage(format!("download of {} failed: {}", url, e)))?;

    let status = response.status();
    if status.as_u16() != 200 {
        return Err(Error::storage(format!("download of {} returned HTTP {}", url, status)));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::storage(format!("download of {} interrupted: {}", url, e)))?;

    if content_type.contains("png") || content_type.contains("webp") {
        return store_jpeg(bytes, folder).await;
    }

    std::fs::create_dir_all(folder)?;
    let path = folder.join(format!("{}.jpg", uuid::Uuid::new_v4()));
    std::fs::write(&path, &bytes)?;
    Ok(path)
}

/// Download each URL; failures are logged and skipped
pub async fn download_all(client: &reqwest::Client, urls: &[String], folder: &Path) -> Vec<PathBuf> {
    let mut saved = Vec::with_capacity(urls.len());
    for url in urls {
        match download_to_folder(client, url, folder).await {
            Ok(path) => saved.push(path),
            Err(e) => warn!("Failed to save result image: {}", e),
        }
    }
    saved
}

fn write_jpeg(image: &DynamicImage, path: &Path) -> Result<()> {
    let rgb = flatten_on_white(image);
    let mut writer = BufWriter::new(File::create(path)?);
    let mut encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
    encoder
        .encode_image(&rgb)
        .map_err(|e| Error::storage(format!("jpeg encoding failed: {}", e)))
}

fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            ((u16::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}
