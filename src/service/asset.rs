use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::warn;
use uuid::Uuid;

use crate::db::AssetStore;
use crate::dto::ImageUploadDto;
use crate::errors::ApiError;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_CONTENT_TYPES: [&str; 4] =
    ["image/png", "image/jpeg", "image/gif", "image/webp"];

#[derive(Debug)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub extension: String,
}

/// Decodes and bounds-checks an uploaded QR image before anything touches
/// the asset store.
pub fn decode_image(upload: &ImageUploadDto) -> Result<DecodedImage, ApiError> {
    if !ALLOWED_CONTENT_TYPES.contains(&upload.content_type.as_str()) {
        return Err(ApiError::validation("qr_code", "must be an image file"));
    }
    let bytes = BASE64
        .decode(upload.data.as_bytes())
        .map_err(|_| ApiError::validation("qr_code", "is not valid base64"))?;
    if bytes.is_empty() {
        return Err(ApiError::validation("qr_code", "is empty"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::validation("qr_code", "exceeds the 5 MiB limit"));
    }
    let extension = upload
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| extension_for(&upload.content_type).to_string());
    Ok(DecodedImage {
        bytes,
        content_type: upload.content_type.clone(),
        extension,
    })
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Phase one of the two-phase upload: the event id does not exist yet, so
/// the object goes in under a throwaway key.
pub async fn store_temp(
    assets: &dyn AssetStore,
    image: &DecodedImage,
) -> Result<(String, String), ApiError> {
    let key = format!("temp_{}.{}", Uuid::new_v4(), image.extension);
    assets
        .put(&key, &image.bytes, &image.content_type)
        .await
        .map_err(|err| ApiError::Dependency(err.to_string()))?;
    let url = assets.public_url(&key);
    Ok((key, url))
}

/// Phase two: the object under its final key, derived from the event id.
pub async fn store_for_event(
    assets: &dyn AssetStore,
    event_id: Uuid,
    image: &DecodedImage,
) -> Result<String, ApiError> {
    let key = format!("{}.{}", event_id, image.extension);
    assets
        .put(&key, &image.bytes, &image.content_type)
        .await
        .map_err(|err| ApiError::Dependency(err.to_string()))?;
    Ok(assets.public_url(&key))
}

pub fn key_from_url(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|key| !key.is_empty())
}

/// Best-effort removal of a superseded or temporary object. Failures are
/// logged and never fail the parent operation.
pub async fn delete_by_url(assets: &dyn AssetStore, url: &str) {
    match key_from_url(url) {
        Some(key) => {
            if let Err(err) = assets.delete(key).await {
                warn!("failed to delete asset '{}': {}", key, err);
            }
        }
        None => warn!("asset url '{}' has no usable key", url),
    }
}
