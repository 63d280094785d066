//! Binary payload transfer: inline base64 for small image buffers,
//! pre-signed object-store upload/download for large ones.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{CloudError, Result};
use crate::transport::Transport;
use crate::types::ImageData;

/// Requests whose base64-inflated image payload stays below this many
/// bytes embed it inline; anything larger goes through the transfer store.
pub const INLINE_IMAGE_LIMIT: usize = 3_500_000;

/// Size of `n` raw bytes after base64 inflation.
pub(crate) fn base64_size(n: usize) -> usize {
    n.div_ceil(3) * 4
}

/// Whether a raw buffer of `n` bytes travels inline.
pub(crate) fn uses_inline(n: usize) -> bool {
    base64_size(n) < INLINE_IMAGE_LIMIT
}

/// Result images reassembled from a combined byte buffer.
///
/// The server concatenates all images of a batch into one buffer; the
/// offsets array marks where each image starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageCollection {
    images: Vec<Vec<u8>>,
}

impl ImageCollection {
    /// Split `data` into discrete images; offset `i` starts image `i`, the
    /// last image runs to the end of the buffer.
    pub fn from_bytes(data: Vec<u8>, offsets: &[usize]) -> Result<Self> {
        if offsets.is_empty() {
            return Err(CloudError::MalformedPayload(
                "could not read result images, offsets are empty".to_string(),
            ));
        }
        let mut images = Vec::with_capacity(offsets.len());
        for (i, &start) in offsets.iter().enumerate() {
            let end = offsets.get(i + 1).copied().unwrap_or(data.len());
            if start > end || end > data.len() {
                return Err(CloudError::MalformedPayload(format!(
                    "could not read result images, invalid offsets: {offsets:?}"
                )));
            }
            images.push(data[start..end].to_vec());
        }
        Ok(Self { images })
    }

    /// Decode a base64 buffer, then split it at `offsets`.
    pub fn from_base64(encoded: &str, offsets: &[usize]) -> Result<Self> {
        let data = BASE64.decode(encoded).map_err(|e| {
            CloudError::MalformedPayload(format!("invalid base64 image data: {e}"))
        })?;
        Self::from_bytes(data, offsets)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.images.get(index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.images.iter().map(Vec::as_slice)
    }

    pub fn into_vec(self) -> Vec<Vec<u8>> {
        self.images
    }
}

/// Attach `image` to the submission `payload`, either inline or as an
/// object-store reference, depending on inflated size.
pub(crate) async fn send_image_data(
    transport: &dyn Transport,
    api_url: &str,
    bearer: &str,
    image: &ImageData,
    payload: &mut Value,
) -> Result<()> {
    let field = if uses_inline(image.bytes.len()) {
        json!({
            "base64": BASE64.encode(&image.bytes),
            "offsets": image.offsets,
        })
    } else {
        let object = upload_to_store(transport, api_url, bearer, image.bytes.clone()).await?;
        json!({
            "s3_object": object,
            "offsets": image.offsets,
        })
    };
    payload["image_data"] = field;
    Ok(())
}

/// Request an upload target, transfer the raw bytes, and return the object
/// reference to embed in the submission.
async fn upload_to_store(
    transport: &dyn Transport,
    api_url: &str,
    bearer: &str,
    data: Vec<u8>,
) -> Result<String> {
    let upload = transport
        .get(&format!("{api_url}/upload"), Some(bearer))
        .await?;
    let url = upload
        .get("url")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CloudError::MalformedPayload("upload response missing url".to_string()))?;
    info!(url, "uploading image input to temporary transfer");
    transport.put(url, data).await?;
    upload
        .get("object")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| CloudError::MalformedPayload("upload response missing object".to_string()))
}

/// Fetch and split result images from a status response's `images` object.
///
/// The object carries `offsets` plus either a `url` to download from or an
/// inline `base64` buffer.
pub(crate) async fn receive_images(
    transport: &dyn Transport,
    images: &Value,
) -> Result<ImageCollection> {
    let offsets = parse_offsets(images)?;
    if let Some(url) = images.get("url").and_then(|v| v.as_str()) {
        info!(url, "downloading result images from temporary transfer");
        let data = transport.download(url).await?;
        ImageCollection::from_bytes(data, &offsets)
    } else if let Some(encoded) = images.get("base64").and_then(|v| v.as_str()) {
        ImageCollection::from_base64(encoded, &offsets)
    } else {
        let snippet: String = images.to_string().chars().take(80).collect();
        Err(CloudError::MalformedPayload(format!(
            "no result images found in server response: {snippet}"
        )))
    }
}

fn parse_offsets(images: &Value) -> Result<Vec<usize>> {
    let raw = images.get("offsets").and_then(|v| v.as_array());
    let offsets: Option<Vec<usize>> = raw.map(|entries| {
        entries
            .iter()
            .map(|v| v.as_u64().map(|n| n as usize))
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default()
    });
    match offsets {
        Some(offsets) if !offsets.is_empty() => Ok(offsets),
        _ => Err(CloudError::MalformedPayload(format!(
            "could not read result images, invalid offsets: {}",
            images.get("offsets").unwrap_or(&Value::Null)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_size() {
        assert_eq!(base64_size(0), 0);
        assert_eq!(base64_size(1), 4);
        assert_eq!(base64_size(3), 4);
        assert_eq!(base64_size(4), 8);
        assert_eq!(base64_size(6), 8);
    }

    #[test]
    fn test_inline_boundary() {
        // ceil(2_624_997 / 3) * 4 == 3_499_996, the largest size under the limit
        assert!(uses_inline(2_624_997));
        // one more byte inflates to exactly 3_500_000, no longer strictly below
        assert!(!uses_inline(2_624_998));
    }

    #[test]
    fn test_split_at_offsets() {
        let data = vec![1u8, 2, 3, 4, 5, 6];
        let images = ImageCollection::from_bytes(data, &[0, 2, 5]).unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images.get(0), Some(&[1u8, 2][..]));
        assert_eq!(images.get(1), Some(&[3u8, 4, 5][..]));
        assert_eq!(images.get(2), Some(&[6u8][..]));
    }

    #[test]
    fn test_single_offset_spans_buffer() {
        let images = ImageCollection::from_bytes(vec![9u8, 8, 7], &[0]).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images.get(0), Some(&[9u8, 8, 7][..]));
    }

    #[test]
    fn test_empty_offsets_rejected() {
        let err = ImageCollection::from_bytes(vec![1u8, 2, 3], &[]).unwrap_err();
        assert!(matches!(err, CloudError::MalformedPayload(_)));
    }

    #[test]
    fn test_out_of_bounds_offset_rejected() {
        let err = ImageCollection::from_bytes(vec![1u8, 2], &[0, 5]).unwrap_err();
        assert!(matches!(err, CloudError::MalformedPayload(_)));
    }

    #[test]
    fn test_descending_offsets_rejected() {
        let err = ImageCollection::from_bytes(vec![1u8, 2, 3, 4], &[2, 1]).unwrap_err();
        assert!(matches!(err, CloudError::MalformedPayload(_)));
    }

    #[test]
    fn test_from_base64() {
        let data = vec![10u8, 20, 30, 40];
        let encoded = BASE64.encode(&data);
        let images = ImageCollection::from_base64(&encoded, &[0, 2]).unwrap();
        assert_eq!(images.get(0), Some(&[10u8, 20][..]));
        assert_eq!(images.get(1), Some(&[30u8, 40][..]));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let err = ImageCollection::from_base64("not base64!!!", &[0]).unwrap_err();
        assert!(matches!(err, CloudError::MalformedPayload(_)));
    }

    #[test]
    fn test_parse_offsets_missing() {
        let err = parse_offsets(&json!({"base64": "AAAA"})).unwrap_err();
        assert!(matches!(err, CloudError::MalformedPayload(_)));
    }

    #[test]
    fn test_parse_offsets_empty_list() {
        let err = parse_offsets(&json!({"offsets": []})).unwrap_err();
        assert!(matches!(err, CloudError::MalformedPayload(_)));
    }

    #[test]
    fn test_parse_offsets_non_numeric() {
        let err = parse_offsets(&json!({"offsets": ["zero"]})).unwrap_err();
        assert!(matches!(err, CloudError::MalformedPayload(_)));
    }

    #[test]
    fn test_parse_offsets_valid() {
        let offsets = parse_offsets(&json!({"offsets": [0, 1024]})).unwrap();
        assert_eq!(offsets, vec![0, 1024]);
    }
}
