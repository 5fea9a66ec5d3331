use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::fmt;
use std::io::Cursor;

/// Rendered images are never wider than this.
pub const MAX_WIDTH: u32 = 300;

pub const NOT_UPLOADED: &str = "Not uploaded";

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("upload is empty")]
    Empty,
    #[error("only PNG and JPEG images are accepted")]
    Unsupported,
    #[error("image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
}

/// An uploaded attachment, stored byte for byte.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBlob(Vec<u8>);

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageBlob({} bytes)", self.0.len())
    }
}

impl ImageBlob {
    pub fn from_upload(bytes: Vec<u8>) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        match image::guess_format(&bytes) {
            Ok(ImageFormat::Png | ImageFormat::Jpeg) => Ok(Self(bytes)),
            _ => Err(ImageError::Unsupported),
        }
    }

    /// Wraps bytes read back from storage without re-validating them.
    pub fn from_stored(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn mime_type(&self) -> &'static str {
        image::guess_format(&self.0)
            .map(|f| f.to_mime_type())
            .unwrap_or("application/octet-stream")
    }

    /// Decodes the blob, shrinks it to `MAX_WIDTH` keeping the aspect ratio,
    /// and returns a JPEG data URI.
    pub fn to_data_uri(&self) -> Result<String, ImageError> {
        let decoded = image::load_from_memory(&self.0)?;
        let bounded = if decoded.width() > MAX_WIDTH {
            let height = (u64::from(decoded.height()) * u64::from(MAX_WIDTH)
                / u64::from(decoded.width()))
            .max(1) as u32;
            decoded.resize_exact(MAX_WIDTH, height, FilterType::Triangle)
        } else {
            decoded
        };

        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(bounded.to_rgb8()).write_to(&mut out, ImageFormat::Jpeg)?;
        Ok(format!(
            "data:image/jpeg;base64,{}",
            STANDARD.encode(out.into_inner())
        ))
    }
}

/// Markdown for an optional attachment; absent or undecodable blobs render
/// as the "Not uploaded" marker.
pub fn render_markdown(blob: Option<&ImageBlob>) -> String {
    let Some(blob) = blob else {
        return NOT_UPLOADED.to_string();
    };
    match blob.to_data_uri() {
        Ok(uri) => format!("![Uploaded Image]({uri})"),
        Err(e) => {
            tracing::warn!("Stored image could not be rendered: {}", e);
            NOT_UPLOADED.to_string()
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_bytes_round_trip_unchanged() {
        let bytes = sample_png(8, 4);
        let blob = ImageBlob::from_upload(bytes.clone()).unwrap();
        assert_eq!(blob.as_bytes(), bytes.as_slice());
    }

    #[test]
    fn rejects_empty_and_non_image_uploads() {
        assert!(matches!(ImageBlob::from_upload(Vec::new()), Err(ImageError::Empty)));
        assert!(matches!(
            ImageBlob::from_upload(b"plain text, not a picture".to_vec()),
            Err(ImageError::Unsupported)
        ));
    }

    #[test]
    fn wide_images_are_shrunk_to_max_width() {
        let blob = ImageBlob::from_upload(sample_png(600, 200)).unwrap();
        let uri = blob.to_data_uri().unwrap();
        let encoded = uri.strip_prefix("data:image/jpeg;base64,").unwrap();
        let jpeg = STANDARD.decode(encoded).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), MAX_WIDTH);
        assert_eq!(decoded.height(), 100);
    }

    #[test]
    fn narrow_images_keep_their_size() {
        let blob = ImageBlob::from_upload(sample_png(40, 30)).unwrap();
        let uri = blob.to_data_uri().unwrap();
        let jpeg = STANDARD
            .decode(uri.trim_start_matches("data:image/jpeg;base64,"))
            .unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[test]
    fn missing_or_broken_blob_renders_marker() {
        assert_eq!(render_markdown(None), NOT_UPLOADED);
        let broken = ImageBlob::from_stored(vec![0x89, b'P', b'N', b'G']);
        assert_eq!(render_markdown(Some(&broken)), NOT_UPLOADED);
        let ok = ImageBlob::from_upload(sample_png(4, 4)).unwrap();
        assert!(render_markdown(Some(&ok)).starts_with("![Uploaded Image](data:image/jpeg;base64,"));
    }

    #[test]
    fn mime_type_is_sniffed() {
        let blob = ImageBlob::from_upload(sample_png(2, 2)).unwrap();
        assert_eq!(blob.mime_type(), "image/png");
    }
}
