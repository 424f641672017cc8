use crate::config::ThumbnailConfig;
use crate::object_store::ObjectStore;
use image::{ImageFormat, ImageOutputFormat};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors produced by the thumbnail pipeline
#[derive(Debug, Error)]
pub enum ThumbnailError {
    /// The object key has no extension or an extension we cannot resize.
    /// Retrying cannot help; the event is rejected outright.
    #[error("unsupported image type for key '{0}'")]
    UnsupportedFormat(String),
    /// The object bytes could not be decoded or re-encoded
    #[error("image transform failed: {0}")]
    Transform(#[from] image::ImageError),
    /// The object store failed while fetching or writing
    #[error("object store error: {0}")]
    Store(anyhow::Error),
}

/// Image formats the pipeline can resize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }

    fn format(&self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
        }
    }
}

/// Infer the image kind from the object key's extension
pub fn infer_kind(key: &str) -> Option<ImageKind> {
    let (_, ext) = key.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some(ImageKind::Jpeg),
        "png" => Some(ImageKind::Png),
        _ => None,
    }
}

/// Key of the derived rendition: the original key under a size-prefixed
/// namespace, e.g. `300/vacation/2023/beach.jpg`
pub fn derived_key(max_width: u32, key: &str) -> String {
    format!("{max_width}/{key}")
}

/// Decode, scale to fit the configured bounding box (aspect ratio preserved,
/// never upscaled), and re-encode in the source format. Pure over bytes.
pub fn render_thumbnail(
    bytes: &[u8],
    kind: ImageKind,
    config: &ThumbnailConfig,
) -> Result<Vec<u8>, ThumbnailError> {
    let img = image::load_from_memory_with_format(bytes, kind.format())?;

    let scaled = if img.width() <= config.max_width && img.height() <= config.max_height {
        img
    } else {
        img.thumbnail(config.max_width, config.max_height)
    };

    let output_format = match kind {
        ImageKind::Jpeg => ImageOutputFormat::Jpeg(config.jpeg_quality),
        ImageKind::Png => ImageOutputFormat::Png,
    };

    let mut buf = Cursor::new(Vec::new());
    scaled.write_to(&mut buf, output_format)?;
    Ok(buf.into_inner())
}

/// Transforms stored images into bounded-size renditions in the thumbnail
/// bucket, mirroring the primary key under a size prefix.
pub struct ThumbnailPipeline {
    images: Arc<dyn ObjectStore>,
    thumbs: Arc<dyn ObjectStore>,
    config: ThumbnailConfig,
}

impl ThumbnailPipeline {
    pub fn new(
        images: Arc<dyn ObjectStore>,
        thumbs: Arc<dyn ObjectStore>,
        config: ThumbnailConfig,
    ) -> Self {
        Self {
            images,
            thumbs,
            config,
        }
    }

    /// Fetch the original, render the thumbnail, and write it to the derived
    /// bucket. Returns the derived key.
    #[instrument(skip(self))]
    pub async fn process(&self, key: &str) -> Result<String, ThumbnailError> {
        let kind =
            infer_kind(key).ok_or_else(|| ThumbnailError::UnsupportedFormat(key.to_string()))?;

        let fetched = self
            .images
            .get_object(key)
            .await
            .map_err(ThumbnailError::Store)?;

        debug!(key = %key, size_bytes = fetched.bytes.len(), "Rendering thumbnail");

        let rendered = render_thumbnail(&fetched.bytes, kind, &self.config)?;
        let out_key = derived_key(self.config.max_width, key);

        self.thumbs
            .put_object(&out_key, rendered, kind.content_type())
            .await
            .map_err(ThumbnailError::Store)?;

        metrics::counter!("gallery_thumbnails_rendered_total").increment(1);

        info!(key = %key, out_key = %out_key, "Thumbnail stored");
        Ok(out_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::{FetchedObject, MockObjectStore};
    use image::RgbImage;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_infer_kind() {
        assert_eq!(infer_kind("a/b.jpg"), Some(ImageKind::Jpeg));
        assert_eq!(infer_kind("a/b.JPEG"), Some(ImageKind::Jpeg));
        assert_eq!(infer_kind("a/b.png"), Some(ImageKind::Png));
        assert_eq!(infer_kind("a/b.gif"), None);
        assert_eq!(infer_kind("no-extension"), None);
    }

    #[test]
    fn test_derived_key() {
        assert_eq!(
            derived_key(300, "vacation/2023/beach.jpg"),
            "300/vacation/2023/beach.jpg"
        );
    }

    #[test]
    fn test_render_thumbnail_bounds_dimensions() {
        let config = ThumbnailConfig {
            max_width: 16,
            max_height: 16,
            jpeg_quality: 85,
        };
        let rendered = render_thumbnail(&png_bytes(64, 32), ImageKind::Png, &config).unwrap();

        let out = image::load_from_memory_with_format(&rendered, ImageFormat::Png).unwrap();
        assert!(out.width() <= 16);
        assert!(out.height() <= 16);
        // Aspect ratio preserved: 64x32 scales to 16x8
        assert_eq!((out.width(), out.height()), (16, 8));
    }

    #[test]
    fn test_render_thumbnail_never_upscales() {
        let config = ThumbnailConfig::default();
        let rendered = render_thumbnail(&png_bytes(8, 4), ImageKind::Png, &config).unwrap();

        let out = image::load_from_memory_with_format(&rendered, ImageFormat::Png).unwrap();
        assert_eq!((out.width(), out.height()), (8, 4));
    }

    #[test]
    fn test_render_thumbnail_rejects_garbage() {
        let config = ThumbnailConfig::default();
        let result = render_thumbnail(b"not an image", ImageKind::Jpeg, &config);
        assert!(matches!(result, Err(ThumbnailError::Transform(_))));
    }

    #[tokio::test]
    async fn test_process_writes_size_prefixed_key() {
        let source = png_bytes(64, 32);

        let mut images = MockObjectStore::new();
        images
            .expect_get_object()
            .withf(|key| key == "vacation/2023/beach.png")
            .returning(move |_| {
                Ok(FetchedObject {
                    bytes: source.clone(),
                    content_type: Some("image/png".to_string()),
                })
            });

        let mut thumbs = MockObjectStore::new();
        thumbs
            .expect_put_object()
            .withf(|key, _, content_type| {
                key == "300/vacation/2023/beach.png" && content_type == "image/png"
            })
            .returning(|_, _, _| Ok(()));

        let pipeline = ThumbnailPipeline::new(
            Arc::new(images),
            Arc::new(thumbs),
            ThumbnailConfig::default(),
        );

        let out_key = pipeline.process("vacation/2023/beach.png").await.unwrap();
        assert_eq!(out_key, "300/vacation/2023/beach.png");
    }

    #[tokio::test]
    async fn test_process_rejects_unsupported_extension() {
        let pipeline = ThumbnailPipeline::new(
            Arc::new(MockObjectStore::new()),
            Arc::new(MockObjectStore::new()),
            ThumbnailConfig::default(),
        );

        let result = pipeline.process("notes.txt").await;
        assert!(matches!(result, Err(ThumbnailError::UnsupportedFormat(_))));
    }
}
