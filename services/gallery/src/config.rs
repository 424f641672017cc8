use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the gallery service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 bucket configuration
    pub s3: S3Config,
    /// Tree index (DynamoDB) configuration
    pub index: IndexConfig,
    /// Thumbnail rendition configuration
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
    /// Gallery listing configuration
    #[serde(default)]
    pub gallery: GalleryConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// S3 configuration for the primary and derived buckets
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket holding the original images
    pub image_bucket: String,
    /// Bucket holding derived thumbnail renditions
    pub thumb_bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Tree index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// DynamoDB table holding the materialized tree
    pub table_name: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for DynamoDB Local)
    pub endpoint_url: Option<String>,
    /// Create the table on startup if it does not exist
    #[serde(default)]
    pub create_table: bool,
}

/// Thumbnail rendition configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailConfig {
    /// Maximum thumbnail width in pixels
    #[serde(default = "default_thumb_dimension")]
    pub max_width: u32,
    /// Maximum thumbnail height in pixels
    #[serde(default = "default_thumb_dimension")]
    pub max_height: u32,
    /// JPEG re-encode quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Gallery listing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GalleryConfig {
    /// Maximum number of ancestor folders materialized per object key
    #[serde(default = "default_max_ancestor_depth")]
    pub max_ancestor_depth: usize,
    /// Thumbnail presigned URL expiry in seconds
    #[serde(default = "default_thumbnail_url_expiry_secs")]
    pub thumbnail_url_expiry_secs: u64,
    /// Download presigned URL expiry in seconds
    #[serde(default = "default_download_url_expiry_secs")]
    pub download_url_expiry_secs: u64,
}

/// API configuration for the listing and event endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "gallery-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_thumb_dimension() -> u32 {
    300
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_max_ancestor_depth() -> usize {
    6
}

fn default_thumbnail_url_expiry_secs() -> u64 {
    60 * 5
}

fn default_download_url_expiry_secs() -> u64 {
    60 * 15
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Add config file if present
            .add_source(config::File::with_name("config/gallery").required(false))
            .add_source(config::File::with_name("/etc/gallery/gallery").required(false))
            // Override with environment variables
            // GALLERY__S3__IMAGE_BUCKET -> s3.image_bucket
            .add_source(
                config::Environment::with_prefix("GALLERY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get thumbnail URL expiry as Duration
    pub fn thumbnail_url_expiry(&self) -> Duration {
        Duration::from_secs(self.gallery.thumbnail_url_expiry_secs)
    }

    /// Get download URL expiry as Duration
    pub fn download_url_expiry(&self) -> Duration {
        Duration::from_secs(self.gallery.download_url_expiry_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: default_thumb_dimension(),
            max_height: default_thumb_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            max_ancestor_depth: default_max_ancestor_depth(),
            thumbnail_url_expiry_secs: default_thumbnail_url_expiry_secs(),
            download_url_expiry_secs: default_download_url_expiry_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}
