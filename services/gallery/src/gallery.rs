use crate::config::ApiConfig;
use crate::events::{EventHandlers, S3EventNotification};
use crate::object_store::ObjectStore;
use crate::path_tree::{basename, normalize_query_path};
use crate::thumbnail::derived_key;
use crate::tree_index::{IndexError, ItemType, TreeIndex};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// One entry in a directory listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GalleryEntry {
    Folder {
        name: String,
        path: String,
    },
    Image {
        name: String,
        path: String,
        /// Time-limited read URL into the thumbnail namespace
        thumbnail: String,
        /// Time-limited read URL into the primary namespace
        download: String,
    },
}

/// A directory listing: the normalized query path plus its children.
/// Entry ordering follows the index's natural return order and is not a
/// guarantee callers may rely on.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryListing {
    pub path: String,
    pub objects: Vec<GalleryEntry>,
}

/// Listing failures, distinct from "path has zero children" (which is a
/// successful empty listing)
#[derive(Debug, Error)]
pub enum ListError {
    #[error("index query failed: {0}")]
    Index(#[from] IndexError),
    #[error("failed to sign URL: {0}")]
    Presign(anyhow::Error),
}

/// Answers "children of path P" against the tree index, filtering private
/// entries and attaching presigned URLs for image leaves.
pub struct GalleryQuery {
    index: Arc<dyn TreeIndex>,
    images: Arc<dyn ObjectStore>,
    thumbs: Arc<dyn ObjectStore>,
    thumb_width: u32,
    thumbnail_url_expiry: Duration,
    download_url_expiry: Duration,
}

impl GalleryQuery {
    pub fn new(
        index: Arc<dyn TreeIndex>,
        images: Arc<dyn ObjectStore>,
        thumbs: Arc<dyn ObjectStore>,
        thumb_width: u32,
        thumbnail_url_expiry: Duration,
        download_url_expiry: Duration,
    ) -> Self {
        Self {
            index,
            images,
            thumbs,
            thumb_width,
            thumbnail_url_expiry,
            download_url_expiry,
        }
    }

    /// List the children of `raw_path` (empty means the root)
    #[instrument(skip(self))]
    pub async fn list(&self, raw_path: &str) -> Result<GalleryListing, ListError> {
        let parent = normalize_query_path(raw_path);
        let items = self.index.children_of(&parent).await?;

        let mut objects = Vec::with_capacity(items.len());
        for item in items.into_iter().filter(|i| !i.private) {
            let entry = match item.item_type {
                ItemType::Folder => GalleryEntry::Folder {
                    name: basename(&item.path).to_string(),
                    path: item.path,
                },
                ItemType::Image => {
                    let thumbnail = self
                        .thumbs
                        .presign_get(
                            &derived_key(self.thumb_width, &item.path),
                            self.thumbnail_url_expiry,
                        )
                        .await
                        .map_err(ListError::Presign)?;
                    let download = self
                        .images
                        .presign_get(&item.path, self.download_url_expiry)
                        .await
                        .map_err(ListError::Presign)?;
                    GalleryEntry::Image {
                        name: basename(&item.path).to_string(),
                        path: item.path,
                        thumbnail,
                        download,
                    }
                }
            };
            objects.push(entry);
        }

        metrics::counter!("gallery_listings_total").increment(1);

        Ok(GalleryListing {
            path: parent,
            objects,
        })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<GalleryQuery>,
    pub handlers: Arc<EventHandlers>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/gallery", get(list_gallery_root))
        .route("/gallery/*path", get(list_gallery))
        .route("/events", post(ingest_events))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "gallery-service"
    }))
}

/// List the root of the gallery
async fn list_gallery_root(
    State(state): State<AppState>,
) -> Result<Json<GalleryListing>, (StatusCode, Json<ErrorResponse>)> {
    list_path(&state, String::new()).await
}

/// List an arbitrary gallery path
async fn list_gallery(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<GalleryListing>, (StatusCode, Json<ErrorResponse>)> {
    list_path(&state, path).await
}

async fn list_path(
    state: &AppState,
    path: String,
) -> Result<Json<GalleryListing>, (StatusCode, Json<ErrorResponse>)> {
    state.query.list(&path).await.map(Json).map_err(|e| {
        error!(error = %e, path = %path, "Failed to list gallery path");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to list gallery path".to_string(),
                code: "LIST_ERROR".to_string(),
            }),
        )
    })
}

/// Receive an object-store notification batch and dispatch each record.
/// Always accepted: per-record failures are logged/metriced, and the event
/// source's redelivery is the recovery path.
async fn ingest_events(
    State(state): State<AppState>,
    Json(notification): Json<S3EventNotification>,
) -> impl IntoResponse {
    let summary = state.handlers.handle(notification).await;
    info!(
        handled = summary.handled,
        failed = summary.failed,
        "Notification batch dispatched"
    );

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "handled": summary.handled,
            "failed": summary.failed,
        })),
    )
}

/// Start the gallery API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> anyhow::Result<()> {
    use anyhow::Context;

    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting gallery API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materializer::Materializer;
    use crate::object_store::MockObjectStore;
    use crate::tree_index::memory::MemoryTreeIndex;
    use crate::tree_index::Item;

    fn signing_store(host: &'static str) -> Arc<MockObjectStore> {
        let mut store = MockObjectStore::new();
        store
            .expect_presign_get()
            .returning(move |key, _| Ok(format!("https://{host}/{key}?signed")));
        Arc::new(store)
    }

    fn query(index: Arc<MemoryTreeIndex>) -> GalleryQuery {
        GalleryQuery::new(
            index,
            signing_store("images.example"),
            signing_store("thumbs.example"),
            300,
            Duration::from_secs(300),
            Duration::from_secs(900),
        )
    }

    #[tokio::test]
    async fn test_list_vacation_scenario() {
        let index = Arc::new(MemoryTreeIndex::new());
        Materializer::new(index.clone(), 6)
            .materialize("vacation/2023/beach.jpg")
            .await
            .unwrap();

        let q = query(index);

        // Root lists the top-level folder
        let root = q.list("").await.unwrap();
        assert_eq!(root.path, "/");
        assert_eq!(
            root.objects,
            vec![GalleryEntry::Folder {
                name: "vacation".to_string(),
                path: "vacation/".to_string(),
            }]
        );

        // The leaf's parent lists the image with both URLs populated
        let listing = q.list("vacation/2023").await.unwrap();
        assert_eq!(listing.path, "vacation/2023/");
        assert_eq!(
            listing.objects,
            vec![GalleryEntry::Image {
                name: "beach.jpg".to_string(),
                path: "vacation/2023/beach.jpg".to_string(),
                thumbnail: "https://thumbs.example/300/vacation/2023/beach.jpg?signed".to_string(),
                download: "https://images.example/vacation/2023/beach.jpg?signed".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_private_items_are_hidden() {
        let index = Arc::new(MemoryTreeIndex::new());
        index.insert_raw(Item::image("visible.jpg", "/"));
        index.insert_raw(Item {
            path: "hidden.jpg".to_string(),
            parent: "/".to_string(),
            item_type: ItemType::Image,
            private: true,
        });
        index.insert_raw(Item {
            path: "secret/".to_string(),
            parent: "/".to_string(),
            item_type: ItemType::Folder,
            private: true,
        });

        let listing = query(index).list("/").await.unwrap();
        assert_eq!(listing.objects.len(), 1);
        assert!(matches!(
            &listing.objects[0],
            GalleryEntry::Image { name, .. } if name == "visible.jpg"
        ));
    }

    #[tokio::test]
    async fn test_empty_path_is_success_not_error() {
        let index = Arc::new(MemoryTreeIndex::new());
        let listing = query(index).list("no/such/folder").await.unwrap();
        assert_eq!(listing.path, "no/such/folder/");
        assert!(listing.objects.is_empty());
    }

    #[tokio::test]
    async fn test_listing_after_retraction_is_empty_but_folder_survives() {
        let index = Arc::new(MemoryTreeIndex::new());
        Materializer::new(index.clone(), 6)
            .materialize("vacation/2023/beach.jpg")
            .await
            .unwrap();
        index
            .delete("vacation/2023/", "vacation/2023/beach.jpg")
            .await
            .unwrap();

        let q = query(index);

        let listing = q.list("vacation/2023").await.unwrap();
        assert!(listing.objects.is_empty());

        // The folder entry itself still lists under its parent
        let parent = q.list("vacation").await.unwrap();
        assert_eq!(
            parent.objects,
            vec![GalleryEntry::Folder {
                name: "2023".to_string(),
                path: "vacation/2023/".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_index_failure_surfaces_as_listing_error() {
        use crate::tree_index::PutOutcome;
        use async_trait::async_trait;

        struct BrokenIndex;

        #[async_trait]
        impl TreeIndex for BrokenIndex {
            async fn put_if_absent(&self, _: &Item) -> Result<PutOutcome, IndexError> {
                Err(IndexError::Store("down".to_string()))
            }
            async fn delete(&self, _: &str, _: &str) -> Result<(), IndexError> {
                Err(IndexError::Store("down".to_string()))
            }
            async fn children_of(&self, _: &str) -> Result<Vec<Item>, IndexError> {
                Err(IndexError::Store("down".to_string()))
            }
        }

        let q = GalleryQuery::new(
            Arc::new(BrokenIndex),
            signing_store("images.example"),
            signing_store("thumbs.example"),
            300,
            Duration::from_secs(300),
            Duration::from_secs(900),
        );

        assert!(matches!(q.list("/").await, Err(ListError::Index(_))));
    }

    #[test]
    fn test_gallery_entry_serialization() {
        let folder = GalleryEntry::Folder {
            name: "vacation".to_string(),
            path: "vacation/".to_string(),
        };
        let json = serde_json::to_value(&folder).unwrap();
        assert_eq!(json["type"], "folder");
        assert_eq!(json["name"], "vacation");

        let image = GalleryEntry::Image {
            name: "beach.jpg".to_string(),
            path: "vacation/beach.jpg".to_string(),
            thumbnail: "https://t/300/vacation/beach.jpg".to_string(),
            download: "https://i/vacation/beach.jpg".to_string(),
        };
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["type"], "image");
        assert!(json["thumbnail"].as_str().unwrap().contains("300/"));
    }
}
