//! Gallery Index Service
//!
//! Photo-gallery backend: objects (images) land in an S3 bucket, and this
//! service derives bounded-size thumbnail renditions, maintains a
//! materialized directory tree in a DynamoDB table, and serves directory
//! listings merged with time-limited presigned URLs.
//!
//! ## Features
//!
//! - **Idempotent Tree Materialization**: every ancestor folder and leaf is
//!   written with a conditional insert, so duplicate, unordered, or
//!   concurrent event delivery converges to one surviving record
//! - **Thumbnail Pipeline**: originals are resized to fit a configured
//!   bounding box and mirrored under a size-prefixed namespace
//! - **Presigned Listings**: directory listings attach time-limited
//!   thumbnail and download URLs per image
//!
//! ## Architecture
//!
//! ```text
//! S3 Notifications            S3 Buckets                DynamoDB
//! ┌──────────────┐           ┌──────────────┐          ┌──────────────┐
//! │ POST /events │           │ images/      │          │ tree index   │
//! │ created /    │──────────▶│ thumbs/      │          │ (parent,path)│
//! │ removed      │           │   {size}/    │          └──────────────┘
//! └──────────────┘           └──────────────┘                 ▲
//!        │                          ▲                         │
//!        ▼                          │                         │
//! ┌──────────────┐           ┌──────────────┐          ┌──────────────┐
//! │ Thumbnail    │           │ Materializer │─────────▶│ Gallery      │
//! │ Pipeline     │           │ / Retractor  │          │ Query API    │
//! └──────────────┘           └──────────────┘          └──────────────┘
//! ```

pub mod config;
pub mod events;
pub mod gallery;
pub mod materializer;
pub mod object_store;
pub mod path_tree;
pub mod retractor;
pub mod thumbnail;
pub mod tree_index;

pub use config::Config;
pub use events::{EventHandlers, S3EventNotification};
pub use gallery::{AppState, GalleryEntry, GalleryListing, GalleryQuery};
pub use materializer::{MaterializeReport, Materializer, WriteOutcome};
pub use object_store::{ObjectStore, S3ObjectStore};
pub use path_tree::{decompose, DecomposedKey, PathError};
pub use retractor::{RetractReport, Retractor};
pub use thumbnail::ThumbnailPipeline;
pub use tree_index::{DynamoTreeIndex, Item, ItemType, PutOutcome, TreeIndex};
