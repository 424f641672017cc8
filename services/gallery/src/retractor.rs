use crate::object_store::ObjectStore;
use crate::path_tree::{leaf_of, PathError};
use crate::thumbnail::derived_key;
use crate::tree_index::TreeIndex;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Outcome of one of the two independent deletes
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Removed,
    Failed(String),
}

/// Per-target outcomes of retracting a single object-deleted event
#[derive(Debug, Clone, PartialEq)]
pub struct RetractReport {
    /// Removal of the leaf index entry
    pub index: DeleteOutcome,
    /// Best-effort removal of the derived thumbnail
    pub thumbnail: DeleteOutcome,
}

/// Removes a leaf item and its derived thumbnail when the original object is
/// deleted. The two deletes are independent; failure of one never blocks the
/// other. Ancestor folder entries are deliberately left behind even when they
/// become empty.
pub struct Retractor {
    index: Arc<dyn TreeIndex>,
    thumbs: Arc<dyn ObjectStore>,
    thumb_width: u32,
}

impl Retractor {
    pub fn new(
        index: Arc<dyn TreeIndex>,
        thumbs: Arc<dyn ObjectStore>,
        thumb_width: u32,
    ) -> Self {
        Self {
            index,
            thumbs,
            thumb_width,
        }
    }

    /// Handle one object-deleted event for `key`. Fails only on malformed
    /// keys; individual delete failures are recorded in the report.
    #[instrument(skip(self))]
    pub async fn retract(&self, key: &str) -> Result<RetractReport, PathError> {
        let leaf = leaf_of(key)?;
        let thumb_key = derived_key(self.thumb_width, &leaf.path);

        let (index_result, thumb_result) = futures::join!(
            self.index.delete(&leaf.parent, &leaf.path),
            self.thumbs.delete_object(&thumb_key),
        );

        let index = match index_result {
            Ok(()) => {
                info!(parent = %leaf.parent, path = %leaf.path, "Leaf index entry removed");
                metrics::counter!("gallery_index_deletes_total", "outcome" => "removed")
                    .increment(1);
                DeleteOutcome::Removed
            }
            Err(e) => {
                error!(parent = %leaf.parent, path = %leaf.path, error = %e, "Index delete failed");
                metrics::counter!("gallery_index_deletes_total", "outcome" => "error")
                    .increment(1);
                DeleteOutcome::Failed(e.to_string())
            }
        };

        let thumbnail = match thumb_result {
            Ok(()) => {
                info!(key = %thumb_key, "Derived thumbnail removed");
                metrics::counter!("gallery_thumbnail_deletes_total", "outcome" => "removed")
                    .increment(1);
                DeleteOutcome::Removed
            }
            Err(e) => {
                warn!(key = %thumb_key, error = %e, "Thumbnail delete failed");
                metrics::counter!("gallery_thumbnail_deletes_total", "outcome" => "error")
                    .increment(1);
                DeleteOutcome::Failed(e.to_string())
            }
        };

        Ok(RetractReport { index, thumbnail })
    }
}
