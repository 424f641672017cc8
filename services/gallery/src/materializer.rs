use crate::path_tree::{decompose, PathError};
use crate::tree_index::{Item, PutOutcome, TreeIndex};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Outcome of one conditional write attempt, made explicit so duplicate
/// delivery and partial failure are observable rather than swallowed
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Created,
    AlreadyExists,
    Failed(String),
}

/// One attempted index write during materialization
#[derive(Debug, Clone, PartialEq)]
pub struct WriteAttempt {
    pub path: String,
    pub outcome: WriteOutcome,
}

/// Per-entry outcomes of materializing a single object-created event
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializeReport {
    /// Ancestor folder attempts, innermost first
    pub ancestors: Vec<WriteAttempt>,
    /// The leaf image attempt
    pub leaf: WriteAttempt,
}

impl MaterializeReport {
    /// Number of entries this run actually created
    pub fn created_count(&self) -> usize {
        self.ancestors
            .iter()
            .map(|a| &a.outcome)
            .chain(std::iter::once(&self.leaf.outcome))
            .filter(|o| matches!(o, WriteOutcome::Created))
            .count()
    }
}

/// Idempotently materializes the full ancestor chain plus the leaf item for
/// an object-created event.
///
/// Every write is an independent conditional insert against a disjoint
/// `(parent, path)` key: an occupied key is steady-state, a store failure on
/// one entry never blocks the others, and re-running on the same event is a
/// no-op with respect to final index state.
pub struct Materializer {
    index: Arc<dyn TreeIndex>,
    max_depth: usize,
}

impl Materializer {
    pub fn new(index: Arc<dyn TreeIndex>, max_depth: usize) -> Self {
        Self { index, max_depth }
    }

    /// Handle one object-created event for `key`. Fails only on malformed
    /// keys; individual write failures are recorded in the report instead.
    #[instrument(skip(self))]
    pub async fn materialize(&self, key: &str) -> Result<MaterializeReport, PathError> {
        let decomposed = decompose(key, self.max_depth)?;

        let mut ancestors = Vec::with_capacity(decomposed.ancestors.len());
        for ancestor in &decomposed.ancestors {
            let item = Item::folder(ancestor.path.clone(), ancestor.parent.clone());
            let outcome = self.try_insert(&item).await;
            ancestors.push(WriteAttempt {
                path: ancestor.path.clone(),
                outcome,
            });
        }

        let leaf_item = Item::image(decomposed.leaf.path.clone(), decomposed.leaf.parent.clone());
        let leaf = WriteAttempt {
            path: decomposed.leaf.path,
            outcome: self.try_insert(&leaf_item).await,
        };

        Ok(MaterializeReport { ancestors, leaf })
    }

    async fn try_insert(&self, item: &Item) -> WriteOutcome {
        match self.index.put_if_absent(item).await {
            Ok(PutOutcome::Created) => {
                info!(
                    path = %item.path,
                    parent = %item.parent,
                    item_type = item.item_type.as_str(),
                    "Index entry created"
                );
                metrics::counter!("gallery_index_writes_total", "outcome" => "created")
                    .increment(1);
                WriteOutcome::Created
            }
            Ok(PutOutcome::AlreadyExists) => {
                debug!(
                    path = %item.path,
                    parent = %item.parent,
                    "Index entry already exists, skipped"
                );
                metrics::counter!("gallery_index_writes_total", "outcome" => "already_exists")
                    .increment(1);
                WriteOutcome::AlreadyExists
            }
            Err(e) => {
                error!(
                    path = %item.path,
                    parent = %item.parent,
                    error = %e,
                    "Index entry write failed"
                );
                metrics::counter!("gallery_index_writes_total", "outcome" => "error")
                    .increment(1);
                WriteOutcome::Failed(e.to_string())
            }
        }
    }
}
