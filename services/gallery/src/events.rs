use crate::materializer::Materializer;
use crate::retractor::Retractor;
use crate::thumbnail::{ThumbnailError, ThumbnailPipeline};
use anyhow::Result;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

/// An object-store notification batch, as delivered by S3
#[derive(Debug, Deserialize)]
pub struct S3EventNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

/// One record within a notification batch
#[derive(Debug, Deserialize)]
pub struct S3EventRecord {
    #[serde(rename = "eventName")]
    pub event_name: String,
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: S3BucketRef,
    pub object: S3ObjectRef,
}

#[derive(Debug, Deserialize)]
pub struct S3BucketRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct S3ObjectRef {
    pub key: String,
}

/// What a record asks us to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Created,
    Removed,
    Other,
}

fn classify(event_name: &str) -> EventKind {
    if event_name.contains("ObjectCreated") {
        EventKind::Created
    } else if event_name.contains("ObjectRemoved") {
        EventKind::Removed
    } else {
        EventKind::Other
    }
}

/// Decode an S3-notification object key: `+` means space, then
/// percent-decode. Falls back to the space-substituted raw on invalid
/// escapes; the downstream empty-key check rejects unusable input.
pub fn decode_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Summary of one notification batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub handled: usize,
    pub failed: usize,
}

/// Routes object-store events to the thumbnail pipeline, the materializer,
/// and the retractor. Each record is handled independently: a failing record
/// is logged and counted, never escalated into a batch-wide fault, since
/// delivery-level redelivery is the recovery path and handling is idempotent.
pub struct EventHandlers {
    materializer: Materializer,
    retractor: Retractor,
    thumbnails: ThumbnailPipeline,
}

impl EventHandlers {
    pub fn new(
        materializer: Materializer,
        retractor: Retractor,
        thumbnails: ThumbnailPipeline,
    ) -> Self {
        Self {
            materializer,
            retractor,
            thumbnails,
        }
    }

    /// Handle a notification batch record by record
    pub async fn handle(&self, notification: S3EventNotification) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for record in &notification.records {
            match self.handle_record(record).await {
                Ok(()) => summary.handled += 1,
                Err(e) => {
                    error!(
                        event_name = %record.event_name,
                        key = %record.s3.object.key,
                        error = %e,
                        "Event record failed"
                    );
                    metrics::counter!("gallery_events_total", "outcome" => "failed")
                        .increment(1);
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Handle one record. Fails only on malformed input (empty key,
    /// unsupported image type); transient store errors are logged and the
    /// record is still considered handled.
    #[instrument(skip(self, record), fields(event_name = %record.event_name))]
    pub async fn handle_record(&self, record: &S3EventRecord) -> Result<()> {
        let key = decode_key(&record.s3.object.key);

        match classify(&record.event_name) {
            EventKind::Created => {
                // Unsupported types are rejected before any write; retrying
                // cannot help and the tree must not index them.
                if crate::thumbnail::infer_kind(&key).is_none() {
                    return Err(ThumbnailError::UnsupportedFormat(key).into());
                }

                // Thumbnail derivation and tree materialization are
                // independent flows over the same event.
                let (thumb_result, materialize_result) = futures::join!(
                    self.thumbnails.process(&key),
                    self.materializer.materialize(&key),
                );

                let report = materialize_result?;
                info!(
                    key = %key,
                    bucket = %record.s3.bucket.name,
                    created = report.created_count(),
                    "Object-created event materialized"
                );

                match thumb_result {
                    Ok(out_key) => {
                        debug!(key = %key, out_key = %out_key, "Thumbnail derived");
                    }
                    Err(e) => {
                        // Transient; the index side is unaffected and
                        // redelivery is safe under idempotency
                        warn!(key = %key, error = %e, "Thumbnail derivation failed");
                        metrics::counter!("gallery_thumbnails_failed_total").increment(1);
                    }
                }

                metrics::counter!("gallery_events_total", "outcome" => "created")
                    .increment(1);
                Ok(())
            }
            EventKind::Removed => {
                let report = self.retractor.retract(&key).await?;
                info!(
                    key = %key,
                    index = ?report.index,
                    thumbnail = ?report.thumbnail,
                    "Object-removed event retracted"
                );
                metrics::counter!("gallery_events_total", "outcome" => "removed")
                    .increment(1);
                Ok(())
            }
            EventKind::Other => {
                warn!(event_name = %record.event_name, key = %key, "Ignoring unhandled event type");
                metrics::counter!("gallery_events_total", "outcome" => "ignored")
                    .increment(1);
                Ok(())
            }
        }
    }
}
