//! Request record sink
//!
//! Every capture request's `{url, timestamp}` pair is recorded with an
//! external store. Recording is fire-and-forget: the pipeline spawns
//! the call as a detached task, so a slow or failing sink can never
//! delay or fail a capture.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Record sink failure. Never propagates into the capture pipeline.
#[derive(Error, Debug)]
#[error("Record sink error: {0}")]
pub struct RecordError(
    /// Underlying sink failure message
    pub String,
);

/// One recorded request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    /// The requested URL, as received from the client
    pub url: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Durable sink for request records.
pub trait RecordSink: Send + Sync + 'static {
    /// Persist one record.
    fn record(&self, record: RequestRecord) -> BoxFuture<'static, Result<(), RecordError>>;
}

/// Sends records to an HTTP collector as JSON.
pub struct HttpRecordSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRecordSink {
    /// Create a sink posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl RecordSink for HttpRecordSink {
    fn record(&self, record: RequestRecord) -> BoxFuture<'static, Result<(), RecordError>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        async move {
            client
                .post(&endpoint)
                .json(&record)
                .send()
                .await
                .map_err(|e| RecordError(e.to_string()))?
                .error_for_status()
                .map_err(|e| RecordError(e.to_string()))?;
            Ok(())
        }
        .boxed()
    }
}

/// Discards records. Used when no record store is configured.
pub struct NullRecordSink;

impl RecordSink for NullRecordSink {
    fn record(&self, record: RequestRecord) -> BoxFuture<'static, Result<(), RecordError>> {
        debug!("Dropping record for {}", record.url);
        async { Ok(()) }.boxed()
    }
}

/// Fire the record call as a detached task.
pub fn record_detached(sink: &Arc<dyn RecordSink>, record: RequestRecord) {
    let fut = sink.record(record);
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            warn!("Request record failed: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: AtomicUsize,
    }

    impl RecordSink for Arc<CountingSink> {
        fn record(&self, _record: RequestRecord) -> BoxFuture<'static, Result<(), RecordError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }.boxed()
        }
    }

    #[tokio::test]
    async fn detached_record_reaches_the_sink() {
        let counting = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });
        let sink: Arc<dyn RecordSink> = Arc::new(counting.clone());

        record_detached(
            &sink,
            RequestRecord {
                url: "https://example.com".to_string(),
                timestamp: 1,
            },
        );
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn null_sink_accepts_records() {
        let sink = NullRecordSink;
        let result = sink
            .record(RequestRecord {
                url: "https://example.com".to_string(),
                timestamp: 2,
            })
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn record_serializes_to_expected_shape() {
        let json = serde_json::to_value(RequestRecord {
            url: "https://example.com".to_string(),
            timestamp: 1700000000000,
        })
        .unwrap();
        assert_eq!(json["url"], "https://example.com");
        assert_eq!(json["timestamp"], 1700000000000i64);
    }
}
