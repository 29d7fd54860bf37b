use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::publisher::{PublishError, Publisher};
use crate::record::PacketRecord;

/// Records every batch it is asked to publish; delivery always succeeds.
/// Clones share the same capture store, so a test can keep a handle while
/// the aggregator owns the publisher.
#[derive(Default, Clone)]
pub struct CapturingPublisher {
    batches: Arc<Mutex<Vec<Vec<PacketRecord>>>>,
}

impl CapturingPublisher {
    pub fn batches(&self) -> Vec<Vec<PacketRecord>> {
        self.batches.lock().unwrap().clone()
    }
}

impl Publisher for CapturingPublisher {
    async fn publish(&self, batch: &[PacketRecord]) -> Result<(), PublishError> {
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

pub struct FailingPublisher;

impl Publisher for FailingPublisher {
    async fn publish(&self, _batch: &[PacketRecord]) -> Result<(), PublishError> {
        Err(PublishError::Rejected {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        })
    }
}

/// Fails the first publish, then captures like a `CapturingPublisher`.
pub struct FailOncePublisher {
    failed: AtomicBool,
    capture: CapturingPublisher,
}

impl FailOncePublisher {
    pub fn new() -> Self {
        Self {
            failed: AtomicBool::new(false),
            capture: CapturingPublisher::default(),
        }
    }

    pub fn capture(&self) -> CapturingPublisher {
        self.capture.clone()
    }
}

impl Publisher for FailOncePublisher {
    async fn publish(&self, batch: &[PacketRecord]) -> Result<(), PublishError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(PublishError::Rejected {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            });
        }
        self.capture.publish(batch).await
    }
}

/// Parks for `delay` before capturing, for tests that need a publish caught
/// in flight.
pub struct SlowPublisher {
    delay: Duration,
    capture: CapturingPublisher,
}

impl SlowPublisher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            capture: CapturingPublisher::default(),
        }
    }

    pub fn capture(&self) -> CapturingPublisher {
        self.capture.clone()
    }
}

impl Publisher for SlowPublisher {
    async fn publish(&self, batch: &[PacketRecord]) -> Result<(), PublishError> {
        tokio::time::sleep(self.delay).await;
        self.capture.publish(batch).await
    }
}

/// A fully-populated record whose `source_port` carries the caller's tag, so
/// assertions can follow individual records through batches.
pub fn sample_record(tag: u16) -> PacketRecord {
    PacketRecord {
        source_port: tag,
        timestamp: "2024-11-02 14:31:07".to_owned(),
        source_ip: "192.168.1.10".to_owned(),
        destination_ip: "93.184.216.34".to_owned(),
        protocol: "TCP".to_owned(),
        length: 1514,
        request_line: "GET /index.html HTTP/1.1".to_owned(),
        status: "200".to_owned(),
    }
}

pub fn dummy_config() -> Config {
    let _ = rustls::crypto::ring::default_provider().install_default();
    Config {
        endpoint: url::Url::parse("http://localhost:6001").unwrap(),
        app_id: "test-app".to_owned(),
        credentials: None,
        listen_port: 0,
        flush_interval: Duration::from_millis(30_000),
        publish_timeout: Duration::from_millis(100),
        buffer_max_records: Some(10_000),
    }
}
