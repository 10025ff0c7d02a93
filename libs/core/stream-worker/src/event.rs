//! Stream event wrapper
//!
//! Wraps a job with its stream metadata (ID, timestamp, delivery count).

use crate::registry::StreamJob;
use chrono::{DateTime, Utc};

/// A stream event containing job data and metadata
#[derive(Debug, Clone)]
pub struct StreamEvent<J: StreamJob> {
    /// Redis stream entry ID (e.g., "1234567890123-0")
    pub stream_id: String,

    /// The job payload
    pub job: J,

    /// When the event was created (parsed from stream ID)
    pub timestamp: DateTime<Utc>,

    /// Number of times this message has been delivered
    pub delivery_count: u32,
}

impl<J: StreamJob> StreamEvent<J> {
    /// Create a new StreamEvent for a first delivery
    pub fn new(stream_id: String, job: J) -> Self {
        Self::with_delivery_count(stream_id, job, 1)
    }

    /// Create a StreamEvent with an explicit delivery count
    pub fn with_delivery_count(stream_id: String, job: J, delivery_count: u32) -> Self {
        let timestamp = Self::parse_timestamp(&stream_id);
        Self {
            stream_id,
            job,
            timestamp,
            delivery_count,
        }
    }

    /// Parse timestamp from Redis stream ID
    ///
    /// Stream IDs are in format "timestamp_ms-sequence"
    fn parse_timestamp(stream_id: &str) -> DateTime<Utc> {
        stream_id
            .split('-')
            .next()
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now)
    }

    /// Get the job ID
    pub fn job_id(&self) -> String {
        self.job.job_id()
    }

    /// Check if this is a redelivery
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }

    /// Get how long ago the event was created
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.timestamp
    }
}
