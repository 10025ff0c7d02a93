//! Stream consumer for Redis operations
//!
//! Handles reading messages from Redis streams using consumer groups.

use crate::config::WorkerConfig;
use crate::dlq::{DlqEntry, DlqManager};
use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::registry::StreamJob;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stream consumer for Redis operations
pub struct StreamConsumer {
    redis: Arc<ConnectionManager>,
    config: WorkerConfig,
}

impl StreamConsumer {
    /// Create a new StreamConsumer
    pub fn new(redis: Arc<ConnectionManager>, config: WorkerConfig) -> Self {
        Self { redis, config }
    }

    /// Get a reference to the Redis connection
    pub fn redis(&self) -> Arc<ConnectionManager> {
        self.redis.clone()
    }

    /// Get the stream name
    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    /// Get the consumer group
    pub fn consumer_group(&self) -> &str {
        &self.config.consumer_group
    }

    /// Get the consumer ID
    pub fn consumer_id(&self) -> &str {
        &self.config.consumer_id
    }

    /// Initialize the consumer group if it doesn't exist
    pub async fn ensure_consumer_group(&self) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();

        // Try to create the group, ignore error if it already exists
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0") // Start from beginning
            .arg("MKSTREAM") // Create stream if it doesn't exist
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.stream_name,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
            }
            Err(e) => return Err(StreamError::Redis(e)),
        }

        Ok(())
    }

    /// Read new messages from the stream
    pub async fn read_new<J: StreamJob>(&self) -> Result<Vec<StreamEvent<J>>, StreamError> {
        let mut conn = (*self.redis).clone();

        // Build the command with optional blocking
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id);

        if let Some(timeout) = self.config.blocking_timeout_ms {
            cmd.arg("BLOCK").arg(timeout);
        }

        cmd.arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">"); // Only new messages

        let result: RedisResult<Option<Vec<(String, Vec<(String, Vec<(String, String)>)>)>>> =
            cmd.query_async(&mut conn).await;

        match result {
            Ok(Some(streams)) => {
                let mut events = Vec::new();
                for (_stream_name, entries) in streams {
                    events.extend(self.parse_entries(entries, None).await?);
                }
                Ok(events)
            }
            Ok(None) => Ok(vec![]), // No messages (blocking timeout)
            Err(e) if e.to_string().contains("NOGROUP") => {
                // Consumer group doesn't exist yet
                Ok(vec![])
            }
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Acknowledge a message
    pub async fn ack(&self, stream_id: &str) -> Result<(), StreamError> {
        let mut conn = (*self.redis).clone();

        let _: i64 = redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(stream_id)
            .query_async(&mut conn)
            .await?;

        debug!(stream_id = %stream_id, "Acknowledged message");
        Ok(())
    }

    /// Claim pending messages idle longer than the visibility timeout.
    ///
    /// Returned events carry the delivery count reported by `XPENDING`, so
    /// the worker can enforce the delivery limit across consumers.
    pub async fn claim_abandoned<J: StreamJob>(
        &self,
    ) -> Result<Vec<StreamEvent<J>>, StreamError> {
        let mut conn = (*self.redis).clone();

        // Pending entries: (id, consumer, idle_time_ms, delivery_count)
        let pending: RedisResult<Vec<(String, String, i64, i64)>> = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(self.config.batch_size)
            .query_async(&mut conn)
            .await;

        let pending = match pending {
            Ok(p) => p,
            Err(e) if e.to_string().contains("NOGROUP") => return Ok(vec![]),
            Err(e) => return Err(StreamError::Redis(e)),
        };

        if pending.is_empty() {
            return Ok(vec![]);
        }

        // Only messages past the visibility timeout are up for grabs
        let visibility = self.config.visibility_timeout_ms as i64;
        let mut delivery_counts: HashMap<String, u32> = HashMap::new();
        let claim_ids: Vec<String> = pending
            .iter()
            .filter(|(_, _, idle_time, _)| *idle_time > visibility)
            .map(|(id, _, _, count)| {
                delivery_counts.insert(id.clone(), (*count).max(1) as u32);
                id.clone()
            })
            .collect();

        if claim_ids.is_empty() {
            return Ok(vec![]);
        }

        // Claim the messages for this consumer
        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id)
            .arg(self.config.visibility_timeout_ms);

        for id in &claim_ids {
            cmd.arg(id);
        }

        let result: RedisResult<Vec<(String, Vec<(String, String)>)>> =
            cmd.query_async(&mut conn).await;

        match result {
            Ok(entries) => {
                // XCLAIM itself counts as a delivery
                let counts: HashMap<String, u32> = delivery_counts
                    .into_iter()
                    .map(|(id, count)| (id, count + 1))
                    .collect();

                let events = self.parse_entries(entries, Some(&counts)).await?;
                if !events.is_empty() {
                    warn!(count = events.len(), "Claimed abandoned messages");
                }
                Ok(events)
            }
            Err(e) => Err(StreamError::Redis(e)),
        }
    }

    /// Get stream info (length, pending count)
    pub async fn stream_info(&self) -> Result<StreamInfo, StreamError> {
        let mut conn = (*self.redis).clone();

        let len: i64 = conn.xlen(&self.config.stream_name).await?;

        // Get pending count for this consumer group
        let pending: RedisResult<(i64, Option<String>, Option<String>, Option<Vec<(String, i64)>>)> =
            redis::cmd("XPENDING")
                .arg(&self.config.stream_name)
                .arg(&self.config.consumer_group)
                .query_async(&mut conn)
                .await;

        let pending_count = pending.map(|(count, _, _, _)| count).unwrap_or(0);

        Ok(StreamInfo {
            stream_name: self.config.stream_name.clone(),
            length: len,
            pending_count,
            consumer_group: self.config.consumer_group.clone(),
        })
    }

    /// Parse entries from a Redis response.
    ///
    /// Entries whose payload cannot be deserialized are dead-lettered raw and
    /// acknowledged so a poison message can never wedge the group.
    async fn parse_entries<J: StreamJob>(
        &self,
        entries: Vec<(String, Vec<(String, String)>)>,
        delivery_counts: Option<&HashMap<String, u32>>,
    ) -> Result<Vec<StreamEvent<J>>, StreamError> {
        let mut events = Vec::new();

        for (stream_id, fields) in entries {
            let job_data = fields
                .iter()
                .find(|(k, _)| k == "job")
                .map(|(_, v)| v.as_str());

            let Some(json) = job_data else {
                warn!(
                    stream_id = %stream_id,
                    fields = ?fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
                    "Missing 'job' field in message, dead-lettering"
                );
                self.dead_letter_raw(&stream_id, "", "missing 'job' field")
                    .await?;
                continue;
            };

            match serde_json::from_str::<J>(json) {
                Ok(job) => {
                    let count = delivery_counts
                        .and_then(|counts| counts.get(&stream_id).copied())
                        .unwrap_or(1);
                    events.push(StreamEvent::with_delivery_count(stream_id, job, count));
                }
                Err(e) => {
                    warn!(
                        stream_id = %stream_id,
                        error = %e,
                        "Failed to parse job, dead-lettering"
                    );
                    self.dead_letter_raw(&stream_id, json, &e.to_string())
                        .await?;
                }
            }
        }

        Ok(events)
    }

    /// Dead-letter a payload that never became a job, then ack it.
    async fn dead_letter_raw(
        &self,
        stream_id: &str,
        raw: &str,
        error: &str,
    ) -> Result<(), StreamError> {
        if !self.config.dlq_stream.is_empty() {
            let entry = DlqEntry {
                job_id: stream_id.to_string(),
                job_data: serde_json::Value::String(raw.to_string()),
                error: error.to_string(),
                original_stream_id: stream_id.to_string(),
                delivery_count: 0,
                failed_at: Utc::now(),
            };
            DlqManager::new(self.redis.clone(), &self.config.dlq_stream)
                .push(&entry)
                .await?;
        }
        self.ack(stream_id).await
    }
}

/// Stream information
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub stream_name: String,
    pub length: i64,
    pub pending_count: i64,
    pub consumer_group: String,
}
