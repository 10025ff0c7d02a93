//! Notification Worker Service - Entry Point
//!
//! Background worker that processes notification requests from the Redis stream.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    notification_worker::run().await
}
