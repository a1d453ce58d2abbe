//! Notification Worker Service - Entry Point
//!
//! Background worker that delivers queued notifications and reminders.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    eventfinder_notification_worker::run().await
}
