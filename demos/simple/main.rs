use std::{sync::Arc, time::Duration};

use event_logger::{AppLifecycleObserver, AppMetadata, EventLogger, EventLoggerConfig};

pub fn main() -> event_logger::Result<()> {
    // Configure env_logger to see event logger logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("event_logger=debug"))
        .init();

    let api_url = std::env::var("EVENT_LOGGER_API_URL")
        .expect("EVENT_LOGGER_API_URL env variable should contain the backend URL");
    let api_key = std::env::var("EVENT_LOGGER_API_KEY")
        .expect("EVENT_LOGGER_API_KEY env variable should contain API key");

    let lifecycle = Arc::new(AppLifecycleObserver::new());

    let logger = EventLogger::new()?;
    logger.configure(
        EventLoggerConfig::new(AppMetadata {
            app_id: "com.example.demo".to_owned(),
            app_name: "Event Logger Demo".to_owned(),
            app_version: env!("CARGO_PKG_VERSION").to_owned(),
            os_version: std::env::consts::OS.to_owned(),
            ..AppMetadata::default()
        })
        .api_url(api_url)
        .api_key(api_key)
        .storage_dir(std::env::temp_dir().join("event-logger-demo"))
        .foreground_signal(lifecycle.clone()),
    );

    // Sent right away.
    logger.send_critical_event(
        "demo",
        "1.0.0",
        "500",
        "failed to load campaigns",
        Some([("endpoint".to_owned(), "/campaigns".to_owned())].into()),
    );

    // Stored and counted; sent with the next batch.
    for _ in 0..3 {
        logger.send_warning_event("demo", "1.0.0", "timeout", "request timed out", None);
    }

    // The host reports going to background and back. Stored events are flushed once they expire.
    lifecycle.on_activity_stopped(false);
    lifecycle.on_activity_resumed();

    logger.wait_until_idle();
    // Give the critical event time to be delivered.
    std::thread::sleep(Duration::from_secs(5));

    logger.shutdown()
}
