use std::{collections::HashMap, sync::mpsc, sync::Arc, time::Duration};

use crate::{
    config::EventLoggerConfig,
    delivery_cache::DeliveryCache,
    delivery_queue::{DeliveryQueue, QueueHandle},
    event::{EventRecord, EventType},
    event_factory::{AppMetadata, EventFactory},
    event_store::EventStore,
    lifecycle::ForegroundSignal,
    transport::{EventTransport, PushCallback},
    Result,
};

/// Number of stored events at which all of them are flushed.
pub const MAX_EVENTS_COUNT: usize = 50;

/// Time after the last successful flush at which stored events are flushed on the next
/// configuration or foreground transition.
pub const TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Collaborators of a configured [`EventLogger`].
///
/// [`EventLogger::configure`] builds these from an [`EventLoggerConfig`]. Hosts with their own
/// transport or storage can pass them to [`EventLogger::configure_with`] directly.
pub struct Components {
    /// Delivers event batches.
    pub transport: Arc<dyn EventTransport>,
    /// Holds events until they are delivered.
    pub event_store: EventStore,
    /// Holds the time of the last successful flush.
    pub delivery_cache: DeliveryCache,
    /// Attached to every event.
    pub metadata: AppMetadata,
    /// Flushes expired events when the application returns to the foreground.
    pub foreground_signal: Option<Arc<dyn ForegroundSignal>>,
}

/// Collects error and warning events reported by SDKs, deduplicates them, and delivers them to
/// the logging backend.
///
/// All methods return immediately; the work is done on a background thread. Events sent before
/// [`EventLogger::configure`] are dropped. The thread runs until [`EventLogger::shutdown`].
///
/// ```no_run
/// # use event_logger::{AppMetadata, EventLogger, EventLoggerConfig};
/// let logger = EventLogger::new()?;
/// logger.configure(
///     EventLoggerConfig::new(AppMetadata::default())
///         .api_url("https://logging.example.com/")
///         .api_key("api-key"),
/// );
/// logger.send_warning_event("inappmessaging", "1.0.0", "500", "server error", None);
/// # Ok::<(), event_logger::Error>(())
/// ```
pub struct EventLogger {
    queue: DeliveryQueue<LoggerState>,
}

enum LoggerState {
    Unconfigured,
    Configured(Pipeline),
}

type Queue = QueueHandle<LoggerState>;

impl EventLogger {
    /// Starts the background thread of an unconfigured logger.
    ///
    /// # Errors
    ///
    /// [`Error::Io`](crate::Error::Io) if the thread failed to start.
    pub fn new() -> Result<EventLogger> {
        let queue = DeliveryQueue::start("event-logger-delivery", LoggerState::Unconfigured)?;
        Ok(EventLogger { queue })
    }

    /// Configures the logger and flushes stored events if they have expired.
    ///
    /// Only the first configuration takes effect. If no endpoint can be resolved, the
    /// configuration is logged and abandoned, and the logger stays unconfigured.
    pub fn configure(&self, config: EventLoggerConfig) {
        self.configure_from(move || config.into_components());
    }

    /// Like [`EventLogger::configure`], with prepared collaborators.
    pub fn configure_with(&self, components: Components) {
        self.configure_from(move || Ok(components));
    }

    fn configure_from(&self, components: impl FnOnce() -> Result<Components> + Send + 'static) {
        self.queue.handle().execute_or_log(move |state, queue| {
            if let LoggerState::Configured(_) = state {
                log::debug!(target: "event_logger", "already configured, ignoring");
                return;
            }

            let components = match components() {
                Ok(components) => components,
                Err(err) => {
                    log::warn!(target: "event_logger", "abandoning configuration: {}", err);
                    return;
                }
            };

            if let Some(signal) = &components.foreground_signal {
                let queue = queue.clone();
                signal.register_listener(Box::new(move || {
                    queue.execute_or_log(|state, queue| {
                        if let LoggerState::Configured(pipeline) = state {
                            pipeline.flush_if_expired(queue);
                        }
                    });
                }));
            }

            let mut pipeline = Pipeline::new(components);
            pipeline.flush_if_expired(queue);
            *state = LoggerState::Configured(pipeline);
            log::debug!(target: "event_logger", "configured");
        });
    }

    /// Logs an error that may cause the caller to not function properly.
    ///
    /// A critical event is sent right away the first time it occurs. Repeated occurrences are
    /// counted and sent later as a warning.
    pub fn send_critical_event(
        &self,
        source_name: &str,
        source_version: &str,
        error_code: &str,
        error_message: &str,
        info: Option<HashMap<String, String>>,
    ) {
        self.send_event(
            EventType::Critical,
            source_name,
            source_version,
            error_code,
            error_message,
            info,
        );
    }

    /// Logs an unexpected situation the caller can recover from. Warnings are sent in batches.
    pub fn send_warning_event(
        &self,
        source_name: &str,
        source_version: &str,
        error_code: &str,
        error_message: &str,
        info: Option<HashMap<String, String>>,
    ) {
        self.send_event(
            EventType::Warning,
            source_name,
            source_version,
            error_code,
            error_message,
            info,
        );
    }

    fn send_event(
        &self,
        event_type: EventType,
        source_name: &str,
        source_version: &str,
        error_code: &str,
        error_message: &str,
        info: Option<HashMap<String, String>>,
    ) {
        if source_name.is_empty()
            || source_version.is_empty()
            || error_code.is_empty()
            || error_message.is_empty()
        {
            log::warn!(target: "event_logger", source_name, error_code; "dropping event with missing required fields");
            return;
        }

        let input = EventInput {
            event_type,
            source_name: source_name.to_owned(),
            source_version: source_version.to_owned(),
            error_code: error_code.to_owned(),
            error_message: error_message.to_owned(),
            info,
        };
        self.queue
            .handle()
            .execute_or_log(move |state, queue| match state {
                LoggerState::Unconfigured => {
                    log::warn!(target: "event_logger", source_name = input.source_name.as_str(); "not configured, dropping event");
                }
                LoggerState::Configured(pipeline) => pipeline.log_event(queue, input),
            });
    }

    /// Returns `true` once a configuration has taken effect.
    ///
    /// Waits for previously submitted work, including pending configurations.
    pub fn is_configured(&self) -> bool {
        let (sender, receiver) = mpsc::sync_channel(1);
        let enqueued = self.queue.handle().execute(move |state, _| {
            let _ = sender.send(matches!(state, LoggerState::Configured(_)));
        });
        enqueued.is_ok() && receiver.recv().unwrap_or(false)
    }

    /// Blocks until all work submitted so far has run.
    ///
    /// Deliveries still in flight complete later.
    pub fn wait_until_idle(&self) {
        self.queue.handle().wait_until_idle();
    }

    /// Stops the background thread after the work submitted so far and waits for it to exit.
    ///
    /// Results of deliveries still in flight are discarded; their events stay stored.
    pub fn shutdown(self) -> Result<()> {
        self.queue.shutdown()
    }
}

struct EventInput {
    event_type: EventType,
    source_name: String,
    source_version: String,
    error_code: String,
    error_message: String,
    info: Option<HashMap<String, String>>,
}

/// State of a configured logger. Lives on the delivery queue thread.
struct Pipeline {
    transport: Arc<dyn EventTransport>,
    event_store: EventStore,
    delivery_cache: DeliveryCache,
    factory: EventFactory,
}

impl Pipeline {
    fn new(components: Components) -> Pipeline {
        Pipeline {
            transport: components.transport,
            event_store: components.event_store,
            delivery_cache: components.delivery_cache,
            factory: EventFactory::new(&components.metadata),
        }
    }

    fn log_event(&mut self, queue: &Queue, input: EventInput) {
        let candidate = self.factory.build_event(
            input.event_type,
            &input.source_name,
            &input.source_version,
            &input.error_code,
            &input.error_message,
            input.info,
        );
        let id = candidate.fingerprint();

        let (mut event, is_new) = match self.event_store.get_by_id(&id) {
            Some(stored) => (stored, false),
            None => (candidate, true),
        };
        event.increment_count();
        if is_new {
            event.mark_first_occurrence(now_millis());
            self.event_store.insert(&id, &event);
        } else {
            self.event_store.update(&id, &event);
        }
        log::debug!(target: "event_logger", id = id.as_str(), count = event.occurrence_count, is_new; "stored event");

        let is_full = self
            .event_store
            .count()
            .map_or(true, |count| count >= MAX_EVENTS_COUNT);
        if is_full {
            self.flush_all(queue, is_new);
        } else if is_new && event.event_type == EventType::Critical {
            self.push_critical(queue, id, event);
        }
    }

    /// Sends a new critical event on its own. Once delivered, it is kept as a warning so that
    /// further occurrences go out with the next batch.
    fn push_critical(&mut self, queue: &Queue, id: String, event: EventRecord) {
        let on_complete = on_queue(queue, move |pipeline, result| {
            if result.is_err() {
                return;
            }
            if let Some(mut stored) = pipeline.event_store.get_by_id(&id) {
                stored.event_type = EventType::Warning;
                pipeline.event_store.update(&id, &stored);
                log::debug!(target: "event_logger", id = id.as_str(); "downgraded delivered critical event");
            }
        });
        self.transport.push(vec![event], on_complete);
    }

    /// Sends all stored events and deletes them once delivered.
    ///
    /// If the delivery fails and `evict_on_failure` is set, the oldest events beyond
    /// [`MAX_EVENTS_COUNT`] are deleted.
    fn flush_all(&mut self, queue: &Queue, evict_on_failure: bool) {
        let (ids, events): (Vec<String>, Vec<EventRecord>) =
            self.event_store.get_all().into_iter().unzip();
        if events.is_empty() {
            return;
        }
        log::debug!(target: "event_logger", count = events.len(); "flushing stored events");

        let on_complete = on_queue(queue, move |pipeline, result| match result {
            Ok(()) => {
                pipeline.delivery_cache.set_ttl_reference_time(now_millis());
                pipeline.event_store.delete(&ids);
            }
            Err(_) if evict_on_failure => {
                pipeline.event_store.delete_oldest(MAX_EVENTS_COUNT);
            }
            Err(_) => {}
        });
        self.transport.push(events, on_complete);
    }

    fn flush_if_expired(&mut self, queue: &Queue) {
        if self.is_ttl_expired(now_millis()) {
            self.flush_all(queue, false);
        }
    }

    /// On first use, starts the TTL period at `now` instead of reporting expiry.
    fn is_ttl_expired(&mut self, now: i64) -> bool {
        match self.delivery_cache.ttl_reference_time() {
            Some(reference) => now.saturating_sub(reference) >= TTL.as_millis() as i64,
            None => {
                self.delivery_cache.set_ttl_reference_time(now);
                false
            }
        }
    }
}

/// Wraps `on_result` into a push callback that runs it back on the delivery queue.
fn on_queue(
    queue: &Queue,
    on_result: impl FnOnce(&mut Pipeline, Result<()>) + Send + 'static,
) -> PushCallback {
    let queue = queue.clone();
    Box::new(move |result| {
        queue.execute_or_log(move |state, _| {
            if let LoggerState::Configured(pipeline) = state {
                on_result(pipeline, result);
            }
        });
    })
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::{now_millis, Components, EventLogger, MAX_EVENTS_COUNT, TTL};
    use crate::{
        delivery_cache::DeliveryCache,
        error::StorageError,
        event::{EventRecord, EventType},
        event_factory::AppMetadata,
        event_store::EventStore,
        lifecycle::AppLifecycleObserver,
        retry::RetryPolicy,
        storage::{KeyValueStore, MemoryKeyValueStore},
        test_utils::random_event,
        transport::{EventTransport, PushCallback},
        Error, EventLoggerConfig, Result,
    };

    /// Keeps pushed batches and their callbacks so tests decide how deliveries end.
    #[derive(Default)]
    struct RecordingTransport {
        pushes: Mutex<Vec<(Vec<EventRecord>, PushCallback)>>,
    }

    impl RecordingTransport {
        fn take(&self) -> Vec<(Vec<EventRecord>, PushCallback)> {
            std::mem::take(&mut *self.pushes.lock().unwrap())
        }

        fn take_one(&self) -> (Vec<EventRecord>, PushCallback) {
            let mut pushes = self.take();
            assert_eq!(pushes.len(), 1, "expected exactly one push");
            pushes.remove(0)
        }
    }

    impl EventTransport for RecordingTransport {
        fn push(&self, events: Vec<EventRecord>, on_complete: PushCallback) {
            if events.is_empty() {
                return;
            }
            self.pushes.lock().unwrap().push((events, on_complete));
        }
    }

    /// Memory storage the test can inspect while the logger owns it.
    #[derive(Clone, Default)]
    struct SharedStorage {
        entries: Arc<Mutex<MemoryKeyValueStore>>,
        /// Number of upcoming `keys()` calls that fail.
        failing_listings: Arc<AtomicUsize>,
    }

    impl SharedStorage {
        fn fail_listings(&self, count: usize) {
            self.failing_listings.store(count, Ordering::SeqCst);
        }
    }

    impl KeyValueStore for SharedStorage {
        fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.entries.lock().unwrap().get(key)
        }
        fn keys(&self) -> std::result::Result<Vec<String>, StorageError> {
            let failing = self
                .failing_listings
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(std::io::Error::other("listing failed").into());
            }
            self.entries.lock().unwrap().keys()
        }
        fn put(&mut self, key: &str, value: String) -> std::result::Result<(), StorageError> {
            self.entries.lock().unwrap().put(key, value)
        }
        fn remove(&mut self, keys: &[String]) -> std::result::Result<(), StorageError> {
            self.entries.lock().unwrap().remove(keys)
        }
    }

    struct Harness {
        logger: EventLogger,
        transport: Arc<RecordingTransport>,
        events: SharedStorage,
        cache: SharedStorage,
        observer: Arc<AppLifecycleObserver>,
    }

    impl Harness {
        fn new() -> Harness {
            Harness {
                logger: EventLogger::new().unwrap(),
                transport: Arc::new(RecordingTransport::default()),
                events: SharedStorage::default(),
                cache: SharedStorage::default(),
                observer: Arc::new(AppLifecycleObserver::new()),
            }
        }

        fn configured() -> Harness {
            let harness = Harness::new();
            harness.configure();
            harness
        }

        fn configure(&self) {
            self.logger.configure_with(Components {
                transport: self.transport.clone(),
                event_store: EventStore::new(self.events.clone()),
                delivery_cache: DeliveryCache::new(self.cache.clone()),
                metadata: metadata(),
                foreground_signal: Some(self.observer.clone()),
            });
            self.logger.wait_until_idle();
        }

        fn event_store(&self) -> EventStore {
            EventStore::new(self.events.clone())
        }

        fn delivery_cache(&self) -> DeliveryCache {
            DeliveryCache::new(self.cache.clone())
        }

        fn stored_events(&self) -> Vec<EventRecord> {
            self.event_store()
                .get_all()
                .into_iter()
                .map(|(_, event)| event)
                .collect()
        }

        /// Stores `count` old warnings keyed by fingerprint.
        fn prefill(&self, count: usize) -> Vec<EventRecord> {
            let mut store = self.event_store();
            (0..count)
                .map(|_| {
                    let event = random_event();
                    store.insert(&event.fingerprint(), &event);
                    event
                })
                .collect()
        }

        fn warning(&self, event: &EventRecord) {
            self.logger.send_warning_event(
                &event.source_name,
                &event.source_version,
                &event.error_code,
                &event.error_message,
                None,
            );
            self.logger.wait_until_idle();
        }

        fn critical(&self, message: &str) {
            self.logger
                .send_critical_event("inappmessaging", "7.0.0", "500", message, None);
            self.logger.wait_until_idle();
        }

        fn complete(&self, on_complete: PushCallback, result: Result<()>) {
            on_complete(result);
            self.logger.wait_until_idle();
        }
    }

    fn metadata() -> AppMetadata {
        AppMetadata {
            app_id: "com.example.app".to_owned(),
            app_name: "Example".to_owned(),
            // Matches random_event(), so prefilled events can be logged again.
            app_version: "1.0.0".to_owned(),
            ..AppMetadata::default()
        }
    }

    fn ttl_millis() -> i64 {
        TTL.as_millis() as i64
    }

    fn push_failure() -> Result<()> {
        Err(Error::UnexpectedStatus(reqwest::StatusCode::SERVICE_UNAVAILABLE))
    }

    #[test]
    fn duplicate_events_are_stored_once_with_count() {
        let harness = Harness::configured();
        let event = random_event();

        harness.warning(&event);
        harness.warning(&event);

        let stored = harness.stored_events();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].occurrence_count, 2);
        assert_eq!(stored[0].error_message, event.error_message);
    }

    #[test]
    fn new_event_gets_metadata_and_first_occurrence() {
        let harness = Harness::configured();
        let before = now_millis();

        harness.warning(&random_event());

        let stored = harness.stored_events();
        assert_eq!(stored[0].app_id, "com.example.app");
        assert_eq!(stored[0].event_type, EventType::Warning);
        assert!(stored[0].first_occurrence_millis.unwrap() >= before);
    }

    #[test]
    fn new_warning_is_not_pushed() {
        let harness = Harness::configured();

        harness.warning(&random_event());

        assert!(harness.transport.take().is_empty());
    }

    #[test]
    fn new_critical_is_pushed_and_downgraded_on_success() {
        let harness = Harness::configured();

        harness.critical("crash");
        let (events, on_complete) = harness.transport.take_one();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Critical);
        assert_eq!(events[0].occurrence_count, 1);

        // Occurs again while the delivery is in flight.
        harness.critical("crash");
        assert!(harness.transport.take().is_empty());

        harness.complete(on_complete, Ok(()));

        let stored = harness.stored_events();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, EventType::Warning);
        assert_eq!(stored[0].occurrence_count, 2);
    }

    #[test]
    fn downgraded_critical_keeps_counting_without_push() {
        let harness = Harness::configured();
        harness.critical("crash");
        let (_, on_complete) = harness.transport.take_one();
        harness.complete(on_complete, Ok(()));

        harness.critical("crash");

        assert!(harness.transport.take().is_empty());
        let stored = harness.stored_events();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, EventType::Warning);
        assert_eq!(stored[0].occurrence_count, 2);
    }

    #[test]
    fn failed_critical_push_keeps_event_critical() {
        let harness = Harness::configured();

        harness.critical("crash");
        let (_, on_complete) = harness.transport.take_one();
        harness.complete(on_complete, push_failure());

        let stored = harness.stored_events();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, EventType::Critical);
    }

    #[test]
    fn reaching_capacity_flushes_all_events() {
        let harness = Harness::configured();
        harness.prefill(MAX_EVENTS_COUNT - 1);
        let before = now_millis();

        harness.warning(&random_event());

        let (events, on_complete) = harness.transport.take_one();
        assert_eq!(events.len(), MAX_EVENTS_COUNT);

        harness.complete(on_complete, Ok(()));

        assert!(harness.stored_events().is_empty());
        assert!(harness.delivery_cache().ttl_reference_time().unwrap() >= before);
    }

    #[test]
    fn below_capacity_does_not_flush() {
        let harness = Harness::configured();
        harness.prefill(MAX_EVENTS_COUNT - 2);

        harness.warning(&random_event());

        assert!(harness.transport.take().is_empty());
        assert_eq!(harness.event_store().count(), Some(MAX_EVENTS_COUNT - 1));
    }

    #[test]
    fn capacity_flush_takes_precedence_over_critical_push() {
        let harness = Harness::configured();
        harness.prefill(MAX_EVENTS_COUNT);

        harness.critical("crash");

        let (events, _) = harness.transport.take_one();
        assert_eq!(events.len(), MAX_EVENTS_COUNT + 1);
    }

    #[test]
    fn failed_capacity_flush_evicts_oldest_when_event_is_new() {
        let harness = Harness::configured();
        harness.prefill(MAX_EVENTS_COUNT);
        let newest = random_event();

        harness.warning(&newest);
        let (_, on_complete) = harness.transport.take_one();
        harness.complete(on_complete, push_failure());

        let stored = harness.stored_events();
        assert_eq!(stored.len(), MAX_EVENTS_COUNT);
        assert!(stored
            .iter()
            .any(|event| event.error_message == newest.error_message));
    }

    #[test]
    fn failed_capacity_flush_keeps_events_when_event_is_duplicate() {
        let harness = Harness::configured();
        let prefilled = harness.prefill(MAX_EVENTS_COUNT + 1);

        harness.warning(&prefilled[0]);
        let (_, on_complete) = harness.transport.take_one();
        harness.complete(on_complete, push_failure());

        assert_eq!(harness.event_store().count(), Some(MAX_EVENTS_COUNT + 1));
        let updated = harness
            .event_store()
            .get_by_id(&prefilled[0].fingerprint())
            .unwrap();
        assert_eq!(updated.occurrence_count, 2);
    }

    #[test]
    fn successful_flush_keeps_events_stored_meanwhile() {
        let harness = Harness::configured();
        harness.prefill(MAX_EVENTS_COUNT);
        harness.warning(&random_event());
        let (_, on_complete) = harness.transport.take_one();

        let late = random_event();
        harness.warning(&late);
        // Counted as another capacity flush, which the test leaves pending.
        harness.transport.take();
        harness.complete(on_complete, Ok(()));

        let stored = harness.stored_events();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].error_message, late.error_message);
    }

    #[test]
    fn first_configuration_seeds_reference_time_without_flush() {
        let harness = Harness::new();
        harness.prefill(3);
        let before = now_millis();

        harness.configure();

        assert!(harness.transport.take().is_empty());
        assert!(harness.delivery_cache().ttl_reference_time().unwrap() >= before);
        assert_eq!(harness.event_store().count(), Some(3));
    }

    #[test]
    fn configuration_flushes_expired_events() {
        let harness = Harness::new();
        harness.prefill(2);
        harness
            .delivery_cache()
            .set_ttl_reference_time(now_millis() - ttl_millis() - 1_000);

        harness.configure();

        let (events, on_complete) = harness.transport.take_one();
        assert_eq!(events.len(), 2);
        harness.complete(on_complete, Ok(()));
        assert!(harness.stored_events().is_empty());
    }

    #[test]
    fn configuration_keeps_fresh_events() {
        let harness = Harness::new();
        harness.prefill(2);
        harness
            .delivery_cache()
            .set_ttl_reference_time(now_millis() - ttl_millis() / 2);

        harness.configure();

        assert!(harness.transport.take().is_empty());
        assert_eq!(harness.event_store().count(), Some(2));
    }

    #[test]
    fn expired_events_with_empty_store_push_nothing() {
        let harness = Harness::new();
        harness.delivery_cache().set_ttl_reference_time(0);

        harness.configure();

        assert!(harness.transport.take().is_empty());
    }

    #[test]
    fn failed_expiry_flush_keeps_events() {
        let harness = Harness::new();
        harness.prefill(2);
        harness.delivery_cache().set_ttl_reference_time(0);

        harness.configure();
        let (_, on_complete) = harness.transport.take_one();
        harness.complete(on_complete, push_failure());

        assert_eq!(harness.event_store().count(), Some(2));
        assert_eq!(harness.delivery_cache().ttl_reference_time(), Some(0));
    }

    #[test]
    fn foreground_transition_flushes_expired_events() {
        let harness = Harness::configured();
        harness.prefill(2);

        // Fresh reference time, nothing happens.
        harness.observer.on_activity_stopped(false);
        harness.observer.on_activity_resumed();
        harness.logger.wait_until_idle();
        assert!(harness.transport.take().is_empty());

        harness
            .delivery_cache()
            .set_ttl_reference_time(now_millis() - ttl_millis());
        harness.observer.on_activity_stopped(false);
        harness.observer.on_activity_resumed();
        harness.logger.wait_until_idle();

        let (events, _) = harness.transport.take_one();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn configuration_change_does_not_flush() {
        let harness = Harness::configured();
        harness.prefill(2);
        harness.delivery_cache().set_ttl_reference_time(0);

        harness.observer.on_activity_stopped(true);
        harness.observer.on_activity_resumed();
        harness.logger.wait_until_idle();

        assert!(harness.transport.take().is_empty());
    }

    #[test]
    fn events_before_configuration_are_dropped() {
        let harness = Harness::new();

        harness.warning(&random_event());
        harness.configure();

        assert!(harness.stored_events().is_empty());
    }

    #[test]
    fn events_with_missing_fields_are_dropped() {
        let harness = Harness::configured();

        harness
            .logger
            .send_warning_event("", "1.0.0", "500", "server error", None);
        harness
            .logger
            .send_critical_event("inappmessaging", "1.0.0", "500", "", None);
        harness.logger.wait_until_idle();

        assert!(harness.stored_events().is_empty());
        assert!(harness.transport.take().is_empty());
    }

    #[test]
    fn only_first_configuration_takes_effect() {
        let harness = Harness::configured();
        let second_transport = Arc::new(RecordingTransport::default());
        let second_events = SharedStorage::default();

        harness.logger.configure_with(Components {
            transport: second_transport.clone(),
            event_store: EventStore::new(second_events.clone()),
            delivery_cache: DeliveryCache::new(MemoryKeyValueStore::new()),
            metadata: AppMetadata::default(),
            foreground_signal: None,
        });
        harness.critical("crash");

        assert!(second_transport.take().is_empty());
        assert_eq!(EventStore::new(second_events).count(), Some(0));
        assert_eq!(harness.transport.take().len(), 1);
    }

    #[test]
    fn reports_configuration_state() {
        let logger = EventLogger::new().unwrap();
        assert!(!logger.is_configured());

        logger.configure(
            EventLoggerConfig::new(AppMetadata::default())
                .api_url("not a url")
                .api_key("key"),
        );
        assert!(!logger.is_configured());

        logger.configure_with(Components {
            transport: Arc::new(RecordingTransport::default()),
            event_store: EventStore::new(MemoryKeyValueStore::new()),
            delivery_cache: DeliveryCache::new(MemoryKeyValueStore::new()),
            metadata: AppMetadata::default(),
            foreground_signal: None,
        });
        assert!(logger.is_configured());
    }

    #[test]
    fn undecodable_entries_do_not_occupy_capacity() {
        let harness = Harness::configured();
        let mut raw = harness.events.clone();
        for i in 0..MAX_EVENTS_COUNT {
            raw.put(&format!("broken-{i}"), "{not an event".to_owned())
                .unwrap();
        }

        harness.warning(&random_event());
        assert!(harness.transport.take().is_empty());

        harness.critical("crash");
        let (events, _) = harness.transport.take_one();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Critical);
    }

    #[test]
    fn flush_removes_undecodable_entries() {
        let harness = Harness::configured();
        let mut raw = harness.events.clone();
        raw.put("broken", "{not an event".to_owned()).unwrap();
        harness.prefill(MAX_EVENTS_COUNT - 1);

        harness.warning(&random_event());
        let (events, on_complete) = harness.transport.take_one();
        assert_eq!(events.len(), MAX_EVENTS_COUNT);
        harness.complete(on_complete, Ok(()));

        assert!(harness.events.keys().unwrap().is_empty());
    }

    #[test]
    fn unknown_count_flushes_instead_of_pushing_critical() {
        let harness = Harness::configured();
        harness.prefill(2);

        // Only the capacity check fails; the flush can list events again.
        harness.events.fail_listings(1);
        harness.critical("crash");

        let (events, on_complete) = harness.transport.take_one();
        assert_eq!(events.len(), 3);
        harness.complete(on_complete, Ok(()));
        assert!(harness.stored_events().is_empty());
    }

    #[test]
    fn unlistable_storage_pushes_nothing() {
        let harness = Harness::configured();
        harness.events.fail_listings(usize::MAX);

        harness.critical("crash");
        harness.warning(&random_event());

        assert!(harness.transport.take().is_empty());
        harness.events.fail_listings(0);
        assert_eq!(harness.event_store().count(), Some(2));
    }

    #[test]
    fn completions_after_shutdown_are_dropped() {
        let harness = Harness::configured();
        harness.critical("crash");
        let (_, on_complete) = harness.transport.take_one();

        harness.logger.shutdown().unwrap();
        on_complete(Ok(()));

        // The downgrade never ran.
        let stored = EventStore::new(harness.events.clone()).get_all();
        assert_eq!(stored[0].1.event_type, EventType::Critical);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delivers_critical_event_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/external/logging/error"))
            .and(header("x-client-apikey", "test-key"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let logger = EventLogger::new().unwrap();
        logger.configure(
            EventLoggerConfig::new(metadata())
                .api_url(server.uri())
                .api_key("test-key")
                .retry_policy(RetryPolicy::NONE),
        );
        logger.send_critical_event("inappmessaging", "7.0.0", "500", "server error", None);

        let mut requests = Vec::new();
        for _ in 0..100 {
            requests = server.received_requests().await.unwrap();
            if !requests.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(requests.len(), 1);
        let body: Vec<EventRecord> = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body[0].source_name, "inappmessaging");
        assert_eq!(body[0].event_type, EventType::Critical);
        assert_eq!(body[0].app_id, "com.example.app");
    }
}
