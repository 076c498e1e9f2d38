use std::collections::HashMap;

use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::event::{EventRecord, EventType, EVENT_VERSION, PLATFORM};

/// A fully populated critical event with fixed values.
pub(crate) fn test_event() -> EventRecord {
    EventRecord {
        event_version: EVENT_VERSION.to_owned(),
        event_type: EventType::Critical,
        app_id: "com.example.app".to_owned(),
        app_name: "Example".to_owned(),
        app_version: "1.0.0".to_owned(),
        platform: PLATFORM.to_owned(),
        os_version: "14".to_owned(),
        device_model: "Pixel 8".to_owned(),
        device_brand: "Google".to_owned(),
        device_name: "shiba".to_owned(),
        source_name: "inappmessaging".to_owned(),
        source_version: "1.0.0".to_owned(),
        error_code: "500".to_owned(),
        error_message: "server error".to_owned(),
        rmc_sdks: Some(HashMap::from([(
            "rmc_push".to_owned(),
            "1.0.0".to_owned(),
        )])),
        info: Some(HashMap::from([(
            "file_name".to_owned(),
            "MyFile.kt".to_owned(),
        )])),
        occurrence_count: 2,
        first_occurrence_millis: Some(1_700_000_000_000),
    }
}

/// A warning with random source, code and message.
pub(crate) fn random_event() -> EventRecord {
    let mut rng = thread_rng();
    EventRecord {
        event_type: EventType::Warning,
        source_name: random_string(&mut rng, 8),
        error_code: rng.gen_range(100..600).to_string(),
        error_message: random_string(&mut rng, 32),
        occurrence_count: 1,
        first_occurrence_millis: Some(rng.gen_range(1_600_000_000_000..1_700_000_000_000)),
        info: None,
        ..test_event()
    }
}

fn random_string(rng: &mut impl Rng, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
