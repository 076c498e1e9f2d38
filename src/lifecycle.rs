//! Foreground notifications from the host application.
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex},
};

/// Callback invoked every time the application returns to the foreground.
pub type ForegroundListener = Box<dyn Fn() + Send + Sync>;

/// Source of "application entered foreground" notifications.
pub trait ForegroundSignal: Send + Sync {
    /// Registers `listener` to be called on every background to foreground transition.
    fn register_listener(&self, listener: ForegroundListener);
}

/// [`ForegroundSignal`] driven by the host's activity callbacks.
///
/// A transition is reported when an activity resumes after an activity was stopped, unless that
/// stop was caused by a configuration change (e.g., rotation). Cold start is not a transition.
///
/// ```
/// # use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
/// # use event_logger::{AppLifecycleObserver, ForegroundSignal};
/// let observer = AppLifecycleObserver::new();
/// let transitions = Arc::new(AtomicUsize::new(0));
/// let counter = transitions.clone();
/// observer.register_listener(Box::new(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// observer.on_activity_stopped(false);
/// observer.on_activity_resumed();
/// assert_eq!(transitions.load(Ordering::SeqCst), 1);
/// ```
#[derive(Default)]
pub struct AppLifecycleObserver {
    state: Mutex<ObserverState>,
}

#[derive(Default)]
struct ObserverState {
    in_background: bool,
    listeners: Vec<Arc<dyn Fn() + Send + Sync>>,
}

impl AppLifecycleObserver {
    /// Create an observer in the "foreground, no listeners" state.
    pub fn new() -> AppLifecycleObserver {
        AppLifecycleObserver::default()
    }

    /// Call when an activity of the host application is resumed.
    pub fn on_activity_resumed(&self) {
        let listeners = {
            let Ok(mut state) = self.state.lock() else {
                log::warn!(target: "event_logger", "lifecycle observer state is poisoned");
                return;
            };
            if !state.in_background {
                return;
            }
            state.in_background = false;
            state.listeners.clone()
        };

        // Outside of the lock, so listeners may register others.
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                log::warn!(target: "event_logger", "foreground listener panicked");
            }
        }
    }

    /// Call when an activity of the host application is stopped.
    pub fn on_activity_stopped(&self, is_changing_configurations: bool) {
        if is_changing_configurations {
            return;
        }
        match self.state.lock() {
            Ok(mut state) => state.in_background = true,
            Err(_) => {
                log::warn!(target: "event_logger", "lifecycle observer state is poisoned");
            }
        }
    }
}

impl ForegroundSignal for AppLifecycleObserver {
    fn register_listener(&self, listener: ForegroundListener) {
        match self.state.lock() {
            Ok(mut state) => state.listeners.push(Arc::from(listener)),
            Err(_) => {
                log::warn!(target: "event_logger", "lifecycle observer state is poisoned");
            }
        }
    }
}
