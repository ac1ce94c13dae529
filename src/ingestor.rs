use crate::components::ReadingSink;
use crate::counters::IngestCounters;
use crate::gateway::{AllowList, Rssi};
use crate::window::Window;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// State shared between ingestors and the scheduler.
///
/// `active` is the only mutable shared state. The lock is held for a single
/// append or for the swap, never while a retired window is summarized.
pub(crate) struct Shared {
    pub(crate) allow_list: AllowList,
    pub(crate) counters: IngestCounters,
    active: Mutex<Window>,
}

impl Shared {
    pub(crate) fn new(allow_list: AllowList) -> Self {
        Self {
            allow_list,
            counters: IngestCounters::default(),
            active: Mutex::new(Window::new(0, Instant::now())),
        }
    }

    fn active(&self) -> MutexGuard<'_, Window> {
        // Poisoning is ignored: an append either landed or it did not.
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retires the active window and installs an empty one in a single
    /// critical section.
    pub(crate) fn swap(&self) -> Window {
        let now = Instant::now();
        let retired = {
            let mut active = self.active();
            let next = Window::new(active.sequence() + 1, now);
            std::mem::replace(&mut *active, next)
        };
        self.counters.rotated();
        retired.retire(now)
    }
}

/// Thread-safe entry point for incoming readings.
///
/// Clone it freely; every clone appends to the same active window.
#[derive(Clone)]
pub struct EventIngestor {
    shared: Arc<Shared>,
}

impl EventIngestor {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Appends `reading` to the active window's bucket for `gateway_id`.
    ///
    /// Unknown gateways are ignored. An absent reading is kept so the
    /// gateway still shows up, but it does not count towards the average.
    #[inline]
    pub fn record(&self, gateway_id: &str, reading: Option<Rssi>) {
        let Some(gateway) = self.shared.allow_list.get(gateway_id) else {
            self.shared.counters.discarded();
            return;
        };
        let gateway = gateway.clone();

        self.shared.active().append(gateway, reading);
        self.shared.counters.accepted(reading.is_some());
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.shared.allow_list
    }
}

impl ReadingSink for EventIngestor {
    fn record(&self, gateway_id: &str, reading: Option<Rssi>) {
        EventIngestor::record(self, gateway_id, reading);
    }
}
