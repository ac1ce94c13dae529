use crate::error::WindowError;
use crate::gateway::AllowList;
use std::time::Duration;

/// Which gateways appear in an emitted summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmissionPolicy {
    /// Only gateways recorded during the window. An idle window emits an empty summary.
    #[default]
    TouchedOnly,
    /// Every allow-listed gateway; untouched ones report no data.
    AllowList,
}

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub interval: Duration,
    pub allow_list: AllowList,
    pub emission: EmissionPolicy,
    /// Rotate and emit one last time when the scheduler stops.
    pub flush_on_stop: bool,
    pub latency_stats: bool,
}

impl WindowConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new(allow_list: AllowList) -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            allow_list,
            emission: EmissionPolicy::default(),
            flush_on_stop: false,
            latency_stats: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_emission(mut self, emission: EmissionPolicy) -> Self {
        self.emission = emission;
        self
    }

    pub fn with_flush_on_stop(mut self, flush_on_stop: bool) -> Self {
        self.flush_on_stop = flush_on_stop;
        self
    }

    pub fn with_latency_stats(mut self, enable: bool) -> Self {
        self.latency_stats = enable;
        self
    }

    pub fn validate(&self) -> Result<(), WindowError> {
        if self.interval.is_zero() {
            return Err(WindowError::ZeroInterval);
        }
        if self.allow_list.is_empty() {
            return Err(WindowError::EmptyAllowList);
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new(AllowList::default_gateways())
    }
}
