use crate::config::EmissionPolicy;
use crate::gateway::{AllowList, GatewayId, Rssi};
use crate::summary::{GatewayStats, Summary};
use fxhash::FxHashMap;
use std::collections::BTreeMap;
use std::time::Instant;

/// Readings buffered between two rotations, bucketed by gateway.
///
/// A window is mutated only while it is active. Once retired it is consumed
/// by [`Window::summarize`] and dropped.
#[derive(Debug)]
pub struct Window {
    sequence: u64,
    opened_at: Instant,
    closed_at: Option<Instant>,
    buckets: FxHashMap<GatewayId, Vec<Option<Rssi>>>,
}

impl Window {
    pub fn new(sequence: u64, opened_at: Instant) -> Self {
        Self {
            sequence,
            opened_at,
            closed_at: None,
            buckets: FxHashMap::default(),
        }
    }

    #[inline(always)]
    pub fn append(&mut self, gateway: GatewayId, reading: Option<Rssi>) {
        self.buckets.entry(gateway).or_default().push(reading);
    }

    /// Stamps the window as closed at `at`.
    pub fn retire(mut self, at: Instant) -> Self {
        self.closed_at = Some(at);
        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn closed_at(&self) -> Option<Instant> {
        self.closed_at
    }

    pub fn readings(&self, gateway_id: &str) -> Option<&[Option<Rssi>]> {
        self.buckets.get(gateway_id).map(Vec::as_slice)
    }

    /// Number of gateways touched.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total events buffered across all gateways.
    pub fn event_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn summarize(self, allow_list: &AllowList, emission: EmissionPolicy) -> Summary {
        let closed_at = self.closed_at.unwrap_or_else(Instant::now);

        let mut gateways: BTreeMap<GatewayId, GatewayStats> = self
            .buckets
            .iter()
            .map(|(gateway, readings)| (gateway.clone(), GatewayStats::from_readings(readings)))
            .collect();

        if emission == EmissionPolicy::AllowList {
            for gateway in allow_list.iter() {
                gateways
                    .entry(gateway.clone())
                    .or_insert_with(GatewayStats::no_data);
            }
        }

        Summary {
            sequence: self.sequence,
            opened_at: self.opened_at,
            closed_at,
            gateways,
        }
    }
}
