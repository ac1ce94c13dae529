use crate::gateway::{GatewayId, Rssi};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Aggregate for one gateway over one window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GatewayStats {
    /// Mean of the numeric readings, `None` when there were none.
    pub average: Option<f64>,
    /// Events recorded for the gateway, including absent readings.
    pub received: usize,
    /// Events that carried a numeric reading.
    pub usable: usize,
}

impl GatewayStats {
    pub fn no_data() -> Self {
        Self::default()
    }

    pub fn from_readings(readings: &[Option<Rssi>]) -> Self {
        let mut sum: i64 = 0;
        let mut usable = 0usize;
        for rssi in readings.iter().flatten() {
            sum += i64::from(*rssi);
            usable += 1;
        }

        Self {
            average: (usable > 0).then(|| sum as f64 / usable as f64),
            received: readings.len(),
            usable,
        }
    }

    pub fn has_data(&self) -> bool {
        self.average.is_some()
    }
}

/// The record emitted once per rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Position of the window since the scheduler was created, starting at 0.
    pub sequence: u64,
    pub opened_at: Instant,
    pub closed_at: Instant,
    pub gateways: BTreeMap<GatewayId, GatewayStats>,
}

impl Summary {
    pub fn get(&self, gateway_id: &str) -> Option<&GatewayStats> {
        self.gateways.get(gateway_id)
    }

    /// Average for `gateway_id`; `None` both for "no data" and for absent gateways.
    pub fn average(&self, gateway_id: &str) -> Option<f64> {
        self.get(gateway_id).and_then(|stats| stats.average)
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }

    pub fn span(&self) -> Duration {
        self.closed_at.saturating_duration_since(self.opened_at)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GatewayId, &GatewayStats)> {
        self.gateways.iter()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Averaged RSSI values for window #{} ({:.1}s):",
            self.sequence,
            self.span().as_secs_f64()
        )?;
        for (gateway, stats) in &self.gateways {
            match stats.average {
                Some(avg) => write!(f, "\nGATEWAY: {}, Averaged RSSI: {}", gateway, avg)?,
                None => write!(f, "\nGATEWAY: {}, No RSSI values received", gateway)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_average() {
        let stats = GatewayStats::from_readings(&[Some(10), Some(20)]);
        assert_eq!(stats.average, Some(15.0));
        assert_eq!(stats.received, 2);
        assert_eq!(stats.usable, 2);
    }

    #[test]
    fn test_stats_excludes_missing() {
        let stats = GatewayStats::from_readings(&[None, Some(-70), None, Some(-60)]);
        assert_eq!(stats.average, Some(-65.0));
        assert_eq!(stats.received, 4);
        assert_eq!(stats.usable, 2);
    }

    #[test]
    fn test_stats_only_missing_is_no_data() {
        let stats = GatewayStats::from_readings(&[None, None]);
        assert!(!stats.has_data());
        assert_eq!(stats.received, 2);
        assert_eq!(stats.usable, 0);
    }

    #[test]
    fn test_stats_empty_is_no_data() {
        assert_eq!(GatewayStats::from_readings(&[]), GatewayStats::no_data());
    }

    #[test]
    fn test_stats_no_overflow() {
        let stats = GatewayStats::from_readings(&[Some(i32::MAX), Some(i32::MAX)]);
        assert_eq!(stats.average, Some(i32::MAX as f64));
    }

    #[test]
    fn test_display_matches_console_format() {
        let now = Instant::now();
        let mut gateways = BTreeMap::new();
        gateways.insert(GatewayId::new("G1"), GatewayStats::from_readings(&[Some(-60)]));
        gateways.insert(GatewayId::new("G2"), GatewayStats::no_data());
        let summary = Summary {
            sequence: 4,
            opened_at: now,
            closed_at: now,
            gateways,
        };

        let text = summary.to_string();
        assert!(text.starts_with("Averaged RSSI values for window #4"));
        assert!(text.contains("GATEWAY: G1, Averaged RSSI: -60"));
        assert!(text.contains("GATEWAY: G2, No RSSI values received"));
    }
}
