use hdrhistogram::Histogram;
use std::time::{Duration, Instant};

/// Statistics for latency measurements, in nanoseconds.
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub p999: u64,
}

pub struct LatencyMeasurerGuard<'a> {
    measurer: &'a mut LatencyMeasurer,
    start: Instant,
}

impl Drop for LatencyMeasurerGuard<'_> {
    fn drop(&mut self) {
        self.measurer.measure(self.start.elapsed());
    }
}

/// Records how long rotations take, using HdrHistogram.
///
/// Every call is recorded; there is no sampling.
pub struct LatencyMeasurer {
    histogram: Histogram<u64>,
}

impl LatencyMeasurer {
    // 1ns to 1,000s at 3 significant figures.
    const LOWEST: u64 = 1;
    const HIGHEST: u64 = 1_000_000_000_000;

    pub fn new() -> Self {
        let histogram = Histogram::<u64>::new_with_bounds(Self::LOWEST, Self::HIGHEST, 3)
            .expect("histogram bounds are constant and valid");
        Self { histogram }
    }

    pub fn measure(&mut self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.histogram.saturating_record(nanos.max(Self::LOWEST));
    }

    pub fn measure_with_guard(&mut self) -> LatencyMeasurerGuard<'_> {
        LatencyMeasurerGuard {
            measurer: self,
            start: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        self.histogram.reset();
    }

    pub fn get_stats(&self) -> LatencyStats {
        let count = self.histogram.len();
        if count == 0 {
            return LatencyStats::default();
        }

        LatencyStats {
            count,
            min: self.histogram.min(),
            max: self.histogram.max(),
            mean: self.histogram.mean(),
            p50: self.histogram.value_at_quantile(0.5),
            p90: self.histogram.value_at_quantile(0.9),
            p99: self.histogram.value_at_quantile(0.99),
            p999: self.histogram.value_at_quantile(0.999),
        }
    }

    pub fn format_stats(&self) -> String {
        let stats = self.get_stats();
        if stats.count == 0 {
            return "No stats collected yet".into();
        }

        format!(
            "\tcount={},\tmin={},\tmax={},\tmean={},\tp50={},\tp90={},\tp99={},\tp999={}",
            stats.count,
            Self::format_duration(stats.min as f64),
            Self::format_duration(stats.max as f64),
            Self::format_duration(stats.mean),
            Self::format_duration(stats.p50 as f64),
            Self::format_duration(stats.p90 as f64),
            Self::format_duration(stats.p99 as f64),
            Self::format_duration(stats.p999 as f64),
        )
    }

    fn format_duration(nanos: f64) -> String {
        if nanos < 1000.0 {
            format!("{:.1}ns", nanos)
        } else if nanos < 1_000_000.0 {
            format!("{:.1}us", nanos / 1000.0)
        } else if nanos < 1_000_000_000.0 {
            format!("{:.1}ms", nanos / 1_000_000.0)
        } else {
            format!("{:.2}s", nanos / 1_000_000_000.0)
        }
    }
}

impl Default for LatencyMeasurer {
    fn default() -> Self {
        Self::new()
    }
}
