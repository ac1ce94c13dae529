use crate::components::{ChannelSink, ReadingSink, SummarySink};
use crate::config::{EmissionPolicy, WindowConfig};
use crate::counters::IngestStats;
use crate::error::WindowError;
use crate::gateway::{AllowList, Rssi};
use crate::ingestor::{EventIngestor, Shared};
use crate::measure::{LatencyMeasurer, LatencyStats};
use crate::summary::Summary;
use crate::window::Window;
use spdlog::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SendError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

/// Latency of the two halves of a rotation.
#[derive(Debug, Clone, Default)]
pub struct RotationLatency {
    /// Time spent acquiring the lock and swapping windows.
    pub swap: LatencyStats,
    /// Time spent summarizing the retired window and handing it to the sink.
    pub publish: LatencyStats,
}

struct Timers {
    swap: Mutex<LatencyMeasurer>,
    publish: Mutex<LatencyMeasurer>,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A retired window on its way to the emitter thread.
struct Rotation {
    window: Window,
    /// Set for manual rotations waiting on their summary.
    reply: Option<Sender<Summary>>,
}

/// Everything a rotation needs, shared with the ticker and emitter threads.
struct Core {
    shared: Arc<Shared>,
    emission: EmissionPolicy,
    sink: Mutex<Box<dyn SummarySink>>,
    timers: Option<Timers>,
    /// Held across swap and enqueue so the emitter sees windows in sequence order.
    order: Mutex<()>,
}

impl Core {
    fn swap(&self) -> Window {
        let start = Instant::now();
        let retired = self.shared.swap();
        if let Some(timers) = &self.timers {
            lock(&timers.swap).measure(start.elapsed());
        }
        retired
    }

    /// Summarizes a retired window outside of any lock shared with ingestors
    /// and hands the result to the sink.
    ///
    /// A panicking sink is logged and the summary is still returned.
    fn publish(&self, retired: Window) -> Summary {
        let start = Instant::now();
        let events = retired.event_count();
        let summary = retired.summarize(&self.shared.allow_list, self.emission);

        let stats = self.shared.counters.snapshot();
        debug!(
            "[Window:{}] closed: events={}, gateways={}, accepted={}, discarded={}, missing={}",
            summary.sequence,
            events,
            summary.len(),
            stats.accepted,
            stats.discarded,
            stats.missing
        );

        let delivered = {
            let mut sink = lock(&self.sink);
            panic::catch_unwind(AssertUnwindSafe(|| sink.emit(summary.clone())))
        };
        match delivered {
            Ok(true) => {}
            Ok(false) => warn!(
                "[Window:{}] summary sink is closed, summary dropped",
                summary.sequence
            ),
            Err(_) => error!(
                "[Window:{}] summary sink panicked, summary dropped",
                summary.sequence
            ),
        }

        if let Some(timers) = &self.timers {
            lock(&timers.publish).measure(start.elapsed());
        }
        summary
    }
}

struct Workers {
    ticker: thread::JoinHandle<()>,
    emitter: thread::JoinHandle<()>,
    windows: Sender<Rotation>,
}

/// Owns the active window and rotates it on a fixed period.
///
/// Each rotation swaps the active window for an empty one under the window
/// lock, then summarizes the retired window and emits the [`Summary`] to the
/// configured [`SummarySink`].
///
/// Ticking is fixed-period: deadlines fall on `start + k * interval` and the
/// ticker hands retired windows to a separate emitter thread, so a slow sink
/// does not push later rotations back. Deadlines missed entirely (the process
/// was suspended, say) are skipped rather than replayed.
pub struct WindowScheduler {
    core: Arc<Core>,
    ingestor: EventIngestor,
    interval: Duration,
    flush_on_stop: bool,
    running: Arc<AtomicBool>,
    stopped: AtomicBool,
    /// Read by `rotate` for its whole duration, written by `stop`.
    lifecycle: RwLock<()>,
    workers: Mutex<Option<Workers>>,
}

impl WindowScheduler {
    pub fn new(config: WindowConfig, sink: impl SummarySink) -> Result<Self, WindowError> {
        config.validate()?;

        let shared = Arc::new(Shared::new(config.allow_list));
        let timers = config.latency_stats.then(|| Timers {
            swap: Mutex::new(LatencyMeasurer::new()),
            publish: Mutex::new(LatencyMeasurer::new()),
        });

        Ok(Self {
            core: Arc::new(Core {
                shared: shared.clone(),
                emission: config.emission,
                sink: Mutex::new(Box::new(sink)),
                timers,
                order: Mutex::new(()),
            }),
            ingestor: EventIngestor::new(shared),
            interval: config.interval,
            flush_on_stop: config.flush_on_stop,
            running: Arc::new(AtomicBool::new(false)),
            stopped: AtomicBool::new(false),
            lifecycle: RwLock::new(()),
            workers: Mutex::new(None),
        })
    }

    /// Creates a scheduler whose summaries are delivered through a channel.
    pub fn with_channel(config: WindowConfig) -> Result<(Self, Receiver<Summary>), WindowError> {
        let (tx, rx) = mpsc::channel();
        let scheduler = Self::new(config, ChannelSink(tx))?;
        Ok((scheduler, rx))
    }

    /// Same as [`EventIngestor::record`] on this scheduler's active window.
    pub fn record(&self, gateway_id: &str, reading: Option<Rssi>) {
        self.ingestor.record(gateway_id, reading);
    }

    /// Handle for the event-delivery side.
    pub fn ingestor(&self) -> EventIngestor {
        self.ingestor.clone()
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.core.shared.allow_list
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts ticking at the configured interval.
    pub fn start(&self) -> Result<(), WindowError> {
        self.start_every(self.interval)
    }

    /// Starts ticking every `interval`, overriding the configured period.
    pub fn start_every(&self, interval: Duration) -> Result<(), WindowError> {
        if interval.is_zero() {
            return Err(WindowError::ZeroInterval);
        }

        let mut workers = lock(&self.workers);
        if self.stopped.load(Ordering::SeqCst) {
            return Err(WindowError::Stopped);
        }
        if workers.is_some() {
            return Err(WindowError::AlreadyStarted);
        }

        self.running.store(true, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel::<Rotation>();

        let core = self.core.clone();
        let emitter = spawn("emitter", move || run_emitter(&core, rx));
        let emitter = match emitter {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let core = self.core.clone();
        let running = self.running.clone();
        let ticker_windows = tx.clone();
        let ticker = spawn("ticker", move || {
            run_ticker(&core, &running, interval, ticker_windows)
        });
        let ticker = match ticker {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                drop(tx);
                let _ = emitter.join();
                return Err(e);
            }
        };

        *workers = Some(Workers {
            ticker,
            emitter,
            windows: tx,
        });
        info!(
            "[Scheduler] started: interval={:?}, gateways={}",
            interval,
            self.core.shared.allow_list.len()
        );
        Ok(())
    }

    /// Rotates immediately.
    ///
    /// While ticking, the retired window is queued behind the ticker's windows
    /// so the sink always sees summaries in sequence order; the call returns
    /// once its own summary has been emitted. Returns `None` once the
    /// scheduler is stopped.
    pub fn rotate(&self) -> Option<Summary> {
        let _lifecycle = self
            .lifecycle
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }

        let windows = lock(&self.workers).as_ref().map(|w| w.windows.clone());
        let Some(windows) = windows else {
            let retired = {
                let _order = lock(&self.core.order);
                self.core.swap()
            };
            return Some(self.core.publish(retired));
        };

        let (reply, summary) = mpsc::channel();
        let queued = {
            let _order = lock(&self.core.order);
            windows.send(Rotation {
                window: self.core.swap(),
                reply: Some(reply),
            })
        };
        match queued {
            Ok(()) => summary.recv().ok(),
            Err(SendError(rotation)) => Some(self.core.publish(rotation.window)),
        }
    }

    /// Cancels future ticks. Idempotent.
    ///
    /// Waits for rotations already in flight, manual or ticked, to be emitted,
    /// then performs the final flush if one was configured. Nothing is emitted
    /// after this returns.
    pub fn stop(&self) {
        let _lifecycle = self
            .lifecycle
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.running.store(false, Ordering::SeqCst);

        let workers = lock(&self.workers).take();
        if let Some(Workers {
            ticker,
            emitter,
            windows,
        }) = workers
        {
            drop(windows);
            ticker.thread().unpark();
            if ticker.join().is_err() {
                error!("[Scheduler] ticker thread panicked");
            }
            if emitter.join().is_err() {
                error!("[Scheduler] emitter thread panicked");
            }
        }

        if self.flush_on_stop {
            let retired = self.core.swap();
            self.core.publish(retired);
        }

        if let Some(timers) = &self.core.timers {
            info!("[Latency/Swap]{}", lock(&timers.swap).format_stats());
            info!("[Latency/Publish]{}", lock(&timers.publish).format_stats());
        }
        info!(
            "[Scheduler] stopped after {} rotations",
            self.stats().rotations
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> IngestStats {
        self.core.shared.counters.snapshot()
    }

    /// Rotation latency, when enabled in the config.
    pub fn latency(&self) -> Option<RotationLatency> {
        self.core.timers.as_ref().map(|timers| RotationLatency {
            swap: lock(&timers.swap).get_stats(),
            publish: lock(&timers.publish).get_stats(),
        })
    }
}

impl ReadingSink for WindowScheduler {
    fn record(&self, gateway_id: &str, reading: Option<Rssi>) {
        WindowScheduler::record(self, gateway_id, reading);
    }
}

impl Drop for WindowScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn(
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> Result<thread::JoinHandle<()>, WindowError> {
    thread::Builder::new()
        .name(format!("beacon-window-{}", name))
        .spawn(f)
        .map_err(|source| WindowError::Spawn { name, source })
}

/// Deadline after the one that just fired, and how many whole intervals
/// were skipped because `now` is already past them.
fn next_deadline(fired: Instant, now: Instant, interval: Duration) -> (Instant, u64) {
    let mut deadline = fired + interval;
    let mut skipped = 0u64;
    while deadline <= now {
        deadline += interval;
        skipped += 1;
    }
    (deadline, skipped)
}

fn run_ticker(core: &Core, running: &AtomicBool, interval: Duration, windows: Sender<Rotation>) {
    let mut deadline = Instant::now() + interval;
    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < deadline {
            thread::park_timeout(deadline - now);
            continue;
        }

        let queued = {
            let _order = lock(&core.order);
            windows.send(Rotation {
                window: core.swap(),
                reply: None,
            })
        };
        if let Err(SendError(rotation)) = queued {
            error!("[Ticker] emitter is gone, no further rotations");
            core.publish(rotation.window);
            running.store(false, Ordering::Release);
            break;
        }

        let (next, skipped) = next_deadline(deadline, Instant::now(), interval);
        deadline = next;
        if skipped > 0 {
            warn!("[Ticker] overran by {} interval(s), skipping ahead", skipped);
        }
    }
}

fn run_emitter(core: &Core, windows: Receiver<Rotation>) {
    while let Ok(Rotation { window, reply }) = windows.recv() {
        let summary = core.publish(window);
        if let Some(reply) = reply {
            let _ = reply.send(summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn config() -> WindowConfig {
        WindowConfig::new(AllowList::new(["G1", "G2"]))
    }

    #[test]
    fn test_rotate_emits_to_sink() {
        let emitted = Arc::new(AtomicUsize::new(0));
        let counter = emitted.clone();
        let scheduler = WindowScheduler::new(config(), move |_summary: Summary| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        scheduler.record("G1", Some(-50));
        let summary = scheduler.rotate().unwrap();

        assert_eq!(summary.average("G1"), Some(-50.0));
        assert_eq!(emitted.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_rotate_after_stop_is_none() {
        let (scheduler, rx) = WindowScheduler::with_channel(config()).unwrap();
        scheduler.stop();

        assert!(scheduler.rotate().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sequence_advances() {
        let (scheduler, _rx) = WindowScheduler::with_channel(config()).unwrap();
        assert_eq!(scheduler.rotate().map(|s| s.sequence), Some(0));
        assert_eq!(scheduler.rotate().map(|s| s.sequence), Some(1));
        assert_eq!(scheduler.stats().rotations, 2);
    }

    #[test]
    fn test_start_twice_fails() {
        let (scheduler, _rx) = WindowScheduler::with_channel(config()).unwrap();
        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(WindowError::AlreadyStarted)));
        scheduler.stop();
        assert!(matches!(scheduler.start(), Err(WindowError::Stopped)));
    }

    #[test]
    fn test_dropped_receiver_does_not_panic() {
        let (scheduler, rx) = WindowScheduler::with_channel(config()).unwrap();
        drop(rx);
        scheduler.record("G1", Some(1));
        assert!(scheduler.rotate().is_some());
    }

    #[test]
    fn test_latency_stats_collected() {
        let (scheduler, _rx) =
            WindowScheduler::with_channel(config().with_latency_stats(true)).unwrap();
        scheduler.rotate();
        scheduler.rotate();

        let latency = scheduler.latency().unwrap();
        assert_eq!(latency.swap.count, 2);
        assert_eq!(latency.publish.count, 2);
    }

    #[test]
    fn test_next_deadline_on_time() {
        let fired = Instant::now();
        let interval = Duration::from_millis(100);

        let (next, skipped) = next_deadline(fired, fired + Duration::from_millis(3), interval);
        assert_eq!(next, fired + interval);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_next_deadline_overrun_by_one_interval() {
        let fired = Instant::now();
        let interval = Duration::from_millis(100);

        let (next, skipped) = next_deadline(fired, fired + interval, interval);
        assert_eq!(next, fired + interval * 2);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_next_deadline_skips_missed_intervals() {
        let fired = Instant::now();
        let interval = Duration::from_millis(100);

        let (next, skipped) = next_deadline(fired, fired + Duration::from_millis(350), interval);
        assert_eq!(next, fired + interval * 4);
        assert_eq!(skipped, 3);
        assert!(next > fired + Duration::from_millis(350));
    }

    #[test]
    fn test_panicking_sink_on_manual_rotation() {
        let scheduler = WindowScheduler::new(config(), |_summary: Summary| {
            panic!("sink failure");
        })
        .unwrap();

        scheduler.record("G1", Some(-61));
        let summary = scheduler.rotate().unwrap();
        assert_eq!(summary.average("G1"), Some(-61.0));
        assert_eq!(scheduler.rotate().map(|s| s.sequence), Some(1));
    }

    #[test]
    fn test_latency_disabled_by_default() {
        let (scheduler, _rx) = WindowScheduler::with_channel(config()).unwrap();
        assert!(scheduler.latency().is_none());
    }
}
