//! Live capture loop.
//!
//! Frames are pulled from a [`FrameSource`] and published to the [`FrameHub`]
//! as fast as the source delivers them. On a fixed interval the latest frame is
//! handed to the [`Analyzer`] on a separate thread, guarded by a single-slot
//! [`AnalysisSlot`]: a tick that finds the slot taken is skipped, never queued.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::analyzer::Analyzer;
use crate::frame::{Frame, FrameHub};
use crate::ingest::FrameSource;
use crate::status::StatusBoard;

pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_READ_FAILURES: u32 = 30;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Single-flight token for the analysis task.
#[derive(Debug, Default)]
pub struct AnalysisSlot {
    busy: AtomicBool,
}

impl AnalysisSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take the slot, or `None` when an analysis is already in flight.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotGuard { slot: self.clone() })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the slot until dropped, including during a panic unwind.
#[derive(Debug)]
pub struct SlotGuard {
    slot: Arc<AnalysisSlot>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}

#[derive(Clone, Debug)]
pub struct MonitorOptions {
    /// Time between analysis ticks.
    pub interval: Duration,
    /// Consecutive read failures tolerated before the loop gives up.
    pub max_read_failures: u32,
    /// Stop after this many captured frames.
    pub max_frames: Option<u64>,
    /// Target time per frame, measured from the start of the read.
    pub frame_pause: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CAPTURE_INTERVAL,
            max_read_failures: DEFAULT_MAX_READ_FAILURES,
            max_frames: None,
            frame_pause: Duration::from_millis(66),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    FrameLimit,
    ReadFailures,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorStats {
    pub frames: u64,
    pub dispatched: u64,
    pub skipped_ticks: u64,
    pub read_failures: u64,
    pub stop_reason: StopReason,
}

pub struct LiveMonitor {
    analyzer: Arc<Analyzer>,
    hub: Arc<FrameHub>,
    status: Arc<StatusBoard>,
    slot: Arc<AnalysisSlot>,
    options: MonitorOptions,
}

impl LiveMonitor {
    pub fn new(
        analyzer: Arc<Analyzer>,
        hub: Arc<FrameHub>,
        status: Arc<StatusBoard>,
        options: MonitorOptions,
    ) -> Self {
        Self {
            analyzer,
            hub,
            status,
            slot: AnalysisSlot::new(),
            options,
        }
    }

    pub fn slot(&self) -> &Arc<AnalysisSlot> {
        &self.slot
    }

    /// Run until `shutdown` is set, the frame limit is reached or the source
    /// keeps failing. Waits for the in-flight analysis before returning.
    ///
    /// The source must already be connected.
    pub fn run(&self, source: &mut dyn FrameSource, shutdown: &AtomicBool) -> Result<MonitorStats> {
        let mut frames = 0u64;
        let mut dispatched = 0u64;
        let mut skipped_ticks = 0u64;
        let mut read_failures = 0u64;
        let mut consecutive_failures = 0u32;
        let mut next_tick: Option<Instant> = None;
        let mut in_flight: Option<JoinHandle<()>> = None;
        let mut last_health_log = Instant::now();

        log::info!(
            "capture loop running: analysis every {:?}, source {}",
            self.options.interval,
            source.stats().source
        );

        let stop_reason = loop {
            if shutdown.load(Ordering::SeqCst) {
                break StopReason::Shutdown;
            }
            if self.options.max_frames.is_some_and(|max| frames >= max) {
                break StopReason::FrameLimit;
            }

            let read_started = Instant::now();
            let frame = match source.next_frame() {
                Ok(frame) => {
                    consecutive_failures = 0;
                    Arc::new(frame)
                }
                Err(err) => {
                    read_failures += 1;
                    consecutive_failures += 1;
                    log::warn!("frame read failed: {:#}", err);
                    if consecutive_failures > self.options.max_read_failures {
                        log::error!(
                            "{} consecutive frame read failures; stopping capture",
                            consecutive_failures
                        );
                        break StopReason::ReadFailures;
                    }
                    std::thread::sleep(self.options.frame_pause);
                    continue;
                }
            };
            frames += 1;
            self.hub.publish(frame.clone());

            let now = Instant::now();
            if next_tick.map_or(true, |tick| now >= tick) {
                let scheduled = next_tick.unwrap_or(now) + self.options.interval;
                next_tick = Some(if scheduled <= now {
                    now + self.options.interval
                } else {
                    scheduled
                });

                match self.slot.try_acquire() {
                    Some(guard) => {
                        if let Some(done) = in_flight.take() {
                            if done.join().is_err() {
                                log::error!("analysis thread panicked");
                            }
                        }
                        in_flight = self.dispatch(frame, guard);
                        if in_flight.is_some() {
                            dispatched += 1;
                        }
                    }
                    None => {
                        skipped_ticks += 1;
                        log::debug!("analysis in flight; tick skipped");
                    }
                }
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = source.stats();
                log::info!(
                    "source health={} frames={} analyses={} skipped={} source={}",
                    source.is_healthy(),
                    stats.frames_captured,
                    dispatched,
                    skipped_ticks,
                    stats.source
                );
                last_health_log = Instant::now();
            }

            std::thread::sleep(remaining_pause(
                self.options.frame_pause,
                read_started.elapsed(),
            ));
        };

        if let Some(handle) = in_flight.take() {
            if handle.join().is_err() {
                log::error!("analysis thread panicked");
            }
        }

        let stats = MonitorStats {
            frames,
            dispatched,
            skipped_ticks,
            read_failures,
            stop_reason,
        };
        log::info!("capture loop stopped: {:?}", stats);
        Ok(stats)
    }

    fn dispatch(&self, frame: Arc<Frame>, guard: SlotGuard) -> Option<JoinHandle<()>> {
        let analyzer = self.analyzer.clone();
        let status = self.status.clone();
        let spawned = std::thread::Builder::new()
            .name("analysis".to_string())
            .spawn(move || {
                let _guard = guard;
                let report = analyzer.analyze_frame(&frame);
                status.update(
                    report.status,
                    &report.detail,
                    report.confidence,
                    report.incident.as_ref(),
                );
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("could not start analysis thread: {}", err);
                None
            }
        }
    }
}

/// Frame pause left after a read that already took `spent`. Sources that
/// block for a frame period get little or no extra sleep.
fn remaining_pause(pause: Duration, spent: Duration) -> Duration {
    pause.saturating_sub(spent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerSettings;
    use crate::evidence::EvidenceRecorder;
    use crate::inference::{InferenceClient, Label, StubInference};
    use crate::ingest::{CameraConfig, CameraSource, SourceStats};
    use crate::notify::NotifierSet;
    use anyhow::anyhow;

    struct SlowInference(Duration);

    impl InferenceClient for SlowInference {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn analyze(&self, _jpeg: &[u8], _prompt: &str) -> Result<Vec<Label>> {
            std::thread::sleep(self.0);
            Ok(Vec::new())
        }
    }

    struct BrokenSource;

    impl FrameSource for BrokenSource {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Frame> {
            Err(anyhow!("device unplugged"))
        }

        fn is_healthy(&self) -> bool {
            false
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: 0,
                source: "broken".to_string(),
            }
        }
    }

    fn monitor(
        client: Arc<dyn InferenceClient>,
        dir: &std::path::Path,
        options: MonitorOptions,
    ) -> LiveMonitor {
        let analyzer = Analyzer::new(
            client,
            EvidenceRecorder::new(dir, 95),
            NotifierSet::new(),
            AnalyzerSettings::default(),
        );
        LiveMonitor::new(
            Arc::new(analyzer),
            Arc::new(FrameHub::default()),
            Arc::new(StatusBoard::new()),
            options,
        )
    }

    fn camera() -> Result<CameraSource> {
        let mut source = CameraSource::new(CameraConfig {
            device: "stub://test".to_string(),
            target_fps: 30,
            width: 64,
            height: 48,
        })?;
        source.connect()?;
        Ok(source)
    }

    struct PacedSource {
        inner: CameraSource,
        period: Duration,
    }

    impl FrameSource for PacedSource {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Frame> {
            std::thread::sleep(self.period);
            self.inner.next_frame()
        }

        fn is_healthy(&self) -> bool {
            true
        }

        fn stats(&self) -> SourceStats {
            self.inner.stats()
        }
    }

    #[test]
    fn pause_is_reduced_by_read_time() {
        let pause = Duration::from_millis(66);
        assert_eq!(remaining_pause(pause, Duration::ZERO), pause);
        assert_eq!(
            remaining_pause(pause, Duration::from_millis(16)),
            Duration::from_millis(50)
        );
        assert_eq!(remaining_pause(pause, Duration::from_millis(80)), Duration::ZERO);
    }

    #[test]
    fn blocking_source_is_not_paced_twice() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let monitor = monitor(
            Arc::new(StubInference::new()),
            dir.path(),
            MonitorOptions {
                max_frames: Some(10),
                frame_pause: Duration::from_millis(40),
                ..MonitorOptions::default()
            },
        );
        let mut source = PacedSource {
            inner: camera()?,
            period: Duration::from_millis(40),
        };
        let started = Instant::now();
        let stats = monitor.run(&mut source, &AtomicBool::new(false))?;

        assert_eq!(stats.frames, 10);
        // Ten reads at 40ms each; pausing on top would take about 800ms.
        assert!(started.elapsed() < Duration::from_millis(700));
        Ok(())
    }

    #[test]
    fn slot_is_single_flight() {
        let slot = AnalysisSlot::new();
        let guard = slot.try_acquire().expect("first acquire");
        assert!(slot.is_busy());
        assert!(slot.try_acquire().is_none());
        drop(guard);
        assert!(!slot.is_busy());
        assert!(slot.try_acquire().is_some());
    }

    #[test]
    fn slot_is_released_when_analysis_panics() {
        let slot = AnalysisSlot::new();
        let guard = slot.try_acquire().expect("acquire");
        let handle = std::thread::spawn(move || {
            let _guard = guard;
            panic!("analysis blew up");
        });
        assert!(handle.join().is_err());
        assert!(!slot.is_busy());
    }

    #[test]
    fn busy_ticks_are_skipped_not_queued() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let monitor = monitor(
            Arc::new(SlowInference(Duration::from_millis(300))),
            dir.path(),
            MonitorOptions {
                interval: Duration::from_millis(1),
                max_read_failures: 3,
                max_frames: Some(20),
                frame_pause: Duration::from_millis(2),
            },
        );
        let mut source = camera()?;
        let stats = monitor.run(&mut source, &AtomicBool::new(false))?;

        assert_eq!(stats.stop_reason, StopReason::FrameLimit);
        assert_eq!(stats.frames, 20);
        assert_eq!(stats.dispatched, 1);
        assert!(stats.skipped_ticks >= 1);
        assert!(!monitor.slot().is_busy());
        assert_eq!(monitor.status.snapshot().analyses, 1);
        Ok(())
    }

    #[test]
    fn frames_reach_the_hub() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let monitor = monitor(
            Arc::new(StubInference::new()),
            dir.path(),
            MonitorOptions {
                max_frames: Some(3),
                frame_pause: Duration::ZERO,
                ..MonitorOptions::default()
            },
        );
        let mut source = camera()?;
        let stats = monitor.run(&mut source, &AtomicBool::new(false))?;

        assert_eq!(stats.dispatched, 1);
        let (seq, frame) = monitor.hub.latest().expect("frame published");
        assert_eq!(seq, 3);
        assert_eq!(frame.width(), 64);
        Ok(())
    }

    #[test]
    fn stops_after_too_many_read_failures() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let monitor = monitor(
            Arc::new(StubInference::new()),
            dir.path(),
            MonitorOptions {
                max_read_failures: 3,
                frame_pause: Duration::ZERO,
                ..MonitorOptions::default()
            },
        );
        let stats = monitor.run(&mut BrokenSource, &AtomicBool::new(false))?;

        assert_eq!(stats.stop_reason, StopReason::ReadFailures);
        assert_eq!(stats.read_failures, 4);
        assert_eq!(stats.frames, 0);
        Ok(())
    }

    #[test]
    fn shutdown_flag_stops_before_capture() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let monitor = monitor(
            Arc::new(StubInference::new()),
            dir.path(),
            MonitorOptions::default(),
        );
        let mut source = camera()?;
        let stats = monitor.run(&mut source, &AtomicBool::new(true))?;
        assert_eq!(stats.stop_reason, StopReason::Shutdown);
        assert_eq!(stats.frames, 0);
        Ok(())
    }
}
