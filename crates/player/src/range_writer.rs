//! Export of a marked range as a numbered PNG sequence.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use clipframe_common::config::RenderTiming;
use clipframe_common::error::{ClipframeError, ClipframeResult};
use clipframe_engine::{
    Consumer, ConsumerEvent, ConsumerExit, ConsumerTarget, MediaEngine, Producer, Profile,
    Properties, Rescale,
};

/// Lifecycle of a range render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Running,
    Finished,
    Aborted,
    Failed,
}

/// How a range render ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Finished,
    Aborted,
}

/// Summary of one `write_frames` call.
#[derive(Debug, Clone)]
pub struct RenderReport {
    pub outcome: RenderOutcome,
    /// Last progress value reported, in frames since mark-in.
    pub frames: i64,
    /// printf-style pattern the sequence was written to.
    pub output_pattern: PathBuf,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

#[derive(Debug)]
struct RenderControl {
    running: AtomicBool,
    state: Mutex<RenderState>,
    wake: Mutex<Option<Sender<ConsumerEvent>>>,
}

impl RenderControl {
    fn state(&self) -> RenderState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: RenderState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn set_wake(&self, wake: Option<Sender<ConsumerEvent>>) {
        *self.wake.lock().unwrap_or_else(|e| e.into_inner()) = wake;
    }
}

/// Cancels a running range render from any thread.
#[derive(Debug, Clone)]
pub struct RenderCancel {
    control: Arc<RenderControl>,
}

impl RenderCancel {
    /// Ask the render to stop. Returns false when no render was running,
    /// in which case nothing happens.
    pub fn cancel(&self) -> bool {
        if !self.control.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        tracing::info!("Range render cancellation requested");
        if let Some(wake) = self
            .control
            .wake
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            let _ = wake.send(ConsumerEvent::Wake);
        }
        true
    }

    pub fn state(&self) -> RenderState {
        self.control.state()
    }

    pub fn is_running(&self) -> bool {
        self.control.running.load(Ordering::SeqCst)
    }
}

pub struct RangeWriter {
    engine: Arc<dyn MediaEngine>,
    profile: Profile,
    producer: Producer,
    timing: RenderTiming,
    control: Arc<RenderControl>,
}

impl RangeWriter {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        profile: Profile,
        clip_path: &Path,
        timing: RenderTiming,
    ) -> ClipframeResult<Self> {
        let producer = engine.open_producer(&profile, clip_path)?;
        Ok(Self {
            engine,
            profile,
            producer,
            timing,
            control: Arc::new(RenderControl {
                running: AtomicBool::new(false),
                state: Mutex::new(RenderState::Idle),
                wake: Mutex::new(None),
            }),
        })
    }

    pub fn length(&self) -> i64 {
        self.producer.length()
    }

    pub fn state(&self) -> RenderState {
        self.control.state()
    }

    pub fn cancel_handle(&self) -> RenderCancel {
        RenderCancel {
            control: Arc::clone(&self.control),
        }
    }

    /// Same as [`RenderCancel::cancel`].
    pub fn shutdown(&self) -> bool {
        self.cancel_handle().cancel()
    }

    /// Render `[mark_in, mark_out]` to `output_folder/<name_prefix>_%04d.png`,
    /// blocking until the encoder has flushed or the render is cancelled.
    ///
    /// `progress` receives the number of frames rendered since `mark_in`,
    /// never decreasing, ending with `mark_out - mark_in` on success.
    pub fn write_frames(
        &mut self,
        output_folder: &Path,
        name_prefix: &str,
        mark_in: i64,
        mark_out: i64,
        mut progress: impl FnMut(i64),
    ) -> ClipframeResult<RenderReport> {
        let length = self.length();
        if mark_in < 0 || mark_in > mark_out || mark_out >= length {
            return Err(ClipframeError::invalid_range(mark_in, mark_out, length));
        }
        if self.control.state() == RenderState::Running {
            return Err(ClipframeError::render("A range render is already running"));
        }

        let pattern = output_folder.join(format!("{name_prefix}_%04d.png"));
        let mut properties = Properties::new();
        properties
            .real_time(-1)
            .rescale(Rescale::Bicubic)
            .vcodec("png");
        let mut consumer = self.engine.create_consumer(
            &self.profile,
            ConsumerTarget::ImageSequence(pattern.clone()),
            properties,
        )?;

        let cut = self.producer.cut(mark_in, mark_out)?;
        consumer.connect(&cut)?;

        let (events_tx, events_rx) = mpsc::channel();
        consumer.subscribe(events_tx.clone());
        self.control.set_wake(Some(events_tx));
        cut.set_speed(0.0);
        cut.seek(0);
        cut.set_speed(1.0);

        let started_at = Utc::now();
        let started = Instant::now();
        // Armed before Running is visible so an early cancel is never lost.
        self.control.running.store(true, Ordering::SeqCst);
        self.control.set_state(RenderState::Running);

        if let Err(e) = consumer.start() {
            self.fail(&cut);
            return Err(e);
        }

        tracing::info!(
            output = %pattern.display(),
            mark_in,
            mark_out,
            driver = consumer.driver(),
            "Range render started"
        );

        let result = self.drive(
            consumer.as_mut(),
            &cut,
            &events_rx,
            mark_out - mark_in,
            &mut progress,
        );
        self.control.set_wake(None);

        let (outcome, frames) = match result {
            Ok(done) => done,
            Err(e) => {
                let _ = consumer.stop();
                self.fail(&cut);
                tracing::error!(error = %e, "Range render failed");
                return Err(e);
            }
        };

        // Reaps the encoder; a no-op once it has exited on its own.
        consumer.stop()?;
        cut.set_speed(0.0);
        let elapsed = started.elapsed();

        match outcome {
            RenderOutcome::Finished => {
                self.control.set_state(RenderState::Finished);
                tracing::info!(
                    frames,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Range render finished"
                );
            }
            RenderOutcome::Aborted => {
                self.control.set_state(RenderState::Aborted);
                tracing::info!(frames, "Range render aborted");
            }
        }

        Ok(RenderReport {
            outcome,
            frames,
            output_pattern: pattern,
            started_at,
            elapsed,
        })
    }

    fn fail(&self, cut: &Producer) {
        self.control.running.store(false, Ordering::SeqCst);
        self.control.set_wake(None);
        cut.set_speed(0.0);
        self.control.set_state(RenderState::Failed);
    }

    /// Poll loop. Returns the outcome and the last progress value.
    fn drive(
        &self,
        consumer: &mut dyn Consumer,
        cut: &Producer,
        events: &Receiver<ConsumerEvent>,
        total: i64,
        progress: &mut impl FnMut(i64),
    ) -> ClipframeResult<(RenderOutcome, i64)> {
        let poll = self.timing.poll_interval();
        let mut reported = 0i64;

        loop {
            if !self.control.running.load(Ordering::SeqCst) {
                return self.abort(consumer, cut, reported);
            }

            match events.recv_timeout(poll) {
                Ok(ConsumerEvent::Wake) => continue,
                Ok(ConsumerEvent::Finished(exit)) => {
                    check_exit(&exit)?;
                    if exit.stopped || !self.control.running.swap(false, Ordering::SeqCst) {
                        return self.abort(consumer, cut, reported);
                    }
                    // Finished already implies the output is flushed.
                    progress(total);
                    return Ok((RenderOutcome::Finished, total));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(poll),
            }

            let position = cut.position().clamp(0, total);
            if position < total {
                reported = reported.max(position);
                progress(reported);
                continue;
            }

            if !self.control.running.swap(false, Ordering::SeqCst) {
                return self.abort(consumer, cut, reported);
            }
            progress(total);
            self.wait_for_flush(consumer, events)?;
            return Ok((RenderOutcome::Finished, total));
        }
    }

    fn abort(
        &self,
        consumer: &mut dyn Consumer,
        cut: &Producer,
        reported: i64,
    ) -> ClipframeResult<(RenderOutcome, i64)> {
        self.control.running.store(false, Ordering::SeqCst);
        consumer.stop()?;
        cut.set_speed(0.0);
        Ok((RenderOutcome::Aborted, reported))
    }

    /// Block until the engine reports its output flushed, bounded by the
    /// settle timeout. Engines that never report get the full settle delay.
    fn wait_for_flush(
        &self,
        consumer: &dyn Consumer,
        events: &Receiver<ConsumerEvent>,
    ) -> ClipframeResult<()> {
        let settle = self.timing.settle_timeout();
        if !consumer.signals_completion() {
            std::thread::sleep(settle);
            return Ok(());
        }

        let deadline = Instant::now() + settle;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(ConsumerEvent::Finished(exit)) => return check_exit(&exit),
                Ok(ConsumerEvent::Wake) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        settle_ms = settle.as_millis() as u64,
                        "Encoder did not report completion before the settle timeout"
                    );
                    return Ok(());
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }
}

fn check_exit(exit: &ConsumerExit) -> ClipframeResult<()> {
    if exit.success || exit.stopped {
        Ok(())
    } else {
        Err(ClipframeError::render(format!(
            "Encoder failed after {} frames: {}",
            exit.frames_written, exit.detail
        )))
    }
}

impl Drop for RangeWriter {
    fn drop(&mut self) {
        self.control.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit(success: bool, stopped: bool) -> ConsumerExit {
        ConsumerExit {
            success,
            stopped,
            frames_written: 3,
            detail: "boom".to_string(),
        }
    }

    #[test]
    fn test_check_exit() {
        assert!(check_exit(&exit(true, false)).is_ok());
        assert!(check_exit(&exit(false, true)).is_ok());
        let err = check_exit(&exit(false, false)).unwrap_err();
        assert!(matches!(err, ClipframeError::Render { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_cancel_without_render_is_noop() {
        let control = Arc::new(RenderControl {
            running: AtomicBool::new(false),
            state: Mutex::new(RenderState::Idle),
            wake: Mutex::new(None),
        });
        let cancel = RenderCancel { control };
        assert!(!cancel.cancel());
        assert!(!cancel.cancel());
        assert_eq!(cancel.state(), RenderState::Idle);
    }

    #[test]
    fn test_cancel_wakes_loop() {
        let (tx, rx) = mpsc::channel();
        let control = Arc::new(RenderControl {
            running: AtomicBool::new(true),
            state: Mutex::new(RenderState::Running),
            wake: Mutex::new(Some(tx)),
        });
        let cancel = RenderCancel { control };
        assert!(cancel.cancel());
        assert_eq!(rx.try_recv().unwrap(), ConsumerEvent::Wake);
        assert!(!cancel.cancel());
        assert!(rx.try_recv().is_err());
    }
}
