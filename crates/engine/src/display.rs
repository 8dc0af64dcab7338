//! Real-time display consumer.
//!
//! Presents the connected producer's current frame to a caller-supplied
//! sink (the GUI surface) and advances the playhead while the producer
//! speed is non-zero.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use clipframe_common::error::{ClipframeError, ClipframeResult};

use crate::consumer::{Consumer, ConsumerEvent, ConsumerExit};
use crate::engine::FrameSource;
use crate::media::{Frame, FrameRequest};
use crate::producer::{Producer, ProducerLink};
use crate::profile::Profile;
use crate::properties::Properties;

/// Receives every frame the display consumer presents.
pub type FrameSink = Arc<dyn Fn(Frame) + Send + Sync>;

pub struct DisplayConsumer<S: FrameSource + ?Sized + 'static> {
    source: Arc<S>,
    profile: Profile,
    properties: Properties,
    sink: FrameSink,
    max_fps: u32,
    link: Arc<Mutex<Option<ProducerLink>>>,
    running: Arc<AtomicBool>,
    presented: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
    events: Option<Sender<ConsumerEvent>>,
}

impl<S: FrameSource + ?Sized + 'static> DisplayConsumer<S> {
    pub fn new(
        source: Arc<S>,
        profile: Profile,
        properties: Properties,
        sink: FrameSink,
        max_fps: u32,
    ) -> Self {
        Self {
            source,
            profile,
            properties,
            sink,
            max_fps: max_fps.max(1),
            link: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            presented: Arc::new(AtomicU64::new(0)),
            worker: None,
            events: None,
        }
    }

    /// Number of frames handed to the sink so far.
    pub fn frames_presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }

    fn tick_interval(&self) -> Duration {
        let cap = Duration::from_secs_f64(1.0 / self.max_fps as f64);
        self.profile.frame_duration().max(cap)
    }

    fn current_link(&self) -> Option<ProducerLink> {
        self.link.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl<S: FrameSource + ?Sized + 'static> Consumer for DisplayConsumer<S> {
    fn driver(&self) -> &str {
        "display"
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn connect(&mut self, producer: &Producer) -> ClipframeResult<()> {
        let mut link = self.link.lock().unwrap_or_else(|e| e.into_inner());
        if self.running.load(Ordering::SeqCst) && link.is_some() {
            return Err(ClipframeError::ConsumerBusy);
        }
        *link = Some(producer.link());
        Ok(())
    }

    fn purge(&mut self) {
        *self.link.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn start(&mut self) -> ClipframeResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let presenter = Presenter {
            source: Arc::clone(&self.source),
            sink: Arc::clone(&self.sink),
            link: Arc::clone(&self.link),
            running: Arc::clone(&self.running),
            presented: Arc::clone(&self.presented),
            width: self.profile.width,
            height: self.profile.height,
            fps: self.profile.fps(),
            interval: self.tick_interval(),
            real_time: self.properties.is_real_time(),
            deinterlace: self.properties.get_flag(Properties::PROGRESSIVE),
        };
        self.worker = Some(std::thread::spawn(move || presenter.run()));
        tracing::debug!(profile = %self.profile.name, "Display consumer started");
        Ok(())
    }

    fn stop(&mut self) -> ClipframeResult<()> {
        self.running.store(false, Ordering::SeqCst);
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        if worker.join().is_err() {
            tracing::warn!("Display presenter thread panicked");
        }
        let position = self.current_link().map(|l| l.playhead.position());
        tracing::debug!(?position, "Display consumer stopped");
        if let Some(events) = &self.events {
            let _ = events.send(ConsumerEvent::Finished(ConsumerExit {
                success: true,
                stopped: true,
                frames_written: self.frames_presented() as i64,
                detail: String::new(),
            }));
        }
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    fn run(&mut self) -> ClipframeResult<ConsumerExit> {
        Err(ClipframeError::unsupported(
            "display consumers present frames until stopped and cannot run to completion",
        ))
    }

    fn subscribe(&mut self, events: Sender<ConsumerEvent>) {
        self.events = Some(events);
    }
}

impl<S: FrameSource + ?Sized + 'static> Drop for DisplayConsumer<S> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct Presenter<S: FrameSource + ?Sized> {
    source: Arc<S>,
    sink: FrameSink,
    link: Arc<Mutex<Option<ProducerLink>>>,
    running: Arc<AtomicBool>,
    presented: Arc<AtomicU64>,
    width: u32,
    height: u32,
    fps: f64,
    interval: Duration,
    real_time: bool,
    deinterlace: bool,
}

impl<S: FrameSource + ?Sized> Presenter<S> {
    fn run(self) {
        let mut shown: Option<i64> = None;
        let mut failed: Option<i64> = None;
        let mut carry = 0.0f64;
        let mut last_tick = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let tick = Instant::now();
            let link = self.link.lock().unwrap_or_else(|e| e.into_inner()).clone();

            if let Some(link) = link {
                // Real-time playback follows the wall clock; otherwise step
                // exactly one tick's worth of frames per presentation.
                let elapsed = if self.real_time {
                    tick.duration_since(last_tick)
                } else {
                    self.interval
                };
                let speed = link.playhead.speed();
                if speed != 0.0 {
                    carry += speed * elapsed.as_secs_f64() * self.fps;
                    let whole = carry.trunc();
                    carry -= whole;
                    if whole != 0.0 {
                        let before = link.playhead.position();
                        let after = link.playhead.seek(before + whole as i64);
                        if after == before {
                            // Reached either end of the range.
                            link.playhead.set_speed(0.0);
                            carry = 0.0;
                        }
                    }
                } else {
                    carry = 0.0;
                }

                let frame = link.absolute(link.playhead.position());
                if shown != Some(frame) && failed != Some(frame) {
                    let request = FrameRequest {
                        frame,
                        width: self.width,
                        height: self.height,
                        deinterlace: self.deinterlace && !link.info.progressive,
                    };
                    match self.source.fetch_frame(&link, request) {
                        Ok(image) => {
                            (self.sink)(image);
                            self.presented.fetch_add(1, Ordering::Relaxed);
                            shown = Some(frame);
                            failed = None;
                        }
                        Err(e) => {
                            tracing::warn!(frame, error = %e, "Display frame fetch failed");
                            failed = Some(frame);
                        }
                    }
                }
            } else {
                shown = None;
            }

            last_tick = tick;
            if let Some(rest) = self.interval.checked_sub(tick.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaInfo, Rational};
    use crate::profile::ProfileCatalog;

    struct SolidSource;

    impl FrameSource for SolidSource {
        fn fetch_frame(&self, _link: &ProducerLink, request: FrameRequest) -> ClipframeResult<Frame> {
            let len = request.width as usize * request.height as usize * 4;
            let shade = (request.frame % 256) as u8;
            Frame::rgba(request.width, request.height, vec![shade; len])
                .ok_or_else(|| ClipframeError::engine("bad size"))
        }
    }

    fn small_profile() -> Profile {
        let mut profile = ProfileCatalog::builtin().default_profile().clone();
        profile.width = 4;
        profile.height = 2;
        profile
    }

    fn producer(profile: &Profile, frames: i64) -> Producer {
        let info = MediaInfo {
            width: 4,
            height: 2,
            frame_rate: profile.frame_rate,
            sample_aspect: Rational::ONE,
            progressive: true,
            duration_secs: frames as f64 / profile.fps(),
            frame_count: Some(frames),
        };
        Producer::new("/media/clip.mp4", info, profile).unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_presents_current_frame_when_paused() {
        let profile = small_profile();
        let shades = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&shades);
        let sink: FrameSink = Arc::new(move |frame: Frame| {
            captured.lock().unwrap().push(frame.data[0]);
        });

        let producer = producer(&profile, 100);
        producer.seek(7);
        let mut display =
            DisplayConsumer::new(Arc::new(SolidSource), profile, Properties::new(), sink, 200);
        display.connect(&producer).unwrap();
        display.start().unwrap();

        assert!(wait_until(|| !shades.lock().unwrap().is_empty()));
        display.stop().unwrap();
        assert_eq!(shades.lock().unwrap()[0], 7);
        assert_eq!(producer.position(), 7);
    }

    #[test]
    fn test_playback_advances_until_end() {
        let profile = small_profile();
        let sink: FrameSink = Arc::new(|_frame: Frame| {});
        let producer = producer(&profile, 5);
        producer.set_speed(1.0);

        let mut display =
            DisplayConsumer::new(Arc::new(SolidSource), profile, Properties::new(), sink, 200);
        display.connect(&producer).unwrap();
        display.start().unwrap();

        assert!(wait_until(|| producer.position() == 4 && producer.speed() == 0.0));
        display.stop().unwrap();
    }

    #[test]
    fn test_connect_while_running_requires_purge() {
        let profile = small_profile();
        let sink: FrameSink = Arc::new(|_frame: Frame| {});
        let first = producer(&profile, 10);
        let second = producer(&profile, 10);

        let mut display =
            DisplayConsumer::new(Arc::new(SolidSource), profile, Properties::new(), sink, 200);
        display.connect(&first).unwrap();
        display.start().unwrap();
        assert!(matches!(
            display.connect(&second),
            Err(ClipframeError::ConsumerBusy)
        ));
        display.purge();
        display.connect(&second).unwrap();
        display.stop().unwrap();
        assert!(display.is_stopped());
    }

    #[test]
    fn test_run_is_unsupported() {
        let profile = small_profile();
        let sink: FrameSink = Arc::new(|_frame: Frame| {});
        let mut display =
            DisplayConsumer::new(Arc::new(SolidSource), profile, Properties::new(), sink, 30);
        assert!(matches!(
            display.run(),
            Err(ClipframeError::Unsupported { .. })
        ));
    }
}
