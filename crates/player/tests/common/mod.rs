//! Scripted in-memory engine shared by the player integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use clipframe_common::error::{ClipframeError, ClipframeResult};
use clipframe_engine::{
    Consumer, ConsumerEvent, ConsumerExit, ConsumerTarget, Frame, FrameRequest, FrameSource,
    MediaEngine, MediaInfo, Producer, ProducerLink, Profile, Properties, Rational,
};

pub fn small_profile() -> Profile {
    Profile {
        name: "test_small_25".to_string(),
        description: "Test 16x8 25 fps".to_string(),
        width: 16,
        height: 8,
        frame_rate: Rational::new(25, 1),
        sample_aspect: Rational::ONE,
        display_aspect: Rational::new(2, 1),
        progressive: true,
    }
}

pub fn clip_info(width: u32, height: u32, frame_rate: Rational, frames: i64) -> MediaInfo {
    MediaInfo {
        width,
        height,
        frame_rate,
        sample_aspect: Rational::ONE,
        progressive: true,
        duration_secs: frames as f64 / frame_rate.as_f64(),
        frame_count: Some(frames),
    }
}

/// A clip file that exists on disk; its contents are never read.
pub fn touch_clip(dir: &Path) -> PathBuf {
    let path = dir.join("clip.mov");
    std::fs::write(&path, b"not really a movie").unwrap();
    path
}

/// What a consumer was built with.
#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub target: ConsumerTarget,
    pub properties: Properties,
}

/// Engine double: probing returns fixed info, frames are solid colours
/// shaded by frame index, and file consumers advance their playhead one
/// frame per `step` and write empty files.
pub struct ScriptedEngine {
    pub info: MediaInfo,
    pub step: Duration,
    pub signals_completion: bool,
    pub fail_encode: bool,
    pub records: Arc<Mutex<Vec<ConsumerRecord>>>,
    pub stops: Arc<AtomicUsize>,
    pub fetches: Arc<Mutex<Vec<FrameRequest>>>,
}

impl ScriptedEngine {
    pub fn new(frames: i64) -> Self {
        Self::with_info(clip_info(16, 8, Rational::new(25, 1), frames))
    }

    pub fn with_info(info: MediaInfo) -> Self {
        Self {
            info,
            step: Duration::from_millis(2),
            signals_completion: true,
            fail_encode: false,
            records: Arc::new(Mutex::new(Vec::new())),
            stops: Arc::new(AtomicUsize::new(0)),
            fetches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn records(&self) -> Vec<ConsumerRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl FrameSource for ScriptedEngine {
    fn fetch_frame(&self, link: &ProducerLink, request: FrameRequest) -> ClipframeResult<Frame> {
        self.fetches.lock().unwrap().push(request);
        let last = link.range_start + link.length - 1;
        if request.frame < 0 || request.frame > last {
            return Err(ClipframeError::engine(format!(
                "No frame available at {}",
                request.frame
            )));
        }
        let len = request.width as usize * request.height as usize * 4;
        let shade = (request.frame % 256) as u8;
        Frame::rgba(request.width, request.height, vec![shade; len])
            .ok_or_else(|| ClipframeError::engine("Empty frame size"))
    }
}

impl MediaEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn probe(&self, _path: &Path) -> ClipframeResult<MediaInfo> {
        Ok(self.info.clone())
    }

    fn create_consumer(
        &self,
        _profile: &Profile,
        target: ConsumerTarget,
        properties: Properties,
    ) -> ClipframeResult<Box<dyn Consumer>> {
        self.records.lock().unwrap().push(ConsumerRecord {
            target: target.clone(),
            properties: properties.clone(),
        });
        Ok(Box::new(ScriptedConsumer {
            target,
            properties,
            step: self.step,
            signals: self.signals_completion,
            fail: self.fail_encode,
            stops: Arc::clone(&self.stops),
            link: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            events: None,
        }))
    }
}

pub struct ScriptedConsumer {
    target: ConsumerTarget,
    properties: Properties,
    step: Duration,
    signals: bool,
    fail: bool,
    stops: Arc<AtomicUsize>,
    link: Option<ProducerLink>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<ConsumerExit>>,
    events: Option<Sender<ConsumerEvent>>,
}

fn write_outputs(target: &ConsumerTarget, frames: i64) {
    match target {
        ConsumerTarget::ImageFile(path) => {
            std::fs::write(path, b"").unwrap();
        }
        ConsumerTarget::ImageSequence(pattern) => {
            let pattern = pattern.to_string_lossy().into_owned();
            for n in 1..=frames {
                std::fs::write(pattern.replace("%04d", &format!("{n:04}")), b"").unwrap();
            }
        }
    }
}

impl Consumer for ScriptedConsumer {
    fn driver(&self) -> &str {
        "scripted"
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn connect(&mut self, producer: &Producer) -> ClipframeResult<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ClipframeError::ConsumerBusy);
        }
        self.link = Some(producer.link());
        Ok(())
    }

    fn purge(&mut self) {
        if !self.running.load(Ordering::SeqCst) {
            self.link = None;
        }
    }

    fn start(&mut self) -> ClipframeResult<()> {
        let link = self
            .link
            .clone()
            .ok_or_else(|| ClipframeError::engine("Consumer started without a producer"))?;
        if let Some(parent) = self.target.path().parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let events = self.events.clone();
        let target = self.target.clone();
        let (step, signals, fail) = (self.step, self.signals, self.fail);
        self.worker = Some(std::thread::spawn(move || {
            let last = link.length - 1;
            let mut position = 0;
            while running.load(Ordering::SeqCst) && position < last {
                std::thread::sleep(step);
                position += 1;
                link.playhead.seek(position);
            }
            let stopped = !running.load(Ordering::SeqCst);
            let exit = ConsumerExit {
                success: !fail && !stopped,
                stopped,
                frames_written: position + 1,
                detail: if fail {
                    "scripted encode failure".to_string()
                } else {
                    String::new()
                },
            };
            if exit.success {
                write_outputs(&target, link.length);
            }
            running.store(false, Ordering::SeqCst);
            if signals && !stopped {
                std::thread::sleep(step);
                if let Some(events) = events {
                    let _ = events.send(ConsumerEvent::Finished(exit.clone()));
                }
            }
            exit
        }));
        Ok(())
    }

    fn stop(&mut self) -> ClipframeResult<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.running.store(false, Ordering::SeqCst);
        worker.join().unwrap();
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    fn run(&mut self) -> ClipframeResult<ConsumerExit> {
        self.start()?;
        let exit = match self.worker.take() {
            Some(worker) => worker.join().unwrap(),
            None => return Err(ClipframeError::engine("Consumer did not start")),
        };
        if !exit.success {
            return Err(ClipframeError::engine(exit.detail));
        }
        Ok(exit)
    }

    fn subscribe(&mut self, events: Sender<ConsumerEvent>) {
        self.events = Some(events);
    }

    fn signals_completion(&self) -> bool {
        self.signals
    }
}
