//! Media engine backed by the `ffmpeg` and `ffprobe` command-line tools.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use clipframe_common::config::ToolPaths;
use clipframe_common::error::{ClipframeError, ClipframeResult};
use serde::Deserialize;

use crate::consumer::{Consumer, ConsumerEvent, ConsumerExit, ConsumerTarget};
use crate::engine::{FrameSource, MediaEngine};
use crate::media::{Frame, FrameRequest, MediaInfo, Rational};
use crate::producer::{Producer, ProducerLink};
use crate::profile::Profile;
use crate::properties::{Properties, Rescale};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Engine that shells out to ffmpeg/ffprobe (without a shell).
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegEngine {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
        }
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new(&ToolPaths::default())
    }
}

impl FrameSource for FfmpegEngine {
    fn fetch_frame(&self, link: &ProducerLink, request: FrameRequest) -> ClipframeResult<Frame> {
        let seek_secs = link.frame_to_secs(request.frame);
        let filter = scale_filter(
            request.width,
            request.height,
            Rescale::Bicubic,
            request.deinterlace,
        );

        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss"])
            .arg(format!("{seek_secs:.6}"))
            .arg("-i")
            .arg(&link.source)
            .args(["-frames:v", "1", "-an", "-vf"])
            .arg(filter)
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ClipframeError::engine(format!("Failed to start ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(ClipframeError::engine(format!(
                "ffmpeg frame extraction failed (status {}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Frame::rgba(request.width, request.height, output.stdout).ok_or_else(|| {
            ClipframeError::engine(format!(
                "No frame available at {} in {}",
                request.frame,
                link.source.display()
            ))
        })
    }
}

impl MediaEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists(&self.ffmpeg) && command_exists(&self.ffprobe)
    }

    fn probe(&self, path: &Path) -> ClipframeResult<MediaInfo> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate,sample_aspect_ratio,field_order,nb_frames,duration:format=duration",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ClipframeError::engine(format!("Failed to start ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(ClipframeError::engine(format!(
                "Cannot open {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&raw).map_err(|e| match e {
            ClipframeError::Engine { message } => {
                ClipframeError::engine(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    fn create_consumer(
        &self,
        profile: &Profile,
        target: ConsumerTarget,
        properties: Properties,
    ) -> ClipframeResult<Box<dyn Consumer>> {
        Ok(Box::new(FfmpegConsumer::new(
            self.ffmpeg.clone(),
            profile.clone(),
            target,
            properties,
        )))
    }
}

/// An ffmpeg process encoding a producer's range to image files.
pub struct FfmpegConsumer {
    ffmpeg: PathBuf,
    profile: Profile,
    target: ConsumerTarget,
    properties: Properties,
    link: Option<ProducerLink>,
    child: Option<Arc<Mutex<Child>>>,
    worker: Option<JoinHandle<ConsumerExit>>,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    events: Option<Sender<ConsumerEvent>>,
}

impl FfmpegConsumer {
    pub fn new(
        ffmpeg: PathBuf,
        profile: Profile,
        target: ConsumerTarget,
        properties: Properties,
    ) -> Self {
        Self {
            ffmpeg,
            profile,
            target,
            properties,
            link: None,
            child: None,
            worker: None,
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            events: None,
        }
    }

    fn join_worker(&mut self) -> ConsumerExit {
        self.child = None;
        match self.worker.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| ConsumerExit {
                success: false,
                stopped: false,
                frames_written: 0,
                detail: "ffmpeg progress reader panicked".to_string(),
            }),
            None => ConsumerExit {
                success: true,
                stopped: true,
                frames_written: 0,
                detail: String::new(),
            },
        }
    }
}

impl Consumer for FfmpegConsumer {
    fn driver(&self) -> &str {
        "avformat"
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
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.worker.is_some() {
            // Reap the previous run before reusing the consumer.
            self.join_worker();
        }
        let link = self
            .link
            .clone()
            .ok_or_else(|| ClipframeError::engine("Consumer started without a producer"))?;

        if let Some(parent) = self.target.path().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let args = build_encode_args(&link, &self.profile, &self.target, &self.properties);
        tracing::debug!(args = ?args, "Running ffmpeg");

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ClipframeError::engine(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = child.id(),
            output = %self.target.path().display(),
            frames = link.length,
            "ffmpeg consumer started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClipframeError::engine("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClipframeError::engine("Failed to capture ffmpeg stderr"))?;

        let child = Arc::new(Mutex::new(child));
        self.stop_requested.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let worker = ProgressWorker {
            child: Arc::clone(&child),
            link,
            running: Arc::clone(&self.running),
            stop_requested: Arc::clone(&self.stop_requested),
            events: self.events.clone(),
        };
        self.worker = Some(std::thread::spawn(move || worker.run(stdout, stderr)));
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> ClipframeResult<()> {
        let Some(child) = self.child.as_ref() else {
            return Ok(());
        };
        if self.running.load(Ordering::SeqCst) {
            self.stop_requested.store(true, Ordering::SeqCst);
            let mut guard = child.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = guard.kill() {
                tracing::debug!(error = %e, "ffmpeg already exited");
            }
        }
        let exit = self.join_worker();
        tracing::info!(frames = exit.frames_written, "ffmpeg consumer stopped");
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    fn run(&mut self) -> ClipframeResult<ConsumerExit> {
        self.start()?;
        let exit = self.join_worker();
        if !exit.success {
            return Err(ClipframeError::engine(format!(
                "ffmpeg failed writing {}: {}",
                self.target.path().display(),
                exit.detail
            )));
        }
        Ok(exit)
    }

    fn subscribe(&mut self, events: Sender<ConsumerEvent>) {
        self.events = Some(events);
    }

    fn signals_completion(&self) -> bool {
        true
    }
}

impl Drop for FfmpegConsumer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct ProgressWorker {
    child: Arc<Mutex<Child>>,
    link: ProducerLink,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    events: Option<Sender<ConsumerEvent>>,
}

impl ProgressWorker {
    fn run(
        self,
        stdout: std::process::ChildStdout,
        stderr: std::process::ChildStderr,
    ) -> ConsumerExit {
        // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut progress = ProgressState::default();
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed reading ffmpeg progress");
                    break;
                }
            }
            if let Some((key, value)) = line.trim().split_once('=') {
                if progress.update(key, value) {
                    self.link.playhead.seek(progress.frames);
                }
            }
        }

        let status = loop {
            let polled = {
                let mut guard = self.child.lock().unwrap_or_else(|e| e.into_inner());
                guard.try_wait()
            };
            match polled {
                Ok(Some(status)) => break Some(status),
                Ok(None) => std::thread::sleep(EXIT_POLL_INTERVAL),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to wait on ffmpeg");
                    break None;
                }
            }
        };

        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        let stopped = self.stop_requested.load(Ordering::SeqCst);
        let success = status.is_some_and(|s| s.success());
        let exit = ConsumerExit {
            success: success && !stopped,
            stopped,
            frames_written: progress.frames,
            detail: if success {
                String::new()
            } else {
                match status {
                    Some(s) => format!("status {s}: {}", stderr_output.trim()),
                    None => stderr_output.trim().to_string(),
                }
            },
        };

        if exit.success {
            tracing::debug!(frames = exit.frames_written, "ffmpeg finished");
        } else if !stopped {
            tracing::warn!(detail = %exit.detail, "ffmpeg exited with failure");
        }

        self.running.store(false, Ordering::SeqCst);
        if let Some(events) = &self.events {
            let _ = events.send(ConsumerEvent::Finished(exit.clone()));
        }
        exit
    }
}

/// Subset of ffmpeg's `-progress` key/value stream.
#[derive(Debug, Default)]
struct ProgressState {
    frames: i64,
    complete: bool,
}

impl ProgressState {
    /// Apply one `key=value` pair. Returns true when the frame count moved.
    fn update(&mut self, key: &str, value: &str) -> bool {
        match key {
            "frame" => match value.trim().parse::<i64>() {
                Ok(frames) if frames > self.frames => {
                    self.frames = frames;
                    true
                }
                _ => false,
            },
            "progress" => {
                self.complete = value.trim() == "end";
                false
            }
            _ => false,
        }
    }
}

fn ffmpeg_scale_flags(mode: Rescale) -> &'static str {
    match mode {
        Rescale::Nearest => "neighbor",
        Rescale::Bilinear => "bilinear",
        Rescale::Bicubic => "bicubic",
        Rescale::Hyper => "lanczos",
    }
}

fn scale_filter(width: u32, height: u32, mode: Rescale, deinterlace: bool) -> String {
    let scale = format!("scale={width}:{height}:flags={}", ffmpeg_scale_flags(mode));
    if deinterlace {
        format!("yadif,{scale}")
    } else {
        scale
    }
}

fn build_encode_args(
    link: &ProducerLink,
    profile: &Profile,
    target: &ConsumerTarget,
    properties: &Properties,
) -> Vec<String> {
    let start_secs = link.frame_to_secs(link.range_start);
    let rescale = properties.rescale_mode().unwrap_or_default();
    let scale = scale_filter(
        profile.width,
        profile.height,
        rescale,
        properties.get_flag(Properties::PROGRESSIVE) && !link.info.progressive,
    );
    // Resample to the rate the range is counted in so `-frames:v` covers it.
    let filter = format!("fps={},{scale}", link.frame_rate);
    let frames = match target {
        ConsumerTarget::ImageFile(_) => 1,
        ConsumerTarget::ImageSequence(_) => link.length.max(1),
    };

    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-nostats".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-ss".to_string(),
        format!("{start_secs:.6}"),
        "-i".to_string(),
        link.source.to_string_lossy().into_owned(),
        "-an".to_string(),
        "-frames:v".to_string(),
        frames.to_string(),
        "-vf".to_string(),
        filter,
        "-c:v".to_string(),
        properties
            .get(Properties::VCODEC)
            .unwrap_or("png")
            .to_string(),
    ];
    match target {
        ConsumerTarget::ImageFile(_) => {
            args.extend(["-update".to_string(), "1".to_string()]);
        }
        ConsumerTarget::ImageSequence(_) => {
            args.extend([
                "-start_number".to_string(),
                "1".to_string(),
                "-f".to_string(),
                "image2".to_string(),
            ]);
        }
    }
    args.push(target.path().to_string_lossy().into_owned());
    args
}

/// Whether `binary -version` runs and exits successfully.
pub fn command_exists(binary: &Path) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    sample_aspect_ratio: Option<String>,
    field_order: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Turn ffprobe's JSON report into [`MediaInfo`].
fn parse_probe_output(raw: &str) -> ClipframeResult<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(raw)?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| ClipframeError::engine("no video stream"))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(ClipframeError::engine("video stream has no frame size")),
    };

    let frame_rate = [stream.r_frame_rate.as_deref(), stream.avg_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .filter_map(Rational::parse)
        .find(|r| r.num > 0)
        .ok_or_else(|| ClipframeError::engine("video stream has no frame rate"))?;

    let sample_aspect = stream
        .sample_aspect_ratio
        .as_deref()
        .and_then(Rational::parse)
        .filter(|r| r.num > 0)
        .unwrap_or(Rational::ONE);

    let progressive = !matches!(
        stream.field_order.as_deref(),
        Some("tt" | "bb" | "tb" | "bt")
    );

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|&n| n > 0);

    let duration_secs = stream
        .duration
        .as_deref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .or_else(|| frame_count.map(|n| n as f64 / frame_rate.as_f64()))
        .ok_or_else(|| ClipframeError::engine("clip has no duration"))?;

    Ok(MediaInfo {
        width,
        height,
        frame_rate,
        sample_aspect,
        progressive,
        duration_secs,
        frame_count,
    })
}
