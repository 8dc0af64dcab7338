//! Clipframe Engine
//!
//! The boundary between clipframe and the multimedia engine that actually
//! decodes and encodes pictures.
//!
//! # Model
//!
//! ```text
//!   clip.mov ──► Producer ──(ProducerLink)──► Consumer ──► display sink
//!                 │  playhead: position, speed        └──► frame<N>.png
//!                 │  range: in/out                    └──► prefix_%04d.png
//!                 └─ cut(in, out) ─► Producer
//! ```
//!
//! Producers are plain Rust values; only consumers and frame extraction
//! touch the engine. [`FfmpegEngine`] drives the `ffmpeg`/`ffprobe`
//! tools, and [`DisplayConsumer`] presents frames for interactive preview.

pub mod consumer;
pub mod display;
pub mod engine;
pub mod ffmpeg;
pub mod media;
pub mod producer;
pub mod profile;
pub mod properties;

pub use consumer::{Consumer, ConsumerEvent, ConsumerExit, ConsumerTarget};
pub use display::{DisplayConsumer, FrameSink};
pub use engine::{FrameSource, MediaEngine};
pub use ffmpeg::{command_exists, FfmpegEngine};
pub use media::{Frame, FrameRequest, MediaInfo, PixelFormat, Rational};
pub use producer::{Playhead, Producer, ProducerLink};
pub use profile::{Profile, ProfileCatalog};
pub use properties::{Properties, Rescale};
