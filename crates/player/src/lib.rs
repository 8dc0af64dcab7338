//! Clipframe Player
//!
//! The preview and export components a clip editor builds on:
//!
//! - [`ProfileResolver`] picks the catalog profile closest to a clip.
//! - [`LivePlayer`] previews a clip with seeking, playback and marks.
//! - [`FrameWriter`] saves one frame as a PNG still.
//! - [`RangeWriter`] exports a marked range as a PNG sequence, with
//!   progress and cancellation.
//! - [`ScriptRenderer`] runs a G'MIC script over a folder of frames.

pub mod frame_writer;
pub mod live;
pub mod range_writer;
pub mod resolver;
pub mod script;

pub use frame_writer::FrameWriter;
pub use live::LivePlayer;
pub use range_writer::{RangeWriter, RenderCancel, RenderOutcome, RenderReport, RenderState};
pub use resolver::{ProfileResolver, ResolvedProfile};
pub use script::{CancelToken, ScriptJob, ScriptOutput, ScriptRenderSummary, ScriptRenderer};
