//! Export a single frame.

use std::path::PathBuf;

use clipframe_common::config::AppConfig;
use clipframe_player::FrameWriter;

pub fn run(
    config: &AppConfig,
    clip: PathBuf,
    folder: PathBuf,
    frame: i64,
    profile: Option<String>,
) -> anyhow::Result<()> {
    let engine = super::engine(config);
    let profile = super::pick_profile(config, &engine, &clip, profile.as_deref())?;
    println!("Exporting frame {frame} of {} ({})", clip.display(), profile.name);

    let writer = FrameWriter::new(engine, profile, &clip)?;
    let written = writer.write_frame(&folder, frame)?;
    println!("Frame written: {}", written.display());

    Ok(())
}
