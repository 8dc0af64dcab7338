//! Show clip properties and the closest profile.

use std::path::PathBuf;

use clipframe_common::config::AppConfig;
use clipframe_player::ProfileResolver;

pub fn run(config: &AppConfig, clip: PathBuf, json: bool) -> anyhow::Result<()> {
    let engine = super::engine(config);
    let resolver = ProfileResolver::new(engine, super::catalog(config)?);
    let resolved = resolver
        .resolve(&clip)
        .map_err(|e| anyhow::anyhow!("Failed to probe clip: {e}"))?;

    if json {
        let value = serde_json::json!({
            "clip": clip,
            "info": resolved.info,
            "profile_index": resolved.index,
            "profile": resolved.profile,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let info = &resolved.info;
    println!("Clip: {}", clip.display());
    println!(
        "  Resolution: {}x{} @ {} fps ({:.3})",
        info.width,
        info.height,
        info.frame_rate,
        info.frame_rate.as_f64()
    );
    println!("  Sample aspect: {}", info.sample_aspect);
    println!(
        "  Scan: {}",
        if info.progressive { "progressive" } else { "interlaced" }
    );
    println!("  Duration: {:.2}s", info.duration_secs);
    if let Some(frames) = info.frame_count {
        println!("  Frames: {frames}");
    }
    println!();
    println!(
        "Profile: [{}] {} ({})",
        resolved.index, resolved.profile.name, resolved.profile.description
    );
    println!("  Length: {} frames", info.length_in(&resolved.profile));

    Ok(())
}
