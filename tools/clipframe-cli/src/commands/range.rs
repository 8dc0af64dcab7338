//! Export a frame range as a PNG sequence.

use std::io::Write;
use std::path::PathBuf;

use clipframe_common::config::AppConfig;
use clipframe_player::{RangeWriter, RenderOutcome};

pub async fn run(
    config: AppConfig,
    clip: PathBuf,
    folder: PathBuf,
    prefix: String,
    mark_in: i64,
    mark_out: i64,
    profile: Option<String>,
) -> anyhow::Result<()> {
    let engine = super::engine(&config);
    let profile = super::pick_profile(&config, &engine, &clip, profile.as_deref())?;

    println!("Exporting frames {mark_in}..={mark_out} of {}", clip.display());
    println!("  Profile: {}", profile.name);
    println!(
        "  Output: {}",
        folder.join(format!("{prefix}_%04d.png")).display()
    );
    println!("Press Ctrl+C to abort...");

    let mut writer = RangeWriter::new(engine, profile, &clip, config.render.clone())?;
    let cancel = writer.cancel_handle();
    let total = mark_out - mark_in;

    let job = tokio::task::spawn_blocking(move || {
        writer.write_frames(&folder, &prefix, mark_in, mark_out, |done| {
            print!("\r  Progress: {done}/{total} frames  ");
            let _ = std::io::stdout().flush();
        })
    });
    tokio::pin!(job);

    let result = tokio::select! {
        joined = &mut job => joined?,
        _ = tokio::signal::ctrl_c() => {
            if cancel.cancel() {
                println!("\n  Aborting...");
            }
            job.await?
        }
    };

    match result {
        Ok(report) => match report.outcome {
            RenderOutcome::Finished => println!(
                "\nExport complete: {} frames in {:.1}s",
                report.frames + 1,
                report.elapsed.as_secs_f64()
            ),
            RenderOutcome::Aborted => {
                println!("\nExport aborted after {} frames", report.frames)
            }
        },
        Err(e) => {
            println!("\nExport failed: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}
