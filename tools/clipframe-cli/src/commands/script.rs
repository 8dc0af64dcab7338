//! Run a G'MIC script over a folder of frames.

use std::io::Write;
use std::path::PathBuf;

use clipframe_common::config::AppConfig;
use clipframe_player::{ScriptJob, ScriptRenderer};

pub async fn run(
    config: AppConfig,
    input: PathBuf,
    output: PathBuf,
    prefix: String,
    script: String,
) -> anyhow::Result<()> {
    let job = ScriptJob {
        user_script: script,
        input_folder: input,
        output_folder: output,
        frame_name: prefix,
    };
    let renderer = ScriptRenderer::new(job, &config);
    let (frames, skipped) = renderer.plan()?;

    println!(
        "Rendering {} frames from {}",
        frames.len(),
        renderer.job().input_folder.display()
    );
    println!("  Script: {}", renderer.job().user_script);
    println!("  Output: {}", renderer.job().output_folder.display());
    if !skipped.is_empty() {
        println!("  Skipping {} file(s) without a frame number", skipped.len());
    }
    println!("Press Ctrl+C to abort...");

    let cancel = renderer.cancel_token();
    let total = frames.len();

    let task = tokio::task::spawn_blocking(move || {
        renderer.write_frames(
            |done| {
                print!("\r  Progress: {done}/{total} frames  ");
                let _ = std::io::stdout().flush();
            },
            |preview| {
                println!(
                    "\r  First frame: {} ({})",
                    if preview.success { "ok" } else { "failed" },
                    preview.log_path.display()
                );
                for line in preview.log.lines() {
                    println!("    {line}");
                }
            },
        )
    });
    tokio::pin!(task);

    let summary = tokio::select! {
        joined = &mut task => joined??,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            println!("\n  Aborting after the current frame...");
            task.await??
        }
    };

    println!();
    if summary.aborted {
        println!("Script render aborted after {} frames", summary.processed);
    } else {
        println!(
            "Script render complete: {} frames in {:.1}s",
            summary.processed,
            summary.elapsed.as_secs_f64()
        );
    }
    for failure in &summary.failed {
        println!(
            "  [FAILED] {} ({})",
            failure.input.display(),
            failure.reason
        );
    }

    Ok(())
}
