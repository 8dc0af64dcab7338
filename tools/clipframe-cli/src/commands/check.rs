//! Check external tool availability.

use clipframe_common::config::AppConfig;
use clipframe_engine::command_exists;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Clipframe System Check");
    println!("{}", "=".repeat(50));

    let tools = [
        ("ffmpeg", &config.tools.ffmpeg, "frame, range and preview export"),
        ("ffprobe", &config.tools.ffprobe, "clip inspection"),
        ("gmic", &config.tools.gmic, "script rendering"),
    ];

    let mut missing = 0;
    for (name, path, used_for) in tools {
        if command_exists(path) {
            println!("[OK] {name}: {}", path.display());
        } else {
            missing += 1;
            println!("[MISSING] {name}: {} (needed for {used_for})", path.display());
        }
    }

    println!();
    println!("Cache directory: {}", config.cache_dir.display());
    println!(
        "Config file: {}",
        clipframe_common::config::config_file_path().display()
    );

    println!();
    if missing == 0 {
        println!("All tools are available. Clipframe is ready.");
    } else {
        println!("{missing} tool(s) missing. Install them or set their paths in the config file.");
    }

    Ok(())
}
