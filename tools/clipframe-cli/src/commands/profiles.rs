//! List the profile catalog.

use clipframe_common::config::AppConfig;

pub fn run(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let catalog = super::catalog(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(catalog.list())?);
        return Ok(());
    }

    for (index, profile) in catalog.list().iter().enumerate() {
        let marker = if index == catalog.default_index() { "*" } else { " " };
        println!(
            "{marker}{index:>3}  {:<18} {:>4}x{:<4} {:>9.3} fps  {}  {}",
            profile.name,
            profile.width,
            profile.height,
            profile.fps(),
            if profile.progressive { "p" } else { "i" },
            profile.description
        );
    }

    Ok(())
}
