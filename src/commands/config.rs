use anyhow::Result;
use occur_core::EngineConfig;
use owo_colors::OwoColorize;

pub fn run() -> Result<()> {
    let config_path = EngineConfig::config_path()?;

    if !config_path.exists() {
        EngineConfig::create_default_config(&config_path)?;
        println!("{} {}", "Created".green(), config_path.display());
    }

    let config = EngineConfig::load_from(&config_path)?;

    println!("{}", "Paths".bold());
    println!("  Config:  {}", config_path.display());
    println!();
    println!("{}", "Settings".bold());
    for line in config.to_toml()?.lines() {
        println!("  {line}");
    }

    Ok(())
}
