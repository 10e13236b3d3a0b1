//! `ojsandbox config`: print the effective configuration.

use anyhow::{Context, Result};

use ojsandbox::config::Config;

/// Renders `config` as TOML.
pub fn render(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}

/// Prints the effective configuration, secret masked.
pub fn run(config: &Config) -> Result<()> {
    let mut shown = config.clone();
    shown.server.auth_secret = "********".to_string();
    print!("{}", render(&shown)?);
    Ok(())
}
