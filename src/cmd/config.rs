//! `patchsmith config`: show the resolved configuration.

use std::path::Path;

use anyhow::{Context, Result};

use patchsmith::config::{Credentials, DEFAULT_CONFIG_PATH, ServiceConfig};

pub fn cmd_config(config: &ServiceConfig, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    println!();
    println!("Patchsmith Configuration");
    println!("========================");
    println!();
    if path.exists() {
        println!("Config file: {}", path.display());
    } else {
        println!("Config file: {} (not found, using defaults)", path.display());
    }
    println!();

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);

    println!("[credentials]");
    let credentials = Credentials::from_env();
    println!("  OPENAI_API_KEY  = {}", set_or_unset(&credentials.openai_api_key));
    println!("  GITHUB_TOKEN    = {}", set_or_unset(&credentials.github_token));
    println!(
        "  GITHUB_USERNAME = {}",
        credentials.github_username.as_deref().unwrap_or("<unset>")
    );
    println!(
        "  GITHUB_EMAIL    = {}",
        credentials.github_email.as_deref().unwrap_or("<unset>")
    );
    println!();

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("Configuration is valid.");
    } else {
        println!("Warnings:");
        for warning in warnings {
            println!("  - {}", warning);
        }
    }
    Ok(())
}

fn set_or_unset(value: &Option<String>) -> &'static str {
    if value.is_some() { "<set>" } else { "<unset>" }
}
