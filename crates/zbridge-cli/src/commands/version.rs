//! Version command - report the loaded messaging library

use anyhow::{Context, Result};
use zbridge::Bridge;
use zbridge_config::BridgeConfig;

pub fn run(config: &BridgeConfig) -> Result<()> {
    let bridge = Bridge::from_config(config).context("Failed to open the messaging library")?;
    let session = bridge.session();
    println!(
        "{} ({} backend)",
        session.capabilities().version(),
        session.transport().backend()
    );
    Ok(())
}
