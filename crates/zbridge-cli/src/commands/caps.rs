//! Caps command - list version-dependent features

use anyhow::{Context, Result};
use serde::Serialize;
use zbridge::{Bridge, Feature, Version};
use zbridge_config::BridgeConfig;

#[derive(Debug, Serialize)]
struct CapsReport {
    backend: &'static str,
    version: Version,
    features: Vec<FeatureReport>,
}

#[derive(Debug, Serialize)]
struct FeatureReport {
    feature: Feature,
    since: Version,
    supported: bool,
}

pub fn run(config: &BridgeConfig, json: bool) -> Result<()> {
    let bridge = Bridge::from_config(config).context("Failed to open the messaging library")?;
    let session = bridge.session();
    let caps = session.capabilities();

    let report = CapsReport {
        backend: session.transport().backend(),
        version: caps.version(),
        features: Feature::ALL
            .iter()
            .map(|feature| FeatureReport {
                feature: *feature,
                since: feature.since(),
                supported: caps.supports(*feature),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} backend, library {}", report.backend, report.version);
    for entry in &report.features {
        let mark = if entry.supported { "yes" } else { "no" };
        println!("  {:<16} {:<4} (since {})", format!("{:?}", entry.feature), mark, entry.since);
    }
    Ok(())
}
