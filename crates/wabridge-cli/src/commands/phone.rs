//! Phone command.

use wabridge_core::{Config, PhoneNormalizer};

/// Print the normalized number and canonical key for `raw`.
pub fn run(config: &Config, raw: &str) -> anyhow::Result<()> {
    let normalizer = PhoneNormalizer::from_config(&config.phone)?;

    println!("Input:      {}", raw);
    println!("Normalized: {}", normalizer.normalize(raw));
    println!("Key:        {}", normalizer.canonical_key(raw));

    let rules = normalizer.ruleset_fingerprint();
    if !rules.is_empty() {
        println!("Rules:      {}", rules);
    }
    Ok(())
}
