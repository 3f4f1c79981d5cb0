//! Operator commands working on one session's mappings.

use std::time::Duration;
use wabridge_bridge::InboundOutcome;
use wabridge_core::Config;
use wabridge_store::MappingStore;

use crate::runtime;

/// Print mapping counts.
pub async fn stats(config: &Config, session: &str) -> anyhow::Result<()> {
    let store = runtime::open_store(config).await?;
    let stats = store.stats(session).await?;

    println!("Session: {}", session);
    println!("  pending: {}", stats.pending);
    println!("  synced:  {}", stats.synced);
    println!("  failed:  {}", stats.failed);
    println!("  total:   {}", stats.total());
    Ok(())
}

/// Print failed mappings, most recent first.
pub async fn failed(config: &Config, session: &str, limit: usize) -> anyhow::Result<()> {
    let store = runtime::open_store(config).await?;
    let failed = store.list_failed(session, limit).await?;

    if failed.is_empty() {
        println!("No failed mappings for session {}", session);
        return Ok(());
    }
    for mapping in failed {
        println!(
            "{}  {}  {} {}  {}",
            mapping.id,
            mapping.updated_at.format("%Y-%m-%d %H:%M:%S"),
            mapping.direction,
            mapping.native_message_id,
            mapping.counterpart_phone
        );
    }
    Ok(())
}

/// Re-drive pending inbound mappings through the CRM.
pub async fn retry(config: &Config, session: &str, limit: usize) -> anyhow::Result<()> {
    if config.get_session(session).is_none() {
        anyhow::bail!("Session '{}' is not configured", session);
    }

    let engine = runtime::build_engine(config).await?;
    let report = engine.retry_pending(session, limit).await?;

    println!(
        "Processed {} pending mapping(s): {} synced, {} failed, {} claimed elsewhere",
        report.processed,
        report.synced(),
        report.failed,
        report.skipped
    );
    Ok(())
}

/// Deliver one failed inbound mapping again.
pub async fn resync(config: &Config, session: &str, mapping_id: &str) -> anyhow::Result<()> {
    if config.get_session(session).is_none() {
        anyhow::bail!("Session '{}' is not configured", session);
    }

    let engine = runtime::build_engine(config).await?;
    match engine.resync_failed(session, mapping_id).await? {
        InboundOutcome::Synced {
            mapping_id,
            remote_message_id,
            ..
        } => println!("Resynced as mapping {} (CRM message {})", mapping_id, remote_message_id),
        InboundOutcome::Duplicate => println!("Message already has a live mapping; nothing sent"),
        other => println!("Resync ended as {:?}", other),
    }
    Ok(())
}

/// Delete mappings older than `days`.
pub async fn cleanup(config: &Config, session: &str, days: u32) -> anyhow::Result<()> {
    if days == 0 {
        anyhow::bail!("Retention must be at least one day");
    }

    let store = runtime::open_store(config).await?;
    let age = Duration::from_secs(u64::from(days) * 24 * 60 * 60);
    let deleted = store.delete_older_than(session, age).await?;

    println!("Deleted {} mapping(s) older than {} day(s)", deleted, days);
    Ok(())
}
