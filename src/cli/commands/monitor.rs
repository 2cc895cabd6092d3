//! Stuck-job monitor command.

use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::queue::SequentialQueue;
use crate::repository::AuditRepository;
use crate::services::{ExtractionLauncher, StuckJobMonitor};
use crate::store::RedisQueueStore;

/// Run the stuck-job sweep once or on an interval.
pub async fn cmd_monitor(settings: &Settings, once: bool) -> anyhow::Result<()> {
    let audit = Arc::new(AuditRepository::new(&settings.database_path)?);
    let store = Arc::new(RedisQueueStore::new(&settings.redis_url, settings.lock_ttl).await?);
    let launcher = Arc::new(ExtractionLauncher::new(settings.clone(), audit.clone()));
    let queue = Arc::new(SequentialQueue::new(store, launcher));
    let monitor = StuckJobMonitor::new(audit, queue, settings);

    if once {
        let reaped = monitor.sweep().await?;
        if reaped == 0 {
            println!("{} No stuck jobs", style("✓").green());
        } else {
            println!(
                "{} Failed {} stuck job(s) and advanced the queue",
                style("✓").green(),
                reaped
            );
        }
        return Ok(());
    }

    println!(
        "{} Sweeping for jobs stuck longer than {}s every {}s",
        style("→").cyan(),
        settings.stuck_timeout.as_secs(),
        settings.monitor_period.as_secs()
    );
    println!("  Press Ctrl+C to stop");
    monitor.run().await;

    Ok(())
}
