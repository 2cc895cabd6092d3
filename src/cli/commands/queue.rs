//! Queue commands: enqueue, advance, and the waiting-list surface.

use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::models::{CompletionKind, JobRequest};
use crate::queue::SequentialQueue;
use crate::repository::AuditRepository;
use crate::services::ExtractionLauncher;
use crate::store::RedisQueueStore;

/// Build the queue against the shared Redis store.
///
/// CLI commands run in their own process; admission stays correct because
/// every decision goes through the store's atomic operations.
async fn connect_queue(settings: &Settings) -> anyhow::Result<Arc<SequentialQueue>> {
    let audit = Arc::new(AuditRepository::new(&settings.database_path)?);
    let store = Arc::new(RedisQueueStore::new(&settings.redis_url, settings.lock_ttl).await?);
    let launcher = Arc::new(ExtractionLauncher::new(settings.clone(), audit));
    Ok(Arc::new(SequentialQueue::new(store, launcher)))
}

/// Request an extraction slot for a target.
pub async fn cmd_enqueue(
    settings: &Settings,
    target_id: &str,
    kind: Option<&str>,
    search_url: Option<&str>,
) -> anyhow::Result<()> {
    let queue = connect_queue(settings).await?;

    let mut request = JobRequest::new(target_id);
    if let Some(kind) = kind {
        request = request.with_kind(kind);
    }
    if let Some(url) = search_url {
        request = request.with_search_url(url);
    }

    let decision = queue.request_slot(request).await?;
    if decision.started {
        println!(
            "{} Extraction for '{}' started immediately",
            style("✓").green(),
            target_id
        );
    } else if let Some(position) = decision.position {
        let wait_mins = position as u64 * settings.average_run.as_secs() / 60;
        println!(
            "{} Queued '{}' at position {} (estimated wait ~{} min)",
            style("→").cyan(),
            target_id,
            position,
            wait_mins
        );
    } else {
        println!(
            "{} Launch failed; see `phantomq jobs --status failed` for the reason",
            style("✗").red()
        );
    }

    Ok(())
}

/// Release the current slot and promote the next waiting job.
pub async fn cmd_advance(settings: &Settings) -> anyhow::Result<()> {
    let queue = connect_queue(settings).await?;
    let next_started = queue.job_completed(None, CompletionKind::Manual).await?;

    if next_started {
        println!("{} Slot released, next job started", style("✓").green());
    } else {
        println!("{} Slot released, queue is empty", style("✓").green());
    }

    Ok(())
}

/// List waiting jobs in queue order.
pub async fn cmd_queue_list(settings: &Settings) -> anyhow::Result<()> {
    let queue = connect_queue(settings).await?;
    let waiting = queue.queue_contents().await?;

    if waiting.is_empty() {
        println!("{} Waiting list is empty", style("✓").green());
        return Ok(());
    }

    println!(
        "{:<4} {:<36} {:<24} {:<20} {}",
        "#", "JOB ID", "TARGET", "KIND", "ENQUEUED"
    );
    for (index, job) in waiting.iter().enumerate() {
        println!(
            "{:<4} {:<36} {:<24} {:<20} {}",
            index + 1,
            job.job_id,
            job.target_id,
            job.job_kind,
            job.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }

    Ok(())
}

/// Remove a waiting job by its queue-assigned id.
pub async fn cmd_queue_remove(settings: &Settings, job_id: &str) -> anyhow::Result<()> {
    let queue = connect_queue(settings).await?;

    if queue.remove_job(job_id).await? {
        println!("{} Removed job {}", style("✓").green(), job_id);
    } else {
        println!("{} No waiting job with id {}", style("!").yellow(), job_id);
    }

    Ok(())
}

/// Drop every waiting job. The running job is not affected.
pub async fn cmd_queue_clear(settings: &Settings, confirm: bool) -> anyhow::Result<()> {
    if !confirm {
        println!(
            "{} This will drop every waiting job. The running job is not affected.",
            style("!").yellow()
        );
        println!("  Use --confirm to proceed.");
        return Ok(());
    }

    let queue = connect_queue(settings).await?;
    let removed = queue.clear_queue().await?;

    println!("{} Cleared {} waiting job(s)", style("✓").green(), removed);

    Ok(())
}

/// Force-release the extraction lock without promoting the next job.
pub async fn cmd_release_lock(settings: &Settings, confirm: bool) -> anyhow::Result<()> {
    if !confirm {
        println!(
            "{} This drops the lock WITHOUT promoting the next job. Only use it when",
            style("!").yellow()
        );
        println!("  the holder process is gone; a running phantom will not be stopped.");
        println!("  Use --confirm to proceed.");
        return Ok(());
    }

    let queue = connect_queue(settings).await?;

    if queue.force_release_lock().await? {
        println!("{} Lock released", style("✓").green());
        println!("  Run `phantomq advance` to start the next waiting job.");
    } else {
        println!("{} Lock was not held", style("!").yellow());
    }

    Ok(())
}
