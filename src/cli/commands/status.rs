//! Status command for showing queue and audit state.

use std::io::{stdout, Write};

use chrono::Local;
use console::style;
use crossterm::{cursor, execute, terminal};

use crate::config::Settings;
use crate::models::JobDescriptor;
use crate::repository::AuditRepository;
use crate::store::{QueueStore, RedisQueueStore};

/// Show overall queue status.
pub async fn cmd_status(settings: &Settings, live: bool, interval: u64) -> anyhow::Result<()> {
    let audit = AuditRepository::new(&settings.database_path)?;
    let store = RedisQueueStore::new(&settings.redis_url, settings.lock_ttl).await?;

    if live {
        run_live_status(&store, &audit, interval).await
    } else {
        display_status(&store, &audit).await
    }
}

/// Display status once.
async fn display_status(store: &RedisQueueStore, audit: &AuditRepository) -> anyhow::Result<()> {
    let snapshot = store.snapshot().await?;
    let waiting = store.queue_contents().await?;
    let counts = audit.status_counts()?;

    let now = Local::now();
    let separator = "─".repeat(70);

    println!();
    println!(
        "{:<50} Last updated: {}",
        style("phantomq status").bold(),
        now.format("%Y-%m-%d %H:%M:%S")
    );
    println!("{}", separator);

    println!("{}", style("EXTRACTION SLOT").cyan().bold());
    match &snapshot.current_job {
        Some(job) => {
            println!("  {:<16} {}", "Running:", job.target_id);
            println!("  {:<16} {}", "Kind:", job.job_kind);
            if let Some(host) = &job.host {
                println!("  {:<16} {}", "Host:", host);
            }
            if let Some(container) = current_container(audit, job) {
                println!("  {:<16} {}", "Container:", container);
            }
            println!("  {:<16} {}", "Held for:", format_duration(job.age_secs()));
        }
        None => println!("  idle"),
    }
    println!();

    println!("{}", style("WAITING LIST").cyan().bold());
    if waiting.is_empty() {
        println!("  empty");
    } else {
        for (index, job) in waiting.iter().enumerate() {
            println!(
                "  {:>3}. {:<24} {:<20} queued {}",
                index + 1,
                truncate_string(&job.target_id, 24),
                job.job_kind,
                job.enqueued_at.with_timezone(&Local).format("%H:%M:%S"),
            );
        }
    }
    println!();

    println!("{}", style("AUDIT LOG").cyan().bold());
    println!("  {:<16} {:>8}", "Pending:", counts.pending);
    println!("  {:<16} {:>8}", "Success:", counts.success);
    println!("  {:<16} {:>8}", "Failed:", counts.failed);

    println!("{}", separator);

    Ok(())
}

/// Run status display in live mode with periodic refresh.
async fn run_live_status(
    store: &RedisQueueStore,
    audit: &AuditRepository,
    interval: u64,
) -> anyhow::Result<()> {
    let mut stdout = stdout();

    // Setup terminal
    execute!(stdout, terminal::Clear(terminal::ClearType::All))?;

    println!("Press Ctrl+C to exit\n");

    loop {
        // Move cursor to top
        execute!(stdout, cursor::MoveTo(0, 1))?;

        // Clear from cursor to end of screen
        execute!(stdout, terminal::Clear(terminal::ClearType::FromCursorDown))?;

        // Display status
        if let Err(e) = display_status(store, audit).await {
            eprintln!("{} Error: {}", style("✗").red(), e);
        }

        println!("\nPress Ctrl+C to exit");
        stdout.flush()?;

        // Wait for interval
        tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
    }
}

/// Container id for the slot holder, once its launch has stored one.
fn current_container(audit: &AuditRepository, job: &JobDescriptor) -> Option<String> {
    audit
        .latest_pending_with_container()
        .ok()
        .flatten()
        .filter(|record| record.job_id == job.job_id)
        .and_then(|record| record.container_id().map(str::to_string))
}

/// Format a second count as "4m 32s".
fn format_duration(secs: i64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// Truncate a string to max length with ellipsis.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(60), "1m 00s");
        assert_eq!(format_duration(272), "4m 32s");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 24), "short");
        assert_eq!(
            truncate_string("a-very-long-company-target-identifier", 24),
            "a-very-long-company-t..."
        );
    }
}
