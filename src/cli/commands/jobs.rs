//! Audit log listing command.

use console::style;

use crate::config::Settings;
use crate::models::ExtractionStatus;
use crate::repository::AuditRepository;

/// List extraction audit records, newest first.
pub async fn cmd_jobs(
    settings: &Settings,
    status: Option<&str>,
    limit: u32,
) -> anyhow::Result<()> {
    let status = match status {
        Some(s) => match ExtractionStatus::from_str(s) {
            Some(parsed) => Some(parsed),
            None => anyhow::bail!("unknown status '{}', expected pending, success, or failed", s),
        },
        None => None,
    };

    let audit = AuditRepository::new(&settings.database_path)?;
    let records = audit.list(None, status, limit)?;

    if records.is_empty() {
        println!("{} No matching records", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<10} {:<24} {:<9} {:<20} {:>8}  {}",
        "ID", "TARGET", "STATUS", "STARTED", "TOOK", "ERROR"
    );
    for record in &records {
        println!(
            "{:<10} {:<24} {:<9} {:<20} {:>8}  {}",
            short_id(&record.id),
            record.target_id,
            record.status.as_str(),
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            format_took(record.execution_time_ms),
            record.error_message.as_deref().unwrap_or(""),
        );
    }

    Ok(())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn format_took(ms: Option<i64>) -> String {
    match ms {
        Some(ms) => format!("{:.1}s", ms as f64 / 1000.0),
        None => "-".to_string(),
    }
}
