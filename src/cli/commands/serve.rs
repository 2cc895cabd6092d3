//! Server command.

use console::style;

use crate::config::Settings;

/// Start the queue server and its background workers.
pub async fn cmd_serve(settings: &Settings, bind: Option<&str>) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    if let Some(bind) = bind {
        settings.bind_addr = parse_bind_address(bind);
    }

    if settings.api_key.is_none() {
        println!(
            "{} No API key configured; launches will fail until PHANTOMBUSTER_API_KEY is set",
            style("!").yellow()
        );
    }
    match settings.webhook_url() {
        Some(url) => println!("  Webhook callback: {}", url),
        None => println!(
            "{} No webhook base URL configured; completion relies on status polling alone",
            style("!").yellow()
        ),
    }

    println!(
        "{} Starting queue server at http://{}",
        style("→").cyan(),
        settings.bind_addr
    );
    println!("  Press Ctrl+C to stop");

    crate::server::serve(&settings).await
}

/// Parse a bind address that can be:
/// - Just a port: "8420" -> 127.0.0.1:8420
/// - Just a host: "0.0.0.0" -> 0.0.0.0:8420
/// - Host and port: "0.0.0.0:8420" -> 0.0.0.0:8420
fn parse_bind_address(bind: &str) -> String {
    // Try parsing as just a port number
    if let Ok(port) = bind.parse::<u16>() {
        return format!("127.0.0.1:{}", port);
    }

    // Try parsing as host:port
    if let Some((_, port_str)) = bind.rsplit_once(':') {
        if port_str.parse::<u16>().is_ok() {
            return bind.to_string();
        }
    }

    // Must be just a host, use default port
    format!("{}:8420", bind)
}
