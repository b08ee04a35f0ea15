// UI layer: a simple interactive menu using `dialoguer`.
// The flows are small and synchronous; each one gathers input, calls the
// API client and prints the outcome. Checking that image files exist is a
// caller concern, so it happens here before anything reaches `api`.

use crate::api::{persist_base_url, settings_path, ApiClient, AuditRequest, AuditResponse, HealthStatus, ImageAttachment};
use crate::error::AuditError;
use anyhow::{Context, Result};
use crossterm::style::Stylize;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub fn print_banner() {
    let rule = "=".repeat(60);
    println!("{}", rule);
    println!("  {}", "Product Audit API - client".bold());
    println!("{}", rule);
    println!();
}

/// Probe the health endpoint and print the result. Returns whether the API
/// answered with a 2xx status.
pub fn report_health(api: &ApiClient) -> bool {
    let status = api.check_health();
    match &status {
        HealthStatus::Reachable { status: code, body, .. } if status.is_healthy() => {
            println!("{} ({})", "✅ API is up".green(), code);
            if !body.is_empty() {
                println!("   {}", body);
            }
        }
        HealthStatus::Reachable {
            status: code,
            body_error: Some(error),
            ..
        } => {
            println!(
                "{}",
                format!("❌ API answered with status {} but the body could not be read: {}", code, error).red()
            );
        }
        HealthStatus::Reachable { status: code, body, .. } => {
            println!("{}", format!("❌ API answered with status {}", code).red());
            if !body.is_empty() {
                println!("   {}", body);
            }
        }
        HealthStatus::Unreachable { error } => {
            println!("{}", format!("❌ Could not reach the API: {}", error).red());
            println!("   Make sure it is running at {}", api.config().base_url);
        }
    }
    status.is_healthy()
}

/// Main interactive menu. Runs a select loop until the user chooses "Exit".
pub fn main_menu(mut api: ApiClient) -> Result<()> {
    loop {
        let items = vec!["Check API health", "Submit product audit", "Change API URL", "Exit"];
        // `Select` shows a keyboard-navigable list in the terminal.
        let selection = Select::new().items(&items).default(1).interact()?;
        match selection {
            0 => {
                report_health(&api);
            }
            1 => handle_submit(&api)?,
            2 => {
                // The new client replaces the old one for the rest of the session.
                api = handle_change_url(&api)?;
            }
            3 => break,
            _ => {}
        }
    }
    Ok(())
}

/// Collect product data and image paths, then send one audit.
fn handle_submit(api: &ApiClient) -> Result<()> {
    let request_id: i64 = Input::new().with_prompt("Request id").interact_text()?;
    let description: String = Input::new().with_prompt("Product description").interact_text()?;
    let barcodes: String = Input::new()
        .with_prompt("Barcodes (comma separated)")
        .allow_empty(true)
        .interact_text()?;
    // Order matters to the backend: front image first, then back, then extras.
    let paths: String = Input::new()
        .with_prompt("Image paths, front first (comma separated)")
        .interact_text()?;

    let request = split_list(&barcodes)
        .into_iter()
        .fold(AuditRequest::new(request_id, description), |req, code| req.with_barcode(code));
    if let Err(e) = request.validate() {
        println!("{}", format!("❌ {}", e).red());
        return Ok(());
    }

    let (found, missing) = partition_existing(split_list(&paths).into_iter().map(PathBuf::from));
    for path in &missing {
        warn!(path = %path.display(), "Image not found, skipping");
        println!("{}", format!("⚠ Skipping missing image: {}", path.display()).yellow());
    }
    if found.is_empty() {
        println!("{}", "❌ No images found, nothing to send.".red());
        return Ok(());
    }

    let mut attachments = Vec::with_capacity(found.len());
    for path in &found {
        match ImageAttachment::from_path(path) {
            Ok(att) => attachments.push(att),
            Err(e) => {
                println!("{}", format!("❌ {}", e).red());
                return Ok(());
            }
        }
    }

    let go = Confirm::new()
        .with_prompt(format!("Send audit with {} image(s)?", attachments.len()))
        .default(true)
        .interact()?;
    if !go {
        // Dropping the attachments here closes the opened files.
        return Ok(());
    }

    let spinner = spinner("Sending audit...")?;
    let result = api.send_audit(&request, attachments);
    spinner.finish_and_clear();

    match result {
        Ok(resp) => print_response(&resp)?,
        Err(e) => print_failure(api, &e),
    }
    Ok(())
}

/// Ask for a new base URL, persist it and return a client that uses it.
fn handle_change_url(api: &ApiClient) -> Result<ApiClient> {
    let url: String = Input::new()
        .with_prompt("API base URL")
        .with_initial_text(api.config().base_url.clone())
        .interact_text()?;
    let config = api.config().clone().with_base_url(url);
    let new_api = ApiClient::new(config).context("Failed to rebuild API client")?;
    persist_base_url(&new_api.config().base_url).context("Failed to save API URL")?;
    println!("Saved {} to {}", new_api.config().base_url, settings_path().display());
    Ok(new_api)
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn print_response(resp: &AuditResponse) -> Result<()> {
    println!("{}\n", "✅ Audit completed".green());
    if let Some(summary) = resp.summary() {
        if let Some(verdict) = &summary.verdict {
            let status = verdict.status.as_deref().unwrap_or("?");
            println!("   Result: {}", status.bold());
            if let Some(reason) = &verdict.reason {
                println!("   Reason: {}", reason);
            }
        }
        if let Some(message) = &summary.message {
            println!("   Message: {}", message);
        }
        println!();
    }
    let pretty = serde_json::to_string_pretty(resp.as_json()).context("Formatting audit response")?;
    println!("{}", pretty);
    Ok(())
}

fn print_failure(api: &ApiClient, err: &AuditError) {
    warn!(error = %err, "Audit request failed");
    match err {
        AuditError::AuditRequestFailed { status, body } => {
            println!("{}", format!("❌ Error: {}", status).red());
            match server_message(body) {
                Some(message) => println!("   {}", message),
                None => println!("{}", body),
            }
        }
        e if e.is_timeout() => {
            println!(
                "{}",
                format!("❌ No answer within {}s", api.config().timeout.as_secs()).red()
            );
        }
        e => println!("{}", format!("❌ Request failed: {}", e).red()),
    }
}

/// The backend answers 400/500 with the same JSON shape as a successful
/// audit; pull its `mensagem` out when there is one.
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    AuditResponse(value).summary()?.message
}

/// Split a comma separated answer into trimmed, non-empty entries.
fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Separate paths that exist on disk from those that don't, keeping the
/// original order in both lists.
fn partition_existing<I>(paths: I) -> (Vec<PathBuf>, Vec<PathBuf>)
where
    I: IntoIterator<Item = PathBuf>,
{
    paths.into_iter().partition(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_reads_mensagem_from_error_bodies() {
        let body = r#"{"idSolicitacao":null,"resultado":null,"mensagem":"Erro de validação: Pelo menos uma imagem é obrigatória"}"#;
        assert_eq!(
            server_message(body).as_deref(),
            Some("Erro de validação: Pelo menos uma imagem é obrigatória")
        );
    }

    #[test]
    fn server_message_is_none_for_plain_or_unrelated_bodies() {
        assert_eq!(server_message("boom"), None);
        assert_eq!(server_message(r#"{"error":"gateway"}"#), None);
        assert_eq!(server_message("[1,2]"), None);
    }

    #[test]
    fn split_list_trims_and_drops_blanks() {
        assert_eq!(
            split_list(" 121313, ,789456123 ,"),
            vec!["121313".to_string(), "789456123".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn partition_keeps_order_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let frente = dir.path().join("frente.jpg");
        let verso = dir.path().join("verso.jpg");
        std::fs::write(&frente, b"f").unwrap();
        std::fs::write(&verso, b"v").unwrap();
        let lateral = dir.path().join("lateral1.jpg");

        let (found, missing) = partition_existing(vec![verso.clone(), lateral.clone(), frente.clone()]);
        assert_eq!(found, vec![verso, frente]);
        assert_eq!(missing, vec![lateral]);
    }
}
