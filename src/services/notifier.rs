use crate::config::{Config, MessagingTarget};
use crate::error::UpstreamError;
use log::{error, info};
use reqwest::multipart::{Form, Part};
use std::path::Path;

/// Delivers the run's artifacts (log file, snapshot) to every configured
/// messaging service. Always best-effort: failures are logged, never fatal,
/// and an unconfigured service is skipped.
pub async fn deliver_artifacts(config: &Config, caption: &str, files: &[&Path]) {
    match &config.telegram {
        Some(target) => {
            for file in files {
                match send_telegram_document(target, caption, file).await {
                    Ok(()) => info!("Sent {} to Telegram", file.display()),
                    Err(e) => error!("Error sending {} to Telegram: {}", file.display(), e),
                }
            }
        }
        None => info!("Telegram delivery not configured, skipping."),
    }

    match &config.discord {
        Some(target) => {
            for file in files {
                match send_discord_file(target, caption, file).await {
                    Ok(()) => info!("Sent {} to Discord", file.display()),
                    Err(e) => error!("Error sending {} to Discord: {}", file.display(), e),
                }
            }
        }
        None => info!("Discord delivery not configured, skipping."),
    }
}

async fn read_attachment(path: &Path, url: &str) -> Result<(Vec<u8>, String), UpstreamError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| UpstreamError::Response {
            url: url.to_string(),
            detail: format!("cannot read {}: {e}", path.display()),
        })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("artifact")
        .to_string();
    Ok((bytes, file_name))
}

async fn send_telegram_document(
    target: &MessagingTarget,
    caption: &str,
    path: &Path,
) -> Result<(), UpstreamError> {
    // Keep the bot token out of every error path; these lines end up in the
    // delivered log file.
    let logged_url = "https://api.telegram.org/bot<redacted>/sendDocument";
    let url = format!("https://api.telegram.org/bot{}/sendDocument", target.token);

    let (bytes, file_name) = read_attachment(path, logged_url).await?;
    let form = Form::new()
        .text("chat_id", target.channel_id.clone())
        .text("caption", caption.to_string())
        .part("document", Part::bytes(bytes).file_name(file_name));

    let response = reqwest::Client::new()
        .post(&url)
        .multipart(form)
        .send()
        .await
        .map_err(|source| UpstreamError::Http {
            url: logged_url.to_string(),
            source,
        })?;
    if !response.status().is_success() {
        return Err(UpstreamError::Response {
            url: logged_url.to_string(),
            detail: format!("status {}", response.status()),
        });
    }
    Ok(())
}

async fn send_discord_file(
    target: &MessagingTarget,
    caption: &str,
    path: &Path,
) -> Result<(), UpstreamError> {
    let url = format!(
        "https://discord.com/api/v10/channels/{}/messages",
        target.channel_id
    );

    let (bytes, file_name) = read_attachment(path, &url).await?;
    let form = Form::new()
        .text(
            "payload_json",
            serde_json::json!({ "content": caption }).to_string(),
        )
        .part("files[0]", Part::bytes(bytes).file_name(file_name));

    let response = reqwest::Client::new()
        .post(&url)
        .header("Authorization", format!("Bot {}", target.token))
        .multipart(form)
        .send()
        .await
        .map_err(|source| UpstreamError::Http {
            url: url.clone(),
            source,
        })?;
    if !response.status().is_success() {
        return Err(UpstreamError::Response {
            url,
            detail: format!("status {}", response.status()),
        });
    }
    Ok(())
}
