//! Deferred command-execution pipeline.
//!
//! Runs after the triggering request has already been acknowledged: resolve
//! an image source, upload it, derive the captioned view, republish it to
//! the origin channel, promote it to a public link when possible, annotate
//! the message, and destroy the temporary asset. Every step may fail; the
//! single catch boundary reports terminal failures through the command's
//! response_url webhook.

use anyhow::{Context, Result};
use rand::seq::IndexedRandom;
use regex::Regex;
use thiserror::Error;

use lgtm_api::{ApiError, AssetClient, ImageSearchClient, JsonApiInvoker, UploadOptions};
use lgtm_slack::{ChatFileRecord, SlackApiClient, SlackApiError, SlackWebhook, WebhookMessage};

use crate::command::{generic_failure_text, invite_instruction_text, SlashCommand};

/// Matches HTTP/HTTPS/FTP URL literals embedded in command text.
const URL_LITERAL_PATTERN: &str = r"((https?|ftp)(://[-_.!~*'()a-zA-Z0-9;/?:@&=+$,%#]+))";

/// Incoming transformation applied at upload time.
const UPLOAD_TRANSFORMATION: &str = "c_limit,h_400,w_400";

/// Neutral band color used when color extraction was unavailable.
const FALLBACK_COLOR: &str = "ffffff";

#[derive(Debug, Error)]
/// Failure taxonomy of a pipeline run.
pub enum PipelineError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    /// Keyword search returned no candidates; handled locally as a pipeline
    /// failure, never an index panic.
    #[error("image search returned no candidates")]
    EmptySearchResults,
}

/// Orchestrates one slash command through the full lifecycle. Owns no
/// shared mutable state; each run works on values it created itself.
pub struct CommandPipeline {
    asset: AssetClient,
    search: ImageSearchClient,
    bot: SlackApiClient,
    user: SlackApiClient,
    fetcher: JsonApiInvoker,
    url_pattern: Regex,
    webhook_timeout_ms: u64,
}

impl CommandPipeline {
    pub fn new(
        asset: AssetClient,
        search: ImageSearchClient,
        bot: SlackApiClient,
        user: SlackApiClient,
        request_timeout_ms: u64,
    ) -> Result<Self> {
        let fetcher = JsonApiInvoker::new(request_timeout_ms)
            .context("failed to create image fetcher")?;
        let url_pattern =
            Regex::new(URL_LITERAL_PATTERN).context("invalid url literal pattern")?;
        Ok(Self {
            asset,
            search,
            bot,
            user,
            fetcher,
            url_pattern,
            webhook_timeout_ms: request_timeout_ms,
        })
    }

    /// Runs the pipeline to its terminal state. Success is silent; failure
    /// is reported through the command's response_url. Never propagates an
    /// error past this boundary.
    pub async fn execute(&self, command: &SlashCommand, locale: Option<&str>) {
        if let Err(error) = self.run(command, locale).await {
            self.report_failure(command, error).await;
        }
    }

    async fn run(&self, command: &SlashCommand, locale: Option<&str>) -> Result<(), PipelineError> {
        // ResolvingSource
        let source_url = self.resolve_source(command, locale).await?;

        // Uploading
        let record = self
            .asset
            .upload(
                &source_url,
                &UploadOptions {
                    transformation: Some(UPLOAD_TRANSFORMATION.to_string()),
                    colors: true,
                },
            )
            .await?;

        // Transforming: the decorated view is computed by the delivery host
        // and never stored separately.
        let band_color = record
            .dominant_color()
            .map(complementary_color)
            .unwrap_or_else(|| FALLBACK_COLOR.to_string());
        let decorated_url = self.asset.delivery_url(
            &caption_transformation(&band_color),
            &record.public_id,
            &record.format,
        );

        // Publishing
        let bytes = self.fetcher.fetch_bytes(&decorated_url).await?;
        let filename = record
            .original_filename
            .clone()
            .unwrap_or_else(|| record.public_id.clone());
        let file = self
            .bot
            .files_upload(
                &command.channel_id,
                bytes,
                &filename,
                &record.format,
                &format!("Source: {source_url}"),
                &format!("![LGTM]({source_url})"),
            )
            .await?;
        let share_ts = file
            .share_ts(&command.channel_id)
            .ok_or_else(|| SlackApiError::InvalidResponse {
                method: "files.upload".to_string(),
                message: format!("missing share timestamp for {}", command.channel_id),
            })?
            .to_string();
        let private_url =
            file.url_private
                .clone()
                .ok_or_else(|| SlackApiError::InvalidResponse {
                    method: "files.upload".to_string(),
                    message: "missing url_private".to_string(),
                })?;

        // Promoting: best-effort, never aborts the pipeline.
        let link = self.promote(&file).await.unwrap_or(private_url);

        // Annotating
        self.bot
            .chat_update(&command.channel_id, &share_ts, &format!("![LGTM]({link})"))
            .await?;

        // CleaningUp: the temporary asset must not outlive the run.
        self.asset.destroy(&record.public_id).await?;
        Ok(())
    }

    /// A URL literal in the command text wins; otherwise search once and
    /// pick one candidate uniformly at random.
    async fn resolve_source(
        &self,
        command: &SlashCommand,
        locale: Option<&str>,
    ) -> Result<String, PipelineError> {
        if let Some(found) = self.url_pattern.find(&command.text) {
            return Ok(found.as_str().to_string());
        }
        let candidates = self.search.search(&command.text, locale, 1).await?;
        let candidate = candidates
            .choose(&mut rand::rng())
            .ok_or(PipelineError::EmptySearchResults)?;
        Ok(candidate.link.clone())
    }

    async fn promote(&self, file: &ChatFileRecord) -> Option<String> {
        match self.user.files_shared_public_url(&file.id).await {
            Ok(promoted) => {
                let url = promoted.public_file_url();
                if url.is_none() {
                    tracing::warn!(file = %file.id, "public link response missing fields");
                }
                url
            }
            Err(error) => {
                tracing::warn!(file = %file.id, "public link promotion failed: {error}");
                None
            }
        }
    }

    /// The single user-visible failure path. Always uses the response_url
    /// webhook; the original request/response cycle has long completed.
    async fn report_failure(&self, command: &SlashCommand, error: PipelineError) {
        let message = match &error {
            PipelineError::Slack(SlackApiError::NotInChannel) => {
                match self.bot.auth_test().await {
                    Ok(identity) => WebhookMessage::ephemeral(invite_instruction_text(
                        &identity.user_id,
                        &command.channel_name,
                    )),
                    Err(lookup_error) => {
                        tracing::warn!(
                            "bot identity lookup failed while reporting: {lookup_error}"
                        );
                        WebhookMessage::ephemeral(generic_failure_text())
                    }
                }
            }
            _ => {
                tracing::error!(
                    command = %command.command,
                    channel = %command.channel_id,
                    detail = ?error,
                    "command pipeline failed: {error}"
                );
                WebhookMessage::ephemeral(generic_failure_text())
            }
        };

        let webhook = match SlackWebhook::new(&command.response_url, self.webhook_timeout_ms) {
            Ok(webhook) => webhook,
            Err(build_error) => {
                tracing::error!("failure webhook could not be built: {build_error}");
                return;
            }
        };
        if let Err(notify_error) = webhook.notify(&message).await {
            tracing::error!("failure notification was not delivered: {notify_error}");
        }
    }
}

/// Caption chain layered onto the uploaded asset: the LGTM headline plus a
/// subtitle band in the computed complementary color.
fn caption_transformation(band_color: &str) -> String {
    format!(
        "co_rgb:ffff,l_text:Helvetica_70_bold_underline_letter_spacing_30:LGTM/co_gray,e_shadow,x_5,y_5/fl_layer_apply/g_center,y_50,co_rgb:{band_color},l_text:arial_25:Looks%20good%20to%20me,o_90"
    )
}

/// Complement of a `#rrggbb` color: each channel maps to
/// `max(R,G,B) + min(R,G,B) - channel`; achromatic input mirrors around the
/// gray axis so black and white swap. Malformed input falls back to the
/// neutral color instead of failing.
pub fn complementary_color(color: &str) -> String {
    let Some(rgb) = parse_rgb(color) else {
        return FALLBACK_COLOR.to_string();
    };
    let max = rgb.into_iter().max().unwrap_or(0);
    let min = rgb.into_iter().min().unwrap_or(0);
    if max == min {
        return rgb
            .into_iter()
            .map(|channel| format!("{:02x}", 0xff - u16::from(channel)))
            .collect();
    }
    let sum = u16::from(max) + u16::from(min);
    rgb.into_iter()
        .map(|channel| format!("{:02x}", (sum - u16::from(channel)) as u8))
        .collect()
}

fn parse_rgb(color: &str) -> Option<[u8; 3]> {
    let hex_part = color.strip_prefix('#')?;
    let decoded = hex::decode(hex_part).ok()?;
    <[u8; 3]>::try_from(decoded).ok()
}

#[cfg(test)]
mod tests;
