//! End-to-end pipeline tests against mock asset, search, and chat servers.

use httpmock::prelude::*;
use regex::Regex;
use serde_json::json;

use lgtm_api::{AssetClient, AssetClientConfig, ImageSearchClient, ImageSearchConfig};
use lgtm_slack::SlackApiClient;

use super::{
    caption_transformation, complementary_color, CommandPipeline, URL_LITERAL_PATTERN,
};
use crate::command::{invite_instruction_text, SlashCommand};

struct PipelineHarness {
    asset: MockServer,
    search: MockServer,
    slack: MockServer,
}

impl PipelineHarness {
    async fn start() -> Self {
        Self {
            asset: MockServer::start_async().await,
            search: MockServer::start_async().await,
            slack: MockServer::start_async().await,
        }
    }

    fn pipeline(&self) -> CommandPipeline {
        let mut asset_config = AssetClientConfig::new("demo", "key", "secret");
        asset_config.api_base = self.asset.base_url();
        asset_config.delivery_base = self.asset.base_url();
        asset_config.request_timeout_ms = 2_000;
        let asset = AssetClient::new(asset_config).expect("asset client");

        let mut search_config = ImageSearchConfig::new("api-key", "engine-id");
        search_config.api_base = self.search.url("/customsearch/v1");
        search_config.request_timeout_ms = 2_000;
        let search = ImageSearchClient::new(search_config).expect("search client");

        let bot = SlackApiClient::new(self.slack.base_url(), "xoxb-bot", 2_000).expect("bot");
        let user = SlackApiClient::new(self.slack.base_url(), "xoxp-user", 2_000).expect("user");

        CommandPipeline::new(asset, search, bot, user, 2_000).expect("pipeline")
    }

    fn command(&self, text: &str) -> SlashCommand {
        SlashCommand {
            text: text.to_string(),
            user_id: "U1".to_string(),
            channel_id: "C1".to_string(),
            channel_name: "general".to_string(),
            command: "/lgtm".to_string(),
            response_url: self.slack.url("/hook"),
        }
    }
}

#[test]
fn complementary_color_inverts_black_and_white() {
    assert_eq!(complementary_color("#000000"), "ffffff");
    assert_eq!(complementary_color("#ffffff"), "000000");
}

#[test]
fn complementary_color_reflects_channels_around_the_extremes() {
    // max 0x99 + min 0x33 = 0xcc; each channel maps to 0xcc - channel.
    assert_eq!(complementary_color("#336699"), "996633");
}

#[test]
fn complementary_color_falls_back_on_malformed_input() {
    assert_eq!(complementary_color("#33669"), "ffffff");
    assert_eq!(complementary_color("336699"), "ffffff");
    assert_eq!(complementary_color("#zzzzzz"), "ffffff");
    assert_eq!(complementary_color(""), "ffffff");
}

#[test]
fn caption_transformation_embeds_the_band_color() {
    let chain = caption_transformation("996633");
    assert!(chain.contains("l_text:Helvetica_70_bold_underline_letter_spacing_30:LGTM"));
    assert!(chain.contains("co_rgb:996633"));
    assert!(chain.contains("Looks%20good%20to%20me"));
}

#[test]
fn url_literal_pattern_extracts_the_first_url() {
    let pattern = Regex::new(URL_LITERAL_PATTERN).expect("pattern");
    let found = pattern
        .find("look at https://example.com/cat.png please")
        .expect("match");
    assert_eq!(found.as_str(), "https://example.com/cat.png");
    assert!(pattern.find("ftp://files.example.com/dog.gif").is_some());
    assert!(pattern.find("just a keyword").is_none());
}

#[tokio::test]
async fn url_command_runs_to_done_without_search_or_notification() {
    let harness = PipelineHarness::start().await;

    let search_mock = harness
        .search
        .mock_async(|when, then| {
            when.method(GET).path("/customsearch/v1");
            then.status(200).json_body(json!({"items": []}));
        })
        .await;
    let upload_mock = harness
        .asset
        .mock_async(|when, then| {
            when.method(POST)
                .path("/demo/image/upload")
                .body_includes("file=https%3A%2F%2Fexample.com%2Fcat.png")
                .body_includes("colors=true");
            then.status(200).json_body(json!({
                "public_id": "tmp1",
                "format": "png",
                "original_filename": "cat",
                "colors": [["#336699", 41.5], ["#FFFFFF", 12.0]],
            }));
        })
        .await;
    let fetch_mock = harness
        .asset
        .mock_async(|when, then| {
            when.method(GET)
                .path_includes("/demo/image/upload/")
                .path_includes("co_rgb:996633")
                .path_includes("tmp1.png");
            then.status(200).body("image-bytes");
        })
        .await;
    let post_file_mock = harness
        .slack
        .mock_async(|when, then| {
            when.method(POST)
                .path("/files.upload")
                .body_includes("C1")
                .body_includes("Source: https://example.com/cat.png")
                .body_includes("![LGTM](https://example.com/cat.png)");
            then.status(200).json_body(json!({
                "ok": true,
                "file": {
                    "id": "F1",
                    "url_private": "https://files.example/F1",
                    "shares": {"public": {"C1": [{"ts": "111.222"}]}},
                },
            }));
        })
        .await;
    let promote_mock = harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/files.sharedPublicURL").body("file=F1");
            then.status(200).json_body(json!({
                "ok": true,
                "file": {
                    "id": "F1",
                    "url_private": "https://files.example/F1",
                    "permalink_public": "https://slack-files.com/T1-F1-secret9",
                },
            }));
        })
        .await;
    let annotate_mock = harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/chat.update").json_body(json!({
                "channel": "C1",
                "ts": "111.222",
                "text": "![LGTM](https://files.example/F1?pub_secret=secret9)",
            }));
            then.status(200).json_body(json!({"ok": true}));
        })
        .await;
    let destroy_mock = harness
        .asset
        .mock_async(|when, then| {
            when.method(POST)
                .path("/demo/image/destroy")
                .body_includes("public_id=tmp1");
            then.status(200).json_body(json!({"result": "ok"}));
        })
        .await;
    let webhook_mock = harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/hook");
            then.status(200).body("ok");
        })
        .await;

    let pipeline = harness.pipeline();
    pipeline
        .execute(&harness.command("https://example.com/cat.png"), Some("en-US"))
        .await;

    search_mock.assert_hits_async(0).await;
    upload_mock.assert_async().await;
    fetch_mock.assert_async().await;
    post_file_mock.assert_async().await;
    promote_mock.assert_async().await;
    annotate_mock.assert_async().await;
    destroy_mock.assert_async().await;
    webhook_mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn keyword_command_searches_once_and_publishes_the_pick() {
    let harness = PipelineHarness::start().await;

    let search_mock = harness
        .search
        .mock_async(|when, then| {
            when.method(GET)
                .path("/customsearch/v1")
                .query_param("q", "dog")
                .query_param("lr", "lang_en");
            then.status(200).json_body(json!({
                "items": [{"link": "https://images.example/only-dog.png"}],
            }));
        })
        .await;
    let upload_mock = harness
        .asset
        .mock_async(|when, then| {
            when.method(POST)
                .path("/demo/image/upload")
                .body_includes("file=https%3A%2F%2Fimages.example%2Fonly-dog.png");
            then.status(200).json_body(json!({
                "public_id": "tmp2",
                "format": "png",
            }));
        })
        .await;
    // No color samples in the upload result, so the band falls back to the
    // neutral color.
    let fetch_mock = harness
        .asset
        .mock_async(|when, then| {
            when.method(GET)
                .path_includes("co_rgb:ffffff")
                .path_includes("tmp2.png");
            then.status(200).body("image-bytes");
        })
        .await;
    harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/files.upload");
            then.status(200).json_body(json!({
                "ok": true,
                "file": {
                    "id": "F2",
                    "url_private": "https://files.example/F2",
                    "shares": {"public": {"C1": [{"ts": "5.5"}]}},
                },
            }));
        })
        .await;
    // Promotion fails; the annotation must fall back to the private URL.
    harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/files.sharedPublicURL");
            then.status(200)
                .json_body(json!({"ok": false, "error": "not_allowed_token_type"}));
        })
        .await;
    let annotate_mock = harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/chat.update").json_body(json!({
                "channel": "C1",
                "ts": "5.5",
                "text": "![LGTM](https://files.example/F2)",
            }));
            then.status(200).json_body(json!({"ok": true}));
        })
        .await;
    let destroy_mock = harness
        .asset
        .mock_async(|when, then| {
            when.method(POST)
                .path("/demo/image/destroy")
                .body_includes("public_id=tmp2");
            then.status(200).json_body(json!({"result": "ok"}));
        })
        .await;
    let webhook_mock = harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/hook");
            then.status(200).body("ok");
        })
        .await;

    let pipeline = harness.pipeline();
    pipeline
        .execute(&harness.command("dog"), Some("en-US"))
        .await;

    search_mock.assert_async().await;
    upload_mock.assert_async().await;
    fetch_mock.assert_async().await;
    annotate_mock.assert_async().await;
    destroy_mock.assert_async().await;
    webhook_mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn empty_search_results_notify_the_generic_failure() {
    let harness = PipelineHarness::start().await;

    let search_mock = harness
        .search
        .mock_async(|when, then| {
            when.method(GET).path("/customsearch/v1");
            then.status(200).json_body(json!({"items": []}));
        })
        .await;
    let upload_mock = harness
        .asset
        .mock_async(|when, then| {
            when.method(POST).path("/demo/image/upload");
            then.status(200).json_body(json!({"public_id": "never", "format": "png"}));
        })
        .await;
    let post_file_mock = harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/files.upload");
            then.status(200).json_body(json!({"ok": true}));
        })
        .await;
    let webhook_mock = harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/hook").json_body(json!({
                "response_type": "ephemeral",
                "text": "Oops! Something went wrong. :sob:",
            }));
            then.status(200).body("ok");
        })
        .await;

    let pipeline = harness.pipeline();
    pipeline
        .execute(&harness.command("nonexistent"), None)
        .await;

    search_mock.assert_async().await;
    upload_mock.assert_hits_async(0).await;
    post_file_mock.assert_hits_async(0).await;
    webhook_mock.assert_async().await;
}

#[tokio::test]
async fn missing_channel_membership_notifies_the_invite_instruction() {
    let harness = PipelineHarness::start().await;

    harness
        .asset
        .mock_async(|when, then| {
            when.method(POST).path("/demo/image/upload");
            then.status(200).json_body(json!({
                "public_id": "tmp3",
                "format": "png",
                "colors": [["#000000", 90.0]],
            }));
        })
        .await;
    harness
        .asset
        .mock_async(|when, then| {
            when.method(GET).path_includes("tmp3.png");
            then.status(200).body("image-bytes");
        })
        .await;
    harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/files.upload");
            then.status(200)
                .json_body(json!({"ok": false, "error": "not_in_channel"}));
        })
        .await;
    let identity_mock = harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/auth.test");
            then.status(200).json_body(json!({"ok": true, "user_id": "UBOT"}));
        })
        .await;
    let destroy_mock = harness
        .asset
        .mock_async(|when, then| {
            when.method(POST).path("/demo/image/destroy");
            then.status(200).json_body(json!({"result": "ok"}));
        })
        .await;
    let webhook_mock = harness
        .slack
        .mock_async(|when, then| {
            when.method(POST).path("/hook").json_body(json!({
                "response_type": "ephemeral",
                "text": invite_instruction_text("UBOT", "general"),
            }));
            then.status(200).body("ok");
        })
        .await;

    let pipeline = harness.pipeline();
    pipeline
        .execute(&harness.command("https://example.com/cat.png"), None)
        .await;

    identity_mock.assert_async().await;
    webhook_mock.assert_async().await;
    // The failure happened before cleanup; the asset is not destroyed.
    destroy_mock.assert_hits_async(0).await;
}
