//! lgtm-bridge gateway binary: wires configuration, the deferred-job
//! consumer, and the ingress server.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use lgtm_api::{AssetClient, AssetClientConfig, ImageSearchClient, ImageSearchConfig};
use lgtm_gateway::{serve, GatewayState};
use lgtm_runtime::{
    CommandJob, CommandPipeline, DuplicateEventGuard, InProcessJobQueue, COMMAND_JOB_NAME,
};
use lgtm_slack::{SlackApiClient, DEFAULT_SLACK_API_BASE};

#[derive(Debug, Parser)]
#[command(name = "lgtm-gateway", about = "Slash-command image bridge")]
struct GatewayArgs {
    #[arg(long, env = "LGTM_BIND_ADDR", default_value = "127.0.0.1:8080")]
    bind_addr: String,
    #[arg(long, env = "SLACK_BOT_TOKEN")]
    bot_token: String,
    /// Elevated credential used only for public-link promotion.
    #[arg(long, env = "SLACK_USER_TOKEN")]
    user_token: String,
    #[arg(long, env = "SLACK_VERIFICATION_TOKEN")]
    verification_token: Option<String>,
    #[arg(long, env = "SLACK_API_BASE", default_value = DEFAULT_SLACK_API_BASE)]
    slack_api_base: String,
    #[arg(long, env = "CLOUDINARY_CLOUD_NAME")]
    cloud_name: String,
    #[arg(long, env = "CLOUDINARY_API_KEY")]
    asset_api_key: String,
    #[arg(long, env = "CLOUDINARY_API_SECRET")]
    asset_api_secret: String,
    #[arg(long, env = "GOOGLE_API_KEY")]
    search_api_key: String,
    #[arg(long, env = "CUSTOM_SEARCH_ENGINE_ID")]
    search_engine_id: String,
    #[arg(long, env = "LGTM_REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
    request_timeout_ms: u64,
    #[arg(long, env = "LGTM_DEDUP_TTL_SECONDS", default_value_t = 3_600)]
    dedup_ttl_seconds: u64,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = GatewayArgs::parse();

    let mut asset_config =
        AssetClientConfig::new(args.cloud_name, args.asset_api_key, args.asset_api_secret);
    asset_config.request_timeout_ms = args.request_timeout_ms;
    let asset = AssetClient::new(asset_config).context("failed to create asset client")?;

    let mut search_config = ImageSearchConfig::new(args.search_api_key, args.search_engine_id);
    search_config.request_timeout_ms = args.request_timeout_ms;
    let search =
        ImageSearchClient::new(search_config).context("failed to create search client")?;

    let bot = SlackApiClient::new(&args.slack_api_base, &args.bot_token, args.request_timeout_ms)
        .context("failed to create bot slack client")?;
    let user = SlackApiClient::new(&args.slack_api_base, &args.user_token, args.request_timeout_ms)
        .context("failed to create user slack client")?;

    let pipeline = Arc::new(CommandPipeline::new(
        asset,
        search,
        bot.clone(),
        user,
        args.request_timeout_ms,
    )?);

    let queue = Arc::new(InProcessJobQueue::new());
    let worker = queue.consume(COMMAND_JOB_NAME, move |data| {
        let pipeline = pipeline.clone();
        async move {
            let job: CommandJob =
                serde_json::from_value(data).context("malformed command job payload")?;
            pipeline.execute(&job.command, job.locale.as_deref()).await;
            Ok(())
        }
    })?;

    let state = GatewayState {
        verification_token: args.verification_token,
        guard: Arc::new(DuplicateEventGuard::new(args.dedup_ttl_seconds)),
        dispatcher: queue,
        slack: Arc::new(bot),
    };

    tokio::select! {
        result = serve(&args.bind_addr, state) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
    worker.abort();
    Ok(())
}
