//! Rewards App - real-time community reward notifications

mod config;
mod demo;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use config::AppConfig;
use rewards_core::Session;
use rewards_engine::provider::ArrivalPolicy;
use rewards_engine::{notification::TracingPresenter, RewardStore, RewardsProvider};
use rewards_networking::{RealtimeClient, SupabaseClient};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rewards-app", version, about = "Community reward notifications")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// How long a notification stays up
    #[arg(long, global = true)]
    duration_ms: Option<u64>,

    /// Keep notifications up until dismissed
    #[arg(long, global = true)]
    no_auto_hide: bool,

    /// What to do with rewards arriving while one is shown
    #[arg(long, global = true, value_enum)]
    policy: Option<PolicyArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for the user's rewards until Ctrl-C
    Listen {
        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        anon_key: Option<String>,

        #[arg(long)]
        access_token: Option<String>,

        #[arg(long)]
        user_id: Option<String>,
    },

    /// Run against an in-process channel with sample rewards
    Demo {
        /// Number of rewards to publish
        #[arg(long, default_value_t = 4)]
        count: usize,

        /// Delay between rewards
        #[arg(long, default_value_t = 1500)]
        interval_ms: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Replace,
    Drop,
    Queue,
}

impl From<PolicyArg> for ArrivalPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Replace => ArrivalPolicy::ReplaceInPlace,
            PolicyArg::Drop => ArrivalPolicy::DropWhileBusy,
            PolicyArg::Queue => ArrivalPolicy::Queue,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rewards_app=info,rewards_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_env();
    if let Some(duration_ms) = cli.duration_ms {
        config.notification.duration_ms = duration_ms;
    }
    if cli.no_auto_hide {
        config.notification.auto_hide = false;
    }
    if let Some(policy) = cli.policy {
        config.notification.arrival_policy = policy.into();
    }

    match cli.command {
        Commands::Listen {
            url,
            anon_key,
            access_token,
            user_id,
        } => {
            config.supabase_url = url.or(config.supabase_url);
            config.anon_key = anon_key.or(config.anon_key);
            config.access_token = access_token.or(config.access_token);
            config.user_id = user_id.or(config.user_id);
            config.validate()?;
            listen(config).await
        }
        Commands::Demo { count, interval_ms } => {
            config.validate()?;
            demo::run(config, count, interval_ms).await
        }
    }
}

async fn listen(config: AppConfig) -> anyhow::Result<()> {
    let backend = config.backend()?;

    let mut client = SupabaseClient::new(backend.clone())?;
    let mut realtime = RealtimeClient::new(&backend)?;
    if let Some(token) = &config.access_token {
        client = client.with_access_token(token.clone());
        realtime = realtime.with_access_token(token.clone());
    }

    let session = match config.session() {
        Some(session) => session,
        None if client.access_token().is_some() => {
            let user = client.get_user().await.context("looking up the signed-in user")?;
            info!("Signed in as {}", user.email.as_deref().unwrap_or(&user.id));
            let session = Session::new(user.id);
            match &config.access_token {
                Some(token) => session.with_access_token(token.clone()),
                None => session,
            }
        }
        None => bail!("no user configured: set userId, REWARDS_USER_ID or an access token"),
    };

    let store = RewardStore::new(Arc::new(realtime), Arc::new(client));
    store.refresh(&session).await;
    if let Err(e) = store.fetch_achievements(&session).await {
        warn!("Could not load achievements: {}", e);
    }
    if let Some(summary) = store.snapshot().await.reward_summary {
        info!(
            "{} credits earned from {} rewards",
            summary.total_credits_earned, summary.total_rewards
        );
    }

    let presenter = Arc::new(TracingPresenter::new(config.exit_animation()));
    let provider = RewardsProvider::spawn(store, presenter, config.provider_config());
    provider.start(session).await;

    info!("Listening for rewards, press Ctrl-C to stop");
    signal::ctrl_c().await?;

    provider.stop().await;
    provider.shutdown();
    info!("Stopped");
    Ok(())
}
