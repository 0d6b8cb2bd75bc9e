use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tollgate::config::{LoggingConfig, TollgateConfig};
use tollgate::features::{FeatureFlagResolver, FeatureOptions, FeatureSeed, UserId};
use tollgate::ratelimit::{Identity, RateLimiter};
use tollgate::store::{MemoryCache, MemoryCounterStore, MemoryFeatureStore};

/// Feature flag and rate limit policy engine.
///
/// Every run starts from in-memory stores loaded from the configured seed
/// file. Changes made by `set` and `override` last for that run only; add
/// them to the seed file to keep them.
#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a feature flag
    Flag {
        name: String,
        #[arg(long)]
        user: Option<UserId>,
    },
    /// Create or update a feature flag for this run only
    ///
    /// The updated list is printed and then discarded on exit. Persist flags
    /// through the seed file.
    Set {
        name: String,
        #[arg(long, action = ArgAction::Set)]
        enabled: bool,
        #[arg(long)]
        description: Option<String>,
        /// Intended rollout percentage, stored as metadata
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        rollout: Option<u8>,
    },
    /// Set a per-user override for this run only
    ///
    /// The user's overrides are printed and then discarded on exit. Persist
    /// overrides through the seed file.
    Override {
        name: String,
        #[arg(long)]
        user: UserId,
        #[arg(long, action = ArgAction::Set)]
        enabled: bool,
    },
    /// List all features, or one user's overrides
    List {
        #[arg(long)]
        user: Option<UserId>,
    },
    /// Send a burst of requests through the rate limiter
    Simulate {
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        user: Option<UserId>,
        #[arg(long)]
        premium: bool,
        #[arg(long, default_value = "127.0.0.1")]
        address: String,
        #[arg(long, default_value_t = 10)]
        requests: u32,
        /// Delay between requests
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
}

/// Stores are rebuilt from the seed file on every run.
const EPHEMERAL_NOTICE: &str =
    "Change applied to in-memory state only; add it to the seed file to keep it";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = TollgateConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        window_secs = config.rate_limiting.window_secs,
        cache_ttl_secs = config.features.cache_ttl_secs,
        "Configuration loaded"
    );

    let resolver = FeatureFlagResolver::with_config(
        Arc::new(MemoryFeatureStore::new()),
        Arc::new(MemoryCache::new()),
        &config.features,
    );

    if let Some(path) = &config.features.seed_path {
        let seed = FeatureSeed::from_file(path)?;
        resolver.apply_seed(&seed).await?;
    }

    match cli.command {
        Command::Flag { name, user } => {
            let enabled = resolver.is_enabled(&name, user).await;
            println!(
                "{}",
                serde_json::json!({ "name": name, "user_id": user, "enabled": enabled })
            );
        }
        Command::Set {
            name,
            enabled,
            description,
            rollout,
        } => {
            let ok = match rollout {
                Some(percentage) => {
                    let options = FeatureOptions {
                        rollout_percentage: Some(percentage),
                        expires_at: None,
                    };
                    resolver
                        .create_or_update_with_options(
                            &name,
                            enabled,
                            description.as_deref(),
                            options,
                        )
                        .await
                }
                None => resolver.create_or_update(&name, enabled, description.as_deref()).await,
            };
            anyhow::ensure!(ok, "could not create or update feature '{}'", name);
            warn!("{}", EPHEMERAL_NOTICE);
            println!("{}", serde_json::to_string_pretty(&resolver.list_all().await)?);
        }
        Command::Override {
            name,
            user,
            enabled,
        } => {
            anyhow::ensure!(
                resolver.set_user_override(&name, user, enabled).await,
                "could not set override for feature '{}'",
                name
            );
            warn!("{}", EPHEMERAL_NOTICE);
            println!("{}", serde_json::to_string_pretty(&resolver.user_features(user).await)?);
        }
        Command::List { user: Some(user) } => {
            println!("{}", serde_json::to_string_pretty(&resolver.user_features(user).await)?);
        }
        Command::List { user: None } => {
            println!("{}", serde_json::to_string_pretty(&resolver.list_all().await)?);
        }
        Command::Simulate {
            endpoint,
            user,
            premium,
            address,
            requests,
            interval_ms,
        } => {
            let identity = match user {
                Some(id) if premium => Identity::premium(id),
                Some(id) => Identity::user(id),
                None => Identity::anonymous(address),
            };
            let store = Arc::new(MemoryCounterStore::new());
            let limiter = RateLimiter::with_config(store, &config.rate_limiting);

            simulate(&limiter, &identity, &endpoint, requests, interval_ms).await?;
        }
    }

    Ok(())
}

/// Initialize tracing from `RUST_LOG`, falling back to the configured level.
fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn simulate(
    limiter: &RateLimiter,
    identity: &Identity,
    endpoint: &str,
    requests: u32,
    interval_ms: u64,
) -> anyhow::Result<()> {
    info!(identity = %identity, endpoint = %endpoint, requests, "Starting simulation");

    for i in 1..=requests {
        let decision = limiter.check_limit(identity, endpoint).await;
        println!("{:>4} {}", i, serde_json::to_string(&decision)?);

        if interval_ms > 0 {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {}
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, stopping simulation");
                    break;
                }
            }
        }
    }

    Ok(())
}
