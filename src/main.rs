//! `user-sync`: fetch users, filter and summarize them, optionally post the
//! summaries back.
//!
//! ```text
//! user-sync [--config client.toml] [--city NAME | --email-domain DOMAIN] [--post] [--async]
//! ```

use std::path::PathBuf;

use clap::Parser;

use user_api_client::config::{load_config, ClientConfig};
use user_api_client::observability::{init_logging, init_metrics};
use user_api_client::{ApiClient, ApiResult, User, UserApi, UserSummary, UserTransformer};

#[derive(Parser)]
#[command(name = "user-sync")]
#[command(about = "Fetch users, summarize them and optionally post the summaries", long_about = None)]
struct Cli {
    /// Client configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep only users living in this city (case-insensitive)
    #[arg(long, conflicts_with = "email_domain")]
    city: Option<String>,

    /// Keep only users with an email address at this domain
    #[arg(long)]
    email_domain: Option<String>,

    /// Post every summary after printing it
    #[arg(long)]
    post: bool,

    /// Use the asynchronous client operations
    #[arg(long = "async")]
    use_async: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("Failed to initialize logging: {e}");
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "user-sync starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let client = ApiClient::new(config)?;
    let outcome = run(&client, &cli);

    tracing::info!(
        active = client.active_connection_count(),
        queued = client.queued_request_count(),
        "Dispatcher state before shutdown"
    );
    client.shutdown();

    outcome?;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn run(api: &impl UserApi, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let users = if cli.use_async {
        api.fetch_users_async().wait()?
    } else {
        api.fetch_users()?
    };

    let summaries = select(&users, cli);
    println!("{}", serde_json::to_string_pretty(&summaries)?);

    if cli.post {
        let posted = post_all(api, summaries, cli.use_async);
        let failed = posted.iter().filter(|r| r.is_err()).count();
        tracing::info!(posted = posted.len() - failed, failed, "Finished posting summaries");
    }
    Ok(())
}

fn select(users: &[User], cli: &Cli) -> Vec<UserSummary> {
    let transformer = UserTransformer::new();
    match (&cli.city, &cli.email_domain) {
        (Some(city), _) => transformer.filter_by_city_and_transform(users, city),
        (None, Some(domain)) => transformer.filter_by_email_domain_and_transform(users, domain),
        (None, None) => transformer.transform(users),
    }
}

fn post_all(api: &impl UserApi, summaries: Vec<UserSummary>, use_async: bool) -> Vec<ApiResult<bool>> {
    if use_async {
        let pending: Vec<_> = summaries
            .into_iter()
            .map(|summary| api.post_user_summary_async(summary))
            .collect();
        pending.into_iter().map(|fut| fut.wait()).collect()
    } else {
        summaries
            .iter()
            .map(|summary| api.post_user_summary(summary))
            .collect()
    }
}
