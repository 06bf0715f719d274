use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use olx_watcher::checker::PriceChecker;
use olx_watcher::config::AppConfig;
use olx_watcher::notifier::EmailNotifier;
use olx_watcher::scheduler::CheckScheduler;
use olx_watcher::scraper::AdScraper;
use olx_watcher::store::Store;
use olx_watcher::subscriptions::{validate_ad_url, SubscriptionManager};

#[derive(Parser)]
#[command(
    name = "olx-watcher",
    about = "Tracks OLX ad prices and notifies subscribers on changes",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one check cycle over all watched ads and exit
    Check,
    /// Keep running, checking on the configured cron schedule
    Watch,
    /// Start watching an ad for a subscriber
    Subscribe {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
    },
    /// Stop watching an ad
    Unsubscribe {
        #[arg(long)]
        email: String,
        #[arg(long)]
        url: String,
    },
    /// List the ads a subscriber watches
    List {
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("olx_watcher=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = AppConfig::from_env()?;

    let store = Store::connect(&config.database).await?;
    let scraper = AdScraper::new(config.scraper.clone())?;

    match cli.command {
        Command::Check => {
            let notifier = Arc::new(EmailNotifier::new(&config.smtp)?);
            let checker = PriceChecker::new(store, scraper, notifier, &config.checker);
            let report = checker.run_once().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Watch => {
            info!("Starting OLX price watcher...");
            let notifier = Arc::new(EmailNotifier::new(&config.smtp)?);
            let checker = Arc::new(PriceChecker::new(store, scraper, notifier, &config.checker));
            let mut scheduler = CheckScheduler::new(checker, &config.checker.schedule).await?;
            scheduler.start().await?;

            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
            scheduler.shutdown().await?;
        }
        Command::Subscribe { email, name, url } => {
            validate_ad_url(&url)?;
            let manager = SubscriptionManager::new(store, scraper);
            let ad = manager.subscribe(&email, &name, &url).await?;
            match (&ad.current_price, &ad.currency) {
                (Some(price), Some(currency)) => {
                    println!("Subscribed {} to {} ({} {})", email, ad.url, price, currency);
                }
                _ => println!("Subscribed {} to {}", email, ad.url),
            }
        }
        Command::Unsubscribe { email, url } => {
            let manager = SubscriptionManager::new(store, scraper);
            manager.unsubscribe(&email, &url).await?;
            println!("Unsubscribed {} from {}", email, url);
        }
        Command::List { email } => {
            let manager = SubscriptionManager::new(store, scraper);
            let ads = manager.list(&email).await?;
            if ads.is_empty() {
                println!("{} watches no ads", email);
            } else {
                for ad in ads {
                    let price = match (&ad.current_price, &ad.currency) {
                        (Some(price), Some(currency)) => format!("{} {}", price, currency),
                        _ => "unresolved".to_string(),
                    };
                    println!("{}  {}  {}", ad.id, price, ad.url);
                }
            }
        }
    }

    Ok(())
}
