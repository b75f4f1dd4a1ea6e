use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use follow_tracker::config::Config;
use follow_tracker::db::models::{state_keys, Relation};
use follow_tracker::db::HistoryStore;
use follow_tracker::instagram::client::InstagramClient;
use follow_tracker::instagram::fetcher::RateLimitedFetcher;
use follow_tracker::instagram::friendships::FriendshipPager;
use follow_tracker::instagram::identity::SessionCookie;
use follow_tracker::instagram::users::UserResolver;

/// follow-tracker: see who followed and unfollowed an Instagram account.
///
/// Each refresh pages through the full follower and following lists at a
/// deliberately slow pace, diffs followers against the last snapshot, and
/// appends the change to a local history.
#[derive(Parser)]
#[command(name = "follow-tracker", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Fetch both lists and record what changed since the last refresh
    Refresh,

    /// Show recent follower changes, newest first
    History {
        /// Number of refreshes to show (default: 20)
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Show follower and following counts over time
    Counts {
        /// How many days back to show (default: 30)
        #[arg(long, default_value = "30")]
        days: u32,
    },

    /// Show system status (tracked account, last refresh, DB size)
    Status,

    /// Switch the tracked account. Erases existing history.
    Track {
        /// The username to track (e.g. @someone)
        #[arg(required_unless_present = "me", conflicts_with = "me")]
        username: Option<String>,

        /// Go back to tracking the logged-in account
        #[arg(long)]
        me: bool,
    },

    /// Print the full error from the last failed refresh
    LastError,

    /// Erase all snapshots and history (keeps the tracked account)
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("follow_tracker=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing follow-tracker database...");
            let config = Config::load()?;
            let store = follow_tracker::db::initialize_store(&config.db_path)?;
            let table_count = store.table_count().await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nNext step: put IG_SESSION_COOKIE in your .env file");
            println!("  (the Cookie header from a browser logged in to the site)");
            println!("\nThen run: follow-tracker refresh");
        }

        Commands::Refresh => {
            let config = Config::load()?;
            config.require_session()?;
            let store = follow_tracker::db::initialize_store(&config.db_path)?;
            let (pager, resolver) = build_api(&config)?;

            println!("Refreshing (requests are paced, this takes a while)...");

            let summary = follow_tracker::pipeline::refresh::run(&pager, &resolver, &store).await?;
            follow_tracker::output::terminal::display_refresh_summary(&summary);
        }

        Commands::History { limit } => {
            let config = Config::load()?;
            let store = follow_tracker::db::open_store(&config.db_path)?;

            let events = store.delta_events_most_recent(limit).await?;
            let following = store.current_users(Relation::Following).await?;
            let following_ids: HashSet<&str> = following.iter().map(|u| u.id.as_str()).collect();

            follow_tracker::output::terminal::display_history(&events, &following_ids);
        }

        Commands::Counts { days } => {
            let config = Config::load()?;
            let store = follow_tracker::db::open_store(&config.db_path)?;

            let snapshots = store.count_snapshots_since(days).await?;
            follow_tracker::output::terminal::display_counts(&snapshots, days);

            let totals = store.follower_count_delta(days).await?;
            println!(
                "Followers: {}",
                follow_tracker::output::terminal::format_totals(&totals, days)
            );
        }

        Commands::Status => {
            let config = Config::load()?;
            let store = follow_tracker::db::open_store(&config.db_path)?;
            follow_tracker::status::show(&store, &config.db_path).await?;
        }

        Commands::Track { username, me } => {
            let config = Config::load()?;
            let store = follow_tracker::db::initialize_store(&config.db_path)?;

            if me {
                follow_tracker::pipeline::track::track_self(store.as_ref()).await?;
                println!("Now tracking the logged-in account. History was cleared.");
                return Ok(());
            }

            // clap guarantees a username when --me is absent
            let Some(username) = username else {
                anyhow::bail!("Give a username to track, or --me");
            };

            config.require_session()?;
            let (_, resolver) = build_api(&config)?;

            let user_id =
                follow_tracker::pipeline::track::track_user(&resolver, store.as_ref(), &username)
                    .await?;
            println!(
                "Now tracking @{} (id {user_id}). History was cleared.",
                username.trim().trim_start_matches('@')
            );
            println!("Run `follow-tracker refresh` to take the first snapshot.");
        }

        Commands::LastError => {
            let config = Config::load()?;
            let store = follow_tracker::db::open_store(&config.db_path)?;
            match store.get_state(state_keys::LAST_ERROR).await? {
                Some(error) => println!("{}\n{error}", "Last refresh failed:".red().bold()),
                None => println!("{}", "The last refresh succeeded.".green()),
            }
        }

        Commands::Reset => {
            let config = Config::load()?;
            let store = follow_tracker::db::open_store(&config.db_path)?;
            store.clear_all().await?;
            store.delete_state(state_keys::LAST_ERROR).await?;
            println!("{}", "All snapshots and history erased.".bold());
        }
    }

    Ok(())
}

/// Wire the HTTP client, the shared fetcher and the two API components.
///
/// Both components share one fetcher, so every request the process makes
/// goes through the same pacing and retry budget.
fn build_api(config: &Config) -> Result<(FriendshipPager, UserResolver)> {
    let cookie = SessionCookie::new(&config.session_cookie);
    let client = Arc::new(InstagramClient::new(cookie.clone(), &config.app_id)?);
    let fetcher = Arc::new(RateLimitedFetcher::new(client, config.fetcher.clone()));

    let pager = FriendshipPager::new(fetcher.clone(), &config.base_url, config.page_size);
    let resolver = UserResolver::new(fetcher, Arc::new(cookie), &config.base_url);
    Ok((pager, resolver))
}
