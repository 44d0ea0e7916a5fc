use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

use gator::aggregator::run_aggregation;
use gator::config::Config;
use gator::feed::Fetcher;
use gator::storage::{Database, DatabaseError, Feed, User};
use gator::util::{sanitize_line, truncate_to_width, validate_feed_url};

/// Column budget for titles and descriptions in `browse`
const TITLE_WIDTH: usize = 80;
const DESCRIPTION_WIDTH: usize = 160;

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

/// Create `dir` if needed and restrict it to the current user.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory '{}'", dir.display()))?;
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set directory permissions to 0700"
            );
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "gator",
    version,
    about = "RSS feed aggregator: register feeds, follow them, and collect new posts on a schedule"
)]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides `database_path` from the config)
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    /// Act as this user (overrides `current_user` from the config)
    #[arg(long, value_name = "NAME", global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new user
    Register { name: String },
    /// List all users
    Users,
    /// Register a feed and follow it as the current user
    Addfeed { name: String, url: String },
    /// List all registered feeds
    Feeds,
    /// Follow an already registered feed
    Follow { url: String },
    /// List the feeds the current user follows
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Show the newest posts from followed feeds
    Browse {
        #[arg(default_value_t = 2)]
        limit: u32,
    },
    /// Collect feeds forever, one feed per tick (e.g. `agg 1m`, `agg 30s`)
    Agg { interval: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;

    let db_path = match args.db.clone().or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            ensure_private_dir(&config_dir)?;
            config_dir.join("gator.db")
        }
    };
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            ensure_private_dir(parent)?;
        }
    }

    let db_path_str = db_path
        .to_str()
        .context("Database path contains invalid UTF-8")?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            bail!(
                "Database '{}' is locked by another process. Is `gator agg` already running?",
                db_path.display()
            );
        }
        Err(e) => return Err(e).context("Failed to open database"),
    };

    let current_user = args.user.clone().or_else(|| config.current_user.clone());

    match args.command {
        Command::Register { name } => register(&db, &name).await,
        Command::Users => list_users(&db, current_user.as_deref()).await,
        Command::Addfeed { name, url } => {
            let user = require_user(&db, current_user.as_deref()).await?;
            add_feed(&db, &user, &name, &url).await
        }
        Command::Feeds => list_feeds(&db).await,
        Command::Follow { url } => {
            let user = require_user(&db, current_user.as_deref()).await?;
            follow(&db, &user, &url).await
        }
        Command::Following => {
            let user = require_user(&db, current_user.as_deref()).await?;
            list_following(&db, &user).await
        }
        Command::Unfollow { url } => {
            let user = require_user(&db, current_user.as_deref()).await?;
            unfollow(&db, &user, &url).await
        }
        Command::Browse { limit } => {
            let user = require_user(&db, current_user.as_deref()).await?;
            browse(&db, &user, limit).await
        }
        Command::Agg { interval } => aggregate(db, &config, &interval).await,
    }
}

async fn require_user(db: &Database, name: Option<&str>) -> Result<User> {
    let Some(name) = name else {
        bail!("No current user. Pass --user NAME or set `current_user` in the config file");
    };
    db.get_user_by_name(name)
        .await
        .context("Failed to look up user")?
        .with_context(|| format!("User '{}' does not exist. Create it with `gator register`", name))
}

async fn register(db: &Database, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("User name cannot be empty");
    }
    match db.create_user(name).await {
        Ok(user) => {
            println!("Created user '{}' (id {})", user.name, user.id);
            Ok(())
        }
        Err(e) if e.is_unique_violation() => bail!("User '{}' already exists", name),
        Err(e) => Err(e).context("Failed to create user"),
    }
}

async fn list_users(db: &Database, current: Option<&str>) -> Result<()> {
    let users = db.get_users().await.context("Failed to list users")?;
    for user in users {
        if Some(user.name.as_str()) == current {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }
    Ok(())
}

async fn add_feed(db: &Database, user: &User, name: &str, url: &str) -> Result<()> {
    let url = validate_feed_url(url).with_context(|| format!("Refusing to add '{}'", url))?;

    let feed = match db.create_feed(name, url.as_str(), user.id).await {
        Ok(feed) => feed,
        Err(e) if e.is_unique_violation() => bail!("Feed '{}' is already registered", url),
        Err(e) => return Err(e).context("Failed to create feed"),
    };
    db.create_feed_follow(user.id, feed.id)
        .await
        .context("Feed was added but following it failed")?;

    println!("Added feed '{}' ({})", feed.name, feed.url);
    println!("{} is now following it", user.name);
    Ok(())
}

async fn list_feeds(db: &Database) -> Result<()> {
    let feeds = db.get_feeds().await.context("Failed to list feeds")?;
    if feeds.is_empty() {
        println!("No feeds registered yet. Add one with `gator addfeed NAME URL`");
        return Ok(());
    }
    for feed in feeds {
        println!("* {}", sanitize_line(&feed.name));
        println!("  URL:     {}", feed.url);
        println!("  Added by {}", feed.owner_name);
    }
    Ok(())
}

/// Find a registered feed, accepting the URL in the same normalized form `addfeed` stored
async fn lookup_feed(db: &Database, url: &str) -> Result<Feed> {
    let key = url::Url::parse(url.trim())
        .map(String::from)
        .unwrap_or_else(|_| url.to_string());
    db.get_feed_by_url(&key)
        .await
        .context("Failed to look up feed")?
        .with_context(|| format!("No feed registered with URL '{}'", url))
}

async fn follow(db: &Database, user: &User, url: &str) -> Result<()> {
    let feed = lookup_feed(db, url).await?;

    match db.create_feed_follow(user.id, feed.id).await {
        Ok(follow) => {
            println!("{} is now following '{}'", follow.user_name, follow.feed_name);
            Ok(())
        }
        Err(e) if e.is_unique_violation() => {
            bail!("{} already follows '{}'", user.name, feed.name)
        }
        Err(e) => Err(e).context("Failed to follow feed"),
    }
}

async fn list_following(db: &Database, user: &User) -> Result<()> {
    let follows = db
        .get_feed_follows_for_user(user.id)
        .await
        .context("Failed to list followed feeds")?;
    if follows.is_empty() {
        println!("{} is not following any feeds", user.name);
        return Ok(());
    }
    for follow in follows {
        println!("* {} ({})", sanitize_line(&follow.feed_name), follow.feed_url);
    }
    Ok(())
}

async fn unfollow(db: &Database, user: &User, url: &str) -> Result<()> {
    let feed = lookup_feed(db, url).await?;

    if db
        .delete_feed_follow(user.id, feed.id)
        .await
        .context("Failed to unfollow feed")?
    {
        println!("{} unfollowed '{}'", user.name, feed.name);
    } else {
        println!("{} was not following '{}'", user.name, feed.name);
    }
    Ok(())
}

async fn browse(db: &Database, user: &User, limit: u32) -> Result<()> {
    let posts = db
        .get_posts_for_user(user.id, limit)
        .await
        .context("Failed to load posts")?;
    if posts.is_empty() {
        println!("No posts yet. Run `gator agg` to collect some");
        return Ok(());
    }

    for post in posts {
        let published = post
            .published_at
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "undated".to_string());

        println!("{} | {}", published, sanitize_line(&post.feed_name));
        println!("  {}", truncate_to_width(&sanitize_line(&post.title), TITLE_WIDTH));
        if let Some(description) = &post.description {
            println!(
                "  {}",
                truncate_to_width(&sanitize_line(description), DESCRIPTION_WIDTH)
            );
        }
        println!("  {}", post.url);
        println!();
    }
    Ok(())
}

async fn aggregate(db: Database, config: &Config, interval: &str) -> Result<()> {
    let fetch_timeout = config.fetch_timeout()?;
    let fetcher = Fetcher::new(&config.user_agent)
        .context("Failed to build HTTP client")?
        .with_max_bytes(config.max_feed_bytes);

    let shutdown = spawn_shutdown_listener()?;
    run_aggregation(
        Arc::new(db),
        Arc::new(fetcher),
        interval,
        fetch_timeout,
        shutdown,
    )
    .await
    .context("Failed to start aggregation")?;
    Ok(())
}

/// Flip the returned receiver to `true` on SIGINT or SIGTERM.
fn spawn_shutdown_listener() -> Result<watch::Receiver<bool>> {
    let (tx, rx) = watch::channel(false);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
            }
            let _ = tx.send(true);
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            // Without a handler the process can only be killed
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down gracefully");
        let _ = tx.send(true);
    });

    Ok(rx)
}
