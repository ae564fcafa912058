use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ridesync::config::{Backend, Settings};
use ridesync::{Client, DocumentStore, MemoryStore, NewRoute, RedisStore, StaticAuth, StoreNotifier};

mod demo;
mod output;
mod theme;

use output::{GlobalOptions, OutputFormat, OutputManager};

#[derive(Parser)]
#[command(name = "ridesync")]
#[command(about = "Social feed and friends sync for route-sharing riders", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true, env = "RIDESYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Act as this user
    #[arg(short, long, global = true, env = "RIDESYNC_USER", default_value = "ana")]
    user: String,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the feed and friends list of every sample rider
    Demo,
    /// Show the live feed
    Feed {
        /// Keep printing every new projection
        #[arg(long)]
        watch: bool,
    },
    /// Show friends with last messages and the pending-request badge
    Friends {
        /// Keep printing every new overview
        #[arg(long)]
        watch: bool,
    },
    /// Toggle a like on a route
    Like { route: String },
    /// Comment on a route
    Comment { route: String, text: String },
    /// Publish a new route
    Publish {
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Send a friend request
    Request { recipient: String },
    /// Accept a pending friend request
    Accept { edge: String },
    /// Reject a pending friend request
    Reject { edge: String },
    /// Send a message to a friend
    Message { recipient: String, text: String },
    /// Mark the conversation with a friend as read
    Read { friend: String },
    /// Search riders by name prefix
    Search { text: String },
    /// List unread notifications
    Notifications,
    /// Delete every key of the configured namespace (redis backend only)
    Cleanup,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let output = OutputManager::new(GlobalOptions {
        output_format: cli.output.clone(),
        quiet: cli.quiet,
        no_color: cli.no_color,
    });

    if let Err(err) = execute(cli, &output).await {
        output.error(&format!("{err:#}"));
        process::exit(1);
    }
}

async fn execute(cli: Cli, output: &OutputManager) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Settings::default(),
    };

    match settings.store.backend {
        Backend::Memory => {
            if matches!(cli.command, Commands::Cleanup) {
                bail!("cleanup needs the redis backend");
            }
            let store = Arc::new(MemoryStore::from_settings(&settings.store));
            let notifier = Arc::new(StoreNotifier::new(
                Arc::clone(&store),
                settings.feed.placeholder_name.clone(),
            ));
            demo::seed(&store, &notifier, &settings).await?;
            output.info("using the in-memory store with sample riders");
            run(store, notifier, settings, cli, output).await
        }
        Backend::Redis => {
            let store = Arc::new(
                RedisStore::connect(&settings.store)
                    .await
                    .context("connecting to redis")?,
            );
            if matches!(cli.command, Commands::Cleanup) {
                let removed = store.cleanup().await?;
                output.success(&format!("removed {removed} keys under {}", store.keys().pattern()));
                return Ok(());
            }
            let notifier = Arc::new(StoreNotifier::new(
                Arc::clone(&store),
                settings.feed.placeholder_name.clone(),
            ));
            if matches!(cli.command, Commands::Demo) {
                demo::seed(&store, &notifier, &settings).await?;
            }
            run(store, notifier, settings, cli, output).await
        }
    }
}

async fn run<S: DocumentStore>(
    store: Arc<S>,
    notifier: Arc<StoreNotifier<S>>,
    settings: Settings,
    cli: Cli,
    output: &OutputManager,
) -> Result<()> {
    let auth = Arc::new(StaticAuth::signed_in(cli.user.clone()));
    let client = Client::new(store, Arc::clone(&auth), notifier, settings);

    match cli.command {
        Commands::Demo => {
            for rider in ["ana", "ben", "carla", "dani"] {
                auth.switch_to(Some(rider.to_string()));
                output.heading(&format!("{rider}'s feed"));
                let mut feed = client.subscribe_feed().await?;
                if let Some(entries) = feed.next().await? {
                    output.display(&entries)?;
                }
                feed.dispose();

                output.heading(&format!("{rider}'s friends"));
                let mut friends = client.subscribe_friends().await?;
                if let Some(overview) = friends.next().await? {
                    output.display(&overview)?;
                }
                friends.dispose();
            }
        }
        Commands::Feed { watch } => {
            let mut feed = client.subscribe_feed().await?;
            while let Some(entries) = feed.next().await? {
                output.display(&entries)?;
                if !watch {
                    break;
                }
            }
            feed.dispose();
        }
        Commands::Friends { watch } => {
            let mut friends = client.subscribe_friends().await?;
            while let Some(overview) = friends.next().await? {
                output.display(&overview)?;
                if !watch {
                    break;
                }
            }
            friends.dispose();
        }
        Commands::Like { route } => {
            let outcome = client.toggle_like(&route).await?;
            let verb = if outcome.liked { "liked" } else { "unliked" };
            output.success(&format!("{verb} {route} ({} likes)", outcome.count));
        }
        Commands::Comment { route, text } => {
            let comment = client.add_comment(&route, &text).await?;
            output.success(&format!("commented on {route} as {}", comment.author.username));
        }
        Commands::Publish { title, description } => {
            let route = client
                .publish_route(NewRoute::new(title).with_description(description))
                .await?;
            output.success(&format!("published {} \"{}\"", route.id, route.title));
        }
        Commands::Request { recipient } => {
            let edge = client.send_request(&recipient).await?;
            output.success(&format!("request {} sent to {recipient}", edge.id));
        }
        Commands::Accept { edge } => {
            let accepted = client.accept_request(&edge).await?;
            output.success(&format!("you and {} are now friends", accepted.initiator));
        }
        Commands::Reject { edge } => {
            client.reject_request(&edge).await?;
            output.success(&format!("request {edge} rejected"));
        }
        Commands::Message { recipient, text } => {
            let conversation = client.send_message(&recipient, &text).await?;
            output.success(&format!("message sent in {}", conversation.id));
        }
        Commands::Read { friend } => {
            client.mark_conversation_read(&friend).await?;
            output.success(&format!("conversation with {friend} marked read"));
        }
        Commands::Search { text } => {
            let hits = client.search_users(&text).await?;
            if hits.is_empty() {
                output.warning(&format!("no riders match '{text}'"));
            } else {
                output.display(&hits)?;
            }
        }
        Commands::Notifications => {
            let unread = client.inbox().list_unread(&cli.user, 20).await?;
            output.display(&unread)?;
        }
        Commands::Cleanup => bail!("cleanup needs the redis backend"),
    }
    Ok(())
}
