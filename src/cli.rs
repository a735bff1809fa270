use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Pick what to watch or read next and track viewing sessions
#[derive(Parser)]
#[command(name = "nextup")]
#[command(about = "Weighted next-item picker and watch/read session tracker", long_about = None)]
pub struct Cli {
    /// Database URL (defaults to a SQLite file in the user data dir)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Config file (defaults to <config dir>/nextup/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Select the next item across TV, movies and custom orders
    Next,
    /// Next episode of one series
    Episode {
        series_id: String,
    },
    /// Custom order items
    Order {
        #[command(subcommand)]
        command: OrderCommand,
    },
    /// Watch/read sessions
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Category weights
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Import a JSON catalog seed file
    Import {
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum OrderCommand {
    /// Next unwatched item of an active custom order
    Next,
    /// Mark an item watched
    Watched { item_id: String },
    /// Record the current page of a book item
    BookProgress {
        item_id: String,
        page: i64,
        /// Total pages, when not yet known for the item
        #[arg(long)]
        page_count: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Start a session for a catalog item (plex key) or a custom order item
    Start(StartArgs),
    Pause { id: String },
    Resume { id: String },
    Complete {
        id: String,
        /// Minutes to add to the session total
        #[arg(long, default_value_t = 0)]
        minutes: i64,
    },
    Delete { id: String },
    List {
        /// Only unfinished sessions
        #[arg(long)]
        active: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Args)]
pub struct StartArgs {
    /// movie, tv, book, comic or shortstory
    #[arg(long)]
    pub media_type: String,
    #[arg(long)]
    pub title: String,
    /// Catalog plex key
    #[arg(long, conflicts_with = "item")]
    pub plex_key: Option<String>,
    /// Custom order item id
    #[arg(long)]
    pub item: Option<String>,
    #[arg(long)]
    pub series_id: Option<String>,
    #[arg(long)]
    pub series_title: Option<String>,
    #[arg(long)]
    pub season: Option<i64>,
    #[arg(long)]
    pub episode: Option<i64>,
}

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Print stored weights and the current effective split
    Show,
    Set {
        #[arg(long)]
        tv: Option<u32>,
        #[arg(long)]
        movies: Option<u32>,
        #[arg(long)]
        custom: Option<u32>,
        /// Chance (percent) of continuing a movie's collection
        #[arg(long)]
        collection: Option<u32>,
    },
}
