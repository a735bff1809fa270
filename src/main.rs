mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, OrderCommand, SessionCommand, SettingsCommand, StartArgs};
use nextup::prelude::*;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn session_subject(args: StartArgs) -> Result<SessionSubject> {
    let media_type: MediaType = args.media_type.parse()?;
    let subject = match (args.plex_key, args.item) {
        (Some(plex_key), None) => SubjectRef::Catalog { plex_key },
        (None, Some(item_id)) => SubjectRef::CustomOrderItem { item_id },
        _ => bail!("pass exactly one of --plex-key or --item"),
    };
    Ok(SessionSubject {
        subject,
        media_type,
        title: args.title,
        series_id: args.series_id,
        series_title: args.series_title,
        season_number: args.season,
        episode_number: args.episode,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nextup=info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database_url = Some(url);
    }
    let app = Nextup::connect(&config).await?;

    match cli.command {
        Commands::Next => match app.select_next().await {
            Ok(item) => print_json(&item)?,
            Err(NextupError::NoEligibleContent) => println!("Nothing to watch."),
            Err(e) => return Err(e.into()),
        },
        Commands::Episode { series_id } => match app.next_episode(&series_id).await {
            Ok(ep) => print_json(&ep)?,
            Err(e @ NextupError::AllWatched { .. }) => println!("{e}"),
            Err(e) => return Err(e.into()),
        },
        Commands::Order { command } => match command {
            OrderCommand::Next => print_json(&app.next_custom_order_item().await?)?,
            OrderCommand::Watched { item_id } => print_json(&app.mark_custom_order_item_watched(&item_id).await?)?,
            OrderCommand::BookProgress { item_id, page, page_count } => {
                print_json(&app.record_book_progress(&item_id, page, page_count).await?)?
            }
        },
        Commands::Session { command } => match command {
            SessionCommand::Start(args) => print_json(&app.start_session(&session_subject(args)?).await?)?,
            SessionCommand::Pause { id } => print_json(&app.pause_session(&id).await?)?,
            SessionCommand::Resume { id } => print_json(&app.resume_session(&id).await?)?,
            SessionCommand::Complete { id, minutes } => print_json(&app.complete_session(&id, minutes).await?)?,
            SessionCommand::Delete { id } => {
                app.delete_session(&id).await?;
                println!("Deleted session {id}");
            }
            SessionCommand::List { active, limit } => {
                let filter = SessionFilter { subject: None, active_only: active, limit };
                print_json(&app.list_sessions(&filter).await?)?
            }
        },
        Commands::Settings { command } => match command {
            SettingsCommand::Show => {
                let settings = app.settings().await?;
                print_json(&settings)?;
                for (category, weight) in app.category_weights().await? {
                    println!("{:>13}: {weight:5.1}%", category.as_str());
                }
            }
            SettingsCommand::Set { tv, movies, custom, collection } => {
                let update = SettingsUpdate {
                    tv_general_percent: tv,
                    movies_general_percent: movies,
                    custom_order_percent: custom,
                    partially_watched_collection_percent: collection,
                };
                if update.is_empty() {
                    bail!("nothing to update; pass at least one of --tv, --movies, --custom, --collection");
                }
                print_json(&app.update_settings(&update).await?)?
            }
        },
        Commands::Import { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let seed: CatalogSeed = serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;
            print_json(&app.import_catalog(&seed).await?)?
        }
    }
    Ok(())
}
