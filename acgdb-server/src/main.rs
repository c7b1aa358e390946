mod cli;
mod mirror;

use acgdb::{AnimeEntry, Category, Character, MangaEntry, Person, Store, StoreConfig, TableKind};

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = cli::load_args()?;
    cli::init_logging(&args.log_config)?;

    let config = StoreConfig::default()
        .with_directory(&args.directory)
        .with_save_on_close(!args.ephemeral || args.command == cli::Subcommand::Migrate)
        .with_production(args.production);

    let store = Arc::new(Store::new(config));
    store
        .init()
        .await
        .with_context(|| format!("could not load the store at `{}`", args.directory.display()))?;

    match args.command {
        cli::Subcommand::Run => {
            info!("starting acgdb...");
            log_sizes(&store).await?;
            run(store, args.mirror_interval).await?;
            Ok(ExitCode::SUCCESS)
        }

        cli::Subcommand::Check => {
            let violations = store.verify_integrity().await?;
            for violation in &violations {
                println!("{}", violation);
            }

            if violations.is_empty() {
                info!("the store contains no dangling references");
                Ok(ExitCode::SUCCESS)
            } else {
                warn!(count = violations.len(), "the store contains dangling references");
                Ok(ExitCode::FAILURE)
            }
        }

        cli::Subcommand::Migrate => {
            store.close().await?;
            info!("every table is at its current version");
            Ok(ExitCode::SUCCESS)
        }

        cli::Subcommand::Stats => {
            for (kind, rows) in sizes(&store).await? {
                println!("{:<10} {}", kind, rows);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Keeps the store open until Ctrl-C, then saves it.
async fn run(store: Arc<Store>, mirror_interval: u64) -> anyhow::Result<()> {
    // false - running, true - stopping
    let (state, mut stopping) = watch::channel(false);

    ctrlc::set_handler(move || {
        state.send(true).ok();
    })
    .context("couldn't set exit handler")?;

    let mirror = if mirror_interval > 0 {
        let store = store.clone();
        let stopping = stopping.clone();
        Some(tokio::spawn(async move {
            mirror::mirror_handler(store, mirror_interval, stopping).await;
        }))
    } else {
        None
    };

    while !*stopping.borrow() {
        if stopping.changed().await.is_err() {
            break;
        }
    }

    info!("waiting for the store to be saved...");
    if let Some(mirror) = mirror {
        mirror.await.ok();
    }

    store.close().await?;
    info!("exiting the program");

    Ok(())
}

async fn sizes(store: &Store) -> anyhow::Result<Vec<(TableKind, usize)>> {
    Ok(vec![
        (TableKind::Category, store.len::<Category>().await?),
        (TableKind::Person, store.len::<Person>().await?),
        (TableKind::Anime, store.len::<AnimeEntry>().await?),
        (TableKind::Manga, store.len::<MangaEntry>().await?),
        (TableKind::Character, store.len::<Character>().await?),
    ])
}

async fn log_sizes(store: &Store) -> anyhow::Result<()> {
    for (kind, rows) in sizes(store).await? {
        info!(table = %kind, rows, "table loaded");
    }

    Ok(())
}
