mod checkpoint;
mod collector;
mod enrich;
mod error;
mod extract;
mod fetch;
mod frontier;
mod interrupt;
mod model;
mod resume;
mod retry;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use checkpoint::{CheckpointStore, ExportPaths};
use extract::{DetailExtractor, ListingExtractor};
use fetch::HttpFetcher;
use resume::ResumePlan;
use retry::RetryPolicy;
use settings::Settings;

#[derive(Parser)]
#[command(name = "skins_scraper", about = "Skin market catalog scraper with resumable enrichment")]
struct Cli {
    /// Configuration file (default: ./skins_scraper.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep every catalog page and write the item list
    Collect {
        /// Skip image downloads
        #[arg(long)]
        no_images: bool,
        /// Override the page count of every category
        #[arg(short, long)]
        pages: Option<u32>,
        /// Output file (default: paths.items)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Fetch detail pages for pending items, checkpointing after each one
    Enrich {
        /// Input item list (default: paths.items)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Max items to enrich this run
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show checkpoint statistics
    Stats,
    /// Write completed records and pending items as JSON
    Export {
        #[arg(long)]
        records: Option<PathBuf>,
        #[arg(long)]
        pending: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Collect {
            no_images,
            pages,
            out,
        } => {
            let mut categories = settings.categories.clone();
            if let Some(n) = pages {
                categories.iter_mut().for_each(|c| c.pages = n);
            }
            let out = out.unwrap_or_else(|| settings.paths.items.clone());
            let opts = collector::CollectOptions {
                page_timeout: settings.fetch.page_timeout(),
                image_timeout: settings.fetch.image_timeout(),
                image_dir: (!no_images).then(|| settings.paths.images.clone()),
            };

            let mut fetcher = HttpFetcher::new(&settings.fetch)?;
            let extractor = ListingExtractor::new(&settings.selectors)?;
            let (batch, stats) = collector::collect(&mut fetcher, &extractor, &categories, &opts)
                .await
                .context("Collection aborted, previous output left untouched")?;

            checkpoint::write_json_atomic(&out, &batch)
                .with_context(|| format!("Failed to write {:?}", out))?;
            println!(
                "Collected {} items from {} pages ({} pages failed). Saved to {:?}",
                stats.kept, stats.pages, stats.failed_pages, out
            );
            Ok(())
        }
        Commands::Enrich { input, limit } => {
            let input = input.unwrap_or_else(|| settings.paths.items.clone());
            let store = open_store(&settings)?;
            let raw = resume::read_input(&input)?;

            match resume::plan(&store, raw)? {
                ResumePlan::NothingRequested => {
                    println!("{:?} lists no items. Run 'collect' first.", input);
                    Ok(())
                }
                ResumePlan::NothingToDo { completed } => {
                    store.flush()?;
                    println!("All {} items are already enriched.", completed);
                    Ok(())
                }
                ResumePlan::Pending {
                    frontier,
                    completed,
                } => {
                    println!(
                        "Enriching {} items ({} already done)...",
                        frontier.len(),
                        completed
                    );

                    let cancel = CancellationToken::new();
                    interrupt::install(cancel.clone());

                    let mut ctx = enrich::PipelineContext {
                        fetcher: HttpFetcher::new(&settings.fetch)?,
                        extractor: DetailExtractor::new(&settings.selectors)?,
                        retry: RetryPolicy::from_settings(
                            &settings.retry,
                            settings.fetch.page_timeout(),
                        ),
                        store,
                        cancel,
                        limit,
                    };
                    let stats = enrich::run(&mut ctx, frontier)
                        .await
                        .context("Checkpoint write failed, stopping")?;

                    if stats.interrupted {
                        println!(
                            "Interrupted. Progress saved: {} enriched this run, {} pending.",
                            stats.processed, stats.remaining
                        );
                    } else {
                        println!(
                            "Done: {} enriched ({} ok, {} degraded), {} pending.",
                            stats.processed, stats.ok, stats.degraded, stats.remaining
                        );
                    }
                    Ok(())
                }
            }
        }
        Commands::Stats => {
            let store = open_store(&settings)?;
            let s = store.stats()?;
            println!("Completed: {}", s.completed);
            println!("Degraded:  {}", s.degraded);
            println!("Pending:   {}", s.pending);
            Ok(())
        }
        Commands::Export { records, pending } => {
            let store = open_store(&settings)?;
            let records = records.unwrap_or_else(|| settings.paths.records_export.clone());
            let pending = pending.unwrap_or_else(|| settings.paths.pending_export.clone());
            store.export(&records, &pending)?;
            println!("Wrote {:?} and {:?}", records, pending);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &Settings) -> anyhow::Result<CheckpointStore> {
    let path = &settings.paths.checkpoint_db;
    let store = CheckpointStore::open(path)
        .with_context(|| format!("Failed to open checkpoint {:?}", path))?
        .with_exports(ExportPaths {
            records: settings.paths.records_export.clone(),
            pending: settings.paths.pending_export.clone(),
        });
    Ok(store)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
