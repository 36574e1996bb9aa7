use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use ecomap::{
    Cli, FanoutSink, JsonlPageSource, JsonlTextStore, PgGraphStore, Pipeline, Roster,
    RosterResolver,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let controls = cli.build_controls()?;
    let roster = Roster::load(&cli.roster)
        .with_context(|| format!("failed to load roster {}", cli.roster.display()))?;
    info!(path = %cli.roster.display(), names = roster.len(), "roster loaded");
    let source = JsonlPageSource::open(&cli.input)
        .with_context(|| format!("failed to open page dump {}", cli.input.display()))?;
    info!(path = %cli.input.display(), pages = source.page_count(), "page dump loaded");

    let stages = controls.stages();
    let mut sink = if cli.dry_run {
        info!("dry run; nothing will be written");
        FanoutSink::discard()
    } else {
        let text = if stages.text {
            Some(JsonlTextStore::open(&cli.text_output)?)
        } else {
            None
        };
        let graph = match (&cli.database_url, stages.needs_graph_store()) {
            (Some(url), true) => Some(
                PgGraphStore::connect(url, &cli.schema, cli.prepare_tables)
                    .await
                    .context("failed to set up postgres output")?,
            ),
            _ => None,
        };
        FanoutSink::<JsonlTextStore, PgGraphStore>::new(stages, text, graph)
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing the current site");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let resolver = RosterResolver::new(Arc::new(roster), controls.resolver());
    let pipeline = Pipeline::new(resolver, controls);
    let started = Instant::now();
    match pipeline.run(&source, &mut sink, &stop).await {
        Ok(summary) => {
            summary.report(started.elapsed());
            Ok(())
        }
        Err(failure) => {
            failure.summary.report(started.elapsed());
            Err(failure.error).context("preprocess run aborted")
        }
    }
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid RUST_LOG filter")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
