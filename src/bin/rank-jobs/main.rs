mod args;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use itertools::Itertools;
use rank_tracker_jobs::api::HttpKeywordApi;
use rank_tracker_jobs::notifier::Notifier;
use rank_tracker_jobs::persistence::FileStore;
use rank_tracker_jobs::poller::Poller;
use rank_tracker_jobs::settings::Settings;
use rank_tracker_jobs::store::{JobStore, StoreOptions};
use rank_tracker_jobs::types::job::JobId;
use rank_tracker_jobs::types::protocol::{CreateKeywordsRequest, Location};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::{AddArgs, Args, Command};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging
    let level = if args.debug {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    if args.debug {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = signal::ctrl_c().await {
                warn!(%error, "something strange with ctrl-c handling!");
            };
            cancel.cancel();
        });
    }

    if let Err(error) = begin(args, cancel).await {
        error!(error = %format!("{error:#}"), "encountered runtime error");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::from_yaml_file(path)?,
        None => Settings::default(),
    };

    if let Some(api_url) = &args.api_url {
        settings.api_url = api_url.clone();
    }
    if let Some(token) = &args.api_token {
        settings.api_token = Some(token.clone());
    }
    if let Some(dir) = &args.storage_dir {
        settings.storage_dir = dir.clone();
    }

    settings.validate()?;
    Ok(settings)
}

async fn begin(args: Args, cancel: CancellationToken) -> Result<()> {
    let settings = load_settings(&args)?;

    let api = HttpKeywordApi::new(
        &settings.api_url,
        settings.api_token.clone(),
        settings.request_timeout(),
    )
    .context("building HTTP client")?;
    let kv = FileStore::open(&settings.storage_dir)
        .context("opening job storage")?;
    let store = Arc::new(
        JobStore::open(
            Arc::new(api),
            Arc::new(kv),
            Notifier::new(),
            StoreOptions::from(&settings),
        )
        .context("loading jobs")?,
    );
    let poller = Poller::new(store.clone(), settings.poll_interval());

    match args.command {
        Command::Add(add) => {
            let wait = add.wait;
            let outcome = store.add_keywords(create_request(add)).await;
            if !outcome.success {
                anyhow::bail!(
                    "keyword API refused keywords for domain {}",
                    outcome.domain
                );
            }
            info!(
                job = ?outcome.job_id.map(|id| id.to_string()),
                domain = outcome.domain,
                "keywords submitted"
            );

            if wait {
                watch(&store, &poller, &cancel).await;
            }
        },
        Command::List => {
            let jobs = store.jobs();
            print!("{}", serde_yaml::to_string(&jobs)?);
        },
        Command::Remove { id } => {
            let id: JobId = id.parse().context("parsing job id")?;
            match store.remove_job(id) {
                Some(_) => info!(%id, "job removed"),
                None => warn!(%id, "no such job"),
            }
        },
        Command::Clear => {
            let removed = store.clear_finished();
            info!(removed, "cleared finished jobs");
        },
        Command::Watch => watch(&store, &poller, &cancel).await,
    }

    Ok(())
}

fn create_request(add: AddArgs) -> CreateKeywordsRequest {
    let location = add
        .country
        .zip(add.device)
        .map(|(country, device)| Location { country, device });

    CreateKeywordsRequest {
        keywords: add.keywords,
        domain: add.domain,
        star_keyword: add.star,
        location,
        tags: (!add.tags.is_empty()).then_some(add.tags),
    }
}

/// Polls until no job is pending, then reports the domains that changed.
async fn watch(store: &JobStore, poller: &Poller, cancel: &CancellationToken) {
    let domains = store
        .jobs()
        .into_iter()
        .filter(|j| j.is_pending())
        .filter_map(|j| j.domain)
        .unique()
        .collect_vec();
    let mut subscriptions = domains
        .iter()
        .map(|d| store.notifier().subscribe(d.as_str()))
        .collect_vec();

    info!(
        pending = store.pending_count(),
        domains = %domains.join(","),
        "watching"
    );
    poller.run_until_idle(cancel).await;

    for sub in &mut subscriptions {
        while let Some(signal) = sub.try_recv() {
            info!(
                domain = %signal.domain_id,
                at = %signal.timestamp,
                source = %signal.source,
                "keyword data changed"
            );
        }
    }

    for job in store.jobs() {
        info!(id = %job.id, domain = ?job.domain, state = %job.state, "job");
    }
}
