use crate::error::{ErrorKind, Result};
use booksing_catalog::{Database, ListFilter, Repository};
use booksing_config::Config;
use booksing_extract::DefaultParser;
use booksing_library::{Context, DEFAULT_TEMPLATE, Pipeline, PipelineOptions, PathGenerator};
use booksing_search::{MeiliIndex, SearchHandle, SearchIndex};
use booksing_storage::BackendHandle;
use booksing_storage::backend::LocalBackend;
use exn::ResultExt;
use serde_json::json;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).or_raise(|| ErrorKind::Output)?;
    println!("{text}");
    Ok(())
}

fn directory(name: &'static str, path: &Path) -> Result<BackendHandle> {
    let path = std::path::absolute(path).or_raise(|| ErrorKind::Startup(name))?;
    let backend = LocalBackend::new(name, path).or_raise(|| ErrorKind::Startup(name))?;
    Ok(Arc::new(backend))
}

async fn catalog(config: &Config) -> Result<Database> {
    let path = config.database_path().or_raise(|| ErrorKind::Startup("catalog"))?;
    Database::connect(path).await.or_raise(|| ErrorKind::Startup("catalog"))
}

async fn search_index(config: &Config) -> Result<MeiliIndex> {
    let meili = &config.meili;
    let offset = config.utc_offset().or_raise(|| ErrorKind::Startup("timezone"))?;
    let index = MeiliIndex::connect(&meili.host, &meili.index, meili.key.as_deref())
        .await
        .or_raise(|| ErrorKind::Startup("search index"))?;
    Ok(index.with_utc_offset(offset))
}

async fn context(config: &Config, db: &Database) -> Result<Context> {
    let template = config
        .template
        .as_deref()
        .unwrap_or(DEFAULT_TEMPLATE)
        .parse::<PathGenerator>()
        .or_raise(|| ErrorKind::Startup("path template"))?;
    let index: SearchHandle = Arc::new(search_index(config).await?);
    Ok(Context {
        import: directory("import", &config.import_dir())?,
        library: directory("library", &config.book_dir)?,
        quarantine: directory("quarantine", &config.fail_dir)?,
        catalog: Repository::from(db),
        index,
        parser: Arc::new(DefaultParser),
        template,
    })
}

fn options(config: &Config, periodic: bool) -> PipelineOptions {
    PipelineOptions {
        workers: config.workers,
        batch_size: config.batch_size,
        save_interval: config.save_interval,
        scan_interval: if periodic { config.scan_interval() } else { None },
        cycle_timeout: config.cycle_timeout,
        recursive: config.recursive,
        index_buffer: config.index_buffer,
        ..PipelineOptions::default()
    }
}

pub async fn serve(config: &Config) -> Result<ExitCode> {
    let db = catalog(config).await?;
    let pipeline = Pipeline::start(context(config, &db).await?, options(config, true));
    if config.scan_interval().is_none() {
        warn!("scan_interval is 0s; the import directory will not be scanned");
    }
    let cancel = pipeline.cancellation_token();
    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("interrupted; shutting down"),
            Err(e) => warn!(error = %e, "unable to listen for Ctrl-C; shutting down"),
        },
        _ = cancel.cancelled() => {},
    }
    let status = pipeline.status();
    pipeline.shutdown().await.or_raise(|| ErrorKind::Command("shutdown"))?;
    db.close().await;
    print_json(&status)?;
    Ok(ExitCode::SUCCESS)
}

pub async fn import(config: &Config) -> Result<ExitCode> {
    let db = catalog(config).await?;
    let pipeline = Pipeline::start(context(config, &db).await?, options(config, false));
    let cycle = pipeline.refresh().await.or_raise(|| ErrorKind::Command("import"));
    let flushed = pipeline.flush(true).await.or_raise(|| ErrorKind::Command("index flush"));
    let status = pipeline.status();
    pipeline.shutdown().await.or_raise(|| ErrorKind::Command("shutdown"))?;
    db.close().await;
    cycle?;
    if let Err(e) = flushed {
        // The catalog is complete; only the index lags behind.
        warn!(error = ?e, "search index is behind the catalog; run `booksing reindex`");
    }
    print_json(&status)?;
    Ok(ExitCode::SUCCESS)
}

pub async fn search(config: &Config, query: &str, limit: usize, offset: usize) -> Result<ExitCode> {
    let index = search_index(config).await?;
    let books = index.search(query, limit, offset).await.or_raise(|| ErrorKind::Command("search"))?;
    print_json(&books)?;
    Ok(ExitCode::SUCCESS)
}

pub async fn list(config: &Config, filter: &ListFilter, limit: usize, offset: usize) -> Result<ExitCode> {
    let db = catalog(config).await?;
    let repo = Repository::from(&db);
    let books = repo.list(filter, limit, offset).await.or_raise(|| ErrorKind::Command("list"))?;
    let total = repo.count().await.or_raise(|| ErrorKind::Command("list"))?;
    db.close().await;
    print_json(&json!({ "total": total, "books": books }))?;
    Ok(ExitCode::SUCCESS)
}

pub async fn reindex(config: &Config) -> Result<ExitCode> {
    let db = catalog(config).await?;
    let index = search_index(config).await?;
    let count = booksing_library::reindex(&Repository::from(&db), &index, config.batch_size)
        .await
        .or_raise(|| ErrorKind::Command("reindex"))?;
    db.close().await;
    print_json(&json!({ "indexed": count }))?;
    Ok(ExitCode::SUCCESS)
}

/// Goes through the aggregator, the one writer to the catalog.
pub async fn remove(config: &Config, hash: &str) -> Result<ExitCode> {
    let db = catalog(config).await?;
    let pipeline = Pipeline::start(context(config, &db).await?, options(config, false));
    let removed = pipeline.remove(hash).await.or_raise(|| ErrorKind::Command("remove"));
    pipeline.shutdown().await.or_raise(|| ErrorKind::Command("shutdown"))?;
    db.close().await;
    let removed = removed?;
    print_json(&json!({ "hash": hash, "removed": removed }))?;
    Ok(if removed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
