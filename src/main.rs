//! booksing: files e-books dropped into an import directory into a
//! deduplicated, searchable library.

use booksing_config::Config;
use booksing_extract::models::Format;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

mod commands;
mod error;
mod logging;

#[derive(Parser)]
#[command(name = "booksing", version, about)]
struct Cli {
    /// Config file (toml, yaml or json). Looked up in the working directory
    /// and the platform config directory when omitted.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the import directory until interrupted.
    Serve,
    /// Run one scan cycle, wait for the search index, and print the counters.
    Import,
    /// Full-text search. Without a query, the most recent additions.
    Search {
        query: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },
    /// Browse the catalog directly, newest first.
    List {
        /// Substring of the title or author.
        text: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long, value_parser = parse_format)]
        format: Option<Format>,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
    },
    /// Rebuild the search index from the catalog.
    Reindex,
    /// Delete a book from the library, the catalog and the search index.
    Remove { hash: String },
}

fn parse_format(value: &str) -> Result<Format, String> {
    value.parse().map_err(|_| format!("unknown format {value:?}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:?}");
            return ExitCode::FAILURE;
        },
    };
    logging::init(&config.log_level);

    let result = match cli.command {
        Command::Serve => commands::serve(&config).await,
        Command::Import => commands::import(&config).await,
        Command::Search { query, limit, offset } => {
            commands::search(&config, query.as_deref().unwrap_or_default(), limit, offset).await
        },
        Command::List {
            text,
            author,
            format,
            limit,
            offset,
        } => {
            let filter = booksing_catalog::ListFilter { text, author, format };
            commands::list(&config, &filter, limit, offset).await
        },
        Command::Reindex => commands::reindex(&config).await,
        Command::Remove { hash } => commands::remove(&config, &hash).await,
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "command failed");
            ExitCode::FAILURE
        },
    }
}
