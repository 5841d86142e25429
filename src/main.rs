use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing::info;

use fbr_refdata::cache::{CacheResult, CacheStatus, LookupOptions};
use fbr_refdata::config::Config;
use fbr_refdata::fbr::{Environment, ReferenceEntry, ReferenceKind};

#[derive(Parser, Debug)]
#[command(name = "fbr-refdata")]
#[command(about = "Inspect and refresh cached FBR reference data")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/fbr-refdata/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Gateway environment whose token is used
  #[arg(short, long, value_enum)]
  env: Option<Environment>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print a whole reference table
  Table {
    #[arg(value_enum)]
    kind: ReferenceKind,

    /// Ignore the cache and ask the gateway
    #[arg(long)]
    refresh: bool,
  },

  /// Print the units of measure valid for an HS code
  Uom {
    hs_code: String,

    /// Tax rate of the invoice line (e.g. "18%" or "1.00/bill")
    #[arg(long)]
    rate: Option<String>,

    #[arg(long)]
    refresh: bool,
  },

  /// Search a cached table by key or description
  Search {
    term: String,

    #[arg(long, value_enum, default_value = "hs-codes")]
    kind: ReferenceKind,

    #[arg(long, default_value_t = 20)]
    limit: usize,
  },

  /// Show what is cached
  Status {
    #[arg(long, value_enum)]
    kind: Option<ReferenceKind>,
  },

  /// Remove cached data
  Clear {
    #[arg(long, value_enum)]
    kind: Option<ReferenceKind>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = fbr_refdata::logging::init(args.verbose)?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let environment = args.env.unwrap_or(config.default_environment);
  let cache = fbr_refdata::open_cache(&config)?;

  match args.command {
    Command::Table { kind, refresh } => {
      let result = cache.get_all_detailed(kind, environment, refresh).await;
      print_result(&result);
    }
    Command::Uom {
      hs_code,
      rate,
      refresh,
    } => {
      let options = LookupOptions {
        force_refresh: refresh,
        rate: rate.as_deref(),
      };
      let result = cache
        .get_one_detailed(ReferenceKind::Uom, &hs_code, environment, options)
        .await;
      print_result(&result);
    }
    Command::Search { term, kind, limit } => {
      print_entries(&cache.search_local(kind, &term, limit));
    }
    Command::Status { kind } => {
      print_status(&cache.status(kind));
    }
    Command::Clear { kind } => {
      cache.clear(kind);
      info!(kind = ?kind, "Cache cleared");
      eprintln!("cleared {}", kind.map_or("all reference data".to_string(), |k| k.to_string()));
    }
  }

  Ok(())
}

fn print_result(result: &CacheResult<Vec<ReferenceEntry>>) {
  print_entries(&result.data);

  let fetched = result
    .fetched_at
    .map(|t| format!(", fetched {}", t.to_rfc3339()))
    .unwrap_or_default();
  eprintln!(
    "{} entries from {}{}",
    result.data.len(),
    result.source.as_str(),
    fetched
  );
}

fn print_entries(entries: &[ReferenceEntry]) {
  for entry in entries {
    println!("{}\t{}", entry.key, entry.description);
  }
}

fn print_status(status: &CacheStatus) {
  println!("present:      {}", status.present);
  println!("slots:        {}", status.slots);
  println!("entries:      {}", status.size);
  println!("valid:        {}", status.valid);
  println!(
    "last fetched: {}",
    status
      .last_fetched_at
      .map(|t| t.to_rfc3339())
      .unwrap_or_else(|| "never".to_string())
  );
}
