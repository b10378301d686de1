#![forbid(unsafe_code)]

use error_iter::ErrorIter as _;
use gaincount::client::smbs::SmbsClient;
use gaincount::imports::etrade::{required_dates, write_krw_columns};
use gaincount::model::{default_fx_cache_path, FxRateCache, FxResolver, Stats};
use gaincount::util::text::group_thousands;
use onlyargs::{CliError, OnlyArgs as _};
use onlyargs_derive::OnlyArgs;
use std::{path::PathBuf, process::ExitCode};
use thiserror::Error;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Debug, Error)]
enum Error {
    #[error("CLI error")]
    Cli(#[from] CliError),

    #[error("E*Trade export error")]
    Export(#[from] gaincount::errors::AdapterError),

    #[error("Exchange rate cache error")]
    FxCache(#[from] gaincount::errors::FxCacheError),

    #[error("Exchange rates missing for {0} dates")]
    MissingRates(usize),
}

/// Add USD/KRW exchange rates and KRW amounts to an E*Trade gains & losses CSV.
#[derive(Debug, OnlyArgs)]
#[footer = "Dates without a cached rate are listed and nothing is written."]
#[footer = "Use --fetch to retrieve them, or add them to the cache by hand."]
struct Args {
    /// Read the E*Trade gains & losses CSV from a file.
    input: PathBuf,

    /// Write the annotated CSV to a file.
    #[short('o')]
    output: PathBuf,

    /// Path to the exchange rate cache.
    ///   Default is "usd_krw_rates.json" in the user data directory.
    fx_cache: Option<PathBuf>,

    /// Fetch rates missing from the cache.
    #[long]
    fetch: bool,
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, Error::Cli(_)) {
                eprintln!("{}", Args::HELP);
            }

            eprintln!("Error: {err}");
            for source in err.sources().skip(1) {
                eprintln!("  Caused by: {source}");
            }

            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Error> {
    let args: Args = onlyargs::parse()?;

    let path = match args.fx_cache {
        Some(path) => path,
        None => default_fx_cache_path()?,
    };
    let cache = FxRateCache::load(&path)?;
    let mut resolver = FxResolver::new(cache, args.fetch.then(SmbsClient::from_env));

    let missing: Vec<_> = required_dates(&args.input)?
        .into_iter()
        .filter(|date| resolver.resolve(*date).is_err())
        .collect();
    resolver.save_fetched(&path)?;
    if !missing.is_empty() {
        println!("Missing exchange rates:");
        for date in &missing {
            println!("  {date}\t{}", date.date().format("%Y%m%d"));
        }
        println!();

        return Err(Error::MissingRates(missing.len()));
    }

    let mut stats = Stats::default();
    let totals = write_krw_columns(&mut stats, &args.input, &args.output, &mut resolver)?;

    println!("Rows written:\t\t{}", totals.rows);
    println!("Total Gain/Loss:\t${:.2}", totals.gain_usd);
    println!("Total Gain/Loss (KRW):\t{}", group_thousands(totals.gain_krw));

    Ok(())
}
