#![forbid(unsafe_code)]

use error_iter::ErrorIter as _;
use gaincount::client::smbs::SmbsClient;
use gaincount::model::{default_fx_cache_path, FxRateCache, FxResolver, RateDate};
use onlyargs::{CliError, OnlyArgs as _};
use onlyargs_derive::OnlyArgs;
use std::{path::PathBuf, process::ExitCode};
use thiserror::Error;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Debug, Error)]
enum Error {
    #[error("CLI error")]
    Cli(#[from] CliError),

    #[error("Date parsing error")]
    Date(#[from] chrono::ParseError),

    #[error("Exchange rate cache error")]
    FxCache(#[from] gaincount::errors::FxCacheError),

    #[error("Exchange rate error")]
    ExchangeRate(#[from] gaincount::errors::ExchangeRateError),
}

/// Query the gaincount USD/KRW exchange rate cache.
#[derive(Debug, OnlyArgs)]
struct Args {
    /// Lookup date, e.g. "01/31/2024" or "2024-01-31".
    date: String,

    /// Path to the exchange rate cache.
    ///   Default is "usd_krw_rates.json" in the user data directory.
    fx_cache: Option<PathBuf>,

    /// Fetch and store the rate when it is not cached.
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

    let date: RateDate = args.date.parse()?;
    let path = match args.fx_cache {
        Some(path) => path,
        None => default_fx_cache_path()?,
    };
    let cache = FxRateCache::load(&path)?;
    let mut resolver = FxResolver::new(cache, args.fetch.then(SmbsClient::from_env));

    let rate = resolver.resolve(date);
    resolver.save_fetched(&path)?;
    let rate = rate?;

    println!("date:\t{date}");
    println!("rate:\t{rate} KRW");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_flags() {
        assert!(Args::HELP.contains("--fetch"));
        assert!(Args::HELP.contains("--fx-cache"));
    }
}
