#![forbid(unsafe_code)]

use error_iter::ErrorIter as _;
use gaincount::client::smbs::SmbsClient;
use gaincount::errors::{FxCacheError, ImportError, ScheduleError, TaxError};
use gaincount::imports::{build_schedule, AdapterConfig};
use gaincount::model::{default_fx_cache_path, FxRateCache, FxResolver};
use gaincount::model::{Stats, TaxPolicy, TaxSummary};
use gaincount::util::year_ext::CheckYearsExt as _;
use is_terminal::IsTerminal as _;
use onlyargs::{CliError, OnlyArgs as _};
use onlyargs_derive::OnlyArgs;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::{env, process::ExitCode};
use thiserror::Error;
use tracing::{debug, error, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

/// Build the overseas stock capital gains schedule and compute the tax payable.
#[derive(Debug, OnlyArgs)]
#[footer = "Input files are matched to a brokerage by file name:"]
#[footer = "  `kiwoom`, `etrade`, or `miraeasset` anywhere in the name (any case)."]
#[footer = "  Other files are skipped."]
#[footer = ""]
#[footer = "Additional environment variables:"]
#[footer = "  - FX_RATE_URL overrides the exchange rate page used with --fetch"]
#[footer = "      default is \"http://www.smbs.biz/ExRate/TodayExRate.jsp\""]
#[footer = "  - TERM_COLOR accepts \"always\" to override automatic terminal sensing"]
struct Args {
    /// Read brokerage CSV exports from a file, or every `*.csv`
    ///   in a directory.
    #[long]
    input: Vec<PathBuf>,

    /// Write the schedule CSV to this file.
    ///   Printed to stdout when not given.
    #[short('o')]
    output: Option<PathBuf>,

    /// Read schedule rows from a CSV with the schedule headers.
    ///   These rows come first in the output.
    #[long]
    template: Option<PathBuf>,

    /// Override the USD/KRW exchange rate cache file.
    ///   Default is "usd_krw_rates.json" in the user data directory.
    #[long]
    fx_cache: Option<PathBuf>,

    /// Fetch exchange rates missing from the cache.
    ///   Fetched rates are added to the cache.
    #[long]
    fetch: bool,

    /// Basic deduction in KRW.
    #[long]
    #[default("2500000")]
    deduction: String,

    /// Tax rate applied to the tax base.
    #[long]
    #[default("0.22")]
    tax_rate: String,

    /// Security name assigned to E*Trade rows.
    #[long]
    #[default("퀄컴")]
    etrade_name: String,

    /// ISIN assigned to E*Trade rows.
    #[long]
    #[default("US7475251036")]
    etrade_isin: String,

    /// Enable verbose output.
    /// Prints the schedule and import statistics to stdout.
    verbose: bool,
}

#[derive(Debug, Error)]
enum Error {
    #[error("Argument parsing error")]
    Args(#[from] CliError),

    #[error("No input files given")]
    NoInput,

    #[error("Invalid deduction `{0}`")]
    Deduction(String, #[source] std::num::ParseIntError),

    #[error("Invalid tax rate `{0}`")]
    TaxRate(String, #[source] rust_decimal::Error),

    #[error("Invalid tax policy")]
    Tax(#[from] TaxError),

    #[error("Exchange rate cache error: {0:?}")]
    FxCache(PathBuf, #[source] FxCacheError),

    #[error("Unable to locate exchange rate cache")]
    FxCachePath(#[source] FxCacheError),

    #[error("Import error")]
    Import(#[from] ImportError),

    #[error("Unable to write schedule {0:?}")]
    Output(PathBuf, #[source] ScheduleError),
}

fn main() -> ExitCode {
    // Initialize the tracing subscriber for instrumentation.
    // Uses the `RUST_LOG` environment var for configuration. E.g. `RUST_LOG=debug cargo run`
    // This is very useful to see the input CSV row that caused an error.
    //
    // See: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/struct.EnvFilter.html#directives
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let term_color = env::var("TERM_COLOR")
        .map(|color| color == "always")
        .unwrap_or_else(|_| std::io::stdout().is_terminal());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(term_color))
        .with(env_filter)
        .init();

    match run(onlyargs::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err, Error::Args(_) | Error::NoInput) {
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

fn run(args: Result<Args, CliError>) -> Result<(), Error> {
    let args = args?;
    if args.input.is_empty() {
        return Err(Error::NoInput);
    }

    let deduction: i64 = args
        .deduction
        .parse()
        .map_err(|err| Error::Deduction(args.deduction.clone(), err))?;
    let rate: Decimal = args
        .tax_rate
        .parse()
        .map_err(|err| Error::TaxRate(args.tax_rate.clone(), err))?;
    let policy = TaxPolicy::new(deduction, rate)?;
    let config = AdapterConfig {
        etrade_name: args.etrade_name,
        etrade_isin: args.etrade_isin,
    };

    let fx_cache_path = match args.fx_cache {
        Some(path) => path,
        None => default_fx_cache_path().map_err(Error::FxCachePath)?,
    };
    let cache = FxRateCache::load(&fx_cache_path)
        .map_err(|err| Error::FxCache(fx_cache_path.clone(), err))?;
    debug!("{} cached exchange rates", cache.len());

    let source = args.fetch.then(SmbsClient::from_env);
    let mut resolver = FxResolver::new(cache, source);
    let mut stats = Stats::default();

    let result = build_schedule(
        &mut stats,
        &args.input,
        args.template.as_deref(),
        &config,
        &mut resolver,
    );

    // Fetched rates are kept even when the run fails.
    if let Err(err) = resolver.save_fetched(&fx_cache_path) {
        let err = Error::FxCache(fx_cache_path, err);
        if result.is_ok() {
            return Err(err);
        }
        error!("{err}");
    }

    let schedule = result?;

    if let Some(year) = schedule.records().get_first_year() {
        if let Err(years) = schedule.records().check_years(year) {
            warn!("Multiple years found in schedule: Expected {year}, found {years:?}");
        }
    }

    let summary = TaxSummary::compute(schedule.iter(), &policy)?;

    if let Some(path) = args.output.as_ref() {
        schedule
            .write_csv(path)
            .map_err(|err| Error::Output(path.clone(), err))?;

        let path = path.display();
        let underline = "=".repeat(path.to_string().len());
        println!("Schedule written to {path}");
        println!("======== ======= == {underline}");
        println!();
    }
    if args.output.is_none() || args.verbose {
        println!("Schedule");
        println!("========");
        println!();
        println!("{schedule}");
    }

    println!("{summary}");

    if args.verbose {
        println!();
        stats.pretty_print();
    }

    Ok(())
}
