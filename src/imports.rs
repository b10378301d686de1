use crate::model::{normalize, AmountError, ExchangeRateError, RateLookup, RawAmount};
use crate::model::{RecordError, Schedule, ScheduleError, Stats, TaxRecord};
use crate::util::{date::parse_date, text::decode};
use chrono::NaiveDate;
use csv::StringRecord;
use error_iter::ErrorIter as _;
use std::path::{Path, PathBuf};
use std::{fmt, fs};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub mod etrade;
pub mod kiwoom;
pub mod miraeasset;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error")]
    Csv(#[from] csv::Error),

    #[error("File has no header row")]
    Empty,

    #[error("Missing column `{0}`")]
    MissingColumn(&'static str),

    #[error("Row {row}: missing required field `{column}`")]
    MissingField { row: u64, column: &'static str },

    #[error("Row {row}: invalid amount in column `{column}`")]
    Amount {
        row: u64,
        column: &'static str,
        #[source]
        source: AmountError,
    },

    #[error("Row {row}: invalid date `{value}` in column `{column}`")]
    Date {
        row: u64,
        column: &'static str,
        value: String,
    },

    #[error("Row {row}: invalid record")]
    Record {
        row: u64,
        #[source]
        source: RecordError,
    },

    #[error("Row {row}: exchange rate error")]
    ExchangeRate {
        row: u64,
        #[source]
        source: ExchangeRateError,
    },
}

impl AdapterError {
    /// Fatal errors abort the whole run instead of only the file being read.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ExchangeRate { .. })
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Source file not found: {0:?}")]
    SourceFileNotFound(PathBuf),

    #[error("Unable to read directory {0:?}")]
    Dir(PathBuf, #[source] std::io::Error),

    #[error("Failed to import {0:?}")]
    Adapter(PathBuf, #[source] AdapterError),

    #[error("Unable to read template {0:?}")]
    Template(PathBuf, #[source] ScheduleError),
}

/// Supported brokerage export formats.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Brokerage {
    Kiwoom,
    ETrade,
    MiraeAsset,
}

impl fmt::Display for Brokerage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Kiwoom => "Kiwoom",
            Self::ETrade => "E*Trade",
            Self::MiraeAsset => "Mirae Asset",
        })
    }
}

/// Settings shared by all adapters.
#[derive(Clone, Debug)]
pub struct AdapterConfig {
    /// Security name assigned to every E*Trade row.
    pub etrade_name: String,
    /// ISIN assigned to every E*Trade row.
    pub etrade_isin: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            etrade_name: crate::model::constants::DEFAULT_ETRADE_NAME.to_string(),
            etrade_isin: crate::model::constants::DEFAULT_ETRADE_ISIN.to_string(),
        }
    }
}

/// Turns one brokerage export into schedule records.
pub trait Adapter {
    fn brokerage(&self) -> Brokerage;

    /// Read every record from `path`. Returns a fresh vector; nothing shared is mutated.
    fn read(
        &self,
        stats: &mut Stats,
        path: &Path,
        rates: &mut dyn RateLookup,
    ) -> Result<Vec<TaxRecord>, AdapterError>;
}

type Constructor = fn(&AdapterConfig) -> Box<dyn Adapter>;

/// File stem markers and their adapters. First match wins.
const REGISTRY: [(&str, Constructor); 3] = [
    ("kiwoom", kiwoom::constructor),
    ("etrade", etrade::constructor),
    ("miraeasset", miraeasset::constructor),
];

pub enum Selection {
    Registered(Box<dyn Adapter>),
    /// No adapter claims the file. Carries the file stem.
    Unregistered(String),
}

/// Pick an adapter by matching the file stem against the registry markers, ignoring case.
pub fn select(path: &Path, config: &AdapterConfig) -> Selection {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = stem.to_lowercase();

    REGISTRY
        .iter()
        .find(|(marker, _)| lower.contains(marker))
        .map_or(Selection::Unregistered(stem), |(_, constructor)| {
            Selection::Registered(constructor(config))
        })
}

/// Expand input paths into the list of source files.
///
/// Files are taken as given. Directories contribute their `*.csv` files, sorted by name.
pub fn discover(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ImportError> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            let mut found = fs::read_dir(input)
                .and_then(|entries| {
                    entries
                        .map(|entry| entry.map(|entry| entry.path()))
                        .collect::<Result<Vec<_>, _>>()
                })
                .map_err(|err| ImportError::Dir(input.clone(), err))?
                .into_iter()
                .filter(|path| {
                    path.is_file()
                        && path
                            .extension()
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
                })
                .collect::<Vec<_>>();
            found.sort();
            debug!("Found {} CSV files in {input:?}", found.len());

            files.extend(found);
        } else {
            return Err(ImportError::SourceFileNotFound(input.clone()));
        }
    }

    Ok(files)
}

/// Read every source file with its adapter, in order.
///
/// Unknown files are skipped. A file with a non-fatal error contributes no records; the error is
/// logged and the run continues. Fatal errors (missing exchange rates) stop the run.
pub fn read_files(
    stats: &mut Stats,
    paths: &[PathBuf],
    config: &AdapterConfig,
    rates: &mut dyn RateLookup,
) -> Result<Vec<(PathBuf, Vec<TaxRecord>)>, ImportError> {
    let mut outputs = Vec::new();

    for path in paths {
        let adapter = match select(path, config) {
            Selection::Registered(adapter) => adapter,
            Selection::Unregistered(stem) => {
                warn!("Unknown source format `{stem}`, skipping {path:?}");
                stats.inc_files_skipped();
                continue;
            }
        };

        stats.inc_files();
        info!("Reading {} export {path:?}", adapter.brokerage());

        match adapter.read(stats, path, rates) {
            Ok(records) => {
                debug!("{} records from {path:?}", records.len());
                stats.add_records(records.len());
                outputs.push((path.clone(), records));
            }
            Err(err) if err.is_fatal() => return Err(ImportError::Adapter(path.clone(), err)),
            Err(err) => {
                error!("Skipping {path:?}: {err}");
                for source in err.sources().skip(1) {
                    error!("  Caused by: {source}");
                }
                stats.inc_files_failed();
            }
        }
    }

    Ok(outputs)
}

/// Build the schedule: template rows first, then every input file in discovery order.
pub fn build_schedule(
    stats: &mut Stats,
    inputs: &[PathBuf],
    template: Option<&Path>,
    config: &AdapterConfig,
    rates: &mut dyn RateLookup,
) -> Result<Schedule, ImportError> {
    let files = discover(inputs)?;

    let template = template
        .map(|path| {
            Schedule::load_template(path).map_err(|err| ImportError::Template(path.into(), err))
        })
        .transpose()?
        .unwrap_or_default();
    stats.add_template_rows(template.len());

    let mut schedule = Schedule::new(template);
    for (path, records) in read_files(stats, &files, config, rates)? {
        debug!("Adding {} records from {path:?}", records.len());
        schedule.extend(records);
    }

    Ok(schedule)
}

/// A decoded CSV export: one header row and the data rows below it.
pub(crate) struct Table {
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl Table {
    /// Read and decode a CSV export.
    ///
    /// With `marker`, the first row is taken as a title line when it lacks that header cell, and
    /// the header is read from the second row. Blank rows are ignored.
    pub(crate) fn read(path: &Path, marker: Option<&str>) -> Result<Self, AdapterError> {
        let bytes = fs::read(path)?;
        let text = decode(&bytes);
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut records = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if record.iter().any(|cell| !cell.is_empty()) {
                records.push(record);
            }
        }

        let mut records = records.into_iter();
        let mut headers = records.next().ok_or(AdapterError::Empty)?;
        if let Some(marker) = marker {
            if !headers.iter().any(|cell| cell == marker) {
                debug!("No `{marker}` header in the first row of {path:?}, treating it as a title");
                headers = records.next().ok_or(AdapterError::Empty)?;
            }
        }

        Ok(Self {
            headers,
            rows: records.collect(),
        })
    }

    pub(crate) fn headers(&self) -> &StringRecord {
        &self.headers
    }

    pub(crate) fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|cell| cell == name)
    }

    pub(crate) fn column(&self, name: &'static str) -> Result<Column, AdapterError> {
        self.headers
            .iter()
            .position(|cell| cell == name)
            .map(|index| Column { name, index })
            .ok_or(AdapterError::MissingColumn(name))
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|record| Row { record })
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Column {
    pub(crate) name: &'static str,
    index: usize,
}

/// A data row with typed, error-reporting cell accessors.
#[derive(Clone, Copy)]
pub(crate) struct Row<'a> {
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    /// Line number in the source file.
    pub(crate) fn line(&self) -> u64 {
        self.record.position().map_or(0, |pos| pos.line())
    }

    pub(crate) fn record(&self) -> &'a StringRecord {
        self.record
    }

    /// The first required column with an empty cell, if any.
    pub(crate) fn missing(&self, columns: &[Column]) -> Option<Column> {
        columns.iter().copied().find(|column| self.cell(*column).is_empty())
    }

    pub(crate) fn cell(&self, column: Column) -> &'a str {
        self.record.get(column.index).unwrap_or_default()
    }

    pub(crate) fn text(&self, column: Column) -> Result<&'a str, AdapterError> {
        let cell = self.cell(column);
        if cell.is_empty() {
            return Err(AdapterError::MissingField {
                row: self.line(),
                column: column.name,
            });
        }

        Ok(cell)
    }

    pub(crate) fn amount(&self, column: Column) -> Result<i64, AdapterError> {
        normalize(RawAmount::from_cell(self.cell(column))).map_err(|source| AdapterError::Amount {
            row: self.line(),
            column: column.name,
            source,
        })
    }

    pub(crate) fn date(&self, column: Column) -> Result<NaiveDate, AdapterError> {
        let value = self.text(column)?;

        parse_date(value).map_err(|_| AdapterError::Date {
            row: self.line(),
            column: column.name,
            value: value.to_string(),
        })
    }

    pub(crate) fn record_err(&self, source: RecordError) -> AdapterError {
        AdapterError::Record {
            row: self.line(),
            source,
        }
    }
}

/// Log and count a row dropped for an empty required cell.
pub(crate) fn drop_row(stats: &mut Stats, path: &Path, row: &Row<'_>, column: Column) {
    warn!(
        "{}",
        AdapterError::MissingField {
            row: row.line(),
            column: column.name,
        }
    );
    debug!("Dropped row from {path:?}: {:?}", row.record());
    stats.inc_rows_dropped();
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::constants::DEFAULT_PATH_FIXTURES;
    use crate::model::{FxRateCache, FxResolver, TaxPolicy, TaxSummary};
    use crate::client::tests::MockSource;
    use tracing_test::traced_test;

    pub(crate) fn fixture(name: &str) -> PathBuf {
        Path::new(DEFAULT_PATH_FIXTURES).join(name)
    }

    /// Resolver over the fixture rate cache, without live fetching.
    pub(crate) fn fixture_rates() -> FxResolver<MockSource> {
        let cache = FxRateCache::load(fixture("usd_krw_rates.json")).unwrap();

        FxResolver::new(cache, None)
    }

    #[test]
    fn test_select() {
        let config = AdapterConfig::default();
        let brokerage = |name: &str| match select(Path::new(name), &config) {
            Selection::Registered(adapter) => Some(adapter.brokerage()),
            Selection::Unregistered(_) => None,
        };

        assert_eq!(brokerage("2024_kiwoom.csv"), Some(Brokerage::Kiwoom));
        assert_eq!(brokerage("dir/Kiwoom-Export.CSV"), Some(Brokerage::Kiwoom));
        assert_eq!(brokerage("2024_etrade.csv"), Some(Brokerage::ETrade));
        assert_eq!(brokerage("MiraeAsset_2024.csv"), Some(Brokerage::MiraeAsset));
        assert_eq!(brokerage("notes.csv"), None);
        assert!(matches!(
            select(Path::new("bank_2024.csv"), &config),
            Selection::Unregistered(stem) if stem == "bank_2024"
        ));
    }

    #[test]
    fn test_discover() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_kiwoom.csv", "a_etrade.CSV", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("nested.csv")).unwrap();
        let extra = dir.path().join("notes.txt");

        let files = discover(&[dir.path().to_path_buf(), extra.clone()]).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("a_etrade.CSV"),
                dir.path().join("b_kiwoom.csv"),
                extra,
            ]
        );

        let missing = dir.path().join("missing_kiwoom.csv");
        assert!(matches!(
            discover(&[missing]),
            Err(ImportError::SourceFileNotFound(_))
        ));
    }

    #[test]
    fn test_table_title_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        fs::write(&path, "Report title,,\nA,B,C\n1,2,3\n,,\n4,5,6\n").unwrap();

        let table = Table::read(&path, Some("B")).unwrap();
        assert_eq!(table.headers().iter().collect::<Vec<_>>(), ["A", "B", "C"]);
        assert_eq!(table.rows().count(), 2);

        let table = Table::read(&path, None).unwrap();
        assert!(table.has_column("Report title"));
        assert!(matches!(
            table.column("B"),
            Err(AdapterError::MissingColumn("B"))
        ));

        fs::write(&path, "").unwrap();
        assert!(matches!(Table::read(&path, None), Err(AdapterError::Empty)));
    }

    #[test]
    #[traced_test]
    fn test_read_all_fixtures() {
        let _ = tracing_log::LogTracer::init();

        let mut stats = Stats::default();
        let mut rates = fixture_rates();
        let paths = discover(&[PathBuf::from(DEFAULT_PATH_FIXTURES)]).unwrap();
        let outputs =
            read_files(&mut stats, &paths, &AdapterConfig::default(), &mut rates).unwrap();

        // `template.csv` has no adapter
        assert_eq!(outputs.len(), 3);
        assert_eq!(stats.files(), 3);
        assert_eq!(stats.records(), 3 + 2 + 3);
        assert_eq!(stats.files_skipped(), 1);
        assert_eq!(stats.files_failed(), 0);
        assert!(logs_contain("Unknown source format `template`"));

        // try: `cargo test -- --nocapture`
        stats.pretty_print();
    }

    #[test]
    #[traced_test]
    fn test_unknown_file_does_not_change_total() {
        let dir = tempfile::tempdir().unwrap();
        let unknown = dir.path().join("bank_statement.csv");
        fs::write(&unknown, "Date,Amount\n2024-01-02,99999999\n").unwrap();

        let known = vec![fixture("kiwoom_2024.csv")];
        let mut with_unknown = known.clone();
        with_unknown.push(unknown);

        let total = |paths: &[PathBuf]| {
            let mut stats = Stats::default();
            let outputs = read_files(
                &mut stats,
                paths,
                &AdapterConfig::default(),
                &mut fixture_rates(),
            )
            .unwrap();
            let records: Vec<_> = outputs.into_iter().flat_map(|(_, r)| r).collect();

            TaxSummary::compute(&records, &TaxPolicy::default())
                .unwrap()
                .total_gain_loss
        };

        assert_eq!(total(&known), total(&with_unknown));
    }

    #[test]
    #[traced_test]
    fn test_invalid_amount_skips_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = fixture("kiwoom_2024.csv");
        let bad = dir.path().join("kiwoom_bad.csv");
        fs::write(
            &bad,
            "종목명,매도수량,매도일,매도금액,매수일,매수금액,필요경비,종목코드\n\
             Apple,10,2024/05/20,1000000,2024/01/31,600000,0,US0378331005\n\
             Tesla,3,2024/06/03,N/A,2024/02/01,700000,0,US88160R1014\n",
        )
        .unwrap();

        let mut stats = Stats::default();
        let outputs = read_files(
            &mut stats,
            &[bad, good],
            &AdapterConfig::default(),
            &mut fixture_rates(),
        )
        .unwrap();

        // None of the bad file's rows are kept
        assert_eq!(outputs.len(), 1);
        assert_eq!(stats.files_failed(), 1);
        assert!(logs_contain("invalid amount in column `매도금액`"));
        assert!(logs_contain("Invalid amount type: `N/A`"));
    }

    #[test]
    #[traced_test]
    fn test_missing_rate_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etrade_2023.csv");
        fs::write(
            &path,
            "Qty.,Date Acquired,Date Sold,Adjusted Cost Basis,Total Proceeds\n\
             1,01/03/2023,02/01/2023,$100.00,$120.00\n",
        )
        .unwrap();

        let source = MockSource::default();
        let mut rates = FxResolver::new(FxRateCache::new(), Some(&source));
        let result = read_files(
            &mut Stats::default(),
            &[path],
            &AdapterConfig::default(),
            &mut rates,
        );

        assert!(matches!(
            result,
            Err(ImportError::Adapter(_, AdapterError::ExchangeRate { row: 2, .. }))
        ));
        assert_eq!(source.calls.borrow().len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_build_schedule_template_first() {
        let mut stats = Stats::default();
        let inputs = [fixture("miraeasset_2024.csv"), fixture("kiwoom_2024.csv")];
        let template = fixture("template.csv");
        let schedule = build_schedule(
            &mut stats,
            &inputs,
            Some(template.as_path()),
            &AdapterConfig::default(),
            &mut fixture_rates(),
        )
        .unwrap();

        let names: Vec<_> = schedule.iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            ["삼성전자", "아마존", "엔비디아", "알파벳", "애플", "마이크로소프트", "테슬라"]
        );
        assert_eq!(stats.records(), 5);
    }

    #[test]
    #[traced_test]
    fn test_build_schedule_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("missing_template.csv");

        assert!(matches!(
            build_schedule(
                &mut Stats::default(),
                &[fixture("kiwoom_2024.csv")],
                Some(template.as_path()),
                &AdapterConfig::default(),
                &mut fixture_rates(),
            ),
            Err(ImportError::Template(path, _)) if path == template
        ));
    }

    #[test]
    #[traced_test]
    fn test_fetched_rates_saved_after_failed_build() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("etrade_2024.csv");
        fs::write(
            &input,
            "Qty.,Date Acquired,Date Sold,Adjusted Cost Basis,Total Proceeds\n\
             1,01/03/2024,02/01/2024,$100.00,$120.00\n",
        )
        .unwrap();
        let cache_path = dir.path().join("rates.json");

        // The acquisition date is published, the sale date is not
        let source = MockSource::new(&[("01/03/2024", 1300.5)]);
        let mut rates = FxResolver::new(FxRateCache::new(), Some(&source));
        let result = build_schedule(
            &mut Stats::default(),
            &[input],
            None,
            &AdapterConfig::default(),
            &mut rates,
        );
        assert!(matches!(
            result,
            Err(ImportError::Adapter(_, AdapterError::ExchangeRate { .. }))
        ));

        assert!(rates.save_fetched(&cache_path).unwrap());
        let saved = FxRateCache::load(&cache_path).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved.get("01/03/2024".parse().unwrap()), Some(1300.5));
    }
}
