use crate::client::RateSource;
use crate::model::constants::FX_CACHE_FILE_NAME;
use crate::util::date::parse_date;
use chrono::NaiveDate;
use directories::ProjectDirs;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::{fmt, fs, str::FromStr};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Exchange rate lookup failures.
#[cfg_attr(test, derive(PartialEq))]
#[derive(Debug, Error)]
pub enum ExchangeRateError {
    #[error("Exchange rate not found for {0}")]
    NotFound(RateDate),

    #[error("Exchange rate {1} for {0} is not a positive number")]
    InvalidRate(RateDate, f64),
}

#[derive(Debug, Error)]
pub enum FxCacheError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    #[error("Exchange rate {1} for {0} is not a positive number")]
    InvalidRate(RateDate, f64),

    #[error("Invalid date key `{0}`")]
    Date(String, #[source] chrono::ParseError),

    #[error("Conflicting exchange rates for {0}: {1} and {2}")]
    Duplicate(RateDate, f64, f64),

    #[error("Unable to rename temporary cache to `{0:?}`")]
    Rename(PathBuf, #[source] std::io::Error),

    #[error("Unable to locate user data directory")]
    DataDir,
}

/// The canonical key for exchange rate lookups.
///
/// Parses every supported date layout, but always prints (and persists) as `MM/DD/YYYY`. Lookups
/// go through this type, so the same day written two different ways is the same key.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RateDate(NaiveDate);

impl RateDate {
    pub const FORMAT: &'static str = "%m/%d/%Y";

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for RateDate {
    fn from(value: NaiveDate) -> Self {
        Self(value)
    }
}

impl FromStr for RateDate {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_date(s).map(Self)
    }
}

impl fmt::Display for RateDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl Serialize for RateDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Persistent USD/KRW exchange rates keyed by date.
///
/// Entries are never overwritten. The whole map is rewritten on [`FxRateCache::persist`].
#[derive(Debug, Default)]
pub struct FxRateCache {
    rates: BTreeMap<RateDate, f64>,
    dirty: bool,
}

impl FxRateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the cache from a JSON file. A missing file is an empty cache.
    ///
    /// Keys may use any supported date layout. Two keys for the same day must agree on the rate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FxCacheError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No exchange rate cache at {path:?}, starting with an empty cache");
            return Ok(Self::new());
        }

        let data = fs::read_to_string(path)?;
        let entries: BTreeMap<String, f64> = serde_json::from_str(&data)?;

        let mut rates = BTreeMap::new();
        for (key, rate) in entries {
            let date: RateDate = key.parse().map_err(|err| FxCacheError::Date(key, err))?;
            if !is_valid_rate(rate) {
                return Err(FxCacheError::InvalidRate(date, rate));
            }

            match rates.entry(date) {
                Entry::Vacant(entry) => {
                    entry.insert(rate);
                }
                Entry::Occupied(entry) if *entry.get() == rate => {
                    debug!("Duplicate exchange rate entry for {date} in {path:?}");
                }
                Entry::Occupied(entry) => {
                    return Err(FxCacheError::Duplicate(date, *entry.get(), rate));
                }
            }
        }
        debug!("Loaded {} exchange rates from {path:?}", rates.len());

        Ok(Self {
            rates,
            dirty: false,
        })
    }

    pub fn get(&self, date: RateDate) -> Option<f64> {
        self.rates.get(&date).copied()
    }

    /// Insert a new rate. Existing entries are kept; returns `false` when `date` was present.
    pub fn insert(&mut self, date: RateDate, rate: f64) -> Result<bool, ExchangeRateError> {
        if !is_valid_rate(rate) {
            return Err(ExchangeRateError::InvalidRate(date, rate));
        }
        if self.rates.contains_key(&date) {
            return Ok(false);
        }

        self.rates.insert(date, rate);
        self.dirty = true;

        Ok(true)
    }

    /// Write the whole cache as pretty JSON, sorted by date.
    ///
    /// The data is written to a temporary sibling file which then replaces `path`, so an
    /// interrupted write never leaves a truncated cache behind.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), FxCacheError> {
        let path = path.as_ref();
        let temp = temp_path(path);
        let serialized = serde_json::to_string_pretty(&self.rates)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        debug!("Writing temporary exchange rate cache to {temp:?}");
        fs::write(&temp, serialized + "\n")?;

        debug!("Renaming temporary exchange rate cache to {path:?}");
        fs::rename(&temp, path).map_err(|err| FxCacheError::Rename(path.to_path_buf(), err))?;

        Ok(())
    }

    /// `true` when rates were inserted since loading.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl FromIterator<(RateDate, f64)> for FxRateCache {
    fn from_iter<T: IntoIterator<Item = (RateDate, f64)>>(iter: T) -> Self {
        Self {
            rates: iter.into_iter().collect(),
            dirty: false,
        }
    }
}

/// Default cache location in the user's data directory.
pub fn default_fx_cache_path() -> Result<PathBuf, FxCacheError> {
    let project_dir =
        ProjectDirs::from("kr", "gaincount", "gaincount").ok_or(FxCacheError::DataDir)?;

    Ok(project_dir.data_dir().join(FX_CACHE_FILE_NAME))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");

    path.with_file_name(name)
}

fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Anything that can answer "what was the USD/KRW rate on this day".
pub trait RateLookup {
    fn rate(&mut self, date: RateDate) -> Result<Decimal, ExchangeRateError>;
}

/// Resolves exchange rates from the cache, falling back to a live [`RateSource`].
///
/// Each missing date is fetched at most once per run. A failed fetch is remembered and reported
/// as [`ExchangeRateError::NotFound`] on every later request for that date.
pub struct FxResolver<S> {
    cache: FxRateCache,
    source: Option<S>,
    failed: BTreeSet<RateDate>,
}

impl<S: RateSource> FxResolver<S> {
    /// Live fetching is enabled iff `source` is `Some`.
    pub fn new(cache: FxRateCache, source: Option<S>) -> Self {
        Self {
            cache,
            source,
            failed: BTreeSet::new(),
        }
    }

    pub fn resolve(&mut self, date: RateDate) -> Result<f64, ExchangeRateError> {
        if let Some(rate) = self.cache.get(date) {
            return Ok(rate);
        }

        let source = match self.source.as_ref() {
            Some(source) if !self.failed.contains(&date) => source,
            _ => return Err(ExchangeRateError::NotFound(date)),
        };

        match source.fetch(date) {
            Ok(rate) if is_valid_rate(rate) => {
                info!("Fetched exchange rate for {date}: {rate}");
                self.cache.insert(date, rate)?;

                Ok(rate)
            }
            Ok(rate) => {
                warn!("Discarding invalid exchange rate {rate} for {date}");
                self.failed.insert(date);

                Err(ExchangeRateError::NotFound(date))
            }
            Err(err) => {
                warn!("Unable to fetch exchange rate for {date}: {err}");
                self.failed.insert(date);

                Err(ExchangeRateError::NotFound(date))
            }
        }
    }

    pub fn cache(&self) -> &FxRateCache {
        &self.cache
    }

    /// Write the cache to `path` if any rate was fetched. Returns `true` when the file was written.
    pub fn save_fetched(&self, path: impl AsRef<Path>) -> Result<bool, FxCacheError> {
        let path = path.as_ref();
        if !self.cache.is_dirty() {
            return Ok(false);
        }

        info!("Saving exchange rate cache to {path:?}");
        self.cache.persist(path)?;

        Ok(true)
    }
}

impl<S: RateSource> RateLookup for FxResolver<S> {
    fn rate(&mut self, date: RateDate) -> Result<Decimal, ExchangeRateError> {
        let rate = self.resolve(date)?;

        // The shortest round-trip representation is exactly what was stored in the cache.
        Decimal::from_str(&rate.to_string()).map_err(|_| ExchangeRateError::InvalidRate(date, rate))
    }
}
