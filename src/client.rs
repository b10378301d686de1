use crate::model::RateDate;
use thiserror::Error;

pub mod smbs;

/// Live USD/KRW exchange rate provider.
///
/// Exists as a trait so that unit tests can mock the rate service.
pub trait RateSource {
    /// Fetch the published USD/KRW rate for a single day.
    fn fetch(&self, date: RateDate) -> Result<f64, FetchError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error requesting rate for {0}")]
    Http(RateDate, #[source] Box<ureq::Error>),

    #[error("No USD rate published for {0}")]
    RateMissing(RateDate),

    #[error("Unparseable USD rate `{1}` for {0}")]
    Parse(RateDate, String),
}
