//! Scraper for the Seoul Money Brokerage Services daily exchange rate page.
use super::{FetchError, RateSource};
use crate::model::{constants::DEFAULT_FX_RATE_URL, RateDate};
use crate::util::text::decode;
use regex::Regex;
use std::sync::LazyLock;
use std::{env, time::Duration, time::Instant};
use tracing::{debug, info, trace};
use ureq::tls::{TlsConfig, TlsProvider};
use ureq::Agent;

/// Form layout of the `searchDate` field, as used in the site's rate lookup links.
const SEARCH_DATE_FORMAT: &str = "%Y%m%d";

const TIMEOUT: Duration = Duration::from_secs(30);

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static USD_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"미국 달러 \(USD\)\s+([\d,]+\.\d+)").unwrap());

/// Blocking client for the daily rate page.
pub struct SmbsClient {
    agent: Agent,
    url: String,
}

impl SmbsClient {
    pub fn new(url: impl Into<String>) -> Self {
        let agent = Agent::from(
            Agent::config_builder()
                .timeout_global(Some(TIMEOUT))
                .tls_config(
                    TlsConfig::builder()
                        .provider(TlsProvider::NativeTls)
                        .build(),
                )
                .build(),
        );

        Self {
            agent,
            url: url.into(),
        }
    }

    /// Create a client for the URL in `FX_RATE_URL`, or the public endpoint.
    pub fn from_env() -> Self {
        let url = env::var("FX_RATE_URL").unwrap_or_else(|_| DEFAULT_FX_RATE_URL.to_string());
        debug!("Using exchange rate service at {url}");

        Self::new(url)
    }
}

impl RateSource for SmbsClient {
    fn fetch(&self, date: RateDate) -> Result<f64, FetchError> {
        let search_date = search_date(date);
        info!("Fetching USD/KRW rate for {date}");

        let start = Instant::now();
        let http_err = |err| FetchError::Http(date, Box::new(err));
        let mut resp = self
            .agent
            .post(&self.url)
            .send_form([("searchDate", search_date.as_str())])
            .map_err(http_err)?;
        let body = resp.body_mut().read_to_vec().map_err(http_err)?;
        let dur = start.elapsed();
        debug!("Rate page for {date} received in {dur:?}");

        let html = decode(&body);
        trace!("{html}");

        parse_usd_rate(&html, date)
    }
}

/// Extract the USD rate from the rate page markup.
///
/// Tags are stripped first, so the label and the figure only need to be separated by whitespace
/// in the rendered text.
pub fn parse_usd_rate(html: &str, date: RateDate) -> Result<f64, FetchError> {
    let text = TAG.replace_all(html, " ");
    let captured = USD_RATE
        .captures(&text)
        .and_then(|captures| captures.get(1))
        .ok_or(FetchError::RateMissing(date))?
        .as_str();

    captured
        .replace(',', "")
        .parse()
        .map_err(|_| FetchError::Parse(date, captured.to_string()))
}

fn search_date(date: RateDate) -> String {
    date.date().format(SEARCH_DATE_FORMAT).to_string()
}
