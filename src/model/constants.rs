use rust_decimal::Decimal;

/// Basic deduction applied to the yearly total before tax, in KRW.
pub const DEFAULT_DEDUCTION: i64 = 2_500_000;

/// Flat capital gains rate, including the local income tax surcharge.
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(22, 0, 0, false, 2);

/// File name of the USD/KRW exchange rate cache inside the user's data directory.
pub const FX_CACHE_FILE_NAME: &str = "usd_krw_rates.json";

/// Seoul Money Brokerage Services daily exchange rate page.
pub const DEFAULT_FX_RATE_URL: &str = "http://www.smbs.biz/ExRate/TodayExRate.jsp";

/// Security identity assigned to every E*Trade row.
pub const DEFAULT_ETRADE_NAME: &str = "퀄컴";
pub const DEFAULT_ETRADE_ISIN: &str = "US7475251036";

// Filing table defaults.
pub const DEFAULT_TAX_RATE_CLASS: &str = "61";
pub const DEFAULT_SECURITY_TYPE: &str = "61";
pub const DEFAULT_ITEM_KIND: &str = "10";
pub const DEFAULT_ACQUISITION_TYPE: &str = "01";
pub const DEFAULT_COUNTRY_CODE: &str = "US";
pub const DEFAULT_ASSET_DESCRIPTION: &str = "증권";

pub const DEFAULT_PATH_FIXTURES: &str = "./fixtures";
pub const DEFAULT_PATH_FX_RATES: &str = "./fixtures/usd_krw_rates.json";
