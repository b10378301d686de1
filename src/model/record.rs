use crate::model::constants::*;
use crate::util::year_ext::GetYear;
use chrono::{Datelike as _, NaiveDate};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Column headers of the filing schedule, in output order.
pub const SCHEDULE_HEADERS: [&str; 15] = [
    "주식 종목명",
    "국내/국외 구분",
    "취득유형별\n양도주식 수",
    "세율구분",
    "주식등 종류",
    "양도물건 종류",
    "취득유형",
    "양도일자",
    "양도가액",
    "취득일자",
    "취득가액",
    "필요경비",
    "국제증권식별번호\n(ISIN코드)",
    "국외자산국가코드",
    "국외자산내용",
];

/// Date layout used in the filing schedule.
pub const SCHEDULE_DATE_FORMAT: &str = "%Y-%m-%d";

#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Quantity must be positive, found {0}")]
    Quantity(i64),

    #[error("{0} must not be negative, found {1}")]
    Negative(&'static str, i64),

    #[error("Disposal date {disposed} precedes acquisition date {acquired}")]
    DateOrder {
        acquired: NaiveDate,
        disposed: NaiveDate,
    },

    #[error("Unknown domestic/foreign code `{0}`")]
    Market(String),
}

/// Domestic or foreign listing, written as the filing codes `1` and `2`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Market {
    Domestic,
    #[default]
    Foreign,
}

impl Market {
    pub fn code(self) -> &'static str {
        match self {
            Self::Domestic => "1",
            Self::Foreign => "2",
        }
    }
}

impl FromStr for Market {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Self::Domestic),
            "2" => Ok(Self::Foreign),
            other => Err(RecordError::Market(other.to_string())),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Filing classification codes.
///
/// Adapters start from [`Classification::default`] and override only what their source knows
/// better.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Classification {
    pub market: Market,
    pub tax_rate_class: String,
    pub security_type: String,
    pub item_kind: String,
    pub acquisition_type: String,
    pub country_code: String,
    pub asset_description: String,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            market: Market::Foreign,
            tax_rate_class: DEFAULT_TAX_RATE_CLASS.to_string(),
            security_type: DEFAULT_SECURITY_TYPE.to_string(),
            item_kind: DEFAULT_ITEM_KIND.to_string(),
            acquisition_type: DEFAULT_ACQUISITION_TYPE.to_string(),
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            asset_description: DEFAULT_ASSET_DESCRIPTION.to_string(),
        }
    }
}

/// The fields every adapter extracts from one disposed lot.
#[derive(Clone, Debug)]
pub struct Lot {
    pub name: String,
    pub isin: String,
    pub quantity: i64,
    pub acquired: NaiveDate,
    pub disposed: NaiveDate,
    pub proceeds: i64,
    pub cost: i64,
    pub expenses: i64,
}

/// One row of the filing schedule.
///
/// Monetary fields are whole KRW. Construction through [`TaxRecord::new`] guarantees that they
/// are non-negative, the quantity is positive, and the lot was not sold before it was acquired.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaxRecord {
    name: String,
    isin: String,
    classification: Classification,
    quantity: u64,
    acquired: NaiveDate,
    disposed: NaiveDate,
    proceeds: i64,
    cost: i64,
    expenses: i64,
}

impl TaxRecord {
    pub fn new(lot: Lot, classification: Classification) -> Result<Self, RecordError> {
        let quantity = u64::try_from(lot.quantity)
            .ok()
            .filter(|quantity| *quantity > 0)
            .ok_or(RecordError::Quantity(lot.quantity))?;
        for (field, amount) in [
            ("Proceeds", lot.proceeds),
            ("Cost", lot.cost),
            ("Expenses", lot.expenses),
        ] {
            if amount < 0 {
                return Err(RecordError::Negative(field, amount));
            }
        }
        if lot.disposed < lot.acquired {
            return Err(RecordError::DateOrder {
                acquired: lot.acquired,
                disposed: lot.disposed,
            });
        }

        Ok(Self {
            name: lot.name,
            isin: lot.isin,
            classification,
            quantity,
            acquired: lot.acquired,
            disposed: lot.disposed,
            proceeds: lot.proceeds,
            cost: lot.cost,
            expenses: lot.expenses,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn isin(&self) -> &str {
        &self.isin
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn acquired(&self) -> NaiveDate {
        self.acquired
    }

    pub fn disposed(&self) -> NaiveDate {
        self.disposed
    }

    pub fn proceeds(&self) -> i64 {
        self.proceeds
    }

    pub fn cost(&self) -> i64 {
        self.cost
    }

    pub fn expenses(&self) -> i64 {
        self.expenses
    }

    pub(crate) fn to_csv(&self) -> ScheduleCsvRow {
        let c = &self.classification;

        ScheduleCsvRow {
            name: self.name.clone(),
            market: c.market.to_string(),
            quantity: self.quantity.to_string(),
            tax_rate_class: c.tax_rate_class.clone(),
            security_type: c.security_type.clone(),
            item_kind: c.item_kind.clone(),
            acquisition_type: c.acquisition_type.clone(),
            disposed: self.disposed.format(SCHEDULE_DATE_FORMAT).to_string(),
            proceeds: self.proceeds.to_string(),
            acquired: self.acquired.format(SCHEDULE_DATE_FORMAT).to_string(),
            cost: self.cost.to_string(),
            expenses: self.expenses.to_string(),
            isin: self.isin.clone(),
            country_code: c.country_code.clone(),
            asset_description: c.asset_description.clone(),
        }
    }
}

/// Enable consistency checks on years.
impl GetYear for TaxRecord {
    fn get_year(&self) -> i32 {
        self.disposed.year()
    }
}

/// Schedule row as it appears in a CSV file. Field order matches [`SCHEDULE_HEADERS`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct ScheduleCsvRow {
    #[serde(rename = "주식 종목명")]
    pub(crate) name: String,
    #[serde(rename = "국내/국외 구분")]
    pub(crate) market: String,
    #[serde(rename = "취득유형별\n양도주식 수")]
    pub(crate) quantity: String,
    #[serde(rename = "세율구분")]
    pub(crate) tax_rate_class: String,
    #[serde(rename = "주식등 종류")]
    pub(crate) security_type: String,
    #[serde(rename = "양도물건 종류")]
    pub(crate) item_kind: String,
    #[serde(rename = "취득유형")]
    pub(crate) acquisition_type: String,
    #[serde(rename = "양도일자")]
    pub(crate) disposed: String,
    #[serde(rename = "양도가액")]
    pub(crate) proceeds: String,
    #[serde(rename = "취득일자")]
    pub(crate) acquired: String,
    #[serde(rename = "취득가액")]
    pub(crate) cost: String,
    #[serde(rename = "필요경비")]
    pub(crate) expenses: String,
    #[serde(rename = "국제증권식별번호\n(ISIN코드)")]
    pub(crate) isin: String,
    #[serde(rename = "국외자산국가코드")]
    pub(crate) country_code: String,
    #[serde(rename = "국외자산내용")]
    pub(crate) asset_description: String,
}
