//! Kiwoom Securities overseas stock realized gains export.
//!
//! EUC-KR encoded, amounts in KRW. Some exports start with a report title line above the header.
//! Every row must be complete; any bad cell rejects the whole file.
use super::{Adapter, AdapterConfig, AdapterError, Brokerage, Table};
use crate::model::{Classification, Lot, RateLookup, Stats, TaxRecord};
use std::path::Path;
use tracing::trace;

const NAME: &str = "종목명";
const QUANTITY: &str = "매도수량";
const DISPOSED: &str = "매도일";
const PROCEEDS: &str = "매도금액";
const ACQUIRED: &str = "매수일";
const COST: &str = "매수금액";
const EXPENSES: &str = "필요경비";
const ISIN: &str = "종목코드";

pub struct Kiwoom;

pub(super) fn constructor(_config: &AdapterConfig) -> Box<dyn Adapter> {
    Box::new(Kiwoom)
}

impl Adapter for Kiwoom {
    fn brokerage(&self) -> Brokerage {
        Brokerage::Kiwoom
    }

    fn read(
        &self,
        _stats: &mut Stats,
        path: &Path,
        _rates: &mut dyn RateLookup,
    ) -> Result<Vec<TaxRecord>, AdapterError> {
        let table = Table::read(path, Some(ISIN))?;
        let name = table.column(NAME)?;
        let quantity = table.column(QUANTITY)?;
        let disposed = table.column(DISPOSED)?;
        let proceeds = table.column(PROCEEDS)?;
        let acquired = table.column(ACQUIRED)?;
        let cost = table.column(COST)?;
        let expenses = table.column(EXPENSES)?;
        let isin = table.column(ISIN)?;

        table
            .rows()
            .map(|row| {
                trace!("{:?}", row.record());

                let lot = Lot {
                    name: row.text(name)?.to_string(),
                    isin: row.text(isin)?.to_string(),
                    quantity: row.amount(quantity)?,
                    acquired: row.date(acquired)?,
                    disposed: row.date(disposed)?,
                    proceeds: row.amount(proceeds)?,
                    cost: row.amount(cost)?,
                    expenses: row.amount(expenses)?,
                };

                TaxRecord::new(lot, Classification::default()).map_err(|err| row.record_err(err))
            })
            .collect()
    }
}
