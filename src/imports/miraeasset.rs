//! Mirae Asset overseas stock transfer income export.
//!
//! EUC-KR encoded, amounts in KRW. Incomplete rows (subtotals, blank filler) are dropped.
use super::{drop_row, Adapter, AdapterConfig, AdapterError, Brokerage, Table};
use crate::model::{Classification, Lot, RateLookup, Stats, TaxRecord};
use std::path::Path;
use tracing::trace;

const NAME: &str = "종목명";
const QUANTITY: &str = "양도주식수";
const DISPOSED: &str = "양도일자";
const PROCEEDS: &str = "양도가액(원)";
const ACQUIRED: &str = "취득일자";
const COST: &str = "취득가액(원)";
const EXPENSES: &str = "필요경비(원)";
const ISIN: &str = "표준종목번호";

pub struct MiraeAsset;

pub(super) fn constructor(_config: &AdapterConfig) -> Box<dyn Adapter> {
    Box::new(MiraeAsset)
}

impl Adapter for MiraeAsset {
    fn brokerage(&self) -> Brokerage {
        Brokerage::MiraeAsset
    }

    fn read(
        &self,
        stats: &mut Stats,
        path: &Path,
        _rates: &mut dyn RateLookup,
    ) -> Result<Vec<TaxRecord>, AdapterError> {
        let table = Table::read(path, None)?;
        let name = table.column(NAME)?;
        let quantity = table.column(QUANTITY)?;
        let disposed = table.column(DISPOSED)?;
        let proceeds = table.column(PROCEEDS)?;
        let acquired = table.column(ACQUIRED)?;
        let cost = table.column(COST)?;
        let expenses = table.column(EXPENSES)?;
        let isin = table.column(ISIN)?;
        let required = [name, quantity, disposed, proceeds, acquired, cost, expenses, isin];

        let mut records = Vec::new();
        for row in table.rows() {
            trace!("{:?}", row.record());

            if let Some(column) = row.missing(&required) {
                drop_row(stats, path, &row, column);
                continue;
            }

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
            records.push(
                TaxRecord::new(lot, Classification::default())
                    .map_err(|err| row.record_err(err))?,
            );
        }

        Ok(records)
    }
}
