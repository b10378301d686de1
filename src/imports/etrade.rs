//! E*Trade gains & losses export.
//!
//! Amounts are USD. Cost basis is converted with the USD/KRW rate of the acquisition date and
//! proceeds with the rate of the sale date. Exports already annotated with KRW columns (see
//! [`write_krw_columns`]) are taken as-is.
//!
//! The export carries no ISIN, so every row is assigned the configured security identity.
use super::{drop_row, Adapter, AdapterConfig, AdapterError, Brokerage, Column, Row, Table};
use crate::model::{convert, parse_usd, Classification, Lot, RateDate, RateLookup, Stats};
use crate::model::TaxRecord;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, trace, warn};

const QUANTITY: &str = "Qty.";
const ACQUIRED: &str = "Date Acquired";
const DISPOSED: &str = "Date Sold";
const COST: &str = "Adjusted Cost Basis";
const PROCEEDS: &str = "Total Proceeds";

pub const ER_ACQUIRED: &str = "ER Date Acquired (KRW)";
pub const COST_KRW: &str = "Adjusted Cost Basis (KRW)";
pub const ER_DISPOSED: &str = "ER Date Sold (KRW)";
pub const PROCEEDS_KRW: &str = "Total Proceeds (KRW)";
pub const GAIN_KRW: &str = "Adjusted Gain/Loss (KRW)";

/// Columns appended by [`write_krw_columns`], in order.
pub const KRW_COLUMNS: [&str; 5] = [ER_ACQUIRED, COST_KRW, ER_DISPOSED, PROCEEDS_KRW, GAIN_KRW];

pub struct ETrade {
    name: String,
    isin: String,
}

pub(super) fn constructor(config: &AdapterConfig) -> Box<dyn Adapter> {
    Box::new(ETrade::new(config))
}

impl ETrade {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            name: config.etrade_name.clone(),
            isin: config.etrade_isin.clone(),
        }
    }
}

impl Adapter for ETrade {
    fn brokerage(&self) -> Brokerage {
        Brokerage::ETrade
    }

    fn read(
        &self,
        stats: &mut Stats,
        path: &Path,
        rates: &mut dyn RateLookup,
    ) -> Result<Vec<TaxRecord>, AdapterError> {
        let table = Table::read(path, None)?;
        let columns = Columns::new(&table)?;
        let krw = if table.has_column(COST_KRW) && table.has_column(PROCEEDS_KRW) {
            debug!("Using KRW columns from {path:?}");
            Some((table.column(COST_KRW)?, table.column(PROCEEDS_KRW)?))
        } else {
            None
        };

        warn!(
            "E*Trade export {path:?} has no ISIN column, assigning `{}` ({}) to every row",
            self.name, self.isin,
        );

        let mut required = columns.required().to_vec();
        if let Some((cost, proceeds)) = krw {
            required.retain(|column| column.name != COST && column.name != PROCEEDS);
            required.extend([cost, proceeds]);
        }

        let mut records = Vec::new();
        for row in table.rows() {
            trace!("{:?}", row.record());

            if let Some(column) = row.missing(&required) {
                drop_row(stats, path, &row, column);
                continue;
            }

            let acquired = row.date(columns.acquired)?;
            let disposed = row.date(columns.disposed)?;
            let (cost, proceeds) = match krw {
                Some((cost, proceeds)) => (row.amount(cost)?, row.amount(proceeds)?),
                None => {
                    let converted = convert_row(&row, &columns, rates)?;
                    (converted.cost_krw, converted.proceeds_krw)
                }
            };

            let lot = Lot {
                name: self.name.clone(),
                isin: self.isin.clone(),
                quantity: row.amount(columns.quantity)?,
                acquired,
                disposed,
                proceeds,
                cost,
                expenses: 0,
            };
            records.push(
                TaxRecord::new(lot, Classification::default())
                    .map_err(|err| row.record_err(err))?,
            );
        }

        Ok(records)
    }
}

#[derive(Clone, Copy)]
struct Columns {
    quantity: Column,
    acquired: Column,
    disposed: Column,
    cost: Column,
    proceeds: Column,
}

impl Columns {
    fn new(table: &Table) -> Result<Self, AdapterError> {
        Ok(Self {
            quantity: table.column(QUANTITY)?,
            acquired: table.column(ACQUIRED)?,
            disposed: table.column(DISPOSED)?,
            cost: table.column(COST)?,
            proceeds: table.column(PROCEEDS)?,
        })
    }

    fn required(&self) -> [Column; 5] {
        [
            self.quantity,
            self.acquired,
            self.disposed,
            self.cost,
            self.proceeds,
        ]
    }
}

/// One lot converted to KRW.
struct Converted {
    cost_usd: Decimal,
    proceeds_usd: Decimal,
    acquired_rate: Decimal,
    disposed_rate: Decimal,
    cost_krw: i64,
    proceeds_krw: i64,
}

fn convert_row(
    row: &Row<'_>,
    columns: &Columns,
    rates: &mut dyn RateLookup,
) -> Result<Converted, AdapterError> {
    let acquired = row.date(columns.acquired)?;
    let disposed = row.date(columns.disposed)?;

    let acquired_rate = rate(row, rates, acquired)?;
    let cost_usd = usd(row, columns.cost)?;
    let cost_krw = krw(row, columns.cost, cost_usd, acquired_rate)?;

    let disposed_rate = rate(row, rates, disposed)?;
    let proceeds_usd = usd(row, columns.proceeds)?;
    let proceeds_krw = krw(row, columns.proceeds, proceeds_usd, disposed_rate)?;

    Ok(Converted {
        cost_usd,
        proceeds_usd,
        acquired_rate,
        disposed_rate,
        cost_krw,
        proceeds_krw,
    })
}

fn rate(
    row: &Row<'_>,
    rates: &mut dyn RateLookup,
    date: NaiveDate,
) -> Result<Decimal, AdapterError> {
    rates
        .rate(RateDate::from(date))
        .map_err(|source| AdapterError::ExchangeRate {
            row: row.line(),
            source,
        })
}

fn usd(row: &Row<'_>, column: Column) -> Result<Decimal, AdapterError> {
    parse_usd(row.cell(column)).map_err(|source| AdapterError::Amount {
        row: row.line(),
        column: column.name,
        source,
    })
}

fn krw(row: &Row<'_>, column: Column, usd: Decimal, rate: Decimal) -> Result<i64, AdapterError> {
    convert(usd, rate).map_err(|source| AdapterError::Amount {
        row: row.line(),
        column: column.name,
        source,
    })
}

/// Every acquisition and sale date of the complete rows in an export.
pub fn required_dates(path: &Path) -> Result<BTreeSet<RateDate>, AdapterError> {
    let table = Table::read(path, None)?;
    let columns = Columns::new(&table)?;

    let mut dates = BTreeSet::new();
    for row in table.rows() {
        if row.missing(&columns.required()).is_some() {
            continue;
        }
        dates.insert(RateDate::from(row.date(columns.acquired)?));
        dates.insert(RateDate::from(row.date(columns.disposed)?));
    }

    Ok(dates)
}

/// Totals over the rows written by [`write_krw_columns`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KrwTotals {
    pub rows: usize,
    pub gain_usd: Decimal,
    pub gain_krw: i64,
}

/// Copy an export to `output`, appending the [`KRW_COLUMNS`] to every complete row.
///
/// Incomplete rows are dropped. KRW columns already present in the input are replaced.
pub fn write_krw_columns(
    stats: &mut Stats,
    input: &Path,
    output: &Path,
    rates: &mut dyn RateLookup,
) -> Result<KrwTotals, AdapterError> {
    let table = Table::read(input, None)?;
    let columns = Columns::new(&table)?;
    let kept: Vec<usize> = table
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, header)| !KRW_COLUMNS.contains(header))
        .map(|(index, _)| index)
        .collect();

    let mut wtr = csv::Writer::from_path(output)?;
    let headers = kept.iter().filter_map(|index| table.headers().get(*index));
    wtr.write_record(headers.chain(KRW_COLUMNS))?;

    let mut totals = KrwTotals::default();
    for row in table.rows() {
        if let Some(column) = row.missing(&columns.required()) {
            drop_row(stats, input, &row, column);
            continue;
        }

        let converted = convert_row(&row, &columns, rates)?;
        let gain_krw = converted.proceeds_krw - converted.cost_krw;
        let cells = kept.iter().map(|index| row.record().get(*index).unwrap_or_default());
        let added = [
            converted.acquired_rate.to_string(),
            converted.cost_krw.to_string(),
            converted.disposed_rate.to_string(),
            converted.proceeds_krw.to_string(),
            gain_krw.to_string(),
        ];
        wtr.write_record(cells.chain(added.iter().map(String::as_str)))?;

        totals.rows += 1;
        totals.gain_usd += converted.proceeds_usd - converted.cost_usd;
        totals.gain_krw += gain_krw;
    }
    wtr.flush()?;

    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::MockSource;
    use crate::imports::tests::{fixture, fixture_rates};
    use crate::model::record::tests::date;
    use crate::model::{ExchangeRateError, FxRateCache, FxResolver};
    use std::fs;
    use tracing_test::traced_test;

    const INPUT: &str = "Record Type,Symbol,Qty.,Date Acquired,Date Sold,Adjusted Cost Basis,Total Proceeds\n\
                         Summary,,18,,,\"$2,792.34\",\"$3,160.35\"\n\
                         Sell,QCOM,10,01/31/2024,05/20/2024,\"$1,500.00\",\"$1,800.00\"\n";

    fn etrade() -> ETrade {
        ETrade::new(&AdapterConfig::default())
    }

    #[test]
    #[traced_test]
    fn test_read_fixture() {
        let mut stats = Stats::default();
        let records = etrade()
            .read(&mut stats, &fixture("etrade_2024.csv"), &mut fixture_rates())
            .unwrap();

        // The summary row is dropped
        assert_eq!(records.len(), 3);
        assert_eq!(stats.rows_dropped(), 1);

        // $1,500.00 * 1330.60 (01/31/2024) and $1,800.00 * 1355.20 (05/20/2024)
        assert_eq!(records[0].cost(), 1_995_900);
        assert_eq!(records[0].proceeds(), 2_439_360);
        assert_eq!(records[0].expenses(), 0);
        assert_eq!(records[0].acquired(), date("2024-01-31"));
        assert_eq!(records[0].disposed(), date("2024-05-20"));

        // $812.34 * 1333.80 = 1,083,499.092 and $905.10 * 1332.00 = 1,205,593.2, truncated
        assert_eq!(records[1].cost(), 1_083_499);
        assert_eq!(records[1].proceeds(), 1_205_593);

        for record in &records {
            assert_eq!(record.name(), "퀄컴");
            assert_eq!(record.isin(), "US7475251036");
        }
        assert!(logs_contain("assigning `퀄컴` (US7475251036) to every row"));
    }

    #[test]
    #[traced_test]
    fn test_rate_dates_per_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etrade.csv");
        fs::write(&path, INPUT).unwrap();

        let source = MockSource::new(&[("01/31/2024", 1000.0), ("05/20/2024", 2000.0)]);
        let mut rates = FxResolver::new(FxRateCache::new(), Some(&source));
        let records = etrade()
            .read(&mut Stats::default(), &path, &mut rates)
            .unwrap();

        assert_eq!(records[0].cost(), 1_500_000);
        assert_eq!(records[0].proceeds(), 3_600_000);
        assert_eq!(
            *source.calls.borrow(),
            vec![
                RateDate::from(date("2024-01-31")),
                RateDate::from(date("2024-05-20")),
            ]
        );
    }

    #[test]
    #[traced_test]
    fn test_configured_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etrade.csv");
        fs::write(&path, INPUT).unwrap();

        let config = AdapterConfig {
            etrade_name: "애플".to_string(),
            etrade_isin: "US0378331005".to_string(),
        };
        let records = ETrade::new(&config)
            .read(&mut Stats::default(), &path, &mut fixture_rates())
            .unwrap();

        assert_eq!(records[0].name(), "애플");
        assert_eq!(records[0].isin(), "US0378331005");
    }

    #[test]
    #[traced_test]
    fn test_missing_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etrade.csv");
        fs::write(&path, INPUT).unwrap();

        let mut rates = FxResolver::<MockSource>::new(FxRateCache::new(), None);
        let err = etrade()
            .read(&mut Stats::default(), &path, &mut rates)
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(
            err,
            AdapterError::ExchangeRate {
                row: 3,
                source: ExchangeRateError::NotFound(missing),
            } if missing == RateDate::from(date("2024-01-31"))
        ));
    }

    #[test]
    #[traced_test]
    fn test_annotate_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("etrade_krw.csv");
        let mut stats = Stats::default();

        let totals = write_krw_columns(
            &mut stats,
            &fixture("etrade_2024.csv"),
            &output,
            &mut fixture_rates(),
        )
        .unwrap();
        assert_eq!(totals.rows, 3);
        assert_eq!(stats.rows_dropped(), 1);

        let text = fs::read_to_string(&output).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().ends_with(
            "ER Date Acquired (KRW),Adjusted Cost Basis (KRW),ER Date Sold (KRW),\
             Total Proceeds (KRW),Adjusted Gain/Loss (KRW)"
        ));
        assert!(lines
            .next()
            .unwrap()
            .ends_with(",1330.6,1995900,1355.2,2439360,443460"));

        // The annotated file needs no exchange rates at all
        let mut no_rates = FxResolver::<MockSource>::new(FxRateCache::new(), None);
        let annotated = etrade()
            .read(&mut Stats::default(), &output, &mut no_rates)
            .unwrap();
        let original = etrade()
            .read(
                &mut Stats::default(),
                &fixture("etrade_2024.csv"),
                &mut fixture_rates(),
            )
            .unwrap();
        assert_eq!(annotated, original);

        let gain: i64 = original.iter().map(|r| r.proceeds() - r.cost()).sum();
        assert_eq!(totals.gain_krw, gain);

        // Annotating an annotated file replaces the KRW columns
        let again = dir.path().join("etrade_krw2.csv");
        write_krw_columns(&mut stats, &output, &again, &mut fixture_rates()).unwrap();
        assert_eq!(fs::read_to_string(&again).unwrap(), text);
    }

    #[test]
    fn test_required_dates() {
        let dates = required_dates(&fixture("etrade_2024.csv")).unwrap();
        let expected: BTreeSet<RateDate> = [
            "01/31/2024",
            "02/20/2024",
            "03/07/2024",
            "05/20/2024",
            "05/21/2024",
            "08/21/2024",
        ]
        .iter()
        .map(|date| date.parse().unwrap())
        .collect();

        assert_eq!(dates, expected);
    }
}
