use crate::model::amount::{normalize, AmountError, RawAmount};
use crate::model::record::{Classification, Lot, RecordError, ScheduleCsvRow, TaxRecord};
use crate::model::record::SCHEDULE_HEADERS;
use crate::util::{date::parse_date, text::decode};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::{fmt, fs};
use thiserror::Error;
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Source file not found: {0:?}")]
    SourceFileNotFound(PathBuf),

    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("CSV error")]
    Csv(#[from] csv::Error),

    #[error("Template row {row}: invalid amount in column `{column}`")]
    Amount {
        row: usize,
        column: &'static str,
        #[source]
        source: AmountError,
    },

    #[error("Template row {row}: invalid date `{value}` in column `{column}`")]
    Date {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("Template row {row}: invalid record")]
    Record {
        row: usize,
        #[source]
        source: RecordError,
    },
}

/// The filing schedule: template rows first, then adapter records in the order they were added.
///
/// Rows are neither deduplicated nor sorted.
#[derive(Debug, Default)]
pub struct Schedule {
    records: Vec<TaxRecord>,
}

impl Schedule {
    pub fn new(template: Vec<TaxRecord>) -> Self {
        Self { records: template }
    }

    /// Read template rows from a CSV with the canonical headers.
    pub fn load_template(path: impl AsRef<Path>) -> Result<Vec<TaxRecord>, ScheduleError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ScheduleError::SourceFileNotFound(path.to_path_buf()));
        }

        let bytes = fs::read(path)?;
        let text = decode(&bytes);
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut records = Vec::new();
        for (i, row) in rdr.deserialize::<ScheduleCsvRow>().enumerate() {
            // Header is line 1
            records.push(from_csv(row?, i + 2)?);
        }
        debug!("Loaded {} template rows from {path:?}", records.len());

        Ok(records)
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = TaxRecord>) {
        self.records.extend(records);
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaxRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[TaxRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the schedule as a UTF-8 CSV file.
    ///
    /// A byte order mark is written first so that spreadsheet software detects the encoding.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), ScheduleError> {
        let path = path.as_ref();
        let mut file = io::BufWriter::new(fs::File::create(path)?);
        file.write_all(UTF8_BOM)?;
        self.to_writer(&mut file)?;
        file.flush()?;
        debug!("Wrote {} schedule rows to {path:?}", self.len());

        Ok(())
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), ScheduleError> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);

        wtr.write_record(SCHEDULE_HEADERS)?;
        for record in &self.records {
            wtr.serialize(record.to_csv())?;
        }
        wtr.flush()?;

        Ok(())
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        self.to_writer(&mut buf).map_err(|_| fmt::Error)?;

        f.write_str(&String::from_utf8_lossy(&buf))
    }
}

fn from_csv(row: ScheduleCsvRow, line: usize) -> Result<TaxRecord, ScheduleError> {
    let amount = |column, value: &str| {
        normalize(RawAmount::from_cell(value)).map_err(|source| ScheduleError::Amount {
            row: line,
            column,
            source,
        })
    };
    let date = |column, value: &str| {
        parse_date(value).map_err(|_| ScheduleError::Date {
            row: line,
            column,
            value: value.to_string(),
        })
    };
    let record_err = |source| ScheduleError::Record { row: line, source };

    let lot = Lot {
        quantity: amount(SCHEDULE_HEADERS[2], &row.quantity)?,
        disposed: date(SCHEDULE_HEADERS[7], &row.disposed)?,
        proceeds: amount(SCHEDULE_HEADERS[8], &row.proceeds)?,
        acquired: date(SCHEDULE_HEADERS[9], &row.acquired)?,
        cost: amount(SCHEDULE_HEADERS[10], &row.cost)?,
        expenses: amount(SCHEDULE_HEADERS[11], &row.expenses)?,
        name: row.name,
        isin: row.isin,
    };
    let classification = Classification {
        market: row.market.parse().map_err(record_err)?,
        tax_rate_class: row.tax_rate_class,
        security_type: row.security_type,
        item_kind: row.item_kind,
        acquisition_type: row.acquisition_type,
        country_code: row.country_code,
        asset_description: row.asset_description,
    };

    TaxRecord::new(lot, classification).map_err(record_err)
}
