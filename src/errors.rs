pub use crate::client::FetchError;
pub use crate::imports::{AdapterError, ImportError};
pub use crate::model::{AmountError, ExchangeRateError, FxCacheError, RecordError};
pub use crate::model::{ScheduleError, TaxError};
