pub use self::{amount::*, fx_rate::*, record::*, schedule::*, stats::*, tax::*};

mod amount;
pub mod constants;
mod fx_rate;
pub(crate) mod record;
mod schedule;
mod stats;
mod tax;
