pub mod date;
pub mod text;
pub mod year_ext;
