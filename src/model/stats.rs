#[derive(Debug, Default)]
pub struct Stats {
    n_files: i32,
    n_files_skipped: i32,
    n_files_failed: i32,
    n_records: i32,
    n_rows_dropped: i32,
    n_template_rows: i32,
}

impl Stats {
    /// A source file matched an adapter.
    pub fn inc_files(&mut self) {
        self.n_files += 1;
    }

    /// A source file matched no adapter.
    pub fn inc_files_skipped(&mut self) {
        self.n_files_skipped += 1;
    }

    /// A source file was abandoned after a non-fatal error.
    pub fn inc_files_failed(&mut self) {
        self.n_files_failed += 1;
    }

    pub fn add_records(&mut self, count: usize) {
        self.n_records += i32::try_from(count).unwrap_or(i32::MAX);
    }

    pub fn inc_rows_dropped(&mut self) {
        self.n_rows_dropped += 1;
    }

    pub fn add_template_rows(&mut self, count: usize) {
        self.n_template_rows += i32::try_from(count).unwrap_or(i32::MAX);
    }

    pub fn files(&self) -> i32 {
        self.n_files
    }

    pub fn files_skipped(&self) -> i32 {
        self.n_files_skipped
    }

    pub fn files_failed(&self) -> i32 {
        self.n_files_failed
    }

    pub fn records(&self) -> i32 {
        self.n_records
    }

    pub fn rows_dropped(&self) -> i32 {
        self.n_rows_dropped
    }

    pub fn pretty_print(&self) {
        println!("{self:#?}");
        println!();
    }
}
