use serde::Serialize;

/// Outcome of one table in the materialization loop.
#[derive(Debug, Clone, Serialize)]
pub struct TableRunReport {
    pub table: String,
    pub rows_requested: u64,
    pub rows_written: u64,
    pub mode: Option<String>,
    pub layout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Report for a materialization run. Partial success is an accepted outcome;
/// failed tables are recorded here rather than aborting the run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub execution_date: String,
    pub tables: Vec<TableRunReport>,
    pub failures: u64,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(run_id: String, execution_date: String) -> Self {
        Self {
            run_id,
            execution_date,
            tables: Vec::new(),
            failures: 0,
            duration_ms: 0,
        }
    }

    pub fn record_success(&mut self, report: TableRunReport) {
        self.tables.push(report);
    }

    pub fn record_failure(&mut self, table: &str, rows_requested: u64, error: String) {
        self.failures += 1;
        self.tables.push(TableRunReport {
            table: table.to_string(),
            rows_requested,
            rows_written: 0,
            mode: None,
            layout: None,
            error: Some(error),
        });
    }
}
