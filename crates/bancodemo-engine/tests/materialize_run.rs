use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use bancodemo_core::{FieldValue, Row, RunConfig, SchemaRegistry, StorageTarget, TableSpec};
use bancodemo_engine::{
    CATALOG_FORMAT, CatalogSink, DemoRowSource, FlatFileSink, GeneratedBatch, Layout,
    LocalWarehouse, MaterializeError, Materializer, RowSource, TableRows, WriteMode,
    run_materialization,
};

fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bancodemo_{label}_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn schema_registry() -> SchemaRegistry {
    SchemaRegistry::new(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../schemas"))
}

fn config_with(base_path: &Path) -> RunConfig {
    let contents = format!(
        r#"
[default]
apenas_arquivos = false
dbname = "bancodemo"
tabelas = "clientes"

[tables.clientes]
num_records = 100

[tables.transacoes_cartao]
num_records = 50
particionamento = true

[tables.emprestimos]
num_records = 10

[storage]
storage_type = "S3"
base_path = "{base}"
"#,
        base = base_path.display(),
    );
    RunConfig::parse(&contents).expect("parse test config")
}

fn execution_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 20).expect("valid date")
}

#[test]
fn scenario_fresh_catalog_table_is_overwritten_with_stamp() {
    let base = temp_dir("scenario_a");
    let config = config_with(&base);
    let registry = schema_registry();
    let mut source = DemoRowSource::new(11);
    let mut warehouse = LocalWarehouse::open(&base, &config.database).expect("open warehouse");

    let report = run_materialization(
        &config,
        &registry,
        &mut source,
        &mut warehouse,
        execution_date(),
    );

    assert_eq!(report.failures, 0);
    assert_eq!(report.tables.len(), 1);
    assert_eq!(report.tables[0].rows_written, 100);
    assert_eq!(report.tables[0].mode.as_deref(), Some("overwrite"));
    assert_eq!(report.tables[0].layout.as_deref(), Some("none"));

    let table = warehouse.read_table("clientes").expect("read clientes");
    assert_eq!(table.rows.len(), 100);
    assert_eq!(
        table.schema.columns.last().map(|col| col.name.as_str()),
        Some("data_execucao")
    );
    for row in &table.rows {
        assert_eq!(row["data_execucao"], FieldValue::Date(execution_date()));
    }

    // Manifest records the fixed catalog format, not the configured one.
    let meta: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(base.join("bancodemo/clientes/_meta.json")).expect("read manifest"),
    )
    .expect("parse manifest");
    assert_eq!(meta["format"], "parquet");
}

#[test]
fn scenario_existing_partitioned_table_is_appended() {
    let base = temp_dir("scenario_b");
    let mut config = config_with(&base);
    config.tables = vec![TableSpec {
        name: "transacoes_cartao".to_string(),
        num_records: 50,
        partitioned: true,
        bucketed: false,
        num_buckets: 0,
        clustered_by: "id_usuario".to_string(),
    }];
    let registry = schema_registry();
    let mut source = DemoRowSource::new(12);
    let mut warehouse = LocalWarehouse::open(&base, &config.database).expect("open warehouse");

    let first = run_materialization(
        &config,
        &registry,
        &mut source,
        &mut warehouse,
        execution_date(),
    );
    assert_eq!(first.tables[0].mode.as_deref(), Some("overwrite"));

    let second = run_materialization(
        &config,
        &registry,
        &mut source,
        &mut warehouse,
        execution_date(),
    );
    assert_eq!(second.tables[0].mode.as_deref(), Some("append"));
    assert_eq!(second.tables[0].layout.as_deref(), Some("partition_by_date"));

    let partition_dir = base.join("bancodemo/transacoes_cartao/data_execucao=2024-05-20");
    assert!(partition_dir.is_dir(), "partition directory should exist");
    let parts = fs::read_dir(&partition_dir)
        .expect("read partition dir")
        .count();
    assert_eq!(parts, 2, "one part file per write");

    let table = warehouse
        .read_table("transacoes_cartao")
        .expect("read transacoes");
    assert_eq!(table.rows.len(), 100);
}

#[test]
fn file_only_mode_overwrites_the_target_path_every_run() {
    let base = temp_dir("file_only");
    let mut config = config_with(&base);
    config.file_only = true;
    config.file_format = "csv".to_string();
    let registry = schema_registry();
    let mut source = DemoRowSource::new(13);
    let mut warehouse = LocalWarehouse::open(&base, &config.database).expect("open warehouse");

    for _ in 0..2 {
        let report = run_materialization(
            &config,
            &registry,
            &mut source,
            &mut warehouse,
            execution_date(),
        );
        assert_eq!(report.failures, 0);
        assert_eq!(report.tables[0].mode.as_deref(), Some("overwrite"));
    }

    let files = fs::read_dir(base.join("clientes"))
        .expect("read flat-file dir")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "csv"))
        .count();
    assert_eq!(files, 1, "second run replaces the first");

    // No catalog registration happened for the flat-file table.
    assert!(
        !warehouse
            .table_exists("clientes")
            .expect("existence check")
    );
}

#[test]
fn failed_table_is_skipped_and_the_loop_continues() {
    let base = temp_dir("partial");
    let mut config = config_with(&base);
    // emprestimos has no schema file; clientes comes after and must still land.
    config.tables = vec![
        TableSpec {
            name: "emprestimos".to_string(),
            num_records: 10,
            partitioned: false,
            bucketed: false,
            num_buckets: 0,
            clustered_by: "id_usuario".to_string(),
        },
        config.tables[0].clone(),
    ];
    let registry = schema_registry();
    let mut source = DemoRowSource::new(14);
    let mut warehouse = LocalWarehouse::open(&base, &config.database).expect("open warehouse");

    let report = run_materialization(
        &config,
        &registry,
        &mut source,
        &mut warehouse,
        execution_date(),
    );

    assert_eq!(report.failures, 1);
    assert_eq!(report.tables.len(), 2);
    assert!(report.tables[0].error.is_some());
    assert!(warehouse.table_exists("clientes").expect("existence check"));
    assert!(
        !warehouse
            .table_exists("emprestimos")
            .expect("existence check")
    );
}

// Recording double used to observe call ordering and formats.
#[derive(Default)]
struct RecordingEngine {
    existing: Vec<String>,
    calls: Vec<String>,
}

impl CatalogSink for RecordingEngine {
    fn table_exists(&self, table: &str) -> Result<bool, MaterializeError> {
        Ok(self.existing.iter().any(|name| name == table))
    }

    fn refresh_metadata(&mut self, table: &str) -> Result<(), MaterializeError> {
        self.calls.push(format!("refresh:{table}"));
        Ok(())
    }

    fn write_table(
        &mut self,
        table: &str,
        batch: &GeneratedBatch,
        mode: WriteMode,
        layout: &Layout,
        format: &str,
    ) -> Result<(), MaterializeError> {
        self.calls.push(format!(
            "write:{table}:{mode:?}:{format}:{}:{}",
            layout.describe(),
            batch.rows.len()
        ));
        Ok(())
    }

    fn read_table(&self, table: &str) -> Result<TableRows, MaterializeError> {
        Err(MaterializeError::Write(format!(
            "table '{table}' not readable in recording double"
        )))
    }
}

impl FlatFileSink for RecordingEngine {
    fn write_files(
        &mut self,
        path: &Path,
        batch: &GeneratedBatch,
        mode: WriteMode,
        format: &str,
        _layout: &Layout,
    ) -> Result<(), MaterializeError> {
        self.calls.push(format!(
            "files:{}:{mode:?}:{format}:{}",
            path.display(),
            batch.rows.len()
        ));
        Ok(())
    }
}

struct FixedSource;

impl RowSource for FixedSource {
    fn generate(&mut self, _table: &str, count: u64) -> Result<Vec<Row>, MaterializeError> {
        Ok((0..count)
            .map(|index| {
                let mut row = Row::new();
                row.insert("id_usuario".to_string(), FieldValue::Int(index as i64));
                row
            })
            .collect())
    }
}

#[test]
fn append_issues_metadata_refresh_before_the_write() {
    let registry = schema_registry();
    let schema = registry.schema_for("clientes").expect("load schema");
    let spec = TableSpec {
        name: "clientes".to_string(),
        num_records: 3,
        partitioned: false,
        bucketed: false,
        num_buckets: 0,
        clustered_by: "id_usuario".to_string(),
    };
    let target = StorageTarget::Catalog {
        database: "bancodemo".to_string(),
    };

    let mut engine = RecordingEngine {
        existing: vec!["clientes".to_string()],
        calls: Vec::new(),
    };
    let mut source = FixedSource;
    let mut materializer = Materializer::new(&mut source, &mut engine, execution_date());
    materializer
        .materialize(&spec, &schema, &target)
        .expect("materialize");

    assert_eq!(
        engine.calls,
        vec![
            "refresh:clientes".to_string(),
            format!("write:clientes:Append:{CATALOG_FORMAT}:none:3"),
        ]
    );
}

#[test]
fn catalog_writes_use_parquet_even_with_another_configured_format() {
    let registry = schema_registry();
    let schema = registry.schema_for("clientes").expect("load schema");
    let spec = TableSpec {
        name: "clientes".to_string(),
        num_records: 2,
        partitioned: false,
        bucketed: false,
        num_buckets: 0,
        clustered_by: "id_usuario".to_string(),
    };
    let target = StorageTarget::Catalog {
        database: "bancodemo".to_string(),
    };

    let mut engine = RecordingEngine::default();
    let mut source = FixedSource;
    let mut materializer = Materializer::new(&mut source, &mut engine, execution_date());
    materializer
        .materialize(&spec, &schema, &target)
        .expect("materialize");

    assert_eq!(
        engine.calls,
        vec!["write:clientes:Overwrite:parquet:none:2".to_string()]
    );
}

struct ShortSource;

impl RowSource for ShortSource {
    fn generate(&mut self, _table: &str, count: u64) -> Result<Vec<Row>, MaterializeError> {
        Ok((0..count.saturating_sub(1)).map(|_| Row::new()).collect())
    }
}

#[test]
fn row_count_mismatch_is_a_hard_data_error() {
    let registry = schema_registry();
    let schema = registry.schema_for("clientes").expect("load schema");
    let spec = TableSpec {
        name: "clientes".to_string(),
        num_records: 5,
        partitioned: false,
        bucketed: false,
        num_buckets: 0,
        clustered_by: "id_usuario".to_string(),
    };
    let target = StorageTarget::Catalog {
        database: "bancodemo".to_string(),
    };

    let mut engine = RecordingEngine::default();
    let mut source = ShortSource;
    let mut materializer = Materializer::new(&mut source, &mut engine, execution_date());
    let err = materializer
        .materialize(&spec, &schema, &target)
        .unwrap_err();
    assert!(matches!(err, MaterializeError::Data(_)));
    assert!(engine.calls.is_empty(), "nothing may be written");
}
