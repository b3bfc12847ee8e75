mod logging;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{error, info, warn};

use bancodemo_core::{RunConfig, SchemaRegistry};
use bancodemo_engine::{
    CatalogSink, DemoRowSource, LocalWarehouse, MaterializeError, RunReport, analytics,
    reconcile_tables, run_materialization,
};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Engine(#[from] MaterializeError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "bancodemo", version, about = "Banking demo data pipeline")]
struct Cli {
    /// Path to the run configuration file.
    #[arg(long, default_value = "configs/bancodemo.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate and write every configured table.
    Materialize(MaterializeArgs),
    /// Re-key the fact table's foreign key from the dimension table.
    Reconcile(ReconcileArgs),
    /// Run the read-only analytics views over the materialized tables.
    Analyze,
    /// Drop the configured database and all its tables.
    Clean,
}

#[derive(Args, Debug)]
struct MaterializeArgs {
    /// Directory holding one `<table>.json` schema per table.
    #[arg(long, default_value = "schemas")]
    schema_dir: PathBuf,
    /// Seed for the demo row generator. Random when omitted.
    #[arg(long)]
    seed: Option<u64>,
    /// Optional path for the JSON run report.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    #[arg(long, default_value = "clientes")]
    dim_table: String,
    #[arg(long, default_value = "transacoes_cartao")]
    fact_table: String,
    /// Key column shared by both tables.
    #[arg(long, default_value = "id_usuario")]
    key_column: String,
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    // Startup failures abort the whole run; everything after this point is
    // scoped to individual tables or commands.
    let config = match RunConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(path = %cli.config.display(), error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    let warehouse = match LocalWarehouse::open(&config.storage.base_path, &config.database) {
        Ok(warehouse) => warehouse,
        Err(err) => {
            error!(error = %err, "failed to open warehouse session");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Materialize(args) => cmd_materialize(&config, warehouse, args),
        Command::Reconcile(args) => cmd_reconcile(&config, warehouse, args),
        Command::Analyze => run_fatal(|| cmd_analyze(warehouse)),
        Command::Clean => run_fatal(|| cmd_clean(&warehouse)),
    }
}

fn cmd_materialize(
    config: &RunConfig,
    mut warehouse: LocalWarehouse,
    args: MaterializeArgs,
) -> ExitCode {
    let registry = SchemaRegistry::new(args.schema_dir);
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut source = DemoRowSource::new(seed);
    let execution_date = chrono::Local::now().date_naive();

    let report = run_materialization(config, &registry, &mut source, &mut warehouse, execution_date);

    if let Some(path) = &args.report
        && let Err(err) = write_report(path, &report)
    {
        error!(path = %path.display(), error = %err, "failed to write run report");
    }

    // Skipped tables were already logged; partial success is still a normal
    // completion.
    ExitCode::SUCCESS
}

fn cmd_reconcile(
    config: &RunConfig,
    mut warehouse: LocalWarehouse,
    args: ReconcileArgs,
) -> ExitCode {
    if config.file_only {
        error!("reconciliation requires catalog tables, not file-only mode");
        return ExitCode::FAILURE;
    }
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    match reconcile_tables(
        &mut warehouse,
        &args.dim_table,
        &args.fact_table,
        &args.key_column,
        &mut rng,
    ) {
        Ok(outcome) => {
            info!(
                fact_rows = outcome.fact_rows,
                dim_keys = outcome.dim_keys,
                replication_factor = outcome.replication_factor,
                "reconciliation completed"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "reconciliation failed");
            ExitCode::FAILURE
        }
    }
}

fn cmd_analyze(warehouse: LocalWarehouse) -> Result<(), CliError> {
    let clientes = warehouse.read_table("clientes")?;
    let transacoes = warehouse.read_table("transacoes_cartao")?;

    let profiles = analytics::customer_profiles(&clientes.rows);
    let ranked = analytics::spend_by_customer_category(&transacoes.rows, &profiles);
    let anomalias = analytics::anomalous_transactions(&transacoes.rows, &profiles);
    let segmentos = analytics::segment_customers(&transacoes.rows, &profiles);

    info!(
        clientes = clientes.rows.len(),
        transacoes = transacoes.rows.len(),
        grupos_categoria = ranked.len(),
        anomalias = anomalias.len(),
        segmentos = segmentos.len(),
        "analytics views computed"
    );
    for entry in ranked.iter().take(5) {
        info!(
            id_usuario = entry.id_usuario,
            nome = %entry.nome,
            categoria = %entry.categoria,
            total_gastos = entry.total_gastos,
            ranking = entry.ranking_categoria,
            "top category spend"
        );
    }
    for anomalia in anomalias.iter().take(5) {
        info!(
            id_usuario = anomalia.id_usuario,
            nome = %anomalia.nome,
            limite_credito = anomalia.limite_credito,
            valor = anomalia.valor,
            "anomalous transaction"
        );
    }
    Ok(())
}

fn cmd_clean(warehouse: &LocalWarehouse) -> Result<(), CliError> {
    if !warehouse.drop_database()? {
        warn!(database = %warehouse.database(), "database does not exist, nothing to clean");
    }
    Ok(())
}

fn run_fatal(command: impl FnOnce() -> Result<(), CliError>) -> ExitCode {
    match command() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn write_report(path: &PathBuf, report: &RunReport) -> Result<(), CliError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(report)?)?;
    info!(path = %path.display(), "run report written");
    Ok(())
}
