use chrono::{Datelike, Duration, NaiveDate};
use fake::Fake;
use fake::faker::address::raw::{BuildingNumber, CityName, StreetName};
use fake::faker::company::raw::CompanyName;
use fake::faker::internet::raw::FreeEmail;
use fake::faker::name::raw::Name;
use fake::locales::PT_BR;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use bancodemo_core::{FieldValue, Row};

use crate::errors::MaterializeError;

/// External generator contract: N rows conforming to the table's schema.
pub trait RowSource {
    fn generate(&mut self, table: &str, count: u64) -> Result<Vec<Row>, MaterializeError>;
}

const UFS: &[&str] = &[
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB",
    "PR", "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

const CATEGORIAS: &[&str] = &[
    "Alimentação",
    "Transporte",
    "Entretenimento",
    "Saúde",
    "Educação",
];

const STATUS: &[&str] = &["Aprovada", "Negada", "Pendente"];

const LIMITES_CREDITO: &[i64] = &[1000, 2000, 5000, 10000, 20000];

/// Built-in banking-demo generator for `clientes` and `transacoes_cartao`.
///
/// Values are random but the shape always matches the table schema. Seeded
/// per table so repeated runs with the same seed produce the same batches.
#[derive(Debug, Clone)]
pub struct DemoRowSource {
    seed: u64,
    base_date: NaiveDate,
}

impl DemoRowSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            base_date: chrono::Local::now().date_naive(),
        }
    }

    pub fn with_base_date(mut self, base_date: NaiveDate) -> Self {
        self.base_date = base_date;
        self
    }

    fn cliente(&self, rng: &mut ChaCha8Rng) -> Row {
        let mut row = Row::new();
        row.insert(
            "id_usuario".to_string(),
            FieldValue::Int(rng.random_range(1..=1000)),
        );
        row.insert(
            "nome".to_string(),
            FieldValue::Text(Name(PT_BR).fake_with_rng(rng)),
        );
        row.insert(
            "email".to_string(),
            FieldValue::Text(FreeEmail(PT_BR).fake_with_rng(rng)),
        );
        let idade_dias = rng.random_range((18 * 365)..=(90 * 365));
        row.insert(
            "data_nascimento".to_string(),
            FieldValue::Date(self.base_date - Duration::days(idade_dias)),
        );
        let rua: String = StreetName(PT_BR).fake_with_rng(rng);
        let numero: String = BuildingNumber(PT_BR).fake_with_rng(rng);
        let cidade: String = CityName(PT_BR).fake_with_rng(rng);
        row.insert(
            "endereco".to_string(),
            FieldValue::Text(format!("{rua}, {numero}, {cidade}")),
        );
        row.insert(
            "limite_credito".to_string(),
            FieldValue::Int(*choose(LIMITES_CREDITO, rng)),
        );
        row.insert(
            "numero_cartao".to_string(),
            FieldValue::Text(numero_cartao(rng)),
        );
        row.insert(
            "id_uf".to_string(),
            FieldValue::Text((*choose(UFS, rng)).to_string()),
        );
        row
    }

    fn transacao(&self, rng: &mut ChaCha8Rng) -> Row {
        let mut row = Row::new();
        row.insert(
            "id_usuario".to_string(),
            FieldValue::Int(rng.random_range(1..=1000)),
        );
        row.insert(
            "data_transacao".to_string(),
            FieldValue::Timestamp(timestamp_this_year(self.base_date, rng)),
        );
        let valor = rng.random_range(10.0..=1000.0_f64);
        row.insert(
            "valor".to_string(),
            FieldValue::Float((valor * 100.0).round() / 100.0),
        );
        row.insert(
            "estabelecimento".to_string(),
            FieldValue::Text(CompanyName(PT_BR).fake_with_rng(rng)),
        );
        row.insert(
            "categoria".to_string(),
            FieldValue::Text((*choose(CATEGORIAS, rng)).to_string()),
        );
        row.insert(
            "status".to_string(),
            FieldValue::Text((*choose(STATUS, rng)).to_string()),
        );
        row
    }
}

impl RowSource for DemoRowSource {
    fn generate(&mut self, table: &str, count: u64) -> Result<Vec<Row>, MaterializeError> {
        debug!(table = %table, rows = count, "generating demo rows");
        let mut rng = ChaCha8Rng::seed_from_u64(hash_seed(self.seed, table));
        match table {
            "clientes" => Ok((0..count).map(|_| self.cliente(&mut rng)).collect()),
            "transacoes_cartao" => Ok((0..count).map(|_| self.transacao(&mut rng)).collect()),
            other => Err(MaterializeError::Data(format!(
                "unknown table '{other}' for demo row source"
            ))),
        }
    }
}

fn choose<'a, T>(values: &'a [T], rng: &mut ChaCha8Rng) -> &'a T {
    // The slices above are non-empty constants.
    values.choose(rng).unwrap_or(&values[0])
}

fn numero_cartao(rng: &mut ChaCha8Rng) -> String {
    (0..16)
        .map(|_| char::from(b'0' + rng.random_range(0..10_u8)))
        .collect()
}

fn timestamp_this_year(base_date: NaiveDate, rng: &mut ChaCha8Rng) -> chrono::NaiveDateTime {
    let jan1 = NaiveDate::from_ymd_opt(base_date.year(), 1, 1)
        .unwrap_or(base_date)
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();
    let elapsed = (base_date.and_hms_opt(23, 59, 59).unwrap_or_default() - jan1).num_seconds();
    jan1 + Duration::seconds(rng.random_range(0..=elapsed.max(1)))
}

fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
