use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use bancodemo_core::{FieldValue, Row};

use crate::errors::MaterializeError;
use crate::materialize::CATALOG_FORMAT;
use crate::sink::{CatalogSink, GeneratedBatch, Layout, WriteMode};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub fact_rows: u64,
    pub dim_keys: u64,
    pub replication_factor: u64,
}

/// Re-key fact rows with a near-uniform random draw from the dimension keys.
///
/// The dimension keys are shuffled, replicated `ceil(fact / dim)` times into
/// a pool at least as large as the fact table, shuffled again, and zipped
/// row-for-row with the fact rows. Output cardinality equals the input fact
/// cardinality exactly.
pub fn reconcile_rows<R: Rng>(
    dim_keys: &[FieldValue],
    fact_rows: &[Row],
    fk_column: &str,
    rng: &mut R,
) -> Result<Vec<Row>, MaterializeError> {
    if fact_rows.is_empty() {
        return Ok(Vec::new());
    }
    if dim_keys.is_empty() {
        return Err(MaterializeError::Data(
            "dimension key set is empty, reconciliation is undefined".to_string(),
        ));
    }

    let mut keys = dim_keys.to_vec();
    keys.shuffle(rng);

    let replication = fact_rows.len().div_ceil(keys.len());
    let mut pool = Vec::with_capacity(replication * keys.len());
    for _ in 0..replication {
        pool.extend(keys.iter().cloned());
    }
    pool.shuffle(rng);

    let reconciled = fact_rows
        .iter()
        .zip(pool)
        .map(|(row, key)| {
            let mut row = row.clone();
            row.insert(fk_column.to_string(), key);
            row
        })
        .collect();
    Ok(reconciled)
}

/// Read both tables from the catalog, re-key the fact table's foreign key
/// from the dimension's key column, and overwrite the fact table in place.
pub fn reconcile_tables<E, R>(
    engine: &mut E,
    dim_table: &str,
    fact_table: &str,
    key_column: &str,
    rng: &mut R,
) -> Result<ReconcileOutcome, MaterializeError>
where
    E: CatalogSink,
    R: Rng,
{
    let dim = engine.read_table(dim_table)?;
    let fact = engine.read_table(fact_table)?;

    let keys = distinct_keys(&dim.rows, key_column);
    let fact_rows = fact.rows.len() as u64;
    let dim_keys = keys.len() as u64;
    let replication_factor = if keys.is_empty() {
        0
    } else {
        fact_rows.div_ceil(dim_keys)
    };

    info!(
        dim_table = %dim_table,
        fact_table = %fact_table,
        dim_keys,
        fact_rows,
        replication_factor,
        "reconciling foreign key cardinality"
    );

    let rows = reconcile_rows(&keys, &fact.rows, key_column, rng)?;
    let batch = GeneratedBatch {
        schema: fact.schema.clone(),
        rows,
    };
    engine.write_table(
        fact_table,
        &batch,
        WriteMode::Overwrite,
        &Layout::None,
        CATALOG_FORMAT,
    )?;

    info!(
        fact_table = %fact_table,
        rows = fact_rows,
        "reconciled table overwritten"
    );
    Ok(ReconcileOutcome {
        fact_rows,
        dim_keys,
        replication_factor,
    })
}

/// Distinct key values in load order, nulls excluded.
fn distinct_keys(rows: &[Row], key_column: &str) -> Vec<FieldValue> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for row in rows {
        if let Some(value) = row.get(key_column)
            && !value.is_null()
            && seen.insert(value.render())
        {
            keys.push(value.clone());
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn fact_rows(count: usize) -> Vec<Row> {
        (0..count)
            .map(|index| {
                let mut row = Row::new();
                row.insert("id_usuario".to_string(), FieldValue::Int(-1));
                row.insert("valor".to_string(), FieldValue::Float(index as f64));
                row
            })
            .collect()
    }

    #[test]
    fn output_cardinality_equals_fact_cardinality() {
        let keys = vec![
            FieldValue::Int(1),
            FieldValue::Int(2),
            FieldValue::Int(3),
        ];
        let fact = fact_rows(10);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = reconcile_rows(&keys, &fact, "id_usuario", &mut rng).expect("reconcile");
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn every_key_comes_from_the_dimension_set() {
        let keys = vec![
            FieldValue::Text("A".to_string()),
            FieldValue::Text("B".to_string()),
            FieldValue::Text("C".to_string()),
        ];
        let fact = fact_rows(10);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let out = reconcile_rows(&keys, &fact, "id_usuario", &mut rng).expect("reconcile");
        for row in &out {
            let key = row["id_usuario"].as_text().expect("text key");
            assert!(["A", "B", "C"].contains(&key));
        }
    }

    #[test]
    fn non_key_columns_are_preserved() {
        let keys = vec![FieldValue::Int(7)];
        let fact = fact_rows(3);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let out = reconcile_rows(&keys, &fact, "id_usuario", &mut rng).expect("reconcile");
        for (index, row) in out.iter().enumerate() {
            assert_eq!(row["valor"], FieldValue::Float(index as f64));
            assert_eq!(row["id_usuario"], FieldValue::Int(7));
        }
    }

    #[test]
    fn empty_dimension_is_data_error() {
        let fact = fact_rows(5);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let err = reconcile_rows(&[], &fact, "id_usuario", &mut rng).unwrap_err();
        assert!(matches!(err, MaterializeError::Data(_)));
    }

    #[test]
    fn empty_fact_succeeds_trivially() {
        let keys = vec![FieldValue::Int(1)];
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let out = reconcile_rows(&keys, &[], "id_usuario", &mut rng).expect("reconcile");
        assert!(out.is_empty());
    }

    #[test]
    fn distinct_keys_dedupes_and_skips_nulls() {
        let mut rows = fact_rows(0);
        for value in [FieldValue::Int(1), FieldValue::Int(1), FieldValue::Null, FieldValue::Int(2)] {
            let mut row = Row::new();
            row.insert("id_usuario".to_string(), value);
            rows.push(row);
        }
        let keys = distinct_keys(&rows, "id_usuario");
        assert_eq!(keys, vec![FieldValue::Int(1), FieldValue::Int(2)]);
    }
}
