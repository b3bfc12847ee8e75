//! Read-only aggregation views over the materialized demo tables.
//!
//! Pure functions over rows read back through the catalog; nothing here
//! writes. Client attributes are joined in through a profile lookup built
//! from the dimension table.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;

use bancodemo_core::Row;

/// Client attributes carried into the views.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomerProfile {
    pub nome: String,
    pub limite_credito: i64,
}

/// Lookup from `id_usuario` to the client's display attributes.
pub fn customer_profiles(clientes: &[Row]) -> BTreeMap<i64, CustomerProfile> {
    let mut profiles = BTreeMap::new();
    for row in clientes {
        let Some(id) = row.get("id_usuario").and_then(|v| v.as_int()) else {
            continue;
        };
        profiles.insert(
            id,
            CustomerProfile {
                nome: row
                    .get("nome")
                    .and_then(|v| v.as_text())
                    .unwrap_or_default()
                    .to_string(),
                limite_credito: row
                    .get("limite_credito")
                    .and_then(|v| v.as_int())
                    .unwrap_or_default(),
            },
        );
    }
    profiles
}

fn profile_for(profiles: &BTreeMap<i64, CustomerProfile>, id: i64) -> CustomerProfile {
    profiles.get(&id).cloned().unwrap_or_default()
}

/// Total spend per (customer, category) with a rank inside each category.
#[derive(Debug, Clone, Serialize)]
pub struct CategorySpend {
    pub id_usuario: i64,
    pub nome: String,
    pub categoria: String,
    pub total_gastos: f64,
    pub ranking_categoria: u32,
}

pub fn spend_by_customer_category(
    transacoes: &[Row],
    profiles: &BTreeMap<i64, CustomerProfile>,
) -> Vec<CategorySpend> {
    let mut totals: BTreeMap<(String, i64), f64> = BTreeMap::new();
    for row in transacoes {
        let (Some(id), Some(categoria), Some(valor)) = (
            row.get("id_usuario").and_then(|v| v.as_int()),
            row.get("categoria").and_then(|v| v.as_text()),
            row.get("valor").and_then(|v| v.as_float()),
        ) else {
            continue;
        };
        *totals.entry((categoria.to_string(), id)).or_insert(0.0) += valor;
    }

    let mut out = Vec::with_capacity(totals.len());
    let mut current_category: Option<String> = None;
    let mut group: Vec<CategorySpend> = Vec::new();
    for ((categoria, id), total) in totals {
        if current_category.as_deref() != Some(categoria.as_str()) {
            flush_ranked(&mut group, &mut out);
            current_category = Some(categoria.clone());
        }
        group.push(CategorySpend {
            id_usuario: id,
            nome: profile_for(profiles, id).nome,
            categoria,
            total_gastos: total,
            ranking_categoria: 0,
        });
    }
    flush_ranked(&mut group, &mut out);
    out
}

fn flush_ranked(group: &mut Vec<CategorySpend>, out: &mut Vec<CategorySpend>) {
    group.sort_by(|a, b| {
        b.total_gastos
            .partial_cmp(&a.total_gastos)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (index, mut entry) in group.drain(..).enumerate() {
        entry.ranking_categoria = index as u32 + 1;
        out.push(entry);
    }
}

/// One transaction flagged as anomalous, with the client joined in.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalousTransaction {
    pub id_usuario: i64,
    pub nome: String,
    pub limite_credito: i64,
    pub valor: f64,
    pub data_transacao: Option<NaiveDateTime>,
}

/// Transactions above mean + 3 standard deviations of the customer's own
/// spend. Customers with fewer than two transactions are skipped.
pub fn anomalous_transactions(
    transacoes: &[Row],
    profiles: &BTreeMap<i64, CustomerProfile>,
) -> Vec<AnomalousTransaction> {
    let mut per_customer: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for row in transacoes {
        let (Some(id), Some(valor)) = (
            row.get("id_usuario").and_then(|v| v.as_int()),
            row.get("valor").and_then(|v| v.as_float()),
        ) else {
            continue;
        };
        per_customer.entry(id).or_default().push(valor);
    }

    let mut thresholds: BTreeMap<i64, f64> = BTreeMap::new();
    for (id, values) in &per_customer {
        if values.len() < 2 {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / (values.len() as f64 - 1.0);
        thresholds.insert(*id, mean + 3.0 * variance.sqrt());
    }

    let mut out = Vec::new();
    for row in transacoes {
        let (Some(id), Some(valor)) = (
            row.get("id_usuario").and_then(|v| v.as_int()),
            row.get("valor").and_then(|v| v.as_float()),
        ) else {
            continue;
        };
        if thresholds.get(&id).is_some_and(|limit| valor > *limit) {
            let profile = profile_for(profiles, id);
            out.push(AnomalousTransaction {
                id_usuario: id,
                nome: profile.nome,
                limite_credito: profile.limite_credito,
                valor,
                data_transacao: row.get("data_transacao").and_then(|v| v.as_timestamp()),
            });
        }
    }
    out
}

/// Customer activity segments by active months and total spend.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerSegment {
    pub id_usuario: i64,
    pub nome: String,
    pub meses_ativos: u32,
    pub total_gastos: f64,
    pub segmento: &'static str,
}

pub fn segment_customers(
    transacoes: &[Row],
    profiles: &BTreeMap<i64, CustomerProfile>,
) -> Vec<CustomerSegment> {
    let mut months: BTreeMap<i64, std::collections::BTreeSet<(i32, u32)>> = BTreeMap::new();
    let mut totals: BTreeMap<i64, f64> = BTreeMap::new();
    for row in transacoes {
        let (Some(id), Some(valor), Some(data)) = (
            row.get("id_usuario").and_then(|v| v.as_int()),
            row.get("valor").and_then(|v| v.as_float()),
            row.get("data_transacao").and_then(|v| v.as_timestamp()),
        ) else {
            continue;
        };
        months
            .entry(id)
            .or_default()
            .insert((data.year(), data.month()));
        *totals.entry(id).or_insert(0.0) += valor;
    }

    totals
        .into_iter()
        .map(|(id, total)| {
            let active = months.get(&id).map(|set| set.len() as u32).unwrap_or(0);
            CustomerSegment {
                id_usuario: id,
                nome: profile_for(profiles, id).nome,
                meses_ativos: active,
                total_gastos: total,
                segmento: segment_for(active, total),
            }
        })
        .collect()
}

fn segment_for(meses_ativos: u32, total_gastos: f64) -> &'static str {
    if meses_ativos >= 10 && total_gastos > 50_000.0 {
        "VIP"
    } else if meses_ativos >= 6 && total_gastos > 25_000.0 {
        "Regular"
    } else if meses_ativos >= 3 && total_gastos > 10_000.0 {
        "Ocasional"
    } else {
        "Inativo"
    }
}
