use neuragraph_core::{Matrix, Value};
use std::collections::HashMap;

// Shared by several test binaries; not every binary uses every helper.
#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[allow(dead_code)]
pub fn row(data: &[f64]) -> Value {
    Matrix::from_vec(1, data.len(), data.to_vec())
        .expect("Test matrix creation failed")
        .into()
}

#[allow(dead_code)]
pub fn matrix(rows: &[&[f64]]) -> Value {
    Matrix::from_rows(rows.iter().map(|r| r.to_vec()).collect())
        .expect("Test matrix creation failed")
        .into()
}

/// Builds a name -> value map for `Graph::forward` / `Graph::backward`.
#[allow(dead_code)]
pub fn named(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}
