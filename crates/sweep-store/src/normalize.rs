//! Result normalization
//!
//! Turns raw endpoint rows into row-major or column-major result sets.
//! Each raw term is classified exactly once, here.

use sweep_core::{Binding, RawRow, ResultSet, Row};

/// Append raw rows to `target`, keeping only the declared variables.
///
/// A variable that is unbound or malformed in a row becomes
/// [`Binding::Missing`] in that row; it never drops the row.
pub fn normalize_into(target: &mut ResultSet, rows: &[RawRow], variables: &[String]) {
    match target {
        ResultSet::Rows(out) => {
            for raw in rows {
                let row: Row = variables
                    .iter()
                    .map(|variable| (variable.clone(), Binding::from_raw(raw.get(variable))))
                    .collect();
                out.push(row);
            }
        }
        ResultSet::Columns(out) => {
            for variable in variables {
                out.entry(variable.clone()).or_default();
            }
            for raw in rows {
                for variable in variables {
                    out.entry(variable.clone())
                        .or_default()
                        .push(Binding::from_raw(raw.get(variable)));
                }
            }
        }
    }
}
