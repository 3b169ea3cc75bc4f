use std::path::Path;

use anyhow::{Context, bail};
use csv::StringRecord;
use rusqlite::{Connection, params_from_iter, types::Value};
use tracing::info;

/// Summary of one load run.
#[derive(Debug, Default)]
pub struct LoadStats {
    pub columns: usize,
    pub inserted: usize,
    pub skipped_missing_title: usize,
}

/// Storage type inferred for a CSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Real,
    Text,
}

/// Normalize a CSV header into a column name: trimmed, lowercased, spaces
/// replaced with underscores.
pub fn normalize_column(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Rebuild the `games` table from a CSV file.
///
/// Full-table replace: the previous table is dropped and recreated inside a
/// single transaction, so readers never observe a partial load. Rows with an
/// empty `title` field are skipped and counted. Any CSV parse error or
/// database failure aborts the run.
pub fn load_csv(conn: &mut Connection, csv_path: &Path) -> anyhow::Result<LoadStats> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open CSV '{}'", csv_path.display()))?;

    let columns: Vec<String> = reader
        .headers()
        .context("failed to read CSV header row")?
        .iter()
        .map(normalize_column)
        .collect();
    if columns.is_empty() {
        bail!("CSV '{}' has no columns", csv_path.display());
    }
    let title_idx = columns
        .iter()
        .position(|c| c == "title")
        .with_context(|| format!("CSV '{}' has no 'title' column", csv_path.display()))?;

    // Records are buffered so column types can be inferred before the table
    // is created.
    let mut records: Vec<StringRecord> = Vec::new();
    for record in reader.records() {
        records.push(record.with_context(|| format!("malformed CSV '{}'", csv_path.display()))?);
    }
    let types = infer_column_types(&columns, &records);

    let tx = conn.transaction().context("failed to begin load transaction")?;
    tx.execute("DROP TABLE IF EXISTS games", [])?;
    tx.execute(&create_table_sql(&columns, &types), [])?;

    let insert_sql = format!(
        "INSERT INTO games ({}) VALUES ({})",
        columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
        vec!["?"; columns.len()].join(", ")
    );

    let mut inserted = 0usize;
    let mut skipped = 0usize;
    {
        let mut stmt = tx.prepare(&insert_sql)?;
        for record in &records {
            if record.get(title_idx).is_none_or(str::is_empty) {
                skipped += 1;
                continue;
            }
            let values: Vec<Value> = (0..columns.len())
                .map(|i| field_value(record.get(i).unwrap_or(""), types[i]))
                .collect();
            stmt.execute(params_from_iter(values))?;
            inserted += 1;
        }
    }
    tx.commit().context("failed to commit load transaction")?;

    info!(
        "loaded {} rows into 'games' ({} skipped for missing title)",
        inserted, skipped
    );

    Ok(LoadStats {
        columns: columns.len(),
        inserted,
        skipped_missing_title: skipped,
    })
}

/// A column is REAL when it has at least one non-empty value and every
/// non-empty value parses as a float; otherwise TEXT. Empty fields always
/// load as NULL regardless of type.
fn infer_column_types(columns: &[String], records: &[StringRecord]) -> Vec<ColumnType> {
    (0..columns.len())
        .map(|i| {
            let mut saw_value = false;
            for record in records {
                let field = record.get(i).unwrap_or("");
                if field.is_empty() {
                    continue;
                }
                saw_value = true;
                if field.trim().parse::<f64>().is_err() {
                    return ColumnType::Text;
                }
            }
            if saw_value { ColumnType::Real } else { ColumnType::Text }
        })
        .collect()
}

fn field_value(field: &str, ty: ColumnType) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    match ty {
        ColumnType::Real => field
            .trim()
            .parse::<f64>()
            .map(Value::Real)
            .unwrap_or(Value::Null),
        ColumnType::Text => Value::Text(field.to_string()),
    }
}

fn create_table_sql(columns: &[String], types: &[ColumnType]) -> String {
    let cols = columns
        .iter()
        .zip(types)
        .map(|(c, t)| {
            let ty = match t {
                ColumnType::Real => "REAL",
                ColumnType::Text => "TEXT",
            };
            format!("{} {}", quote_ident(c), ty)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE games ({cols})")
}

// Column names come straight from the CSV header, so always quote them.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
