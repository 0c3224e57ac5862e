use anyhow::Result;
use clap::ValueEnum;
use ctxbind_driver::{ResultSet, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Tab-separated, header first
    Tsv,
    /// One JSON object per row
    Json,
}

pub fn print_rows(rows: &ResultSet, format: Format) -> Result<()> {
    match format {
        Format::Tsv => {
            let header: Vec<&str> = rows.columns().iter().map(|c| c.name.as_str()).collect();
            println!("{}", header.join("\t"));
            for row in rows.rows() {
                let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
                println!("{}", cells.join("\t"));
            }
        }
        Format::Json => {
            for row in rows.rows() {
                println!("{}", serde_json::to_string(&row_json(rows, row))?);
            }
        }
    }
    Ok(())
}

pub fn print_count(count: u64, format: Format) {
    match format {
        Format::Tsv => println!("{count} row(s) affected"),
        Format::Json => println!("{}", serde_json::json!({ "affected": count })),
    }
}

fn row_json(rows: &ResultSet, row: &[Value]) -> serde_json::Value {
    let object = rows
        .columns()
        .iter()
        .zip(row)
        .map(|(column, value)| (column.name.clone(), value_json(value)))
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(object)
}

fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => serde_json::Value::Bool(*v),
        Value::Int(v) => serde_json::Value::from(*v),
        Value::Float(v) => serde_json::Number::from_f64(*v)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(v) => serde_json::Value::String(v.clone()),
        Value::Bytes(v) => serde_json::Value::from(v.clone()),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use ctxbind_driver::Column;

    use super::*;

    #[test]
    fn rows_become_objects_keyed_by_column() {
        let rows = ResultSet::new(
            vec![Column::new("id", "INT8"), Column::new("title", "TEXT")],
            vec![vec![Value::Int(1), Value::Null]],
        );
        let json = row_json(&rows, &rows.rows()[0]);
        assert_eq!(json, serde_json::json!({ "id": 1, "title": null }));
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(value_json(&Value::Float(f64::NAN)), serde_json::Value::Null);
    }
}
