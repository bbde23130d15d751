//! Ad-hoc queries — read-only SQL over a table.
//!
//! Columnar backends copy the logical table into a private in-memory SQLite
//! database, run the query there and drop the database. The row store runs
//! the same guard and executes directly against its database file.

use crate::error::{TabulaError, TabulaResult};
use crate::frame::Frame;
use crate::storage::columnar::infer_data_type;
use crate::value::ScalarValue;
use arrow::datatypes::DataType;
use rusqlite::Connection;
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use tracing::debug;

/// Reject anything but a single query statement.
pub fn ensure_read_only(sql: &str) -> TabulaResult<()> {
    let statements = Parser::parse_sql(&SQLiteDialect {}, sql).map_err(|e| TabulaError::SqlParse {
        message: e.to_string(),
        sql: sql.to_string(),
    })?;

    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [] => Err(TabulaError::SqlParse {
            message: "empty query".to_string(),
            sql: sql.to_string(),
        }),
        [_] => Err(TabulaError::ReadOnlyQuery(sql.to_string())),
        _ => Err(TabulaError::ReadOnlyQuery(format!(
            "expected a single statement, got {}: {sql}",
            statements.len()
        ))),
    }
}

/// Run `sql` against `frame` exposed as a table named `table`.
pub fn query_frame(frame: &Frame, table: &str, sql: &str) -> TabulaResult<Frame> {
    ensure_read_only(sql)?;
    let mut conn = Connection::open_in_memory()?;
    materialize(&mut conn, table, frame)?;
    debug!(table, rows = frame.num_rows(), "materialized table for query");
    run_query(&conn, sql)
}

/// Execute a (guarded) query and collect its result set.
pub(crate) fn run_query(conn: &Connection, sql: &str) -> TabulaResult<Frame> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut result = Frame::new(columns);

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| row.get_ref(i).map(ScalarValue::from_sql))
            .collect::<Result<Vec<_>, _>>()?;
        result.push_row(values)?;
    }
    Ok(result)
}

/// Quote an identifier for SQLite.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite column type for an Arrow type.
pub(crate) fn sql_type_for(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Int64 => "INTEGER",
        DataType::Float64 => "REAL",
        DataType::Boolean => "BOOLEAN",
        _ => "TEXT",
    }
}

fn materialize(conn: &mut Connection, table: &str, frame: &Frame) -> TabulaResult<()> {
    let column_defs: Vec<String> = frame
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let dt = infer_data_type(frame.rows().iter().map(|row| &row[idx]));
            format!("{} {}", quote_ident(name), sql_type_for(&dt))
        })
        .collect();
    let tx = conn.transaction()?;
    tx.execute(
        &format!("CREATE TABLE {} ({})", quote_ident(table), column_defs.join(", ")),
        [],
    )?;
    {
        let placeholders = vec!["?"; frame.num_columns()].join(", ");
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} VALUES ({placeholders})",
            quote_ident(table)
        ))?;
        for row in frame.rows() {
            insert.execute(rusqlite::params_from_iter(row.iter()))?;
        }
    }
    tx.commit()?;
    Ok(())
}
