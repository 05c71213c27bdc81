use crate::error::DbResult;
use crate::pool::ConnPool;
use crate::row::Row;
use migrator_types::Entity;
use rusqlite::types::Value;

/// Maps an [`Entity`] onto a table keyed by an integer `id` column.
///
/// Tables taking part in validation must also carry an integer `utime`
/// column holding the last modification time.
pub trait Record: Entity + Sized + Send + Sync + 'static {
    /// Table name, used verbatim in generated SQL.
    const TABLE: &'static str;

    /// Builds a value from a `SELECT *` row.
    fn from_row(row: &Row) -> DbResult<Self>;
}

/// Point lookup by primary key.
pub fn find_by_id<T: Record>(pool: &dyn ConnPool, id: i64) -> DbResult<T> {
    let row = pool.query_row(
        &format!("SELECT * FROM {} WHERE id = ?1", T::TABLE),
        &[Value::Integer(id)],
    )?;
    T::from_row(&row)
}
