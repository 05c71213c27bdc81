//! Repairs one inconsistency by overwriting the target with the base row.

use crate::call::with_timeout;
use crate::error::ReconcileResult;
use migrator_db::{ConnPool, DbError, DbResult, Record, Value};
use migrator_types::InconsistentEvent;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Makes `target` agree with `base` for a single row id.
///
/// The column list is read from `target` once, at construction, and every
/// repair writes all of those columns.
pub struct OverrideFixer<T: Record> {
    base: Arc<dyn ConnPool>,
    target: Arc<dyn ConnPool>,
    columns: Arc<[String]>,
    statements: Arc<Statements>,
    timeout: Duration,
    _entity: PhantomData<fn() -> T>,
}

struct Statements {
    select: String,
    upsert: String,
    delete: String,
}

impl<T: Record> OverrideFixer<T> {
    /// Introspects `target`'s columns with a zero-row query.
    pub fn new(base: Arc<dyn ConnPool>, target: Arc<dyn ConnPool>) -> DbResult<Self> {
        let empty = target.query(&format!("SELECT * FROM {} LIMIT 0", T::TABLE), &[])?;
        let columns: Arc<[String]> = empty.columns().to_vec().into();
        if !columns.iter().any(|c| c == "id") {
            return Err(DbError::Conversion(format!(
                "table {} has no id column",
                T::TABLE
            )));
        }
        let statements = Arc::new(Statements::build(T::TABLE, &columns));
        Ok(Self {
            base,
            target,
            columns,
            statements,
            timeout: Duration::from_secs(1),
            _entity: PhantomData,
        })
    }

    /// Time box for a single repair.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Columns copied on every repair.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Re-reads `evt.id` from base. Missing there: delete it from target.
    /// Present: insert it into target, overwriting every column on conflict.
    pub async fn fix(&self, evt: &InconsistentEvent) -> ReconcileResult<()> {
        let base = Arc::clone(&self.base);
        let target = Arc::clone(&self.target);
        let statements = Arc::clone(&self.statements);
        let id = evt.id;
        with_timeout(self.timeout, move || {
            statements.apply(&*base, &*target, id)
        })
        .await?;
        debug!(table = T::TABLE, id, kind = %evt.kind, direction = %evt.direction, "row repaired");
        Ok(())
    }
}

impl Statements {
    fn build(table: &str, columns: &[String]) -> Self {
        let quoted: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();
        let list = quoted.join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let assignments = columns
            .iter()
            .zip(&quoted)
            .filter(|(c, _)| c.as_str() != "id")
            .map(|(_, q)| format!("{q} = excluded.{q}"))
            .collect::<Vec<_>>();
        let on_conflict = if assignments.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", assignments.join(", "))
        };
        Self {
            select: format!("SELECT {list} FROM {table} WHERE id = ?1"),
            upsert: format!(
                "INSERT INTO {table} ({list}) VALUES ({placeholders}) ON CONFLICT(id) {on_conflict}"
            ),
            delete: format!("DELETE FROM {table} WHERE id = ?1"),
        }
    }

    fn apply(&self, base: &dyn ConnPool, target: &dyn ConnPool, id: i64) -> DbResult<()> {
        match base.query_row(&self.select, &[Value::Integer(id)]) {
            Ok(row) => {
                target.exec(&self.upsert, row.values())?;
            }
            Err(e) if e.is_not_found() => {
                target.exec(&self.delete, &[Value::Integer(id)])?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}
