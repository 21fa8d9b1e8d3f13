//! Storage backend traits.
//!
//! - [`Connection`] - an open handle to a storage backend that prepares statements
//! - [`Statement`] - a prepared statement bound and executed in a loop
//!
//! Calls are synchronous and block on storage I/O. A prepared statement is
//! released when it is dropped; [`Statement::close`] releases it early and
//! reports errors.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A prepared statement.
///
/// Parameter indexes are 1-based. Bindings persist across executions until
/// they are overwritten, so a loop rebinds every position before each
/// execution.
pub trait Statement {
    /// Bind a non-null value.
    fn bind(&mut self, index: usize, value: &Value) -> Result<()>;

    /// Bind SQL NULL with the codec's null marker.
    fn bind_null(&mut self, index: usize, null_type: Option<&str>) -> Result<()>;

    /// Execute a statement that produces no rows, returning rows affected.
    fn execute(&mut self) -> Result<u64>;

    /// Execute a statement and collect its rows.
    fn query(&mut self) -> Result<Vec<Row>>;

    /// Execute and return the first row, if any.
    fn query_one(&mut self) -> Result<Option<Row>> {
        Ok(self.query()?.into_iter().next())
    }

    /// Number of positional parameters the statement expects.
    fn parameter_count(&self) -> usize;

    /// Release the statement now instead of at drop.
    fn close(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// An open connection to a storage backend.
pub trait Connection: Send + Sync {
    /// Prepared statement type, borrowing the connection.
    type Statement<'conn>: Statement
    where
        Self: 'conn;

    /// Prepare a statement with `?` positional parameters.
    fn prepare(&self, sql: &str) -> Result<Self::Statement<'_>>;

    /// Execute SQL without parameters, possibly several statements.
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Close the connection. Closing twice is not an error.
    fn close(&self) -> Result<()>;
}
