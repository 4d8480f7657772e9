// sqlx::Error -> AppError

use queuetrackr_core::error::AppError;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            match db_err.code().as_deref() {
                // SQLite extended codes: https://www.sqlite.org/rescode.html
                Some("2067") | Some("1555") => {
                    // UNIQUE / PRIMARY KEY constraint failed
                    AppError::Conflict(format!("Unique constraint violation: {}", message))
                }
                Some("5") | Some("517") => {
                    AppError::Database(format!("Database locked (SQLITE_BUSY): {}", message))
                }
                Some("13") => AppError::Database(format!("Database full: {}", message)),
                Some(code) => AppError::Database(format!("Database error [{}]: {}", code, message)),
                None => AppError::Database(format!("Database error: {}", message)),
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        // Connection, pool, protocol errors
        _ => AppError::Database(err.to_string()),
    }
}
