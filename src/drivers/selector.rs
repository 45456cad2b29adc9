use super::{
    ConnectionInfo, DatabaseDriver, mysql::MySqlDriver, postgres::PostgresDriver, redact,
    sqlite::SqliteDriver,
};
use crate::error::{Result, RevisrError};

/// Pick the driver for a database target. `password` overrides any password
/// embedded in the target.
pub fn select_driver_for_target(
    target: &str,
    password: Option<String>,
) -> Result<Box<dyn DatabaseDriver>> {
    if let Some(path) = target.strip_prefix("sqlite://") {
        return Ok(Box::new(SqliteDriver::new(path)));
    }
    if [".sqlite", ".sqlite3", ".db"]
        .iter()
        .any(|ext| target.ends_with(ext))
        && !target.contains("://")
    {
        return Ok(Box::new(SqliteDriver::new(target)));
    }

    let with_password = |mut conn: ConnectionInfo| {
        if password.is_some() {
            conn.password = password.clone();
        }
        conn
    };

    if target.starts_with("mysql://") || target.starts_with("mariadb://") {
        let conn = with_password(ConnectionInfo::parse(target)?);
        Ok(Box::new(MySqlDriver::new(conn)))
    } else if target.starts_with("postgres://") || target.starts_with("postgresql://") {
        let conn = with_password(ConnectionInfo::parse(target)?);
        Ok(Box::new(PostgresDriver::new(conn)))
    } else {
        Err(RevisrError::UnsupportedDatabase(redact(target)))
    }
}
