use std::process::Command;
use tracing::debug;

use super::{ConnectionInfo, DatabaseDriver, TableInfo, non_empty_dump};
use crate::error::Result;
use crate::utils::process;

const LIST_TABLES_SQL: &str = "SELECT table_name, data_length + index_length \
     FROM information_schema.tables \
     WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

/// MySQL / MariaDB through the `mysql` and `mysqldump` clients.
pub struct MySqlDriver {
    conn: ConnectionInfo,
}

impl MySqlDriver {
    pub fn new(conn: ConnectionInfo) -> Self {
        Self { conn }
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        if let Some(host) = &self.conn.host {
            cmd.arg(format!("--host={}", host));
        }
        if let Some(port) = self.conn.port {
            cmd.arg(format!("--port={}", port));
        }
        if let Some(user) = &self.conn.user {
            cmd.arg(format!("--user={}", user));
        }
        // keeps the password off the process list
        if let Some(password) = &self.conn.password {
            cmd.env("MYSQL_PWD", password);
        }
        cmd
    }
}

fn parse_table_listing(raw: &str) -> Vec<TableInfo> {
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let mut cols = line.split('\t');
            let name = cols.next().unwrap_or_default().to_string();
            let size = cols.next().and_then(|s| s.trim().parse::<u64>().ok());
            TableInfo::new(name, size)
        })
        .collect()
}

impl DatabaseDriver for MySqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let out = process::run_text(
            self.command("mysql")
                .args(["--batch", "--skip-column-names", "-e", LIST_TABLES_SQL])
                .arg(&self.conn.database),
        )?;
        Ok(parse_table_listing(&out))
    }

    fn dump_table(&self, table: &str) -> Result<Vec<u8>> {
        debug!(table, "mysqldump");
        let dump = process::run(
            self.command("mysqldump")
                .args([
                    "--skip-comments",
                    "--skip-dump-date",
                    "--single-transaction",
                    "--add-drop-table",
                ])
                .arg(&self.conn.database)
                .arg(table),
        )?;
        non_empty_dump("mysqldump", table, dump)
    }

    fn load_table(&self, table: &str, dump: &[u8]) -> Result<()> {
        debug!(table, bytes = dump.len(), "mysql load");
        process::run_with_input(self.command("mysql").arg(&self.conn.database), dump)?;
        Ok(())
    }
}
