use std::process::Command;
use tracing::debug;

use super::{ConnectionInfo, DatabaseDriver, TableInfo, non_empty_dump};
use crate::error::Result;
use crate::utils::process;

const LIST_TABLES_SQL: &str = "SELECT tablename, \
     pg_total_relation_size(format('%I.%I', schemaname, tablename)) \
     FROM pg_tables WHERE schemaname = 'public' ORDER BY tablename";

/// PostgreSQL through `psql` and `pg_dump`. Only the `public` schema is
/// versioned.
pub struct PostgresDriver {
    conn: ConnectionInfo,
}

impl PostgresDriver {
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
            cmd.arg(format!("--username={}", user));
        }
        cmd.arg("--no-password");
        if let Some(password) = &self.conn.password {
            cmd.env("PGPASSWORD", password);
        }
        cmd.arg(format!("--dbname={}", self.conn.database));
        cmd
    }
}

/// `public."Name"` with embedded quotes doubled, as pg_dump's `-t` expects.
fn qualified(table: &str) -> String {
    format!("public.\"{}\"", table.replace('"', "\"\""))
}

fn parse_table_listing(raw: &str) -> Vec<TableInfo> {
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let (name, size) = match line.split_once('\t') {
                Some((n, s)) => (n, s.trim().parse::<u64>().ok()),
                None => (line, None),
            };
            TableInfo::new(name, size)
        })
        .collect()
}

impl DatabaseDriver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let out = process::run_text(
            self.command("psql")
                .args(["-X", "-A", "-t", "-F", "\t", "-c", LIST_TABLES_SQL]),
        )?;
        Ok(parse_table_listing(&out))
    }

    fn dump_table(&self, table: &str) -> Result<Vec<u8>> {
        debug!(table, "pg_dump");
        let dump = process::run(
            self.command("pg_dump")
                .args(["--clean", "--if-exists", "--no-owner", "--no-privileges"])
                .arg(format!("--table={}", qualified(table))),
        )?;
        non_empty_dump("pg_dump", table, dump)
    }

    fn load_table(&self, table: &str, dump: &[u8]) -> Result<()> {
        debug!(table, bytes = dump.len(), "psql load");
        process::run_with_input(
            self.command("psql")
                .args(["-X", "-q", "-v", "ON_ERROR_STOP=1", "--single-transaction", "-f", "-"]),
            dump,
        )?;
        Ok(())
    }
}
