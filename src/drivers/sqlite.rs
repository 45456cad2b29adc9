use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

use super::{DatabaseDriver, TableInfo, non_empty_dump};
use crate::error::{Result, RevisrError};
use crate::utils::process;

const LIST_TABLES_SQL: &str = "SELECT name FROM sqlite_master \
    WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name;";

/// SQLite database file through the `sqlite3` shell.
pub struct SqliteDriver {
    path: PathBuf,
}

impl SqliteDriver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("sqlite3");
        cmd.arg("-batch").arg("-bail").arg(&self.path);
        cmd
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let sql = format!(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = {};",
            quote_literal(table)
        );
        let out = process::run_text(self.command().arg("-noheader").arg(sql))?;
        Ok(out != "0")
    }
}

fn quote_ident(table: &str) -> String {
    format!("\"{}\"", table.replace('"', "\"\""))
}

fn quote_literal(table: &str) -> String {
    format!("'{}'", table.replace('\'', "''"))
}

/// Argument quoting for the shell's own dot-commands, which take C-style
/// escapes inside double quotes.
fn quote_dot_arg(table: &str) -> String {
    format!("\"{}\"", table.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Shell script printing one table as SQL: its `CREATE TABLE`, its rows as
/// `INSERT`s, then its indexes and triggers. Everything is selected by exact
/// name; `.dump` is avoided because it matches names as a LIKE pattern.
fn dump_script(table: &str) -> String {
    let name = quote_literal(table);
    format!(
        ".headers off\n\
         .mode list\n\
         SELECT sql || ';' FROM sqlite_master WHERE type = 'table' AND name = {name};\n\
         .mode insert {dest}\n\
         SELECT * FROM {ident};\n\
         .mode list\n\
         SELECT sql || ';' FROM sqlite_master \
         WHERE tbl_name = {name} AND type IN ('index', 'trigger') AND sql IS NOT NULL;\n",
        name = name,
        dest = quote_dot_arg(table),
        ident = quote_ident(table),
    )
}

impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let out = process::run_text(self.command().arg("-noheader").arg(LIST_TABLES_SQL))?;
        Ok(out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|name| TableInfo::new(name, None))
            .collect())
    }

    fn dump_table(&self, table: &str) -> Result<Vec<u8>> {
        debug!(table, "sqlite3 table dump");
        if !self.table_exists(table)? {
            return Err(RevisrError::Database(format!(
                "table {} does not exist in {}",
                quote_ident(table),
                self.path.display()
            )));
        }
        let mut dump = format!(
            "-- revisr sqlite dump of table {}\n",
            quote_ident(&table.replace(['\n', '\r'], " "))
        )
        .into_bytes();
        let script = dump_script(table);
        dump.extend(process::run_with_input(&mut self.command(), script.as_bytes())?);
        non_empty_dump("sqlite3", table, dump)
    }

    fn load_table(&self, table: &str, dump: &[u8]) -> Result<()> {
        debug!(table, bytes = dump.len(), "sqlite3 load");
        let mut script =
            format!("BEGIN TRANSACTION;\nDROP TABLE IF EXISTS {};\n", quote_ident(table))
                .into_bytes();
        script.extend_from_slice(dump);
        script.extend_from_slice(b"\nCOMMIT;\n");
        process::run_with_input(&mut self.command(), &script)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    macro_rules! require_sqlite {
        () => {
            let available = Command::new("sqlite3")
                .arg("-version")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false);
            if !available {
                eprintln!("sqlite3 not available; skipping");
                return;
            }
        };
    }

    fn exec(driver: &SqliteDriver, sql: &str) -> String {
        process::run_text(driver.command().arg("-noheader").arg(sql)).unwrap()
    }

    fn database() -> (TempDir, SqliteDriver) {
        let tmp = TempDir::new().unwrap();
        let driver = SqliteDriver::new(tmp.path().join("site.db"));
        (tmp, driver)
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_dot_arg("a\"b\\c"), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn dump_script_selects_by_exact_name() {
        let script = dump_script("wp_posts");
        assert!(script.contains("name = 'wp_posts'"));
        assert!(script.contains("SELECT * FROM \"wp_posts\";"));
        assert!(!script.contains(".dump"));
    }

    #[test]
    fn dump_and_load_keep_similarly_named_tables_apart() {
        require_sqlite!();
        let (_tmp, driver) = database();
        exec(
            &driver,
            "CREATE TABLE a_b(x); INSERT INTO a_b VALUES(1); CREATE INDEX a_b_x ON a_b(x);
             CREATE TABLE axb(y); INSERT INTO axb VALUES(2);",
        );

        let dump = driver.dump_table("a_b").unwrap();
        let text = String::from_utf8(dump.clone()).unwrap();
        assert!(text.contains("CREATE TABLE a_b(x);"));
        assert!(text.contains("INSERT INTO a_b VALUES(1);"));
        assert!(text.contains("CREATE INDEX a_b_x ON a_b(x);"));
        assert!(!text.contains("axb"));

        exec(&driver, "INSERT INTO a_b VALUES(3); INSERT INTO axb VALUES(4);");
        driver.load_table("a_b", &dump).unwrap();

        assert_eq!(exec(&driver, "SELECT group_concat(x) FROM a_b;"), "1");
        assert_eq!(exec(&driver, "SELECT group_concat(y) FROM axb;"), "2,4");
        let names: Vec<String> = driver
            .list_tables()
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["a_b", "axb"]);
    }

    #[test]
    fn round_trips_awkward_names_and_values() {
        require_sqlite!();
        let (_tmp, driver) = database();
        exec(
            &driver,
            "CREATE TABLE \"odd \"\"name\"\"\"(v TEXT);
             INSERT INTO \"odd \"\"name\"\"\" VALUES('it''s');",
        );

        let dump = driver.dump_table("odd \"name\"").unwrap();
        exec(&driver, "DELETE FROM \"odd \"\"name\"\"\";");
        driver.load_table("odd \"name\"", &dump).unwrap();

        assert_eq!(exec(&driver, "SELECT v FROM \"odd \"\"name\"\"\";"), "it's");
    }

    #[test]
    fn dumping_a_missing_table_is_a_database_error() {
        require_sqlite!();
        let (_tmp, driver) = database();
        exec(&driver, "CREATE TABLE present(x);");
        assert!(matches!(
            driver.dump_table("absent"),
            Err(RevisrError::Database(_))
        ));
    }

    #[test]
    fn failed_load_leaves_table_untouched() {
        require_sqlite!();
        let (_tmp, driver) = database();
        exec(&driver, "CREATE TABLE t(x); INSERT INTO t VALUES(1);");

        let broken = b"CREATE TABLE t(x);\nINSERT INTO t VALUES(2);\nNOT VALID SQL;\n";
        assert!(driver.load_table("t", broken).is_err());
        assert_eq!(exec(&driver, "SELECT group_concat(x) FROM t;"), "1");
    }
}
