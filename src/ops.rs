use anyhow::{Result, anyhow};
use colored::*;
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets::UTF8_FULL};
use indicatif::{ProgressBar, ProgressStyle};
use rpassword::read_password;
use serde::Serialize;

use crate::cli::{Cli, ModeArg};
use revisr::config::revisr::{CONFIG_SECTION, KEY_DEV_URL, KEY_LIVE_URL};
use revisr::drivers::selector::select_driver_for_target;
use revisr::{
    BackupEngine, BackupRequest, DatabaseDriver, GitAdapter, ImportEngine, RestoreOutcome,
    RevertOrchestrator, RevisrConfig, SnapshotStatus, SnapshotStore, TableTracker,
    TrackingConfig, TrackingMode, VersionControl,
};

/// Everything a command needs: the repository, the database and the
/// backup directory inside the repository.
struct Workspace {
    git: GitAdapter,
    db: Box<dyn DatabaseDriver>,
    store: SnapshotStore,
}

fn open_repo(cli: &Cli) -> Result<GitAdapter> {
    let root = match &cli.repo {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };
    let git = GitAdapter::with_binary(&cli.git, root);
    git.ensure_repository()?;
    Ok(git)
}

fn open_workspace(cli: &Cli) -> Result<Workspace> {
    let git = open_repo(cli)?;
    let target = cli
        .database
        .as_deref()
        .ok_or_else(|| anyhow!("no database given; pass --database or set REVISR_DATABASE_URL"))?;
    let password = if cli.ask_password {
        Some(prompt_password("Database password: ")?)
    } else {
        None
    };
    let db = select_driver_for_target(target, password)?;
    let store = SnapshotStore::new(git.work_tree());
    Ok(Workspace { git, db, store })
}

pub fn do_init(cli: &Cli) -> Result<()> {
    let git = open_repo(cli)?;
    let store = SnapshotStore::new(git.work_tree());
    let existed = store.dir().is_dir();
    store.ensure_directory()?;

    if existed {
        println!(
            "{} {}",
            "i".yellow().bold(),
            format!("Using existing backup directory at {}", store.dir().display()).yellow()
        );
    } else {
        println!(
            "{} {}",
            "✔".green().bold(),
            format!("Initialized backup directory at {}", store.dir().display()).green()
        );
    }
    let tracking = TrackingConfig::load(&git)?;
    println!("{} {}", "Tracking:".bold(), tracking.mode.as_str().cyan());
    Ok(())
}

pub fn do_backup(
    cli: &Cli,
    tables: Vec<String>,
    message: Option<String>,
    no_commit: bool,
) -> Result<()> {
    let ws = open_workspace(cli)?;
    let config = RevisrConfig::load(&ws.git)?;
    let request = BackupRequest {
        tables: if tables.is_empty() { None } else { Some(tables) },
        message,
        commit: !no_commit,
    };

    let bar = create_progress_bar("Backing up database");
    let result = BackupEngine::new(&ws.git, ws.db.as_ref(), &ws.store).backup(&request, &config);
    bar.finish_and_clear();
    let report = result?;

    if cli.json {
        return print_json(&report);
    }
    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Backed up {} table(s)", report.tables.len()).green()
    );
    match &report.commit {
        Some(commit) => println!("{} {}", "Commit:".bold(), commit.short().cyan()),
        None => println!(
            "{} {}",
            "i".yellow().bold(),
            "Dumps written without committing".yellow()
        ),
    }
    Ok(())
}

pub fn do_import(cli: &Cli, tables: Vec<String>) -> Result<()> {
    let ws = open_workspace(cli)?;
    let config = RevisrConfig::load(&ws.git)?;
    let tables = if tables.is_empty() { None } else { Some(tables) };

    let bar = create_progress_bar("Importing snapshots");
    let result = ImportEngine::new(ws.db.as_ref(), &ws.store).import(tables, &config);
    bar.finish_and_clear();
    let report = result?;

    if cli.json {
        return print_json(&report);
    }
    for table in &report.skipped {
        eprintln!(
            "{} {}: {}",
            "!".yellow().bold(),
            "Warning".yellow(),
            format!("skipped '{}': {}", table, ws.store.status(table).describe())
        );
    }
    println!(
        "{} {}",
        "✔".green().bold(),
        format!("Imported {} table(s)", report.tables.len()).green()
    );
    Ok(())
}

pub fn do_restore(cli: &Cli, commit: &str) -> Result<()> {
    let ws = open_workspace(cli)?;
    let config = RevisrConfig::load(&ws.git)?;

    let bar = create_progress_bar(&format!("Restoring database to {}", commit));
    let outcome =
        RevertOrchestrator::new(&ws.git, ws.db.as_ref(), &ws.store).restore(commit, &config);
    bar.finish_and_clear();

    if cli.json {
        print_json(&outcome)?;
        return if outcome.is_success() {
            Ok(())
        } else {
            Err(anyhow!("restore did not complete"))
        };
    }

    match outcome {
        RestoreOutcome::Success { target, tables, undo } => {
            println!(
                "{} {}",
                "✔".green().bold(),
                format!(
                    "Restored {} table(s) to commit {}",
                    tables.len(),
                    target.short()
                )
                .green()
            );
            println!("{} {}", "Undo:".bold(), undo.command().cyan());
            Ok(())
        }
        RestoreOutcome::Aborted {
            reason,
            failed_tables,
            undo,
        } => {
            for failure in &failed_tables {
                eprintln!("  {} {}", "✘".red(), failure);
            }
            if let Some(undo) = undo {
                eprintln!("{} {}", "Undo:".bold(), undo.command().cyan());
            }
            Err(anyhow!("restore aborted: {}", reason))
        }
        RestoreOutcome::Fatal { reason } => Err(anyhow!("restore failed: {}", reason)),
    }
}

pub fn do_track(cli: &Cli, mode: ModeArg, tables: Vec<String>) -> Result<()> {
    let git = open_repo(cli)?;
    let mode = TrackingMode::from(mode);
    let ignored_tables = mode != TrackingMode::Custom && !tables.is_empty();
    let config = match mode {
        TrackingMode::Custom if tables.is_empty() => {
            return Err(anyhow!("custom tracking needs at least one table"));
        }
        TrackingMode::Custom => TrackingConfig::custom(tables),
        TrackingMode::AllTables => TrackingConfig::all_tables(),
        TrackingMode::None => TrackingConfig::none(),
    };
    if ignored_tables {
        eprintln!(
            "{} {}",
            "!".yellow().bold(),
            "Table names are ignored unless the mode is custom".yellow()
        );
    }
    config.save(&git)?;

    let detail = match mode {
        TrackingMode::Custom => format!(" ({})", config.custom_tables.join(", ")),
        _ => String::new(),
    };
    println!(
        "{} {}{}",
        "✔".green().bold(),
        format!("Tracking mode set to {}", mode).green(),
        detail
    );
    Ok(())
}

pub fn do_config(cli: &Cli, dev_url: Option<String>, live_url: Option<String>) -> Result<()> {
    let git = open_repo(cli)?;
    if let Some(url) = &dev_url {
        git.set_config(CONFIG_SECTION, KEY_DEV_URL, url)?;
    }
    if let Some(url) = &live_url {
        git.set_config(CONFIG_SECTION, KEY_LIVE_URL, url)?;
    }

    let config = RevisrConfig::load(&git)?;
    if cli.json {
        return print_json(&config);
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec![
            Cell::new("Setting").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);
    table.add_row(vec![
        "tracking".to_string(),
        config.tracking.mode.as_str().to_string(),
    ]);
    table.add_row(vec![
        "tracked tables".to_string(),
        config.tracking.custom_tables.join(", "),
    ]);
    let (from, to) = config
        .substitution
        .as_ref()
        .map(|s| (s.from.clone(), s.to.clone()))
        .unwrap_or_default();
    table.add_row(vec!["dev url".to_string(), from]);
    table.add_row(vec!["live url".to_string(), to]);
    println!("{}", table);
    Ok(())
}

pub fn do_tables(cli: &Cli) -> Result<()> {
    let ws = open_workspace(cli)?;
    let config = RevisrConfig::load(&ws.git)?;
    let statuses = TableTracker::new(ws.db.as_ref()).table_statuses(&config.tracking, &ws.store)?;

    if cli.json {
        return print_json(&statuses);
    }
    if statuses.is_empty() {
        println!("{} {}", "i".yellow().bold(), "No tables found".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Table").add_attribute(Attribute::Bold),
            Cell::new("Size").add_attribute(Attribute::Bold),
            Cell::new("Tracked").add_attribute(Attribute::Bold),
            Cell::new("Snapshot").add_attribute(Attribute::Bold),
        ]);
    for s in &statuses {
        table.add_row(vec![
            Cell::new(&s.name),
            Cell::new(s.size_bytes.map(format_size).unwrap_or_else(|| "-".into())),
            Cell::new(if s.tracked { "yes" } else { "no" }),
            Cell::new(snapshot_label(&s.snapshot)),
        ]);
    }
    println!("{}", table);
    Ok(())
}

#[derive(Serialize)]
struct VerifyRow {
    table: String,
    status: SnapshotStatus,
}

pub fn do_verify(cli: &Cli, tables: Vec<String>) -> Result<()> {
    let (store, tables): (SnapshotStore, Vec<String>) = if tables.is_empty() {
        let ws = open_workspace(cli)?;
        let config = RevisrConfig::load(&ws.git)?;
        let tracked = TableTracker::new(ws.db.as_ref()).tracked_tables(&config.tracking)?;
        (ws.store, tracked.into_iter().collect())
    } else {
        let git = open_repo(cli)?;
        (SnapshotStore::new(git.work_tree()), tables)
    };

    let rows: Vec<VerifyRow> = tables
        .into_iter()
        .map(|t| VerifyRow {
            status: store.status(&t),
            table: t,
        })
        .collect();
    let bad = rows.iter().filter(|r| !r.status.is_valid()).count();

    if cli.json {
        print_json(&rows)?;
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec![
            Cell::new("Table").add_attribute(Attribute::Bold),
            Cell::new("Snapshot").add_attribute(Attribute::Bold),
        ]);
        for r in &rows {
            table.add_row(vec![Cell::new(&r.table), Cell::new(snapshot_label(&r.status))]);
        }
        println!("{}", table);
    }

    if bad > 0 {
        return Err(anyhow!("{} snapshot(s) missing or too small", bad));
    }
    if !cli.json {
        println!("{} {}", "✔".green().bold(), "All snapshots look valid".green());
    }
    Ok(())
}

pub fn do_orphans(cli: &Cli) -> Result<()> {
    let ws = open_workspace(cli)?;
    let live = TableTracker::new(ws.db.as_ref()).live_table_names()?;
    let orphans = ws.store.list_orphan_tables(&live)?;

    if cli.json {
        return print_json(&orphans);
    }
    if orphans.is_empty() {
        println!("{} {}", "i".yellow().bold(), "No orphaned snapshots".yellow());
        return Ok(());
    }
    println!(
        "{}",
        "Snapshots without a live table (run `revisr import` to create them):".bold()
    );
    for name in &orphans {
        println!("  {} {}", "•".cyan(), name);
    }
    Ok(())
}

pub fn do_history(cli: &Cli, limit: usize) -> Result<()> {
    let git = open_repo(cli)?;
    let store = SnapshotStore::new(git.work_tree());
    let commits = git.history(store.dir(), limit)?;

    if cli.json {
        return print_json(&commits);
    }
    if commits.is_empty() {
        println!("{} {}", "i".yellow().bold(), "No database backups committed yet".yellow());
        return Ok(());
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Commit").add_attribute(Attribute::Bold),
            Cell::new("Timestamp").add_attribute(Attribute::Bold),
            Cell::new("Message").add_attribute(Attribute::Bold),
        ]);
    for c in &commits {
        let ts = c
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        table.add_row(vec![Cell::new(c.hash.short()), Cell::new(ts), Cell::new(&c.message)]);
    }
    println!("{}", table);
    Ok(())
}

pub fn do_show(cli: &Cli, rev: &str) -> Result<()> {
    let git = open_repo(cli)?;
    let id = git.resolve(rev)?;
    let commit = git.read_commit(&id)?;

    if cli.json {
        return print_json(&commit);
    }
    println!("{} {}", "Commit:".bold(), commit.hash.as_str().cyan());
    if let Some(branch) = &commit.branch {
        println!("{} {}", "Branch:".bold(), branch);
    }
    println!(
        "{} {}",
        "Date:".bold(),
        commit
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    println!("{} {}", "Message:".bold(), commit.message);
    let backup_prefix = format!("{}/", revisr::storage::BACKUP_DIR_NAME);
    let tables: Vec<String> = commit
        .files
        .iter()
        .filter_map(|f| f.strip_prefix(&backup_prefix))
        .filter_map(revisr::storage::table_from_file_name)
        .collect();
    if !tables.is_empty() {
        println!("{} {}", "Tables:".bold(), tables.join(", "));
    }
    let others = commit.files.len() - tables.len();
    if others > 0 {
        println!("{} {}", "Other files:".bold(), others);
    }
    Ok(())
}

pub fn do_version() {
    println!("{} {}", "revisr".bold(), env!("CARGO_PKG_VERSION").cyan());
}

fn snapshot_label(status: &SnapshotStatus) -> String {
    match status {
        SnapshotStatus::Missing => "missing".to_string(),
        SnapshotStatus::TooSmall(size) => format!("too small ({} B)", size),
        SnapshotStatus::Valid(size) => format_size(*size),
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn create_progress_bar(prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
    );
    bar.set_message(prefix.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(80));
    bar
}

fn prompt_password(message: &str) -> Result<String> {
    eprint!("{} {}", "?".cyan().bold(), message.cyan());
    std::io::Write::flush(&mut std::io::stderr())?;
    let password = read_password()?; // input hidden
    Ok(password)
}
