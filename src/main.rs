// Main entry point for the colstore CLI
// This provides an interactive shell for building a table and poking at its storages

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser as ClapParser;
use colstore::{AggregateKind, RuntimeType, StorageConfig, Table, Value};
use std::io::{self, Write};
use std::path::PathBuf;

/// colstore - typed column storage playground
#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file with table settings (culture, case sensitivity, date-time mode)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Execute commands separated by ';' and exit
    #[arg(short, long)]
    execute: Option<String>,
}

fn main() -> Result<()> {
    // Respect RUST_LOG, e.g. RUST_LOG=colstore=debug
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => StorageConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => StorageConfig::default(),
    };
    let mut table = Table::new(&config)?;

    // If commands were provided, run them and exit
    if let Some(commands) = args.execute {
        for command in commands.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            execute_command(&mut table, command)?;
        }
        return Ok(());
    }

    // Interactive REPL (Read-Eval-Print Loop)
    println!("╔════════════════════════════════════════════╗");
    println!("║         colstore Interactive Shell         ║");
    println!("║     Typed Column Storage in Rust           ║");
    println!("╚════════════════════════════════════════════╝");
    println!();
    println!("Type commands or '.help' for help");
    println!("Type '.exit' to quit");
    println!();

    repl(|command| execute_command(&mut table, command))
}

/// REPL implementation; special commands start with '.'
fn repl<F>(mut execute_fn: F) -> Result<()>
where
    F: FnMut(&str) -> Result<()>,
{
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("colstore> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.starts_with('.') {
            match input {
                ".exit" | ".quit" => {
                    println!("Goodbye!");
                    break;
                }
                ".help" => {
                    print_help();
                    continue;
                }
                _ => {
                    println!("Unknown command: {}", input);
                    println!("Type '.help' for help");
                    continue;
                }
            }
        }

        if let Err(e) = execute_fn(input) {
            eprintln!("Error: {:#}", e);
        }
    }

    Ok(())
}

/// Literals reach the storage as text (or the null marker); the column's
/// storage converts them to its own type.
fn parse_literal(text: &str) -> Value {
    if text.eq_ignore_ascii_case("null") {
        return Value::DbNull;
    }
    let unquoted = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(text);
    Value::from(unquoted)
}

fn parse_row(text: Option<&str>) -> Result<usize> {
    let text = text.ok_or_else(|| anyhow!("missing row number"))?;
    text.parse()
        .with_context(|| format!("'{}' is not a row number", text))
}

/// Execute one shell command against the table
fn execute_command(table: &mut Table, command: &str) -> Result<()> {
    let mut parts = command.splitn(4, char::is_whitespace).filter(|p| !p.is_empty());
    let verb = parts.next().unwrap_or_default().to_ascii_lowercase();

    match verb.as_str() {
        "column" => {
            let (Some(name), Some(type_name)) = (parts.next(), parts.next()) else {
                bail!("usage: column <name> <type>");
            };
            let data_type = RuntimeType::from_qualified_name(type_name)
                .ok_or_else(|| anyhow!("unknown type: {}", type_name))?;
            table.add_column(name, data_type)?;
            println!("Column '{}' added", name);
        }
        "row" => {
            let row = table.new_row();
            println!("Row {} added", row);
        }
        "set" => {
            let column = parts.next().ok_or_else(|| anyhow!("usage: set <column> <row> <value>"))?;
            let row = parse_row(parts.next())?;
            let literal = parts.next().ok_or_else(|| anyhow!("missing value"))?;
            table.set(column, row, parse_literal(literal))?;
            println!("{}", table.get(column, row)?);
        }
        "get" => {
            let column = parts.next().ok_or_else(|| anyhow!("usage: get <column> <row>"))?;
            let row = parse_row(parts.next())?;
            println!("{}", table.get(column, row)?);
        }
        "agg" => {
            let column = parts.next().ok_or_else(|| anyhow!("usage: agg <column> <kind>"))?;
            let kind: AggregateKind = parts
                .next()
                .ok_or_else(|| anyhow!("missing aggregate kind"))?
                .parse()
                .map_err(|e: String| anyhow!(e))?;
            let rows: Vec<usize> = (0..table.row_count()).collect();
            match table.aggregate(column, &rows, kind)? {
                Some(value) => println!("{}({}) = {}", kind, column, value),
                None => println!("{} is not supported for column '{}'", kind, column),
            }
        }
        "xml" => {
            let column = parts.next().ok_or_else(|| anyhow!("usage: xml <column> <row>"))?;
            let row = parse_row(parts.next())?;
            match table.to_xml(column, row)? {
                Some(text) => println!("{}", text),
                None => println!("(null)"),
            }
        }
        "show" => println!("{}", table.format()),
        other => bail!("unknown command: {} (type '.help' for help)", other),
    }
    Ok(())
}

/// Print help information
fn print_help() {
    println!("╔════════════════════════════════════════════╗");
    println!("║              colstore Help                 ║");
    println!("╚════════════════════════════════════════════╝");
    println!();
    println!("Special Commands:");
    println!("  .help              Show this help message");
    println!("  .exit, .quit       Exit the shell");
    println!();
    println!("Table Commands:");
    println!("  column <name> <type>        Add a column (Int32, SqlMoney, Byte[], Nullable<Int32>, ...)");
    println!("  row                         Append a row (null in every column)");
    println!("  set <column> <row> <value>  Store a value; 'null' clears the cell");
    println!("  get <column> <row>          Read a value");
    println!("  agg <column> <kind>         Aggregate over all rows:");
    println!("                              sum, mean, min, max, first, count, var, stdev");
    println!("  xml <column> <row>          Show a value's XML text");
    println!("  show                        Print the whole table");
    println!();
    println!("Notes:");
    println!("  - Values are given as text and converted by the column's type");
    println!("  - Quote values containing spaces: 'hello world'");
    println!("  - Set RUST_LOG=colstore=debug to trace storage activity");
    println!();
}
