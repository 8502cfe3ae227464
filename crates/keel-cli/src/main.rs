//! Interactive command driver for the Keel index.
//!
//! Reads line-oriented commands from stdin and maps them onto the
//! engine: `insert`, `delete`, `get`, `range`, `quit`. Values are
//! NUL-padded to 100 bytes on the way in and NUL-trimmed on the way
//! out.

use anyhow::{Context, Result};
use clap::Parser;
use keel_common::page::{Value, VALUE_SIZE};
use keel_index::BPlusTree;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Interactive driver for a Keel index file.
#[derive(Parser)]
#[command(name = "keel")]
struct Cli {
    /// Path to the index file (created if absent).
    index_file: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Insert { key: i32, text: String },
    Delete { key: i32 },
    Get { key: i32 },
    Range { low: i32, high: i32 },
    Quit,
}

/// Parses one input line. Returns Ok(None) for a blank line and
/// Err with the message to print for malformed or unknown input.
fn parse_line(line: &str) -> std::result::Result<Option<Command>, String> {
    let trimmed = line.trim_start().trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Ok(None);
    }

    let (cmd, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim_start()),
        None => (trimmed, ""),
    };

    match cmd {
        "quit" | "exit" => Ok(Some(Command::Quit)),
        "insert" => {
            // The value is everything after the key, verbatim
            let Some((key_str, text)) = rest.split_once(' ') else {
                return Err("Usage: insert <key> <string>".to_string());
            };
            let key = key_str
                .parse()
                .map_err(|_| "Usage: insert <key> <string>".to_string())?;
            Ok(Some(Command::Insert {
                key,
                text: text.to_string(),
            }))
        }
        "delete" => {
            let key = rest
                .parse()
                .map_err(|_| "Usage: delete <key>".to_string())?;
            Ok(Some(Command::Delete { key }))
        }
        "get" => {
            let key = rest.parse().map_err(|_| "Usage: get <key>".to_string())?;
            Ok(Some(Command::Get { key }))
        }
        "range" => {
            let usage = || "Usage: range <low> <high>".to_string();
            let (low_str, high_str) = rest.split_once(' ').ok_or_else(usage)?;
            let low = low_str.parse().map_err(|_| usage())?;
            let high = high_str.trim().parse().map_err(|_| usage())?;
            Ok(Some(Command::Range { low, high }))
        }
        _ => Err("Unknown command".to_string()),
    }
}

/// Pads or truncates a string to a 100-byte value.
fn fill_value(text: &str) -> Value {
    let mut value = [0u8; VALUE_SIZE];
    let len = text.len().min(VALUE_SIZE);
    value[..len].copy_from_slice(&text.as_bytes()[..len]);
    value
}

/// Renders a value as text, stopping at the first NUL byte.
fn trim_value(value: &Value) -> String {
    let end = value.iter().position(|&b| b == 0).unwrap_or(VALUE_SIZE);
    String::from_utf8_lossy(&value[..end]).into_owned()
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut tree = BPlusTree::open(&cli.index_file)
        .with_context(|| format!("opening index file {}", cli.index_file.display()))?;

    println!("B+ tree driver. Index file: {}", cli.index_file.display());
    println!("Commands:");
    println!("  insert <key> <string>");
    println!("  delete <key>");
    println!("  get <key>");
    println!("  range <low> <high>");
    println!("  quit");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        stdout.flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Insert { key, text } => {
                let ok = match tree.insert(key, &fill_value(&text)) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(key, %err, "insert failed");
                        false
                    }
                };
                println!("{}", if ok { "OK" } else { "FAIL" });
            }
            Command::Delete { key } => {
                let ok = match tree.delete(key) {
                    Ok(removed) => removed,
                    Err(err) => {
                        warn!(key, %err, "delete failed");
                        false
                    }
                };
                println!("{}", if ok { "OK" } else { "FAIL" });
            }
            Command::Get { key } => {
                let found = match tree.get(key) {
                    Ok(found) => found,
                    Err(err) => {
                        warn!(key, %err, "lookup failed");
                        None
                    }
                };
                match found {
                    Some(value) => println!("VALUE: {}", trim_value(&value)),
                    None => println!("NOT_FOUND"),
                }
            }
            Command::Range { low, high } => {
                let values = match tree.range(low, high) {
                    Ok(values) => values,
                    Err(err) => {
                        warn!(low, high, %err, "range scan failed");
                        Vec::new()
                    }
                };
                println!("FOUND {} records", values.len());
                for value in &values {
                    println!("  {}", trim_value(value));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blank_line() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   "), Ok(None));
        assert_eq!(parse_line("\n"), Ok(None));
    }

    #[test]
    fn test_parse_quit() {
        assert_eq!(parse_line("quit"), Ok(Some(Command::Quit)));
        assert_eq!(parse_line("exit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn test_parse_insert() {
        assert_eq!(
            parse_line("insert 5 hello world"),
            Ok(Some(Command::Insert {
                key: 5,
                text: "hello world".to_string()
            }))
        );
        assert_eq!(
            parse_line("insert -3 x"),
            Ok(Some(Command::Insert {
                key: -3,
                text: "x".to_string()
            }))
        );
    }

    #[test]
    fn test_parse_insert_missing_value() {
        assert!(parse_line("insert 5").is_err());
        assert!(parse_line("insert").is_err());
        assert!(parse_line("insert notakey x").is_err());
    }

    #[test]
    fn test_parse_delete_get() {
        assert_eq!(parse_line("delete 7"), Ok(Some(Command::Delete { key: 7 })));
        assert_eq!(parse_line("get 7"), Ok(Some(Command::Get { key: 7 })));
        assert!(parse_line("get").is_err());
        assert!(parse_line("delete seven").is_err());
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(
            parse_line("range 1 100"),
            Ok(Some(Command::Range { low: 1, high: 100 }))
        );
        assert!(parse_line("range 1").is_err());
        assert!(parse_line("range a b").is_err());
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(parse_line("frobnicate 1"), Err("Unknown command".to_string()));
    }

    #[test]
    fn test_fill_value_pads_and_truncates() {
        let padded = fill_value("hi");
        assert_eq!(&padded[..2], b"hi");
        assert!(padded[2..].iter().all(|&b| b == 0));

        let long = "x".repeat(200);
        let truncated = fill_value(&long);
        assert_eq!(truncated.len(), VALUE_SIZE);
        assert!(truncated.iter().all(|&b| b == b'x'));
    }

    #[test]
    fn test_trim_value_stops_at_nul() {
        assert_eq!(trim_value(&fill_value("hello")), "hello");
        assert_eq!(trim_value(&fill_value("")), "");

        let full = fill_value(&"y".repeat(VALUE_SIZE));
        assert_eq!(trim_value(&full).len(), VALUE_SIZE);
    }
}
