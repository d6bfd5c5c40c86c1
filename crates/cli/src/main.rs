///! # CLI - DriftKV Interactive Shell
///!
///! A REPL-style command-line interface for the DriftKV storage engine.
///! Reads commands from stdin, executes them against an open database, and
///! prints results to stdout. Designed for both interactive use and scripted
///! testing (pipe commands via stdin).
///!
///! ## Commands
///!
///! ```text
///! SET key value      Insert or update a key-value pair
///! GET key            Look up a key (prints value or "(nil)")
///! DEL key            Delete a key (writes a tombstone)
///! MERGE              Run a merge pass over sealed segments
///! STATS              Print database debug info
///! EXIT / QUIT        Shut down gracefully
///! ```
///!
///! ## Configuration
///!
///! All settings are controlled via environment variables:
///!
///! ```text
///! DRIFT_DIR          Database directory              (default: "data")
///! DRIFT_MAX_FILE_MB  Active file size bound in MiB   (default: 512)
///! ```
///!
///! ## Example
///!
///! ```text
///! $ cargo run -p cli
///! DriftKV started (dir=data, max_file=512MiB, keys=0)
///! > SET name Alice
///! OK
///! > GET name
///! Alice
///! > DEL name
///! OK
///! > GET name
///! (nil)
///! > EXIT
///! bye
///! ```

use anyhow::Result;
use engine::{Database, Options};
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    env_logger::init();

    let dir = env_or("DRIFT_DIR", "data");
    let max_file_mb: i64 = env_or("DRIFT_MAX_FILE_MB", "512").parse().unwrap_or(512);

    let db = Database::open(
        &dir,
        Options {
            max_datafile_size: max_file_mb * 1024 * 1024,
        },
    )?;

    println!(
        "DriftKV started (dir={}, max_file={}MiB, keys={})",
        dir,
        max_file_mb,
        db.key_count()?
    );
    println!("Commands: SET key value | GET key | DEL key | MERGE | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            match db.put(k.as_bytes(), v.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match db.get(k.as_bytes()) {
                            Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match db.delete(k.as_bytes()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "MERGE" => match db.merge().and_then(|()| db.sealed_count()) {
                    Ok(sealed) => println!("OK (sealed={})", sealed),
                    Err(e) => println!("ERR merge failed: {}", e),
                },
                "STATS" => {
                    println!("{:?}", db);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    db.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use engine::{Database, Options};

    #[test]
    fn database_survives_shell_style_session() {
        let dir = tempfile::tempdir().unwrap();

        {
            let db = Database::open(dir.path(), Options::default()).unwrap();
            db.put(b"name", b"Alice").unwrap();
            db.delete(b"name").unwrap();
            db.put(b"name", b"Bob").unwrap();
            db.close().unwrap();
        }

        let db = Database::open(dir.path(), Options::default()).unwrap();
        assert_eq!(db.get(b"name").unwrap().unwrap(), b"Bob");
    }

    #[test]
    fn values_with_spaces_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), Options::default()).unwrap();

        // The shell joins everything after the key back together.
        let value = ["several", "words", "joined"].join(" ");
        db.put(b"k", value.as_bytes()).unwrap();
        assert_eq!(db.get(b"k").unwrap().unwrap(), value.into_bytes());
    }
}
