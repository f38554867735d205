//! mutuals-admin CLI tool
//!
//! Talks to a running mutuals-node over its admin socket.
//!
//! Usage:
//!   mutuals-admin recompute
//!   mutuals-admin report
//!   mutuals-admin member <id>
//!   mutuals-admin ping

use serde::Serialize;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    Recompute,
    Report,
    Member { id: String },
    Ping,
}

fn print_usage() {
    eprintln!("mutuals-admin - Operate a running Mutuals node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  mutuals-admin recompute     Run a full recompute and print its stats");
    eprintln!("  mutuals-admin report        Take an analytics snapshot now");
    eprintln!("  mutuals-admin member <id>   Show one member record");
    eprintln!("  mutuals-admin ping          Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MUTUALS_SOCKET  Path to admin socket (default: ./mutuals-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("MUTUALS_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./mutuals-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<serde_json::Value, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to mutuals-node at {:?}: {}\n\
             Is the mutuals-node running?",
            socket_path, e
        )
    })?;

    // Send command
    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "recompute" => AdminCommand::Recompute,
        "report" => AdminCommand::Report,
        "member" => {
            if args.len() < 3 {
                eprintln!("Error: member requires an id argument");
                std::process::exit(1);
            }
            AdminCommand::Member {
                id: args[2].clone(),
            }
        }
        "ping" => AdminCommand::Ping,
        "help" | "--help" | "-h" => {
            print_usage();
            return;
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response.get("status").and_then(|s| s.as_str()) {
            Some("error") => {
                let error = response
                    .get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("unknown error");
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            Some("pong") => println!("Daemon is running"),
            _ => match serde_json::to_string_pretty(&response) {
                Ok(pretty) => println!("{}", pretty),
                Err(_) => println!("{}", response),
            },
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
