//! moobird-admin CLI tool
//!
//! Manages streams, ignore lists and votes on a running moobird node.
//!
//! Usage:
//!   moobird-admin stream-start <group>
//!   moobird-admin stream-stop <group>
//!   moobird-admin stream-status <group>
//!   moobird-admin search-terms <group> <term>...
//!   moobird-admin ignore-list <group>
//!   moobird-admin ignore-add <group> <term>...
//!   moobird-admin ignore-del <group> <term>
//!   moobird-admin ignore-clear <group>
//!   moobird-admin votes-needed <group> <n>
//!   moobird-admin target-channel <group> <channel>
//!   moobird-admin allow <group> <channel|role|user> <id>
//!   moobird-admin propose <group> <channel> <message>
//!   moobird-admin candidates
//!   moobird-admin sweep
//!   moobird-admin ping

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::str::FromStr;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    StreamStart { group: u64 },
    StreamStop { group: u64 },
    StreamStatus { group: u64 },
    SetSearchTerms { group: u64, terms: Vec<String> },
    IgnoreList { group: u64 },
    IgnoreAdd { group: u64, terms: Vec<String> },
    IgnoreDel { group: u64, term: String },
    IgnoreClear { group: u64 },
    SetVotesNeeded { group: u64, votes: u32 },
    SetTargetChannel { group: u64, channel: u64 },
    Allow { group: u64, kind: String, id: u64 },
    Propose { group: u64, channel: u64, message: u64 },
    ListCandidates,
    Sweep,
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    List { items: Vec<String> },
    Pong,
}

fn print_usage() {
    eprintln!("moobird-admin - Manage a running moobird node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  moobird-admin stream-start <group>                Start the group's stream");
    eprintln!("  moobird-admin stream-stop <group>                 Stop the group's stream");
    eprintln!("  moobird-admin stream-status <group>               Show the stream state");
    eprintln!("  moobird-admin search-terms <group> <term>...      Replace search terms");
    eprintln!("  moobird-admin ignore-list <group>                 List ignore terms");
    eprintln!("  moobird-admin ignore-add <group> <term>...        Add ignore terms");
    eprintln!("  moobird-admin ignore-del <group> <term>           Remove an ignore term");
    eprintln!("  moobird-admin ignore-clear <group>                Clear the ignore list");
    eprintln!("  moobird-admin votes-needed <group> <n>            Set votes needed to pass");
    eprintln!("  moobird-admin target-channel <group> <channel>    Set the stream channel");
    eprintln!("  moobird-admin allow <group> <kind> <id>           Allow a channel, role or user");
    eprintln!("  moobird-admin propose <group> <channel> <message> Put a message to the vote");
    eprintln!("  moobird-admin candidates                          List open votes");
    eprintln!("  moobird-admin sweep                               Retire expired votes now");
    eprintln!("  moobird-admin ping                                Check if the node is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MOOBIRD_ADMIN_SOCKET  Path to admin socket (default: ./moobird-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("MOOBIRD_ADMIN_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./moobird-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to moobird-node at {:?}: {}\n\
             Is the moobird-node running?",
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

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

/// Positional argument `index` parsed as `T`.
fn arg<T: FromStr>(args: &[String], index: usize, name: &str) -> T {
    let Some(raw) = args.get(index) else {
        fail(&format!("{} requires a <{}> argument", args[1], name));
    };
    raw.parse()
        .unwrap_or_else(|_| fail(&format!("invalid <{}>: {}", name, raw)))
}

/// Every argument from `index` on.
fn rest(args: &[String], index: usize, name: &str) -> Vec<String> {
    if args.len() <= index {
        fail(&format!("{} requires at least one <{}> argument", args[1], name));
    }
    args[index..].to_vec()
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "stream-start" => AdminCommand::StreamStart {
            group: arg(&args, 2, "group"),
        },
        "stream-stop" => AdminCommand::StreamStop {
            group: arg(&args, 2, "group"),
        },
        "stream-status" => AdminCommand::StreamStatus {
            group: arg(&args, 2, "group"),
        },
        "search-terms" => AdminCommand::SetSearchTerms {
            group: arg(&args, 2, "group"),
            terms: rest(&args, 3, "term"),
        },
        "ignore-list" => AdminCommand::IgnoreList {
            group: arg(&args, 2, "group"),
        },
        "ignore-add" => AdminCommand::IgnoreAdd {
            group: arg(&args, 2, "group"),
            terms: rest(&args, 3, "term"),
        },
        "ignore-del" => AdminCommand::IgnoreDel {
            group: arg(&args, 2, "group"),
            term: arg(&args, 3, "term"),
        },
        "ignore-clear" => AdminCommand::IgnoreClear {
            group: arg(&args, 2, "group"),
        },
        "votes-needed" => AdminCommand::SetVotesNeeded {
            group: arg(&args, 2, "group"),
            votes: arg(&args, 3, "n"),
        },
        "target-channel" => AdminCommand::SetTargetChannel {
            group: arg(&args, 2, "group"),
            channel: arg(&args, 3, "channel"),
        },
        "allow" => {
            let kind: String = arg(&args, 3, "kind");
            if !matches!(kind.as_str(), "channel" | "role" | "user") {
                fail("<kind> must be channel, role or user");
            }
            AdminCommand::Allow {
                group: arg(&args, 2, "group"),
                kind,
                id: arg(&args, 4, "id"),
            }
        }
        "propose" => AdminCommand::Propose {
            group: arg(&args, 2, "group"),
            channel: arg(&args, 3, "channel"),
            message: arg(&args, 4, "message"),
        },
        "candidates" => AdminCommand::ListCandidates,
        "sweep" => AdminCommand::Sweep,
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                fail(&error);
            }
            AdminResponse::List { items } => {
                if items.is_empty() {
                    println!("(none)");
                } else {
                    for item in items {
                        println!("{}", item);
                    }
                }
            }
            AdminResponse::Pong => {
                println!("pong - moobird-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
