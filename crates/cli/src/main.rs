//! QueueTrackr CLI - Command-line client for the QueueTrackr daemon
//!
//! Owners create and drive queues; members join, check their position and
//! watch for their turn.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9630";

#[derive(Parser)]
#[command(name = "queuetrackr")]
#[command(about = "QueueTrackr CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "QUEUETRACKR_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    /// Acting user: owner id for owner commands, member id for member commands
    #[arg(short, long, env = "QUEUETRACKR_USER")]
    user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a queue owned by the acting user
    Create {
        /// Display name
        name: String,
    },

    /// Show one queue
    Get { queue_id: String },

    /// Look up a queue by its public code (e.g. Q4821)
    Find { code: String },

    /// List queues you own, or with --joined the queues you are in
    List {
        #[arg(long)]
        joined: bool,
    },

    /// Join a queue by id or public code
    Join {
        #[arg(long, conflicts_with = "code", required_unless_present = "code")]
        queue: Option<String>,

        #[arg(long)]
        code: Option<String>,
    },

    /// Leave a queue
    Leave { queue_id: String },

    /// Show your position and ETA
    Status { queue_id: String },

    /// Poll once for position events
    Events { queue_id: String },

    /// Poll for events until you are served or removed
    Watch {
        queue_id: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "2000")]
        interval_ms: u64,
    },

    /// Start serving (owner)
    Start { queue_id: String },

    /// Serve the next member (owner)
    Next { queue_id: String },

    /// Release the no-show lock without waiting (owner)
    Proceed { queue_id: String },

    /// Manage breaks (owner)
    Break {
        #[command(subcommand)]
        action: BreakAction,
    },

    /// End a queue and remove it (owner)
    End { queue_id: String },
}

#[derive(Subcommand)]
enum BreakAction {
    /// Pause serving for some minutes
    Start { queue_id: String, minutes: u32 },

    /// Push the current break out by some minutes
    Extend { queue_id: String, minutes: u32 },

    /// Resume serving now
    End { queue_id: String },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Queue record as returned by the daemon
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueRecord {
    id: String,
    public_code: String,
    name: String,
    owner_id: String,
    members: Vec<String>,
    current_index: usize,
    has_started: bool,
    is_on_break: bool,
    break_ends_at: Option<i64>,
    next_lock_until: Option<i64>,
    avg_serve_ms: i64,
    samples: i64,
}

impl QueueRecord {
    fn state(&self) -> String {
        if !self.has_started {
            "not started".to_string()
        } else if self.is_on_break {
            format!("on break until {}", format_ms(self.break_ends_at))
        } else if let Some(until) = self.next_lock_until {
            format!("awaiting arrival until {}", format_ms(Some(until)))
        } else if self.current_index >= self.members.len() {
            "idle".to_string()
        } else {
            "serving".to_string()
        }
    }
}

#[derive(Tabled)]
struct QueueRow {
    id: String,
    code: String,
    name: String,
    members: usize,
    serving: String,
    state: String,
}

impl From<&QueueRecord> for QueueRow {
    fn from(q: &QueueRecord) -> Self {
        Self {
            id: q.id.clone(),
            code: q.public_code.clone(),
            name: q.name.clone(),
            members: q.members.len(),
            serving: q
                .members
                .get(q.current_index)
                .cloned()
                .unwrap_or_else(|| "-".to_string()),
            state: q.state(),
        }
    }
}

#[derive(Deserialize)]
struct QueueResult {
    queue: QueueRecord,
}

#[derive(Deserialize)]
struct QueueListResult {
    queues: Vec<QueueRecord>,
}

#[derive(Deserialize)]
struct CommandResult {
    changed: bool,
    queue: QueueRecord,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Position {
    member_index: usize,
    positions_ahead: usize,
    served: bool,
    eta_ms: Option<i64>,
    current_index: usize,
    queue_size: usize,
}

#[derive(Deserialize)]
struct StatusResult {
    position: Position,
    is_turn: bool,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
enum QueueEvent {
    PositionChanged { new_position: usize },
    YourTurnNow,
    RemovedFromQueue,
}

#[derive(Deserialize)]
struct EventsResult {
    events: Vec<QueueEvent>,
}

async fn call_rpc<T: for<'de> Deserialize<'de>>(
    url: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<T> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    let result = response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))?;
    serde_json::from_value(result).with_context(|| format!("Unexpected result for {}", method))
}

fn format_ms(ms: Option<i64>) -> String {
    ms.and_then(clock_time)
        .unwrap_or_else(|| "-".to_string())
}

/// Epoch milliseconds as `HH:MM:SS` UTC
fn clock_time(ms: i64) -> Option<String> {
    if ms < 0 {
        return None;
    }
    let secs = ms / 1000;
    let (h, m, s) = ((secs / 3600) % 24, (secs / 60) % 60, secs % 60);
    Some(format!("{:02}:{:02}:{:02} UTC", h, m, s))
}

fn format_duration(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

fn print_queue(queue: &QueueRecord) {
    println!("{}", Table::new(vec![QueueRow::from(queue)]));
    println!("  {} {}", "Owner:".bold(), queue.owner_id);
    if queue.samples > 0 {
        println!(
            "  {} {} ({} samples)",
            "Avg serve:".bold(),
            format_duration(queue.avg_serve_ms),
            queue.samples
        );
    }
}

fn print_command(label: &str, result: &CommandResult) {
    if result.changed {
        println!("{}", format!("✓ {}", label).green().bold());
    } else {
        println!("{}", format!("○ {} (nothing to do)", label).yellow());
    }
    print_queue(&result.queue);
}

fn print_event(event: &QueueEvent) {
    match event {
        QueueEvent::PositionChanged { new_position } => {
            println!("  {} {} ahead of you", "↑".cyan(), new_position)
        }
        QueueEvent::YourTurnNow => println!("  {}", "★ It's your turn now!".green().bold()),
        QueueEvent::RemovedFromQueue => println!("  {}", "✗ You are no longer in this queue".red()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let url = cli.rpc_url.as_str();
    let user = cli.user.as_str();

    match cli.command {
        Commands::Create { name } => {
            let result: QueueResult = call_rpc(
                url,
                "queue.create.v1",
                json!({ "name": name, "owner_id": user }),
            )
            .await?;
            println!("{}", "✓ Queue created".green().bold());
            println!();
            print_queue(&result.queue);
            println!(
                "  {} {}",
                "Share code:".bold(),
                result.queue.public_code.cyan().bold()
            );
        }

        Commands::Get { queue_id } => {
            let result: QueueResult =
                call_rpc(url, "queue.get.v1", json!({ "queue_id": queue_id })).await?;
            print_queue(&result.queue);
        }

        Commands::Find { code } => {
            let result: QueueResult =
                call_rpc(url, "queue.find_by_code.v1", json!({ "code": code })).await?;
            print_queue(&result.queue);
        }

        Commands::List { joined } => {
            let result: QueueListResult = if joined {
                call_rpc(url, "queue.list_joined.v1", json!({ "member_id": user })).await?
            } else {
                call_rpc(url, "queue.list_owned.v1", json!({ "owner_id": user })).await?
            };

            if result.queues.is_empty() {
                println!("{}", "No queues".yellow());
            } else {
                let rows: Vec<QueueRow> = result.queues.iter().map(QueueRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Join { queue, code } => {
            let result: QueueResult = call_rpc(
                url,
                "member.join.v1",
                json!({ "queue_id": queue, "code": code, "member_id": user }),
            )
            .await?;
            let position = result.queue.members.len().saturating_sub(1);
            println!(
                "{}",
                format!("✓ Joined {} ({})", result.queue.name, result.queue.public_code)
                    .green()
                    .bold()
            );
            println!("  {} #{}", "Your place:".bold(), position + 1);
        }

        Commands::Leave { queue_id } => {
            let result: CommandResult = call_rpc(
                url,
                "member.leave.v1",
                json!({ "queue_id": queue_id, "member_id": user }),
            )
            .await?;
            println!(
                "{}",
                format!("✓ Left {}", result.queue.name).green().bold()
            );
        }

        Commands::Status { queue_id } => {
            let result: StatusResult = call_rpc(
                url,
                "member.status.v1",
                json!({ "queue_id": queue_id, "member_id": user }),
            )
            .await?;
            let p = &result.position;

            if result.is_turn {
                println!("{}", "★ It's your turn now!".green().bold());
            } else if p.served {
                println!("{}", "✓ You have been served".green());
            } else {
                println!("{}", format!("{} ahead of you", p.positions_ahead).cyan().bold());
            }
            println!("  {} #{} of {}", "Your place:".bold(), p.member_index + 1, p.queue_size);
            println!("  {} #{}", "Now serving:".bold(), p.current_index + 1);
            match p.eta_ms {
                Some(eta) => println!("  {} ~{}", "ETA:".bold(), format_duration(eta)),
                None => println!("  {} {}", "ETA:".bold(), "not enough data yet".dimmed()),
            }
        }

        Commands::Events { queue_id } => {
            let result: EventsResult = call_rpc(
                url,
                "member.events.v1",
                json!({ "queue_id": queue_id, "member_id": user }),
            )
            .await?;
            if result.events.is_empty() {
                println!("{}", "No new events".dimmed());
            }
            result.events.iter().for_each(print_event);
        }

        Commands::Watch {
            queue_id,
            interval_ms,
        } => {
            println!(
                "{}",
                format!("Watching {} (Ctrl+C to stop)", queue_id).cyan().bold()
            );
            let params = json!({ "queue_id": queue_id, "member_id": user });
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(100)));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tokio::signal::ctrl_c() => break,
                }

                let result: EventsResult =
                    call_rpc(url, "member.events.v1", params.clone()).await?;
                result.events.iter().for_each(print_event);
                if result
                    .events
                    .iter()
                    .any(|e| matches!(e, QueueEvent::RemovedFromQueue))
                {
                    break;
                }
            }
        }

        Commands::Start { queue_id } => {
            let result: CommandResult = call_rpc(
                url,
                "advance.start.v1",
                json!({ "queue_id": queue_id, "actor": user }),
            )
            .await?;
            print_command("Queue started", &result);
        }

        Commands::Next { queue_id } => {
            let result: CommandResult = call_rpc(
                url,
                "advance.next.v1",
                json!({ "queue_id": queue_id, "actor": user }),
            )
            .await?;
            print_command("Moved to next member", &result);
        }

        Commands::Proceed { queue_id } => {
            let result: CommandResult = call_rpc(
                url,
                "advance.proceed.v1",
                json!({ "queue_id": queue_id, "actor": user }),
            )
            .await?;
            print_command("Lock released", &result);
        }

        Commands::Break { action } => match action {
            BreakAction::Start { queue_id, minutes } => {
                let result: QueueResult = call_rpc(
                    url,
                    "break.start.v1",
                    json!({ "queue_id": queue_id, "actor": user, "minutes": minutes }),
                )
                .await?;
                println!("{}", format!("✓ On break for {} min", minutes).green().bold());
                print_queue(&result.queue);
            }
            BreakAction::Extend { queue_id, minutes } => {
                let result: QueueResult = call_rpc(
                    url,
                    "break.extend.v1",
                    json!({ "queue_id": queue_id, "actor": user, "minutes": minutes }),
                )
                .await?;
                println!("{}", format!("✓ Break extended by {} min", minutes).green().bold());
                print_queue(&result.queue);
            }
            BreakAction::End { queue_id } => {
                let result: CommandResult = call_rpc(
                    url,
                    "break.end.v1",
                    json!({ "queue_id": queue_id, "actor": user }),
                )
                .await?;
                print_command("Break ended", &result);
            }
        },

        Commands::End { queue_id } => {
            let _: serde_json::Value = call_rpc(
                url,
                "queue.end.v1",
                json!({ "queue_id": queue_id, "actor": user }),
            )
            .await?;
            println!("{}", format!("✓ Queue {} ended", queue_id).green().bold());
        }
    }

    Ok(())
}
