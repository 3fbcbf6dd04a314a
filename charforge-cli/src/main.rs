//! charforge-cli: drive character-creation sessions from a terminal
//!
//! Talks to a running charforge-server over its HTTP API and sends every
//! message as a private-channel message for a single owner. Server-initiated
//! notices (session start, idle warning) go to the server's notifier: with an
//! empty `gateway.notify_url` the server logs them.
//!
//! # Subcommands
//! - `status`: show server health
//! - `worldviews [name]`: list worldviews or show one
//! - `start <worldview>`: open a session
//! - `say <text>`: send a message in the session
//! - `generate`: finalize the session into a profile
//! - `quit`: end the session
//! - `save <name> [--overwrite]`: save the last generated profile
//! - `profiles`: list saved profiles
//! - `load <name>`: print a saved profile

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";
const DEFAULT_OWNER: &str = "cli";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "charforge-cli",
    version,
    about = "Charforge character creation from the terminal"
)]
struct Cli {
    /// Charforge HTTP server URL (overrides CHARFORGE_HTTP_URL env var)
    #[arg(long, env = "CHARFORGE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Owner id the session belongs to
    #[arg(long, env = "CHARFORGE_OWNER", default_value = DEFAULT_OWNER)]
    owner: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server status
    Status,

    /// List worldviews, or show one worldview's description
    Worldviews { name: Option<String> },

    /// Start a character-creation session on a worldview
    Start { worldview: String },

    /// Send a message in the active session
    Say {
        /// Message text (words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Finish the session and generate the profile
    Generate,

    /// End the session without generating
    Quit,

    /// Save the last generated profile
    Save {
        character_name: String,

        /// Replace an existing profile with the same name
        #[arg(long)]
        overwrite: bool,
    },

    /// List saved profiles
    Profiles,

    /// Print a saved profile
    Load { character_name: String },
}

// ============================================================================
// API Response Types
// ============================================================================

/// Envelope returned by POST /events.
#[derive(Debug, Deserialize)]
pub struct EventResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

// ============================================================================
// Event mapping
// ============================================================================

/// JSON event for a subcommand; `None` for commands that are not events.
fn build_event(owner: &str, command: &Commands) -> Option<serde_json::Value> {
    let event = match command {
        Commands::Status => return None,
        Commands::Worldviews { name: None } => json!({ "action": "list_worldviews" }),
        Commands::Worldviews { name: Some(name) } => {
            json!({ "action": "view_worldview", "name": name })
        }
        Commands::Start { worldview } => {
            json!({ "action": "start", "owner": owner, "worldview": worldview })
        }
        Commands::Say { text } => json!({
            "action": "message",
            "owner": owner,
            "text": text.join(" "),
            "private_channel": true,
        }),
        Commands::Generate => json!({ "action": "generate", "owner": owner }),
        Commands::Quit => json!({ "action": "quit", "owner": owner }),
        Commands::Save {
            character_name,
            overwrite,
        } => json!({
            "action": "save_profile",
            "owner": owner,
            "character_name": character_name,
            "overwrite": overwrite,
        }),
        Commands::Profiles => json!({ "action": "list_profiles", "owner": owner }),
        Commands::Load { character_name } => json!({
            "action": "load_profile",
            "owner": owner,
            "character_name": character_name,
        }),
    };
    Some(event)
}

/// Text to print for a response. Generated profiles get their title and
/// body; everything else prints the reply line.
fn render_response(resp: &EventResponse) -> String {
    let data = resp.data.as_ref();
    if let Some(d) = data.filter(|d| d.get("save_prompt").is_some()) {
        if let Some(profile) = d["profile"].as_str() {
            return format!(
                "{}\n[세계관: {}]\n\n{}\n\n(save with: charforge-cli save <name>)",
                d["title"].as_str().unwrap_or(""),
                d["worldview"].as_str().unwrap_or("?"),
                profile
            );
        }
    }
    if data.and_then(|d| d["ignored"].as_bool()) == Some(true) {
        return "(ignored: no active session)".to_string();
    }
    match data.and_then(|d| d["reply"].as_str()) {
        Some(reply) => reply.to_string(),
        None => resp
            .error
            .clone()
            .unwrap_or_else(|| resp.status.clone()),
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn do_event(server: &str, event: serde_json::Value) -> anyhow::Result<()> {
    // generation calls can take a while
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?;

    let url = format!("{}/events", server);
    let resp = match client.post(&url).json(&event).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("charforge-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: EventResponse = match resp.json() {
        Ok(b) => b,
        Err(e) => {
            eprintln!("charforge-cli: server returned {} with unreadable body: {}", status, e);
            std::process::exit(1);
        }
    };

    if body.status == "ok" {
        println!("{}", render_response(&body));
        Ok(())
    } else {
        eprintln!("{}", render_response(&body));
        std::process::exit(2);
    }
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Charforge server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:          {}", body["version"].as_str().unwrap_or("?"));
            println!("Storage:          {}", body["storage"].as_str().unwrap_or("?"));
            println!("PostgreSQL:       {}", body["postgresql"].as_str().unwrap_or("-"));
            println!("Active sessions:  {}", body["active_sessions"].as_u64().unwrap_or(0));
            println!("Socket:           {}", body["socket"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("charforge-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("charforge-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match build_event(&cli.owner, &cli.command) {
        Some(event) => do_event(&server, event),
        None => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("charforge-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
