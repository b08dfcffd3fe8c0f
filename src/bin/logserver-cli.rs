use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "logserver-cli")]
#[command(about = "Tree administration CLI for the log server", long_about = None)]
struct Cli {
    /// RPC endpoint base URL.
    #[arg(short, long, default_value = "http://localhost:8090")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a tree
    Create {
        /// LOG, PREORDERED_LOG or MAP
        #[arg(long, default_value = "LOG")]
        tree_type: String,
        #[arg(long, default_value = "")]
        display_name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Show a tree
    Get { tree_id: i64 },
    /// List trees
    List {
        /// Include soft-deleted trees
        #[arg(long)]
        deleted: bool,
    },
    /// Change a tree's state or description
    Update {
        tree_id: i64,
        /// ACTIVE, FROZEN or DRAINING
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Soft-delete a tree
    Delete { tree_id: i64 },
    /// Restore a soft-deleted tree
    Undelete { tree_id: i64 },
    /// List registered RPC services
    Services,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let (method, body) = match cli.command {
        Commands::Create {
            tree_type,
            display_name,
            description,
        } => (
            "logserver.Admin/CreateTree",
            json!({
                "tree": {
                    "tree_type": tree_type,
                    "display_name": display_name,
                    "description": description,
                }
            }),
        ),
        Commands::Get { tree_id } => ("logserver.Admin/GetTree", json!({ "tree_id": tree_id })),
        Commands::List { deleted } => (
            "logserver.Admin/ListTrees",
            json!({ "show_deleted": deleted }),
        ),
        Commands::Update {
            tree_id,
            state,
            display_name,
            description,
        } => (
            "logserver.Admin/UpdateTree",
            json!({
                "tree_id": tree_id,
                "update": {
                    "tree_state": state,
                    "display_name": display_name,
                    "description": description,
                }
            }),
        ),
        Commands::Delete { tree_id } => {
            ("logserver.Admin/DeleteTree", json!({ "tree_id": tree_id }))
        }
        Commands::Undelete { tree_id } => {
            ("logserver.Admin/UndeleteTree", json!({ "tree_id": tree_id }))
        }
        Commands::Services => (
            "logserver.reflection.ServerReflection/ListServices",
            json!({}),
        ),
    };

    let res = client
        .post(format!("{}/{}", cli.url.trim_end_matches('/'), method))
        .headers(headers)
        .json(&body)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let code = res
        .headers()
        .get("x-rpc-status")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    if !status.is_success() {
        eprintln!("Error: RPC failed with {code} (HTTP {status})");
        if let Ok(text) = res.text().await {
            eprintln!("Response: {text}");
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
