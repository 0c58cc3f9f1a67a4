use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use matrix_client::MatrixClient;
use recognizer::GestureCatalog;
use shared::domain::MatrixConfig;
use storage::{Storage, StorageData};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Account and catalog maintenance for the gesture relay")]
struct Cli {
    #[arg(long, default_value = "./data/data.json")]
    data_path: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Logs in with a password and stores the issued tokens.
    ///
    /// The password comes from `MATRIX_PASSWORD`, or from the first line of
    /// stdin when that is unset.
    Login {
        server_domain: String,
        user_name: String,
        #[arg(long, env = "MATRIX_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sets the room matched messages are sent to.
    SetRoom { room_id: String },
    /// Prints the stored gestures.
    List,
    /// Reports missing account fields and gestures that can never match.
    Check,
    /// Sends a message to the target room with the stored account.
    SendTest { message: String },
    /// Creates a room with `invite` in it; `--direct` makes a private direct chat.
    CreateRoom {
        invite: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        public: bool,
        #[arg(long, conflicts_with_all = ["name", "public"])]
        direct: bool,
        /// Stores the new room as the target for matched messages.
        #[arg(long)]
        set_target: bool,
    },
    JoinedRooms,
    /// Joins every room the account has been invited to.
    AcceptInvites,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let cli = Cli::parse();
    let storage = Storage::open(&cli.data_path);

    match cli.command {
        Command::Login {
            server_domain,
            user_name,
            password,
        } => {
            let password = match password {
                Some(password) => password,
                None => read_password(BufReader::new(io::stdin())).await?,
            };
            let previous = storage.load().await?.matrix.unwrap_or_default();
            let mut client = MatrixClient::new(&MatrixConfig {
                server_domain: Some(server_domain),
                target_room: previous.target_room,
                ..MatrixConfig::default()
            })?;
            client
                .login(&user_name, &password)
                .await
                .context("login failed")?;
            storage.update_matrix_config(client.config()).await?;
            println!("logged in as {user_name}; tokens saved to {}", storage.path().display());
        }
        Command::SetRoom { room_id } => {
            let mut matrix = storage.load().await?.matrix.unwrap_or_default();
            matrix.target_room = Some(room_id.clone());
            storage.update_matrix_config(matrix).await?;
            println!("target room set to {room_id}");
        }
        Command::List => {
            let data = storage.load().await?;
            let gestures = data.gestures.unwrap_or_default();
            if gestures.is_empty() {
                println!("no gestures stored");
            }
            for gesture in gestures {
                let pattern: Vec<String> = gesture
                    .entries
                    .iter()
                    .map(|e| format!("{}>={}ms", e.key, e.min_duration_ms))
                    .collect();
                println!("{}: {} -> {:?}", gesture.name, pattern.join(" "), gesture.message);
            }
        }
        Command::Check => {
            let problems = check(&storage.load().await?);
            if problems.is_empty() {
                println!("ok");
            } else {
                for problem in &problems {
                    println!("{problem}");
                }
                bail!("{} problem(s) found", problems.len());
            }
        }
        Command::SendTest { message } => {
            let matrix = stored_account(&storage).await?;
            let mut client = MatrixClient::for_dispatch(&matrix)?;
            let receipt = client.send_to_target(&message).await?;
            if receipt.refreshed {
                storage.update_matrix_config(client.config()).await?;
            }
            println!("sent event_id={}", receipt.event_id);
        }
        Command::CreateRoom {
            invite,
            name,
            public,
            direct,
            set_target,
        } => {
            let matrix = stored_account(&storage).await?;
            let client = MatrixClient::new(&matrix)?;
            let room_id = if direct {
                client.create_private_chat(&invite).await?
            } else {
                client.create_room(name.as_deref(), !public, &invite).await?
            };
            println!("created room {room_id}");
            if set_target {
                storage
                    .update_matrix_config(MatrixConfig {
                        target_room: Some(room_id.clone()),
                        ..matrix
                    })
                    .await?;
                println!("target room set to {room_id}");
            }
        }
        Command::JoinedRooms => {
            let client = MatrixClient::new(&stored_account(&storage).await?)?;
            for room in client.joined_rooms().await? {
                println!("{room}");
            }
        }
        Command::AcceptInvites => {
            let client = MatrixClient::new(&stored_account(&storage).await?)?;
            let joined = client.accept_invites().await?;
            println!("joined {} room(s)", joined.len());
            for room in joined {
                println!("{room}");
            }
        }
    }

    Ok(())
}

async fn stored_account(storage: &Storage) -> Result<MatrixConfig> {
    storage
        .load()
        .await?
        .matrix
        .context("no matrix account stored; run `login` first")
}

async fn read_password<R>(reader: R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let line = reader
        .lines()
        .next_line()
        .await
        .context("failed to read password from stdin")?
        .unwrap_or_default();
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("no password given; set MATRIX_PASSWORD or pipe it on stdin");
    }
    Ok(password)
}

fn check(data: &StorageData) -> Vec<String> {
    let mut problems = Vec::new();

    match &data.matrix {
        Some(matrix) => {
            for field in matrix.missing_fields() {
                problems.push(format!("matrix account is missing {field}"));
            }
        }
        None => problems.push("no matrix account stored".to_string()),
    }

    match &data.gestures {
        Some(gestures) => {
            for gesture in gestures.iter().filter(|g| g.entries.is_empty()) {
                problems.push(format!("gesture '{}' has no entries", gesture.name));
            }
            let catalog = GestureCatalog::new(gestures.clone());
            for (first, second) in catalog.duplicate_patterns() {
                problems.push(format!(
                    "gestures '{}' and '{}' share a pattern; neither can match",
                    first.name, second.name
                ));
            }
        }
        None => problems.push("no gestures stored".to_string()),
    }

    problems
}
