//! Interactive console chat against the same relay the HTTP server uses.

use std::path::PathBuf;

use agro_relay::{bootstrap, config::parse_path_list, logging, RelayConfig, Session, UserProfile};
use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "agro_relay_cli")]
#[command(version, about = "Chat with the farming advisor from the terminal (type exit or quit to leave)")]
struct Cli {
    /// JSON file with the user profile, e.g. {"Region": "South West", "Crop": "Cassava"}
    #[arg(long, value_name = "PATH")]
    profile: Option<PathBuf>,

    /// Comma-separated reference documents (overrides RELAY_CORPUS)
    #[arg(long, value_name = "PATHS")]
    corpus: Option<String>,
}

fn load_profile(path: Option<&PathBuf>) -> Result<UserProfile> {
    let Some(path) = path else {
        return Ok(UserProfile::new());
    };
    let raw = std::fs::read_to_string(path).wrap_err_with(|| format!("reading profile {}", path.display()))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("parsing profile {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // 標準出力は会話に使うのでログはファイルのみ
    let _guard = logging::init(logging::LogOutput::FileOnly);

    let mut config = RelayConfig::from_env()?;
    if let Some(list) = cli.corpus.as_deref() {
        config.corpus = parse_path_list(list);
    }
    let profile = load_profile(cli.profile.as_ref())?;
    let relay = bootstrap::build_relay(&config)?;

    // CLI 実行中はひとつのセッションを使い続ける
    let mut session = Session::new("cli");
    info!(target: "relay", session = session.id(), profile_fields = profile.len(), "cli_started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        if line.trim().is_empty() {
            continue;
        }

        match relay.handle_turn(&mut session, &line, &profile).await {
            Ok(outcome) => {
                stdout.write_all(format!("Assistant: {}\n", outcome.reply).as_bytes()).await?;
                if outcome.exited {
                    break;
                }
            }
            Err(e) => eprintln!("error ({}): {}", e.kind(), e),
        }
    }
    stdout.flush().await?;
    info!(target: "relay", turns = session.history().len(), "cli_finished");
    Ok(())
}
