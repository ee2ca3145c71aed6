use clap::Parser;
use dmancipate_cli::{Args, CliAction, ClientError, DmClient};
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const RULE: &str = "--------------------------------------------------";

async fn run(args: Args) -> Result<(), ClientError> {
    let client = DmClient::new(args.base_url())?;

    if args.check_health {
        if client.check_health().await {
            println!("✅ DMancipate API is running and healthy!");
            return Ok(());
        }
        return Err(ClientError::NotResponding);
    }

    if !client.check_health().await {
        return Err(ClientError::NotResponding);
    }

    if args.action == CliAction::Reset {
        println!("🗑️  Resetting campaign history...");
        println!("⚠️  This will delete all game history. This action cannot be undone.");
        println!("{}", RULE);

        let message = client.reset_campaign().await?;
        println!("✅ {}", message);
        println!("🎯 Campaign has been reset to a fresh state!");
        return Ok(());
    }

    let prompt = args.prompt().ok_or(ClientError::MissingPrompt)?;

    println!("🎲 Sending '{}' action to DM...", args.action.as_str());
    println!("📝 Prompt: {}", prompt);
    println!("⏳ Waiting for DM response...");
    println!("{}", RULE);

    if args.stream {
        println!("🎯 DM Response:");
        let mut stdout = std::io::stdout();
        client
            .chat_stream(args.action.as_str(), prompt, |delta| {
                print!("{}", delta);
                let _ = stdout.flush();
            })
            .await?;
        println!();
    } else {
        let reply = client.chat(args.action.as_str(), prompt).await?;
        println!("🎯 DM Response:");
        println!("{}", reply);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("DMANCIPATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(ClientError::NotResponding) => {
            println!("❌ {}", ClientError::NotResponding);
            ExitCode::FAILURE
        }
        Err(e) => {
            println!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
