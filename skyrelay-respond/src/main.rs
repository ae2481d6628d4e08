//! skyrelay-respond - Answer a Bluesky post with a completion

use clap::Parser;
use libskyrelay::config::Config;
use libskyrelay::logging::{LogFormat, LoggingConfig};
use libskyrelay::platforms::bluesky::BlueskyClient;
use libskyrelay::reply::{BotParams, ReplyGenerator};
use libskyrelay::{Result, SkyrelayError};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "skyrelay-respond")]
#[command(version)]
#[command(about = "Answer a Bluesky post with a language-model completion")]
#[command(long_about = "\
skyrelay-respond - Answer a Bluesky post with a language-model completion

Fetches the post, fills its text into the prompt from the params file,
asks the completion API once, prints every choice, and publishes the first
one as a reply in the post's thread.

PARAMS FILE:
    {\"prompt\": \"Reply briefly to: %s\", \"model\": \"gpt-3.5-turbo-instruct\",
     \"auth\": \"<api key>\", \"org\": \"<optional organization>\"}

EXIT CODES:
    0 - Reply published
    1 - Runtime error
    2 - Authentication or configuration error
    3 - Invalid post reference
")]
struct Cli {
    /// Post to answer: at://<repo>/<collection>/<rkey>
    post: String,

    /// JSON params file with prompt, model, and API credentials
    #[arg(long, value_name = "FILE")]
    params: PathBuf,

    /// Bluesky PDS base URL
    #[arg(long, value_name = "URL")]
    pds: Option<String>,

    /// Session file, rewritten on refresh
    #[arg(long, value_name = "FILE")]
    auth: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log output format: text, json, or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env()
        .with_format(cli.log_format)
        .with_verbose(cli.verbose)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.format != "text" && cli.format != "json" {
        return Err(SkyrelayError::InvalidInput(format!(
            "Invalid format '{}'. Valid options: text, json",
            cli.format
        )));
    }

    let mut config = Config::load()?;
    if let Some(pds) = &cli.pds {
        config.bluesky.pds = pds.clone();
    }
    if let Some(auth) = &cli.auth {
        config.bluesky.auth_file = auth.clone();
    }
    let timeout = config.http_timeout()?;

    let params = BotParams::load(&cli.params)?;
    let generator = ReplyGenerator::new(params, &config.completion, timeout)?;

    let mut publisher =
        BlueskyClient::from_auth_file(&config.bluesky.pds, config.bluesky.expand_auth_file(), timeout)?;

    let draft = generator.prepare(&mut publisher, &cli.post).await?;
    let json = cli.format == "json";
    if !json {
        for choice in &draft.choices {
            println!("{}", choice.text);
        }
    }

    let texts: Vec<String> = draft.choices.iter().map(|c| c.text.clone()).collect();
    let parent = draft.parent.clone();
    let result = generator.publish(&publisher, draft).await;

    if json {
        // Choices are reported even when the reply was not published
        let output = serde_json::json!({
            "choices": texts,
            "parent": parent,
            "reply": result.as_ref().ok().map(|outcome| &outcome.reply),
        });
        println!("{}", output);
    }

    let outcome = result?;
    if !json {
        println!("{}", outcome.reply.uri);
    }
    Ok(())
}
