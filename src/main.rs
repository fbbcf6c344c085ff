use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use forwarder::client::telegram::TelegramClient;
use forwarder::client::{ChatClient, UpdateSource};
use forwarder::config::{Config, RelayConfig};
use forwarder::dispatcher::Dispatcher;
use forwarder::error::{ForwarderError, Result};
use forwarder::filter::IgnoreFilter;
use forwarder::message::Update;
use forwarder::relay::DeliveryMode;

#[derive(Parser)]
#[command(name = "forwarder", version, about = "Relay channel posts and comment under them")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and comment template
    Init {
        /// Interactive setup with prompts
        #[arg(short, long)]
        interactive: bool,
    },
    /// Authorize and start relaying
    Start,
    /// Validate the config and show what would run
    Check,
    /// Show recent logs
    Logs {
        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing: file + stderr for `start`, stderr only otherwise
    init_tracing(matches!(&cli.command, Commands::Start))?;

    let result = match cli.command {
        Commands::Init { interactive } => {
            let path = config_path(&cli.config);
            if interactive {
                cmd_init_interactive(&path)
            } else {
                cmd_init(&path)
            }
        }
        Commands::Start => cmd_start(&cli.config).await,
        Commands::Check => cmd_check(&cli.config),
        Commands::Logs { lines } => cmd_logs(lines),
    };

    if let Err(e) = &result {
        if e.is_config() {
            eprintln!("Configuration problem. Run `forwarder check` for details.");
        }
    }
    result?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn forwarder_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".forwarder")
}

fn log_file_path() -> PathBuf {
    forwarder_dir().join("forwarder.log")
}

fn config_path(path: &Option<PathBuf>) -> PathBuf {
    path.clone().unwrap_or_else(Config::default_path)
}

/// Load the config and return it with the directory relative template paths
/// resolve against.
fn load_config(path: &Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let config_path = config_path(path);
    if !config_path.exists() {
        return Err(ForwarderError::Config(format!(
            "Config not found at {}. Run `forwarder init` first.",
            config_path.display()
        )));
    }
    let config = Config::load(&config_path)?;
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((config, base_dir))
}

fn init_tracing(with_file: bool) -> std::result::Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if with_file {
            "info".into()
        } else {
            "warn".into()
        }
    });

    let stderr_layer = tracing_subscriber::fmt::layer();

    if with_file {
        let _ = std::fs::create_dir_all(forwarder_dir());
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path())?;

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }

    Ok(())
}

fn delivery_label(delivery: DeliveryMode) -> &'static str {
    match delivery {
        DeliveryMode::Copy => "copy",
        DeliveryMode::Forward => "forward",
    }
}

fn print_summary(relay: &RelayConfig) {
    println!("  Source:     {}", relay.source);
    println!("  Target:     {}", relay.target);
    match relay.discussion {
        Some(id) => println!("  Discussion: {id}"),
        None => println!("  Discussion: disabled"),
    }
    match relay.filter.pattern() {
        Some(pattern) => println!("  Ignore:     /{}/", pattern.as_str()),
        None => println!("  Ignore:     none"),
    }
    println!("  Delivery:   {}", delivery_label(relay.delivery));
    match &relay.comment_template {
        Some(template) => println!(
            "  Comment:    {} chars, {} entities{}",
            template.utf16_len(),
            template.entities.len(),
            if relay.silent_comments { ", silent" } else { "" }
        ),
        None => println!("  Comment:    disabled"),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn prompt_err(e: inquire::InquireError) -> ForwarderError {
    ForwarderError::Config(format!("Prompt cancelled: {e}"))
}

fn cmd_init_interactive(config_path: &Path) -> Result<()> {
    use inquire::{Confirm, CustomType, Text};

    println!("Welcome to forwarder setup!\n");

    let token = Text::new("Telegram bot token:")
        .with_default("${TELEGRAM_BOT_TOKEN}")
        .with_help_message("Use ${VAR_NAME} to reference an env variable")
        .prompt()
        .map_err(prompt_err)?;

    let source = CustomType::<i64>::new("Source channel id:")
        .with_help_message("e.g. -1001234567890")
        .prompt()
        .map_err(prompt_err)?;

    let target = CustomType::<i64>::new("Target channel id:")
        .prompt()
        .map_err(prompt_err)?;

    let discussion = CustomType::<i64>::new("Discussion group id:")
        .with_default(0)
        .with_help_message("Group linked to the target channel; 0 disables comments")
        .prompt()
        .map_err(prompt_err)?;

    let ignore_regex = Text::new("Ignore pattern:")
        .with_default("")
        .with_help_message("Posts matching this regex are not relayed; empty relays everything")
        .prompt()
        .map_err(prompt_err)?;
    IgnoreFilter::compile(Some(&ignore_regex))?;

    let show_forwarded = Confirm::new("Keep the forwarded-from header?")
        .with_default(false)
        .prompt()
        .map_err(prompt_err)?;

    let silent = Confirm::new("Post comments silently?")
        .with_default(false)
        .prompt()
        .map_err(prompt_err)?;

    let ignore_regex = ignore_regex.replace('\\', "\\\\").replace('"', "\\\"");
    let config_content = format!(
        r#"[telegram]
bot_token = "{token}"
poll_timeout_secs = 30

[relay]
source_channel_id = {source}
target_channel_id = {target}
discussion_group_id = {discussion}
ignore_regex = "{ignore_regex}"
show_forwarded = {show_forwarded}

[comment]
template_file = "comment.md"
silent = {silent}
"#
    );

    // Parse what we are about to write so a bad answer fails here.
    Config::parse(&config_content)?;

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    if config_path.exists() {
        let overwrite = Confirm::new("Config already exists. Overwrite?")
            .with_default(false)
            .prompt()
            .map_err(prompt_err)?;
        if !overwrite {
            println!("Kept existing config.");
            return Ok(());
        }
    }

    std::fs::write(config_path, &config_content)?;
    println!("Created config at {}", config_path.display());
    write_default_comment(config_path)?;

    println!("\nRun `forwarder check` to validate, then `forwarder start`.");
    Ok(())
}

fn cmd_init(config_path: &Path) -> Result<()> {
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    if !config_path.exists() {
        std::fs::write(config_path, Config::default_toml())?;
        println!("Created config at {}", config_path.display());
    } else {
        println!("Config already exists at {}", config_path.display());
    }

    write_default_comment(config_path)
}

fn write_default_comment(config_path: &Path) -> Result<()> {
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let comment_md = dir.join("comment.md");
    if !comment_md.exists() {
        std::fs::write(&comment_md, Config::default_comment())?;
        println!("Created {}", comment_md.display());
    }
    Ok(())
}

fn cmd_check(config_path: &Option<PathBuf>) -> Result<()> {
    let (config, base_dir) = load_config(config_path)?;
    let relay = config.compile(&base_dir, forwarder::markdown::parse_markdown)?;

    println!("Config OK");
    print_summary(&relay);
    if config.telegram.token().is_none() {
        println!("\nwarning: telegram.bot_token is empty; `forwarder start` will refuse to run");
    }
    for warning in relay.warnings() {
        println!("\nwarning: {warning}");
    }
    Ok(())
}

async fn cmd_start(config_path: &Option<PathBuf>) -> Result<()> {
    let (config, base_dir) = load_config(config_path)?;

    let client = Arc::new(TelegramClient::new(&config.telegram)?);
    client.authorize().await?;

    let relay = config.compile(&base_dir, |source| client.parse_markdown(source))?;
    for warning in relay.warnings() {
        warn!("{warning}");
    }

    println!("forwarder v{} started", env!("CARGO_PKG_VERSION"));
    print_summary(&relay);
    println!("  Log:        {}", log_file_path().display());
    println!();
    println!("Press Ctrl+C to stop.");

    let (update_tx, update_rx) = mpsc::channel::<Update>(64);

    // Spawn update poller
    let source = client.clone();
    let poller = tokio::spawn(async move {
        if let Err(e) = source.run(update_tx).await {
            error!("{} update source error: {e}", source.name());
        }
    });

    // Aborting the poller drops the sender, which lets the dispatcher finish
    // its in-flight update and return.
    let abort = poller.abort_handle();
    let stopper = client.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        println!("\nShutting down...");
        stopper.stop().await;
        abort.abort();
    });

    let dispatcher = Dispatcher::new(relay, client.clone());
    let handled = dispatcher.run(update_rx).await;

    info!(handled, "Dispatcher finished");
    println!("forwarder stopped.");
    Ok(())
}

fn cmd_logs(num_lines: usize) -> Result<()> {
    let path = log_file_path();

    if !path.exists() {
        println!("No log file found at {}", path.display());
        println!("Start the relay first: forwarder start");
        return Ok(());
    }

    let content = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(num_lines);

    for line in &lines[start..] {
        println!("{line}");
    }

    if start > 0 {
        println!(
            "\n(Showing last {} of {} lines)",
            lines.len() - start,
            lines.len()
        );
    }

    Ok(())
}
