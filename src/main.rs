//! mavping CLI - MAVLink v2 ping responder and ping client.

use std::sync::Arc;

use clap::Parser;
use colored::Colorize;

use mavping::cli::*;
use mavping::config::{init_logging, Config};
use mavping::error::Result;
use mavping::pinger::{PingEvent, Pinger};
use mavping::protocol::{FrameCodec, MessageRegistry};
use mavping::responder::ResponderService;
use mavping::signals::setup_signal_handlers;
use mavping::transport::MavConnection;
use mavping::types::{Endpoint, PeerIdentity};
use mavping::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Load config if specified
    let mut config = if let Some(ref path) = cli.config {
        Config::load(path)?
    } else if Config::default_path().exists() {
        Config::load(Config::default_path())?
    } else {
        Config::default()
    };

    // Initialize logging
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.debug {
        config.logging.level = "debug".into();
    }
    if cli.no_color {
        config.logging.color = false;
    }
    init_logging(&config.logging)?;

    // Dispatch command
    match cli.command {
        Commands::Serve(args) => run_serve(args, config).await,
        Commands::Ping(args) => run_ping(args, config).await,
        Commands::Config(args) => run_config(args),
        Commands::Completions(args) => run_completions(args),
    }
}

fn apply_identity(config: &mut Config, args: &IdentityArgs) {
    if let Some(id) = args.system_id {
        config.identity.system_id = id;
    }
    if let Some(id) = args.component_id {
        config.identity.component_id = id;
    }
}

async fn connect(endpoint: &Endpoint, config: &Config) -> Result<MavConnection> {
    let registry = Arc::new(MessageRegistry::standard());
    let codec = FrameCodec::new(registry, config.codec_config()?);
    MavConnection::open(endpoint, codec, config.identity(), &config.transport).await
}

/// Run the responder
async fn run_serve(args: ServeArgs, mut config: Config) -> Result<()> {
    apply_identity(&mut config, &args.identity);
    if args.strict_signing {
        config.codec.strict_signing = true;
    }
    if args.signing_key.is_some() {
        config.codec.signing_key = args.signing_key.clone();
    }
    if let Some(link_id) = args.link_id {
        config.codec.link_id = link_id;
    }
    if args.sign_outgoing {
        config.codec.sign_outgoing = true;
    }
    if args.allow_v1_report {
        config.codec.force_v2 = false;
    }
    config.validate()?;

    let endpoint = args.url.or_else(|| config.url.clone()).ok_or_else(|| {
        mavping::Error::Config("No endpoint given and no `url` in the configuration".into())
    })?;

    println!(
        "{} {} {}",
        "mavping".bright_cyan().bold(),
        VERSION.bright_cyan(),
        "responder".bright_white()
    );
    println!("  {} {}", "endpoint:".dimmed(), endpoint);
    println!("  {} {}", "identity:".dimmed(), config.identity());
    println!();

    let handler = setup_signal_handlers();
    let shutdown = handler.shutdown_signal();

    if endpoint.is_listener() {
        println!("{} Waiting for peers on {}...", "●".yellow(), endpoint);
    }
    let connection = connect(&endpoint, &config).await?;
    println!("{} Listening. Press Ctrl+C to stop.", "●".green());

    let mut service = ResponderService::new(connection);
    let reason = service.run(shutdown).await?;
    let stats = service.stats();
    let codec = service.connection().codec().stats();

    println!();
    println!("{} Responder stopped ({reason}).", "●".yellow());
    println!(
        "  {} received, {} pings, {} replies, {} ignored, {} unknown, {} bad checksums",
        stats.frames_seen,
        stats.pings_seen,
        stats.replies_sent.to_string().green(),
        stats.ignored_pings,
        stats.unknown_frames,
        codec.checksum_errors
    );

    Ok(())
}

/// Ping a system
async fn run_ping(args: PingArgs, mut config: Config) -> Result<()> {
    apply_identity(&mut config, &args.identity);
    if let Some(count) = args.count {
        config.pinger.count = count;
    }
    if let Some(interval) = args.interval {
        config.pinger.interval = interval;
    }
    if let Some(timeout) = args.timeout {
        config.pinger.timeout = timeout;
    }
    config.validate()?;

    let target = PeerIdentity::new(args.target_system, args.target_component);
    println!(
        "{} {} to {} via {}",
        "PING".bright_cyan().bold(),
        target,
        config.identity(),
        args.url
    );

    let handler = setup_signal_handlers();
    let shutdown = handler.shutdown_signal();

    let connection = connect(&args.url, &config).await?;
    let mut pinger = Pinger::new(connection, config.pinger_config(target));

    let summary = pinger
        .run(shutdown, |event| match event {
            PingEvent::Reply { seq, rtt } => println!(
                "Ping response from {target}: seq={seq} time={:.1} ms",
                rtt.as_secs_f64() * 1000.0
            ),
            PingEvent::Timeout { seq } => {
                println!("{} seq={seq}", "Ping response timeout".yellow());
            }
        })
        .await?;

    println!();
    println!("{summary}");
    Ok(())
}

/// Generate shell completions
fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::generate;

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
    };

    generate(shell, &mut cmd, name, &mut std::io::stdout());

    Ok(())
}

/// Show example configuration
fn run_config(args: ConfigArgs) -> Result<()> {
    let config = Config::example();

    if let Some(ref path) = args.output {
        config.save(path)?;
        println!(
            "{} Configuration written to {}",
            "✓".green(),
            path.display()
        );
    } else {
        println!("{}", config.to_toml()?);
    }

    Ok(())
}
