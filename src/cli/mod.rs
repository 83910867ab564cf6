//! Command line interface for mavping.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::Endpoint;

/// mavping - MAVLink v2 ping responder and ping client
#[derive(Parser, Debug)]
#[command(
    name = "mavping",
    author,
    version,
    about = "MAVLink v2 ping responder and ping client",
    long_about = r#"
mavping answers broadcast MAVLink PING requests and measures round-trip
times to MAVLink systems.

ENDPOINTS:
  udpin://0.0.0.0:14550     listen for UDP, reply to the latest sender
  udpout://10.0.0.2:14550   send UDP to a fixed address
  tcp://10.0.0.2:5760       connect to a TCP server
  tcpin://0.0.0.0:5760      accept a single TCP client
  /dev/ttyUSB0,57600        serial device (or serial:///dev/ttyUSB0?baud=57600)

QUICK START:
  Responder:  mavping serve udpin://0.0.0.0:14550 --system-id 1
  Client:     mavping ping udpout://127.0.0.1:14550 1 1 -c 5
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Print debug output (same as --log-level debug)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer broadcast PING requests
    Serve(ServeArgs),

    /// Ping a MAVLink system and report round-trip times
    Ping(PingArgs),

    /// Show example configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Identity overrides shared by serve and ping
#[derive(Args, Debug, Clone, Default)]
pub struct IdentityArgs {
    /// Source system id
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..))]
    pub system_id: Option<u8>,

    /// Source component id
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..))]
    pub component_id: Option<u8>,
}

/// Serve command arguments
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint to listen on (falls back to `url` from the config file)
    pub url: Option<Endpoint>,

    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Drop signed frames that cannot be verified
    #[arg(long)]
    pub strict_signing: bool,

    /// Signing key as 64 hex characters
    #[arg(long, env = "MAVPING_SIGNING_KEY", hide_env_values = true)]
    pub signing_key: Option<String>,

    /// Link id for outgoing signatures
    #[arg(long)]
    pub link_id: Option<u8>,

    /// Sign outgoing replies
    #[arg(long)]
    pub sign_outgoing: bool,

    /// Warn when the peer speaks MAVLink v1 instead of skipping it silently
    #[arg(long)]
    pub allow_v1_report: bool,
}

/// Ping command arguments
#[derive(Args, Debug)]
pub struct PingArgs {
    /// Endpoint to ping through
    pub url: Endpoint,

    /// Target system id
    #[arg(value_parser = clap::value_parser!(u8).range(1..))]
    pub target_system: u8,

    /// Target component id
    #[arg(value_parser = clap::value_parser!(u8).range(1..))]
    pub target_component: u8,

    /// Number of pings to send
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u32).range(1..))]
    pub count: Option<u32>,

    /// Seconds between a reply and the next ping
    #[arg(short, long, value_parser = parse_seconds)]
    pub interval: Option<Duration>,

    /// Seconds to wait for each reply
    #[arg(short, long, value_parser = parse_seconds)]
    pub timeout: Option<Duration>,

    #[command(flatten)]
    pub identity: IdentityArgs,
}

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Output path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Completions command arguments
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}

/// Shell for completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Parse a positive, possibly fractional, number of seconds.
fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("invalid number of seconds: \"{s}\""))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("must be greater than zero: \"{s}\""));
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_command_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_ping() {
        let cli = Cli::try_parse_from([
            "mavping", "-d", "ping", "udpout:127.0.0.1:14550", "1", "1", "-c", "3", "-i", "0.5",
        ])
        .unwrap();
        assert!(cli.debug);

        let Commands::Ping(args) = cli.command else {
            panic!("expected ping");
        };
        assert_eq!(args.target_system, 1);
        assert_eq!(args.count, Some(3));
        assert_eq!(args.interval, Some(Duration::from_millis(500)));
        assert!(args.timeout.is_none());
        assert!(matches!(args.url, Endpoint::UdpOut { .. }));
    }

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from([
            "mavping",
            "serve",
            "tcpin://0.0.0.0:5760",
            "--system-id",
            "200",
            "--strict-signing",
            "--allow-v1-report",
        ])
        .unwrap();

        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.identity.system_id, Some(200));
        assert!(args.strict_signing);
        assert!(args.allow_v1_report);
        assert!(!args.sign_outgoing);
    }

    #[test]
    fn test_quick_start_pair_targets_the_responder() {
        let serve = Cli::try_parse_from(
            "mavping serve udpin://0.0.0.0:14550 --system-id 1".split_whitespace(),
        )
        .unwrap();
        let ping = Cli::try_parse_from(
            "mavping ping udpout://127.0.0.1:14550 1 1 -c 5".split_whitespace(),
        )
        .unwrap();

        let (Commands::Serve(serve), Commands::Ping(ping)) = (serve.command, ping.command) else {
            panic!("expected serve and ping");
        };
        assert_eq!(serve.identity.system_id, Some(ping.target_system));
        assert_eq!(serve.identity.component_id, None);
        assert_eq!(ping.target_component, crate::types::MAV_COMP_ID_AUTOPILOT1);
        assert_eq!(ping.count, Some(5));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from(["mavping", "ping", "udpout:h:1", "0", "1"]).is_err());
        assert!(Cli::try_parse_from(["mavping", "ping", "udpout:h:1", "1", "1", "-t", "0"]).is_err());
        assert!(Cli::try_parse_from(["mavping", "ping", "bogus://x", "1", "1"]).is_err());
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("1").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_seconds("0.25").unwrap(), Duration::from_millis(250));
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("abc").is_err());
    }
}
