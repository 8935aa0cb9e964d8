//! App Argument Options
use clap::{Args, Parser, Subcommand, ValueEnum};
use livecursor_common::logging::LogFormat;

/// Serve and subscribe to live row sources
#[derive(Parser, Debug)]
#[command(name = "livecursor", version)]
pub struct AppOpts {
    #[command(subcommand)]
    pub cmd: Commands,
    #[command(flatten)]
    pub log: LogOptions,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Serve(Serve),
    Subscribe(Subscribe),
}

#[derive(Args, Debug)]
pub struct LogOptions {
    /// Level for livecursor crates. `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "info", env = "LIVECURSOR_LOG")]
    pub log_level: String,
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> LogFormat {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Expose an in-memory source over TCP
#[derive(Args, Debug, Clone)]
pub struct Serve {
    /// Address to listen on
    #[arg(long, short, default_value = "127.0.0.1:4100", env = "LIVECURSOR_LISTEN")]
    pub listen: String,
    /// Name of the source behind the server
    #[arg(long, default_value = "memory://vehicles")]
    pub name: String,
    /// Pre-existing records to seed the source with
    #[arg(long, default_value_t = 0)]
    pub seed: usize,
    /// Publish a synthetic vehicle every N milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,
    /// Remove a random vehicle every N published ones
    #[arg(long)]
    pub delete_every: Option<u64>,
    #[arg(long, default_value_t = 15_000)]
    pub heartbeat_ms: u64,
}

/// Print rows from a remote source
#[derive(Args, Debug, Clone)]
pub struct Subscribe {
    #[arg(long, short, default_value = "tcp://127.0.0.1:4100", env = "LIVECURSOR_URL")]
    pub url: String,
    /// Attribute filter passed to the source, e.g. "type = 'X'"
    #[arg(long, short)]
    pub filter: Option<String>,
    /// Receive matching pre-existing rows before live ones
    #[arg(long)]
    pub replay: bool,
    /// Seconds to wait for each batch before giving up
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Stop after this many rows
    #[arg(long)]
    pub max_rows: Option<u64>,
    /// Reopen the subscription after a connection failure or fault
    #[arg(long)]
    pub reconnect: bool,
    #[arg(long, default_value_t = 5)]
    pub max_retries: usize,
    /// Print rows as JSON lines
    #[arg(long)]
    pub json: bool,
    /// Batches buffered between the connection and the printer
    #[arg(long, default_value_t = livecursor_common::DEFAULT_BATCH_BUFFER)]
    pub buffer: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subscribe() {
        let opts = AppOpts::try_parse_from([
            "livecursor",
            "subscribe",
            "--filter",
            "type = 'X'",
            "--replay",
            "--timeout",
            "2",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(opts.log.log_format, LogFormatArg::Json);
        let Commands::Subscribe(sub) = opts.cmd else {
            panic!("expected subscribe");
        };
        assert_eq!(sub.filter.as_deref(), Some("type = 'X'"));
        assert!(sub.replay);
        assert_eq!(sub.timeout, Some(2));
        assert!(!sub.reconnect);
    }

    #[test]
    fn parses_serve() {
        let opts =
            AppOpts::try_parse_from(["livecursor", "serve", "--seed", "3", "--interval-ms", "250"])
                .unwrap();
        let Commands::Serve(serve) = opts.cmd else {
            panic!("expected serve");
        };
        assert_eq!(serve.seed, 3);
        assert_eq!(serve.interval_ms, Some(250));
        assert_eq!(serve.name, "memory://vehicles");
    }
}
