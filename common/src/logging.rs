use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter enabling `level` for every crate in this workspace.
pub fn filter_directive(level: &str) -> EnvFilter {
    let filter = format!(
        "livecursor={level},livecursor_proto={level},\
        livecursor_common={level},livecursor_api_ndjson={level},\
        livecursor_cli={level}"
    );
    EnvFilter::builder().parse_lossy(filter)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global subscriber for a binary.
///
/// `RUST_LOG` wins over `level` when it is set.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directive) => EnvFilter::builder().parse_lossy(directive),
        Err(_) => filter_directive(level),
    };
    let registry = tracing_subscriber::registry().with(filter);
    let res = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    if let Err(e) = res {
        eprintln!("logger already initialized: {e}");
    }
}
