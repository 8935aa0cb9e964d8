mod app;
mod args;
mod feed;

use clap::Parser;
use color_eyre::eyre::Result;

#[macro_use]
extern crate tracing;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = args::AppOpts::parse();
    livecursor_common::logging::init_logging(&opts.log.log_level, opts.log.log_format.into());

    app::App::new(opts).run().await
}
