//! Runs the parsed command.
mod serve;
mod subscribe;

use crate::args::{AppOpts, Commands};
use color_eyre::eyre::Result;

pub struct App {
    opts: AppOpts,
}

impl App {
    pub fn new(opts: AppOpts) -> Self {
        Self { opts }
    }

    pub async fn run(self) -> Result<()> {
        match self.opts.cmd {
            Commands::Serve(opts) => serve::run(opts).await,
            Commands::Subscribe(opts) => subscribe::run(opts).await,
        }
    }
}
