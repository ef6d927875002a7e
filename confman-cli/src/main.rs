#[macro_use]
extern crate log;

use clap::Parser;

mod cli;
mod commands;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = cli::Cli::parse();
    debug!("{cli:?}");
    commands::run(cli)
}
