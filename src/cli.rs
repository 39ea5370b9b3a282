//! Command-line interface

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sifthub-reporting-worker")]
#[command(about = "Report export worker for the SiftHub analytics platform")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start consuming export jobs from the queue (default)
    Serve,
}
