use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Args, Subcommand};

#[derive(Args)]
pub struct Run {
    /// Path to the TOML configuration file
    #[clap(long, short, default_value = "seeder.toml")]
    pub config: PathBuf,
}

#[derive(Args)]
pub struct Records {
    /// Path to the TOML configuration file
    #[clap(long, short, default_value = "seeder.toml")]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: RecordCommand,
}

#[derive(Subcommand)]
pub enum RecordCommand {
    /// Publish A records for the given addresses
    Add { ips: Vec<Ipv4Addr> },
    /// Retire A records for the given addresses
    Delete { ips: Vec<Ipv4Addr> },
}
