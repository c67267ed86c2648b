mod actions;
mod arguments;
mod seeder;
use clap::Parser;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub enum Cli {
    /// Run the crawler and keep the seed hostname's records fresh
    Run(arguments::Run),
    /// Apply ad-hoc A-record changes to the seed hostname
    Records(arguments::Records),
}

impl Cli {
    pub async fn exec(self) -> eyre::Result<()> {
        match self {
            Self::Run(args) => actions::run(args).await,
            Self::Records(args) => actions::records(args).await,
        }
    }
}

pub async fn run() -> eyre::Result<()> {
    Cli::parse().exec().await
}
