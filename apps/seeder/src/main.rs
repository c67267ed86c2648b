use std::process::ExitCode;

mod cli;
pub(crate) mod config;

/// A fatal setup problem (no seeds, bad token, unresolvable zone) must
/// leave a non-zero exit code before the crawl loop ever starts; a clean
/// shutdown exits zero.
#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = cli::run().await {
        eprintln!("flokiseedd: {err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
