// src/main.rs

use std::process::ExitCode;

use roomboot::supervisor::EXIT_ERROR;
use roomboot::{cli, logging, run};

#[tokio::main]
async fn main() -> ExitCode {
    match run_main().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("roomboot error: {err:?}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn run_main() -> anyhow::Result<u8> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
