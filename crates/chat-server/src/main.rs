use std::process::ExitCode;

use chat_server::config::{self, Cli, Command};
use chat_server::{AppError, ask, observability, server};
use clap::Parser;
use tracing::error;

fn main() -> ExitCode {
    config::load_dotenv();
    let cli = Cli::parse();
    observability::init_observability();

    let result = match cli.command {
        Command::Serve(config) => serve(config),
        Command::Ask(config) => ask::run(&config, &mut std::io::stdout().lock()).map(|_| ()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "chat-server failed");
            eprintln!("chat-server: {err}");
            ExitCode::FAILURE
        }
    }
}

fn serve(config: config::ServerConfig) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server::serve(config))
}
