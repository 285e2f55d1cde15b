mod commands;
pub mod core;

pub use commands::{Cli, Command, GlobalOptions};

use tracing_subscriber::EnvFilter;

/// Structured logging to stderr; `RUST_LOG` wins over `--debug`.
pub fn init_tracing(debug: bool) {
    let fallback = if debug {
        "info,modpack_installer_lib=debug"
    } else {
        "info"
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .try_init();
}

/// Execute a parsed command line and return the process exit code.
pub async fn run(cli: Cli) -> i32 {
    init_tracing(cli.global.debug);

    let state = match commands::build_state(&cli.global) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("{}", e);
            return e.exit_code();
        }
    };

    match commands::execute(cli.command, &state).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{}", e);
            e.exit_code()
        }
    }
}
