use clap::Parser;
use modpack_installer_lib::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = modpack_installer_lib::run(cli).await;
    std::process::exit(code);
}
