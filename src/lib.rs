pub mod ai;
pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod session;

use clap::Parser;

pub fn run() {
    env_logger::init();

    let cli = cli::Cli::parse();

    // Stages run strictly one after another on a single thread.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(cli::execute(cli)) {
        log::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
