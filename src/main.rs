use clap::Parser;
use env_logger::Env;
use log::{debug, error};
use std::path::PathBuf;

use canteen_openapi::config::GeneratorConfig;

/// Generate an OpenAPI document and endpoint helpers from the JavaScript service layer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project root containing src/api and shared/api
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let env = Env::default().filter_or("RUST_LOG", if cli.verbose { "debug" } else { "info" });
    env_logger::init_from_env(env);

    let config = GeneratorConfig::for_root(&cli.root);
    debug!("Generating from {:?}", config.root);

    if let Err(err) = canteen_openapi::run(&config) {
        error!("{:?}", err);
        std::process::exit(1);
    }
}
