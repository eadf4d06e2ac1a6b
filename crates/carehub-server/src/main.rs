use carehub_server::ServerBuilder;
use carehub_server::config::loader::load_config;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "carehub-server", version, about = "CareHub auth server")]
struct Args {
    /// Path to the configuration file (defaults to carehub.toml when present)
    #[arg(long, env = "CAREHUB_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    carehub_server::observability::init_tracing();

    let args = Args::parse();

    let cfg = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = args.config.as_deref().unwrap_or("carehub.toml"),
        "Configuration loaded"
    );
    carehub_server::observability::apply_logging_level(&cfg.logging.level);

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}
