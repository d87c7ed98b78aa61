use clap::{Arg, Command};
use log::LevelFilter;
use std::process;
use std::sync::Arc;
use tlp_guard::{ApiServer, Classification, ClassificationService, Config, EwsClient};

#[tokio::main]
async fn main() {
    let matches = Command::new("tlp-guard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Attachment classification backend for the TLP mail add-in")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/tlp-guard.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("classify-file")
                .long("classify-file")
                .value_name("FILE")
                .help("Classify a local document and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .value_name("ADDR")
                .help("Override the configured listen address"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    // Initialize logger based on verbose flag
    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let config_path = matches.get_one::<String>("config").unwrap();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    if let Some(file) = matches.get_one::<String>("classify-file") {
        classify_local_file(file);
        return;
    }

    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if let Some(listen) = matches.get_one::<String>("listen") {
        config.listen_addr = listen.clone();
    }

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    log::info!("Starting tlp-guard...");

    let source = match EwsClient::new(config.fetch_timeout_seconds) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("Error creating EWS client: {e}");
            process::exit(1);
        }
    };

    let service = Arc::new(ClassificationService::new(source));
    let server = Arc::new(ApiServer::new(service, &config));

    if let Err(e) = server.run(&config.listen_addr).await {
        log::error!("Server error: {e}");
        process::exit(1);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();
    println!("Listen address: {}", config.listen_addr);
    println!("Max concurrent requests: {}", config.max_concurrent_requests);
    println!("Fetch timeout: {}s", config.fetch_timeout_seconds);
    println!("Max request size: {} bytes", config.max_request_bytes);
    println!("Allowed origin: {}", config.allowed_origin);

    if let Err(e) = config.listen_addr.parse::<std::net::SocketAddr>() {
        println!("❌ Invalid listen address: {e}");
        process::exit(1);
    }
    if config.max_concurrent_requests == 0 {
        println!("❌ max_concurrent_requests must be at least 1");
        process::exit(1);
    }

    println!("✅ Configuration validated");
}

fn classify_local_file(path: &str) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {path}: {e}");
            process::exit(1);
        }
    };

    match tlp_guard::service::classify_document(bytes) {
        Ok(Classification::None) => println!("{path}: no classification marking"),
        Ok(level) => println!("{path}: {}", level.label()),
        Err(e) => {
            eprintln!("{path}: not classifiable: {e}");
            process::exit(1);
        }
    }
}
