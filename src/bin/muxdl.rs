use std::env;
use std::path::PathBuf;

use muxdl::AppConfig;

fn print_usage() {
    eprintln!("Usage: muxdl [OPTIONS] <manifest.json>...");
    eprintln!("       muxdl --api [--api-host <HOST>] [--api-port <PORT>]");
    eprintln!();
    eprintln!("Modes:");
    eprintln!("  (default)           Download every manifest with progress bars");
    eprintln!("  --api               Serve the HTTP/WebSocket API until Ctrl-C");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <FILE>     Config file (default: $MUXDL_CONFIG or <config dir>/muxdl/config.toml)");
    eprintln!("  --api-host <HOST>   API bind address (default from config: 127.0.0.1)");
    eprintln!("  --api-port <PORT>   API port (default from config: 9724)");
    eprintln!("  -h, --help          Show this help");
}

fn require_value(args: &[String], i: usize, flag: &str) -> String {
    if let Some(value) = args.get(i) {
        value.clone()
    } else {
        eprintln!("Error: {flag} requires a value");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() -> muxdl::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut api = false;
    let mut api_host = None;
    let mut api_port = None;
    let mut config_path = None;
    let mut manifests = Vec::new();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "--api" => api = true,
            "--api-host" => {
                i += 1;
                api_host = Some(require_value(&args, i, "--api-host"));
            }
            "--api-port" => {
                i += 1;
                let raw = require_value(&args, i, "--api-port");
                let Ok(port) = raw.parse::<u16>() else {
                    eprintln!("Error: invalid port {raw}");
                    std::process::exit(1);
                };
                api_port = Some(port);
            }
            "--config" => {
                i += 1;
                config_path = Some(PathBuf::from(require_value(&args, i, "--config")));
            }
            flag if flag.starts_with('-') => {
                eprintln!("Error: unknown option {flag}");
                print_usage();
                std::process::exit(1);
            }
            manifest => manifests.push(PathBuf::from(manifest)),
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => AppConfig::load_from(&path)?,
        None => AppConfig::load()?,
    };
    if let Some(host) = api_host {
        config.api.host = host;
    }
    if let Some(port) = api_port {
        config.api.port = port;
    }

    if api {
        #[cfg(feature = "api")]
        {
            return muxdl::api::run_server(config).await;
        }
        #[cfg(not(feature = "api"))]
        {
            eprintln!("API support not compiled in");
            std::process::exit(1);
        }
    }

    if manifests.is_empty() {
        print_usage();
        std::process::exit(2);
    }

    #[cfg(feature = "cli")]
    {
        if !muxdl::cli::run(config, manifests).await? {
            std::process::exit(1);
        }
        Ok(())
    }
    #[cfg(not(feature = "cli"))]
    {
        let _ = (config, manifests);
        eprintln!("CLI support not compiled in");
        std::process::exit(1);
    }
}
