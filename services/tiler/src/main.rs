//! Tiler binary.
//!
//! Turns a continuous-value GeoTIFF into a colorized, alpha-masked
//! `{z}/{x}/{y}.png` tile tree in web mercator.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use tiler::cli::{self, Args};

fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            std::process::exit(1);
        }
    };

    let code = match runtime.block_on(cli::run(args)) {
        Ok(summary) => {
            info!(
                tiles = summary.write.tiles_written,
                bytes = summary.write.bytes_written,
                output = %summary.write.root.display(),
                elapsed_ms = summary.stats.elapsed.as_millis() as u64,
                "Done"
            );
            0
        }
        Err(err) => {
            let code = cli::exit_code(&err);
            error!(
                stage = cli::error_stage(&err),
                exit_code = code,
                "{:#}",
                err
            );
            code
        }
    };

    // A timed-out warp may still occupy a blocking thread; do not wait for it
    std::process::exit(code);
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
