//! reconcile - converge lab VMs to the desired per-student count.

use std::io;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use labctl::commands::{Cli, LogFormat};
use labctl::config::Config;
use labctl::error;

fn init_tracing(format: LogFormat, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match Config::load(cli.config.as_deref()) {
        Ok(config) => {
            init_tracing(cli.log_format, config.log_level.as_deref().unwrap_or("warn"));
            cli.run(config).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error::print_error(&e);
        std::process::exit(error::exit_code(&e));
    }
}
