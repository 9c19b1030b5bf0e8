use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tether_http::{Observe, ResponseType};

mod commands;

#[derive(Parser)]
#[command(
    name = "tether",
    about = "Issue one HTTP request and print what comes back",
    version
)]
struct Cli {
    /// Request method (GET, POST, PUT, ...)
    method: String,
    url: String,
    /// Request header, repeatable
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
    /// Parse --data as JSON instead of sending it as text
    #[arg(long)]
    json: bool,
    /// What to print: the body, the final response, or every event
    #[arg(short, long, value_enum, default_value = "body")]
    observe: ObserveArg,
    /// Response type: json, text, arraybuffer or blob
    #[arg(short = 't', long = "type", default_value = "json")]
    response_type: ResponseType,
    /// Report upload and download progress events
    #[arg(long)]
    progress: bool,
    #[arg(long)]
    with_credentials: bool,
    /// Client configuration file (tether.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ObserveArg {
    Body,
    Response,
    Events,
}

impl From<ObserveArg> for Observe {
    fn from(arg: ObserveArg) -> Self {
        match arg {
            ObserveArg::Body => Observe::Body,
            ObserveArg::Response => Observe::Response,
            ObserveArg::Events => Observe::Events,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("tether=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let args = commands::request::RequestArgs {
        method: cli.method,
        url: cli.url,
        headers: cli.headers,
        data: cli.data,
        json: cli.json,
        observe: cli.observe.into(),
        response_type: cli.response_type,
        progress: cli.progress,
        with_credentials: cli.with_credentials,
        config: cli.config,
    };
    commands::request::run(args).await
}
