use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Clone, Debug, Parser)]
#[command(name = "fetchkit", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    #[command(subcommand)]
    pub cmd: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Clone, Debug, Args)]
pub struct GlobalArgs {
    /// Request timeout in seconds.
    #[arg(long, short, global = true, default_value_t = 5.0)]
    pub timeout: f64,

    /// TOML file with client defaults.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Print the body of a URL.
    #[command(alias = "g", name = "get")]
    Get {
        url: String,
        /// Fail on 4xx/5xx statuses.
        #[arg(long)]
        fail: bool,
    },
    /// Print response headers as JSON.
    #[command(alias = "h", name = "headers")]
    Headers {
        url: String,
        /// Extra request header, `Name: value`.
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,
    },
    /// Check whether a URL allows requests from an origin.
    #[command(name = "cors")]
    Cors { url: String, origin: String },
    /// Print title, keywords and description of a site.
    #[command(name = "tdk")]
    Tdk { url: String },
    /// Print connection details of a fresh request.
    #[command(alias = "i", name = "info")]
    Info {
        url: String,
        /// Connect timeout in seconds.
        #[arg(long, default_value_t = 3.0)]
        connect_timeout: f64,
    },
    /// Download a URL into a directory under a generated name.
    #[command(alias = "s", name = "save")]
    Save {
        url: String,
        dir: PathBuf,
        /// Take an exclusive lock while writing.
        #[arg(long)]
        lock: bool,
    },
    /// Print the TLS certificate a host presents, unverified.
    #[command(name = "cert")]
    Cert {
        host: String,
        #[arg(long, default_value_t = 443)]
        port: u16,
        /// Print the whole chain instead of the leaf.
        #[arg(long)]
        chain: bool,
    },
}
