use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use fetchkit_http::{ClientDefaults, HttpClient, Remote};

use crate::cli::{App, Commands};

mod cli;
mod trc;

fn seconds(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid duration `{value}`"))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("header `{raw}` is not in `Name: value` form"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

fn run(app: App) -> Result<()> {
    if let Some(path) = &app.global.config {
        let defaults = ClientDefaults::load(path).with_context(|| format!("loading {}", path.display()))?;
        tracing::debug!(path = %path.display(), ?defaults, "loaded client defaults");
        ClientDefaults::set_global(defaults);
    }
    let timeout = seconds(app.global.timeout)?;
    execute(app.cmd, &Remote::new(), timeout)
}

fn execute(cmd: Commands, remote: &Remote, timeout: Duration) -> Result<()> {
    match cmd {
        Commands::Get { url, fail } => {
            let mut client = HttpClient::new();
            let response = client.timeout(timeout).get(&url, ())?;
            if fail {
                response.throw()?;
            }
            print!("{response}");
        }
        Commands::Headers { url, headers } => {
            let headers = headers.iter().map(|h| parse_header(h)).collect::<Result<Vec<_>>>()?;
            print_json(&remote.get_headers(&url, headers, timeout)?)?;
        }
        Commands::Cors { url, origin } => {
            let allowed = remote.check_cors(&url, &origin, timeout)?;
            println!("{allowed}");
            if !allowed {
                bail!("{url} does not allow requests from {origin}");
            }
        }
        Commands::Tdk { url } => match remote.get_tdk(&url, timeout) {
            Some(info) => print_json(&info)?,
            None => bail!("no page metadata for {url}"),
        },
        Commands::Info { url, connect_timeout } => match remote.get_info(&url, seconds(connect_timeout)?, timeout) {
            Some(info) => print_json(&info)?,
            None => bail!("could not connect to {url}"),
        },
        Commands::Save { url, dir, lock } => {
            let path = remote.save_remote_file_as(&url, &dir, 0o755, lock)?;
            println!("{}", path.display());
        }
        Commands::Cert { host, port, chain } => {
            let certs = remote
                .get_ssl_cert_chain(&host, port, timeout)
                .ok_or_else(|| anyhow!("no certificate from {host}:{port}"))?;
            if chain {
                print_json(&certs)?;
            } else if let Some(leaf) = certs.first() {
                print_json(leaf)?;
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    trc::init().context("initializing logging")?;
    run(App::parse())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use clap::CommandFactory;
    use fetchkit_http::{RawResponse, TransportError, TransportRequest};
    use http::StatusCode;

    #[test]
    fn test_cli_definition() { App::command().debug_assert(); }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("X-A: 1").unwrap(), ("X-A".to_string(), "1".to_string()));
        assert!(parse_header("nope").is_err());
    }

    fn cors_remote(allow: &'static str) -> Remote {
        Remote::new().with_transport(Arc::new(move |_req: TransportRequest| -> Result<RawResponse, TransportError> {
            Ok(RawResponse::new(StatusCode::OK, "").with_header("Access-Control-Allow-Origin", allow))
        }))
    }

    #[test]
    fn test_cors_denied_is_error() {
        let cmd = || Commands::Cors { url: "https://api.test/".into(), origin: "https://app.test".into() };
        let timeout = Duration::from_secs(1);

        assert!(execute(cmd(), &cors_remote("https://app.test"), timeout).is_ok());
        let err = execute(cmd(), &cors_remote("https://other.test"), timeout).unwrap_err();
        assert!(err.to_string().contains("does not allow requests from https://app.test"));
    }

    #[test]
    fn test_cert_without_chain_is_error() {
        let remote = Remote::new().with_cert_source(|_, _, _| Err(TransportError::Timeout));
        let cmd = Commands::Cert { host: "down.test".into(), port: 443, chain: false };
        assert!(execute(cmd, &remote, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_global_timeout_after_subcommand() {
        let app = App::try_parse_from(["fetchkit", "get", "https://example.test", "--timeout", "2.5"]).unwrap();
        assert_eq!(app.global.timeout, 2.5);
        assert!(matches!(app.cmd, Commands::Get { fail: false, .. }));
    }
}
