use anyhow::Context;
use kvsyncd::control::{ControlError, ControlRequest, send_request};
use kvsyncd::daemon::{DaemonConfig, DaemonRuntime};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run,
    SyncAll,
    SyncOne(String),
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sync-all" => mode = CliMode::SyncAll,
            "--sync" => {
                let path = args.next().context("--sync requires a document path")?;
                mode = CliMode::SyncOne(path);
            }
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        println!("Usage: kvsyncd [--sync-all | --sync <path>]");
        println!("  --sync-all      Reconcile every document once and exit");
        println!("  --sync <path>   Reconcile one document once and exit");
        println!("Both are handed to a running kvsyncd when one is listening.");
        return Ok(());
    }

    let config = DaemonConfig::from_env()?;
    let request = match mode {
        CliMode::SyncAll => ControlRequest::SyncAll,
        CliMode::SyncOne(path) => ControlRequest::SyncOne { path },
        CliMode::Run | CliMode::Help => {
            return DaemonRuntime::bootstrap(config).await?.run().await;
        }
    };

    // A running daemon owns the cache; hand the request to it.
    let response = match send_request(&config.control_socket_path(), &request).await {
        Ok(response) => response,
        Err(ControlError::Connect { .. }) => {
            let daemon = DaemonRuntime::bootstrap(config).await?;
            daemon.handle().respond(request).await
        }
        Err(err) => return Err(err.into()),
    };
    anyhow::ensure!(response.ok, "{}", response.message);
    println!("{}", response.message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parse_cli_mode_defaults_to_run() {
        let mode = parse_cli_mode(args(&["kvsyncd"])).unwrap();
        assert_eq!(mode, CliMode::Run);
    }

    #[test]
    fn parse_cli_mode_supports_sync_all() {
        let mode = parse_cli_mode(args(&["kvsyncd", "--sync-all"])).unwrap();
        assert_eq!(mode, CliMode::SyncAll);
    }

    #[test]
    fn parse_cli_mode_supports_single_document() {
        let mode = parse_cli_mode(args(&["kvsyncd", "--sync", "blog/post.md"])).unwrap();
        assert_eq!(mode, CliMode::SyncOne("blog/post.md".into()));
        assert!(parse_cli_mode(args(&["kvsyncd", "--sync"])).is_err());
    }

    #[test]
    fn parse_cli_mode_supports_help() {
        let mode = parse_cli_mode(args(&["kvsyncd", "--help"])).unwrap();
        assert_eq!(mode, CliMode::Help);
    }

    #[test]
    fn parse_cli_mode_rejects_unknown_flags() {
        assert!(parse_cli_mode(args(&["kvsyncd", "--logout"])).is_err());
    }
}
