use clap::Parser;
use sonare::geo::IpApiLocator;
use sonare::middleware::SecurityHeaders;
use sonare::mode::RunMode;
use sonare::privilege::SudoElevator;
use sonare::server::{AppState, create_app, shutdown_signal};
use sonare::store::SqliteStore;
use sonare::tls::TlsPaths;
use sonare::topology::{ServerSet, plan};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    name = "sonare",
    version,
    about = "Sonare",
    long_about = "Sonare — marketing site backend: static site, lead capture, request analytics"
)]
struct Cli {
    /// 🧭 Run mode: serve-test, serve-http, serve-cfd, serve-prod or view (aliases: test/http/cfd/prod/tui)
    #[arg(long, short = 'm', env = "SONARE_MODE", default_value = "serve-test")]
    mode: RunMode,

    /// 🚪 TCP port for the single-listener modes (test/http/cfd)
    #[arg(long, short = 'p', env = "PORT", default_value_t = 8080)]
    port: u16,

    /// 🗄️ Path to the SQLite database
    #[arg(long, env = "SONARE_DB", default_value = "sonare.db")]
    db: PathBuf,

    /// 📁 Directory served as the static site; previews live in <web-root>/music
    #[arg(long = "web-root", env = "SONARE_WEB_ROOT", default_value = "web")]
    web_root: PathBuf,

    /// 🔐 TLS certificate (PEM) for serve-test and serve-prod
    #[arg(long, env = "SONARE_TLS_CERT", default_value = "certs/server.crt")]
    cert: PathBuf,

    /// 🔑 TLS private key (PEM) for serve-test and serve-prod
    #[arg(long, env = "SONARE_TLS_KEY", default_value = "certs/server.key")]
    key: PathBuf,

    /// 📝 Log file, appended to alongside stdout
    #[arg(long = "log-file", env = "SONARE_LOG_FILE", default_value = "server.log")]
    log_file: PathBuf,
}

impl Cli {
    /// Flags that reproduce this configuration in a relaunched process,
    /// whether each value came from the command line or the environment.
    fn relaunch_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--mode".into(),
            self.mode.as_str().into(),
            "--port".into(),
            self.port.to_string().into(),
        ];
        for (flag, path) in [
            ("--db", &self.db),
            ("--web-root", &self.web_root),
            ("--cert", &self.cert),
            ("--key", &self.key),
            ("--log-file", &self.log_file),
        ] {
            args.push(flag.into());
            args.push(path.clone().into_os_string());
        }
        args
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    pid1::relaunch_if_pid1()?;

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    // Invalid modes are rejected here, before anything is opened or bound
    let cli = Cli::parse();
    let mode = cli.mode;

    let _log_guard = sonare::telemetry::init_tracing(&cli.log_file);

    info!(
        %mode,
        version = env!("CARGO_PKG_VERSION"),
        git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        "Starting sonare"
    );

    let tls = TlsPaths::new(&cli.cert, &cli.key);
    if mode.requires_tls() {
        tls.verify().inspect_err(|err| {
            error!(%err, "TLS setup error (use --mode serve-http for HTTP-only)");
        })?;
    }

    if mode == RunMode::Production {
        let outcome = sonare::privilege::relaunch_if_unprivileged(
            mode,
            sonare::privilege::is_privileged(),
            &sonare::privilege::current_program(),
            &cli.relaunch_args(),
            &SudoElevator::new(),
        )?;
        // Returning, rather than exiting, lets the log writer flush.
        if let Some(status) = outcome.exit_status() {
            return Ok(ExitCode::from(status));
        }
    }

    let store = SqliteStore::open(&cli.db).await?;

    if mode == RunMode::View {
        let result = sonare::viewer::run(&store, &mut std::io::stdout().lock()).await;
        store.close().await;
        result?;
        return Ok(ExitCode::SUCCESS);
    }

    if mode == RunMode::TunnelOrigin {
        info!("'serve-cfd' is kept for tunnel deployments; it serves exactly like 'serve-http'");
    }

    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(IpApiLocator::new()),
        cli.web_root.clone(),
    );
    let app = create_app(
        state,
        SecurityHeaders {
            hsts: mode.requires_tls(),
        },
    );

    let servers = ServerSet::start(plan(mode, cli.port, app), &tls)
        .await
        .inspect_err(|err| error!(%err, "Failed to start listeners"))?;

    info!(%mode, listeners = servers.len(), "Server started");

    servers.run_until(shutdown_signal()).await;

    store.close().await;
    info!("Server stopped: clean exit");

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved_from_environment() -> Cli {
        Cli {
            mode: RunMode::Production,
            port: 9443,
            db: PathBuf::from("/var/lib/sonare/sonare.db"),
            web_root: PathBuf::from("/srv/sonare/web"),
            cert: PathBuf::from("/etc/sonare/server.crt"),
            key: PathBuf::from("/etc/sonare/server.key"),
            log_file: PathBuf::from("/var/log/sonare.log"),
        }
    }

    #[test]
    fn relaunch_args_reproduce_the_resolved_config() {
        let parent = resolved_from_environment();

        let mut argv = vec![OsString::from("sonare")];
        argv.extend(parent.relaunch_args());
        let child = Cli::try_parse_from(argv).unwrap();

        assert_eq!(child.mode, RunMode::Production);
        assert_eq!(child.port, parent.port);
        assert_eq!(child.db, parent.db);
        assert_eq!(child.web_root, parent.web_root);
        assert_eq!(child.cert, parent.cert);
        assert_eq!(child.key, parent.key);
        assert_eq!(child.log_file, parent.log_file);
    }

    #[test]
    fn relaunch_args_use_the_canonical_mode_name() {
        let args = resolved_from_environment().relaunch_args();
        assert_eq!(&args[..2], &[OsString::from("--mode"), OsString::from("serve-prod")]);
    }
}
