// # ddnsd - DDNS Daemon
//
// Thin integration layer: all sync logic lives in ddns-core.
//
// The ddnsd daemon is responsible for:
// 1. Parsing the command line and loading the TOML configuration
// 2. Initializing logging (console, plus a daily file when `log_dir` is set)
//    and the runtime
// 3. Building the Aliyun provider and the netlink address source
// 4. Running the sync engine until SIGTERM/SIGINT
//
// ## Configuration
//
// `ddnsd --config /etc/ddnsd/config.toml` (default `./config.toml`).
//
// Environment overrides:
// - `ALIYUN_ACCESS_KEY_ID` / `ALIYUN_ACCESS_KEY_SECRET`: credentials
// - `DOMAIN_MAP_<IFACE>`: adds `iface = domain` to the domain map
// - `DNS_RECORD_PREFIXES` / `DNS_RECORD_TYPE`: record settings
// - `DDNS_LOG_LEVEL`: log level (trace, debug, info, warn, error)
// - `RUNNING_IN_SYSTEMD=true`: log file under /var/log/ddnsd unless `log_dir` is set
//
// ## Example
//
// ```bash
// export ALIYUN_ACCESS_KEY_ID=LTAI...
// export ALIYUN_ACCESS_KEY_SECRET=...
//
// ddnsd --config ./config.toml
// ```

use anyhow::{Context, Result};
use clap::Parser;
use ddns_core::{AddressSource, DdnsConfig, DnsProvider, EngineEvent, Severity, SyncEngine};
use ddns_ip_netlink::NetlinkAddressSource;
use ddns_provider_aliyun::AliyunProvider;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{Level, debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (e.g. credentials revoked while running)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Keep Aliyun AAAA records in sync with the IPv6 addresses of local interfaces
#[derive(Debug, Parser)]
#[command(name = "ddnsd", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "./config.toml")]
    config: PathBuf,

    /// Look records up but never write them (same as `dns.dry_run = true`)
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    // Flushes the log file on drop; must outlive the runtime
    let _log_guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    info!(
        config = %cli.config.display(),
        log_dir = ?config.log_dir,
        mappings = config.domain_map.len(),
        prefixes = ?config.dns.record_prefixes,
        "Starting ddnsd daemon"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

/// Load, override and validate the configuration
fn load_config(cli: &Cli) -> Result<DdnsConfig> {
    let mut config = DdnsConfig::load(&cli.config)?;
    config.apply_env()?;
    if cli.dry_run {
        config.dns.dry_run = true;
    }
    config.validate()?;
    Ok(config)
}

/// Install the console subscriber, plus the daily file when `log_dir` is set
fn init_logging(config: &DdnsConfig) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(dir)?);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(LevelFilter::from_level(parse_level(&config.log_level)))
        .with(fmt::layer())
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    Ok(guard)
}

/// Daily rolling file `ddns.YYYY-MM-DD.log` in `dir`
fn file_appender(dir: &Path) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("ddns")
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to open log directory {}", dir.display()))
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Run the daemon
async fn run_daemon(config: DdnsConfig) -> DdnsExitCode {
    let provider = match AliyunProvider::from_config(&config) {
        Ok(provider) => provider,
        Err(e) => {
            error!(error = %e, "Failed to create Aliyun provider");
            return DdnsExitCode::ConfigError;
        }
    };

    match provider.verify_credentials().await {
        Ok(()) => info!("Aliyun credentials verified"),
        Err(e) if e.severity() == Severity::Fatal => {
            error!(error_kind = e.kind(), error = %e, "Aliyun rejected the credentials");
            return DdnsExitCode::ConfigError;
        }
        Err(e) => warn!(
            error_kind = e.kind(),
            error = %e,
            "Could not verify credentials, starting anyway"
        ),
    }

    let source = match NetlinkAddressSource::new() {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "Failed to create address source");
            return DdnsExitCode::ConfigError;
        }
    };

    run_engine(&config, Box::new(source), Box::new(provider)).await
}

/// Run the sync engine until a shutdown signal or a fatal error
async fn run_engine(
    config: &DdnsConfig,
    source: Box<dyn AddressSource>,
    provider: Box<dyn DnsProvider>,
) -> DdnsExitCode {
    let (mut engine, events) = match SyncEngine::new(source, provider, config) {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "Failed to create sync engine");
            return DdnsExitCode::ConfigError;
        }
    };

    let shutdown = CancellationToken::new();
    let signal_task = tokio::spawn(cancel_on_signal(shutdown.clone()));
    let event_task = tokio::spawn(log_events(events));

    let result = engine.run(shutdown.clone()).await;

    let signal_error = if shutdown.is_cancelled() {
        signal_task.await.ok().and_then(|outcome| outcome.err())
    } else {
        signal_task.abort();
        None
    };

    // Dropping the engine closes the event channel
    drop(engine);
    let _ = event_task.await;

    exit_code(result, signal_error)
}

fn exit_code(run: ddns_core::Result<()>, signal_error: Option<anyhow::Error>) -> DdnsExitCode {
    match (run, signal_error) {
        (Err(e), _) => {
            error!(error_kind = e.kind(), error = %e, "Daemon error");
            DdnsExitCode::RuntimeError
        }
        (Ok(()), Some(e)) => {
            error!(error = %e, "Stopped without a shutdown signal");
            DdnsExitCode::RuntimeError
        }
        (Ok(()), None) => {
            info!("Shutting down daemon");
            DdnsExitCode::CleanShutdown
        }
    }
}

/// Cancel `shutdown` on the first SIGTERM/SIGINT
///
/// A handler that cannot be installed also cancels `shutdown`, and the
/// error is returned so the exit code reports it.
async fn cancel_on_signal(shutdown: CancellationToken) -> Result<()> {
    let outcome = wait_for_shutdown().await;
    match &outcome {
        Ok(signal) => info!("Received shutdown signal: {}", signal),
        Err(e) => error!("Signal handling failed, shutting down: {}", e),
    }
    shutdown.cancel();
    outcome.map(|_| ())
}

async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!(event = ?event, "Engine event");
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;
    use std::net::Ipv6Addr;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedAddress(Ipv6Addr);

    #[async_trait::async_trait]
    impl AddressSource for FixedAddress {
        async fn read(&self, _interface: &str) -> ddns_core::Result<Ipv6Addr> {
            Ok(self.0)
        }

        fn source_name(&self) -> &'static str {
            "fixed"
        }
    }

    fn mock_config(server: &MockServer) -> DdnsConfig {
        DdnsConfig::from_toml_str(&format!(
            r#"
[credentials]
access_key_id = "LTAI5tMock"
access_key_secret = "mock-secret"

[domain_map]
eth0 = "home.example.com"

[dns]
record_prefixes = ["@"]
endpoint = "{}"
request_timeout_secs = 2
"#,
            server.uri()
        ))
        .unwrap()
    }

    fn aliyun_error(status: u16, code: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_string(format!(
            r#"{{"RequestId":"0000","Code":"{}","Message":"mocked"}}"#,
            code
        ))
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["ddnsd"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("./config.toml"));
        assert!(!cli.dry_run);
    }

    #[test]
    fn cli_flags() {
        let cli = Cli::try_parse_from(["ddnsd", "-c", "/etc/ddnsd.toml", "--dry-run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/ddnsd.toml"));
        assert!(cli.dry_run);
    }

    #[test]
    fn exit_codes_follow_convention() {
        assert_eq!(DdnsExitCode::CleanShutdown as u8, 0);
        assert_eq!(DdnsExitCode::ConfigError as u8, 1);
        assert_eq!(DdnsExitCode::RuntimeError as u8, 2);
    }

    #[test]
    fn exit_code_mapping() {
        assert_eq!(exit_code(Ok(()), None), DdnsExitCode::CleanShutdown);
        assert_eq!(
            exit_code(Err(ddns_core::Error::auth("revoked")), None),
            DdnsExitCode::RuntimeError
        );
        // A failed signal handler stops the loop; that is not a clean shutdown
        assert_eq!(
            exit_code(Ok(()), Some(anyhow::anyhow!("Failed to setup SIGTERM handler"))),
            DdnsExitCode::RuntimeError
        );
    }

    #[tokio::test]
    async fn rejected_credentials_exit_with_config_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("Action", "DescribeDomains"))
            .respond_with(aliyun_error(404, "InvalidAccessKeyId.NotFound"))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(
            run_daemon(mock_config(&server)).await,
            DdnsExitCode::ConfigError
        );
    }

    #[tokio::test]
    async fn credentials_revoked_while_running_exit_with_runtime_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("Action", "DescribeDomainRecords"))
            .respond_with(aliyun_error(403, "InvalidAccessKeyId.Inactive"))
            .expect(1)
            .mount(&server)
            .await;

        let config = mock_config(&server);
        let provider = AliyunProvider::from_config(&config).unwrap();
        let source = FixedAddress("2001:db8::1".parse().unwrap());

        let code = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            run_engine(&config, Box::new(source), Box::new(provider)),
        )
        .await
        .expect("a fatal error ends the loop");

        assert_eq!(code, DdnsExitCode::RuntimeError);
    }

    #[tokio::test]
    async fn invalid_engine_config_exits_with_config_error() {
        let server = MockServer::start().await;
        let mut config = mock_config(&server);
        let provider = AliyunProvider::from_config(&config).unwrap();
        config.domain_map.clear();

        let code = run_engine(
            &config,
            Box::new(FixedAddress("2001:db8::1".parse().unwrap())),
            Box::new(provider),
        )
        .await;

        assert_eq!(code, DdnsExitCode::ConfigError);
    }

    #[test]
    fn file_appender_writes_daily_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        let mut appender = file_appender(&logs).unwrap();
        writeln!(appender, "record synced").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&logs)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1, "{names:?}");
        assert!(names[0].starts_with("ddns.") && names[0].ends_with(".log"), "{names:?}");
    }

    #[test]
    fn log_levels() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = Cli::try_parse_from(["ddnsd", "--config", "/nonexistent/ddnsd.toml"]).unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn dry_run_flag_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[credentials]
access_key_id = "LTAI5tExample"
access_key_secret = "file-secret"

[domain_map]
eth0 = "home.example.com"
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::try_parse_from(["ddnsd", "--config", path.as_str(), "--dry-run"]).unwrap();
        let config = load_config(&cli).unwrap();

        assert!(config.dns.dry_run);
        assert_eq!(config.domain_map["eth0"], "home.example.com");
    }
}
