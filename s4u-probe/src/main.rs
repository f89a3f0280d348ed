//! s4u-probe - Kerberos constrained delegation diagnostic

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use s4u_probe::config::{Overrides, Settings};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Exercise S4U2Self + S4U2Proxy against a database
#[derive(Parser, Debug)]
#[command(name = "s4u-probe")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the probe settings
    #[arg(short, long, env = "S4U_PROBE_CONFIG", default_value = "s4u-probe.toml")]
    config: PathBuf,

    /// Keytab of the service principal
    #[arg(long, env = "S4U_PROBE_KEYTAB")]
    keytab: Option<PathBuf>,

    /// Kerberos realm configuration (krb5.conf)
    #[arg(long, env = "S4U_PROBE_KRB5_CONF")]
    krb5_conf: Option<PathBuf>,

    /// Login profiles file
    #[arg(long, env = "S4U_PROBE_LOGIN_CONFIG")]
    login_config: Option<PathBuf>,

    /// Login profile to use
    #[arg(short, long, env = "S4U_PROBE_PROFILE")]
    profile: Option<String>,

    /// Trace the Kerberos library to stderr
    #[arg(long, env = "S4U_PROBE_DEBUG")]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "S4U_PROBE_LOG", default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            keytab: self.keytab.clone(),
            krb5_conf: self.krb5_conf.clone(),
            login_config: self.login_config.clone(),
            profile: self.profile.clone(),
            debug: self.debug,
        }
    }
}

#[cfg(feature = "oracle")]
fn probe(settings: &Settings) -> Result<()> {
    use s4u_probe::downstream::oracle::OracleClient;
    use s4u_probe::security::GssSubsystem;
    use std::io::Write;

    let security = GssSubsystem::new(&settings.krb5_conf, settings.debug);
    let client = OracleClient::new(security.krb5_conf());
    let stdout = io::stdout();
    let mut out = stdout.lock();
    s4u_probe::workflow::run(settings, &security, &client, &mut out)?;
    out.flush()?;
    Ok(())
}

#[cfg(not(feature = "oracle"))]
fn probe(_settings: &Settings) -> Result<()> {
    anyhow::bail!("built without a database client, enable the `oracle` feature")
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let result = Settings::load(&cli.config, cli.overrides())
        .with_context(|| format!("loading {}", cli.config.display()))
        .and_then(|settings| probe(&settings));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
