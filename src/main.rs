use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use xcode_install::catalog::prerelease::ScrapedPrereleaseAdapter;
use xcode_install::catalog::session::{AuthSession, PortalSession};
use xcode_install::config::{Config, Credentials, ENV_LOG};
use xcode_install::install::command::HostCommand;
use xcode_install::install::installer::{InstallRequest, Installer};
use xcode_install::install::pipeline::InstallOptions;

#[derive(Parser)]
#[command(name = "xcversion")]
#[command(version, about = "Downloads and installs Xcode releases")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List installable versions of the latest stable major
    List {
        /// List every installable version, including betas
        #[arg(long)]
        all: bool,
    },
    /// List installed versions
    Installed,
    /// Download and install a version
    Install {
        version: String,
        /// Install from this disk image path or URL instead of the catalog
        #[arg(long)]
        url: Option<String>,
        /// Leave the active symlink and toolchain selection untouched
        #[arg(long)]
        no_switch: bool,
        /// Keep the downloaded disk image
        #[arg(long)]
        no_clean: bool,
        /// Only download the disk image
        #[arg(long)]
        no_install: bool,
        /// Hide the download progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Point the active symlink at an installed version
    Select { version: String },
    /// Show the version the active symlink points at
    Selected,
    /// Refresh the cached catalog
    Update,
}

/// Logs to stderr and, as JSON, to a file in the cache directory.
fn init_tracing(log_path: &Path) -> Option<WorkerGuard> {
    let env_filter = || {
        EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    let (file_layer, guard) = match (log_path.parent(), log_path.file_name()) {
        (Some(dir), Some(name)) if std::fs::create_dir_all(dir).is_ok() => {
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn build_installer(config: Config) -> anyhow::Result<Installer> {
    let session: Arc<dyn AuthSession> = Arc::new(PortalSession::new(
        &config.portal_url,
        &config.auth_url,
        Credentials::from_env(),
    ));
    let prereleases = Arc::new(ScrapedPrereleaseAdapter::new(session.clone()));

    Ok(Installer::new(
        config,
        session,
        prereleases,
        Arc::new(HostCommand),
    )?)
}

async fn run(command: Command, mut installer: Installer) -> anyhow::Result<()> {
    match command {
        Command::List { all } => {
            let versions = if all {
                installer.list_versions().await?
            } else {
                installer.list_current().await?
            };
            for version in versions {
                println!("{version}");
            }
        }
        Command::Installed => {
            let active = installer.symlinks_to();
            for installed in installer.installed_versions().await? {
                let marker = if active.as_deref() == Some(installed.path.as_path()) {
                    " (selected)"
                } else {
                    ""
                };
                println!("{}\t{}{}", installed.version, installed.path.display(), marker);
            }
        }
        Command::Install {
            version,
            url,
            no_switch,
            no_clean,
            no_install,
            no_progress,
        } => {
            if url.is_none() && installer.is_installed(&version).await? {
                println!("Version {version} already installed.");
                return Ok(());
            }

            let request = InstallRequest {
                version,
                url,
                install: !no_install,
                show_progress: !no_progress,
                options: InstallOptions {
                    switch: !no_switch,
                    clean: !no_clean,
                },
            };
            if let Some(report) = installer.install_version(&request).await? {
                println!(
                    "Successfully installed {} at {}",
                    report.installed.version,
                    report.installed.path.display()
                );
            }
        }
        Command::Select { version } => {
            let path = installer.select(&version).await?;
            println!("Selected {}", path.display());
        }
        Command::Selected => match installer.symlinks_to() {
            Some(path) => println!("{}", path.display()),
            None => println!("No version selected."),
        },
        Command::Update => {
            installer.update().await?;
            for version in installer.list_versions().await? {
                println!("{version}");
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();
    let _guard = init_tracing(&config.log_path());

    let installer = build_installer(config)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(run(cli.command, installer))
}
