use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use tokio::sync::mpsc;

mod channel;
mod download;
mod engine;
mod env;
mod error;
mod networking;
mod storage;
mod updater;
mod util;

use channel::{Channel, ChannelResolver, InstalledVersion, PreferenceStore, RemoteState};
use download::DownloadService;
use download::destination::Downloads;
use download::dispatch::{
    ActionDispatcher, Feedback, FlowHandoff, NotificationAction, NotificationActionSet,
};
use download::subject::{Configuration, FlashSlot, SourceRef};
use engine::models::ModuleDescriptor;
use engine::state::AppState;
use engine::{DownloadRequest, UpdateEngine};
use networking::NetworkClient;
use storage::{LocalState, Preferences, StorageManager};
use updater::UpdateStatus;

#[derive(Parser, Debug)]
#[command(
    name = "magisk-dl",
    author,
    version,
    about = "Fetch Magisk builds and modules from release channels"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the configured channel and report available updates.
    Check {
        /// Version code of the manager build to compare against.
        #[arg(long)]
        manager_version_code: Option<i64>,
    },
    /// Show or change the update channel.
    Channel {
        #[command(subcommand)]
        action: ChannelAction,
    },
    /// Record the version code of the Magisk build installed on this device.
    Installed { version_code: i64 },
    /// Download an artifact and run its follow-up action.
    Download {
        #[command(subcommand)]
        target: DownloadTarget,
        /// Open the downloaded file once it has been saved.
        #[arg(long, global = true)]
        open: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ChannelAction {
    Show,
    Set {
        channel: Channel,
        /// Manifest URL, required for the custom channel.
        #[arg(long)]
        url: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum DownloadTarget {
    /// The Magisk build advertised by the current channel.
    Magisk(ConfigurationArgs),
    Module {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        version_code: i64,
        #[arg(long)]
        zip_url: String,
        #[command(flatten)]
        configuration: ConfigurationArgs,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ConfigurationKind {
    Download,
    Uninstall,
    Flash,
    FlashSecondary,
    Patch,
}

#[derive(Args, Debug)]
struct ConfigurationArgs {
    #[arg(long = "config", value_enum, default_value_t = ConfigurationKind::Download)]
    kind: ConfigurationKind,
    /// Boot image to patch (only with `--config patch`).
    #[arg(long)]
    source: Option<String>,
}

impl ConfigurationArgs {
    fn into_configuration(self) -> Result<Configuration, String> {
        Ok(match self.kind {
            ConfigurationKind::Download => Configuration::Download,
            ConfigurationKind::Uninstall => Configuration::Uninstall,
            ConfigurationKind::Flash => Configuration::Flash(FlashSlot::Primary),
            ConfigurationKind::FlashSecondary => Configuration::Flash(FlashSlot::Secondary),
            ConfigurationKind::Patch => {
                let source = self
                    .source
                    .ok_or("--config patch needs --source <boot image>")?;
                Configuration::Patch(SourceRef(source))
            }
        })
    }
}

/// Flow entry points live outside this tool; tell the user what comes next.
struct ConsoleFlows;

impl FlowHandoff for ConsoleFlows {
    fn uninstall(&self, file: &Path) {
        info!("flow: uninstall with {}", file.display());
        println!("Ready to uninstall using {}", file.display());
    }

    fn patch(&self, file: &Path, source: &SourceRef) {
        info!("flow: patch {} with {}", source.0, file.display());
        println!("Ready to patch {} using {}", source.0, file.display());
    }

    fn flash(&self, file: &Path, secondary: bool) {
        let slot = if secondary { "inactive" } else { "current" };
        info!("flow: flash {} to {slot} slot", file.display());
        println!("Ready to flash {} to the {slot} slot", file.display());
    }

    fn install_module(&self, file: &Path) {
        info!("flow: install module {}", file.display());
        println!("Ready to install module {}", file.display());
    }
}

struct ConsoleFeedback {
    open: bool,
}

impl Feedback for ConsoleFeedback {
    fn toast(&self, message: &str) {
        println!("{message}");
    }

    fn notify_finished(&self, title: &str, actions: &NotificationActionSet) {
        println!("{title} downloaded");
        if actions.is_empty() {
            return;
        }
        for action in actions.iter() {
            println!("  - {}", action.label());
        }
        if !self.open {
            return;
        }
        let target = actions.iter().find_map(|action| match action {
            NotificationAction::OpenFile(path) => Some(path),
            NotificationAction::OpenFolder(_) | NotificationAction::Resume(_) => None,
        });
        if let Some(path) = target
            && let Err(err) = open::that(path)
        {
            warn!("feedback: unable to open {}: {err}", path.display());
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let storage = StorageManager::new();
    let prefs = Arc::new(
        Preferences::open_default()
            .await
            .map_err(|e| format!("unable to load preferences: {e}"))?,
    );

    match cli.command {
        Command::Channel { action } => channel_command(&prefs, action).await,
        Command::Installed { version_code } => storage
            .write_local_state(&LocalState { version_code })
            .await
            .map_err(|e| e.to_string()),
        Command::Check {
            manager_version_code,
        } => {
            let mut engine = build_engine(&storage, prefs, false);
            let (tx, _rx) = mpsc::unbounded_channel();
            let status = engine
                .check_for_updates(manager_version_code, &tx)
                .await
                .map_err(|e| e.to_string())?;
            match status {
                UpdateStatus::UpToDate => println!("Everything is up to date"),
                UpdateStatus::ManagerUpdate {
                    latest_version,
                    url,
                } => println!("Manager {latest_version} is available: {url}"),
                UpdateStatus::MagiskUpdate {
                    latest_version,
                    url,
                } => println!("Magisk {latest_version} is available: {url}"),
            }
            Ok(())
        }
        Command::Download { target, open } => {
            let request = match target {
                DownloadTarget::Magisk(args) => DownloadRequest::Magisk(args.into_configuration()?),
                DownloadTarget::Module {
                    name,
                    version,
                    version_code,
                    zip_url,
                    configuration,
                } => DownloadRequest::Module {
                    configuration: configuration.into_configuration()?,
                    module: ModuleDescriptor {
                        name,
                        version,
                        version_code,
                        zip_url,
                    },
                },
            };
            let mut engine = build_engine(&storage, prefs, open);
            let (tx, rx) = mpsc::unbounded_channel();
            let renderer = tokio::spawn(render_progress(rx));
            let result = engine.download(request, &tx).await;
            drop(tx);
            let _ = renderer.await;
            result.map(|_| ()).map_err(|e| e.to_string())
        }
    }
}

async fn channel_command(prefs: &Preferences, action: ChannelAction) -> Result<(), String> {
    match action {
        ChannelAction::Show => {
            let channel = prefs.channel().await;
            match channel {
                Channel::Custom => println!("{channel} ({})", prefs.custom_url().await),
                _ => println!("{channel}"),
            }
            Ok(())
        }
        ChannelAction::Set { channel, url } => {
            if channel == Channel::Custom && url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                return Err("the custom channel needs --url".into());
            }
            prefs
                .select_channel(channel, url.as_deref())
                .await
                .map_err(|e| e.to_string())?;
            println!("Update channel set to {channel}");
            Ok(())
        }
    }
}

fn build_engine(storage: &StorageManager, prefs: Arc<Preferences>, open: bool) -> UpdateEngine {
    let network = Arc::new(NetworkClient::new());
    let installed: Arc<dyn InstalledVersion> = Arc::new(storage.clone());
    let prefs: Arc<dyn PreferenceStore> = prefs;
    let resolver =
        ChannelResolver::new(network.clone(), prefs, installed.clone(), RemoteState::new());
    let dispatcher = ActionDispatcher::new(
        Downloads::new(storage.downloads_dir(), storage.base_dir()),
        Arc::new(ConsoleFlows),
        Arc::new(ConsoleFeedback { open }),
    );
    let service = Arc::new(DownloadService::new(
        network,
        storage.cache_dir(),
        dispatcher,
    ));
    UpdateEngine::new(resolver, installed, service)
}

async fn render_progress(mut rx: mpsc::UnboundedReceiver<AppState>) {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    while let Some(state) = rx.recv().await {
        match state {
            AppState::Downloading {
                file,
                bytes_read,
                speed,
            } => bar.set_message(format!(
                "{file}: {} ({speed})",
                util::format_bytes(bytes_read)
            )),
            AppState::Finished { .. } | AppState::Error(_) => break,
            AppState::Idle | AppState::CheckingForUpdates | AppState::UpdateChecked(_) => {}
        }
    }
    bar.finish_and_clear();
}
