//! Post-download decision table.
//!
//! Every `(subject, configuration)` pair maps to exactly one [`TerminalAction`]. Both the
//! automatic continuation ([`ActionDispatcher::on_finished`]) and the notification buttons
//! ([`ActionDispatcher::actions_for`]) are derived from that single table, so tapping a
//! notification resumes the same flow with the same arguments.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use crate::download::destination::Downloads;
use crate::download::subject::{Configuration, DownloadSubject, FlashSlot, SourceRef};

/// Entry points of the flows that continue after a download.
pub trait FlowHandoff: Send + Sync {
    fn uninstall(&self, file: &Path);
    fn patch(&self, file: &Path, source: &SourceRef);
    fn flash(&self, file: &Path, secondary: bool);
    fn install_module(&self, file: &Path);
}

/// User-facing messages and notifications.
pub trait Feedback: Send + Sync {
    fn toast(&self, message: &str);
    fn notify_finished(&self, title: &str, actions: &NotificationActionSet);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowRequest {
    Uninstall { file: PathBuf },
    Patch { file: PathBuf, source: SourceRef },
    Flash { file: PathBuf, secondary: bool },
    InstallModule { file: PathBuf },
}

impl FlowRequest {
    pub fn hand_off(&self, flows: &dyn FlowHandoff) {
        match self {
            FlowRequest::Uninstall { file } => flows.uninstall(file),
            FlowRequest::Patch { file, source } => flows.patch(file, source),
            FlowRequest::Flash { file, secondary } => flows.flash(file, *secondary),
            FlowRequest::InstallModule { file } => flows.install_module(file),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FlowRequest::Uninstall { .. } => "Uninstall",
            FlowRequest::Patch { .. } => "Patch",
            FlowRequest::Flash { .. } => "Flash",
            FlowRequest::InstallModule { .. } => "Install",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalAction {
    MoveToDownloads,
    Flow(FlowRequest),
    /// The configuration has no meaning for this subject.
    Nothing,
}

pub fn terminal_action(file: &Path, subject: &DownloadSubject) -> TerminalAction {
    let file = file.to_path_buf();
    match subject {
        DownloadSubject::Magisk { configuration, .. } => match configuration {
            Configuration::Download => TerminalAction::MoveToDownloads,
            Configuration::Uninstall => TerminalAction::Flow(FlowRequest::Uninstall { file }),
            Configuration::Patch(source) => TerminalAction::Flow(FlowRequest::Patch {
                file,
                source: source.clone(),
            }),
            Configuration::Flash(slot) => TerminalAction::Flow(FlowRequest::Flash {
                file,
                secondary: *slot == FlashSlot::Secondary,
            }),
        },
        DownloadSubject::Module { configuration, .. } => match configuration {
            Configuration::Download => TerminalAction::MoveToDownloads,
            Configuration::Flash(_) => TerminalAction::Flow(FlowRequest::InstallModule { file }),
            Configuration::Uninstall | Configuration::Patch(_) => TerminalAction::Nothing,
        },
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationAction {
    OpenFolder(PathBuf),
    OpenFile(PathBuf),
    Resume(FlowRequest),
}

impl NotificationAction {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationAction::OpenFolder(_) => "Open containing folder",
            NotificationAction::OpenFile(_) => "Open file",
            NotificationAction::Resume(request) => request.label(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotificationActionSet {
    /// Runs when the notification body is tapped.
    pub primary: Option<NotificationAction>,
    pub buttons: Vec<NotificationAction>,
}

impl NotificationActionSet {
    pub fn iter(&self) -> impl Iterator<Item = &NotificationAction> {
        self.primary.iter().chain(self.buttons.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.buttons.is_empty()
    }
}

pub struct ActionDispatcher {
    downloads: Downloads,
    flows: Arc<dyn FlowHandoff>,
    feedback: Arc<dyn Feedback>,
}

impl ActionDispatcher {
    pub fn new(
        downloads: Downloads,
        flows: Arc<dyn FlowHandoff>,
        feedback: Arc<dyn Feedback>,
    ) -> Self {
        Self {
            downloads,
            flows,
            feedback,
        }
    }

    #[cfg(test)]
    pub fn downloads(&self) -> &Downloads {
        &self.downloads
    }

    #[cfg(test)]
    pub fn flows(&self) -> &dyn FlowHandoff {
        self.flows.as_ref()
    }

    /// Run the terminal action for a fully written download.
    pub async fn on_finished(&self, file: &Path, subject: &DownloadSubject) -> io::Result<()> {
        match terminal_action(file, subject) {
            TerminalAction::MoveToDownloads => {
                let destination = self.downloads.move_into(file).await?;
                let shown = self.downloads.display_path(&destination);
                info!("dispatch: saved {}", destination.display());
                self.feedback.toast(&format!("Saved to {shown}"));
            }
            TerminalAction::Flow(request) => {
                info!("dispatch: handing {} to {} flow", file.display(), request.label());
                request.hand_off(self.flows.as_ref());
            }
            TerminalAction::Nothing => {
                debug!(
                    "dispatch: {:?} has no action for {}",
                    subject.configuration(),
                    subject.file_name()
                );
            }
        }
        Ok(())
    }

    /// Replace the progress notification with the finished one and its actions.
    pub fn notify(&self, file: &Path, subject: &DownloadSubject) {
        let actions = self.actions_for(file, subject);
        self.feedback.notify_finished(&subject.file_name(), &actions);
    }

    pub fn actions_for(&self, file: &Path, subject: &DownloadSubject) -> NotificationActionSet {
        match terminal_action(file, subject) {
            TerminalAction::MoveToDownloads => NotificationActionSet {
                primary: None,
                buttons: vec![
                    NotificationAction::OpenFolder(self.downloads.dir().to_path_buf()),
                    NotificationAction::OpenFile(self.downloads.path_for(&subject.file_name())),
                ],
            },
            TerminalAction::Flow(request) => NotificationActionSet {
                primary: Some(NotificationAction::Resume(request)),
                buttons: Vec::new(),
            },
            TerminalAction::Nothing => NotificationActionSet::default(),
        }
    }
}
