use std::path::PathBuf;

use crate::updater::UpdateStatus;

// What the front end renders while a check or download is running.
#[derive(Clone, Debug, PartialEq)]
pub enum AppState {
    Idle,
    CheckingForUpdates,
    UpdateChecked(UpdateStatus),
    Downloading {
        file: String,
        bytes_read: u64,
        speed: String,
    },
    Finished {
        file: PathBuf,
    },
    Error(String),
}
