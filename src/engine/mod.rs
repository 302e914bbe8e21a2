use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info};
use tokio::sync::mpsc;

use crate::channel::{ChannelResolver, InstalledVersion};
use crate::download::DownloadService;
use crate::download::progress::progress_channel;
use crate::download::subject::{Configuration, DownloadSubject};
use crate::engine::models::ModuleDescriptor;
use crate::engine::state::AppState;
use crate::error::{DownloadError, ResolveError};
use crate::updater::{self, UpdateStatus};
use crate::util::format_speed;

pub mod models;
pub mod state;

#[derive(Clone, Debug)]
pub enum DownloadRequest {
    Magisk(Configuration),
    Module {
        configuration: Configuration,
        module: ModuleDescriptor,
    },
}

pub struct UpdateEngine {
    pub state: AppState,
    resolver: ChannelResolver,
    installed: Arc<dyn InstalledVersion>,
    service: Arc<DownloadService>,
}

impl UpdateEngine {
    pub fn new(
        resolver: ChannelResolver,
        installed: Arc<dyn InstalledVersion>,
        service: Arc<DownloadService>,
    ) -> Self {
        Self {
            state: AppState::Idle,
            resolver,
            installed,
            service,
        }
    }

    fn publish(&mut self, state: AppState, updates: &mpsc::UnboundedSender<AppState>) {
        self.state = state.clone();
        let _ = updates.send(state);
    }

    pub async fn check_for_updates(
        &mut self,
        manager_version_code: Option<i64>,
        updates: &mpsc::UnboundedSender<AppState>,
    ) -> Result<UpdateStatus, ResolveError> {
        self.publish(AppState::CheckingForUpdates, updates);
        info!("check: starting update check");
        let result = updater::check_for_updates(
            &self.resolver,
            self.installed.as_ref(),
            manager_version_code,
        )
        .await;
        match result {
            Ok(status) => {
                self.publish(AppState::UpdateChecked(status.clone()), updates);
                Ok(status)
            }
            Err(err) => {
                error!("check: {err}");
                self.publish(AppState::Error(err.to_string()), updates);
                Err(err)
            }
        }
    }

    /// Build the subject, resolving the channel first when no manifest is known yet.
    async fn subject_for(
        &self,
        request: DownloadRequest,
    ) -> Result<DownloadSubject, DownloadError> {
        match request {
            DownloadRequest::Magisk(configuration) => {
                if self.resolver.state().latest().is_none() {
                    self.resolver.resolve().await?;
                }
                DownloadSubject::magisk(configuration, self.resolver.state())
            }
            DownloadRequest::Module {
                configuration,
                module,
            } => Ok(DownloadSubject::module(configuration, module)),
        }
    }

    pub async fn download(
        &mut self,
        request: DownloadRequest,
        updates: &mpsc::UnboundedSender<AppState>,
    ) -> Result<PathBuf, DownloadError> {
        let subject = match self.subject_for(request).await {
            Ok(subject) => subject,
            Err(err) => {
                self.publish(AppState::Error(err.to_string()), updates);
                return Err(err);
            }
        };

        let (reporter, events) = progress_channel();
        let file_name = subject.file_name();
        let progress_updates = updates.clone();
        let consumer = tokio::spawn(async move {
            let mut last: Option<(Instant, u64)> = None;
            events
                .forward(|bytes_read| {
                    let now = Instant::now();
                    let speed = match last {
                        Some((at, previous)) => {
                            let secs = now.duration_since(at).as_secs_f32();
                            let delta = bytes_read.saturating_sub(previous) as f32;
                            format_speed(if secs > 0.0 { delta / secs } else { 0.0 })
                        }
                        None => format_speed(0.0),
                    };
                    last = Some((now, bytes_read));
                    let _ = progress_updates.send(AppState::Downloading {
                        file: file_name.clone(),
                        bytes_read,
                        speed,
                    });
                })
                .await;
        });

        let result = self.service.start(subject, reporter).wait().await;
        // The reporter is gone once the transfer ends, so the consumer drains and exits.
        let _ = consumer.await;

        match &result {
            Ok(file) => self.publish(AppState::Finished { file: file.clone() }, updates),
            Err(err) => {
                error!("download: {err}");
                self.publish(AppState::Error(err.to_string()), updates);
            }
        }
        result
    }
}
