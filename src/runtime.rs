//! Wiring: builds the store, gateway and engine from configuration and
//! routes inbound channel messages to the engine.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::FsArchiveStore;
use crate::channels::inbound::{self, InboundCommand};
use crate::channels::{
    ChannelInboundMessage, DeliveryGateway, InboundSource, SendOptions, TelegramGateway,
};
use crate::config::TaskwatchConfig;
use crate::error::{Result, TaskError};
use crate::lifecycle::{ArchiveOutcome, LifecycleEngine, notices};
use crate::scheduler::{ScheduledTrigger, Scheduler, default_triggers};
use crate::store::{TaskStatus, TaskStore};

/// Inbound queue depth between the poll loop and the handler.
const INBOUND_QUEUE: usize = 64;

/// Fully wired components.
pub struct Runtime {
    pub config: TaskwatchConfig,
    pub store: Arc<TaskStore>,
    pub gateway: Arc<TelegramGateway>,
    pub engine: Arc<LifecycleEngine>,
    pub triggers: Vec<ScheduledTrigger>,
}

impl Runtime {
    pub fn from_config(config: TaskwatchConfig) -> Result<Self> {
        config.validate()?;
        let triggers = default_triggers(&config.schedule)?;
        let store = Arc::new(
            TaskStore::open_csv(config.store.path.clone())
                .with_legacy_prefix(config.store.legacy_id_prefix.clone()),
        );
        let gateway = Arc::new(TelegramGateway::new(&config.telegram));
        let archive = Arc::new(FsArchiveStore::new(config.archive.dir.clone()));
        let engine = Arc::new(LifecycleEngine::new(
            Arc::clone(&store),
            gateway.clone() as Arc<dyn DeliveryGateway>,
            archive,
            &config,
        ));
        Ok(Self {
            config,
            store,
            gateway,
            engine,
            triggers,
        })
    }

    /// A scheduler over the configured trigger set.
    #[must_use]
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(Arc::clone(&self.engine), self.triggers.clone())
    }

    /// Rebuild pending responses from the dataset after a restart.
    ///
    /// An unreadable dataset is not fatal here: the triggers report it on
    /// every cycle until it comes back.
    pub fn restore_pending(&self) -> usize {
        match self.engine.rebuild_pending() {
            Ok(count) => {
                info!(count, "restored tasks awaiting response");
                count
            }
            Err(e) => {
                warn!(error = %e, "could not restore tasks awaiting response, starting empty");
                0
            }
        }
    }

    /// Poll the channel and apply replies until `cancel` fires.
    pub async fn run_inbound(&self, cancel: CancellationToken) -> Result<()> {
        if !self.config.telegram.is_configured() {
            return Err(TaskError::Config(
                "telegram bot token and chat id are required".to_owned(),
            ));
        }

        let (tx, mut rx) = mpsc::channel(INBOUND_QUEUE);
        let poller = {
            let gateway = Arc::clone(&self.gateway);
            let cancel = cancel.clone();
            tokio::spawn(async move { gateway.run(tx, cancel).await })
        };

        while let Some(message) = rx.recv().await {
            let Some(ack) = handle_inbound(&self.engine, &self.triggers, &message).await else {
                continue;
            };
            let acked = match &message.callback_id {
                Some(callback_id) => self.gateway.answer_callback(callback_id, &ack).await,
                None => {
                    let options = SendOptions {
                        reply_to: Some(message.message_id),
                        ..SendOptions::default()
                    };
                    self.gateway
                        .send(self.gateway.chat_id(), &ack, &options)
                        .await
                        .map(|handle| self.engine.remember_message(handle.message_id))
                }
            };
            if let Err(e) = acked {
                warn!(error = %e, "failed to acknowledge inbound message");
            }
        }

        match poller.await {
            Ok(result) => result.map_err(TaskError::from),
            Err(e) => Err(TaskError::Config(format!("inbound poll loop panicked: {e}"))),
        }
    }
}

/// Apply one inbound message, returning the acknowledgment to show the sender.
///
/// `None` means no reply is needed: either the message was not addressed
/// to the engine or the engine already posted its own notice.
pub async fn handle_inbound(
    engine: &LifecycleEngine,
    triggers: &[ScheduledTrigger],
    message: &ChannelInboundMessage,
) -> Option<String> {
    if message.callback_id.is_none() {
        engine.remember_message(message.message_id);
    }
    let command = inbound::decode(message)?;
    if !matches!(command, InboundCommand::Reply(_)) {
        info!(?command, sender = %message.sender, "operator command received");
    }
    match command {
        InboundCommand::StatusReport => match engine.publish_status_report().await {
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "status report on request failed");
                Some("❌ Could not build the status report.".to_owned())
            }
        },
        InboundCommand::ArchiveNow => match engine.daily_archive().await {
            Ok(ArchiveOutcome::Archived { .. }) => None,
            Ok(ArchiveOutcome::AlreadyArchived { date }) => {
                Some(format!("📁 Already archived for {date}"))
            }
            Err(e) => {
                // The engine has already posted the failure notice.
                debug!(error = %e, "manual archive failed");
                None
            }
        },
        InboundCommand::ListBackups => match engine.publish_backup_list().await {
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "backup listing failed");
                Some("❌ Could not list backup files.".to_owned())
            }
        },
        InboundCommand::ScheduleInfo => {
            let text = notices::schedule_info(triggers, Local::now());
            match engine.send_notice(&text).await {
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "schedule info failed");
                    Some("❌ Could not send schedule info.".to_owned())
                }
            }
        }
        InboundCommand::DailyReset => match engine.daily_reset().await {
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "manual daily reset failed");
                Some(format!("❌ Daily reset failed: {e}"))
            }
        },
        InboundCommand::ClearChat => {
            let deleted = engine.clear_chat().await;
            if let Err(e) = engine.send_notice(&notices::chat_cleared(deleted)).await {
                warn!(error = %e, "failed to confirm chat clear");
            }
            None
        }
        InboundCommand::Reply(reply) => {
            info!(task_id = %reply.task_id, answer = %reply.answer, sender = %message.sender, "reply received");
            match engine
                .record_response(&reply.task_id, reply.answer, &message.sender)
                .await
            {
                Ok(task) => Some(match task.status {
                    TaskStatus::Completed => format!("✅ Task {} marked done", task.id),
                    _ => format!("❌ Task {} marked not done", task.id),
                }),
                Err(TaskError::NotFound(id)) => Some(format!("❓ Task {id} not found")),
                Err(TaskError::NotActionable { task_id, status }) => {
                    debug!(%task_id, %status, "reply to non-actionable task");
                    Some(format!("⌛ Task {task_id} has {status} and can no longer be answered"))
                }
                Err(e) => {
                    warn!(task_id = %reply.task_id, error = %e, "failed to record reply");
                    Some("⚠️ Could not record your answer, please try again.".to_owned())
                }
            }
        }
    }
}
