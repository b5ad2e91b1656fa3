use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use court_scan::{NotificationError, Notifier, ScanExecutor};
use notification_services::{BotCommand, ChatReply, HELP_TEXT, InboundCommand, TelegramService};

/// Long-poll timeout for Telegram updates
const UPDATE_POLL_TIMEOUT_SECS: u64 = 30;

/// Pause before polling Telegram again after a failure
const UPDATE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Owner of the background tasks: polling, heartbeat and chat commands
pub struct ScanManager {
    executor: Arc<ScanExecutor>,
    telegram: Option<Arc<TelegramService>>,
    handles: Vec<JoinHandle<()>>,
}

impl ScanManager {
    pub fn new(executor: Arc<ScanExecutor>) -> Self {
        Self {
            executor,
            telegram: None,
            handles: Vec::new(),
        }
    }

    /// Also answer chat commands received by `telegram`
    pub fn with_command_listener(mut self, telegram: Arc<TelegramService>) -> Self {
        self.telegram = Some(telegram);
        self
    }

    /// Spawn every background task
    pub fn start(&mut self) {
        info!("Starting court monitoring tasks");

        let executor = self.executor.clone();
        self.handles.push(tokio::spawn(async move {
            if let Err(e) = executor.start().await {
                error!("Scan executor failed: {}", e);
            }
        }));

        let executor = self.executor.clone();
        self.handles.push(tokio::spawn(async move {
            executor.run_heartbeat().await;
        }));

        if let Some(telegram) = self.telegram.clone() {
            let executor = self.executor.clone();
            self.handles.push(tokio::spawn(async move {
                run_command_listener(executor, telegram).await;
            }));
        }

        info!("Court monitoring tasks started");
    }

    /// Stop every task, then send the stop notice
    pub async fn stop(&mut self) {
        info!("Stopping court monitoring tasks");

        for handle in self.handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }

        self.executor.announce_stop().await;

        info!("Court monitoring stopped");
    }
}

impl Drop for ScanManager {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

async fn run_command_listener(executor: Arc<ScanExecutor>, telegram: Arc<TelegramService>) {
    let mut offset: Option<i64> = None;

    loop {
        let updates = match telegram.get_updates(offset, UPDATE_POLL_TIMEOUT_SECS).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Failed to fetch Telegram updates: {}", e);
                tokio::time::sleep(UPDATE_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);

            let Some(command) = InboundCommand::from_update(&update) else {
                continue;
            };

            handle_command(&executor, &telegram, command).await;
        }
    }
}

async fn handle_command(executor: &ScanExecutor, telegram: &TelegramService, command: InboundCommand) {
    if telegram.is_authorized(command.chat_id) {
        let reply = ChatReply::new(telegram, command.chat_id);
        if let Err(e) = dispatch_command(executor, &command.command, &reply).await {
            error!("Failed to answer {:?}: {}", command.command, e);
        }
    } else {
        warn!("Ignoring {:?} from unknown chat {}", command.command, command.chat_id);
    }

    if let Some(callback_id) = command.callback_id {
        if let Err(e) = telegram.answer_callback(&callback_id).await {
            debug!("Failed to acknowledge callback {}: {}", callback_id, e);
        }
    }
}

/// Run one chat command, answering through `reply`
pub async fn dispatch_command(
    executor: &ScanExecutor,
    command: &BotCommand,
    reply: &dyn Notifier,
) -> Result<(), NotificationError> {
    info!("Handling chat command {:?}", command);

    match command {
        BotCommand::Slots => reply.send_message(&executor.slots_message().await).await,
        BotCommand::Book(number) => executor.book_slot(*number, reply).await,
        BotCommand::BookSlot(slot_id) => executor.book_slot_by_id(slot_id, reply).await,
        BotCommand::Help => reply.send_message(HELP_TEXT).await,
    }
}
