use serde::Deserialize;

lazy_static::lazy_static! {
    static ref BOOK_COMMAND: regex::Regex =
        regex::Regex::new(r"^/book(?:@\w+)?\s+(\d+)\s*$").unwrap();
    static ref SLOTS_COMMAND: regex::Regex = regex::Regex::new(r"^/slots(?:@\w+)?\s*$").unwrap();
    static ref HELP_COMMAND: regex::Regex =
        regex::Regex::new(r"^/(?:help|start)(?:@\w+)?\s*$").unwrap();
    static ref BOOK_CALLBACK: regex::Regex = regex::Regex::new(r"^book_(.+)$").unwrap();
}

/// Largest `callback_data` the Bot API accepts, in bytes
pub const CALLBACK_DATA_LIMIT: usize = 64;

/// Reply to the help command
pub const HELP_TEXT: &str = "🎾 Comandos disponibles:\n\
/slots - Ver los turnos disponibles\n\
/book [número] - Reservar un turno de la lista (ej: /book 1)\n\
/help - Mostrar esta ayuda";

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
pub struct TelegramResponse<T> {
    /// Whether the request succeeded
    pub ok: bool,
    /// Payload on success
    pub result: Option<T>,
    /// Human-readable error on failure
    pub description: Option<String>,
}

/// One incoming update from `getUpdates`
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update identifier
    pub update_id: i64,
    /// New chat message
    pub message: Option<Message>,
    /// Inline button press
    pub callback_query: Option<CallbackQuery>,
}

/// Chat message
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Message identifier inside the chat
    pub message_id: i64,
    /// Chat the message belongs to
    pub chat: Chat,
    /// Text of the message, absent for stickers, photos and the like
    pub text: Option<String>,
}

/// Chat reference
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    /// Chat identifier
    pub id: i64,
}

/// Inline button press
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// Identifier to acknowledge the press with
    pub id: String,
    /// Data attached to the button
    pub data: Option<String>,
    /// Message carrying the button
    pub message: Option<Message>,
}

/// Commands understood by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// List the slots currently available
    Slots,
    /// Book slot number N (1-based) of the last list
    Book(usize),
    /// Book the slot a notice was sent for, by slot id
    BookSlot(String),
    /// Show the command list
    Help,
}

impl BotCommand {
    /// Parse a chat message
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();

        if let Some(caps) = BOOK_COMMAND.captures(text) {
            return caps[1].parse().ok().map(BotCommand::Book);
        }
        if SLOTS_COMMAND.is_match(text) {
            return Some(BotCommand::Slots);
        }
        if HELP_COMMAND.is_match(text) {
            return Some(BotCommand::Help);
        }
        None
    }

    /// Parse the data of a "book this slot" button
    pub fn from_callback(data: &str) -> Option<Self> {
        let caps = BOOK_CALLBACK.captures(data)?;
        Some(BotCommand::BookSlot(caps[1].to_string()))
    }
}

/// A command together with the chat it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    /// Chat to answer in
    pub chat_id: i64,
    /// Parsed command
    pub command: BotCommand,
    /// Set when the command came from a button press that must be acknowledged
    pub callback_id: Option<String>,
}

impl InboundCommand {
    /// Extract a command from an update; `None` for anything the bot does not handle
    pub fn from_update(update: &Update) -> Option<Self> {
        if let Some(query) = &update.callback_query {
            let chat_id = query.message.as_ref()?.chat.id;
            let command = BotCommand::from_callback(query.data.as_deref()?)?;
            return Some(Self {
                chat_id,
                command,
                callback_id: Some(query.id.clone()),
            });
        }

        let message = update.message.as_ref()?;
        let command = BotCommand::parse(message.text.as_deref()?)?;
        Some(Self {
            chat_id: message.chat.id,
            command,
            callback_id: None,
        })
    }
}

/// Callback data of the "book this slot" button for the slot with id `slot_id`
pub fn book_callback_data(slot_id: &str) -> String {
    format!("book_{}", slot_id)
}
