//! Bot commands.

use teloxide::types::BotCommand;

use crate::broadcast::sender::StreamKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Pause,
    News,
    Talk,
    Swear,
}

/// Result of reading an inbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed {
    Command(Command),
    /// Not a command (or an unknown one): plain conversation.
    Text,
    /// A command addressed to some other bot.
    ForeignCommand,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Start,
        Command::Stop,
        Command::Pause,
        Command::News,
        Command::Talk,
        Command::Swear,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Pause => "pause",
            Command::News => "news",
            Command::Talk => "talk",
            Command::Swear => "swear",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Command::Start => "start posting news to this chat",
            Command::Stop => "stop all periodic posts",
            Command::Pause => "same as /stop",
            Command::News => "switch to the news stream",
            Command::Talk => "switch to the talk stream",
            Command::Swear => "switch to the swear stream",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Stream this command asks for; `None` means stop everything.
    pub fn stream(&self) -> Option<StreamKind> {
        match self {
            Command::Start | Command::News => Some(StreamKind::News),
            Command::Talk => Some(StreamKind::Talk),
            Command::Swear => Some(StreamKind::Swear),
            Command::Stop | Command::Pause => None,
        }
    }

    /// Command list for Telegram's menu.
    pub fn bot_commands() -> Vec<BotCommand> {
        Self::ALL
            .into_iter()
            .map(|c| BotCommand::new(c.name(), c.description()))
            .collect()
    }

    /// Read the first whitespace-delimited token of `text` as a command.
    ///
    /// A `@bot` suffix must name this bot (case-insensitive); a suffix naming
    /// another bot makes the text a foreign command.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Parsed {
        let Some(token) = text.split_whitespace().next() else {
            return Parsed::Text;
        };
        let Some(token) = token.strip_prefix('/') else {
            return Parsed::Text;
        };

        let (name, addressee) = match token.split_once('@') {
            Some((name, addressee)) => (name, Some(addressee)),
            None => (token, None),
        };

        if let (Some(addressee), Some(me)) = (addressee, bot_username)
            && !addressee.eq_ignore_ascii_case(me.trim_start_matches('@'))
        {
            return Parsed::ForeignCommand;
        }

        match Self::from_name(&name.to_lowercase()) {
            Some(command) => Parsed::Command(command),
            None => Parsed::Text,
        }
    }
}
