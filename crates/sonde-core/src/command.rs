//! Control-plane commands and the AT-style text syntax they arrive in.
//!
//! Lines look like `AT+RATE 100` or `AT+STARTUWB`. Numeric arguments are
//! carried through unvalidated; range checks belong to the command processor.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartRanging,
    StopRanging,
    StartDiscovery,
    StopDiscovery,
    SetIdentity(i64),
    SetBootMode(i64),
    SetRate(i64),
    SetChannel(i64),
    /// Clear every persisted override.
    Reset,
    SetTimeout(i64),
    SetTxPower(i64),
    SetStreamMode(i64),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartRanging => "STARTUWB",
            Command::StopRanging => "STOPUWB",
            Command::StartDiscovery => "STARTBLE",
            Command::StopDiscovery => "STOPBLE",
            Command::SetIdentity(_) => "ID",
            Command::SetBootMode(_) => "BOOTMODE",
            Command::SetRate(_) => "RATE",
            Command::SetChannel(_) => "CHANNEL",
            Command::Reset => "RESET",
            Command::SetTimeout(_) => "TIMEOUT",
            Command::SetTxPower(_) => "TXPOWER",
            Command::SetStreamMode(_) => "STREAMMODE",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetIdentity(v)
            | Command::SetBootMode(v)
            | Command::SetRate(v)
            | Command::SetChannel(v)
            | Command::SetTimeout(v)
            | Command::SetTxPower(v)
            | Command::SetStreamMode(v) => write!(f, "AT+{} {}", self.name(), v),
            _ => write!(f, "AT+{}", self.name()),
        }
    }
}

/// Why a line could not be turned into a command. The message is the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("ERROR Invalid AT Command")]
    InvalidCommand,
    #[error("Only input AT without + command")]
    MissingPlus,
    #[error("Not an AT command")]
    NotAt,
}

impl FromStr for Command {
    type Err = LexError;

    fn from_str(line: &str) -> Result<Self, LexError> {
        let line = line.trim();
        let Some(body) = line.strip_prefix("AT+") else {
            return Err(if line.starts_with("AT") {
                LexError::MissingPlus
            } else {
                LexError::NotAt
            });
        };

        let mut tokens = body.split_whitespace();
        let verb = tokens.next().ok_or(LexError::InvalidCommand)?;
        let arg = tokens.next();

        let numeric = |arg: Option<&str>| -> Result<i64, LexError> {
            arg.and_then(|a| a.parse::<i64>().ok())
                .ok_or(LexError::InvalidCommand)
        };

        let command = match verb.to_ascii_uppercase().as_str() {
            "STARTUWB" => Command::StartRanging,
            "STOPUWB" => Command::StopRanging,
            "STARTBLE" => Command::StartDiscovery,
            "STOPBLE" => Command::StopDiscovery,
            "RESET" => Command::Reset,
            "ID" => Command::SetIdentity(numeric(arg)?),
            "BOOTMODE" => Command::SetBootMode(numeric(arg)?),
            "RATE" => Command::SetRate(numeric(arg)?),
            "CHANNEL" => Command::SetChannel(numeric(arg)?),
            "TIMEOUT" => Command::SetTimeout(numeric(arg)?),
            "TXPOWER" => Command::SetTxPower(numeric(arg)?),
            "STREAMMODE" => Command::SetStreamMode(numeric(arg)?),
            _ => return Err(LexError::InvalidCommand),
        };
        Ok(command)
    }
}
