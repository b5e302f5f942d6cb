//! Client request grammar
//!
//! Clients send one text request per line, shaped as
//! `COMMAND|DEVICE_ID[|PAYLOAD]`. The grammar is strict: any field count
//! that does not fit the command is a format error, never a guess.

use crate::error::{GatewayError, GatewayResult};

/// Field separator of the client grammar
pub const FIELD_SEPARATOR: char = '|';

/// Recognized command tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    GetDeviceState,
    SetDeviceState,
}

impl CommandKind {
    pub fn token(self) -> &'static str {
        match self {
            CommandKind::GetDeviceState => "GET_DEVICE_STATE",
            CommandKind::SetDeviceState => "SET_DEVICE_STATE",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "GET_DEVICE_STATE" => Some(CommandKind::GetDeviceState),
            "SET_DEVICE_STATE" => Some(CommandKind::SetDeviceState),
            _ => None,
        }
    }
}

/// A parsed client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    GetDeviceState { device_id: String },
    SetDeviceState { device_id: String, payload: String },
}

impl ClientCommand {
    /// Parse one request line (a trailing `\r`/`\n` is ignored)
    ///
    /// ```
    /// # use fieldgw_core::ClientCommand;
    /// let cmd = ClientCommand::parse("SET_DEVICE_STATE|dev1|ON").unwrap();
    /// assert_eq!(cmd.device_id(), "dev1");
    /// assert!(ClientCommand::parse("BADCOMMAND").is_err());
    /// ```
    pub fn parse(line: &str) -> GatewayResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();

        if !(2..=3).contains(&fields.len()) {
            return Err(GatewayError::InvalidFormat(line.to_string()));
        }

        let (token, device_id) = (fields[0], fields[1]);
        let kind = CommandKind::from_token(token)
            .ok_or_else(|| GatewayError::UnknownCommand(token.to_string()))?;

        if device_id.is_empty() {
            return Err(GatewayError::InvalidFormat(line.to_string()));
        }

        match (kind, fields.get(2)) {
            (CommandKind::GetDeviceState, None) => Ok(ClientCommand::GetDeviceState {
                device_id: device_id.to_string(),
            }),
            (CommandKind::SetDeviceState, Some(payload)) => Ok(ClientCommand::SetDeviceState {
                device_id: device_id.to_string(),
                payload: payload.to_string(),
            }),
            _ => Err(GatewayError::InvalidFormat(line.to_string())),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            ClientCommand::GetDeviceState { .. } => CommandKind::GetDeviceState,
            ClientCommand::SetDeviceState { .. } => CommandKind::SetDeviceState,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            ClientCommand::GetDeviceState { device_id }
            | ClientCommand::SetDeviceState { device_id, .. } => device_id,
        }
    }

    /// Render back into the wire grammar
    pub fn to_line(&self) -> String {
        match self {
            ClientCommand::GetDeviceState { device_id } => {
                format!("{}{}{}", self.kind().token(), FIELD_SEPARATOR, device_id)
            }
            ClientCommand::SetDeviceState { device_id, payload } => format!(
                "{}{sep}{}{sep}{}",
                self.kind().token(),
                device_id,
                payload,
                sep = FIELD_SEPARATOR
            ),
        }
    }
}
