use serde::Deserialize;

/// Commands sent by the subscriber over the relay socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayCommand {
    SetEnabled(ChatToggle),
    SetOfflineGuard(ChatToggle),
    ListChats,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatToggle {
    pub chat_id: String,
    pub value: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toggle_commands() {
        let command: RelayCommand = serde_json::from_str(
            r#"{"type":"SET_OFFLINE_GUARD","data":{"chatId":"1203@g.us","value":true}}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            RelayCommand::SetOfflineGuard(ChatToggle {
                chat_id: "1203@g.us".into(),
                value: true,
            })
        );
    }

    #[test]
    fn parses_unit_command_without_data() {
        let command: RelayCommand = serde_json::from_str(r#"{"type":"LIST_CHATS"}"#).unwrap();
        assert_eq!(command, RelayCommand::ListChats);
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(serde_json::from_str::<RelayCommand>(r#"{"type":"REBOOT"}"#).is_err());
    }
}
