use llm_core::ChatMessage;

use crate::error::ApiError;

/// Maximum number of messages in one chat request
const MAX_MESSAGES: usize = 100;
/// Maximum length of a single message
const MAX_MESSAGE_LENGTH: usize = 8000;
/// Maximum length of the whole conversation
const MAX_CONVERSATION_LENGTH: usize = 32000;

const ALLOWED_ROLES: [&str; 3] = ["system", "user", "assistant"];

/// Validate a chat request before it is sent upstream
pub fn validate_chat_request(messages: &[ChatMessage]) -> Result<(), ApiError> {
    if messages.is_empty() {
        return Err(ApiError::InvalidInput("Messages cannot be empty".to_string()));
    }
    if messages.len() > MAX_MESSAGES {
        return Err(ApiError::InvalidInput(format!(
            "Too many messages (max {})",
            MAX_MESSAGES
        )));
    }

    let mut total = 0;
    for (i, message) in messages.iter().enumerate() {
        if !ALLOWED_ROLES.contains(&message.role.as_str()) {
            return Err(ApiError::InvalidInput(format!(
                "Invalid role '{}' in message {}. Expected one of: {}",
                message.role,
                i,
                ALLOWED_ROLES.join(", ")
            )));
        }
        if message.content.len() > MAX_MESSAGE_LENGTH {
            return Err(ApiError::InvalidInput(format!(
                "Message {} too long (max {} characters)",
                i, MAX_MESSAGE_LENGTH
            )));
        }
        total += message.content.len();
    }
    if total > MAX_CONVERSATION_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Conversation too long (max {} characters)",
            MAX_CONVERSATION_LENGTH
        )));
    }

    match messages.last() {
        Some(last) if last.role == "user" && !last.content.trim().is_empty() => Ok(()),
        _ => Err(ApiError::InvalidInput(
            "Last message must be a non-empty user message".to_string(),
        )),
    }
}
