//! Persona supplier — produces the system message text for a conversation.
//!
//! The persona text is constructed fresh per turn by the host application
//! (templating, localization, and prompt content are not this core's
//! concern); this core treats it as an opaque string.

use crate::message::ConversationId;

/// Supplies the system message text for a given conversation identity.
pub trait PersonaSupplier: Send + Sync {
    fn system_text(&self, conversation_id: &ConversationId) -> String;
}

/// A persona supplier that returns a fixed string for every conversation.
pub struct StaticPersona(pub String);

impl StaticPersona {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

impl PersonaSupplier for StaticPersona {
    fn system_text(&self, _conversation_id: &ConversationId) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_persona_ignores_conversation() {
        let persona = StaticPersona::new("You are a helpful assistant.");
        let a = persona.system_text(&ConversationId::from("a"));
        let b = persona.system_text(&ConversationId::from("b"));
        assert_eq!(a, b);
        assert_eq!(a, "You are a helpful assistant.");
    }
}
