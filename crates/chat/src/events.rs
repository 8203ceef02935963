use orderly_core::domain::actor::{ActorId, ChannelId, GuildId, MessageId};

/// Events the gateway forwards into the engine queue. Everything else the
/// platform emits arrives as `Unsupported` and is dropped by the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    ReactionAdded(ReactionAddedEvent),
    MessageCreated(MessageCreatedEvent),
    Unsupported { event_type: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionAddedEvent {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub actor_id: ActorId,
    pub emoji: String,
    pub guild_id: Option<GuildId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageCreatedEvent {
    pub channel_id: ChannelId,
    pub actor_id: ActorId,
    pub content: String,
}

pub const APPROVE_EMOJI: &str = "✅";
pub const REJECT_EMOJI: &str = "❌";
pub const WORKER_EMOJI: &str = "👷";
pub const ADMIN_EMOJI: &str = "👑";

/// The four reaction symbols the workflow understands. `Worker` and `Admin`
/// only carry meaning on the admin-decision prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReactionSignal {
    Approve,
    Reject,
    Worker,
    Admin,
}

pub fn reaction_signal(reaction: &str) -> Option<ReactionSignal> {
    let normalized = normalize_reaction_token(reaction);
    match normalized.as_str() {
        "✅" | "white_check_mark" | "check" => Some(ReactionSignal::Approve),
        "❌" | "x" | "cross_mark" => Some(ReactionSignal::Reject),
        "👷" | "construction_worker" => Some(ReactionSignal::Worker),
        "👑" | "crown" => Some(ReactionSignal::Admin),
        _ => None,
    }
}

fn normalize_reaction_token(reaction: &str) -> String {
    reaction.trim().trim_matches(':').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{reaction_signal, ReactionSignal};

    #[test]
    fn recognizes_unicode_and_named_aliases() {
        assert_eq!(reaction_signal("✅"), Some(ReactionSignal::Approve));
        assert_eq!(reaction_signal("white_check_mark"), Some(ReactionSignal::Approve));
        assert_eq!(reaction_signal("❌"), Some(ReactionSignal::Reject));
        assert_eq!(reaction_signal("x"), Some(ReactionSignal::Reject));
        assert_eq!(reaction_signal("👷"), Some(ReactionSignal::Worker));
        assert_eq!(reaction_signal("👑"), Some(ReactionSignal::Admin));
    }

    #[test]
    fn accepts_colon_wrapped_case_variant_alias() {
        assert_eq!(reaction_signal(" :CROSS_MARK: "), Some(ReactionSignal::Reject));
    }

    #[test]
    fn unknown_reactions_carry_no_signal() {
        assert_eq!(reaction_signal("🎉"), None);
        assert_eq!(reaction_signal("thumbsup"), None);
    }
}
