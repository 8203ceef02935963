use serde::{Deserialize, Serialize};

use crate::domain::actor::{Actor, ActorId, ChannelId, MessageId};
use crate::domain::order::OrderId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionAction {
    Complete,
    Cancel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionSignal {
    Approve,
    Reject,
}

impl CompletionSignal {
    fn action(self) -> CompletionAction {
        match self {
            Self::Approve => CompletionAction::Complete,
            Self::Reject => CompletionAction::Cancel,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Party {
    Client,
    Worker,
}

/// Outcome of feeding one reaction into a completion record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionProgress {
    /// Reactor is not a party, or the signal contradicts the fixed action.
    Ignored,
    /// A party's flag was set (or re-confirmed); the other party is still
    /// outstanding.
    Recorded,
    /// Both parties have confirmed; the caller should finalize. Returned
    /// again on re-confirmation so a failed finalization can be retried.
    Ready(CompletionAction),
}

/// Two-party sign-off tracker for one order. The first qualifying reaction
/// fixes the action for the record's lifetime; the opposing signal is
/// silently dropped from then on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub order_id: OrderId,
    pub client: Actor,
    pub worker: Actor,
    pub action: Option<CompletionAction>,
    pub client_confirmed: bool,
    pub worker_confirmed: bool,
    /// The live-edited status line in the order thread.
    pub status_message: MessageId,
    pub thread: ChannelId,
}

impl CompletionRecord {
    pub fn new(
        order_id: OrderId,
        client: Actor,
        worker: Actor,
        thread: ChannelId,
        status_message: MessageId,
    ) -> Self {
        Self {
            order_id,
            client,
            worker,
            action: None,
            client_confirmed: false,
            worker_confirmed: false,
            status_message,
            thread,
        }
    }

    pub fn party_of(&self, actor: &ActorId) -> Option<Party> {
        if &self.client.id == actor {
            Some(Party::Client)
        } else if &self.worker.id == actor {
            Some(Party::Worker)
        } else {
            None
        }
    }

    pub fn is_ready(&self) -> bool {
        self.client_confirmed && self.worker_confirmed
    }

    pub fn apply_reaction(&mut self, actor: &ActorId, signal: CompletionSignal) -> CompletionProgress {
        let Some(party) = self.party_of(actor) else {
            return CompletionProgress::Ignored;
        };

        match self.action {
            None => self.action = Some(signal.action()),
            Some(action) if action != signal.action() => return CompletionProgress::Ignored,
            Some(_) => {}
        }

        match party {
            Party::Client => self.client_confirmed = true,
            Party::Worker => self.worker_confirmed = true,
        }

        if self.is_ready() {
            CompletionProgress::Ready(self.action.unwrap_or(signal.action()))
        } else {
            CompletionProgress::Recorded
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::actor::{Actor, ActorId, ChannelId, MessageId};
    use crate::domain::order::OrderId;

    use super::{CompletionAction, CompletionProgress, CompletionRecord, CompletionSignal};

    fn actor(id: u64, name: &str) -> Actor {
        Actor { id: ActorId(id), name: name.to_string(), is_bot: false }
    }

    fn record() -> CompletionRecord {
        CompletionRecord::new(
            OrderId("ord-1".to_string()),
            actor(1, "client"),
            actor(2, "worker"),
            ChannelId(10),
            MessageId(100),
        )
    }

    #[test]
    fn finalizes_only_when_both_parties_confirm() {
        let mut record = record();

        assert_eq!(
            record.apply_reaction(&ActorId(1), CompletionSignal::Approve),
            CompletionProgress::Recorded
        );
        assert!(!record.is_ready());

        assert_eq!(
            record.apply_reaction(&ActorId(2), CompletionSignal::Approve),
            CompletionProgress::Ready(CompletionAction::Complete)
        );
        assert!(record.is_ready());
    }

    #[test]
    fn first_signal_fixes_the_action_for_the_record_lifetime() {
        let mut record = record();
        record.apply_reaction(&ActorId(2), CompletionSignal::Reject);
        assert_eq!(record.action, Some(CompletionAction::Cancel));

        // Opposing signal from the other party is dropped, not stored.
        assert_eq!(
            record.apply_reaction(&ActorId(1), CompletionSignal::Approve),
            CompletionProgress::Ignored
        );
        assert!(!record.client_confirmed);
        assert_eq!(record.action, Some(CompletionAction::Cancel));

        assert_eq!(
            record.apply_reaction(&ActorId(1), CompletionSignal::Reject),
            CompletionProgress::Ready(CompletionAction::Cancel)
        );
    }

    #[test]
    fn non_party_reactors_are_ignored() {
        let mut record = record();
        assert_eq!(
            record.apply_reaction(&ActorId(99), CompletionSignal::Approve),
            CompletionProgress::Ignored
        );
        assert!(record.action.is_none());
    }

    #[test]
    fn reconfirming_is_idempotent_and_re_reports_ready() {
        let mut record = record();
        record.apply_reaction(&ActorId(1), CompletionSignal::Approve);
        record.apply_reaction(&ActorId(2), CompletionSignal::Approve);

        // A finalization failure leaves the record in place; the next
        // matching reaction must surface Ready again.
        assert_eq!(
            record.apply_reaction(&ActorId(1), CompletionSignal::Approve),
            CompletionProgress::Ready(CompletionAction::Complete)
        );
        assert!(record.client_confirmed && record.worker_confirmed);
    }
}
