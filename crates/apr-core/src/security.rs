use crate::domain::{ChatId, InboundMessage};

/// Who may feed the relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourcePolicy {
    pub source_chat: Option<ChatId>,
    pub authorized_senders: Vec<i64>,
    pub destination: ChatId,
}

/// A message is relayed when it comes from the monitored chat or an authorized
/// sender. Nothing posted in the destination is ever picked up again.
pub fn is_authorized(msg: &InboundMessage, policy: &SourcePolicy) -> bool {
    if msg.chat_id == policy.destination {
        return false;
    }
    if policy.source_chat == Some(msg.chat_id) {
        return true;
    }
    let Some(sender) = msg.sender else {
        return false;
    };
    policy.authorized_senders.contains(&sender.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageBody, UserId};
    use chrono::Utc;

    fn msg(chat: i64, sender: Option<i64>) -> InboundMessage {
        InboundMessage {
            chat_id: ChatId(chat),
            sender: sender.map(UserId),
            received_at: Utc::now(),
            body: MessageBody::Text("x".into()),
        }
    }

    fn policy(source: Option<i64>, senders: Vec<i64>) -> SourcePolicy {
        SourcePolicy {
            source_chat: source.map(ChatId),
            authorized_senders: senders,
            destination: ChatId(-200),
        }
    }

    #[test]
    fn source_chat_is_authorized_regardless_of_sender() {
        let p = policy(Some(-100), vec![]);
        assert!(is_authorized(&msg(-100, None), &p));
        assert!(is_authorized(&msg(-100, Some(9)), &p));
        assert!(!is_authorized(&msg(-101, Some(9)), &p));
    }

    #[test]
    fn authorized_sender_is_accepted_from_any_chat() {
        let p = policy(None, vec![42]);
        assert!(is_authorized(&msg(42, Some(42)), &p));
        assert!(is_authorized(&msg(-555, Some(42)), &p));
        assert!(!is_authorized(&msg(-555, Some(43)), &p));
        assert!(!is_authorized(&msg(-555, None), &p));
    }

    #[test]
    fn destination_chat_is_never_relayed() {
        let p = policy(Some(-200), vec![42]);
        assert!(!is_authorized(&msg(-200, Some(42)), &p));
    }
}
