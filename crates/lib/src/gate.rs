//! Eligibility gate: pure predicate deciding whether the bot may reply to a
//! conversation. No I/O, no hidden state; first matching rule wins.

use crate::config::Config;
use crate::platform::Chat;

/// Gate configuration, derived from [`Config`] once at startup.
#[derive(Debug, Clone, Default)]
pub struct ReplyRules {
    /// Chats carrying any of these labels are skipped.
    pub skip_labels: Vec<String>,
    /// When non-empty, only these numbers are replied to (authoritative:
    /// the blacklist is never consulted).
    pub numbers_whitelist: Vec<String>,
    /// Numbers never replied to (only when no whitelist is configured).
    pub numbers_blacklist: Vec<String>,
    /// Skip chats the user archived.
    pub skip_archived_chats: bool,
}

impl ReplyRules {
    pub fn from_config(config: &Config) -> Self {
        Self {
            skip_labels: config.skip_chat_with_labels.clone(),
            numbers_whitelist: config.numbers_whitelist.clone(),
            numbers_blacklist: config.numbers_blacklist.clone(),
            skip_archived_chats: config.skip_archived_chats,
        }
    }
}

/// Two-way phone match: the entry equals the raw number, or equals the number
/// with its first character stripped. Tolerates a single leading
/// country-code-prefix digit mismatch (e.g. "254700000000" vs "54700000000").
pub fn matches_number(phone: &str, entry: &str) -> bool {
    entry == phone || phone.get(1..) == Some(entry)
}

fn status_is(chat: &Chat, expected: &str) -> bool {
    chat.status.as_deref().map(str::trim) == Some(expected)
        || chat.wa_status.as_deref().map(str::trim) == Some(expected)
}

/// Decide whether the bot may reply to this chat. Rules are evaluated in
/// order and short-circuit:
///
/// 1. already assigned to a human agent → deny
/// 2. not a direct (1:1) chat → deny
/// 3. chat labels intersect `skip_labels` → deny
/// 4. whitelist configured → allow iff the number matches, deny otherwise
/// 5. blacklist match → deny
/// 6. archived and `skip_archived_chats` → deny
/// 7. banned → deny, regardless of config
/// 8. allow
pub fn can_reply(chat: &Chat, rules: &ReplyRules) -> bool {
    if chat
        .owner
        .as_ref()
        .and_then(|o| o.agent.as_deref())
        .is_some()
    {
        return false;
    }

    if chat.kind.as_deref() != Some("chat") {
        return false;
    }

    if !rules.skip_labels.is_empty()
        && chat
            .labels
            .iter()
            .any(|label| rules.skip_labels.iter().any(|skip| skip == label))
    {
        return false;
    }

    if let Some(phone) = chat.from_number.as_deref() {
        if !rules.numbers_whitelist.is_empty() {
            return rules
                .numbers_whitelist
                .iter()
                .any(|entry| matches_number(phone, entry));
        }

        if !rules.numbers_blacklist.is_empty()
            && rules
                .numbers_blacklist
                .iter()
                .any(|entry| matches_number(phone, entry))
        {
            return false;
        }
    }

    if rules.skip_archived_chats && status_is(chat, "archived") {
        return false;
    }

    if status_is(chat, "banned") {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Chat, ChatOwner};

    fn direct_chat(phone: &str) -> Chat {
        Chat {
            id: "chat-1".to_string(),
            kind: Some("chat".to_string()),
            status: None,
            wa_status: None,
            labels: Vec::new(),
            owner: None,
            contact: None,
            from_number: Some(phone.to_string()),
        }
    }

    #[test]
    fn plain_direct_chat_is_allowed() {
        assert!(can_reply(&direct_chat("254700000001"), &ReplyRules::default()));
    }

    #[test]
    fn assigned_chat_is_denied() {
        let mut chat = direct_chat("254700000001");
        chat.owner = Some(ChatOwner {
            agent: Some("agent-1".to_string()),
        });
        assert!(!can_reply(&chat, &ReplyRules::default()));
    }

    #[test]
    fn group_chat_is_denied() {
        let mut chat = direct_chat("254700000001");
        chat.kind = Some("group".to_string());
        assert!(!can_reply(&chat, &ReplyRules::default()));
    }

    #[test]
    fn skip_label_intersection_is_denied() {
        let mut chat = direct_chat("254700000001");
        chat.labels = vec!["customer".to_string(), "no-bot".to_string()];
        let rules = ReplyRules {
            skip_labels: vec!["no-bot".to_string()],
            ..ReplyRules::default()
        };
        assert!(!can_reply(&chat, &rules));
    }

    #[test]
    fn whitelist_wins_over_blacklist() {
        let chat = direct_chat("254700000001");
        let rules = ReplyRules {
            numbers_whitelist: vec!["254700000001".to_string()],
            numbers_blacklist: vec!["254700000001".to_string()],
            ..ReplyRules::default()
        };
        assert!(can_reply(&chat, &rules));
    }

    #[test]
    fn whitelist_miss_is_denied_without_consulting_later_rules() {
        let chat = direct_chat("254700000002");
        let rules = ReplyRules {
            numbers_whitelist: vec!["254700000001".to_string()],
            ..ReplyRules::default()
        };
        assert!(!can_reply(&chat, &rules));
    }

    #[test]
    fn number_match_tolerates_one_leading_character() {
        assert!(matches_number("254700000000", "54700000000"));
        assert!(matches_number("254700000000", "254700000000"));
        assert!(!matches_number("254700000000", "4700000000"));
    }

    #[test]
    fn blacklisted_number_is_denied() {
        let chat = direct_chat("254769492758");
        let rules = ReplyRules {
            numbers_blacklist: vec!["254769492758".to_string()],
            ..ReplyRules::default()
        };
        assert!(!can_reply(&chat, &rules));
    }

    #[test]
    fn archived_chat_is_denied_when_configured() {
        let mut chat = direct_chat("254700000001");
        chat.wa_status = Some("archived".to_string());
        let rules = ReplyRules {
            skip_archived_chats: true,
            ..ReplyRules::default()
        };
        assert!(!can_reply(&chat, &rules));
        let rules = ReplyRules::default();
        assert!(can_reply(&chat, &rules));
    }

    #[test]
    fn banned_chat_is_always_denied() {
        let mut chat = direct_chat("254700000001");
        chat.status = Some("banned ".to_string());
        assert!(!can_reply(&chat, &ReplyRules::default()));
    }

    #[test]
    fn gate_is_idempotent() {
        let chat = direct_chat("254700000001");
        let rules = ReplyRules {
            numbers_blacklist: vec!["254769492758".to_string()],
            skip_archived_chats: true,
            ..ReplyRules::default()
        };
        assert_eq!(can_reply(&chat, &rules), can_reply(&chat, &rules));
    }
}
