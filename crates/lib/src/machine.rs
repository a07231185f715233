//! Conversation state machine: (current state, input) → next state + reply.
//!
//! The table is deterministic and total over [`ChatState`]: pairs without a
//! row are a silent no-op (state unchanged, no reply). Input is matched
//! exactly against the trimmed message body, no case folding.

use serde::Serialize;

/// Per-conversation state. Lives in memory for the process lifetime;
/// a restart resets every conversation to `Unset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChatState {
    #[default]
    Unset,
    AwaitingName,
    MainMenuShown,
    ServiceMenuShown,
    ConsultationMenuShown,
}

/// One row of a selectable list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListRow {
    pub title: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A titled group of rows inside a selectable list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// Outbound reply content: plain text or a selectable list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPayload {
    Text {
        body: String,
    },
    SelectableList {
        description: String,
        button_label: String,
        title: String,
        sections: Vec<ListSection>,
    },
}

/// Result of applying one input to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ChatState,
    pub reply: Option<ReplyPayload>,
}

impl Transition {
    fn to(next: ChatState, reply: ReplyPayload) -> Self {
        Self {
            next,
            reply: Some(reply),
        }
    }

    fn noop(current: ChatState) -> Self {
        Self {
            next: current,
            reply: None,
        }
    }
}

const NAME_PROMPT: &str = "What is your name?";

const ABOUT_MESSAGE: &str = "Wakili Law Firm is a reputable law firm that started in 2024. \
We specialize in all areas of Law. Book a consultation today!";

const HELP_MESSAGE: &str = "Thanks for reaching out and wanting to talk to someone on our team. \
Our hours of operation are Monday to Saturday 8:00AM to 5:00PM. \
Someone from our team will get back to you as soon as possible :)";

const CONSULTATION_CONFIRMED: &str =
    "Your consultation has been scheduled. You will receive a call from our lawyer shortly.";

fn row(title: &str, id: &str, description: Option<&str>) -> ListRow {
    ListRow {
        title: title.to_string(),
        id: id.to_string(),
        description: description.map(str::to_string),
    }
}

/// Main menu list, titled with the name the user just provided.
/// The name goes into the list title trimmed and verbatim; list titles are
/// plain text on the wire, so no markup escaping applies.
fn main_menu(name: &str) -> ReplyPayload {
    ReplyPayload::SelectableList {
        description: "Select which service you are interested in".to_string(),
        button_label: "Tap to select".to_string(),
        title: format!("Welcome to Wakili Law Firm, {}", name.trim()),
        sections: vec![ListSection {
            title: "Select an option".to_string(),
            rows: vec![
                row("Our Services", "1", Some("Learn about our services")),
                row("Consultation", "2", Some("Book a free consultation")),
                row("About Us", "3", Some("Find more info about us")),
                row("Help Line", "4", Some("Get in touch with a representative")),
            ],
        }],
    }
}

fn services_menu() -> ReplyPayload {
    ReplyPayload::SelectableList {
        description: "Select which service you are interested in".to_string(),
        button_label: "Tap to select".to_string(),
        title: "We offer the following services".to_string(),
        sections: vec![ListSection {
            title: "Select an option".to_string(),
            rows: vec![
                row("Land Transactions", "1", None),
                row("Contract Review", "2", None),
                row("Family Law", "3", None),
            ],
        }],
    }
}

fn consultation_menu() -> ReplyPayload {
    // TODO: fetch available slots from the booking calendar instead of this fixed list.
    ReplyPayload::SelectableList {
        description: "Choose a time slot".to_string(),
        button_label: "Tap to select".to_string(),
        title: "We are open from Monday to Friday".to_string(),
        sections: vec![ListSection {
            title: "Select an option".to_string(),
            rows: vec![
                row("9:00AM to 9:30AM", "1", None),
                row("10:00AM to 10:30AM", "2", None),
                row("12:00PM to 12:30PM", "3", None),
                row("1:00PM to 1:30PM", "4", None),
            ],
        }],
    }
}

fn text(body: &str) -> ReplyPayload {
    ReplyPayload::Text {
        body: body.to_string(),
    }
}

/// Apply one trimmed input to the current state.
///
/// `ServiceMenuShown` has no outgoing rows: any input there is a defined
/// no-op, as is any unrecognized input on `MainMenuShown`.
pub fn transition(current: ChatState, input: &str) -> Transition {
    match (current, input) {
        (ChatState::Unset, _) => Transition::to(ChatState::AwaitingName, text(NAME_PROMPT)),
        (ChatState::AwaitingName, name) => {
            Transition::to(ChatState::MainMenuShown, main_menu(name))
        }
        (ChatState::MainMenuShown, "1A") => {
            Transition::to(ChatState::ServiceMenuShown, services_menu())
        }
        (ChatState::MainMenuShown, "1B") => {
            Transition::to(ChatState::ConsultationMenuShown, consultation_menu())
        }
        (ChatState::MainMenuShown, "1C") => Transition::to(ChatState::Unset, text(ABOUT_MESSAGE)),
        (ChatState::MainMenuShown, "1D") => Transition::to(ChatState::Unset, text(HELP_MESSAGE)),
        (ChatState::ConsultationMenuShown, _) => {
            Transition::to(ChatState::Unset, text(CONSULTATION_CONFIRMED))
        }
        (ChatState::MainMenuShown, _) | (ChatState::ServiceMenuShown, _) => {
            Transition::noop(current)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_title(reply: &ReplyPayload) -> &str {
        match reply {
            ReplyPayload::SelectableList { title, .. } => title,
            other => panic!("expected list, got {:?}", other),
        }
    }

    fn list_rows(reply: &ReplyPayload) -> Vec<&str> {
        match reply {
            ReplyPayload::SelectableList { sections, .. } => sections
                .iter()
                .flat_map(|s| s.rows.iter().map(|r| r.title.as_str()))
                .collect(),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn first_contact_asks_for_name() {
        let t = transition(ChatState::Unset, "hello");
        assert_eq!(t.next, ChatState::AwaitingName);
        assert_eq!(
            t.reply,
            Some(ReplyPayload::Text {
                body: "What is your name?".to_string()
            })
        );
    }

    #[test]
    fn name_is_embedded_verbatim_in_main_menu_title() {
        let t = transition(ChatState::AwaitingName, "Amina Odhiambo");
        assert_eq!(t.next, ChatState::MainMenuShown);
        let reply = t.reply.expect("main menu reply");
        assert_eq!(
            list_title(&reply),
            "Welcome to Wakili Law Firm, Amina Odhiambo"
        );
        assert_eq!(list_rows(&reply).len(), 4);
    }

    #[test]
    fn services_submenu_has_exactly_three_rows() {
        let t = transition(ChatState::MainMenuShown, "1A");
        assert_eq!(t.next, ChatState::ServiceMenuShown);
        let reply = t.reply.expect("services reply");
        assert_eq!(
            list_rows(&reply),
            vec!["Land Transactions", "Contract Review", "Family Law"]
        );
    }

    #[test]
    fn consultation_submenu_has_four_slots() {
        let t = transition(ChatState::MainMenuShown, "1B");
        assert_eq!(t.next, ChatState::ConsultationMenuShown);
        assert_eq!(list_rows(&t.reply.expect("slots reply")).len(), 4);
    }

    #[test]
    fn about_and_help_reset_the_conversation() {
        for input in ["1C", "1D"] {
            let t = transition(ChatState::MainMenuShown, input);
            assert_eq!(t.next, ChatState::Unset);
            assert!(matches!(t.reply, Some(ReplyPayload::Text { .. })));
        }
    }

    #[test]
    fn any_slot_choice_confirms_consultation() {
        let t = transition(ChatState::ConsultationMenuShown, "2");
        assert_eq!(t.next, ChatState::Unset);
        assert_eq!(
            t.reply,
            Some(ReplyPayload::Text {
                body: "Your consultation has been scheduled. You will receive a call from our lawyer shortly."
                    .to_string()
            })
        );
    }

    #[test]
    fn unrecognized_main_menu_input_is_a_silent_noop() {
        let t = transition(ChatState::MainMenuShown, "9Z");
        assert_eq!(t.next, ChatState::MainMenuShown);
        assert!(t.reply.is_none());
    }

    #[test]
    fn service_menu_is_a_dead_end_noop() {
        let t = transition(ChatState::ServiceMenuShown, "1");
        assert_eq!(t.next, ChatState::ServiceMenuShown);
        assert!(t.reply.is_none());
    }

    #[test]
    fn transition_is_deterministic() {
        let a = transition(ChatState::AwaitingName, "Kip");
        let b = transition(ChatState::AwaitingName, "Kip");
        assert_eq!(a, b);
    }
}
