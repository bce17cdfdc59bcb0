use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SelectNext,
    SelectPrevious,
    SelectFirst,
    SelectLast,
    PageDown,
    PageUp,
    LoadOlder,
    LoadNewer,
    Compose,
    Reply,
    ToggleFavourite,
    Boost,
    OpenLinks,
    OpenMedia,
    ShowHome,
    ShowMentions,
    ShowAuthor,
    ShowConversation,
    LeaveConversation,
    EnterCommand,
    Quit,
    CaretBackward,
    CaretForward,
    CaretUp,
    CaretDown,
    LineTop,
    LineBottom,
    DeleteBackward,
    LineBreak,
    ConfirmDraft,
    RunCommand,
    CancelInput,
    Submit,
}

/// Which binding table applies to a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeymapMode {
    /// A feed that pages: home, mentions, user, favourites, list.
    Feed,
    Conversation,
    Composing,
    Command,
    Confirming,
}

type Binding = (KeyModifiers, KeyCode, Action);

const NONE: KeyModifiers = KeyModifiers::NONE;
const CTRL: KeyModifiers = KeyModifiers::CONTROL;
const ALT: KeyModifiers = KeyModifiers::ALT;

const BROWSE: &[Binding] = &[
    (NONE, KeyCode::Down, Action::SelectNext),
    (NONE, KeyCode::Up, Action::SelectPrevious),
    (NONE, KeyCode::Home, Action::SelectFirst),
    (NONE, KeyCode::End, Action::SelectLast),
    (NONE, KeyCode::PageDown, Action::PageDown),
    (NONE, KeyCode::PageUp, Action::PageUp),
    (NONE, KeyCode::Right, Action::ShowConversation),
    (CTRL, KeyCode::Char('s'), Action::Compose),
    (CTRL, KeyCode::Char('w'), Action::Reply),
    (CTRL, KeyCode::Char('f'), Action::ToggleFavourite),
    (CTRL, KeyCode::Char('v'), Action::Boost),
    (CTRL, KeyCode::Char('o'), Action::OpenLinks),
    (CTRL, KeyCode::Char('p'), Action::OpenMedia),
    (CTRL, KeyCode::Char('z'), Action::ShowHome),
    (CTRL, KeyCode::Char('x'), Action::ShowMentions),
    (CTRL, KeyCode::Char('d'), Action::ShowAuthor),
    (ALT, KeyCode::Char('x'), Action::EnterCommand),
    (CTRL, KeyCode::Char('q'), Action::Quit),
];

const PAGED: &[Binding] = &[
    (NONE, KeyCode::Enter, Action::LoadOlder),
    (NONE, KeyCode::Char(' '), Action::LoadOlder),
    (CTRL, KeyCode::Char('r'), Action::LoadNewer),
];

const CONVERSATION: &[Binding] = &[(NONE, KeyCode::Left, Action::LeaveConversation)];

const EDITING: &[Binding] = &[
    (NONE, KeyCode::Left, Action::CaretBackward),
    (NONE, KeyCode::Right, Action::CaretForward),
    (NONE, KeyCode::Up, Action::CaretUp),
    (NONE, KeyCode::Down, Action::CaretDown),
    (CTRL, KeyCode::Char('a'), Action::LineTop),
    (CTRL, KeyCode::Char('e'), Action::LineBottom),
    (NONE, KeyCode::Backspace, Action::DeleteBackward),
    (NONE, KeyCode::Esc, Action::CancelInput),
    (CTRL, KeyCode::Char('g'), Action::CancelInput),
];

const COMPOSING: &[Binding] = &[
    (NONE, KeyCode::Enter, Action::LineBreak),
    (CTRL, KeyCode::Char('j'), Action::ConfirmDraft),
];

const COMMAND: &[Binding] = &[(NONE, KeyCode::Enter, Action::RunCommand)];

const CONFIRMING: &[Binding] = &[
    (NONE, KeyCode::Enter, Action::Submit),
    (NONE, KeyCode::Esc, Action::CancelInput),
    (CTRL, KeyCode::Char('g'), Action::CancelInput),
];

fn tables(mode: KeymapMode) -> &'static [&'static [Binding]] {
    match mode {
        KeymapMode::Feed => &[PAGED, BROWSE],
        KeymapMode::Conversation => &[CONVERSATION, BROWSE],
        KeymapMode::Composing => &[COMPOSING, EDITING],
        KeymapMode::Command => &[COMMAND, EDITING],
        KeymapMode::Confirming => &[CONFIRMING],
    }
}

fn significant_modifiers(event: &KeyEvent) -> KeyModifiers {
    let mut modifiers = event.modifiers;
    if matches!(event.code, KeyCode::Char(_)) {
        modifiers.remove(KeyModifiers::SHIFT);
    }
    modifiers
}

pub fn resolve_action(event: &KeyEvent, mode: KeymapMode) -> Option<Action> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    let modifiers = significant_modifiers(event);
    tables(mode)
        .iter()
        .flat_map(|table| table.iter())
        .find(|(mods, code, _)| *mods == modifiers && *code == event.code)
        .map(|(_, _, action)| *action)
}

/// The character an unbound key types into a draft, if any.
pub fn literal_char(event: &KeyEvent) -> Option<char> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    match event.code {
        KeyCode::Char(ch) if significant_modifiers(event).is_empty() => Some(ch),
        KeyCode::Tab if event.modifiers.is_empty() => Some('\t'),
        _ => None,
    }
}
