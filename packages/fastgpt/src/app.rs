//! Chat screen state: conversation, model selection, prompt editor.
//!
//! Key handling lives here and is independent of the terminal so it can be
//! driven from tests. The event loop in `cli::tui` turns [`Action`]s into
//! session calls.

use fastgpt_stream::{ChatError, ConnectionState, Conversation, GenerateRequest, ModelList, SendOutcome};
use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::{debug, warn};

use crate::session::Update;

/// What the event loop has to do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Submit(String),
    Quit,
}

pub struct ChatApp {
    conversation: Conversation,
    models: Vec<String>,
    selected: Option<usize>,
    test_input: bool,
    test_prompt: String,
    input: String,
    /// Byte offset into `input`, always on a char boundary.
    cursor: usize,
    state: ConnectionState,
    status: Option<String>,
    server: String,
    /// Render key of the fenced block still waiting for its closing fence.
    open_block: Option<String>,
}

impl ChatApp {
    pub fn new(server: impl Into<String>, test_input: bool, test_prompt: impl Into<String>) -> Self {
        Self {
            conversation: Conversation::new(),
            models: Vec::new(),
            selected: None,
            test_input,
            test_prompt: test_prompt.into(),
            input: String::new(),
            cursor: 0,
            state: ConnectionState::Idle,
            status: None,
            server: server.into(),
            open_block: None,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected
            .and_then(|i| self.models.get(i))
            .map(String::as_str)
    }

    pub fn test_input(&self) -> bool {
        self.test_input
    }

    pub fn test_prompt(&self) -> &str {
        &self.test_prompt
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Whether the prose pane ends in an unterminated code block.
    pub fn streaming_code(&self) -> bool {
        self.open_block.is_some()
    }

    /// Replace the model list. The preferred model is selected when the
    /// server offers it, otherwise the first entry.
    pub fn set_models(&mut self, list: ModelList, preferred: Option<&str>) {
        self.models = list.gpt_models;
        self.selected = if self.models.is_empty() {
            None
        } else {
            Some(
                preferred
                    .and_then(|p| self.models.iter().position(|m| m == p))
                    .unwrap_or(0),
            )
        };
    }

    pub fn next_model(&mut self) {
        if let Some(i) = self.selected {
            self.selected = Some((i + 1) % self.models.len());
        }
    }

    pub fn prev_model(&mut self) {
        if let Some(i) = self.selected {
            let n = self.models.len();
            self.selected = Some((i + n - 1) % n);
        }
    }

    /// Request envelope for a prompt under the current selections.
    ///
    /// With no model list the model is sent empty and the server decides.
    pub fn request(&self, prompt: impl Into<String>) -> GenerateRequest {
        GenerateRequest::new(
            self.selected_model().unwrap_or_default(),
            prompt,
            self.test_input,
        )
    }

    pub fn apply_update(&mut self, update: Update) {
        match update {
            Update::Sent(prompt) => {
                self.status = None;
                self.conversation.begin_turn(&prompt);
            }
            Update::Fragment(fragment) => {
                self.conversation.apply(fragment);
                self.track_open_block();
            }
            Update::State(state) => {
                self.state = state;
                self.status = match state {
                    ConnectionState::Closed => {
                        Some("connection closed; the next prompt reconnects".to_string())
                    }
                    ConnectionState::Open => None,
                    _ => self.status.take(),
                };
            }
        }
    }

    /// Empty both panes. The connection is left alone.
    pub fn clear(&mut self) {
        self.conversation.clear();
        self.status = None;
        self.open_block = None;
    }

    fn track_open_block(&mut self) {
        let open = self
            .conversation
            .segments()
            .last()
            .filter(|seg| seg.is_open)
            .map(|seg| seg.key());
        if open != self.open_block {
            match (&self.open_block, &open) {
                (Some(done), _) => debug!(block = %done, "code block closed"),
                (None, Some(started)) => debug!(block = %started, "code block started"),
                (None, None) => {}
            }
            self.open_block = open;
        }
    }

    /// Reflect the result of a submission in the status line.
    pub fn record_outcome(&mut self, outcome: Result<SendOutcome, ChatError>) {
        self.status = match outcome {
            Ok(SendOutcome::Sent) => None,
            Ok(SendOutcome::Deferred) => Some("connecting; prompt will be sent once open".to_string()),
            Err(ChatError::SendPending) => {
                Some("a prompt is already waiting for the connection".to_string())
            }
            Err(e) => {
                warn!(code = e.error_code(), misuse = e.is_misuse(), "send failed: {e}");
                Some(format!("send failed: {e}"))
            }
        };
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.kind != KeyEventKind::Press {
            return Action::None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Esc => return Action::Quit,
            KeyCode::Char('c') if ctrl => return Action::Quit,
            KeyCode::Char('l') if ctrl => self.clear(),
            KeyCode::Char('t') if ctrl => return Action::Submit(self.test_prompt.clone()),
            KeyCode::Char('o') if ctrl => self.test_input = !self.test_input,
            KeyCode::Char('n') if ctrl => self.next_model(),
            KeyCode::Char('p') if ctrl => self.prev_model(),
            KeyCode::Enter
                if key
                    .modifiers
                    .intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) =>
            {
                self.insert('\n');
            }
            KeyCode::Enter => {
                if self.input.trim().is_empty() {
                    return Action::None;
                }
                self.cursor = 0;
                return Action::Submit(std::mem::take(&mut self.input));
            }
            KeyCode::Backspace => {
                if self.cursor > 0 {
                    let prev = self.prev_boundary();
                    self.input.remove(prev);
                    self.cursor = prev;
                }
            }
            KeyCode::Delete => {
                if self.cursor < self.input.len() {
                    self.input.remove(self.cursor);
                }
            }
            KeyCode::Left => self.cursor = self.prev_boundary(),
            KeyCode::Right => self.cursor = self.next_boundary(),
            KeyCode::Home => self.cursor = self.line_start(),
            KeyCode::End => {
                self.cursor = self.input[self.cursor..]
                    .find('\n')
                    .map_or(self.input.len(), |i| self.cursor + i);
            }
            KeyCode::Char(c) if !ctrl => self.insert(c),
            _ => {}
        }
        Action::None
    }

    /// Cursor as (row, column) within the prompt text, in chars.
    pub fn cursor_position(&self) -> (usize, usize) {
        let before = &self.input[..self.cursor];
        let row = before.matches('\n').count();
        let col = before[self.line_start()..].chars().count();
        (row, col)
    }

    fn insert(&mut self, c: char) {
        self.input.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    fn prev_boundary(&self) -> usize {
        self.input[..self.cursor]
            .char_indices()
            .next_back()
            .map_or(0, |(i, _)| i)
    }

    fn next_boundary(&self) -> usize {
        self.input[self.cursor..]
            .chars()
            .next()
            .map_or(self.cursor, |c| self.cursor + c.len_utf8())
    }

    fn line_start(&self) -> usize {
        self.input[..self.cursor].rfind('\n').map_or(0, |i| i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastgpt_stream::Fragment;

    fn app() -> ChatApp {
        ChatApp::new("ws://localhost:8000/generate", false, "test prompt")
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_str(app: &mut ChatApp, s: &str) {
        for c in s.chars() {
            app.handle_key(press(KeyCode::Char(c)));
        }
    }

    fn models(names: &[&str]) -> ModelList {
        ModelList {
            gpt_models: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    // ── prompt editing ───────────────────────────────────────────────

    #[test]
    fn enter_submits_and_clears_input() {
        let mut app = app();
        type_str(&mut app, "hello");
        assert_eq!(app.handle_key(press(KeyCode::Enter)), Action::Submit("hello".into()));
        assert_eq!(app.input(), "");
        assert_eq!(app.cursor_position(), (0, 0));
    }

    #[test]
    fn blank_prompt_is_not_submitted() {
        let mut app = app();
        type_str(&mut app, "  ");
        assert_eq!(app.handle_key(press(KeyCode::Enter)), Action::None);
        assert_eq!(app.input(), "  ");
    }

    #[test]
    fn shift_enter_inserts_newline() {
        let mut app = app();
        type_str(&mut app, "a");
        app.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT));
        type_str(&mut app, "bc");
        assert_eq!(app.input(), "a\nbc");
        assert_eq!(app.cursor_position(), (1, 2));
    }

    #[test]
    fn cursor_moves_over_multibyte_chars() {
        let mut app = app();
        type_str(&mut app, "aé");
        app.handle_key(press(KeyCode::Left));
        app.handle_key(press(KeyCode::Backspace));
        assert_eq!(app.input(), "é");
        app.handle_key(press(KeyCode::Right));
        type_str(&mut app, "z");
        assert_eq!(app.input(), "éz");
    }

    #[test]
    fn home_and_end_stay_on_current_line() {
        let mut app = app();
        type_str(&mut app, "ab");
        app.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::ALT));
        type_str(&mut app, "cd");
        app.handle_key(press(KeyCode::Home));
        assert_eq!(app.cursor_position(), (1, 0));
        app.handle_key(press(KeyCode::End));
        assert_eq!(app.cursor_position(), (1, 2));
    }

    #[test]
    fn release_events_are_ignored() {
        let mut app = app();
        let mut key = press(KeyCode::Char('x'));
        key.kind = KeyEventKind::Release;
        assert_eq!(app.handle_key(key), Action::None);
        assert_eq!(app.input(), "");
    }

    // ── shortcuts ────────────────────────────────────────────────────

    #[test]
    fn quit_keys() {
        let mut app = app();
        assert_eq!(app.handle_key(press(KeyCode::Esc)), Action::Quit);
        assert_eq!(app.handle_key(ctrl('c')), Action::Quit);
    }

    #[test]
    fn ctrl_t_submits_test_prompt_without_touching_input() {
        let mut app = app();
        type_str(&mut app, "draft");
        assert_eq!(app.handle_key(ctrl('t')), Action::Submit("test prompt".into()));
        assert_eq!(app.input(), "draft");
    }

    #[test]
    fn ctrl_o_toggles_test_input() {
        let mut app = app();
        app.handle_key(ctrl('o'));
        assert!(app.test_input());
        assert!(app.request("x").test_input());
        app.handle_key(ctrl('o'));
        assert!(!app.test_input());
    }

    #[test]
    fn ctrl_l_clears_conversation() {
        let mut app = app();
        app.apply_update(Update::Sent("hi".into()));
        app.apply_update(Update::Fragment(Fragment::Code("x = 1".into())));
        app.handle_key(ctrl('l'));
        assert!(app.conversation().is_empty());
    }

    // ── models ───────────────────────────────────────────────────────

    #[test]
    fn first_model_selected_by_default() {
        let mut app = app();
        app.set_models(models(&["gpt-4", "llama"]), None);
        assert_eq!(app.selected_model(), Some("gpt-4"));
        assert_eq!(app.request("p").model(), "gpt-4");
    }

    #[test]
    fn preferred_model_wins_when_listed() {
        let mut app = app();
        app.set_models(models(&["gpt-4", "llama"]), Some("llama"));
        assert_eq!(app.selected_model(), Some("llama"));
        app.set_models(models(&["gpt-4"]), Some("missing"));
        assert_eq!(app.selected_model(), Some("gpt-4"));
    }

    #[test]
    fn model_cycling_wraps() {
        let mut app = app();
        app.set_models(models(&["a", "b", "c"]), None);
        app.handle_key(ctrl('p'));
        assert_eq!(app.selected_model(), Some("c"));
        app.handle_key(ctrl('n'));
        app.handle_key(ctrl('n'));
        assert_eq!(app.selected_model(), Some("b"));
    }

    #[test]
    fn no_models_sends_empty_model() {
        let mut app = app();
        app.set_models(ModelList::default(), None);
        app.handle_key(ctrl('n'));
        assert_eq!(app.selected_model(), None);
        assert_eq!(app.request("p").model(), "");
    }

    // ── updates ──────────────────────────────────────────────────────

    #[test]
    fn updates_feed_conversation() {
        let mut app = app();
        app.apply_update(Update::Sent("hi".into()));
        app.apply_update(Update::Fragment(Fragment::Prose("Hello".into())));
        assert_eq!(app.conversation().prose(), "User: \nhi\n\nFastGPT: \nHello");
    }

    #[test]
    fn closed_state_sets_status() {
        let mut app = app();
        app.apply_update(Update::State(ConnectionState::Open));
        assert_eq!(app.state(), ConnectionState::Open);
        assert!(app.status().is_none());
        app.apply_update(Update::State(ConnectionState::Closed));
        assert!(app.status().unwrap().contains("reconnects"));
    }

    #[test]
    fn open_fence_marks_code_as_streaming() {
        let mut app = app();
        app.apply_update(Update::Fragment(Fragment::Prose("Here:\n```py\nx = ".into())));
        assert!(app.streaming_code());
        app.apply_update(Update::Fragment(Fragment::Prose("1\n```\n".into())));
        assert!(!app.streaming_code());
        app.apply_update(Update::Fragment(Fragment::Prose("```sh\nls".into())));
        assert!(app.streaming_code());
        app.clear();
        assert!(!app.streaming_code());
    }

    #[test]
    fn transport_failure_is_reported() {
        let mut app = app();
        app.record_outcome(Err(ChatError::Transport("socket gone".into())));
        assert_eq!(app.status(), Some("send failed: transport failure: socket gone"));
    }

    #[test]
    fn outcome_messages() {
        let mut app = app();
        app.record_outcome(Ok(SendOutcome::Deferred));
        assert!(app.status().unwrap().starts_with("connecting"));
        app.record_outcome(Err(ChatError::SendPending));
        assert!(app.status().unwrap().contains("already waiting"));
        app.record_outcome(Ok(SendOutcome::Sent));
        assert!(app.status().is_none());
    }
}
