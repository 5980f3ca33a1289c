use tokio::task::JoinHandle;

use crate::client::{ReplyClient, ReplyError, FALLBACK_REPLY};

/// One exchange unit in the transcript, tagged by sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub text: String,
    pub from_user: bool,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            from_user: true,
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            from_user: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Convert a character index to a byte index for UTF-8 safe string edits
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Transcript state (append-only, insertion order is display order)
    pub transcript: Vec<Turn>,
    pub transcript_scroll: u16,
    pub transcript_height: u16, // inner height of the transcript pane, set during render
    pub transcript_width: u16,  // inner width, for wrap calculations

    // Draft state
    pub draft: String,
    pub draft_cursor: usize, // cursor position in chars, not bytes

    // Outstanding submission. `pending` is true from the moment a submission
    // begins until its outcome is applied, and guards against reentry.
    pub pending: bool,
    pub reply_task: Option<JoinHandle<Result<String, ReplyError>>>,

    // Animation state for the typing indicator (0-2 for ellipsis)
    pub animation_frame: u8,

    pub client: ReplyClient,
}

impl App {
    pub fn new(client: ReplyClient) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            transcript: Vec::new(),
            transcript_scroll: 0,
            transcript_height: 0,
            transcript_width: 0,

            draft: String::new(),
            draft_cursor: 0,

            pending: false,
            reply_task: None,

            animation_frame: 0,

            client,
        }
    }

    /// Submit the current draft as a new user turn and request a reply.
    ///
    /// A no-op when the draft is blank or a submission is already in
    /// flight. Otherwise the trimmed draft is appended to the transcript,
    /// the draft is cleared (and never rolled back), and the request is
    /// spawned so the event loop stays responsive while it runs.
    pub fn submit(&mut self) {
        if self.pending {
            return;
        }
        let message = self.draft.trim();
        if message.is_empty() {
            return;
        }
        let message = message.to_string();

        self.transcript.push(Turn::user(message.clone()));
        self.draft.clear();
        self.draft_cursor = 0;
        self.pending = true;
        self.scroll_to_bottom();

        tracing::info!(chars = message.chars().count(), "submitting chat message");
        let client = self.client.clone();
        self.reply_task = Some(tokio::spawn(async move { client.send(&message).await }));
    }

    /// Apply the outcome of the outstanding submission, if it has settled.
    ///
    /// Exactly one responder turn is appended per submission: the reply text
    /// on success, the failure's user message otherwise. Every settle path,
    /// including a panicked task, clears `pending` so the guard can never
    /// stick.
    pub async fn poll_reply(&mut self) {
        let finished = self
            .reply_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(task) = self.reply_task.take() {
            let text = match task.await {
                Ok(Ok(reply)) => reply,
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "chat request failed");
                    err.user_message()
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "reply task aborted");
                    FALLBACK_REPLY.to_string()
                }
            };
            self.transcript.push(Turn::agent(text));
            self.pending = false;
            self.scroll_to_bottom();
        }
    }

    /// Tick the typing-indicator animation (called by Tick event)
    pub fn on_tick(&mut self) {
        if self.pending {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Draft editing

    pub fn insert_draft_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.draft, self.draft_cursor);
        self.draft.insert(byte_pos, c);
        self.draft_cursor += 1;
    }

    pub fn delete_draft_char_before(&mut self) {
        if self.draft_cursor > 0 {
            self.draft_cursor -= 1;
            let byte_pos = char_to_byte_index(&self.draft, self.draft_cursor);
            self.draft.remove(byte_pos);
        }
    }

    pub fn delete_draft_char_at(&mut self) {
        if self.draft_cursor < self.draft.chars().count() {
            let byte_pos = char_to_byte_index(&self.draft, self.draft_cursor);
            self.draft.remove(byte_pos);
        }
    }

    pub fn draft_cursor_left(&mut self) {
        self.draft_cursor = self.draft_cursor.saturating_sub(1);
    }

    pub fn draft_cursor_right(&mut self) {
        self.draft_cursor = (self.draft_cursor + 1).min(self.draft.chars().count());
    }

    pub fn draft_cursor_home(&mut self) {
        self.draft_cursor = 0;
    }

    pub fn draft_cursor_end(&mut self) {
        self.draft_cursor = self.draft.chars().count();
    }

    // Transcript scrolling

    pub fn scroll_up(&mut self) {
        self.transcript_scroll = self.transcript_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        self.transcript_scroll = self.transcript_scroll.saturating_add(1);
    }

    pub fn scroll_to_top(&mut self) {
        self.transcript_scroll = 0;
    }

    /// Scroll so the newest turn (and the typing indicator) is visible.
    pub fn scroll_to_bottom(&mut self) {
        // Use the actual pane width for wrap calculation, default if unset
        let wrap_width = if self.transcript_width > 0 {
            self.transcript_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for turn in &self.transcript {
            total_lines += turn_line_count(turn, wrap_width);
        }
        if self.pending {
            total_lines += 2; // sender label + typing line
        }

        let visible_height = if self.transcript_height > 0 {
            self.transcript_height
        } else {
            20
        };

        self.transcript_scroll = total_lines.saturating_sub(visible_height);
    }
}

/// Rendered line count of one turn at the given wrap width: sender label,
/// wrapped content (an empty reply still occupies one line), blank separator.
fn turn_line_count(turn: &Turn, wrap_width: usize) -> u16 {
    let mut lines: u16 = 1;
    if turn.text.is_empty() {
        lines += 1;
    } else {
        for line in turn.text.lines() {
            // Character count, not byte length, for proper UTF-8 handling
            let char_count = line.chars().count();
            if char_count == 0 {
                lines += 1;
            } else {
                lines += ((char_count / wrap_width.max(1)) + 1) as u16;
            }
        }
    }
    lines + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app_for(endpoint: &str) -> App {
        App::new(ReplyClient::new(endpoint))
    }

    async fn mock_server(response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(response)
            .mount(&server)
            .await;
        server
    }

    /// Drive poll_reply until the outstanding submission settles.
    async fn settle(app: &mut App) {
        for _ in 0..500 {
            app.poll_reply().await;
            if !app.pending {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("reply never settled");
    }

    #[test]
    fn submit_ignores_blank_draft() {
        let mut app = app_for("http://localhost:8000/api/chat");
        for draft in ["", "   ", "\t \n"] {
            app.draft = draft.to_string();
            app.submit();
            assert!(app.transcript.is_empty());
            assert!(!app.pending);
            assert!(app.reply_task.is_none());
        }
    }

    #[test]
    fn submit_is_rejected_while_pending() {
        let mut app = app_for("http://localhost:8000/api/chat");
        app.pending = true;
        app.draft = "hi".to_string();
        app.submit();
        assert!(app.transcript.is_empty());
        assert_eq!(app.draft, "hi");
    }

    #[tokio::test]
    async fn submit_appends_trimmed_user_turn_and_clears_draft() {
        let server = mock_server(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "hello"})),
        )
        .await;
        let mut app = app_for(&format!("{}/api/chat", server.uri()));

        app.draft = "  hi  ".to_string();
        app.draft_cursor = 6;
        app.submit();

        assert_eq!(app.transcript, vec![Turn::user("hi")]);
        assert_eq!(app.draft, "");
        assert_eq!(app.draft_cursor, 0);
        assert!(app.pending);

        settle(&mut app).await;
    }

    #[tokio::test]
    async fn round_trip_appends_one_responder_turn() {
        let server = mock_server(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "hello"})),
        )
        .await;
        let mut app = app_for(&format!("{}/api/chat", server.uri()));

        app.draft = "hi".to_string();
        app.submit();
        settle(&mut app).await;

        assert_eq!(app.transcript, vec![Turn::user("hi"), Turn::agent("hello")]);
        assert!(!app.pending);
        assert!(app.reply_task.is_none());
    }

    #[tokio::test]
    async fn service_failure_becomes_a_responder_turn() {
        let server = mock_server(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({"detail": "rate limited"})),
        )
        .await;
        let mut app = app_for(&format!("{}/api/chat", server.uri()));

        app.draft = "hi".to_string();
        app.submit();
        settle(&mut app).await;

        assert_eq!(
            app.transcript,
            vec![Turn::user("hi"), Turn::agent("rate limited")]
        );

        // The controller stays usable after a failure
        app.draft = "again".to_string();
        app.submit();
        assert!(app.pending);
        settle(&mut app).await;
        assert_eq!(app.transcript.len(), 4);
    }

    #[tokio::test]
    async fn transport_failure_appends_fallback_turn() {
        let server = MockServer::start().await;
        let endpoint = format!("{}/api/chat", server.uri());
        drop(server);
        let mut app = app_for(&endpoint);

        app.draft = "hi".to_string();
        app.submit();
        settle(&mut app).await;

        assert_eq!(app.transcript.last().unwrap().text, FALLBACK_REPLY);
        assert!(!app.transcript.last().unwrap().from_user);
    }

    #[tokio::test]
    async fn empty_reply_is_a_valid_turn() {
        let server = mock_server(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": ""})),
        )
        .await;
        let mut app = app_for(&format!("{}/api/chat", server.uri()));

        app.draft = "hi".to_string();
        app.submit();
        settle(&mut app).await;

        assert_eq!(app.transcript, vec![Turn::user("hi"), Turn::agent("")]);
    }

    #[tokio::test]
    async fn panicked_task_still_clears_pending() {
        let mut app = app_for("http://localhost:8000/api/chat");
        app.pending = true;
        app.reply_task = Some(tokio::spawn(async { panic!("boom") }));

        settle(&mut app).await;

        assert!(!app.pending);
        assert_eq!(app.transcript.last().unwrap().text, FALLBACK_REPLY);
    }

    #[test]
    fn draft_editing_never_touches_transcript_or_pending() {
        let mut app = app_for("http://localhost:8000/api/chat");
        app.insert_draft_char('h');
        app.insert_draft_char('i');
        app.draft_cursor_left();
        app.delete_draft_char_at();
        app.draft_cursor_home();
        app.delete_draft_char_before();
        assert!(app.transcript.is_empty());
        assert!(!app.pending);
    }

    #[test]
    fn draft_editing_is_utf8_safe() {
        let mut app = app_for("http://localhost:8000/api/chat");
        for c in "héllo".chars() {
            app.insert_draft_char(c);
        }
        assert_eq!(app.draft, "héllo");
        assert_eq!(app.draft_cursor, 5);

        // Delete the multi-byte char in the middle
        app.draft_cursor = 2;
        app.delete_draft_char_before();
        assert_eq!(app.draft, "hllo");
        assert_eq!(app.draft_cursor, 1);

        app.draft_cursor_end();
        assert_eq!(app.draft_cursor, 4);
        app.delete_draft_char_before();
        assert_eq!(app.draft, "hll");
    }

    #[test]
    fn turn_line_count_wraps_and_handles_empty_text() {
        let short = Turn::user("hi");
        assert_eq!(turn_line_count(&short, 50), 3); // label + text + blank

        let empty = Turn::agent("");
        assert_eq!(turn_line_count(&empty, 50), 3);

        let long = Turn::agent("a".repeat(120));
        assert_eq!(turn_line_count(&long, 50), 5); // label + 3 wrapped + blank
    }
}
