//! Conversation state.
//!
//! A [`ChatSession`] is the append-only log of turns for one user.  It is always seeded with
//! the system turn, which is sent to the model but never rendered.  A [`SessionStore`] holds
//! many isolated sessions and implements the create-on-first-request / destroy-on-end
//! lifecycle.

use std::collections::HashMap;
use std::fmt;

use futures::{Stream, StreamExt};

use crate::Renderer;
use crate::error::Result;
use crate::observability::{SESSION_TURNS, SESSIONS_CREATED, SESSIONS_ENDED};
use crate::types::{Role, Turn};

/// Instructions every session starts with.
pub const SYSTEM_PROMPT: &str = "Tu es un professionnel de la programmation qui aide à apprendre à programmer. Répondre brièvement en francais aux entrées de l'utilisateur.";

/// An ordered, append-only log of turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    turns: Vec<Turn>,
}

/// Turn counts for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    /// Total turns, system turn included.
    pub total_turns: usize,
    /// Turns authored by the user.
    pub user_turns: usize,
    /// Turns authored by the assistant.
    pub assistant_turns: usize,
}

impl ChatSession {
    /// Creates a session seeded with the tutor's system prompt.
    pub fn new() -> Self {
        Self::with_system_prompt(SYSTEM_PROMPT)
    }

    /// Creates a session seeded with a custom system prompt.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(prompt)],
        }
    }

    /// Appends a turn.
    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        SESSION_TURNS.click();
        self.turns.push(Turn::new(role, content));
    }

    /// Appends a turn whose role is given by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRole`](crate::Error::InvalidRole) unless `role` is `system`,
    /// `user` or `assistant`.  The session is left untouched on error.
    pub fn add_str(&mut self, role: &str, content: impl Into<String>) -> Result<()> {
        let role = role.parse::<Role>()?;
        self.add(role, content);
        Ok(())
    }

    /// Every turn, system turn first.  This is what gets sent to the model.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The system turn the session was seeded with.
    pub fn system_turn(&self) -> &Turn {
        &self.turns[0]
    }

    /// The turns a user gets to see, in chronological order.
    pub fn history(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|turn| turn.role() != Role::System)
    }

    /// Returns the number of turns, system turn included.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false; a session holds at least its system turn.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Renders every visible turn, oldest first.
    pub fn render_history(&self, renderer: &mut dyn Renderer) {
        for turn in self.history() {
            renderer.print_turn(turn.role(), turn.content());
        }
    }

    /// Renders fragments as they arrive and returns their concatenation.
    ///
    /// Nothing in the session changes; the caller appends the returned text.  If the renderer
    /// reports an interrupt, consumption stops and the text received so far is returned.
    ///
    /// # Errors
    ///
    /// The first error yielded by `fragments` is returned and the rest of the stream is
    /// dropped.
    pub async fn render_stream<S>(fragments: S, renderer: &mut dyn Renderer) -> Result<String>
    where
        S: Stream<Item = Result<String>> + Unpin,
    {
        let mut fragments = fragments;
        let mut reply = String::new();
        renderer.start_response(Role::Assistant);
        while let Some(fragment) = fragments.next().await {
            if renderer.should_interrupt() {
                renderer.print_interrupted();
                return Ok(reply);
            }
            let fragment = fragment?;
            renderer.print_text(&fragment);
            reply.push_str(&fragment);
        }
        renderer.finish_response();
        Ok(reply)
    }

    /// Returns turn counts for the session.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            total_turns: self.turns.len(),
            user_turns: self
                .turns
                .iter()
                .filter(|t| t.role() == Role::User)
                .count(),
            assistant_turns: self
                .turns
                .iter()
                .filter(|t| t.role() == Role::Assistant)
                .count(),
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies one session within a [`SessionStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Isolated sessions keyed by [`SessionId`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    system_prompt: String,
    sessions: HashMap<SessionId, ChatSession>,
}

impl SessionStore {
    /// Creates an empty store whose sessions use the tutor's system prompt.
    pub fn new() -> Self {
        Self::with_system_prompt(SYSTEM_PROMPT)
    }

    /// Creates an empty store whose sessions use `prompt`.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: prompt.into(),
            sessions: HashMap::new(),
        }
    }

    /// Returns the session for `id`, creating and seeding it on first use.
    ///
    /// Calling this again for a live session returns it unchanged.
    pub fn get_or_create(&mut self, id: &SessionId) -> &mut ChatSession {
        let prompt = &self.system_prompt;
        self.sessions.entry(id.clone()).or_insert_with(|| {
            SESSIONS_CREATED.click();
            tracing::debug!(session = %id, "created session");
            ChatSession::with_system_prompt(prompt.clone())
        })
    }

    /// Returns the session for `id` if it exists.
    pub fn get(&self, id: &SessionId) -> Option<&ChatSession> {
        self.sessions.get(id)
    }

    /// Destroys the session for `id`, returning its final state.
    pub fn end(&mut self, id: &SessionId) -> Option<ChatSession> {
        let session = self.sessions.remove(id);
        if session.is_some() {
            SESSIONS_ENDED.click();
            tracing::debug!(session = %id, "ended session");
        }
        session
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true when no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct CaptureRenderer {
        turns: Vec<(Role, String)>,
        text: Vec<String>,
        finished: bool,
        interrupt_after: Option<usize>,
        interrupted: bool,
    }

    impl Renderer for CaptureRenderer {
        fn print_turn(&mut self, role: Role, content: &str) {
            self.turns.push((role, content.to_string()));
        }

        fn print_text(&mut self, text: &str) {
            self.text.push(text.to_string());
        }

        fn finish_response(&mut self) {
            self.finished = true;
        }

        fn print_error(&mut self, _: &str) {}

        fn print_info(&mut self, _: &str) {}

        fn print_interrupted(&mut self) {
            self.interrupted = true;
        }

        fn should_interrupt(&self) -> bool {
            self.interrupt_after
                .is_some_and(|limit| self.text.len() >= limit)
        }
    }

    fn fragments(parts: &[&str]) -> impl Stream<Item = Result<String>> + Unpin {
        futures::stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn new_session_is_seeded_with_system_turn() {
        let session = ChatSession::new();
        assert_eq!(session.len(), 1);
        assert_eq!(session.system_turn(), &Turn::system(SYSTEM_PROMPT));
        assert_eq!(session.history().count(), 0);
    }

    #[test]
    fn history_excludes_system_turn() {
        let mut session = ChatSession::new();
        session.add(Role::User, "Comment écrire une boucle for ?");
        session.add(Role::Assistant, "Avec `for i in 0..n`.");

        let mut renderer = CaptureRenderer::default();
        session.render_history(&mut renderer);
        assert_eq!(
            renderer.turns,
            vec![
                (Role::User, "Comment écrire une boucle for ?".to_string()),
                (Role::Assistant, "Avec `for i in 0..n`.".to_string()),
            ]
        );
        // Rendering does not mutate.
        assert_eq!(session.len(), 3);
        assert_eq!(session.turns()[0].role(), Role::System);
    }

    #[test]
    fn turns_keep_append_order() {
        let mut session = ChatSession::new();
        for i in 0..5 {
            session.add(Role::User, format!("q{i}"));
            session.add(Role::Assistant, format!("r{i}"));
        }
        let visible: Vec<&str> = session.history().map(Turn::content).collect();
        assert_eq!(
            visible,
            vec!["q0", "r0", "q1", "r1", "q2", "r2", "q3", "r3", "q4", "r4"]
        );
        assert_eq!(
            session.stats(),
            SessionStats {
                total_turns: 11,
                user_turns: 5,
                assistant_turns: 5,
            }
        );
    }

    #[test]
    fn add_str_rejects_unknown_roles() {
        let mut session = ChatSession::new();
        session.add_str("user", "salut").unwrap();
        let err = session.add_str("tool", "nope").unwrap_err();
        assert!(matches!(err, Error::InvalidRole { ref role } if role == "tool"));
        assert_eq!(session.len(), 2);
    }

    #[tokio::test]
    async fn render_stream_is_boundary_independent() {
        for parts in [&["Bonj", "our!"][..], &["Bonjour!"][..], &["B", "o", "n", "jour", "!"][..]] {
            let mut renderer = CaptureRenderer::default();
            let reply = ChatSession::render_stream(fragments(parts), &mut renderer)
                .await
                .unwrap();
            assert_eq!(reply, "Bonjour!");
            assert_eq!(renderer.text.concat(), "Bonjour!");
            assert_eq!(renderer.text.len(), parts.len());
            assert!(renderer.finished);
        }
    }

    #[tokio::test]
    async fn render_stream_propagates_errors() {
        let stream = futures::stream::iter(vec![
            Ok("Bon".to_string()),
            Err(Error::streaming("reset", None)),
            Ok("jour".to_string()),
        ]);
        let mut renderer = CaptureRenderer::default();
        let err = ChatSession::render_stream(stream, &mut renderer)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Streaming { .. }));
        assert_eq!(renderer.text, vec!["Bon".to_string()]);
        assert!(!renderer.finished);
    }

    #[tokio::test]
    async fn render_stream_stops_on_interrupt() {
        let mut renderer = CaptureRenderer {
            interrupt_after: Some(2),
            ..CaptureRenderer::default()
        };
        let reply = ChatSession::render_stream(fragments(&["a", "b", "c", "d"]), &mut renderer)
            .await
            .unwrap();
        assert_eq!(reply, "ab");
        assert!(renderer.interrupted);
    }

    #[test]
    fn store_isolates_sessions() {
        let mut store = SessionStore::new();
        let alice = SessionId::from("alice");
        let bob = SessionId::from("bob");

        store.get_or_create(&alice).add(Role::User, "hello");
        store.get_or_create(&bob);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&alice).unwrap().len(), 2);
        assert_eq!(store.get(&bob).unwrap().len(), 1);
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut store = SessionStore::with_system_prompt("Be brief.");
        let id = SessionId::from("s");
        store.get_or_create(&id).add(Role::User, "one");
        let session = store.get_or_create(&id);
        assert_eq!(session.len(), 2);
        assert_eq!(session.system_turn().content(), "Be brief.");
    }

    #[test]
    fn end_destroys_session() {
        let mut store = SessionStore::new();
        let id = SessionId::from("s");
        store.get_or_create(&id).add(Role::User, "bye");

        let ended = store.end(&id).unwrap();
        assert_eq!(ended.len(), 2);
        assert!(store.is_empty());
        assert!(store.end(&id).is_none());

        // A new request starts over from the system turn.
        assert_eq!(store.get_or_create(&id).len(), 1);
    }
}
