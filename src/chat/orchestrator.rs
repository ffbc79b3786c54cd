//! Drives one question-and-answer interaction.

use std::sync::Arc;

use crate::completion::{CompletionClient, CompletionService};
use crate::error::Result;
use crate::observability::INTERACTION_FAILURES;
use crate::render::Renderer;
use crate::retrieval::{ContextRetriever, DEFAULT_TOP_K, augment_prompt};
use crate::selector::ModelSelector;
use crate::session::ChatSession;
use crate::types::{Model, Role, Turn};

/// Where the orchestrator is in an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrchestratorState {
    /// Waiting for input.
    #[default]
    Idle,
    /// A reply is being requested and rendered.
    Responding,
}

/// Turns user input into a streamed, rendered and recorded assistant reply.
pub struct Orchestrator {
    service: Arc<dyn CompletionService>,
    selector: ModelSelector,
    retriever: Option<ContextRetriever>,
    retrieval_enabled: bool,
    top_k: u32,
    state: OrchestratorState,
}

impl Orchestrator {
    /// Creates an orchestrator without retrieval.
    pub fn new(service: Arc<dyn CompletionService>, selector: ModelSelector) -> Self {
        Self {
            service,
            selector,
            retriever: None,
            retrieval_enabled: false,
            top_k: DEFAULT_TOP_K,
            state: OrchestratorState::Idle,
        }
    }

    /// Attaches a retriever.  Retrieval stays off until enabled.
    pub fn with_retriever(mut self, retriever: ContextRetriever, top_k: u32) -> Self {
        self.retriever = Some(retriever);
        self.top_k = top_k;
        self
    }

    /// Turns retrieval on or off for subsequent interactions.
    ///
    /// Returns whether retrieval is now active; it cannot be turned on without a retriever.
    pub fn set_retrieval_enabled(&mut self, enabled: bool) -> bool {
        self.retrieval_enabled = enabled && self.retriever.is_some();
        self.retrieval_enabled
    }

    /// Whether questions are currently augmented with retrieved context.
    pub fn retrieval_enabled(&self) -> bool {
        self.retrieval_enabled
    }

    /// Whether a retriever is attached.
    pub fn has_retriever(&self) -> bool {
        self.retriever.is_some()
    }

    /// The model selector.
    pub fn selector(&self) -> &ModelSelector {
        &self.selector
    }

    /// The model selector, for changing the current model.
    pub fn selector_mut(&mut self) -> &mut ModelSelector {
        &mut self.selector
    }

    /// The current state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Handles one line of user input.
    ///
    /// Blank input is ignored and yields `Ok(None)`.  Otherwise the input is appended to the
    /// session, the whole conversation is sent to the selected model, the reply is rendered as
    /// it streams and then appended to the session.
    ///
    /// # Errors
    ///
    /// Completion failures are returned after the orchestrator is back to idle.  The user turn
    /// stays in the session and no assistant turn is added.
    pub async fn handle_input(
        &mut self,
        session: &mut ChatSession,
        input: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<Option<String>> {
        if input.trim().is_empty() {
            return Ok(None);
        }
        self.state = OrchestratorState::Responding;
        let result = self.respond(session, input, renderer).await;
        self.state = OrchestratorState::Idle;
        match result {
            Ok(reply) => Ok(Some(reply)),
            Err(err) => {
                INTERACTION_FAILURES.click();
                tracing::warn!(error = %err, "interaction failed");
                Err(err)
            }
        }
    }

    async fn respond(
        &self,
        session: &mut ChatSession,
        input: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<String> {
        let model: Model = self.selector.select_current().clone();
        session.add(Role::User, input);

        let mut history = session.turns().to_vec();
        if let Some(retriever) = self.retriever.as_ref().filter(|_| self.retrieval_enabled) {
            let context = retriever.retrieve(input, self.top_k).await;
            if let Some(last) = history.last_mut() {
                *last = Turn::user(augment_prompt(&context, input));
            }
        }

        let client = CompletionClient::new(Arc::clone(&self.service), model);
        let fragments = client.stream_completion(&history).await?;
        let reply = ChatSession::render_stream(fragments, renderer).await?;
        session.add(Role::Assistant, reply.clone());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::Error;
    use crate::fragment_stream::FragmentStream;
    use crate::retrieval::{Embedder, IndexMatch, NO_CONTEXT, VectorIndex};
    use crate::session::SYSTEM_PROMPT;
    use crate::types::{ChatCompletionChunk, ChatCompletionParams, KnownModel};

    #[derive(Default)]
    struct ScriptedService {
        requests: Mutex<Vec<ChatCompletionParams>>,
        fail_with: Option<Error>,
        fail_mid_stream: bool,
    }

    #[async_trait::async_trait]
    impl CompletionService for ScriptedService {
        async fn stream(&self, params: ChatCompletionParams) -> Result<FragmentStream> {
            self.requests.lock().unwrap().push(params);
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            if self.fail_mid_stream {
                let chunks = vec![
                    Ok(ChatCompletionChunk::from_content("Pour")),
                    Err(Error::streaming("connection reset", None)),
                ];
                return Ok(FragmentStream::new(futures::stream::iter(chunks)));
            }
            Ok(FragmentStream::from_fragments(["Pour ", "faire une ", "boucle..."]))
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        text: String,
        finished: usize,
    }

    impl Renderer for RecordingRenderer {
        fn print_turn(&mut self, _: Role, _: &str) {}

        fn print_text(&mut self, text: &str) {
            self.text.push_str(text);
        }

        fn finish_response(&mut self) {
            self.finished += 1;
        }

        fn print_error(&mut self, _: &str) {}

        fn print_info(&mut self, _: &str) {}
    }

    struct UnitEmbedder;

    #[async_trait::async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    struct PassageIndex(Vec<&'static str>);

    #[async_trait::async_trait]
    impl VectorIndex for PassageIndex {
        async fn query(&self, _: &[f32], top_k: u32) -> Result<Vec<IndexMatch>> {
            Ok(self
                .0
                .iter()
                .take(top_k as usize)
                .enumerate()
                .map(|(i, text)| IndexMatch::with_text(i.to_string(), 1.0, *text))
                .collect())
        }
    }

    fn orchestrator(service: Arc<ScriptedService>) -> Orchestrator {
        Orchestrator::new(service, ModelSelector::default())
    }

    #[tokio::test]
    async fn full_interaction() {
        let service = Arc::new(ScriptedService::default());
        let mut orchestrator = orchestrator(service.clone());
        orchestrator.selector_mut().select("llama3-8b-8192").unwrap();
        let mut session = ChatSession::new();
        let mut renderer = RecordingRenderer::default();

        let reply = orchestrator
            .handle_input(&mut session, "Comment écrire une boucle for ?", &mut renderer)
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("Pour faire une boucle..."));
        assert_eq!(renderer.text, "Pour faire une boucle...");
        assert_eq!(renderer.finished, 1);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);

        assert_eq!(
            session.turns(),
            &[
                Turn::system(SYSTEM_PROMPT),
                Turn::user("Comment écrire une boucle for ?"),
                Turn::assistant("Pour faire une boucle..."),
            ]
        );

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, Model::Known(KnownModel::Llama3_8b8192));
        assert_eq!(
            requests[0].messages,
            vec![
                Turn::system(SYSTEM_PROMPT),
                Turn::user("Comment écrire une boucle for ?"),
            ]
        );
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let service = Arc::new(ScriptedService::default());
        let mut orchestrator = orchestrator(service.clone());
        let mut session = ChatSession::new();
        let mut renderer = RecordingRenderer::default();

        let reply = orchestrator
            .handle_input(&mut session, "   ", &mut renderer)
            .await
            .unwrap();
        assert!(reply.is_none());
        assert_eq!(session.len(), 1);
        assert!(service.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_request_keeps_user_turn() {
        let service = Arc::new(ScriptedService {
            fail_with: Some(Error::authentication("invalid api key")),
            ..ScriptedService::default()
        });
        let mut orchestrator = orchestrator(service);
        let mut session = ChatSession::new();
        let mut renderer = RecordingRenderer::default();

        let err = orchestrator
            .handle_input(&mut session, "Bonjour", &mut renderer)
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert_eq!(session.len(), 2);
        assert_eq!(session.turns()[1], Turn::user("Bonjour"));
    }

    #[tokio::test]
    async fn mid_stream_failure_adds_no_assistant_turn() {
        let service = Arc::new(ScriptedService {
            fail_mid_stream: true,
            ..ScriptedService::default()
        });
        let mut orchestrator = orchestrator(service);
        let mut session = ChatSession::new();
        let mut renderer = RecordingRenderer::default();

        let err = orchestrator
            .handle_input(&mut session, "Bonjour", &mut renderer)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::CompletionService);
        assert_eq!(renderer.text, "Pour");
        assert_eq!(session.history().count(), 1);
    }

    #[tokio::test]
    async fn retrieval_augments_only_the_request() {
        let service = Arc::new(ScriptedService::default());
        let retriever = ContextRetriever::new(
            Arc::new(UnitEmbedder),
            Arc::new(PassageIndex(vec!["for i in range(3):", "print(i)"])),
        );
        let mut orchestrator = orchestrator(service.clone()).with_retriever(retriever, 3);
        assert!(!orchestrator.retrieval_enabled());
        assert!(orchestrator.set_retrieval_enabled(true));

        let mut session = ChatSession::new();
        let mut renderer = RecordingRenderer::default();
        orchestrator
            .handle_input(&mut session, "Comment écrire une boucle for ?", &mut renderer)
            .await
            .unwrap();

        assert_eq!(session.turns()[1], Turn::user("Comment écrire une boucle for ?"));
        let requests = service.requests.lock().unwrap();
        assert_eq!(
            requests[0].messages[1],
            Turn::user(
                "Retrieved Context:\nfor i in range(3):\nprint(i)\n\nUser Query: Comment écrire une boucle for ?"
            )
        );
    }

    #[tokio::test]
    async fn empty_retrieval_uses_sentinel() {
        let service = Arc::new(ScriptedService::default());
        let retriever =
            ContextRetriever::new(Arc::new(UnitEmbedder), Arc::new(PassageIndex(Vec::new())));
        let mut orchestrator = orchestrator(service.clone()).with_retriever(retriever, 3);
        orchestrator.set_retrieval_enabled(true);

        let mut session = ChatSession::new();
        let mut renderer = RecordingRenderer::default();
        orchestrator
            .handle_input(&mut session, "Salut", &mut renderer)
            .await
            .unwrap();
        let requests = service.requests.lock().unwrap();
        assert_eq!(
            requests[0].messages[1].content(),
            format!("Retrieved Context:\n{NO_CONTEXT}\n\nUser Query: Salut")
        );
    }

    #[test]
    fn retrieval_requires_a_retriever() {
        let mut orchestrator = orchestrator(Arc::new(ScriptedService::default()));
        assert!(!orchestrator.has_retriever());
        assert!(!orchestrator.set_retrieval_enabled(true));
        assert!(!orchestrator.retrieval_enabled());
    }

    #[tokio::test]
    async fn model_switch_applies_to_next_request() {
        let service = Arc::new(ScriptedService::default());
        let mut orchestrator = orchestrator(service.clone());
        let mut session = ChatSession::new();
        let mut renderer = RecordingRenderer::default();

        orchestrator
            .handle_input(&mut session, "un", &mut renderer)
            .await
            .unwrap();
        orchestrator
            .selector_mut()
            .select("deepseek-r1-distill-llama-70b")
            .unwrap();
        orchestrator
            .handle_input(&mut session, "deux", &mut renderer)
            .await
            .unwrap();

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests[0].model.as_str(), "llama3-70b-8192");
        assert_eq!(requests[1].model.as_str(), "deepseek-r1-distill-llama-70b");
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(session.len(), 5);
    }
}
