//! crates/professor_core/src/chat.rs
//!
//! The chat session engine: one live conversation with the tutor at a time.
//!
//! The engine moves between `Idle`, `Open`, `Streaming` and `Closed`. A reply
//! arrives as an ordered stream of text chunks that are concatenated into the
//! trailing bot message; nothing else ever edits a message already in the
//! transcript. Closing the panel drops the backend context and any in-flight
//! stream, so the next conversation starts without memory of this one.

use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::{ChatMessage, ChatSession, Sender};
use crate::ports::{ChatContext, ChatService, ChunkStream};

/// System instruction given to every new chat context.
pub const CHAT_SYSTEM_INSTRUCTION: &str = "You are Professor AI, a friendly and knowledgeable assistant. Your goal is to help students understand complex concepts. Explain things clearly, concisely, and patiently. Use markdown for formatting when it helps with clarity (like lists, bolding, or code snippets).";

/// Shown above the transcript of an open panel. Not part of the transcript.
pub const GREETING: &str = "Hello! I am Professor AI. How can I help you clear your concepts?";

/// Text of the bot message while no chunk has arrived yet.
pub const PLACEHOLDER: &str = "...";

pub const ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

/// Selections this short are ignored instead of turned into questions.
pub const MIN_SELECTION_CHARS: usize = 6;

/// Turns text selected in a result into a question for the tutor.
pub fn contextual_question(selection: &str) -> Option<String> {
    let selection = selection.trim();
    if selection.chars().count() < MIN_SELECTION_CHARS {
        return None;
    }
    Some(format!(
        "Can you explain this concept in more detail? \"{}\"",
        selection
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The transcript was handed back for archiving.
    Archived,
    /// Nothing was said, nothing was kept.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Open,
    Streaming,
    Closed(CloseOutcome),
}

/// What happened when the engine pulled from the active stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(String),
    Finished,
    /// The stream broke; an error message was appended to the transcript.
    Failed,
    /// There is no active stream.
    Idle,
}

pub struct ChatEngine {
    service: Arc<dyn ChatService>,
    state: ChatState,
    context: Option<Box<dyn ChatContext>>,
    stream: Option<ChunkStream>,
    awaiting_first_chunk: bool,
    transcript: Vec<ChatMessage>,
    input: String,
}

impl ChatEngine {
    pub fn new(service: Arc<dyn ChatService>) -> Self {
        Self {
            service,
            state: ChatState::Idle,
            context: None,
            stream: None,
            awaiting_first_chunk: false,
            transcript: Vec::new(),
            input: String::new(),
        }
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ChatState::Open | ChatState::Streaming)
    }

    pub fn is_streaming(&self) -> bool {
        self.state == ChatState::Streaming
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Shows the panel with a fresh context. Opening an open panel does nothing.
    pub async fn open(&mut self) {
        if self.is_open() {
            return;
        }
        info!("Opening chat panel.");
        self.context = self.start_context().await;
        self.state = ChatState::Open;
    }

    /// Pre-fills the input with a question about `selection` and opens the panel.
    /// Returns `false` when the selection is too short to ask about.
    pub async fn ask_about(&mut self, selection: &str) -> bool {
        let Some(question) = contextual_question(selection) else {
            debug!("Ignoring selection shorter than {} characters.", MIN_SELECTION_CHARS);
            return false;
        };
        self.input = question;
        self.open().await;
        true
    }

    /// Sends the pending input. Returns `false` (and changes nothing) when the
    /// input is blank or the panel is not ready for a new message.
    pub async fn submit(&mut self) -> bool {
        if self.state != ChatState::Open || self.input.trim().is_empty() {
            return false;
        }

        let message = std::mem::take(&mut self.input);
        self.transcript.push(ChatMessage::user(message.clone()));

        if self.context.is_none() {
            self.context = self.start_context().await;
        }
        let Some(context) = self.context.as_mut() else {
            self.transcript.push(ChatMessage::bot(ERROR_REPLY));
            return true;
        };

        match context.send_message_stream(&message).await {
            Ok(stream) => {
                self.transcript.push(ChatMessage::bot(PLACEHOLDER));
                self.awaiting_first_chunk = true;
                self.stream = Some(stream);
                self.state = ChatState::Streaming;
            }
            Err(e) => {
                error!("Chat API call failed: {}", e);
                self.transcript.push(ChatMessage::bot(ERROR_REPLY));
            }
        }
        true
    }

    /// Pulls the next chunk of the active reply and applies it.
    pub async fn next_event(&mut self) -> StreamEvent {
        let Some(stream) = self.stream.as_mut() else {
            return StreamEvent::Idle;
        };

        match stream.next().await {
            Some(Ok(chunk)) => {
                self.apply_chunk(&chunk);
                StreamEvent::Chunk(chunk)
            }
            Some(Err(e)) => {
                error!("Chat stream failed: {}", e);
                self.finish_stream();
                self.transcript.push(ChatMessage::bot(ERROR_REPLY));
                StreamEvent::Failed
            }
            None => {
                self.finish_stream();
                StreamEvent::Finished
            }
        }
    }

    /// Applies chunks until the active reply ends.
    pub async fn drain(&mut self) -> StreamEvent {
        loop {
            match self.next_event().await {
                StreamEvent::Chunk(_) => continue,
                other => return other,
            }
        }
    }

    /// Sets the input, submits it and waits for the whole reply.
    pub async fn send(&mut self, text: impl Into<String>) -> bool {
        self.set_input(text);
        if !self.submit().await {
            return false;
        }
        self.drain().await;
        true
    }

    /// Hides the panel and tears the context down. A non-empty transcript is
    /// returned as a session stamped `now`; an empty one is dropped.
    pub fn close(&mut self, now: i64) -> Option<ChatSession> {
        if !self.is_open() {
            return None;
        }
        if self.stream.take().is_some() {
            warn!("Chat closed while a reply was streaming; discarding the rest of it.");
        }
        self.context = None;
        self.awaiting_first_chunk = false;

        let messages = std::mem::take(&mut self.transcript);
        if messages.is_empty() {
            self.state = ChatState::Closed(CloseOutcome::Discarded);
            return None;
        }
        info!("Archiving chat session with {} messages.", messages.len());
        self.state = ChatState::Closed(CloseOutcome::Archived);
        Some(ChatSession { timestamp: now, messages })
    }

    async fn start_context(&self) -> Option<Box<dyn ChatContext>> {
        match self.service.start_chat().await {
            Ok(context) => Some(context),
            Err(e) => {
                error!("Failed to start chat context: {}", e);
                None
            }
        }
    }

    fn apply_chunk(&mut self, chunk: &str) {
        let Some(last) = self.transcript.last_mut().filter(|m| m.sender == Sender::Bot) else {
            return;
        };
        if self.awaiting_first_chunk {
            last.text.clear();
            self.awaiting_first_chunk = false;
        }
        last.text.push_str(chunk);
    }

    fn finish_stream(&mut self) {
        self.stream = None;
        if self.awaiting_first_chunk {
            // Nothing arrived: the reply is the empty concatenation.
            if let Some(last) = self.transcript.last_mut() {
                last.text.clear();
            }
            self.awaiting_first_chunk = false;
        }
        self.state = ChatState::Open;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Reply, ScriptedChat};

    fn engine(replies: Vec<Reply>) -> (Arc<ScriptedChat>, ChatEngine) {
        let service = Arc::new(ScriptedChat::new(replies));
        (service.clone(), ChatEngine::new(service))
    }

    #[tokio::test]
    async fn streamed_chunks_are_concatenated_in_order() {
        let (_, mut engine) = engine(vec![Reply::Chunks(vec!["Gravity ", "is a force..."])]);
        engine.open().await;

        assert!(engine.send("explain gravity").await);

        let transcript = engine.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0], ChatMessage::user("explain gravity"));
        assert_eq!(transcript[1].text, "Gravity is a force...");
        assert_eq!(engine.state(), ChatState::Open);
    }

    #[tokio::test]
    async fn chunk_granularity_does_not_change_the_result() {
        let (_, mut coarse) = engine(vec![Reply::Chunks(vec!["abcdef"])]);
        let (_, mut fine) = engine(vec![Reply::Chunks(vec!["a", "b", "", "cd", "ef"])]);
        coarse.open().await;
        fine.open().await;
        coarse.send("q").await;
        fine.send("q").await;

        assert_eq!(coarse.transcript()[1].text, "abcdef");
        assert_eq!(fine.transcript()[1].text, "abcdef");
    }

    #[tokio::test]
    async fn placeholder_is_shown_until_first_chunk() {
        let (_, mut engine) = engine(vec![Reply::Chunks(vec!["Hi", " there"])]);
        engine.open().await;
        engine.set_input("hello");

        assert!(engine.submit().await);
        assert_eq!(engine.state(), ChatState::Streaming);
        assert_eq!(engine.transcript()[0].text, "hello");
        assert_eq!(engine.transcript()[1], ChatMessage::bot(PLACEHOLDER));
        assert!(engine.input().is_empty());

        assert_eq!(engine.next_event().await, StreamEvent::Chunk("Hi".to_string()));
        assert_eq!(engine.transcript()[1].text, "Hi");
        assert_eq!(engine.next_event().await, StreamEvent::Chunk(" there".to_string()));
        assert_eq!(engine.next_event().await, StreamEvent::Finished);
        assert_eq!(engine.transcript()[1].text, "Hi there");
        assert_eq!(engine.next_event().await, StreamEvent::Idle);
    }

    #[tokio::test]
    async fn blank_input_is_rejected_without_transition() {
        let (service, mut engine) = engine(vec![]);
        engine.open().await;
        engine.set_input("   \n");

        assert!(!engine.submit().await);
        assert_eq!(engine.state(), ChatState::Open);
        assert!(engine.transcript().is_empty());
        assert!(service.received().is_empty());
    }

    #[tokio::test]
    async fn submit_while_streaming_is_rejected() {
        let (_, mut engine) = engine(vec![Reply::ChunksThenHang(vec!["partial"])]);
        engine.open().await;
        engine.set_input("first");
        assert!(engine.submit().await);

        engine.set_input("second");
        assert!(!engine.submit().await);
        assert_eq!(engine.transcript().len(), 2);
    }

    #[tokio::test]
    async fn stream_error_appends_message_and_keeps_partial_text() {
        let (_, mut engine) = engine(vec![Reply::ChunksThenError(vec!["Newton said"])]);
        engine.open().await;

        engine.send("who said it?").await;

        let transcript = engine.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1].text, "Newton said");
        assert_eq!(transcript[2], ChatMessage::bot(ERROR_REPLY));
        assert_eq!(engine.state(), ChatState::Open);
    }

    #[tokio::test]
    async fn failure_to_start_reply_is_reported_in_transcript() {
        let (_, mut engine) = engine(vec![Reply::StartError, Reply::Chunks(vec!["fine"])]);
        engine.open().await;

        engine.send("one").await;
        assert_eq!(engine.transcript()[1], ChatMessage::bot(ERROR_REPLY));

        engine.send("two").await;
        assert_eq!(engine.transcript()[3].text, "fine");
    }

    #[tokio::test]
    async fn closing_empty_panel_discards() {
        let (_, mut engine) = engine(vec![]);
        engine.open().await;

        assert!(engine.close(100).is_none());
        assert_eq!(engine.state(), ChatState::Closed(CloseOutcome::Discarded));
    }

    #[tokio::test]
    async fn closing_with_messages_archives_once_at_close_time() {
        let (_, mut engine) = engine(vec![Reply::Chunks(vec!["answer"])]);
        engine.open().await;
        engine.send("question").await;

        let session = engine.close(1234).unwrap();
        assert_eq!(session.timestamp, 1234);
        assert_eq!(session.messages.len(), 2);
        assert_eq!(engine.state(), ChatState::Closed(CloseOutcome::Archived));
        assert!(engine.transcript().is_empty());
        assert!(engine.close(2000).is_none());
    }

    #[tokio::test]
    async fn closing_mid_stream_drops_the_rest() {
        let (_, mut engine) = engine(vec![Reply::ChunksThenHang(vec!["Half an ans"])]);
        engine.open().await;
        engine.set_input("q");
        engine.submit().await;
        engine.next_event().await;

        let session = engine.close(5).unwrap();
        assert_eq!(session.messages[1].text, "Half an ans");
        assert_eq!(engine.next_event().await, StreamEvent::Idle);
    }

    #[tokio::test]
    async fn reopening_starts_a_new_context() {
        let (service, mut engine) = engine(vec![]);
        engine.open().await;
        engine.open().await;
        assert_eq!(service.contexts_started(), 1);

        engine.send("first").await;
        engine.close(1);
        engine.open().await;
        engine.send("second").await;

        assert_eq!(service.contexts_started(), 2);
        assert_eq!(
            service.received(),
            vec![(1, "first".to_string()), (2, "second".to_string())]
        );
    }

    #[tokio::test]
    async fn contextual_question_prefills_and_opens() {
        let (_, mut engine) = engine(vec![]);

        assert!(engine.ask_about("  Newton's second law  ").await);
        assert!(engine.is_open());
        assert_eq!(
            engine.input(),
            "Can you explain this concept in more detail? \"Newton's second law\""
        );
    }

    #[tokio::test]
    async fn short_selection_is_ignored() {
        let (_, mut engine) = engine(vec![]);
        assert!(!engine.ask_about(" F=ma ").await);
        assert_eq!(engine.state(), ChatState::Idle);
    }

    #[tokio::test]
    async fn empty_reply_leaves_empty_bot_message() {
        let (_, mut engine) = engine(vec![Reply::Chunks(vec![])]);
        engine.open().await;
        engine.send("anything?").await;
        assert_eq!(engine.transcript()[1], ChatMessage::bot(""));
    }
}
