//! In-memory doubles of the ports, shared by the unit tests of this crate.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::AnalysisResult;
use crate::ports::{
    ChatContext, ChatService, ChunkStream, Clock, ContentAnalysisService, DocumentExporter,
    PortError, PortResult,
};

pub const NEWTON_JSON: &str = r#"{
  "chapters": [
    {
      "chapterTitle": "Newton's Laws of Motion",
      "topics": [
        {"title": "First Law", "explanation": "**Inertia**: a body stays at rest or in uniform motion."},
        {"title": "Second Law", "explanation": "**F = ma**\nForce equals mass times acceleration."},
        {"title": "Third Law", "explanation": "Every action has an **equal and opposite** reaction."}
      ]
    }
  ]
}"#;

//=========================================================================================
// Clock
//=========================================================================================

pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

//=========================================================================================
// Analysis backend
//=========================================================================================

pub struct ScriptedAnalysis {
    outcome: Result<String, String>,
    calls: AtomicUsize,
}

impl ScriptedAnalysis {
    pub fn responding(json: &str) -> Self {
        Self { outcome: Ok(json.to_string()), calls: AtomicUsize::new(0) }
    }

    pub fn failing(message: &str) -> Self {
        Self { outcome: Err(message.to_string()), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentAnalysisService for ScriptedAnalysis {
    async fn analyze_content(&self, _content_text: &str) -> PortResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map_err(PortError::Unexpected)
    }
}

//=========================================================================================
// Chat backend
//=========================================================================================

/// How the scripted backend answers one message.
#[derive(Clone)]
pub enum Reply {
    Chunks(Vec<&'static str>),
    ChunksThenError(Vec<&'static str>),
    /// Yields the chunks, then never finishes.
    ChunksThenHang(Vec<&'static str>),
    StartError,
}

#[derive(Default)]
pub struct ScriptedChat {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    contexts_started: AtomicUsize,
    // (context number, message)
    received: Arc<Mutex<Vec<(usize, String)>>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self { replies: Arc::new(Mutex::new(replies.into())), ..Default::default() }
    }

    pub fn contexts_started(&self) -> usize {
        self.contexts_started.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<(usize, String)> {
        self.received.lock().unwrap().clone()
    }
}

struct ScriptedContext {
    id: usize,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    received: Arc<Mutex<Vec<(usize, String)>>>,
}

#[async_trait]
impl ChatService for ScriptedChat {
    async fn start_chat(&self) -> PortResult<Box<dyn ChatContext>> {
        let id = self.contexts_started.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(ScriptedContext {
            id,
            replies: self.replies.clone(),
            received: self.received.clone(),
        }))
    }
}

#[async_trait]
impl ChatContext for ScriptedContext {
    async fn send_message_stream(&mut self, message: &str) -> PortResult<ChunkStream> {
        self.received.lock().unwrap().push((self.id, message.to_string()));

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Chunks(vec!["ok"]));
        let ok = |chunks: Vec<&'static str>| {
            chunks
                .into_iter()
                .map(|c| Ok::<String, PortError>(c.to_string()))
                .collect::<Vec<_>>()
        };
        match reply {
            Reply::Chunks(chunks) => Ok(stream::iter(ok(chunks)).boxed()),
            Reply::ChunksThenError(chunks) => {
                let mut items = ok(chunks);
                items.push(Err(PortError::Unexpected("stream interrupted".to_string())));
                Ok(stream::iter(items).boxed())
            }
            Reply::ChunksThenHang(chunks) => {
                Ok(stream::iter(ok(chunks)).chain(stream::pending()).boxed())
            }
            Reply::StartError => Err(PortError::Unexpected("chat unavailable".to_string())),
        }
    }
}

//=========================================================================================
// Exporter
//=========================================================================================

pub struct RecordingExporter {
    pub fail: bool,
    pub exported: Mutex<Vec<AnalysisResult>>,
}

impl RecordingExporter {
    pub fn new(fail: bool) -> Self {
        Self { fail, exported: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl DocumentExporter for RecordingExporter {
    async fn export(&self, result: &AnalysisResult) -> PortResult<String> {
        if self.fail {
            return Err(PortError::Unexpected("disk full".to_string()));
        }
        self.exported.lock().unwrap().push(result.clone());
        Ok("professor-ai-analysis.md".to_string())
    }
}
