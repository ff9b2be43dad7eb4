//! Streaming event interpreter
//!
//! Folds the supervisor's event stream into live announcements, the answer
//! text, the step log and at most one image, then falls back to a blocking
//! call when the supervisor never streamed its own answer.

use super::live::{LiveChannel, LiveRecord};
use super::marker::{persist_payload, split_marker, strip_marker, IMAGE_MARKER};
use super::notices::Notices;
use super::steps::{StepEntry, StepLog};
use super::tracker::{AgentTracker, ResponderRegistry, Transition};
use crate::images::ImageStore;
use crate::supervisor::{AgentEvent, EventSource, RunConfig, SourceError, TurnInput};

/// What a finished turn hands to the committer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub answer: String,
    pub steps: Vec<StepEntry>,
    pub image: Option<String>,
    pub used_fallback: bool,
}

pub struct TurnInterpreter<'a> {
    responders: &'a ResponderRegistry,
    notices: &'a Notices,
    images: &'a dyn ImageStore,
    live: LiveChannel,
    tracker: AgentTracker,
    steps: StepLog,
    answer: String,
    image: Option<String>,
    supervisor_streamed: bool,
    used_fallback: bool,
}

impl<'a> TurnInterpreter<'a> {
    pub fn new(
        responders: &'a ResponderRegistry,
        notices: &'a Notices,
        images: &'a dyn ImageStore,
        live: LiveChannel,
    ) -> Self {
        Self {
            responders,
            notices,
            images,
            steps: StepLog::new(live.clone()),
            live,
            tracker: AgentTracker::new(),
            answer: String::new(),
            image: None,
            supervisor_streamed: false,
            used_fallback: false,
        }
    }

    /// Opening announcement, made before the supervisor is contacted
    pub async fn open(&mut self) {
        let notices = self.notices;
        self.steps.step(notices.opening.as_str()).await;
    }

    pub async fn handle(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::PhaseStart { origin } => self.on_phase_start(&origin).await,
            AgentEvent::ToolStart { tool } => self.on_tool_start(&tool).await,
            AgentEvent::ToolEnd { tool, output } => self.on_tool_end(&tool, &output).await,
            AgentEvent::TokenChunk { text, .. } => self.on_token(text).await,
        }
    }

    async fn on_phase_start(&mut self, origin: &str) {
        let responders = self.responders;
        let Some(transition) = self.tracker.observe(responders, origin) else {
            return;
        };
        tracing::debug!(origin = %origin, ?transition, "Agent transition");

        match transition {
            Transition::Entered { responder } => {
                if let Some(rule) = responders.responder(&responder) {
                    self.steps.step(rule.handoff_notice.as_str()).await;
                    self.steps.step(rule.working_notice.as_str()).await;
                }
            }
            Transition::Returned { from } => {
                let rule = responders.responder(&from);
                let name = rule.map_or(from.as_str(), |r| r.display_name.as_str());
                self.steps.step(self.notices.consolidating(name)).await;
            }
        }
    }

    async fn on_tool_start(&mut self, tool: &str) {
        let notices = self.notices;
        if let Some(text) = notices.tool_start(tool) {
            self.steps.step(text).await;
        }
    }

    async fn on_tool_end(&mut self, tool: &str, output: &str) {
        if let Some(split) = split_marker(output) {
            self.capture_image(split.payload).await;
            return;
        }
        let agent = self.responders.display_name(self.tracker.current());
        let text = self.notices.tool_done(agent, tool);
        self.steps.observation(text).await;
    }

    async fn on_token(&mut self, text: String) {
        if text.is_empty() || !self.tracker.is_supervisor() {
            return;
        }
        if text.contains(IMAGE_MARKER) {
            tracing::debug!("Dropping token chunk carrying an image marker");
            return;
        }
        if !self.supervisor_streamed {
            self.supervisor_streamed = true;
            let notices = self.notices;
            self.steps.step(notices.generating.as_str()).await;
        }
        self.answer.push_str(&text);
        self.live.send(LiveRecord::Token(text)).await;
    }

    /// First image wins; later markers in the same turn are ignored
    async fn capture_image(&mut self, payload: &str) {
        if self.image.is_some() {
            tracing::debug!("Image already captured for this turn, ignoring marker");
            return;
        }
        let notices = self.notices;
        match persist_payload(self.images, payload).await {
            Ok(reference) => {
                tracing::info!(reference = %reference, "Captured generated image");
                self.image = Some(reference);
                self.steps.observation(notices.image_saved.as_str()).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to process generated image");
                self.steps.observation(notices.image_failed.as_str()).await;
            }
        }
    }

    /// Post-stream processing: fallback invocation when the supervisor
    /// streamed nothing, then marker handling on the answer text.
    pub async fn finish(
        &mut self,
        source: &dyn EventSource,
        input: &TurnInput,
        config: &RunConfig,
    ) -> Result<(), SourceError> {
        if !self.supervisor_streamed {
            tracing::info!(thread_id = %config.thread_id, "No supervisor tokens streamed, invoking fallback");
            self.used_fallback = true;
            let notices = self.notices;
            self.steps.step(notices.preparing.as_str()).await;
            self.answer = source.invoke(input, config).await?;
        }

        if let Some(split) = split_marker(&self.answer) {
            let payload = split.payload.to_string();
            self.answer = strip_marker(&self.answer).to_string();
            self.capture_image(&payload).await;
        }

        if self.used_fallback && !self.answer.is_empty() {
            self.live.send(LiveRecord::Token(self.answer.clone())).await;
        }
        Ok(())
    }

    pub fn into_outcome(self) -> TurnOutcome {
        TurnOutcome {
            answer: self.answer,
            steps: self.steps.into_entries(),
            image: self.image,
            used_fallback: self.used_fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::testing::{phase, token, tool_end, tool_start, MemoryImageStore, ScriptedSource};
    use tokio::sync::mpsc;

    struct Harness {
        responders: ResponderRegistry,
        notices: Notices,
        images: MemoryImageStore,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                responders: ResponderRegistry::default(),
                notices: Notices::default(),
                images: MemoryImageStore::new(),
            }
        }

        fn interpreter(&self) -> (TurnInterpreter<'_>, mpsc::Receiver<LiveRecord>) {
            let (live, rx) = LiveChannel::new(256);
            (
                TurnInterpreter::new(&self.responders, &self.notices, &self.images, live),
                rx,
            )
        }
    }

    fn drain(rx: &mut mpsc::Receiver<LiveRecord>) -> Vec<LiveRecord> {
        let mut records = Vec::new();
        while let Ok(record) = rx.try_recv() {
            records.push(record);
        }
        records
    }

    fn input() -> TurnInput {
        TurnInput {
            question: "q".into(),
            image: None,
        }
    }

    fn config() -> RunConfig {
        RunConfig {
            thread_id: "t1".into(),
            checkpoint: None,
        }
    }

    #[tokio::test]
    async fn test_handoff_tool_and_return_announcements() {
        let harness = Harness::new();
        let (mut interpreter, mut rx) = harness.interpreter();

        for event in [
            phase("LangGraph"),
            phase("websearcher"),
            tool_start("TavilySearch"),
            tool_end("TavilySearch", "results"),
            phase("supervisor"),
        ] {
            interpreter.handle(event).await;
        }

        let steps = interpreter.into_outcome().steps;
        assert_eq!(
            steps,
            vec![
                StepEntry::step("🔄 Handing off to the web search agent..."),
                StepEntry::step("🌐 Looking up recent information on the web..."),
                StepEntry::step("🔍 Running web search..."),
                StepEntry::observation("✅ Web Search Agent: web search complete"),
                StepEntry::step("🤖 Web Search Agent finished, consolidating results..."),
            ]
        );
        assert_eq!(drain(&mut rx).len(), 5);
    }

    #[tokio::test]
    async fn test_tokens_only_while_supervisor_active() {
        let harness = Harness::new();
        let (mut interpreter, mut rx) = harness.interpreter();

        for event in [
            token("LangGraph", "ignored before any phase"),
            phase("coder"),
            token("coder", "responder chatter"),
            phase("LangGraph"),
            token("LangGraph", ""),
            token("LangGraph", "Hel"),
            token("LangGraph", "lo"),
        ] {
            interpreter.handle(event).await;
        }

        let records = drain(&mut rx);
        let tokens: Vec<_> = records
            .iter()
            .filter_map(|r| match r {
                LiveRecord::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tokens, vec!["Hel", "lo"]);

        let generating = records
            .iter()
            .filter(|r| **r == LiveRecord::Step("🎯 Generating the final answer...".into()))
            .count();
        assert_eq!(generating, 1);

        let outcome = interpreter.into_outcome();
        assert_eq!(outcome.answer, "Hello");
    }

    #[tokio::test]
    async fn test_marker_chunk_is_not_forwarded() {
        let harness = Harness::new();
        let (mut interpreter, mut rx) = harness.interpreter();

        interpreter.handle(phase("LangGraph")).await;
        interpreter.handle(token("LangGraph", "IMAGE_DATA:aGVsbG8=")).await;

        assert!(drain(&mut rx).is_empty());
        assert_eq!(interpreter.into_outcome().answer, "");
    }

    #[tokio::test]
    async fn test_first_image_wins() {
        let harness = Harness::new();
        let (mut interpreter, _rx) = harness.interpreter();

        interpreter.handle(phase("coder")).await;
        interpreter
            .handle(tool_end("PythonREPLTool", "IMAGE_DATA: Zmlyc3Q="))
            .await;
        interpreter
            .handle(tool_end("PythonREPLTool", "IMAGE_DATA: c2Vjb25k"))
            .await;

        let outcome = interpreter.into_outcome();
        assert_eq!(outcome.image.as_deref(), Some("/images/mem-0.png"));
        assert_eq!(outcome.steps, vec![
            StepEntry::step("🔄 Handing off to the code agent..."),
            StepEntry::step("💻 Writing and running analysis code..."),
            StepEntry::observation("📊 A chart has been generated."),
        ]);
        assert_eq!(harness.images.saved().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_image_payload_is_absorbed() {
        let harness = Harness::new();
        let (mut interpreter, _rx) = harness.interpreter();

        interpreter.handle(tool_end("PythonREPLTool", "IMAGE_DATA:   ")).await;
        interpreter.handle(tool_end("PythonREPLTool", "IMAGE_DATA: ***")).await;
        interpreter.handle(tool_end("PythonREPLTool", "IMAGE_DATA: aGk=")).await;

        let outcome = interpreter.into_outcome();
        assert_eq!(
            outcome.steps,
            vec![
                StepEntry::observation("⚠️ Failed to process the generated image."),
                StepEntry::observation("⚠️ Failed to process the generated image."),
                StepEntry::observation("📊 A chart has been generated."),
            ]
        );
        assert!(outcome.image.is_some());
    }

    #[tokio::test]
    async fn test_fallback_strips_marker_and_captures_image() {
        let harness = Harness::new();
        let (mut interpreter, mut rx) = harness.interpreter();
        let source = ScriptedSource::new(vec![]).with_fallback("Here is the chart IMAGE_DATA: aGk=");

        interpreter.handle(phase("coder")).await;
        interpreter.finish(&source, &input(), &config()).await.unwrap();

        let records = drain(&mut rx);
        assert_eq!(records.last(), Some(&LiveRecord::Token("Here is the chart".into())));

        let outcome = interpreter.into_outcome();
        assert!(outcome.used_fallback);
        assert_eq!(outcome.answer, "Here is the chart");
        assert_eq!(outcome.image.as_deref(), Some("/images/mem-0.png"));
        assert_eq!(source.invoke_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_fallback_after_streaming() {
        let harness = Harness::new();
        let (mut interpreter, _rx) = harness.interpreter();
        let source = ScriptedSource::new(vec![]).with_fallback("unused");

        interpreter.handle(phase("LangGraph")).await;
        interpreter.handle(token("LangGraph", "streamed")).await;
        interpreter.finish(&source, &input(), &config()).await.unwrap();

        assert_eq!(source.invoke_calls(), 0);
        let outcome = interpreter.into_outcome();
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.answer, "streamed");
    }

    #[tokio::test]
    async fn test_fallback_keeps_earlier_image() {
        let harness = Harness::new();
        let (mut interpreter, _rx) = harness.interpreter();
        let source = ScriptedSource::new(vec![]).with_fallback("Done IMAGE_DATA: c2Vjb25k");

        interpreter.handle(tool_end("PythonREPLTool", "IMAGE_DATA: Zmlyc3Q=")).await;
        interpreter.finish(&source, &input(), &config()).await.unwrap();

        let outcome = interpreter.into_outcome();
        assert_eq!(outcome.answer, "Done");
        assert_eq!(outcome.image.as_deref(), Some("/images/mem-0.png"));
        assert_eq!(harness.images.saved().len(), 1);
    }
}
