//! Stream classifier: decides which generated fragments a user sees.
//!
//! While a completion streams in, the classifier watches the trailing
//! window of fragments for a boundary sequence (by default `Thought` `:`).
//! Once the window matches, the segment opens and every later fragment is
//! forwarded. A suppress token seen before the boundary (by default
//! `Action`) emits a lone `SegmentEnd` and closes the classifier for the
//! rest of the completion.
//!
//! ```text
//! Watching ──boundary──▶ Streaming ──end──▶ Done
//!     │
//!     └──suppress──▶ Suppressed ──end──▶ Done
//! ```
//!
//! The transition function [`step`] is pure; [`StreamClassifier`] is the
//! stateful wrapper used by the agent loop.

use serde::{Deserialize, Serialize};
use sqlpilot_config::StreamConfig;
use std::collections::VecDeque;

/// Classifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamClassifierConfig {
    /// Fragment sequence that opens the visible segment.
    pub boundary_tokens: Vec<String>,
    /// Fragment that stops classification before the boundary is seen.
    pub suppress_token: Option<String>,
    /// Compare fragments with surrounding whitespace removed.
    pub strip_tokens: bool,
    /// Replay the boundary fragments when the segment opens.
    pub include_boundary: bool,
}

impl Default for StreamClassifierConfig {
    fn default() -> Self {
        Self {
            boundary_tokens: vec!["Thought".into(), ":".into()],
            suppress_token: Some("Action".into()),
            strip_tokens: true,
            include_boundary: false,
        }
    }
}

impl From<&StreamConfig> for StreamClassifierConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            boundary_tokens: config.boundary_tokens.clone(),
            suppress_token: config.suppress_token.clone(),
            strip_tokens: config.strip_tokens,
            include_boundary: config.include_boundary,
        }
    }
}

impl StreamClassifierConfig {
    fn normalize<'a>(&self, fragment: &'a str) -> &'a str {
        if self.strip_tokens {
            fragment.trim()
        } else {
            fragment
        }
    }

    fn suppress(&self) -> Option<&str> {
        self.suppress_token
            .as_deref()
            .map(|t| self.normalize(t))
            .filter(|t| !t.is_empty())
    }
}

/// What the classifier tells its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    SegmentStart,
    SegmentToken(String),
    SegmentEnd,
}

/// Where the classifier is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Watching,
    Streaming,
    Suppressed,
    Done,
}

/// Classifier state between fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierState {
    /// Last fragments received while watching, oldest first.
    window: VecDeque<String>,
    phase: Phase,
}

impl ClassifierState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_segment_open(&self) -> bool {
        self.phase == Phase::Streaming
    }
}

/// Advance the classifier by one fragment.
pub fn step(
    mut state: ClassifierState,
    config: &StreamClassifierConfig,
    fragment: &str,
) -> (ClassifierState, Vec<StreamEvent>) {
    match state.phase {
        Phase::Streaming => {
            let events = vec![StreamEvent::SegmentToken(fragment.to_string())];
            (state, events)
        }
        Phase::Suppressed | Phase::Done => (state, Vec::new()),
        Phase::Watching => {
            let token = config.normalize(fragment);

            if config.suppress().is_some_and(|s| s == token) {
                state.window.clear();
                state.phase = Phase::Suppressed;
                return (state, vec![StreamEvent::SegmentEnd]);
            }

            if config.boundary_tokens.is_empty() {
                state.phase = Phase::Streaming;
                let events = vec![
                    StreamEvent::SegmentStart,
                    StreamEvent::SegmentToken(fragment.to_string()),
                ];
                return (state, events);
            }

            // Whitespace-only fragments never take part in a stripped match.
            if config.strip_tokens && token.is_empty() {
                return (state, Vec::new());
            }

            state.window.push_back(fragment.to_string());
            while state.window.len() > config.boundary_tokens.len() {
                state.window.pop_front();
            }

            if !window_matches(&state.window, config) {
                return (state, Vec::new());
            }

            let mut events = vec![StreamEvent::SegmentStart];
            if config.include_boundary {
                events.extend(state.window.drain(..).map(StreamEvent::SegmentToken));
            } else {
                state.window.clear();
            }
            state.phase = Phase::Streaming;
            (state, events)
        }
    }
}

/// Close the classifier at the end of a completion.
///
/// A suppressed completion already sent its `SegmentEnd`.
pub fn finish(mut state: ClassifierState) -> (ClassifierState, Vec<StreamEvent>) {
    let events = if state.phase == Phase::Streaming {
        vec![StreamEvent::SegmentEnd]
    } else {
        Vec::new()
    };
    state.window.clear();
    state.phase = Phase::Done;
    (state, events)
}

fn window_matches(window: &VecDeque<String>, config: &StreamClassifierConfig) -> bool {
    window.len() == config.boundary_tokens.len()
        && window
            .iter()
            .zip(&config.boundary_tokens)
            .all(|(seen, expected)| config.normalize(seen) == config.normalize(expected))
}

/// Stateful classifier for a single completion.
#[derive(Debug, Clone)]
pub struct StreamClassifier {
    config: StreamClassifierConfig,
    state: ClassifierState,
}

impl StreamClassifier {
    pub fn new(config: StreamClassifierConfig) -> Self {
        Self {
            config,
            state: ClassifierState::default(),
        }
    }

    /// Reset for a new completion.
    pub fn on_start(&mut self) {
        self.state = ClassifierState::default();
    }

    pub fn on_token(&mut self, fragment: &str) -> Vec<StreamEvent> {
        let (state, events) = step(std::mem::take(&mut self.state), &self.config, fragment);
        self.state = state;
        events
    }

    pub fn on_end(&mut self) -> Vec<StreamEvent> {
        let (state, events) = finish(std::mem::take(&mut self.state));
        self.state = state;
        events
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(boundary: &[&str], suppress: Option<&str>) -> StreamClassifierConfig {
        StreamClassifierConfig {
            boundary_tokens: boundary.iter().map(|s| s.to_string()).collect(),
            suppress_token: suppress.map(String::from),
            strip_tokens: true,
            include_boundary: false,
        }
    }

    fn feed(classifier: &mut StreamClassifier, fragments: &[&str]) -> Vec<StreamEvent> {
        classifier.on_start();
        let mut events = Vec::new();
        for f in fragments {
            events.extend(classifier.on_token(f));
        }
        events.extend(classifier.on_end());
        events
    }

    fn token(s: &str) -> StreamEvent {
        StreamEvent::SegmentToken(s.into())
    }

    #[test]
    fn boundary_opens_segment() {
        let mut c = StreamClassifier::new(config(&["Th", "ought", ":"], None));
        let events = feed(&mut c, &["Th", "ought", ":", "answer", "ing"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::SegmentStart,
                token("answer"),
                token("ing"),
                StreamEvent::SegmentEnd,
            ]
        );
        assert_eq!(c.phase(), Phase::Done);
    }

    #[test]
    fn segment_start_fires_on_completing_fragment() {
        let mut c = StreamClassifier::new(config(&["Thought", ":"], None));
        c.on_start();
        assert!(c.on_token("Thought").is_empty());
        assert_eq!(c.on_token(":"), vec![StreamEvent::SegmentStart]);
        assert_eq!(c.phase(), Phase::Streaming);
    }

    #[test]
    fn suppress_before_boundary_ends_once_without_start() {
        let mut c = StreamClassifier::new(config(&["Thought", ":"], Some("Action")));
        let events = feed(&mut c, &["Action", "foo", "Thought", ":", "bar"]);
        assert_eq!(events, vec![StreamEvent::SegmentEnd]);
        assert_eq!(c.phase(), Phase::Done);
    }

    #[test]
    fn suppress_with_default_config() {
        let mut c = StreamClassifier::new(StreamClassifierConfig::default());
        let events = feed(&mut c, &["Action", "foo"]);
        assert_eq!(events, vec![StreamEvent::SegmentEnd]);
    }

    #[test]
    fn suppressed_phase_before_end() {
        let mut c = StreamClassifier::new(StreamClassifierConfig::default());
        c.on_start();
        assert_eq!(c.on_token("Action"), vec![StreamEvent::SegmentEnd]);
        assert_eq!(c.phase(), Phase::Suppressed);
        assert!(c.on_token("Thought").is_empty());
        assert!(c.on_end().is_empty());
    }

    #[test]
    fn suppress_token_after_boundary_is_streamed() {
        let mut c = StreamClassifier::new(StreamClassifierConfig::default());
        let events = feed(&mut c, &["Thought", ":", " list", " tables", "Action"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::SegmentStart,
                token(" list"),
                token(" tables"),
                token("Action"),
                StreamEvent::SegmentEnd,
            ]
        );
    }

    #[test]
    fn no_boundary_no_events() {
        let mut c = StreamClassifier::new(config(&["Thought", ":"], Some("Action")));
        let events = feed(&mut c, &["just", " some", " text"]);
        assert!(events.is_empty());
    }

    #[test]
    fn stripped_comparison_ignores_whitespace() {
        let mut c = StreamClassifier::new(config(&["Final", "Answer", ":"], None));
        let events = feed(&mut c, &["\n", "Final", " Answer", ":", " 42"]);
        assert_eq!(
            events,
            vec![StreamEvent::SegmentStart, token(" 42"), StreamEvent::SegmentEnd]
        );
    }

    #[test]
    fn unstripped_comparison_is_exact() {
        let mut cfg = config(&["Final", "Answer", ":"], None);
        cfg.strip_tokens = false;
        let mut c = StreamClassifier::new(cfg);
        let events = feed(&mut c, &["Final", " Answer", ":", "x"]);
        assert!(events.is_empty());
    }

    #[test]
    fn include_boundary_replays_window() {
        let mut cfg = config(&["Thought", ":"], None);
        cfg.include_boundary = true;
        let mut c = StreamClassifier::new(cfg);
        let events = feed(&mut c, &["Thought", ":", " hi"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::SegmentStart,
                token("Thought"),
                token(":"),
                token(" hi"),
                StreamEvent::SegmentEnd,
            ]
        );
    }

    #[test]
    fn empty_boundary_opens_on_first_fragment() {
        let mut c = StreamClassifier::new(config(&[], None));
        let events = feed(&mut c, &["a", "b"]);
        assert_eq!(
            events,
            vec![StreamEvent::SegmentStart, token("a"), token("b"), StreamEvent::SegmentEnd]
        );
    }

    #[test]
    fn empty_suppress_token_is_ignored() {
        let mut c = StreamClassifier::new(config(&["Thought", ":"], Some("")));
        let events = feed(&mut c, &["", "Thought", ":", "x"]);
        assert_eq!(
            events,
            vec![StreamEvent::SegmentStart, token("x"), StreamEvent::SegmentEnd]
        );
    }

    #[test]
    fn fragments_after_end_are_ignored() {
        let mut c = StreamClassifier::new(config(&[], None));
        c.on_start();
        c.on_token("a");
        assert_eq!(c.on_end(), vec![StreamEvent::SegmentEnd]);
        assert!(c.on_token("late").is_empty());
        assert!(c.on_end().is_empty());
    }

    #[test]
    fn segment_end_only_after_start() {
        let mut c = StreamClassifier::new(config(&["Thought", ":"], None));
        c.on_start();
        c.on_token("Thought");
        assert!(c.on_end().is_empty());
    }

    #[test]
    fn window_slides_past_partial_matches() {
        let mut c = StreamClassifier::new(config(&["Thought", ":"], None));
        let events = feed(&mut c, &["Thought", "Thought", ":", "go"]);
        assert_eq!(
            events,
            vec![StreamEvent::SegmentStart, token("go"), StreamEvent::SegmentEnd]
        );
    }

    #[test]
    fn pure_step_does_not_mutate_input() {
        let cfg = config(&["Thought", ":"], None);
        let state = ClassifierState::default();
        let (next, events) = step(state.clone(), &cfg, "Thought");
        assert!(events.is_empty());
        assert_eq!(state.phase(), Phase::Watching);
        assert!(!next.is_segment_open());
    }

    #[test]
    fn from_stream_config() {
        let cfg = StreamClassifierConfig::from(&StreamConfig::default());
        assert_eq!(cfg, StreamClassifierConfig::default());
    }
}
