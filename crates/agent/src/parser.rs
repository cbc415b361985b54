//! Action parser: turns one finished completion into an instruction.
//!
//! Model output is free text and often malformed. The parser runs an
//! ordered list of extraction rules; the first rule that recognizes the
//! text wins:
//!
//! 1. `fenced_json`: a ```` ```json ```` block holding an action object
//! 2. `final_answer_marker`: a literal `Final Answer:` (only when no
//!    fenced block is present)
//! 3. `bare_json_prefix`: the text before the first triple backtick,
//!    decoded as an action object
//!
//! Text no rule recognizes is returned as [`ParseResult::Unparsable`].
//! The parser never fails and never panics.

use regex_lite::Regex;
use serde_json::{Map, Value};
use sqlpilot_core::{ToolCall, ToolInput};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Value of the name key that means "this is the final answer".
pub const FINAL_ANSWER_SENTINEL: &str = "Final Answer";

const FINAL_ANSWER_MARKER: &str = "Final Answer:";
const FENCE: &str = "```";
const ANSWER_KEY: &str = "answer";
const NAME_KEYS: [&str; 2] = ["tool_name", "action"];
const INPUT_KEYS: [&str; 2] = ["tool_input", "action_input"];

static FENCED_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?[ \t]*\r?\n(.*?)```").ok());

/// The outcome of parsing one completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    /// Call a tool. `log` carries the raw completion.
    ToolCall(ToolCall),
    /// The run is done.
    FinalAnswer(String),
    /// Nothing recognizable; the raw text is kept for the caller.
    Unparsable(String),
}

/// A recoverable irregularity the parser worked around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAnomaly {
    /// A JSON list of actions was offered; only the first was used.
    MultipleActions { count: usize },
    /// The input key was missing and this key's value was used instead.
    BorrowedInputKey { key: String },
    /// The action was decoded from unfenced text before any fence.
    BareJsonFallback,
}

/// A parse result plus the anomalies recovered along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    pub result: ParseResult,
    pub anomalies: Vec<ParseAnomaly>,
    /// Name of the rule that matched, if any.
    pub rule: Option<&'static str>,
}

type Rule = fn(&str, &mut Vec<ParseAnomaly>) -> Option<ParseResult>;

const RULES: [(&str, Rule); 3] = [
    ("fenced_json", fenced_json),
    ("final_answer_marker", final_answer_marker),
    ("bare_json_prefix", bare_json_prefix),
];

/// Stateless action parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionParser;

impl ActionParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a completion.
    pub fn parse(&self, raw: &str) -> ParseResult {
        self.parse_detailed(raw).result
    }

    /// Parse a completion, also reporting which rule matched and any
    /// anomalies that were recovered.
    pub fn parse_detailed(&self, raw: &str) -> ParseOutput {
        for (name, rule) in RULES {
            let mut anomalies = Vec::new();
            if let Some(result) = rule(raw, &mut anomalies) {
                for anomaly in &anomalies {
                    warn!(rule = name, ?anomaly, "Recovered malformed model output");
                }
                debug!(rule = name, "Parsed model output");
                return ParseOutput {
                    result,
                    anomalies,
                    rule: Some(name),
                };
            }
        }

        ParseOutput {
            result: ParseResult::Unparsable(raw.to_string()),
            anomalies: Vec::new(),
            rule: None,
        }
    }
}

fn fenced_json(raw: &str, anomalies: &mut Vec<ParseAnomaly>) -> Option<ParseResult> {
    let captures = FENCED_BLOCK.as_ref()?.captures(raw)?;
    let body = captures.get(1)?.as_str().trim();
    let value: Value = serde_json::from_str(body).ok()?;
    action_from_value(value, raw, anomalies)
}

fn final_answer_marker(raw: &str, _anomalies: &mut Vec<ParseAnomaly>) -> Option<ParseResult> {
    if FENCED_BLOCK.as_ref().is_some_and(|re| re.is_match(raw)) {
        return None;
    }
    let at = raw.find(FINAL_ANSWER_MARKER)?;
    let answer = raw[at + FINAL_ANSWER_MARKER.len()..].trim();
    Some(ParseResult::FinalAnswer(answer.to_string()))
}

fn bare_json_prefix(raw: &str, anomalies: &mut Vec<ParseAnomaly>) -> Option<ParseResult> {
    let prefix = raw.split(FENCE).next().unwrap_or_default().trim();
    if prefix.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(prefix).ok()?;
    let result = action_from_value(value, raw, anomalies)?;
    anomalies.push(ParseAnomaly::BareJsonFallback);
    Some(result)
}

/// Interpret a decoded JSON value as an action.
fn action_from_value(
    value: Value,
    raw: &str,
    anomalies: &mut Vec<ParseAnomaly>,
) -> Option<ParseResult> {
    let object = match value {
        Value::Object(map) => map,
        Value::Array(items) => {
            let count = items.len();
            if count > 1 {
                anomalies.push(ParseAnomaly::MultipleActions { count });
            }
            match items.into_iter().next()? {
                Value::Object(map) => map,
                _ => return None,
            }
        }
        _ => return None,
    };
    action_from_object(object, raw, anomalies)
}

fn action_from_object(
    mut object: Map<String, Value>,
    raw: &str,
    anomalies: &mut Vec<ParseAnomaly>,
) -> Option<ParseResult> {
    if let Some(answer) = object.remove(ANSWER_KEY) {
        return Some(ParseResult::FinalAnswer(value_text(answer)));
    }

    let name_key = NAME_KEYS
        .iter()
        .find(|k| object.get(**k).is_some_and(Value::is_string))?;
    let name = match object.remove(*name_key) {
        Some(Value::String(name)) => name,
        _ => return None,
    };

    let input = match INPUT_KEYS.iter().find_map(|k| object.remove(*k)) {
        Some(input) => input,
        None if object.is_empty() => Value::Object(Map::new()),
        None if object.len() == 1 => {
            let (key, value) = object.into_iter().next()?;
            anomalies.push(ParseAnomaly::BorrowedInputKey { key });
            value
        }
        None => return None,
    };

    if name == FINAL_ANSWER_SENTINEL {
        return Some(ParseResult::FinalAnswer(value_text(input)));
    }

    Some(ParseResult::ToolCall(
        ToolCall::new(name, ToolInput::from_json(input)).with_log(raw),
    ))
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
