//! Prompt rendering.
//!
//! The loop hands a [`PromptContext`] to a [`PromptRenderer`] every round.
//! [`ChatMlPromptRenderer`] is the default and targets instruction-tuned
//! models served with ChatML markers.

use sqlpilot_core::{Scratchpad, ToolDescription};

use crate::early_stop::CONCLUDE_INSTRUCTION;

const SYSTEM_PREFIX: &str = "<|im_start|>system";
const OBSERVATION_PREFIX: &str = "<|im_start|>system observation";
const HUMAN_PREFIX: &str = "<|im_start|>user";
const AI_PREFIX: &str = "<|im_start|>assistant";
const TURN_END: &str = "<|im_end|>";
const EOS: &str = "</s>";

/// Preface for the replayed scratchpad.
pub const PREVIOUS_WORK_PREFIX: &str = "This was your previous work (but I haven't seen any of it! I only see what you return as final answer):";

/// Everything a renderer may use for one round.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub tools: &'a [ToolDescription],
    pub scratchpad: &'a Scratchpad,
    pub input: &'a str,
    /// Set for the single concluding round after the budget ran out.
    pub conclude: bool,
}

/// Turns a round's context into prompt text.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, ctx: &PromptContext<'_>) -> String;

    /// Sequences that end a completion for this prompt format.
    fn stop_sequences(&self) -> Vec<String> {
        Vec::new()
    }
}

/// ChatML renderer carrying SQL-agent instructions.
#[derive(Debug, Clone)]
pub struct ChatMlPromptRenderer {
    dialect: String,
    top_k: u32,
    instructions: Option<String>,
}

impl Default for ChatMlPromptRenderer {
    fn default() -> Self {
        Self::new("SQLite", 10)
    }
}

impl ChatMlPromptRenderer {
    pub fn new(dialect: impl Into<String>, top_k: u32) -> Self {
        Self {
            dialect: dialect.into(),
            top_k,
            instructions: None,
        }
    }

    /// Replace the SQL preamble. Tool list and action format are still
    /// appended.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    fn preamble(&self) -> String {
        if let Some(custom) = &self.instructions {
            return custom.clone();
        }
        format!(
            "You are an agent designed to interact with a SQL database. \
When given an input question, first examine the database tables to identify which ones \
are most relevant for answering the question. Then query the schemas of the most \
promising tables to understand their structure and contents. With this knowledge, \
construct a syntactically correct {dialect} query to retrieve the information needed \
to answer the question.\n\
Unless the user asks for a specific number of examples, always limit your query to at \
most {top_k} results. Never query for all the columns of a table, only ask for the \
relevant ones. Do not make any DML statements (INSERT, UPDATE, DELETE, DROP etc.) to \
the database.",
            dialect = self.dialect,
            top_k = self.top_k,
        )
    }

    fn system_block(&self, tools: &[ToolDescription]) -> String {
        let tool_lines = tools
            .iter()
            .map(|t| format!("{}: {}", t.name, t.description.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        let tool_names = tools
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "{preamble}\n\n\
You can use the following tools to access and interact with the database:\n\n\
{tool_lines}\n\n\
Always start with a thought:\n\n\
Thought: what you should do next\n\n\
To use a tool, follow the thought with a markdown json snippet:\n\n\
```json\n\
{{\n    \"tool_name\": string, // one of [{tool_names}]\n    \"tool_input\": string // the input for the tool\n}}\n\
```\n\n\
When you know the answer, finish with:\n\n\
Final Answer: the final answer to the original question\n\n\
Take a deep breath and work on this problem step-by-step.",
            preamble = self.preamble(),
        )
    }
}

impl PromptRenderer for ChatMlPromptRenderer {
    fn render(&self, ctx: &PromptContext<'_>) -> String {
        let mut prompt = format!(
            "{SYSTEM_PREFIX}\n{}{TURN_END}\n{HUMAN_PREFIX}\n{}{TURN_END}\n{AI_PREFIX}\n",
            self.system_block(ctx.tools),
            ctx.input
        );

        if !ctx.scratchpad.is_empty() {
            prompt.push_str(PREVIOUS_WORK_PREFIX);
            prompt.push('\n');
            for step in ctx.scratchpad.iter() {
                if step.is_terminal() {
                    continue;
                }
                prompt.push_str(&step.action_text());
                prompt.push_str(&format!(
                    "{TURN_END}\n{OBSERVATION_PREFIX}\n{}{TURN_END}\n{AI_PREFIX}\n",
                    step.observation_excerpt()
                ));
            }
        }

        if ctx.conclude {
            prompt.push_str(CONCLUDE_INSTRUCTION);
            prompt.push('\n');
        }

        prompt
    }

    fn stop_sequences(&self) -> Vec<String> {
        vec![TURN_END.to_string(), EOS.to_string()]
    }
}
