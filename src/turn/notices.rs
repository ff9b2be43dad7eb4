//! Human-readable announcement text

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Announcement pair for a known tool
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolNotice {
    /// Step text when the tool starts
    pub start: String,
    /// Completion phrase used in `completion_template`
    pub done: String,
}

/// Text for every announcement the interpreter can make.
///
/// Templates substitute `{agent}` and `{phrase}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Notices {
    pub opening: String,
    pub generating: String,
    pub preparing: String,
    pub image_saved: String,
    pub image_failed: String,
    pub consolidating_template: String,
    pub completion_template: String,
    /// Phrase for tools without an entry in `tools`
    pub generic_done: String,
    /// Entries from a catalog file are merged over the built-in table
    #[serde(deserialize_with = "merge_tool_notices")]
    pub tools: HashMap<String, ToolNotice>,
}

fn merge_tool_notices<'de, D>(deserializer: D) -> Result<HashMap<String, ToolNotice>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = HashMap::<String, ToolNotice>::deserialize(deserializer)?;
    let mut tools = Notices::default().tools;
    tools.extend(overrides);
    Ok(tools)
}

impl Default for Notices {
    fn default() -> Self {
        let tools = [
            (
                "RS",
                "📚 Searching the reliability database...",
                "reliability data search complete",
            ),
            (
                "TavilySearch",
                "🔍 Running web search...",
                "web search complete",
            ),
            (
                "PythonREPLTool",
                "🐍 Running Python code...",
                "code execution complete",
            ),
        ]
        .into_iter()
        .map(|(tool, start, done)| {
            (
                tool.to_string(),
                ToolNotice {
                    start: start.to_string(),
                    done: done.to_string(),
                },
            )
        })
        .collect();

        Self {
            opening: "🤖 Analyzing your question...".to_string(),
            generating: "🎯 Generating the final answer...".to_string(),
            preparing: "🎯 Preparing the final answer...".to_string(),
            image_saved: "📊 A chart has been generated.".to_string(),
            image_failed: "⚠️ Failed to process the generated image.".to_string(),
            consolidating_template: "🤖 {agent} finished, consolidating results...".to_string(),
            completion_template: "✅ {agent}: {phrase}".to_string(),
            generic_done: "task complete".to_string(),
            tools,
        }
    }
}

impl Notices {
    /// Start text for a known tool; unknown tools are not announced
    pub fn tool_start(&self, tool: &str) -> Option<&str> {
        self.tools.get(tool).map(|notice| notice.start.as_str())
    }

    pub fn tool_done(&self, agent: &str, tool: &str) -> String {
        let phrase = self
            .tools
            .get(tool)
            .map_or(self.generic_done.as_str(), |notice| notice.done.as_str());
        self.completion_template
            .replace("{agent}", agent)
            .replace("{phrase}", phrase)
    }

    pub fn consolidating(&self, agent: &str) -> String {
        self.consolidating_template.replace("{agent}", agent)
    }
}
