//! Agent-transition tracking
//!
//! Phase-start events carry an origin name. The registry maps names to
//! responders (by fragment) or to the supervisor; the tracker turns the
//! sequence of recognized names into handoff and return transitions.

use serde::Deserialize;

/// A specialist responder the supervisor can delegate to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResponderRule {
    pub id: String,
    /// Case-insensitive substring matched against origin names
    pub fragment: String,
    pub display_name: String,
    pub handoff_notice: String,
    pub working_notice: String,
}

/// How the supervisor shows up in origin names
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SupervisorRule {
    /// Case-insensitive substrings
    pub fragments: Vec<String>,
    /// Names matched exactly
    pub exact_names: Vec<String>,
    pub display_name: String,
}

impl Default for SupervisorRule {
    fn default() -> Self {
        Self {
            fragments: vec!["supervisor".to_string()],
            exact_names: vec!["LangGraph".to_string()],
            display_name: "Supervisor".to_string(),
        }
    }
}

impl SupervisorRule {
    fn matches(&self, origin: &str, lowered: &str) -> bool {
        self.exact_names.iter().any(|name| name == origin)
            || self
                .fragments
                .iter()
                .any(|fragment| lowered.contains(&fragment.to_lowercase()))
    }
}

/// Static table of responders and the supervisor pattern
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponderRegistry {
    pub responders: Vec<ResponderRule>,
    pub supervisor: SupervisorRule,
}

impl Default for ResponderRegistry {
    fn default() -> Self {
        let responders = [
            (
                "knowledge_search",
                "reliability_searcher",
                "Reliability Search Agent",
                "🔄 Handing off to the reliability search agent...",
                "📚 Searching the reliability knowledge base...",
            ),
            (
                "web_search",
                "websearcher",
                "Web Search Agent",
                "🔄 Handing off to the web search agent...",
                "🌐 Looking up recent information on the web...",
            ),
            (
                "code_execution",
                "coder",
                "Code Agent",
                "🔄 Handing off to the code agent...",
                "💻 Writing and running analysis code...",
            ),
        ]
        .into_iter()
        .map(|(id, fragment, display_name, handoff, working)| ResponderRule {
            id: id.to_string(),
            fragment: fragment.to_string(),
            display_name: display_name.to_string(),
            handoff_notice: handoff.to_string(),
            working_notice: working.to_string(),
        })
        .collect();

        Self {
            responders,
            supervisor: SupervisorRule::default(),
        }
    }
}

/// Result of matching an origin name against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    Responder(&'a ResponderRule),
    Supervisor,
    Unknown,
}

/// The agent currently holding the turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveAgent {
    Responder(String),
    Supervisor,
}

impl ResponderRegistry {
    /// Responders are checked first, so an origin naming both a responder and
    /// the supervisor counts as the responder.
    pub fn classify(&self, origin: &str) -> Classification<'_> {
        let lowered = origin.to_lowercase();
        if let Some(rule) = self
            .responders
            .iter()
            .find(|rule| lowered.contains(&rule.fragment.to_lowercase()))
        {
            return Classification::Responder(rule);
        }
        if self.supervisor.matches(origin, &lowered) {
            Classification::Supervisor
        } else {
            Classification::Unknown
        }
    }

    pub fn responder(&self, id: &str) -> Option<&ResponderRule> {
        self.responders.iter().find(|rule| rule.id == id)
    }

    /// Display name for attribution. No active agent attributes to the
    /// supervisor.
    pub fn display_name<'a>(&'a self, agent: Option<&'a ActiveAgent>) -> &'a str {
        match agent {
            Some(ActiveAgent::Responder(id)) => self
                .responder(id)
                .map_or(id.as_str(), |rule| rule.display_name.as_str()),
            Some(ActiveAgent::Supervisor) | None => &self.supervisor.display_name,
        }
    }

    /// Reject tables where an empty fragment would match every origin
    pub fn validate(&self) -> Result<(), String> {
        for rule in &self.responders {
            if rule.id.trim().is_empty() {
                return Err("responder with empty id".to_string());
            }
            if rule.fragment.trim().is_empty() {
                return Err(format!("responder '{}' has an empty fragment", rule.id));
            }
        }
        if self.supervisor.fragments.iter().any(|f| f.trim().is_empty()) {
            return Err("supervisor has an empty fragment".to_string());
        }
        Ok(())
    }
}

/// Announcement-worthy change of the active agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Control moved into a responder from anywhere else
    Entered { responder: String },
    /// Control came back to the supervisor from a responder
    Returned { from: String },
}

/// Current and previous agent for one turn
#[derive(Debug, Default)]
pub struct AgentTracker {
    current: Option<ActiveAgent>,
    previous: Option<ActiveAgent>,
}

impl AgentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one phase-start origin. Unrecognized origins leave the state
    /// untouched.
    pub fn observe(&mut self, registry: &ResponderRegistry, origin: &str) -> Option<Transition> {
        match registry.classify(origin) {
            Classification::Responder(rule) => {
                let next = ActiveAgent::Responder(rule.id.clone());
                let changed = self.current.as_ref() != Some(&next);
                self.previous = self.current.replace(next);
                changed.then(|| Transition::Entered {
                    responder: rule.id.clone(),
                })
            }
            Classification::Supervisor => {
                let transition = match &self.current {
                    Some(ActiveAgent::Responder(id)) => Some(Transition::Returned { from: id.clone() }),
                    _ => None,
                };
                self.previous = self.current.replace(ActiveAgent::Supervisor);
                transition
            }
            Classification::Unknown => None,
        }
    }

    pub fn current(&self) -> Option<&ActiveAgent> {
        self.current.as_ref()
    }

    #[allow(dead_code)] // Used in tests
    pub fn previous(&self) -> Option<&ActiveAgent> {
        self.previous.as_ref()
    }

    pub fn is_supervisor(&self) -> bool {
        self.current == Some(ActiveAgent::Supervisor)
    }
}
