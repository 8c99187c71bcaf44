use std::fmt;

use serde::{Deserialize, Serialize};

pub const MODEL_FAST: &str = "gemini-2.5-flash";
pub const MODEL_DEEP: &str = "gemini-3-pro-preview";

/// Token budget reserved for model reasoning in deep mode.
pub const DEEP_THINKING_BUDGET: u32 = 4096;

pub const SYSTEM_INSTRUCTION: &str = "You are Veritas, a high-precision AI research assistant.\n\
    Your goal is 99.9% accuracy.\n\
    Always cite your sources when using external tools.\n\
    Format your response using Markdown.\n\
    Be concise in 'Quick' mode, thorough in 'Moderate' mode, and exhaustive/analytical in 'Deep' mode.";

/// User-selected research depth. Controls which model tier answers, whether
/// live web search is enabled, and whether reasoning tokens are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchLevel {
    Quick,
    #[default]
    Moderate,
    Deep,
}

/// Fixed request parameters derived from one research level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestProfile {
    pub model_id: String,
    pub search_enabled: bool,
    pub thinking_budget: Option<u32>,
}

impl ResearchLevel {
    pub const ALL: [ResearchLevel; 3] = [
        ResearchLevel::Quick,
        ResearchLevel::Moderate,
        ResearchLevel::Deep,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Moderate => "moderate",
            Self::Deep => "deep",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Quick => "Fast response using internal knowledge.",
            Self::Moderate => "Verifies facts using live Google Search.",
            Self::Deep => "Complex reasoning (Thinking) + Deep Web Search.",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "quick" => Some(Self::Quick),
            "moderate" => Some(Self::Moderate),
            "deep" => Some(Self::Deep),
            _ => None,
        }
    }

    /// Maps the level onto its request profile using the default model tiers.
    pub fn profile(&self) -> RequestProfile {
        self.profile_with_models(MODEL_FAST, MODEL_DEEP)
    }

    /// Maps the level onto its request profile with configurable model tiers.
    /// Quick answers from the fast model alone; moderate adds live search;
    /// deep switches to the stronger model with search and a thinking budget.
    pub fn profile_with_models(&self, model_fast: &str, model_deep: &str) -> RequestProfile {
        match self {
            Self::Quick => RequestProfile {
                model_id: model_fast.to_string(),
                search_enabled: false,
                thinking_budget: None,
            },
            Self::Moderate => RequestProfile {
                model_id: model_fast.to_string(),
                search_enabled: true,
                thinking_budget: None,
            },
            Self::Deep => RequestProfile {
                model_id: model_deep.to_string(),
                search_enabled: true,
                thinking_budget: Some(DEEP_THINKING_BUDGET),
            },
        }
    }
}

impl fmt::Display for ResearchLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}
