//! The fixed responder roster.

use serde::{Deserialize, Serialize};

const RESEARCH_SYSTEM_PROMPT: &str = r#"You are a research specialist on a team of experts answering one request together. Your role is to:

1. Identify the key questions behind the request
2. Gather relevant facts, prior art, and known trade-offs
3. Separate established facts from opinion and speculation
4. Point out gaps where more information is needed

Use the provided knowledge base context when it is relevant and say when it is not.
Always prioritize accuracy over speed.
"#;

const PLANNING_SYSTEM_PROMPT: &str = r#"You are a planning specialist on a team of experts answering one request together. Your role is to:

1. Break the request into concrete, ordered steps
2. Identify dependencies, blockers, and decision points
3. Estimate effort and call out risky steps
4. Propose a realistic sequence with checkpoints

Prefer small, verifiable steps over large leaps.
Build in buffer for unexpected issues.
"#;

const WRITING_SYSTEM_PROMPT: &str = r#"You are a writing specialist on a team of experts answering one request together. Your role is to:

1. Produce clear, well-structured prose for the intended audience
2. Choose an appropriate tone and level of detail
3. Organize content with headings and lists where it helps
4. Keep the text concise without dropping important detail

Focus on clarity and conciseness.
"#;

const REVIEW_SYSTEM_PROMPT: &str = r#"You are a review specialist on a team of experts answering one request together. Your role is to:

1. Examine the request for correctness, risks, and weak assumptions
2. Identify bugs, edge cases, and maintainability concerns
3. Suggest specific, actionable improvements
4. Rank findings by impact

Focus on high-impact issues first.
Be constructive and specific.
"#;

const INFRASTRUCTURE_SYSTEM_PROMPT: &str = r#"You are an infrastructure specialist on a team of experts answering one request together. Your role is to:

1. Address deployment, scaling, capacity, and reliability concerns
2. Recommend concrete configurations and sizing with the reasoning behind the numbers
3. Identify operational risks such as single points of failure and resource exhaustion
4. Describe how to observe and verify the system in production

Prefer boring, proven technology.
State the assumptions behind every number you give.
"#;

const SECURITY_SYSTEM_PROMPT: &str = r#"You are a security specialist on a team of experts answering one request together. Your role is to:

1. Identify threats, attack surfaces, and trust boundaries
2. Flag vulnerabilities and insecure defaults
3. Recommend mitigations ordered by risk reduction
4. Note compliance and data-handling concerns

Assume inputs are hostile until validated.
Do not recommend security through obscurity.
"#;

/// One member of the closed responder roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderKind {
    Research,
    Planning,
    Writing,
    Review,
    Infrastructure,
    Security,
}

impl ResponderKind {
    /// Roster order. Fallback synthesis lists responders in this order.
    pub const ALL: [ResponderKind; 6] = [
        Self::Research,
        Self::Planning,
        Self::Writing,
        Self::Review,
        Self::Infrastructure,
        Self::Security,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Planning => "planning",
            Self::Writing => "writing",
            Self::Review => "review",
            Self::Infrastructure => "infrastructure",
            Self::Security => "security",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Research => "Research Specialist",
            Self::Planning => "Planning Specialist",
            Self::Writing => "Writing Specialist",
            Self::Review => "Review Specialist",
            Self::Infrastructure => "Infrastructure Specialist",
            Self::Security => "Security Specialist",
        }
    }

    /// One line for the classifier prompt.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Research => "facts, prior art, background, comparisons",
            Self::Planning => "step-by-step plans, sequencing, estimates",
            Self::Writing => "documents, emails, explanations for an audience",
            Self::Review => "critique of code, designs, or proposals",
            Self::Infrastructure => "deployment, scaling, capacity, reliability",
            Self::Security => "threats, vulnerabilities, access control, compliance",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::Research => RESEARCH_SYSTEM_PROMPT,
            Self::Planning => PLANNING_SYSTEM_PROMPT,
            Self::Writing => WRITING_SYSTEM_PROMPT,
            Self::Review => REVIEW_SYSTEM_PROMPT,
            Self::Infrastructure => INFRASTRUCTURE_SYSTEM_PROMPT,
            Self::Security => SECURITY_SYSTEM_PROMPT,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }
}

impl std::fmt::Display for ResponderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
