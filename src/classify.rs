use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Topics that get a RAG-generated answer; everything else is routed.
pub const RAG_TOPICS: &[&str] = &["How-to", "Product", "Best practices", "API/SDK", "SSO"];

const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "How-to",
        &[
            "how to", "how do", "how can", "steps", "guide", "tutorial", "set up", "setup",
            "configure", "create",
        ],
    ),
    (
        "Product",
        &["feature", "product", "dashboard", "workspace", "catalog", "ui", "screen"],
    ),
    (
        "Connector",
        &[
            "connector",
            "connection",
            "integrate",
            "integration",
            "sync",
            "data source",
            "crawl",
        ],
    ),
    (
        "Lineage",
        &["lineage", "upstream", "downstream", "dependency", "impact analysis"],
    ),
    (
        "API/SDK",
        &["api", "sdk", "endpoint", "token", "webhook", "request", "response", "rest"],
    ),
    (
        "SSO",
        &[
            "sso",
            "single sign-on",
            "saml",
            "oauth",
            "okta",
            "login",
            "sign in",
            "authentication",
            "identity provider",
        ],
    ),
    (
        "Glossary",
        &["glossary", "term", "definition", "business term", "metadata"],
    ),
    (
        "Best practices",
        &["best practice", "best practices", "recommend", "convention", "governance", "organize"],
    ),
    (
        "Sensitive data",
        &["pii", "sensitive", "gdpr", "compliance", "mask", "masking", "privacy"],
    ),
];

const ANGRY_CUES: &[&str] = &[
    "unacceptable",
    "furious",
    "angry",
    "terrible",
    "worst",
    "ridiculous",
    "demand",
];
const FRUSTRATED_CUES: &[&str] = &[
    "frustrated",
    "frustrating",
    "struggling",
    "stuck",
    "still not working",
    "not working",
    "keeps failing",
    "broken",
    "again",
];
const CURIOUS_CUES: &[&str] = &["curious", "wondering", "interested", "how", "what", "?"];

const URGENT_CUES: &[&str] = &[
    "urgent",
    "asap",
    "immediately",
    "critical",
    "blocker",
    "blocked",
    "production",
    "outage",
    "down",
];
const LOW_CUES: &[&str] = &["no rush", "whenever", "minor", "low priority", "when you get a chance"];

/// Ticket classification consumed by topic-gated answering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub topic: String,
    pub sentiment: String,
    pub priority: String,
}

impl Classification {
    pub fn is_rag_eligible(&self) -> bool {
        RAG_TOPICS.contains(&self.topic.as_str())
    }
}

/// Keyword-table scoring over the ticket text. Single-word cues match whole
/// words only; phrases match as substrings.
pub fn classify(text: &str) -> Classification {
    let lower = text.to_lowercase();
    let words: HashSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '/')
        .filter(|w| !w.is_empty())
        .collect();

    let topic = TOPIC_KEYWORDS
        .iter()
        .map(|(topic, keywords)| {
            let score: usize = keywords
                .iter()
                .filter(|keyword| matches_cue(&lower, &words, keyword))
                .count();
            (*topic, score)
        })
        .max_by_key(|&(_, score)| score)
        .filter(|&(_, score)| score > 0)
        .map(|(topic, _)| topic)
        .unwrap_or("How-to");

    let sentiment = if has_any_cue(&lower, &words, ANGRY_CUES) {
        "Angry"
    } else if has_any_cue(&lower, &words, FRUSTRATED_CUES) {
        "Frustrated"
    } else if has_any_cue(&lower, &words, CURIOUS_CUES) {
        "Curious"
    } else {
        "Neutral"
    };

    let priority = if sentiment == "Angry" || has_any_cue(&lower, &words, URGENT_CUES) {
        "P0 (High)"
    } else if has_any_cue(&lower, &words, LOW_CUES) {
        "P2 (Low)"
    } else {
        "P1 (Medium)"
    };

    Classification {
        topic: topic.to_string(),
        sentiment: sentiment.to_string(),
        priority: priority.to_string(),
    }
}

fn has_any_cue(lower: &str, words: &HashSet<&str>, cues: &[&str]) -> bool {
    cues.iter().any(|cue| matches_cue(lower, words, cue))
}

fn matches_cue(lower: &str, words: &HashSet<&str>, cue: &str) -> bool {
    if cue == "?" {
        return lower.contains('?');
    }
    if cue.contains(' ') {
        lower.contains(cue)
    } else {
        words.contains(cue)
    }
}
