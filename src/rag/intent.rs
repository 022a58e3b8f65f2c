//! Keyword-based question intent classification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Coarse category of a user question, used to pick answer instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Documentation,
    Definition,
    HowTo,
    LegalReference,
    Generic,
}

/// Checked top to bottom; the first rule with a matching keyword wins.
const RULES: &[(Intent, &[&str])] = &[
    (Intent::Documentation, &["documentation", "upload"]),
    (Intent::Definition, &["definition", "what is", "define"]),
    (Intent::HowTo, &["how do i", "steps", "process"]),
    (Intent::LegalReference, &["act", "law", "legal"]),
];

impl Intent {
    pub fn classify(question: &str) -> Self {
        let lowered = question.to_lowercase();
        RULES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::Generic)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Documentation => "documentation",
            Intent::Definition => "definition",
            Intent::HowTo => "how_to",
            Intent::LegalReference => "legal_reference",
            Intent::Generic => "generic",
        }
    }

    /// Answer-shaping instruction placed in the prompt for this intent.
    pub fn instruction(&self) -> &'static str {
        match self {
            Intent::Documentation => {
                "Provide details on required documents, their purpose, and how to obtain or verify them."
            }
            Intent::Definition => {
                "Provide a clear definition followed by bullet points explaining key details."
            }
            Intent::HowTo => "Provide a step-by-step explanation or guide.",
            Intent::LegalReference => {
                "Provide summaries or citations of legal acts, sections, or cases."
            }
            Intent::Generic => "Answer clearly and helpfully using only the provided context.",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = std::convert::Infallible;

    /// Unknown tags fall back to [`Intent::Generic`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "documentation" => Intent::Documentation,
            "definition" => Intent::Definition,
            "how_to" => Intent::HowTo,
            "legal_reference" => Intent::LegalReference,
            _ => Intent::Generic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_always_means_documentation() {
        for question in [
            "How do I UPLOAD my deed?",
            "upload the legal act",
            "Can I Upload a definition of terms?",
        ] {
            assert_eq!(Intent::classify(question), Intent::Documentation, "{question}");
        }
    }

    #[test]
    fn earlier_rules_shadow_later_ones() {
        assert_eq!(
            Intent::classify("Where is the documentation for this law?"),
            Intent::Documentation
        );
        assert_eq!(
            Intent::classify("What is the legal process?"),
            Intent::Definition
        );
        assert_eq!(
            Intent::classify("What steps does the act require?"),
            Intent::HowTo
        );
    }

    #[test]
    fn each_rule_matches_its_keywords() {
        assert_eq!(Intent::classify("Define easement"), Intent::Definition);
        assert_eq!(Intent::classify("Give me the definition"), Intent::Definition);
        assert_eq!(Intent::classify("how do i file a claim"), Intent::HowTo);
        assert_eq!(Intent::classify("Explain the probate PROCESS"), Intent::HowTo);
        assert_eq!(Intent::classify("Land Registration Act 2002"), Intent::LegalReference);
        assert_eq!(Intent::classify("Is this lawful?"), Intent::LegalReference);
    }

    #[test]
    fn substring_matching_is_literal() {
        // "act" inside "contract" still counts.
        assert_eq!(Intent::classify("Review my contract"), Intent::LegalReference);
        assert_eq!(
            Intent::classify("What documents do I need to register a property?"),
            Intent::Generic
        );
    }

    #[test]
    fn everything_else_is_generic() {
        assert_eq!(Intent::classify(""), Intent::Generic);
        assert_eq!(Intent::classify("Hello there"), Intent::Generic);
    }

    #[test]
    fn tags_parse_back_and_unknown_falls_back_to_generic() {
        for intent in [
            Intent::Documentation,
            Intent::Definition,
            Intent::HowTo,
            Intent::LegalReference,
            Intent::Generic,
        ] {
            assert_eq!(intent.as_str().parse::<Intent>().unwrap(), intent);
        }
        assert_eq!("smalltalk".parse::<Intent>().unwrap(), Intent::Generic);
    }

    #[test]
    fn instructions_are_distinct_per_intent() {
        let all = [
            Intent::Documentation,
            Intent::Definition,
            Intent::HowTo,
            Intent::LegalReference,
            Intent::Generic,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.instruction(), b.instruction());
            }
        }
    }
}
