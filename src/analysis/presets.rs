//! Quick-analysis prompt catalog

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::Serialize;

/// A named, ready-made analysis prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
pub struct AnalysisPreset {
    pub id: &'static str,
    pub title: &'static str,
    pub prompt: &'static str,
}

pub const CUSTOM_PRESET_ID: &str = "custom";
pub const DEFAULT_PRESET_ID: &str = "summary";
pub const DEFAULT_CUSTOM_PROMPT: &str =
    "Explain in detail the rights and obligations of each party.";

pub const PRESETS: &[AnalysisPreset] = &[
    AnalysisPreset {
        id: "summary",
        title: "Contract Summary",
        prompt: "Please provide a brief summary of the key points in this contract.",
    },
    AnalysisPreset {
        id: "parties",
        title: "Identify Parties",
        prompt: "Who are the parties involved in this contract?",
    },
    AnalysisPreset {
        id: "obligations",
        title: "Key Obligations",
        prompt: "What are the main obligations of each party under this contract?",
    },
    AnalysisPreset {
        id: "payment_terms",
        title: "Payment Terms",
        prompt: "Explain the payment terms and conditions in this contract.",
    },
    AnalysisPreset {
        id: "contract_term",
        title: "Contract Term",
        prompt: "How long is the term of this contract?",
    },
    AnalysisPreset {
        id: "termination",
        title: "Termination Clause",
        prompt: "Explain the termination clause of this contract.",
    },
    AnalysisPreset {
        id: "risk_analysis",
        title: "Risk Analysis",
        prompt: "Identify potential risks or clauses that disadvantage either party.",
    },
    AnalysisPreset {
        id: CUSTOM_PRESET_ID,
        title: "Custom",
        prompt: DEFAULT_CUSTOM_PROMPT,
    },
];

/// Look up a preset by id (case-insensitive)
pub fn find_preset(id: &str) -> Result<&'static AnalysisPreset> {
    let wanted = id.trim();
    PRESETS
        .iter()
        .find(|preset| preset.id.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| Error::UnknownPreset {
            preset: id.to_string(),
        })
}

/// Prompt chosen for an analysis, with the title shown above the result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub title: String,
    pub prompt: String,
}

/// Pick the prompt for a request.
///
/// Explicit prompt text wins and is titled by the preset if one was named,
/// otherwise "Custom". Without prompt text the named preset is used, falling
/// back to the summary preset. Blank prompt text is passed through so the
/// analyzer can reject it.
pub fn resolve_prompt(preset: Option<&str>, custom_prompt: Option<&str>) -> Result<ResolvedPrompt> {
    let preset = match preset {
        Some(id) => find_preset(id)?,
        None if custom_prompt.is_some() => find_preset(CUSTOM_PRESET_ID)?,
        None => find_preset(DEFAULT_PRESET_ID)?,
    };

    let prompt = match custom_prompt {
        Some(text) => text.to_string(),
        None => preset.prompt.to_string(),
    };

    Ok(ResolvedPrompt {
        title: preset.title.to_string(),
        prompt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_preset_ids_are_unique() {
        for (i, a) in PRESETS.iter().enumerate() {
            for b in &PRESETS[i + 1..] {
                assert_ne!(a.id, b.id);
            }
        }
    }

    #[test]
    fn test_default_is_summary() {
        let resolved = resolve_prompt(None, None).unwrap();
        assert_eq!(resolved.title, "Contract Summary");
        assert!(resolved.prompt.contains("summary"));
    }

    #[test]
    fn test_named_preset() {
        let resolved = resolve_prompt(Some("Termination"), None).unwrap();
        assert_eq!(
            resolved,
            ResolvedPrompt {
                title: "Termination Clause".to_string(),
                prompt: "Explain the termination clause of this contract.".to_string(),
            }
        );
    }

    #[test]
    fn test_custom_without_text_uses_default_custom_prompt() {
        let resolved = resolve_prompt(Some("custom"), None).unwrap();
        assert_eq!(resolved.prompt, DEFAULT_CUSTOM_PROMPT);
    }

    #[test]
    fn test_explicit_prompt_wins() {
        let resolved = resolve_prompt(None, Some("List all deadlines.")).unwrap();
        assert_eq!(resolved.title, "Custom");
        assert_eq!(resolved.prompt, "List all deadlines.");

        let resolved = resolve_prompt(Some("parties"), Some("Who signs?")).unwrap();
        assert_eq!(resolved.title, "Identify Parties");
        assert_eq!(resolved.prompt, "Who signs?");
    }

    #[test]
    fn test_blank_prompt_passes_through() {
        let resolved = resolve_prompt(Some("custom"), Some("  ")).unwrap();
        assert_eq!(resolved.prompt, "  ");
    }

    #[test]
    fn test_unknown_preset() {
        assert!(matches!(
            resolve_prompt(Some("tax_review"), None),
            Err(Error::UnknownPreset { .. })
        ));
    }
}
