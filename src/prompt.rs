//! Prompt construction for item analysis.
//!
//! There are exactly two modes. An item with a non-blank memo gets a
//! [`PromptMode::Targeted`] prompt that extracts only what the memo asks for;
//! everything else gets the [`PromptMode::Generic`] three-part summary.

/// Header of the generic three-part summary request.
pub const GENERIC_INSTRUCTION: &str =
    "Analyze this content thoroughly. Provide a three-part summary:";

/// Header of the targeted extraction request.
pub const TARGETED_INSTRUCTION: &str =
    "You are a knowledge extractor. The user has stated exactly what they are looking for.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Targeted,
    Generic,
}

impl PromptMode {
    /// Hard branch on the presence of a focus string.
    pub fn for_focus(focus: Option<&str>) -> Self {
        match focus {
            Some(f) if !f.trim().is_empty() => PromptMode::Targeted,
            _ => PromptMode::Generic,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PromptMode::Targeted => "targeted",
            PromptMode::Generic => "generic",
        }
    }
}

/// Builds the prompt for `descriptor` (what the item is) and `body` (the
/// fetched text, possibly empty).
pub fn build_prompt(focus: Option<&str>, descriptor: &str, body: &str) -> String {
    match (PromptMode::for_focus(focus), focus) {
        (PromptMode::Targeted, Some(focus)) => targeted(focus.trim(), descriptor, body),
        _ => generic(descriptor, body),
    }
}

fn targeted(focus: &str, descriptor: &str, body: &str) -> String {
    format!(
        "{TARGETED_INSTRUCTION}

SEARCH FOCUS: {focus}

Extract ONLY the information relevant to the focus above from the content below.
Structure the result as:
- Key points about the requested subject (bullet points)
- Concrete details, steps, or instructions if present
- Any tips or warnings
- If the content is NOT about the requested subject, say so briefly.

Be concise and practical. No general summary, only what the user is looking for.

{descriptor}
{body}"
    )
}

fn generic(descriptor: &str, body: &str) -> String {
    format!(
        "{GENERIC_INSTRUCTION}
1. Topic and core message (2-3 sentences)
2. Key insights / takeaways (3-5 bullet points)
3. Practical relevance and usefulness

{descriptor}
{body}

Give a clear, usable analysis."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memo_selects_targeted() {
        let p = build_prompt(Some("deployment steps"), "Note: ship it", "");
        assert!(p.contains("SEARCH FOCUS: deployment steps"));
        assert!(p.contains(TARGETED_INSTRUCTION));
        assert!(!p.contains(GENERIC_INSTRUCTION));
        assert!(!p.contains("three-part summary"));
    }

    #[test]
    fn no_memo_selects_generic() {
        let p = build_prompt(None, "URL: https://example.com", "Content: text");
        assert!(p.contains(GENERIC_INSTRUCTION));
        assert!(p.contains("3-5 bullet points"));
        assert!(!p.contains(TARGETED_INSTRUCTION));
        assert!(p.contains("Content: text"));
    }

    #[test]
    fn blank_memo_is_generic() {
        assert_eq!(PromptMode::for_focus(Some("   ")), PromptMode::Generic);
        assert!(build_prompt(Some("  "), "d", "").contains(GENERIC_INSTRUCTION));
    }
}
