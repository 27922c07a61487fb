//! Review prompt construction.

use super::OutputLanguage;

/// Base code-review prompt. The `[CODE_HERE]` marker is replaced with the
/// submitted snippet; a language instruction is appended afterwards.
pub const REVIEW_BASE_PROMPT: &str = r#"You are an expert senior software engineer performing a comprehensive code review.
Your primary goal is to help the user write better, more robust, and efficient code.
Analyze the following code snippet meticulously. Provide feedback that is actionable, constructive, and easy to understand.

**Important Instructions:**
1. **Auto-detect the programming language/framework** from the provided code and mention it at the start of your review
2. **Apply language-specific best practices** automatically based on what you detect
3. **Include framework-specific considerations** if you detect popular frameworks
4. **Prioritize issues by severity:** Critical (security/data loss) > High (bugs/major performance) > Medium (maintainability) > Low (style/minor improvements)

Structure your review into the following sections. If a section is not applicable, briefly state why.
Use markdown for formatting.

## Code Analysis Overview
## 1. Code Quality & Best Practices
## 2. Potential Bugs & Logic Issues
## 3. Performance Considerations
## 4. Security Vulnerabilities
## 5. Code Structure & Design
## 6. Suggestions for Improvement
## 7. Positive Aspects
## Next Steps (Prioritized)

Here is the code to review:
```
[CODE_HERE]
```"#;

const CODE_MARKER: &str = "[CODE_HERE]";

impl OutputLanguage {
    /// Instruction appended to the prompt so the review is written in the
    /// selected language.
    pub fn instruction(&self) -> &'static str {
        match self {
            OutputLanguage::En => "Please provide your entire review output in English.",
            OutputLanguage::Km => {
                "Please provide your entire review output in Khmer language (ភាសាខ្មែរ)."
            }
            OutputLanguage::Es => "Please provide your entire review output in Spanish (Español).",
            OutputLanguage::Fr => "Please provide your entire review output in French (Français).",
            OutputLanguage::Zh => "Please provide your entire review output in Chinese (中文).",
            OutputLanguage::Ja => "Please provide your entire review output in Japanese (日本語).",
            OutputLanguage::Ko => "Please provide your entire review output in Korean (한국어).",
            OutputLanguage::Vi => {
                "Please provide your entire review output in Vietnamese (Tiếng Việt)."
            }
            OutputLanguage::Th => "Please provide your entire review output in Thai (ภาษาไทย).",
        }
    }
}

/// Builds the full prompt for one submission.
pub fn build_review_prompt(code: &str, language: OutputLanguage) -> String {
    let body = REVIEW_BASE_PROMPT.replace(CODE_MARKER, code.trim());
    format!("{body}\n\n{}", language.instruction())
}
