use slotcore::{ExecutionContext, WidgetAction};

/// Language-code → display-name table for the response directive
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("ar", "Arabic"),
    ("de", "German"),
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("hi", "Hindi"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("tr", "Turkish"),
    ("zh", "Chinese"),
];

const DEFAULT_LANGUAGE_NAME: &str = "English";

/// Display name for a language code; regional suffixes are ignored and
/// unknown codes fall back to English.
pub fn language_display_name(code: &str) -> &'static str {
    let primary = code.trim().split(['-', '_']).next().unwrap_or("");
    let lowered = primary.to_ascii_lowercase();
    LANGUAGE_NAMES
        .iter()
        .find(|(candidate, _)| *candidate == lowered)
        .map(|(_, name)| *name)
        .unwrap_or(DEFAULT_LANGUAGE_NAME)
}

/// Assembles the final prompt sent to the generative backend: the action's
/// base prompt, an optional extra-instructions block and the language
/// directive.
pub struct PromptRenderer {
    language_code: String,
}

impl PromptRenderer {
    pub fn new(language_code: impl Into<String>) -> Self {
        Self {
            language_code: language_code.into(),
        }
    }

    /// The language directive is always appended, even when the base prompt
    /// is empty.
    pub fn render(
        &self,
        action: &dyn WidgetAction,
        ctx: &ExecutionContext,
        extra_instructions: Option<&str>,
    ) -> String {
        let mut prompt = action.build_prompt(ctx);

        if let Some(instructions) = extra_instructions {
            let trimmed = instructions.trim();
            if !trimmed.is_empty() {
                if !prompt.is_empty() {
                    prompt.push_str("\n\n");
                }
                prompt.push_str("Additional instructions:\n");
                prompt.push_str(trimmed);
            }
        }

        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str("Respond in ");
        prompt.push_str(language_display_name(&self.language_code));
        prompt.push('.');
        prompt
    }
}
