use std::path::Path;

use chrono::NaiveDate;

pub const NO_CONTEXT: &str = "No specific context available.";

const CONTEXT_PLACEHOLDER: &str = "{context}";
const DATE_PLACEHOLDER: &str = "{date}";

/// System preamble with `{context}` and `{date}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    raw: String,
}

impl PromptTemplate {
    pub fn new(raw: impl Into<String>) -> Self {
        let mut raw = raw.into();
        // Templates without a slot still get the retrieved context.
        if !raw.contains(CONTEXT_PLACEHOLDER) {
            raw.push_str("\n\nContext:\n");
            raw.push_str(CONTEXT_PLACEHOLDER);
        }
        Self { raw }
    }

    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        tracing::info!("System prompt loaded from {}", path.display());
        Ok(Self::new(raw))
    }

    pub fn render(&self, context: &str, date: &str) -> String {
        self.raw
            .replace(DATE_PLACEHOLDER, date)
            .replace(CONTEXT_PLACEHOLDER, context)
    }
}

/// "January 5, 2026"
pub fn format_prompt_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Newline-joined snippets, or the fallback line when nothing was kept.
pub fn context_block(snippets: &[&str]) -> String {
    if snippets.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        snippets.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_fills_both_placeholders() {
        let template = PromptTemplate::new("Today is {date}.\nFacts:\n{context}");
        assert_eq!(
            template.render("a\nb", "May 1, 2026"),
            "Today is May 1, 2026.\nFacts:\na\nb"
        );
    }

    #[test]
    fn template_without_context_slot_gets_one_appended() {
        let template = PromptTemplate::new("You are Giacomino.");
        assert_eq!(
            template.render("fact", "x"),
            "You are Giacomino.\n\nContext:\nfact"
        );
    }

    #[test]
    fn date_is_formatted_like_a_sentence() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(format_prompt_date(date), "January 5, 2026");
    }

    #[test]
    fn empty_context_uses_fallback() {
        assert_eq!(context_block(&[]), NO_CONTEXT);
        assert_eq!(context_block(&["a", "b"]), "a\nb");
    }

    #[tokio::test]
    async fn load_reads_template_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.txt");
        std::fs::write(&path, "Hi {context}").unwrap();

        let template = PromptTemplate::load(&path).await.unwrap();
        assert_eq!(template.render("c", "d"), "Hi c");
    }
}
