use pulldown_cmark::{html, Options, Parser};

/// Stateless conversion from report text to displayable markup.
pub trait MarkupRenderer: Send + Sync {
    fn render(&self, text: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl MarkupRenderer for MarkdownRenderer {
    fn render(&self, text: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);

        let parser = Parser::new_ext(text, options);
        let mut out = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

/// Title line, optional news-period banner, then the analysis text.
pub fn compose_report(title_line: &str, date_range: Option<&str>, analysis: &str) -> String {
    let mut content = format!("{title_line}\n\n");
    if let Some(range) = date_range.map(str::trim).filter(|r| !r.is_empty()) {
        content.push_str(&format!("> **News period:** {range}\n\n"));
    }
    content.push_str(analysis);
    content
}
