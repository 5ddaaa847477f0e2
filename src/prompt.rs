/// Number of characters of a row's input shown in log lines.
pub const PREVIEW_CHARS: usize = 50;

/// Build the prompt for one row: the system prompt followed by the row's input.
pub fn render(system_prompt: &str, input: &str) -> String {
    format!("{}\n\nInput: {}", system_prompt, input)
}

/// First [`PREVIEW_CHARS`] characters of `text`, for logging.
pub fn preview(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let result = render("Summarize the text.", "The quick brown fox");
        assert_eq!(result, "Summarize the text.\n\nInput: The quick brown fox");
    }

    #[test]
    fn test_render_empty_system_prompt() {
        assert_eq!(render("", "data"), "\n\nInput: data");
    }

    #[test]
    fn test_preview_short() {
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let text = "é".repeat(80);
        let p = preview(&text);
        assert_eq!(p.chars().count(), PREVIEW_CHARS);
    }
}
