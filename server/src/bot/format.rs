//! Message formatting helpers shared across bot replies and notifications.

/// Escape Telegram Markdown special characters in user-provided content.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '=' | '|' | '{'
                | '}' | '.' | '!' | '-'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Render a cent amount as dollars, e.g. `1500` -> `"15.00"`.
pub fn usd(cents: i32) -> String {
    format!("{:.2}", cents as f64 / 100.0)
}

pub fn status_emoji(status: &str) -> &'static str {
    match status {
        "pending_approval" => "⏳",
        "active" => "✅",
        "sold" => "💰",
        "rejected" => "❌",
        "removed" => "🗑️",
        _ => "❓",
    }
}

pub fn delivery_emoji(delivery_type: &str) -> &'static str {
    match delivery_type {
        "instant" => "📱",
        "email" => "📧",
        "link" => "🔗",
        "manual" => "👤",
        _ => "📦",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markdown_metacharacters() {
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("v1.2 (beta)!"), "v1\\.2 \\(beta\\)\\!");
        assert_eq!(escape_markdown("plain words"), "plain words");
    }

    #[test]
    fn formats_cents_as_dollars() {
        assert_eq!(usd(1500), "15.00");
        assert_eq!(usd(999), "9.99");
        assert_eq!(usd(0), "0.00");
    }
}
