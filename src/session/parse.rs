//! Text classifiers used by the reducer for display metadata.

use super::state::ContentType;

/// Suggestions used when a `suggestions` event contains no bullet lines.
pub const DEFAULT_SUGGESTIONS: [&str; 6] = [
    "Add sound effects and background music",
    "Add a scoring system with high scores",
    "Increase difficulty as the game progresses",
    "Add power-ups and special abilities",
    "Improve the visual effects and animations",
    "Add mobile touch controls",
];

/// Bullets shown once a generation cycle completes.
pub const COMPLETION_BULLETS: [&str; 4] = [
    "Game code generated",
    "Preview is ready to play",
    "Ask for changes to iterate on the game",
    "Ask to publish when you are happy with it",
];

/// Guess the kind of a streamed code fragment.
///
/// Rule order is fixed: css markers first, then js markers, html otherwise.
pub fn classify_content_type(text: &str) -> ContentType {
    if text.contains("style") || text.contains("color:") {
        ContentType::Css
    } else if text.contains("function")
        || text.contains("const")
        || text.contains("addEventListener")
    {
        ContentType::Js
    } else {
        ContentType::Html
    }
}

/// Parse bulleted suggestion text into a list.
///
/// Lines starting with `-`, `*` or `N.` are taken; everything else is
/// ignored. Falls back to [`DEFAULT_SUGGESTIONS`] so the result is never
/// empty.
pub fn parse_suggestions(text: &str) -> Vec<String> {
    let parsed: Vec<String> = text.lines().filter_map(strip_bullet).collect();

    if parsed.is_empty() {
        DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
    } else {
        parsed
    }
}

fn strip_bullet(line: &str) -> Option<String> {
    let line = line.trim();

    let rest = if let Some(rest) = line.strip_prefix('-').or_else(|| line.strip_prefix('*')) {
        rest
    } else {
        let digits = line.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        line[digits..].strip_prefix('.')?
    };

    let item = rest.trim().trim_matches('*').trim();
    if item.is_empty() {
        None
    } else {
        Some(item.to_string())
    }
}

/// Reduce tag-like command text to its readable content.
///
/// `<generateCSS>Adding styling...</generateCSS>` becomes
/// `Adding styling...`. Text without tags is returned trimmed.
pub fn extract_command_text(command: &str) -> String {
    let mut out = String::with_capacity(command.len());
    let mut in_tag = false;

    for ch in command.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    let text = out.trim();
    if text.is_empty() {
        // Bare tag such as `<optimizeCode/>`: fall back to the tag name
        command
            .trim()
            .trim_start_matches('<')
            .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .next()
            .unwrap_or_default()
            .to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod content_type {
        use super::*;

        #[test]
        fn test_css_markers() {
            assert_eq!(classify_content_type("<style>body{}"), ContentType::Css);
            assert_eq!(classify_content_type("h1 { color: red }"), ContentType::Css);
        }

        #[test]
        fn test_js_markers() {
            assert_eq!(classify_content_type("function loop() {}"), ContentType::Js);
            assert_eq!(classify_content_type("const x = 1;"), ContentType::Js);
            assert_eq!(
                classify_content_type("btn.addEventListener('click')"),
                ContentType::Js
            );
        }

        #[test]
        fn test_css_wins_over_js() {
            assert_eq!(
                classify_content_type("const s = el.style;"),
                ContentType::Css
            );
        }

        #[test]
        fn test_html_fallback() {
            assert_eq!(classify_content_type("<div></div>"), ContentType::Html);
            assert_eq!(classify_content_type(""), ContentType::Html);
        }
    }

    mod suggestions {
        use super::*;

        #[test]
        fn test_dash_bullets() {
            assert_eq!(
                parse_suggestions("- Add sound\n- Add color\n"),
                vec!["Add sound".to_string(), "Add color".to_string()]
            );
        }

        #[test]
        fn test_star_and_numbered_bullets() {
            assert_eq!(
                parse_suggestions("Ideas:\n* Faster ball\n2. More levels\n10. Boss fight"),
                vec![
                    "Faster ball".to_string(),
                    "More levels".to_string(),
                    "Boss fight".to_string()
                ]
            );
        }

        #[test]
        fn test_bold_markers_are_trimmed() {
            assert_eq!(
                parse_suggestions("- **Add sound**"),
                vec!["Add sound".to_string()]
            );
        }

        #[test]
        fn test_no_bullets_yields_defaults() {
            let parsed = parse_suggestions("Just some prose without bullets.");
            assert_eq!(parsed.len(), 6);
            assert_eq!(parsed[0], DEFAULT_SUGGESTIONS[0]);
        }

        #[test]
        fn test_empty_bullets_are_skipped() {
            assert_eq!(parse_suggestions("-\n- \n").len(), 6);
        }

        #[test]
        fn test_number_without_dot_is_not_a_bullet() {
            assert_eq!(parse_suggestions("2024 was a year").len(), 6);
        }
    }

    mod commands {
        use super::*;

        #[test]
        fn test_strips_tags() {
            assert_eq!(
                extract_command_text("<createFile name='index.html'>Setting up game structure...</createFile>"),
                "Setting up game structure..."
            );
        }

        #[test]
        fn test_plain_text_is_trimmed() {
            assert_eq!(extract_command_text("  compiling  "), "compiling");
        }

        #[test]
        fn test_bare_tag_uses_tag_name() {
            assert_eq!(extract_command_text("<optimizeCode/>"), "optimizeCode");
        }
    }
}
