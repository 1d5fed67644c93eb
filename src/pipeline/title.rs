//! Turns arbitrary post titles into portable file names.

/// Characters rejected by at least one common filesystem.
const INVALID_CHARS: [char; 8] = ['\\', '/', ':', '*', '?', '<', '>', '|'];

pub const MAX_TITLE_CHARS: usize = 250;

fn is_edge_char(c: char) -> bool {
    c == '.' || c == ',' || c == ' '
}

/// Pure and deterministic: the same input and flag always give the same name,
/// and re-sanitizing a sanitized name returns it unchanged.
pub fn sanitize(raw: &str, title_case: bool) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.chars() {
        if INVALID_CHARS.contains(&c) {
            continue;
        }
        let c = if c == '"' { '\'' } else { c };
        if c == ' ' && cleaned.ends_with(' ') {
            continue;
        }
        cleaned.push(c);
    }

    // Leading junk goes before casing so the first kept letter counts as a word start.
    let cleaned = cleaned.trim_start_matches(is_edge_char);
    let cased = if title_case {
        self::title_case(cleaned)
    } else {
        cleaned.to_string()
    };

    shorten(&cased).trim_matches(is_edge_char).to_string()
}

/// Upper-cases the first letter of every space-separated word. Everything else
/// is left as is, so "ALtErNaTiNg CaPs" stays untouched.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c == ' ';
    }
    out
}

/// Cuts overlong titles at the first sentence, or hard at the limit.
fn shorten(s: &str) -> &str {
    if s.chars().count() <= MAX_TITLE_CHARS {
        return s;
    }
    let limit = s
        .char_indices()
        .nth(MAX_TITLE_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    match s[..limit].find('.') {
        Some(dot) => &s[..dot],
        None => &s[..limit],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_invalid_characters() {
        assert_eq!(sanitize("", false), "");
        for c in INVALID_CHARS {
            assert_eq!(sanitize(&c.to_string(), false), "");
        }
        assert_eq!(sanitize("\"", false), "'");
        assert_eq!(sanitize("'", false), "'");
        assert_eq!(sanitize("valid filename", false), "valid filename");
        assert_eq!(sanitize("invalid? f|lename", false), "invalid flename");
    }

    #[test]
    fn collapses_spaces_and_trims_edges() {
        assert_eq!(sanitize("a   b  |  c", false), "a b c");
        assert_eq!(sanitize("  ..,title,.. ", false), "title");
        assert_eq!(sanitize("......words....", false), "words");
    }

    #[test]
    fn title_case_only_touches_word_starts() {
        assert_eq!(title_case(""), "");
        assert_eq!(title_case("!!!"), "!!!");
        assert_eq!(title_case("1234"), "1234");
        assert_eq!(title_case("a234"), "A234");
        assert_eq!(title_case("1word's"), "1word's");
        assert_eq!(title_case("ALtErNaTiNg CaPs"), "ALtErNaTiNg CaPs");
        assert_eq!(title_case("lowercase string"), "Lowercase String");
        assert_eq!(title_case("can't contractions"), "Can't Contractions");
        assert_eq!(title_case("could've Should've would've"), "Could've Should've Would've");
        assert_eq!(sanitize("mountain  lake at dawn", true), "Mountain Lake At Dawn");
    }

    #[test]
    fn long_titles_stop_at_first_sentence() {
        let long = format!("First sentence. {}", "x".repeat(300));
        assert_eq!(sanitize(&long, false), "First sentence");

        let one_word = "y".repeat(400);
        assert_eq!(sanitize(&one_word, false).chars().count(), MAX_TITLE_CHARS);

        let late_dot = format!("{}. tail", "z".repeat(300));
        assert_eq!(sanitize(&late_dot, false), "z".repeat(MAX_TITLE_CHARS));

        let short = "Short. Title.";
        assert_eq!(sanitize(short, false), "Short. Title");
    }

    #[test]
    fn multibyte_titles_truncate_on_char_boundaries() {
        let title = "é".repeat(300);
        assert_eq!(sanitize(&title, false).chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let samples = [
            "invalid? f|lename",
            ",abc def",
            "  \"quoted\"  title . ",
            "ALtErNaTiNg  CaPs??",
            "straße über alles",
            "...",
            "a / b : c",
        ];
        let long = format!("{} and then. {}", "w ".repeat(200), "v".repeat(80));
        for raw in samples.iter().copied().chain(std::iter::once(long.as_str())) {
            for tc in [false, true] {
                let once = sanitize(raw, tc);
                assert_eq!(sanitize(&once, tc), once, "not idempotent for {raw:?} (title_case={tc})");
            }
        }
    }
}
