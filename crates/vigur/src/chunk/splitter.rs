//! Semantic text splitting.

use text_splitter::{Characters, ChunkConfig, MarkdownSplitter, TextSplitter};

/// Split text into chunks of at most `chunk_size` characters, with adjacent
/// chunks sharing up to `chunk_overlap` characters of context.
///
/// Markdown input is split along its structure (headings, paragraphs, lists)
/// so chunks respect document boundaries where possible. Empty chunks are
/// dropped.
pub fn split(text: &str, chunk_size: usize, chunk_overlap: usize, markdown: bool) -> Vec<String> {
    let pieces: Vec<String> = if markdown {
        MarkdownSplitter::new(splitter_config(chunk_size, chunk_overlap))
            .chunks(text)
            .map(|c| c.to_string())
            .collect()
    } else {
        TextSplitter::new(splitter_config(chunk_size, chunk_overlap))
            .chunks(text)
            .map(|c| c.to_string())
            .collect()
    };
    pieces
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn splitter_config(chunk_size: usize, chunk_overlap: usize) -> ChunkConfig<Characters> {
    // The overlap must stay below the capacity; upstream validation enforces
    // this, but the clamp keeps direct callers safe too.
    let overlap = chunk_overlap.min(chunk_size.saturating_sub(1));
    ChunkConfig::new(chunk_size)
        .with_overlap(overlap)
        .unwrap_or_else(|_| ChunkConfig::new(chunk_size))
}

/// Remove HTML tags, returning the visible text.
///
/// `script` and `style` elements are dropped entirely. Runs of whitespace
/// collapse to a single space.
pub fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut chars = html.char_indices().peekable();
    let mut skip_until: Option<&str> = None;

    while let Some((i, c)) = chars.next() {
        if let Some(close) = skip_until {
            if html[i..].len() >= close.len()
                && html[i..].as_bytes()[..close.len()].eq_ignore_ascii_case(close.as_bytes())
            {
                for _ in 0..close.len().saturating_sub(1) {
                    chars.next();
                }
                skip_until = None;
            }
            continue;
        }
        if c == '<' {
            let rest = &html[i..];
            let lower = rest.get(..8).unwrap_or(rest).to_ascii_lowercase();
            if lower.starts_with("<script") {
                skip_until = Some("</script>");
            } else if lower.starts_with("<style") {
                skip_until = Some("</style>");
            }
            // Consume through the closing '>'.
            for (_, tc) in chars.by_ref() {
                if tc == '>' {
                    break;
                }
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    collapse_whitespace(&out)
}

pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_respect_size_limit() {
        let text = "word ".repeat(500);
        for chunk in split(&text, 100, 0, false) {
            assert!(chunk.len() <= 100);
        }
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = split("just a short sentence", 512, 0, false);
        assert_eq!(chunks, vec!["just a short sentence"]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split("", 512, 0, false).is_empty());
        assert!(split("   \n\t  ", 512, 0, false).is_empty());
    }

    #[test]
    fn markdown_splits_on_structure() {
        let text = "# Title\n\nFirst paragraph.\n\n# Other\n\nSecond paragraph.";
        let chunks = split(text, 30, 0, true);
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn overlap_repeats_context_between_chunks() {
        let text = (0..200)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let plain = split(&text, 100, 0, false);
        let overlapped = split(&text, 100, 40, false);
        assert!(plain.len() > 1);
        assert_ne!(plain, overlapped);
        // Each chunk after the first starts with text the previous one ends with.
        for pair in overlapped.windows(2) {
            let first_word = pair[1].split_whitespace().next().unwrap();
            assert!(pair[0].contains(first_word), "no shared context in {pair:?}");
        }
    }

    #[test]
    fn overlap_at_capacity_is_clamped() {
        let text = "alpha beta gamma delta epsilon zeta".repeat(5);
        let chunks = split(&text, 50, 50, false);
        assert!(!chunks.is_empty());
        for chunk in chunks {
            assert!(chunk.len() <= 50);
        }
    }

    #[test]
    fn strips_simple_tags() {
        assert_eq!(
            strip_html_tags("<p>Hello <b>world</b></p>"),
            "Hello world"
        );
    }

    #[test]
    fn drops_script_content() {
        let html = "<p>visible</p><script>var hidden = 1;</script><p>more</p>";
        assert_eq!(strip_html_tags(html), "visible more");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(collapse_whitespace("a  b\n\nc\t d"), "a b c d");
    }
}
