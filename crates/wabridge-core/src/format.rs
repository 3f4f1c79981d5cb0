//! Content translation between the messaging side and the CRM.
//!
//! The messaging side uses single-character emphasis (`*bold*`, `~strike~`),
//! the CRM renders markdown (`**bold**`, `~~strike~~`). `_italic_` and
//! ```` ```mono``` ```` read the same on both sides.
//!
//! Both translations only touch delimiter runs of the exact source width,
//! so applying either one to already-translated text is a no-op.

use crate::types::MessageKind;

/// Formats message bodies for either side of the bridge.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFormatter;

impl ContentFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Render a native message for the CRM timeline.
    pub fn format_for_remote(&self, body: &str, kind: MessageKind) -> String {
        match kind {
            MessageKind::Text => native_to_markdown(body),
            MessageKind::Location => format_location(body),
            MessageKind::Contact => format_contact(body),
            MessageKind::Reaction => format!("{} Reacted: {}", icon(kind), body.trim()),
            _ => {
                let placeholder = format!("{} {}", icon(kind), label(kind));
                let caption = body.trim();
                if caption.is_empty() {
                    placeholder
                } else {
                    format!("{}\n{}", placeholder, native_to_markdown(caption))
                }
            }
        }
    }

    /// Render CRM markdown for the messaging side.
    pub fn format_for_native(&self, body: &str) -> String {
        markdown_to_native(body)
    }

    /// Prefix an outbound body with the agent's name.
    pub fn sign(&self, body: &str, agent_name: &str) -> String {
        let agent_name = agent_name.trim();
        if agent_name.is_empty() {
            return body.to_string();
        }
        format!("*{}:*\n{}", agent_name, body)
    }
}

fn icon(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Text => "",
        MessageKind::Image => "📷",
        MessageKind::Video => "🎥",
        MessageKind::Audio => "🎵",
        MessageKind::Document => "📄",
        MessageKind::Sticker => "🏷️",
        MessageKind::Location => "📍",
        MessageKind::Contact => "👤",
        MessageKind::Reaction => "💬",
        MessageKind::Unknown => "❔",
    }
}

fn label(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Text => "Text",
        MessageKind::Image => "Image",
        MessageKind::Video => "Video",
        MessageKind::Audio => "Audio",
        MessageKind::Document => "Document",
        MessageKind::Sticker => "Sticker",
        MessageKind::Location => "Location",
        MessageKind::Contact => "Contact",
        MessageKind::Reaction => "Reaction",
        MessageKind::Unknown => "Unsupported message",
    }
}

/// `lat,lng[,name]` becomes a maps link; anything else is shown verbatim.
fn format_location(body: &str) -> String {
    let mut parts = body.splitn(3, ',').map(str::trim);
    let lat = parts.next().and_then(|v| v.parse::<f64>().ok());
    let lng = parts.next().and_then(|v| v.parse::<f64>().ok());
    let name = parts.next().filter(|n| !n.is_empty());

    let head = match name {
        Some(name) => format!("{} {}: {}", icon(MessageKind::Location), label(MessageKind::Location), name),
        None => format!("{} {}", icon(MessageKind::Location), label(MessageKind::Location)),
    };

    match (lat, lng) {
        (Some(lat), Some(lng)) => {
            format!("{}\nhttps://www.google.com/maps?q={},{}", head, lat, lng)
        }
        _ if body.trim().is_empty() => head,
        _ => format!("{}\n{}", head, body.trim()),
    }
}

/// Contact cards arrive either as a plain name or as a vCard.
fn format_contact(body: &str) -> String {
    let name = body
        .lines()
        .find_map(|line| line.strip_prefix("FN:"))
        .unwrap_or_else(|| body.lines().next().unwrap_or(""))
        .trim();

    let tel = body
        .lines()
        .find(|line| line.starts_with("TEL"))
        .and_then(|line| line.rsplit(':').next())
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let mut out = format!("{} {}", icon(MessageKind::Contact), label(MessageKind::Contact));
    if !name.is_empty() {
        out.push_str(": ");
        out.push_str(name);
    }
    if let Some(tel) = tel {
        out.push('\n');
        out.push_str(tel);
    }
    out
}

/// Native emphasis to markdown.
pub fn native_to_markdown(text: &str) -> String {
    let text = convert_delimiters(text, '*', 1, 2);
    convert_delimiters(&text, '~', 1, 2)
}

/// Markdown emphasis to native.
pub fn markdown_to_native(text: &str) -> String {
    let text = convert_delimiters(text, '*', 2, 1);
    convert_delimiters(&text, '~', 2, 1)
}

/// A maximal run of one delimiter character.
#[derive(Debug, Clone, Copy)]
struct Run {
    start: usize,
    len: usize,
}

impl Run {
    fn end(&self, width: usize) -> usize {
        self.start + self.len * width
    }
}

/// Rewrite paired runs of exactly `from` delimiters into runs of `to` delimiters.
///
/// An opening run must be followed by a non-whitespace character, a closing run
/// preceded by one, and a pair never spans a line break.
fn convert_delimiters(text: &str, delim: char, from: usize, to: usize) -> String {
    let width = delim.len_utf8();
    let mut runs: Vec<Run> = Vec::new();
    let mut iter = text.char_indices().peekable();
    while let Some((idx, c)) = iter.next() {
        if c != delim {
            continue;
        }
        let mut len = 1;
        while matches!(iter.peek(), Some((_, n)) if *n == delim) {
            iter.next();
            len += 1;
        }
        runs.push(Run { start: idx, len });
    }

    let candidates: Vec<Run> = runs.into_iter().filter(|r| r.len == from).collect();
    let mut replace = vec![false; candidates.len()];

    let mut i = 0;
    while i < candidates.len() {
        let open = candidates[i];
        let after = text[open.end(width)..].chars().next();
        if !matches!(after, Some(c) if !c.is_whitespace()) {
            i += 1;
            continue;
        }

        let mut paired = None;
        for (j, close) in candidates.iter().enumerate().skip(i + 1) {
            let inner = &text[open.end(width)..close.start];
            if inner.contains('\n') {
                break;
            }
            let before = inner.chars().next_back();
            if matches!(before, Some(c) if !c.is_whitespace()) {
                paired = Some(j);
                break;
            }
        }

        match paired {
            Some(j) => {
                replace[i] = true;
                replace[j] = true;
                i = j + 1;
            }
            None => i += 1,
        }
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut cursor = 0;
    let replacement: String = std::iter::repeat(delim).take(to).collect();
    for (run, swap) in candidates.iter().zip(replace) {
        if !swap {
            continue;
        }
        out.push_str(&text[cursor..run.start]);
        out.push_str(&replacement);
        cursor = run.end(width);
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_to_remote() {
        let f = ContentFormatter::new();
        assert_eq!(f.format_for_remote("hello", MessageKind::Text), "hello");
        assert_eq!(
            f.format_for_remote("*bold* and ~gone~ and _it_", MessageKind::Text),
            "**bold** and ~~gone~~ and _it_"
        );
    }

    #[test]
    fn test_text_to_native() {
        let f = ContentFormatter::new();
        assert_eq!(
            f.format_for_native("**bold** and ~~gone~~ and _it_"),
            "*bold* and ~gone~ and _it_"
        );
    }

    #[test]
    fn test_translation_idempotent() {
        let f = ContentFormatter::new();
        let samples = [
            "*bold* text",
            "**bold** text",
            "a * b * c",
            "2*3*4 = 24",
            "~x~ ~~y~~ *z",
            "*multi\nline*",
            "***triple***",
        ];
        for s in samples {
            let once = f.format_for_remote(s, MessageKind::Text);
            assert_eq!(f.format_for_remote(&once, MessageKind::Text), once, "{:?}", s);
            let native = f.format_for_native(s);
            assert_eq!(f.format_for_native(&native), native, "{:?}", s);
        }
    }

    #[test]
    fn test_unpaired_delimiters_untouched() {
        assert_eq!(native_to_markdown("5 * 3 = 15"), "5 * 3 = 15");
        assert_eq!(native_to_markdown("*open only"), "*open only");
        assert_eq!(native_to_markdown("*a\nb*"), "*a\nb*");
    }

    #[test]
    fn test_media_placeholders() {
        let f = ContentFormatter::new();
        assert_eq!(f.format_for_remote("", MessageKind::Image), "📷 Image");
        assert_eq!(
            f.format_for_remote("look *here*", MessageKind::Image),
            "📷 Image\nlook **here**"
        );
        assert_eq!(f.format_for_remote("report.pdf", MessageKind::Document), "📄 Document\nreport.pdf");
        assert_eq!(f.format_for_remote("", MessageKind::Sticker), "🏷️ Sticker");
    }

    #[test]
    fn test_location_placeholder() {
        let f = ContentFormatter::new();
        assert_eq!(
            f.format_for_remote("-23.55,-46.63,Office", MessageKind::Location),
            "📍 Location: Office\nhttps://www.google.com/maps?q=-23.55,-46.63"
        );
        assert_eq!(f.format_for_remote("somewhere", MessageKind::Location), "📍 Location\nsomewhere");
    }

    #[test]
    fn test_contact_placeholder() {
        let f = ContentFormatter::new();
        let vcard = "BEGIN:VCARD\nVERSION:3.0\nFN:Maria Silva\nTEL;type=CELL:+55 11 98765-4321\nEND:VCARD";
        assert_eq!(
            f.format_for_remote(vcard, MessageKind::Contact),
            "👤 Contact: Maria Silva\n+55 11 98765-4321"
        );
        assert_eq!(f.format_for_remote("João", MessageKind::Contact), "👤 Contact: João");
    }

    #[test]
    fn test_sign() {
        let f = ContentFormatter::new();
        assert_eq!(f.sign("hi", "Bruna"), "*Bruna:*\nhi");
        assert_eq!(f.sign("hi", "  "), "hi");
    }
}
