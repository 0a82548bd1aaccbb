//! Heuristic repairs for upstream text that is declared as rich text but is often plain.

macro_rules! re {
    ($name:ident, $($e:expr),* $(,)?) => {
        static $name: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(
            || regex::Regex::new(concat!($($e),*)).unwrap(),
        );
    };
}

re!(BLOCK_TAG_RE, r"(?i)<\s*(p|div|br|ul|ol|li|h[1-6])\b[^>]*>");
re!(GLUED_BULLET_RE, r"([^\n>])\s*([•·*-])\s+");
re!(NEWLINE_RE, r"\r\n|\r|\n");
re!(TAG_RE, r"<[^>]*>?");

/// True when the text already carries block-level markup.
pub fn has_block_tags(text: &str) -> bool {
    BLOCK_TAG_RE.is_match(text)
}

/// Passes block-tagged HTML through untouched; repairs anything else as plain text.
pub fn format_description(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if has_block_tags(text) {
        return text.to_string();
    }
    repair_plain_text(text)
}

/// Breaks glued bullet markers onto their own line, then turns literal newlines into `<br />`.
pub fn repair_plain_text(text: &str) -> String {
    let bulleted = GLUED_BULLET_RE.replace_all(text, "$1<br/>$2 ");
    NEWLINE_RE.replace_all(&bulleted, "<br />").into_owned()
}

pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_tagged_html_passes_through() {
        let html = "<p>Venha trabalhar conosco</p>\n<ul><li>VT</li></ul>";
        assert_eq!(format_description(html), html);
        assert!(has_block_tags("<BR/>"));
        assert!(has_block_tags("<h2 class=\"x\">"));
        assert!(!has_block_tags("<b>bold</b> only"));
    }

    #[test]
    fn formatting_is_idempotent() {
        let html = "<div>Already <br> formatted</div>";
        let once = format_description(html);
        assert_eq!(format_description(&once), once);

        let plain = "Atividades:\n- Atender clientes - Emitir notas";
        let once = format_description(plain);
        assert_eq!(format_description(&once), once);
    }

    #[test]
    fn glued_bullets_get_their_own_line() {
        assert_eq!(
            repair_plain_text("Atividades • Atender clientes • Emitir notas"),
            "Atividades<br/>• Atender clientes<br/>• Emitir notas"
        );
        assert_eq!(repair_plain_text("Item one - Item two"), "Item one<br/>- Item two");
    }

    #[test]
    fn hyphenated_words_and_ranges_are_left_alone() {
        assert_eq!(repair_plain_text("bem-estar 2020-2021"), "bem-estar 2020-2021");
    }

    #[test]
    fn every_newline_encoding_becomes_a_break() {
        assert_eq!(repair_plain_text("a\r\nb\rc\nd"), "a<br />b<br />c<br />d");
    }

    #[test]
    fn empty_text_formats_to_empty() {
        assert_eq!(format_description(""), "");
    }

    #[test]
    fn strip_tags_keeps_text_only() {
        assert_eq!(strip_tags("<p>Olá <b>mundo</b></p>"), "Olá mundo");
        assert_eq!(strip_tags("sem tags"), "sem tags");
        assert_eq!(strip_tags("cortado <br"), "cortado ");
    }
}
