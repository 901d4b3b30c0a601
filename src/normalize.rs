use unicode_normalization::UnicodeNormalization;
use unicode_properties::{GeneralCategoryGroup, UnicodeGeneralCategory};

/// Canonicalizes text before any phrase-containment check against game-bot
/// output. The bot (and adversarial formatting) can hide zero-width, control
/// and combining characters inside otherwise-plain phrases; matching raw
/// content would silently miss them.
///
/// NFKC-normalize, drop every character in the C* (control/format) and
/// M* (combining mark) general categories, collapse whitespace runs to a
/// single space, trim and lowercase. Pure and idempotent.
pub fn normalize_text(text: &str) -> String {
    let stripped: String = text
        .nfkc()
        .filter(|ch| {
            !matches!(
                ch.general_category_group(),
                GeneralCategoryGroup::Other | GeneralCategoryGroup::Mark
            )
        })
        .collect();

    let mut out = String::with_capacity(stripped.len());
    let mut in_whitespace = false;
    for ch in stripped.trim().chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
            }
            in_whitespace = true;
        } else {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            in_whitespace = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_hidden_characters() {
        // Full-width C, zero-width space, combining acute accent.
        assert_eq!(normalize_text("\u{FF23}\u{200B}APT\u{0301}CHA"), "captcha");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(
            normalize_text("  Are   you a real  human  "),
            "are you a real human"
        );
    }

    #[test]
    fn test_control_whitespace_is_stripped_not_collapsed() {
        // Tabs and newlines are Cc characters: removed by the category
        // filter before collapsing, so they never become separators.
        assert_eq!(
            normalize_text("are you\ta real\n\nhuman"),
            "are youa realhuman"
        );
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "Ｃ\u{200b}APT\u{301}CHA",
            "please   complete\u{00A0}this",
            "",
            "already normal",
            "ＶＥＲＩＦＩＣＡＴＩＯＮ\u{202E}!",
        ];
        for s in samples {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once);
        }
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(normalize_text("you lost it all"), "you lost it all");
    }
}
