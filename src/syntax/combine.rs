//! Pattern combination helpers
//!
//! Grammars are written as many small, independent regular expressions.
//! The engine glues them into single alternations so that one search
//! finds the earliest event of any rule. Gluing shifts capture group
//! numbers, so backreferences inside each piece have to be rewritten.

use std::sync::LazyLock;

use regex::Regex;

/// Lexer over regex source text.
///
/// Alternatives, in order: a complete character class, a named capturing
/// group opener, a group opener (`(` or `(?`), a numbered backreference,
/// and any other escape.
static PATTERN_LEXER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?:[^\\\]]|\\.)*\]|\(\?P?<[A-Za-z_]|\(\??|\\([1-9][0-9]*)|\\.")
        .expect("pattern lexer is a valid regex")
});

/// One lexical piece of a regex source
enum Piece<'a> {
    /// Text copied through unchanged
    Literal(&'a str),
    /// An opener that starts a capturing group
    Capture(&'a str),
    /// A numbered backreference such as `\2`
    Backref(usize),
}

/// Split a regex source into pieces, tracking classes, groups and escapes.
///
/// Anything the lexer does not recognise (an unterminated class, a
/// trailing backslash) is passed through as literal text.
fn pieces(source: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut rest = 0;

    for caps in PATTERN_LEXER.captures_iter(source) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > rest {
            out.push(Piece::Literal(&source[rest..whole.start()]));
        }
        let text = whole.as_str();
        if let Some(number) = caps.get(1) {
            match number.as_str().parse::<usize>() {
                Ok(n) => out.push(Piece::Backref(n)),
                Err(_) => out.push(Piece::Literal(text)),
            }
        } else if text == "(" || text.starts_with("(?<") || text.starts_with("(?P<") {
            out.push(Piece::Capture(text));
        } else {
            out.push(Piece::Literal(text));
        }
        rest = whole.end();
    }

    if rest < source.len() {
        out.push(Piece::Literal(&source[rest..]));
    }
    out
}

/// Count the capturing groups in a regex source
pub fn count_groups(source: &str) -> usize {
    pieces(source)
        .iter()
        .filter(|piece| matches!(piece, Piece::Capture(_)))
        .count()
}

/// Join regex sources into one pattern, renumbering backreferences.
///
/// Each source is wrapped in its own capturing group, so the k-th source
/// is always reachable as a top-level group. A backreference `\N` inside
/// source k is shifted by the number of groups contributed before it.
///
/// `join_with` is `"|"` for an alternation or `""` for a sequence.
pub fn combine<S: AsRef<str>>(sources: &[S], join_with: &str) -> String {
    let mut groups = 0;
    let mut parts = Vec::with_capacity(sources.len());

    for source in sources {
        // the wrapping group
        groups += 1;
        let offset = groups;
        let mut out = String::with_capacity(source.as_ref().len() + 2);
        out.push('(');
        for piece in pieces(source.as_ref()) {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Capture(text) => {
                    groups += 1;
                    out.push_str(text);
                }
                Piece::Backref(n) => {
                    out.push('\\');
                    out.push_str(&(n + offset).to_string());
                }
            }
        }
        out.push(')');
        parts.push(out);
    }

    parts.join(join_with)
}

/// Concatenate sources with no wrapping
pub fn concat<S: AsRef<str>>(sources: &[S]) -> String {
    sources.iter().map(|s| s.as_ref()).collect()
}

/// `(?=source)`
pub fn lookahead(source: &str) -> String {
    format!("(?={})", source)
}

/// `(?:source)?`
pub fn optional(source: &str) -> String {
    format!("(?:{})?", source)
}

/// Alternation of the sources, optionally as a capturing group
pub fn either<S: AsRef<str>>(sources: &[S], capture: bool) -> String {
    let body: Vec<&str> = sources.iter().map(|s| s.as_ref()).collect();
    format!("({}{})", if capture { "" } else { "?:" }, body.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_count_groups() {
        assert_eq!(count_groups(""), 0);
        assert_eq!(count_groups("abc"), 0);
        assert_eq!(count_groups("(a)(b)"), 2);
        assert_eq!(count_groups("(?:a)(?=b)(c)"), 1);
        assert_eq!(count_groups(r"\(a\)"), 0);
        assert_eq!(count_groups("[(](x)"), 1);
        assert_eq!(count_groups("(?P<word>a)(?<n>b)(?<=c)"), 2);
    }

    #[test]
    fn test_backreferences_are_renumbered() {
        let joined = combine(&[r"(a)(b)\1", r"(c)\1"], "|");
        assert_eq!(joined, r"((a)(b)\2)|((c)\5)");

        let re = fancy_regex::Regex::new(&joined).unwrap();
        assert!(re.is_match("aba").unwrap());
        assert!(re.is_match("cc").unwrap());
        // \1 of the second source must not refer to the first source's group
        assert!(!re.is_match("ca").unwrap());
        assert!(!re.is_match("abc").unwrap());
    }

    #[test]
    fn test_sequence_join() {
        let joined = combine(&["(a)", r"b\1"], "");
        assert_eq!(joined, r"((a))(b\2)");
    }

    #[test]
    fn test_escapes_and_classes_pass_through() {
        assert_eq!(combine(&[r"[\]\1(]x"], "|"), r"([\]\1(]x)");
        assert_eq!(combine(&[r"\\1"], "|"), r"(\\1)");
    }

    #[test]
    fn test_malformed_sources_do_not_panic() {
        assert_eq!(combine(&["[abc"], "|"), "([abc)");
        assert_eq!(combine(&["abc\\"], "|"), "(abc\\)");
        assert_eq!(count_groups("[abc("), 1);
    }

    #[test]
    fn test_small_helpers() {
        assert_eq!(lookahead("a"), "(?=a)");
        assert_eq!(optional("a"), "(?:a)?");
        assert_eq!(either(&["a", "b"], false), "(?:a|b)");
        assert_eq!(either(&["a", "b"], true), "(a|b)");
        assert_eq!(concat(&["a", "(?=b)"]), "a(?=b)");
    }

    fn source() -> impl Strategy<Value = String> {
        let atoms = vec!["a", "(b)", "(?:c)", r"\1", "[()]", "(?=d)", r"\("];
        prop::collection::vec(prop::sample::select(atoms), 0..6).prop_map(|atoms| atoms.concat())
    }

    proptest! {
        #[test]
        fn combined_group_count_is_sum(parts in prop::collection::vec(source(), 0..5)) {
            let joined = combine(&parts, "|");
            let expected: usize = parts.iter().map(|p| count_groups(p) + 1).sum();
            prop_assert_eq!(count_groups(&joined), expected);
        }

        #[test]
        fn plain_sources_are_only_wrapped(parts in prop::collection::vec("[a-z ]{0,10}", 1..5)) {
            let joined = combine(&parts, "|");
            let expected: Vec<String> = parts.iter().map(|p| format!("({})", p)).collect();
            prop_assert_eq!(joined, expected.join("|"));
        }

        #[test]
        fn each_alternative_keeps_its_own_backreference(n in 1usize..5) {
            let sources: Vec<String> = (0..n).map(|i| format!(r"({})\1", (b'a' + i as u8) as char)).collect();
            let re = fancy_regex::Regex::new(&combine(&sources, "|")).unwrap();
            for i in 0..n {
                let c = (b'a' + i as u8) as char;
                let doubled = format!("{}{}", c, c);
                prop_assert!(re.is_match(&doubled).unwrap());
            }
        }
    }
}
