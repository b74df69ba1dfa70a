//! Rust language definition

use std::collections::BTreeMap;

use super::{captures, seq};
use crate::syntax::grammar::{ContainsDef, GrammarDef, KeywordsDef, ModeDef, VariantDef, WordList};
use crate::syntax::modes;

const KEYWORDS: &str = "as async await break const continue crate dyn else enum extern fn for \
    if impl in let loop match mod move mut pub ref return self Self static struct super trait \
    type union unsafe use where while";

const LITERALS: &str = "true false Some None Ok Err";

const TYPES: &str = "bool char str u8 u16 u32 u64 u128 usize i8 i16 i32 i64 i128 isize \
    f32 f64 String Vec Box Rc Arc Option Result";

const MACROS: &str = "println! print! eprintln! eprint! format! write! writeln! vec! \
    assert! assert_eq! assert_ne! debug_assert! panic! todo! unimplemented! unreachable! \
    matches! include_str! concat! env!";

const NUMBER_SUFFIX: &str = r"([ui](8|16|32|64|128|size)|f(32|64))?";

/// Create Rust language definition
pub fn rust_language() -> GrammarDef {
    let mut lang = GrammarDef::new("Rust");
    lang.aliases = vec!["rs".to_string()];

    let mut keywords = BTreeMap::new();
    keywords.insert("$pattern".to_string(), WordList::from(r"[a-zA-Z_]\w*!?"));
    keywords.insert("keyword".to_string(), WordList::from(KEYWORDS));
    keywords.insert("literal".to_string(), WordList::from(LITERALS));
    keywords.insert("type".to_string(), WordList::from(TYPES));
    keywords.insert("built_in".to_string(), WordList::from(MACROS));

    // Block comments nest
    let mut block_comment = modes::c_block_comment();
    block_comment.contains.push(ContainsDef::self_ref());

    let string = ModeDef::scoped("string")
        .with_begin(r#"b?""#)
        .with_end("\"")
        .with_contains(vec![modes::backslash_escape().into()]);

    // Raw strings close on a quote followed by as many `#` as they opened with
    let mut literal_string = ModeDef::scoped("string");
    literal_string.variants = vec![
        VariantDef::default().with_begin(r##"b?r(#*)"(.|\n)*?"\1(?!#)"##),
        VariantDef::default().with_begin(r"b?'\\?(x\w{2}|u\w{4}|U\w{8}|.)'"),
    ];

    let mut number = ModeDef::scoped("number").with_relevance(0);
    number.variants = [
        r"\b0b([01_]+)",
        r"\b0o([0-7_]+)",
        r"\b0x([A-Fa-f0-9_]+)",
        r"\b(\d[\d_]*(\.[0-9_]+)?([eE][+-]?[0-9_]+)?)",
    ]
    .iter()
    .map(|digits| VariantDef::default().with_begin(format!("{}{}", digits, NUMBER_SUFFIX)))
    .collect();

    let lifetime = ModeDef::scoped("symbol").with_begin(r"'[a-zA-Z_][a-zA-Z0-9_]*");

    let mut function = ModeDef::default().with_match(seq(&["fn", r"\s+", modes::UNDERSCORE_IDENT_RE]));
    function.scope = Some(captures(&[(1, "keyword"), (3, "title.function")]));

    let mut definition = ModeDef::default().with_match(seq(&[
        r"(?:trait|enum|struct|union|impl|for)",
        r"\s+",
        modes::UNDERSCORE_IDENT_RE,
    ]));
    definition.scope = Some(captures(&[(1, "keyword"), (3, "title.class")]));

    let attribute_string = ModeDef::scoped("string")
        .with_begin("\"")
        .with_end("\"")
        .with_contains(vec![modes::backslash_escape().into()]);
    let attribute = ModeDef::scoped("meta")
        .with_begin(r"#!?\[")
        .with_end(r"\]")
        .with_contains(vec![attribute_string.into()]);

    lang.root = ModeDef::default()
        .with_keywords(KeywordsDef::Categories(keywords))
        .with_illegal("</")
        .with_contains(vec![
            modes::c_line_comment().into(),
            block_comment.into(),
            string.into(),
            literal_string.into(),
            lifetime.into(),
            number.into(),
            function.into(),
            definition.into(),
            attribute.into(),
        ]);
    lang
}
