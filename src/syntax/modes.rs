//! Common modes and regex sources shared by grammars

use super::combine::{concat, either};
use super::grammar::{ContainsDef, ModeDef};

pub const IDENT_RE: &str = r"[a-zA-Z]\w*";
pub const UNDERSCORE_IDENT_RE: &str = r"[a-zA-Z_]\w*";
pub const NUMBER_RE: &str = r"\b\d+(\.\d+)?";
pub const C_NUMBER_RE: &str =
    r"(-?)(\b0[xX][a-fA-F0-9]+|(\b\d+(\.\d*)?|\.\d+)([eE][-+]?\d+)?)";
pub const BINARY_NUMBER_RE: &str = r"\b(0b[01]+)";

/// Words that mark a note inside a comment
const DOCTAGS: &[&str] = &["TODO", "FIXME", "NOTE", "BUG", "OPTIMIZE", "HACK", "XXX"];

/// `\` followed by any character
pub fn backslash_escape() -> ModeDef {
    ModeDef::default()
        .with_begin(r"\\[\s\S]")
        .with_relevance(0)
}

fn string(delimiter: &str) -> ModeDef {
    ModeDef::scoped("string")
        .with_begin(delimiter)
        .with_end(delimiter)
        .with_illegal(r"\n")
        .with_contains(vec![backslash_escape().into()])
}

pub fn apos_string() -> ModeDef {
    string("'")
}

pub fn quote_string() -> ModeDef {
    string("\"")
}

/// A comment running from `begin` to `end`, highlighting doc tags inside
pub fn comment(begin: &str, end: &str) -> ModeDef {
    let doctag = ModeDef::scoped("doctag")
        .with_match(concat(&[either(DOCTAGS, false).as_str(), ":"]))
        .with_relevance(0);
    ModeDef::scoped("comment")
        .with_begin(begin)
        .with_end(end)
        .with_contains(vec![doctag.into()])
}

pub fn c_line_comment() -> ModeDef {
    comment("//", "$")
}

pub fn c_block_comment() -> ModeDef {
    comment(r"/\*", r"\*/")
}

pub fn hash_comment() -> ModeDef {
    comment("#", "$")
}

fn number(source: &str) -> ModeDef {
    ModeDef::scoped("number").with_begin(source).with_relevance(0)
}

pub fn number_mode() -> ModeDef {
    number(NUMBER_RE)
}

pub fn c_number_mode() -> ModeDef {
    number(C_NUMBER_RE)
}

pub fn binary_number_mode() -> ModeDef {
    number(BINARY_NUMBER_RE)
}

pub fn title() -> ModeDef {
    ModeDef::scoped("title").with_begin(IDENT_RE).with_relevance(0)
}

pub fn underscore_title() -> ModeDef {
    ModeDef::scoped("title")
        .with_begin(UNDERSCORE_IDENT_RE)
        .with_relevance(0)
}

/// Swallows `.name` so that method names are not read as keywords
pub fn method_guard() -> ModeDef {
    ModeDef::default()
        .with_begin(format!(r"\.\s*{}", UNDERSCORE_IDENT_RE))
        .with_relevance(0)
}

/// `#!/usr/bin/env ...` on the first line of the buffer
pub fn shebang() -> ModeDef {
    let mut mode = ModeDef::scoped("meta")
        .with_begin(r"#![ ]*/")
        .with_end("$")
        .with_relevance(0);
    mode.on_begin = Some("bufferStart".to_string());
    mode
}

/// `/.../flags` regular expression literal
pub fn regexp() -> ModeDef {
    let class = ModeDef::default()
        .with_begin(r"\[")
        .with_end(r"\]")
        .with_relevance(0)
        .with_contains(vec![backslash_escape().into()]);
    ModeDef::scoped("regexp")
        .with_begin(r"/(?=[^/\n]*/)")
        .with_end(r"/[gimuy]*")
        .with_contains(vec![backslash_escape().into(), class.into()])
}

/// Modes most C-like grammars start from
pub fn c_like() -> Vec<ContainsDef> {
    vec![
        c_line_comment().into(),
        c_block_comment().into(),
        quote_string().into(),
        c_number_mode().into(),
    ]
}
