//! Language auto-detection
//!
//! Every candidate grammar highlights the same buffer; the result with the
//! highest relevance wins. A plain-text pseudo result with relevance 0 is
//! always in the running, so nothing is detected from text no grammar
//! recognises.

use std::cmp::Reverse;

use tracing::{debug, warn};

use super::manager::Highlighter;
use super::result::{HighlightResult, IllegalPolicy};
use crate::error::Result;

/// Highlight `code` with every candidate and return the best result
///
/// Unknown names and grammars with auto-detection disabled are skipped.
/// The runner-up is attached as `second_best`.
pub(crate) fn detect(highlighter: &Highlighter, code: &str, candidates: &[String]) -> Result<HighlightResult> {
    let mut ranked = vec![(HighlightResult::plain(None, code), None)];

    for name in candidates {
        let Some(grammar) = highlighter.get_language(name) else {
            continue;
        };
        if grammar.disable_autodetect {
            continue;
        }
        match highlighter.highlight_with(name, code, IllegalPolicy::Permissive, None) {
            Ok(result) => ranked.push((result, grammar.superset_of.clone())),
            Err(e) => warn!(language = %name, error = %e, "candidate failed during detection"),
        }
    }

    ranked.sort_by_key(|(result, _)| Reverse(result.relevance));
    prefer_subset(&mut ranked);
    debug!(
        candidates = ranked.len(),
        best = ranked[0].0.language.as_deref().unwrap_or("none"),
        relevance = ranked[0].0.relevance,
        "ranked detection results"
    );

    let mut ranked = ranked.into_iter().map(|(result, _)| result);
    let Some(mut best) = ranked.next() else {
        return Ok(HighlightResult::plain(None, code));
    };
    best.second_best = ranked.next().map(Box::new);
    Ok(best)
}

type Ranked = (HighlightResult, Option<String>);

/// On a tie for first place, a grammar gives way to the language it extends
fn prefer_subset(ranked: &mut [Ranked]) {
    let Some((first, rest)) = ranked.split_first() else {
        return;
    };
    let subset = rest
        .iter()
        .take_while(|r| r.0.relevance == first.0.relevance)
        .position(|r| {
            r.0.language
                .as_deref()
                .is_some_and(|name| is_superset(first.1.as_deref(), name))
        });
    if let Some(offset) = subset {
        ranked[..offset + 2].rotate_right(1);
    }
}

fn is_superset(superset_of: Option<&str>, language: &str) -> bool {
    superset_of.is_some_and(|s| s.eq_ignore_ascii_case(language))
}
