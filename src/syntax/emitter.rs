//! Token tree and HTML rendering
//!
//! The tokenizer reports open/close/text events to a `TokenTree`. Once a
//! run is finished the tree is finalized and can be walked by any
//! `TreeVisitor`; `HtmlRenderer` is the one that produces markup.

use serde::Serialize;

use crate::error::Result;

/// Prefix for scope classes unless configured otherwise
pub const DEFAULT_CLASS_PREFIX: &str = "hljs-";

/// A node of the token tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TokenNode {
    Text(String),
    Scope(ScopeNode),
}

/// An interior node; the root is the only node without a scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScopeNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// The node holds the output of a nested run; `scope` is its language
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sublanguage: bool,
    pub children: Vec<TokenNode>,
}

impl ScopeNode {
    fn new(scope: Option<String>) -> Self {
        Self {
            scope,
            sublanguage: false,
            children: Vec::new(),
        }
    }

    /// Plain text under this node, in document order
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                TokenNode::Text(text) => out.push_str(text),
                TokenNode::Scope(node) => node.collect_text(out),
            }
        }
    }

    fn merge_text(&mut self) {
        let mut merged: Vec<TokenNode> = Vec::with_capacity(self.children.len());
        for child in self.children.drain(..) {
            match (merged.last_mut(), child) {
                (Some(TokenNode::Text(prev)), TokenNode::Text(text)) => prev.push_str(&text),
                (_, TokenNode::Scope(mut node)) => {
                    node.merge_text();
                    merged.push(TokenNode::Scope(node));
                }
                (_, child) => merged.push(child),
            }
        }
        self.children = merged;
    }

    fn walk<V: TreeVisitor + ?Sized>(&self, visitor: &mut V) {
        for child in &self.children {
            match child {
                TokenNode::Text(text) => visitor.text(text),
                TokenNode::Scope(node) => {
                    visitor.open(node);
                    node.walk(visitor);
                    visitor.close(node);
                }
            }
        }
    }
}

/// Receives the tree depth-first
pub trait TreeVisitor {
    fn text(&mut self, text: &str);
    fn open(&mut self, node: &ScopeNode);
    fn close(&mut self, node: &ScopeNode);
}

/// Builds the token tree from tokenizer events
#[derive(Debug, Clone)]
pub struct TokenTree {
    /// Open nodes, root first; never empty
    stack: Vec<ScopeNode>,
}

impl Default for TokenTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenTree {
    pub fn new() -> Self {
        Self {
            stack: vec![ScopeNode::new(None)],
        }
    }

    /// A finished tree holding a single text leaf
    pub fn from_text(text: &str) -> Self {
        let mut tree = Self::new();
        tree.add_text(text);
        tree
    }

    fn top(&mut self) -> &mut ScopeNode {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    pub fn open_node(&mut self, scope: &str) {
        self.stack.push(ScopeNode::new(Some(scope.to_string())));
    }

    /// Close the innermost open node; the root is never closed
    pub fn close_node(&mut self) {
        if self.stack.len() > 1 {
            if let Some(node) = self.stack.pop() {
                self.top().children.push(TokenNode::Scope(node));
            }
        }
    }

    pub fn close_all_nodes(&mut self) {
        while self.stack.len() > 1 {
            self.close_node();
        }
    }

    pub fn add_text(&mut self, text: &str) {
        if !text.is_empty() {
            self.top().children.push(TokenNode::Text(text.to_string()));
        }
    }

    pub fn add_keyword(&mut self, text: &str, scope: &str) {
        self.open_node(scope);
        self.add_text(text);
        self.close_node();
    }

    /// Attach the tree of a nested run as one opaque subtree
    pub fn add_sublanguage(&mut self, mut tree: TokenTree, language: Option<&str>) {
        tree.close_all_nodes();
        let mut node = tree.stack.swap_remove(0);
        node.scope = language.map(str::to_string);
        node.sublanguage = true;
        self.top().children.push(TokenNode::Scope(node));
    }

    /// Close everything and merge adjacent text leaves
    pub fn finalize(&mut self) {
        self.close_all_nodes();
        self.top().merge_text();
    }

    /// The root node; complete once the tree is finalized
    pub fn root(&self) -> &ScopeNode {
        &self.stack[0]
    }

    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    pub fn text(&self) -> String {
        self.root().text()
    }

    pub fn walk<V: TreeVisitor + ?Sized>(&self, visitor: &mut V) {
        self.root().walk(visitor);
    }

    pub fn to_html(&self, class_prefix: &str) -> String {
        let mut renderer = HtmlRenderer::new(class_prefix);
        self.walk(&mut renderer);
        renderer.finish()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self.root())?)
    }
}

/// Renders a token tree as `<span class="...">` markup
#[derive(Debug)]
pub struct HtmlRenderer {
    class_prefix: String,
    buffer: String,
}

impl HtmlRenderer {
    pub fn new(class_prefix: &str) -> Self {
        Self {
            class_prefix: class_prefix.to_string(),
            buffer: String::new(),
        }
    }

    pub fn finish(self) -> String {
        self.buffer
    }

    fn class_name(&self, node: &ScopeNode) -> Option<String> {
        let scope = node.scope.as_deref()?;
        if node.sublanguage {
            return Some(format!("language-{}", scope));
        }
        Some(scope_to_class(scope, &self.class_prefix))
    }
}

impl TreeVisitor for HtmlRenderer {
    fn text(&mut self, text: &str) {
        self.buffer.push_str(&escape_html(text));
    }

    fn open(&mut self, node: &ScopeNode) {
        if let Some(class) = self.class_name(node) {
            self.buffer.push_str("<span class=\"");
            self.buffer.push_str(&escape_html(&class));
            self.buffer.push_str("\">");
        }
    }

    fn close(&mut self, node: &ScopeNode) {
        if node.scope.is_some() {
            self.buffer.push_str("</span>");
        }
    }
}

/// `title.function.invoke` becomes `hljs-title function_ invoke__`
pub fn scope_to_class(scope: &str, prefix: &str) -> String {
    let mut pieces = scope.split('.');
    let mut class = format!("{}{}", prefix, pieces.next().unwrap_or(""));
    for (i, piece) in pieces.enumerate() {
        class.push(' ');
        class.push_str(piece);
        class.push_str(&"_".repeat(i + 1));
    }
    class
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
