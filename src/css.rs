//! Stylesheet rules as the inlining phases see them.
//!
//! This is not a CSS engine: a stylesheet is split into its top-level rules
//! with `cssparser`, each rule keeps its original text, and only the rules a
//! phase rewrites are ever re-serialized. Callers that changed nothing get
//! the input text back untouched.

use crate::util::{is_data_uri, join_url, locate_css_url};
use cssparser::{ParseError, Parser, ParserInput, SourcePosition, Token};

/// Classification of a top-level rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// `@import` with a usable URL
    Import,
    /// `selector { declarations }`
    Style,
    /// `@font-face { descriptors }`
    FontFace,
    /// Everything else (`@media`, `@charset`, malformed imports, ...)
    Other,
}

/// One `name: value` pair of a declaration block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
}

/// A top-level rule and its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssRule {
    kind: RuleKind,
    text: String,
}

impl CssRule {
    /// Classify a single rule's text.
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        let mut input = ParserInput::new(text);
        let mut parser = Parser::new(&mut input);
        let kind = match rule_lead(&mut parser) {
            Lead::AtRule(name) if name.eq_ignore_ascii_case("import") => {
                if parse_import_href(&mut parser).is_some() {
                    RuleKind::Import
                } else {
                    RuleKind::Other
                }
            }
            Lead::AtRule(name) if name.eq_ignore_ascii_case("font-face") => RuleKind::FontFace,
            Lead::AtRule(_) | Lead::Empty => RuleKind::Other,
            Lead::Qualified => RuleKind::Style,
        };
        Self {
            kind,
            text: text.to_string(),
        }
    }

    /// Build a rule from a prelude and a declaration list.
    pub fn from_declarations(prelude: &str, declarations: &[Declaration]) -> Self {
        let body = declarations
            .iter()
            .map(|d| format!("{}: {};", d.name, d.value))
            .collect::<Vec<_>>()
            .join(" ");
        Self::from_text(&format!("{} {{ {} }}", prelude.trim(), body))
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The URL of an `@import` rule, unquoted and unresolved.
    pub fn import_href(&self) -> Option<String> {
        if self.kind != RuleKind::Import {
            return None;
        }
        let mut input = ParserInput::new(&self.text);
        let mut parser = Parser::new(&mut input);
        rule_lead(&mut parser);
        parse_import_href(&mut parser)
    }

    /// Href and trailing media list of an `@import` rule.
    fn import_parts(&self) -> Option<(String, String)> {
        if self.kind != RuleKind::Import {
            return None;
        }
        let mut input = ParserInput::new(&self.text);
        let mut parser = Parser::new(&mut input);
        rule_lead(&mut parser);
        let href = parse_import_href(&mut parser)?;
        let rest = self.text.get(parser.position().byte_index()..).unwrap_or("");
        let media = rest.trim().trim_end_matches(';').trim().to_string();
        Some((href, media))
    }

    /// The same import with its href resolved against `base_url`, or `None`
    /// when resolving changes nothing.
    fn absolutized_import(&self, base_url: &str) -> Option<CssRule> {
        let (href, media) = self.import_parts()?;
        if is_data_uri(&href) {
            return None;
        }
        let joined = join_url(base_url, &href);
        if joined == href {
            return None;
        }
        let text = if media.is_empty() {
            format!("@import url(\"{}\");", joined)
        } else {
            format!("@import url(\"{}\") {};", joined, media)
        };
        Some(CssRule::from_text(&text))
    }

    /// Prelude and declarations of a style or font-face rule.
    pub fn declarations(&self) -> Option<(String, Vec<Declaration>)> {
        if !matches!(self.kind, RuleKind::Style | RuleKind::FontFace) {
            return None;
        }
        let mut input = ParserInput::new(&self.text);
        let mut parser = Parser::new(&mut input);
        let start = parser.position();
        loop {
            let before = parser.position();
            let token = next_token(&mut parser)?;
            if let Token::CurlyBracketBlock = token {
                let prelude = parser.slice(start..before).trim().to_string();
                let mut declarations = Vec::new();
                let _ = parser.parse_nested_block(|nested| {
                    declarations = parse_declaration_list(nested);
                    Ok::<(), ParseError<'_, ()>>(())
                });
                return Some((prelude, declarations));
            }
        }
    }

    /// Value of the first declaration called `name` (ASCII case-insensitive).
    pub fn declaration_value(&self, name: &str) -> Option<String> {
        self.declarations().and_then(|(_, decls)| {
            decls
                .into_iter()
                .find(|d| d.name.eq_ignore_ascii_case(name))
                .map(|d| d.value)
        })
    }
}

/// An ordered list of top-level rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    pub rules: Vec<CssRule>,
}

impl Stylesheet {
    /// Split stylesheet text into rules. Top-level comments are dropped.
    pub fn parse(css: &str) -> Self {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        let mut rules = Vec::new();

        loop {
            let start = parser.position();
            let token = match parser.next_including_whitespace_and_comments() {
                Ok(t) => t.clone(),
                Err(_) => break,
            };
            match token {
                Token::WhiteSpace(_) | Token::Comment(_) | Token::CDO | Token::CDC => continue,
                Token::AtKeyword(_) => skip_rule_rest(&mut parser, true),
                Token::CurlyBracketBlock => skip_block(&mut parser),
                _ => skip_rule_rest(&mut parser, false),
            }
            let text = parser.slice_from(start);
            if !text.trim().is_empty() {
                rules.push(CssRule::from_text(text));
            }
        }

        Self { rules }
    }

    pub fn has_imports(&self) -> bool {
        self.rules.iter().any(|r| r.kind == RuleKind::Import)
    }

    /// Serialize, one rule per line. Empty rules are left out.
    pub fn to_css(&self) -> String {
        self.rules
            .iter()
            .map(|r| r.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Rewrite relative `@import`, `background`, `background-image` and
/// font-face `src` references so they stay valid once the stylesheet text moves into another
/// document.
///
/// Returns the input verbatim when nothing needed rewriting.
pub fn adjust_resource_paths(css: &str, base_url: &str) -> String {
    let sheet = Stylesheet::parse(css);
    let mut changed = false;

    let rules = sheet
        .rules
        .into_iter()
        .map(|rule| {
            let properties: &[&str] = match rule.kind() {
                RuleKind::Import => {
                    return match rule.absolutized_import(base_url) {
                        Some(adjusted) => {
                            changed = true;
                            adjusted
                        }
                        None => rule,
                    };
                }
                RuleKind::Style => &["background-image", "background"],
                RuleKind::FontFace => &["src"],
                RuleKind::Other => return rule,
            };
            let Some((prelude, mut declarations)) = rule.declarations() else {
                return rule;
            };
            let mut rule_changed = false;
            for decl in declarations
                .iter_mut()
                .filter(|d| properties.iter().any(|p| d.name.eq_ignore_ascii_case(p)))
            {
                if let Some(value) = absolutize_url_value(base_url, &decl.value) {
                    decl.value = value;
                    rule_changed = true;
                }
            }
            if rule_changed {
                changed = true;
                CssRule::from_declarations(&prelude, &declarations)
            } else {
                rule
            }
        })
        .collect();

    if changed {
        Stylesheet { rules }.to_css()
    } else {
        css.to_string()
    }
}

fn absolutize_url_value(base_url: &str, value: &str) -> Option<String> {
    let (prefix, url, rest) = locate_css_url(value)?;
    if is_data_uri(&url) {
        return None;
    }
    let joined = join_url(base_url, &url);
    if joined == url {
        return None;
    }
    Some(format!("{}url(\"{}\"){}", prefix, joined, rest))
}

enum Lead {
    AtRule(String),
    Qualified,
    Empty,
}

fn rule_lead(parser: &mut Parser<'_, '_>) -> Lead {
    loop {
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(t) => t.clone(),
            Err(_) => return Lead::Empty,
        };
        match token {
            Token::WhiteSpace(_) | Token::Comment(_) => continue,
            Token::AtKeyword(name) => return Lead::AtRule(name.as_ref().to_string()),
            _ => return Lead::Qualified,
        }
    }
}

fn parse_import_href(parser: &mut Parser<'_, '_>) -> Option<String> {
    loop {
        let token = parser.next_including_whitespace_and_comments().ok()?.clone();
        match token {
            Token::WhiteSpace(_) | Token::Comment(_) => continue,
            Token::QuotedString(s) | Token::UnquotedUrl(s) => return Some(s.as_ref().to_string()),
            Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                let mut href = None;
                let _ = parser.parse_nested_block(|nested| {
                    while let Ok(token) = nested.next() {
                        if let Token::QuotedString(s) = token {
                            href = Some(s.as_ref().to_string());
                        }
                    }
                    Ok::<(), ParseError<'_, ()>>(())
                });
                return href;
            }
            _ => return None,
        }
    }
}

fn skip_rule_rest(parser: &mut Parser<'_, '_>, at_rule: bool) {
    loop {
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(t) => t.clone(),
            Err(_) => return,
        };
        match token {
            Token::Semicolon if at_rule => return,
            Token::CurlyBracketBlock => {
                skip_block(parser);
                return;
            }
            _ => {}
        }
    }
}

// Next token, with any function or bracket block it opens already consumed
// so that `position()` lands after it. Curly blocks are left to the caller.
fn next_token<'i>(parser: &mut Parser<'i, '_>) -> Option<Token<'i>> {
    let token = parser.next_including_whitespace_and_comments().ok()?.clone();
    if matches!(
        token,
        Token::Function(_) | Token::ParenthesisBlock | Token::SquareBracketBlock
    ) {
        skip_block(parser);
    }
    Some(token)
}

// Consume the contents of the block that was just opened.
fn skip_block(parser: &mut Parser<'_, '_>) {
    let _ = parser.parse_nested_block(|nested| {
        while nested.next_including_whitespace_and_comments().is_ok() {}
        Ok::<(), ParseError<'_, ()>>(())
    });
}

fn parse_declaration_list(parser: &mut Parser<'_, '_>) -> Vec<Declaration> {
    let mut declarations = Vec::new();

    'declarations: loop {
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(t) => t.clone(),
            Err(_) => break,
        };
        let name = match token {
            Token::Ident(name) => name.as_ref().to_string(),
            Token::WhiteSpace(_) | Token::Comment(_) | Token::Semicolon => continue,
            _ => {
                skip_to_semicolon(parser);
                continue;
            }
        };

        loop {
            let token = match parser.next_including_whitespace_and_comments() {
                Ok(t) => t.clone(),
                Err(_) => break 'declarations,
            };
            match token {
                Token::WhiteSpace(_) | Token::Comment(_) => continue,
                Token::Colon => break,
                Token::Semicolon => continue 'declarations,
                _ => {
                    skip_to_semicolon(parser);
                    continue 'declarations;
                }
            }
        }

        let value_start = parser.position();
        let mut value_end: SourcePosition = value_start;
        loop {
            let before = parser.position();
            let Some(token) = next_token(parser) else {
                break;
            };
            if let Token::Semicolon = token {
                value_end = before;
                break;
            }
            value_end = parser.position();
        }

        let value = parser.slice(value_start..value_end).trim().to_string();
        declarations.push(Declaration { name, value });
    }

    declarations
}

fn skip_to_semicolon(parser: &mut Parser<'_, '_>) {
    while let Ok(token) = parser.next_including_whitespace_and_comments() {
        if let Token::Semicolon = token {
            return;
        }
    }
}
