use std::rc::Rc;

use crate::diagnostics::{Diagnostic, SourcePos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    Ident,
    Symbol,
    Bracket,
    Str,
    Separator,
    Comment,
    Eof,
}

impl TokenKind {
    /// Trivia tokens are recognized by the rule table but never reach the parser.
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Comment)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: SourcePos,
}

impl Token {
    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("`{}`", self.text),
        }
    }
}

/// Custom recognizer: the length of the match at the start of `input`, `None`
/// when it does not apply, or an error message for malformed input.
pub type Recognizer = fn(&str) -> Result<Option<usize>, &'static str>;

#[derive(Clone, Copy)]
pub enum Pattern {
    Fixed(&'static str),
    OneOf(&'static [&'static str]),
    Custom(Recognizer),
}

impl Pattern {
    fn recognize(&self, input: &str) -> Result<Option<usize>, &'static str> {
        match self {
            Pattern::Fixed(text) => Ok(input.starts_with(text).then_some(text.len())),
            Pattern::OneOf(options) => Ok(options
                .iter()
                .filter(|text| input.starts_with(**text))
                .map(|text| text.len())
                .max()),
            Pattern::Custom(recognizer) => recognizer(input),
        }
    }
}

#[derive(Clone, Copy)]
pub struct LexRule {
    pub name: &'static str,
    pub kind: TokenKind,
    pub pattern: Pattern,
}

impl LexRule {
    pub const fn new(name: &'static str, kind: TokenKind, pattern: Pattern) -> Self {
        Self {
            name,
            kind,
            pattern,
        }
    }
}

impl std::fmt::Debug for LexRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexRule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Characters accepted after a backslash inside string literals.
pub const ESCAPES: &[(char, char)] = &[
    ('n', '\n'),
    ('t', '\t'),
    ('r', '\r'),
    ('0', '\0'),
    ('\\', '\\'),
    ('\'', '\''),
    ('"', '"'),
    ('`', '`'),
];

pub const QUOTES: &[char] = &['"', '\'', '`'];

pub fn standard_rules() -> Vec<LexRule> {
    vec![
        LexRule::new("comment", TokenKind::Comment, Pattern::Custom(comment)),
        LexRule::new("number", TokenKind::Number, Pattern::Custom(number)),
        LexRule::new("ident", TokenKind::Ident, Pattern::Custom(identifier)),
        LexRule::new("string", TokenKind::Str, Pattern::Custom(string)),
        LexRule::new(
            "compound",
            TokenKind::Symbol,
            Pattern::OneOf(&["==", "!=", "<=", ">=", "&&", "||"]),
        ),
        LexRule::new(
            "symbol",
            TokenKind::Symbol,
            Pattern::OneOf(&["+", "-", "*", "/", "%", "<", ">", "=", "!", ",", ".", ":"]),
        ),
        LexRule::new(
            "bracket",
            TokenKind::Bracket,
            Pattern::OneOf(&["(", ")", "{", "}", "[", "]"]),
        ),
        LexRule::new("separator", TokenKind::Separator, Pattern::Fixed(";")),
    ]
}

fn comment(input: &str) -> Result<Option<usize>, &'static str> {
    if input.starts_with("//") {
        return Ok(Some(input.find('\n').unwrap_or(input.len())));
    }
    if let Some(rest) = input.strip_prefix("/*") {
        return match rest.find("*/") {
            Some(end) => Ok(Some(end + 4)),
            None => Err("unterminated block comment"),
        };
    }
    Ok(None)
}

fn number(input: &str) -> Result<Option<usize>, &'static str> {
    let digits = input.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Ok(None);
    }
    let rest = &input[digits..];
    if let Some(fraction) = rest.strip_prefix('.') {
        let fraction_digits = fraction.bytes().take_while(u8::is_ascii_digit).count();
        if fraction_digits > 0 {
            return Ok(Some(digits + 1 + fraction_digits));
        }
    }
    Ok(Some(digits))
}

fn identifier(input: &str) -> Result<Option<usize>, &'static str> {
    let mut chars = input.char_indices();
    match chars.next() {
        Some((_, ch)) if ch.is_ascii_alphabetic() || ch == '_' => {}
        _ => return Ok(None),
    }
    let end = chars
        .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || *ch == '_'))
        .map(|(idx, _)| idx)
        .unwrap_or(input.len());
    Ok(Some(end))
}

fn string(input: &str) -> Result<Option<usize>, &'static str> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, ch)) if QUOTES.contains(&ch) => ch,
        _ => return Ok(None),
    };
    while let Some((idx, ch)) = chars.next() {
        if ch == '\\' {
            chars.next();
        } else if ch == quote {
            return Ok(Some(idx + ch.len_utf8()));
        }
    }
    Err("unterminated string literal")
}

/// Decodes the body of a raw string token (quotes included) using [`ESCAPES`].
pub fn unescape(raw: &str) -> String {
    // quotes are single-byte ASCII
    let inner = raw.get(1..raw.len().saturating_sub(1)).unwrap_or("");
    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            value.push(ch);
            continue;
        }
        if let Some(escaped) = chars.next() {
            let decoded = ESCAPES
                .iter()
                .find(|(from, _)| *from == escaped)
                .map(|(_, to)| *to)
                .unwrap_or(escaped);
            value.push(decoded);
        }
    }
    value
}

/// Rule-table tokenizer. Every rule is tried at each position; the longest
/// match wins and ties go to the earlier rule.
#[derive(Debug, Clone)]
pub struct Lexer {
    rules: Vec<LexRule>,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    pub fn new() -> Self {
        Self::with_rules(standard_rules())
    }

    pub fn with_rules(rules: Vec<LexRule>) -> Self {
        Self { rules }
    }

    /// Registers `rule` ahead of every existing rule, so it wins ties.
    pub fn register_rule(&mut self, rule: LexRule) {
        self.rules.insert(0, rule);
    }

    pub fn rules(&self) -> &[LexRule] {
        &self.rules
    }

    pub fn tokenize(&self, source: &str) -> Result<Vec<Token>, Diagnostic> {
        self.tokenize_file(source, None)
    }

    pub fn tokenize_file(
        &self,
        source: &str,
        file: Option<Rc<str>>,
    ) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        let mut offset = 0;
        let mut line = 1;
        let mut column = 1;

        while let Some(ch) = source[offset..].chars().next() {
            if ch.is_whitespace() {
                offset += ch.len_utf8();
                if ch == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
                continue;
            }

            let pos = SourcePos::new(line, column, offset).with_file(file.clone());
            let rest = &source[offset..];
            let (rule, length) = self
                .longest_match(rest)
                .map_err(|message| Diagnostic::lexer(message).with_pos(pos.clone()))?
                .ok_or_else(|| {
                    Diagnostic::lexer(format!("unexpected character `{ch}`")).with_pos(pos.clone())
                })?;

            let text = &rest[..length];
            for consumed in text.chars() {
                if consumed == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }
            offset += length;

            if !rule.kind.is_trivia() {
                tokens.push(Token {
                    kind: rule.kind,
                    text: text.to_string(),
                    pos,
                });
            }
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            pos: SourcePos::new(line, column, offset).with_file(file),
        });
        Ok(tokens)
    }

    fn longest_match(&self, input: &str) -> Result<Option<(&LexRule, usize)>, &'static str> {
        let mut best: Option<(&LexRule, usize)> = None;
        for rule in &self.rules {
            let Some(length) = rule.pattern.recognize(input)? else {
                continue;
            };
            if length == 0 {
                continue;
            }
            if best.is_none_or(|(_, current)| length > current) {
                best = Some((rule, length));
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_decodes_table_entries() {
        assert_eq!(unescape(r#""a\nb""#), "a\nb");
        assert_eq!(unescape(r"'it\'s'"), "it's");
        assert_eq!(unescape(r#""\q""#), "q");
        assert_eq!(unescape(r#""""#), "");
    }

    #[test]
    fn number_stops_before_trailing_dot() {
        assert_eq!(number("12.5+"), Ok(Some(4)));
        assert_eq!(number("12.x"), Ok(Some(2)));
        assert_eq!(number("x"), Ok(None));
    }
}
