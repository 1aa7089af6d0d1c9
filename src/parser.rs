use std::rc::Rc;

use crate::{
    ast::{Block, Node},
    diagnostics::{Diagnostic, SourcePos},
    lexer::{Token, TokenKind},
    rules::RuleSet,
};

/// Words the standard statement and expression rules reserve.
pub const KEYWORDS: &[&str] = &["fn", "async", "return", "if", "else", "while", "await"];

pub fn parse_source(rules: &RuleSet, source: &str) -> Result<Vec<Node>, Diagnostic> {
    parse_file(rules, source, None)
}

pub fn parse_file(
    rules: &RuleSet,
    source: &str,
    file: Option<Rc<str>>,
) -> Result<Vec<Node>, Diagnostic> {
    let tokens = rules.lexer.tokenize_file(source, file)?;
    Parser::new(rules, tokens).parse_program()
}

/// Table-driven parser: statement rules pick constructs by their leading
/// token, expression rules implement precedence climbing.
pub struct Parser<'r> {
    rules: &'r RuleSet,
    tokens: Vec<Token>,
    current: usize,
}

impl<'r> Parser<'r> {
    pub fn new(rules: &'r RuleSet, tokens: Vec<Token>) -> Self {
        Self {
            rules,
            tokens,
            current: 0,
        }
    }

    pub fn parse_program(&mut self) -> Result<Vec<Node>, Diagnostic> {
        let mut nodes = Vec::new();
        self.skip_separators();
        while !self.at_end() {
            nodes.push(self.parse_statement()?);
            self.skip_separators();
        }
        Ok(nodes)
    }

    pub fn parse_statement(&mut self) -> Result<Node, Diagnostic> {
        self.skip_separators();
        let rules = self.rules;
        let this: &Parser<'r> = self;
        if let Some(rule) = rules.statements.iter().find(|rule| (rule.matches)(this)) {
            return (rule.parse)(self);
        }
        self.parse_expr(0)
    }

    /// Parses `{ statements }`. The opening brace is asserted, not skipped.
    pub fn parse_block(&mut self) -> Result<Block, Diagnostic> {
        let open = self.expect(TokenKind::Bracket, "{")?;
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            if self.is_bracket("}") {
                self.advance();
                break;
            }
            if self.at_end() {
                return Err(unmatched(&open));
            }
            items.push(self.parse_statement()?);
        }
        Ok(items.into())
    }

    /// A braced block, or a single statement standing in for one.
    pub fn parse_body(&mut self) -> Result<Block, Diagnostic> {
        if self.is_bracket("{") {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?].into())
        }
    }

    pub fn parse_expr(&mut self, min_precedence: u32) -> Result<Node, Diagnostic> {
        let rules = self.rules;
        let this: &Parser<'r> = self;
        let prefix = rules
            .expressions
            .iter()
            .find(|rule| rule.prefix.is_some() && (rule.matches)(this));
        let mut left = match prefix.and_then(|rule| rule.prefix.map(|f| (rule, f))) {
            Some((rule, prefix)) => prefix(self, rule.precedence)?,
            None => {
                let token = self.peek();
                return Err(Diagnostic::parser(format!(
                    "expected expression, found {}",
                    token.describe()
                ))
                .with_pos(token.pos.clone()));
            }
        };

        loop {
            let this: &Parser<'r> = self;
            let infix = rules.expressions.iter().find(|rule| {
                rule.infix.is_some() && rule.precedence > min_precedence && (rule.matches)(this)
            });
            match infix.and_then(|rule| rule.infix.map(|f| (rule, f))) {
                Some((rule, infix)) => left = infix(self, left, rule.precedence)?,
                None => break,
            }
        }
        Ok(left)
    }

    /// Parses `item (, item)*` up to `close`, consuming both brackets.
    pub fn parse_list(&mut self, open: &Token, close: &str) -> Result<Vec<Node>, Diagnostic> {
        let mut items = Vec::new();
        if self.is_bracket(close) {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr(0)?);
            if self.is_symbol(",") {
                self.advance();
                continue;
            }
            self.expect_closing(open, close)?;
            return Ok(items);
        }
    }

    pub fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    pub fn peek_at(&self, distance: usize) -> &Token {
        let index = (self.current + distance).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    pub fn pos(&self) -> SourcePos {
        self.peek().pos.clone()
    }

    pub fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.current += 1;
        }
        token
    }

    pub fn at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub fn check(&self, kind: TokenKind, text: &str) -> bool {
        self.peek().is(kind, text)
    }

    pub fn is_kind(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub fn is_symbol(&self, text: &str) -> bool {
        self.check(TokenKind::Symbol, text)
    }

    pub fn is_bracket(&self, text: &str) -> bool {
        self.check(TokenKind::Bracket, text)
    }

    pub fn is_word(&self, word: &str) -> bool {
        self.check(TokenKind::Ident, word)
    }

    pub fn expect(&mut self, kind: TokenKind, text: &str) -> Result<Token, Diagnostic> {
        if self.check(kind, text) {
            return Ok(self.advance());
        }
        Err(self.unexpected(&format!("`{text}`")))
    }

    pub fn expect_ident(&mut self, what: &str) -> Result<Token, Diagnostic> {
        let token = self.peek();
        if token.kind == TokenKind::Ident && !KEYWORDS.contains(&token.text.as_str()) {
            return Ok(self.advance());
        }
        Err(self.unexpected(what))
    }

    /// Consumes `close`, reporting the opening bracket when input runs out.
    pub fn expect_closing(&mut self, open: &Token, close: &str) -> Result<Token, Diagnostic> {
        if self.is_bracket(close) {
            return Ok(self.advance());
        }
        if self.at_end() {
            return Err(unmatched(open).with_note(format!("expected `{close}`")));
        }
        Err(self.unexpected(&format!("`{close}`")))
    }

    pub fn unexpected(&self, expected: &str) -> Diagnostic {
        let token = self.peek();
        Diagnostic::parser(format!("expected {expected}, found {}", token.describe()))
            .with_pos(token.pos.clone())
    }

    pub fn skip_separators(&mut self) {
        while self.is_kind(TokenKind::Separator) {
            self.advance();
        }
    }
}

fn unmatched(open: &Token) -> Diagnostic {
    Diagnostic::parser(format!("unmatched `{}`", open.text)).with_pos(open.pos.clone())
}
