use super::fsm::Fsm;
use super::token::{Token, TokenKind, lookup_ident};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LexState {
    Initial,
    /// The next identifier names a method, so keywords are not recognised.
    Method,
    /// An identifier was just read; a directly following `:` is a separator.
    NoSymbol,
}

/// Operator spellings accepted as a method name right after `def`.
const OPERATOR_METHOD_NAMES: &[&str] = &[
    "[]=", "===", "!==", "[]", "==", "!=", "<=", ">=", "<-", "->", "|>", "**", "=~", "+", "-", "*",
    "/", "%", "<", ">", "!",
];

/// Lazily turns source text into tokens. Lines are 1-based.
pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: usize,
    fsm: Fsm<LexState>,
    def_pending: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            position: 0,
            line: 1,
            fsm: Fsm::new(
                LexState::Initial,
                &[
                    (LexState::NoSymbol, &[LexState::Initial]),
                    (LexState::Method, &[LexState::Initial]),
                    (
                        LexState::Initial,
                        &[LexState::Method, LexState::Initial, LexState::NoSymbol],
                    ),
                ],
            ),
            def_pending: false,
        }
    }

    /// Collects every token up to and including `Eof`.
    pub fn tokenize(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn ch(&self) -> char {
        self.chars.get(self.position).copied().unwrap_or('\0')
    }

    fn peek(&self) -> char {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> char {
        self.chars
            .get(self.position + offset)
            .copied()
            .unwrap_or('\0')
    }

    fn advance(&mut self) {
        if self.position < self.chars.len() {
            self.position += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.position >= self.chars.len()
    }

    pub fn next_token(&mut self) -> Token {
        if !self.fsm.is(LexState::Method) && self.ch() != ':' {
            self.fsm.set(LexState::Initial);
        }
        self.skip_whitespace();

        if self.at_end() {
            return Token::new(TokenKind::Eof, "", self.line);
        }

        let line = self.line;
        let ch = self.ch();

        if self.def_pending
            && self.fsm.is(LexState::Method)
            && let Some(name) = self.read_operator_method_name()
        {
            self.def_pending = false;
            self.fsm.set(LexState::Initial);
            self.fsm.set(LexState::NoSymbol);
            return Token::new(TokenKind::Ident, name, line);
        }

        match ch {
            '"' | '\'' => Token::new(TokenKind::String, self.read_string(ch), line),
            '=' => match (self.peek(), self.peek_at(2)) {
                ('=', '=') => self.operator("===", 3),
                ('=', _) => self.operator("==", 2),
                ('~', _) => self.operator("=~", 2),
                _ => self.operator("=", 1),
            },
            '-' => match self.peek() {
                '=' => self.operator("-=", 2),
                '>' => self.operator("->", 2),
                _ => self.operator("-", 1),
            },
            '!' => match (self.peek(), self.peek_at(2)) {
                ('=', '=') => self.operator("!==", 3),
                ('=', _) => self.operator("!=", 2),
                _ => self.operator("!", 1),
            },
            '/' => self.operator("/", 1),
            '*' => match self.peek() {
                '*' => self.operator("**", 2),
                _ => self.operator("*", 1),
            },
            '<' => match self.peek() {
                '=' => self.operator("<=", 2),
                '-' => self.operator("<-", 2),
                _ => self.operator("<", 1),
            },
            '>' => match self.peek() {
                '=' => self.operator(">=", 2),
                _ => self.operator(">", 1),
            },
            ';' | ',' | '(' | ')' | '{' | '}' | '[' | ']' => {
                let literal = ch.to_string();
                self.advance();
                Token::separator(&literal, line)
            }
            '+' => match self.peek() {
                '=' => self.operator("+=", 2),
                _ => self.operator("+", 1),
            },
            '.' => match (self.peek(), self.peek_at(2)) {
                ('.', '.') => self.operator("...", 3),
                ('.', _) => self.operator("..", 2),
                _ => {
                    let token = self.operator(".", 1);
                    self.fsm.set(LexState::Method);
                    token
                }
            },
            ':' => {
                if self.fsm.is(LexState::NoSymbol) {
                    self.advance();
                    Token::separator(":", line)
                } else if self.peek() == ':' {
                    self.operator("::", 2)
                } else if is_letter(self.peek()) {
                    self.advance();
                    let symbol = self.read_identifier();
                    Token::new(TokenKind::String, symbol, line)
                } else {
                    self.advance();
                    Token::separator(":", line)
                }
            }
            '|' => match (self.peek(), self.peek_at(2)) {
                ('|', '=') => self.operator("||=", 3),
                ('|', _) => self.operator("||", 2),
                ('>', _) => self.operator("|>", 2),
                _ => {
                    self.advance();
                    Token::separator("|", line)
                }
            },
            '%' => self.operator("%", 1),
            '#' => Token::new(TokenKind::Comment, self.read_comment(), line),
            '&' => match self.peek() {
                '&' => self.operator("&&", 2),
                _ => self.operator("&", 1),
            },
            _ if is_letter(ch) || ch == '`' => self.read_word(line),
            '@' => {
                if is_letter(self.peek()) {
                    return Token::new(
                        TokenKind::InstanceVariable,
                        self.read_instance_variable(),
                        line,
                    );
                }
                self.advance();
                Token::new(TokenKind::Illegal, "@", line)
            }
            _ if ch.is_ascii_digit() => self.read_number(line),
            _ => {
                self.advance();
                Token::new(TokenKind::Illegal, ch.to_string(), line)
            }
        }
    }

    fn operator(&mut self, literal: &str, width: usize) -> Token {
        let line = self.line;
        for _ in 0..width {
            self.advance();
        }
        Token::operator(literal, line)
    }

    fn read_word(&mut self, line: usize) -> Token {
        let ch = self.ch();
        if ch.is_ascii_uppercase() {
            let literal = self.read_constant();
            self.fsm.set(LexState::Initial);
            self.settle_def_name();
            return Token::new(TokenKind::Constant, literal, line);
        }

        let literal = if ch == '`' {
            let quoted = self.read_quoted_identifier();
            let Some(first) = quoted.chars().next() else {
                return Token::new(TokenKind::Illegal, "``", line);
            };
            if first.is_ascii_uppercase() {
                self.fsm.set(LexState::Initial);
                return Token::new(TokenKind::Constant, quoted, line);
            }
            if first == '@' {
                return Token::new(TokenKind::InstanceVariable, quoted, line);
            }
            quoted
        } else {
            self.read_identifier()
        };

        let mut kind = TokenKind::Ident;
        if self.fsm.is(LexState::Method) {
            if literal == "self" {
                kind = TokenKind::SelfKw;
            }
            self.fsm.set(LexState::Initial);
            self.settle_def_name();
        } else if self.fsm.is(LexState::Initial) {
            kind = lookup_ident(&literal);
            if kind == TokenKind::Def {
                self.fsm.set(LexState::Method);
                self.def_pending = true;
            }
        }

        if kind == TokenKind::Ident {
            self.fsm.set(LexState::NoSymbol);
        }
        Token::new(kind, literal, line)
    }

    /// A `def` receiver (`def self.name`) keeps the operator-name window open
    /// until the actual method name has been read.
    fn settle_def_name(&mut self) {
        if self.def_pending && self.ch() != '.' {
            self.def_pending = false;
        }
    }

    fn read_operator_method_name(&mut self) -> Option<String> {
        for name in OPERATOR_METHOD_NAMES {
            let matches = name
                .chars()
                .enumerate()
                .all(|(offset, expected)| self.peek_at(offset) == expected);
            if matches {
                for _ in 0..name.chars().count() {
                    self.advance();
                }
                return Some((*name).to_string());
            }
        }
        None
    }

    fn skip_whitespace(&mut self) {
        while is_whitespace(self.ch()) && !self.at_end() {
            if self.ch() == '\n' {
                self.line += 1;
            }
            self.advance();
        }
    }

    fn read_number(&mut self, line: usize) -> Token {
        let start = self.position;
        while self.ch().is_ascii_digit() {
            self.advance();
        }
        if self.ch() == '.' && self.peek().is_ascii_digit() {
            self.advance();
            while self.ch().is_ascii_digit() {
                self.advance();
            }
            return Token::new(TokenKind::Float, self.slice(start), line);
        }
        Token::new(TokenKind::Int, self.slice(start), line)
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while is_letter(self.ch()) || self.ch().is_ascii_digit() {
            self.advance();
        }
        if self.ch() == '?' || self.ch() == '!' {
            self.advance();
        }
        self.slice(start)
    }

    fn read_quoted_identifier(&mut self) -> String {
        self.advance();
        let start = self.position;
        while !matches!(self.ch(), '`' | '\n' | '\0') {
            self.advance();
        }
        let literal = self.slice(start);
        if self.ch() == '`' {
            self.advance();
        }
        literal
    }

    fn read_constant(&mut self) -> String {
        let start = self.position;
        while is_letter(self.ch()) || self.ch().is_ascii_digit() {
            self.advance();
        }
        self.slice(start)
    }

    fn read_instance_variable(&mut self) -> String {
        let start = self.position;
        while is_letter(self.ch()) || self.ch() == '@' || self.ch().is_ascii_digit() {
            self.advance();
        }
        self.slice(start)
    }

    fn read_string(&mut self, quote: char) -> String {
        self.advance();
        let mut result = String::new();
        while !self.at_end() && self.ch() != quote {
            if self.ch() == '\\' {
                self.advance();
                if let Some(ch) = self.escape_sequence() {
                    result.push(ch);
                }
            } else {
                if self.ch() == '\n' {
                    self.line += 1;
                }
                result.push(self.ch());
            }
            self.advance();
        }
        // closing quote
        self.advance();
        result
    }

    /// Decodes the escape whose first character is under the cursor, leaving
    /// the cursor on its last character.
    fn escape_sequence(&mut self) -> Option<char> {
        let c = self.ch();
        match c {
            'a' => Some('\u{07}'),
            'b' => Some('\u{08}'),
            'f' => Some('\u{0C}'),
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            'v' => Some('\u{0B}'),
            'x' | 'u' | 'U' => {
                let digits = match c {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut value: u32 = 0;
                for _ in 0..digits {
                    self.advance();
                    value = (value << 4) | self.ch().to_digit(16)?;
                }
                char::from_u32(value)
            }
            '0'..='7' => {
                let mut value = c.to_digit(8)?;
                for _ in 0..2 {
                    self.advance();
                    value = (value << 3) | self.ch().to_digit(8)?;
                }
                char::from_u32(value)
            }
            '\0' if self.at_end() => None,
            other => Some(other),
        }
    }

    fn read_comment(&mut self) -> String {
        let start = self.position;
        while !matches!(self.ch(), '\n' | '\0') {
            self.advance();
        }
        self.slice(start)
    }

    fn slice(&self, start: usize) -> String {
        self.chars[start..self.position].iter().collect()
    }
}

fn is_letter(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

#[cfg(test)]
mod tests {
    use super::Lexer;
    use crate::compiler::token::TokenKind;

    #[test]
    fn def_accepts_operator_method_names() {
        let kinds: Vec<(TokenKind, String)> = Lexer::tokenize("def ==(other) { true }")
            .into_iter()
            .map(|token| (token.kind, token.literal))
            .collect();
        assert_eq!(kinds[1], (TokenKind::Ident, "==".to_string()));
        assert_eq!(kinds[2].0, TokenKind::LParen);
    }

    #[test]
    fn def_with_self_receiver_keeps_operator_window() {
        let tokens = Lexer::tokenize("def self.[](i) { i }");
        assert_eq!(tokens[1].kind, TokenKind::SelfKw);
        assert_eq!(tokens[2].kind, TokenKind::Dot);
        assert_eq!(tokens[3].kind, TokenKind::Ident);
        assert_eq!(tokens[3].literal, "[]");
    }
}
