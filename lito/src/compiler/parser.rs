use super::ast::{
    BlockStatement, CallExpression, Conditional, ExprKind, Expression, Program, Statement,
    StmtKind, quote,
};
use super::fsm::Fsm;
use super::lexer::Lexer;
use super::token::{Token, TokenKind};

type PResult<T> = Result<T, ParseError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    EndOfFile,
    UnexpectedToken,
    /// A stray `}`; the REPL keeps reading more input.
    UnexpectedEnd,
    UnexpectedEof,
    MethodDefinition,
    InvalidAssignment,
    Syntax,
    Argument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
    pub kind: ParseErrorKind,
}

impl ParseError {
    fn new(kind: ParseErrorKind, line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
            kind,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == ParseErrorKind::EndOfFile
    }

    pub fn is_unexpected_end(&self) -> bool {
        self.kind == ParseErrorKind::UnexpectedEnd
    }

    pub fn is_unexpected_eof(&self) -> bool {
        self.kind == ParseErrorKind::UnexpectedEof
    }

    pub fn is_unexpected_token(&self) -> bool {
        self.kind == ParseErrorKind::UnexpectedToken
    }

    /// Input that may become valid once more lines are typed.
    pub fn is_incomplete(&self) -> bool {
        self.is_unexpected_eof() || self.is_unexpected_end()
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParserMode {
    #[default]
    Normal,
    Repl,
    Test,
    CommandLine,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    Normal,
    Assign,
    Logic,
    Range,
    Equals,
    Compare,
    Sum,
    Product,
    BangPrefix,
    Index,
    Call,
    MinusPrefix,
}

impl Precedence {
    pub fn of(kind: TokenKind) -> Self {
        use TokenKind as T;
        match kind {
            T::Eq | T::NotEq | T::IsSame | T::IsNotSame => Precedence::Equals,
            T::Match | T::Lt | T::Lte | T::Gt | T::Gte => Precedence::Compare,
            T::And | T::Or => Precedence::Logic,
            T::Range | T::RangeExcl => Precedence::Range,
            T::Plus | T::Minus | T::Modulo => Precedence::Sum,
            T::Slash | T::Asterisk | T::Pow => Precedence::Product,
            T::LBracket => Precedence::Index,
            T::Dot
            | T::LParen
            | T::ResolutionOperator
            | T::RightArrow
            | T::LeftArrow
            | T::Pipe
            | T::Catch
            | T::Finally
            | T::Ident => Precedence::Call,
            T::Assign | T::PlusEq | T::MinusEq | T::OrEq | T::Colon => Precedence::Assign,
            _ => Precedence::Normal,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParseState {
    Normal,
    FuncCall,
    MethodParam,
    Assignment,
}

/// Tokens that may start an argument list written without parentheses.
fn is_argument_starter(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Int
            | TokenKind::Float
            | TokenKind::String
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Nil
            | TokenKind::InstanceVariable
            | TokenKind::Constant
            | TokenKind::Ident
            | TokenKind::LBrace
            | TokenKind::SelfKw
            | TokenKind::Amp
    )
}

fn is_keyword_operator(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::Catch | TokenKind::Finally)
}

fn has_infix(kind: TokenKind) -> bool {
    use TokenKind as T;
    matches!(
        kind,
        T::Plus
            | T::PlusEq
            | T::Minus
            | T::MinusEq
            | T::Modulo
            | T::Slash
            | T::Pow
            | T::Eq
            | T::NotEq
            | T::IsSame
            | T::IsNotSame
            | T::Match
            | T::Lt
            | T::Lte
            | T::Gt
            | T::Gte
            | T::And
            | T::Or
            | T::OrEq
            | T::Comma
            | T::ResolutionOperator
            | T::Assign
            | T::Range
            | T::RangeExcl
            | T::Dot
            | T::LParen
            | T::LBracket
            | T::Colon
            | T::Asterisk
            | T::RightArrow
            | T::LeftArrow
            | T::Pipe
            | T::Catch
            | T::Finally
            | T::Ident
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ArgState {
    Normal,
    Optioned,
    RequiredKeyword,
    OptionalKeyword,
    Splat,
}

impl ArgState {
    fn name(self) -> &'static str {
        match self {
            ArgState::Normal => "Normal argument",
            ArgState::Optioned => "Optioned argument",
            ArgState::RequiredKeyword => "Keyword argument",
            ArgState::OptionalKeyword => "Optioned keyword argument",
            ArgState::Splat => "Splat argument",
        }
    }
}

pub struct Parser {
    lexer: Lexer,
    cur: Token,
    peek: Token,
    fsm: Fsm<ParseState>,
    mode: ParserMode,
    /// Cleared while parsing conditions so `{` opens the body, not a block.
    accept_block: bool,
}

/// Parses a whole source text.
pub fn parse_program(source: &str, mode: ParserMode) -> PResult<Program> {
    Parser::new(source, mode).parse_program()
}

impl Parser {
    pub fn new(source: &str, mode: ParserMode) -> Self {
        let fsm = Fsm::new(
            ParseState::Normal,
            &[
                (
                    ParseState::FuncCall,
                    &[ParseState::Normal, ParseState::Assignment],
                ),
                (
                    ParseState::MethodParam,
                    &[ParseState::Normal, ParseState::Assignment],
                ),
                (
                    ParseState::Assignment,
                    &[ParseState::Normal, ParseState::FuncCall],
                ),
                (
                    ParseState::Normal,
                    &[
                        ParseState::FuncCall,
                        ParseState::MethodParam,
                        ParseState::Assignment,
                    ],
                ),
            ],
        );
        let mut parser = Self {
            lexer: Lexer::new(source),
            cur: Token::default(),
            peek: Token::default(),
            fsm,
            mode,
            accept_block: true,
        };
        parser.next_token();
        parser.next_token();
        parser
    }

    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut program = Program::default();
        while !self.cur.is(TokenKind::Eof) {
            if let Some(statement) = self.parse_statement()? {
                program.statements.push(statement);
            }
            self.next_token();
        }

        match self.mode {
            ParserMode::Repl => {
                for statement in &mut program.statements {
                    if let StmtKind::Expression(expression) = &mut statement.kind {
                        expression.is_stmt = false;
                    }
                }
            }
            ParserMode::Test => {
                if let Some(Statement {
                    kind: StmtKind::Expression(expression),
                    ..
                }) = program.statements.last_mut()
                {
                    expression.is_stmt = false;
                }
            }
            ParserMode::Normal | ParserMode::CommandLine => {}
        }
        Ok(program)
    }

    fn next_token(&mut self) {
        let mut next = self.lexer.next_token();
        while next.is(TokenKind::Comment) {
            next = self.lexer.next_token();
        }
        self.cur = std::mem::replace(&mut self.peek, next);
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek.kind == kind
    }

    fn peek_at_same_line(&self) -> bool {
        self.cur.line == self.peek.line && !self.peek.is(TokenKind::Eof)
    }

    fn peek_precedence(&self) -> Precedence {
        Precedence::of(self.peek.kind)
    }

    fn cur_precedence(&self) -> Precedence {
        Precedence::of(self.cur.kind)
    }

    fn expect_peek(&mut self, kind: TokenKind) -> PResult<()> {
        if self.peek_is(kind) {
            self.next_token();
            Ok(())
        } else {
            Err(self.peek_error(kind))
        }
    }

    fn peek_error(&self, expected: TokenKind) -> ParseError {
        if self.peek.is(TokenKind::Eof) {
            ParseError::new(
                ParseErrorKind::UnexpectedEof,
                self.peek.line,
                format!(
                    "expected next token to be {expected}, got EOF(EOF) instead. Line: {}",
                    self.peek.line
                ),
            )
        } else {
            ParseError::new(
                ParseErrorKind::UnexpectedToken,
                self.peek.line,
                format!(
                    "expected next token to be {expected}, got {}({}) instead. Line: {}",
                    self.peek.kind, self.peek.literal, self.peek.line
                ),
            )
        }
    }

    fn cur_error(&self, expected: TokenKind) -> ParseError {
        let kind = if self.cur.is(TokenKind::Eof) {
            ParseErrorKind::UnexpectedEof
        } else {
            ParseErrorKind::UnexpectedToken
        };
        ParseError::new(
            kind,
            self.cur.line,
            format!(
                "expected next token to be {expected}, got {}({}) instead. Line: {}",
                self.cur.kind, self.cur.literal, self.cur.line
            ),
        )
    }

    fn no_prefix_error(&self) -> ParseError {
        let kind = match self.cur.kind {
            TokenKind::RBrace => ParseErrorKind::UnexpectedEnd,
            TokenKind::Eof if self.mode == ParserMode::Repl => ParseErrorKind::UnexpectedEof,
            _ => ParseErrorKind::UnexpectedToken,
        };
        ParseError::new(
            kind,
            self.cur.line,
            format!(
                "unexpected {}({}) Line: {}",
                self.cur.literal, self.cur.kind, self.cur.line
            ),
        )
    }

    fn type_parsing_error(&self, literal: &str, target: &str) -> ParseError {
        ParseError::new(
            ParseErrorKind::Syntax,
            self.cur.line,
            format!(
                "could not parse {} as {target}. Line: {}",
                quote(literal),
                self.cur.line
            ),
        )
    }

    fn expression(&self, kind: ExprKind) -> Expression {
        Expression::new(kind, self.cur.line)
    }

    // Statements

    fn parse_statement(&mut self) -> PResult<Option<Statement>> {
        let line = self.cur.line;
        let kind = match self.cur.kind {
            TokenKind::Return => self.parse_return()?,
            TokenKind::Def => self.parse_def()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::Class => self.parse_class()?,
            TokenKind::Module => self.parse_module()?,
            TokenKind::Continue => StmtKind::Continue,
            TokenKind::Break => StmtKind::Break,
            TokenKind::Semicolon | TokenKind::Comment => return Ok(None),
            _ => {
                // identifiers may start a multi-target assignment
                let precedence = match self.cur.kind {
                    TokenKind::Ident | TokenKind::InstanceVariable => Precedence::Lowest,
                    _ => Precedence::Normal,
                };
                let mut expression = self.parse_expression(precedence)?;
                expression.is_stmt = true;
                StmtKind::Expression(expression)
            }
        };
        Ok(Some(Statement { kind, line }))
    }

    fn parse_return(&mut self) -> PResult<StmtKind> {
        let ends_here = !self.peek_at_same_line()
            || self.peek_is(TokenKind::RBrace)
            || self.peek_is(TokenKind::Semicolon);
        if ends_here {
            return Ok(StmtKind::Return(self.expression(ExprKind::Nil)));
        }
        self.next_token();
        Ok(StmtKind::Return(self.parse_expression(Precedence::Normal)?))
    }

    fn parse_def(&mut self) -> PResult<StmtKind> {
        self.next_token();

        let receiver_form = self.peek_is(TokenKind::Dot)
            && matches!(
                self.cur.kind,
                TokenKind::Ident
                    | TokenKind::InstanceVariable
                    | TokenKind::Constant
                    | TokenKind::SelfKw
            );
        if !self.cur.is(TokenKind::Ident) && !receiver_form {
            return Err(ParseError::new(
                ParseErrorKind::MethodDefinition,
                self.cur.line,
                format!(
                    "Invalid method name: {}. Line: {}",
                    self.cur.literal, self.cur.line
                ),
            ));
        }

        let mut receiver = None;
        if self.peek_is(TokenKind::Dot) {
            let kind = match self.cur.kind {
                TokenKind::Ident => ExprKind::Identifier(self.cur.literal.clone()),
                TokenKind::InstanceVariable => {
                    ExprKind::InstanceVariable(self.cur.literal.clone())
                }
                TokenKind::Constant => ExprKind::Constant {
                    name: self.cur.literal.clone(),
                    is_namespace: false,
                },
                TokenKind::SelfKw => ExprKind::SelfRef { is_super: false },
                _ => {
                    return Err(ParseError::new(
                        ParseErrorKind::MethodDefinition,
                        self.cur.line,
                        format!(
                            "Invalid method receiver: {}. Line: {}",
                            self.cur.literal, self.cur.line
                        ),
                    ));
                }
            };
            receiver = Some(self.expression(kind));
            self.next_token();
            self.expect_peek(TokenKind::Ident)?;
        }

        let mut name = self.cur.literal.clone();
        if self.peek_is(TokenKind::Assign) {
            name.push('=');
            self.next_token();
        }

        if self.peek_is(TokenKind::Ident) && self.peek_at_same_line() {
            return Err(ParseError::new(
                ParseErrorKind::MethodDefinition,
                self.cur.line,
                format!(
                    "Please add parentheses around method \"{name}\"'s parameters. Line: {}",
                    self.cur.line
                ),
            ));
        }

        let mut parameters = Vec::new();
        if self.peek_is(TokenKind::LParen) && self.peek_at_same_line() {
            self.next_token();
            if !self.peek_is(TokenKind::RParen) {
                parameters = self.parse_parameters()?;
            }
            self.expect_peek(TokenKind::RParen)?;
        }

        self.expect_peek(TokenKind::LBrace)?;
        let mut body = self.parse_block_statement(&[TokenKind::RBrace])?;
        body.keep_last_value();

        Ok(StmtKind::Def {
            receiver,
            name,
            parameters,
            body,
        })
    }

    fn invalid_parameter(&self, literal: &str) -> ParseError {
        ParseError::new(
            ParseErrorKind::MethodDefinition,
            self.cur.line,
            format!("Invalid parameters: {literal}. Line: {}", self.cur.line),
        )
    }

    fn parse_parameters(&mut self) -> PResult<Vec<Expression>> {
        self.fsm.set(ParseState::MethodParam);
        let mut params = Vec::new();

        self.next_token();
        loop {
            if matches!(
                self.cur.kind,
                TokenKind::InstanceVariable | TokenKind::Constant
            ) {
                return Err(self.invalid_parameter(&self.cur.literal));
            }
            if self.cur.is(TokenKind::Asterisk) && !self.peek_is(TokenKind::Ident) {
                return Err(self.peek_error(TokenKind::Ident));
            }
            let param = self.parse_expression(Precedence::Normal)?;
            if parameter_name(&param).is_none() {
                return Err(self.invalid_parameter(&param.to_string()));
            }
            params.push(param);

            if !self.peek_is(TokenKind::Comma) {
                break;
            }
            self.next_token();
            self.next_token();
        }

        self.check_method_parameters(&params)?;
        self.fsm.set(ParseState::Normal);
        Ok(params)
    }

    fn argument_error(&self, former: ArgState, later: ArgState, literal: &str) -> ParseError {
        ParseError::new(
            ParseErrorKind::Argument,
            self.cur.line,
            format!(
                "{} \"{literal}\" should be defined before {}. Line: {}",
                former.name(),
                later.name(),
                self.cur.line
            ),
        )
    }

    /// Parameters must appear as normal, optioned, required keyword, optional
    /// keyword, then at most one splat, with no repeated names.
    fn check_method_parameters(&self, params: &[Expression]) -> PResult<()> {
        let mut state = ArgState::Normal;
        let mut seen: Vec<&str> = Vec::new();

        for param in params {
            let kind = parameter_kind(param);
            if kind == ArgState::Splat && state == ArgState::Splat {
                return Err(ParseError::new(
                    ParseErrorKind::Argument,
                    self.cur.line,
                    format!(
                        "Can't define splat argument more than once. Line: {}",
                        self.cur.line
                    ),
                ));
            }
            if kind < state {
                return Err(self.argument_error(kind, state, &parameter_literal(param)));
            }
            state = kind;

            let name = parameter_name(param).unwrap_or_default();
            if seen.contains(&name) {
                return Err(ParseError::new(
                    ParseErrorKind::Argument,
                    self.cur.line,
                    format!(
                        "Duplicate argument name: \"{name}\". Line: {}",
                        self.cur.line
                    ),
                ));
            }
            seen.push(name);
        }
        Ok(())
    }

    fn parse_class(&mut self) -> PResult<StmtKind> {
        self.expect_peek(TokenKind::Constant)?;
        let name = self.cur.literal.clone();

        let mut super_class = None;
        let mut super_class_name = None;
        if self.peek_is(TokenKind::Lt) {
            self.next_token();
            self.next_token();
            let expression = self.parse_expression(Precedence::Normal)?;
            super_class_name = match &expression.kind {
                ExprKind::Constant { name, .. } => Some(name.clone()),
                ExprKind::Infix { right, .. } => match &right.kind {
                    ExprKind::Constant { name, .. } => Some(name.clone()),
                    _ => None,
                },
                _ => None,
            };
            super_class = Some(expression);
        }

        self.expect_peek(TokenKind::LBrace)?;
        let body = self.parse_block_statement(&[TokenKind::RBrace])?;
        Ok(StmtKind::Class {
            name,
            super_class,
            super_class_name,
            body,
        })
    }

    fn parse_module(&mut self) -> PResult<StmtKind> {
        self.expect_peek(TokenKind::Constant)?;
        let name = self.cur.literal.clone();
        self.expect_peek(TokenKind::LBrace)?;
        let body = self.parse_block_statement(&[TokenKind::RBrace])?;
        Ok(StmtKind::Module { name, body })
    }

    fn parse_while(&mut self) -> PResult<StmtKind> {
        self.next_token();
        self.accept_block = false;
        let old = self.fsm.current();
        self.fsm.set(ParseState::FuncCall);

        let condition = self.parse_expression(Precedence::Normal)?;

        self.fsm.set(old);
        self.accept_block = true;

        self.expect_peek(TokenKind::LBrace)?;
        let body = self.parse_block_statement(&[TokenKind::RBrace])?;
        Ok(StmtKind::While { condition, body })
    }

    /// Parses statements until one of `end` is the current token. The current
    /// token on entry is the opener.
    fn parse_block_statement(&mut self, end: &[TokenKind]) -> PResult<BlockStatement> {
        let old = self.fsm.current();
        self.fsm.set(ParseState::Normal);
        let block = self.parse_block_body(end);
        self.fsm.set(old);
        block
    }

    fn parse_block_body(&mut self, end: &[TokenKind]) -> PResult<BlockStatement> {
        self.accept_block = true;
        if self.cur.is(TokenKind::RBrace) {
            return Err(ParseError::new(
                ParseErrorKind::Syntax,
                self.cur.line,
                format!(
                    "syntax error, unexpected '{}' Line: {}",
                    self.cur.literal, self.cur.line
                ),
            ));
        }

        let mut block = BlockStatement::new(self.cur.line);
        self.next_token();
        if self.cur.is(TokenKind::Semicolon) {
            self.next_token();
        }

        loop {
            if end.contains(&self.cur.kind) {
                return Ok(block);
            }
            if self.cur.is(TokenKind::Eof) {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedEof,
                    self.cur.line,
                    "Unexpected EOF",
                ));
            }
            if let Some(statement) = self.parse_statement()? {
                block.statements.push(statement);
            }
            self.next_token();
        }
    }

    // Expressions

    pub fn parse_expression(&mut self, precedence: Precedence) -> PResult<Expression> {
        let top_level = self.fsm.is(ParseState::Normal) || self.fsm.is(ParseState::Assignment);

        if self.cur.is(TokenKind::Constant) && top_level && self.peek_is(TokenKind::LParen) {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                self.peek.line,
                format!(
                    "cannot call {} with {}. Line: {}",
                    self.cur.kind, self.peek.kind, self.peek.line
                ),
            ));
        }

        let mut left = None;
        if self.cur.is(TokenKind::Ident)
            && top_level
            && is_argument_starter(self.peek.kind)
            && self.peek_at_same_line()
            && (!self.peek_is(TokenKind::LBrace) || self.accept_block)
        {
            let method = self.expression(ExprKind::Identifier(self.cur.literal.clone()));
            let call = self.parse_call_without_receiver(method)?;
            let chained = self.peek_at_same_line()
                && (is_keyword_operator(self.peek.kind) || self.peek_is(TokenKind::Dot));
            if !chained {
                return Ok(call);
            }
            left = Some(call);
        }

        let mut left = match left {
            Some(left) => left,
            None => self.parse_prefix()?,
        };

        while !self.cur.is(TokenKind::Semicolon)
            && !self.peek_is(TokenKind::Semicolon)
            && (precedence < self.peek_precedence()
                || self.is_parsing_assignment()
                || is_keyword_operator(self.peek.kind))
            && self.peek_at_same_line()
        {
            if !has_infix(self.peek.kind) {
                return Ok(left);
            }
            let previous = self.cur.clone();
            self.next_token();
            left = if self.is_parsing_float(&previous) {
                self.parse_float_fraction(&previous)?
            } else {
                self.parse_infix(left)?
            };
        }

        if self.peek_is(TokenKind::Semicolon) {
            self.next_token();
        }
        Ok(left)
    }

    fn is_parsing_assignment(&self) -> bool {
        self.fsm.is(ParseState::Assignment) && self.peek_is(TokenKind::Assign)
    }

    fn is_parsing_float(&self, previous: &Token) -> bool {
        self.cur.is(TokenKind::Dot)
            && previous.is(TokenKind::Int)
            && self.peek.is(TokenKind::Int)
            && previous.line == self.peek.line
    }

    fn parse_prefix(&mut self) -> PResult<Expression> {
        let literal = self.cur.literal.clone();
        let kind = match self.cur.kind {
            TokenKind::Ident => ExprKind::Identifier(literal),
            TokenKind::Constant => return self.parse_constant(),
            TokenKind::InstanceVariable => ExprKind::InstanceVariable(literal),
            TokenKind::Int => match literal.parse::<i64>() {
                Ok(value) => ExprKind::Integer(value),
                Err(_) => return Err(self.type_parsing_error(&literal, "integer")),
            },
            TokenKind::Float => match literal.parse::<f64>() {
                Ok(value) => ExprKind::Float(value),
                Err(_) => return Err(self.type_parsing_error(&literal, "float")),
            },
            TokenKind::String => ExprKind::String(literal),
            TokenKind::True => ExprKind::Boolean(true),
            TokenKind::False => ExprKind::Boolean(false),
            TokenKind::Nil => ExprKind::Nil,
            TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Asterisk
            | TokenKind::Bang
            | TokenKind::Amp
            | TokenKind::RightArrow
            | TokenKind::LeftArrow => return self.parse_prefix_operator(),
            TokenKind::LParen => return self.parse_grouped(),
            TokenKind::If => return self.parse_if(),
            TokenKind::Switch => return self.parse_switch(),
            TokenKind::SelfKw => ExprKind::SelfRef { is_super: false },
            TokenKind::Super => ExprKind::SelfRef { is_super: true },
            TokenKind::LBracket => return self.parse_array(),
            TokenKind::LBrace => return self.parse_hash(),
            TokenKind::Yield => return self.parse_yield(),
            TokenKind::GetBlock => ExprKind::GetBlock,
            TokenKind::HasBlock => ExprKind::HasBlock,
            _ => return Err(self.no_prefix_error()),
        };
        Ok(self.expression(kind))
    }

    fn parse_infix(&mut self, left: Expression) -> PResult<Expression> {
        use TokenKind as T;
        match self.cur.kind {
            T::PlusEq | T::MinusEq | T::OrEq | T::Assign => self.parse_assign(left),
            T::Comma => self.parse_multi_variables(left),
            T::Range | T::RangeExcl => self.parse_range(left),
            T::Dot => self.parse_call_with_receiver(left),
            T::LParen => self.parse_call_without_receiver(left),
            T::LBracket => self.parse_index(left),
            T::Colon => self.parse_argument_pair(left),
            T::Catch | T::Finally | T::Ident => self.parse_operator_method_call(left),
            _ => self.parse_infix_expression(left),
        }
    }

    fn parse_float_fraction(&mut self, integer: &Token) -> PResult<Expression> {
        self.next_token();
        let literal = format!("{}.{}", integer.literal, self.cur.literal);
        match literal.parse::<f64>() {
            Ok(value) => Ok(self.expression(ExprKind::Float(value))),
            Err(_) => Err(self.type_parsing_error(&literal, "float")),
        }
    }

    fn parse_constant(&mut self) -> PResult<Expression> {
        let is_namespace = self.peek_is(TokenKind::ResolutionOperator);
        let constant = self.expression(ExprKind::Constant {
            name: self.cur.literal.clone(),
            is_namespace,
        });
        if is_namespace {
            self.next_token();
            return self.parse_infix_expression(constant);
        }
        Ok(constant)
    }

    fn parse_prefix_operator(&mut self) -> PResult<Expression> {
        let line = self.cur.line;
        let operator = self.cur.literal.clone();
        let precedence = if self.cur.is(TokenKind::Bang) {
            Precedence::BangPrefix
        } else {
            Precedence::MinusPrefix
        };
        self.next_token();
        let right = self.parse_expression(precedence)?;
        Ok(Expression::new(
            ExprKind::Prefix {
                operator,
                right: Box::new(right),
            },
            line,
        ))
    }

    fn parse_infix_expression(&mut self, left: Expression) -> PResult<Expression> {
        let line = self.cur.line;
        let operator = self.cur.literal.clone();
        let mut precedence = self.cur_precedence();

        if self.cur.is(TokenKind::Asterisk) && self.peek_is(TokenKind::Asterisk) {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                self.peek.line,
                format!("unexpected * Line: {}", self.peek.line),
            ));
        }
        if operator == "||" || operator == "&&" {
            precedence = Precedence::Normal;
        }

        self.next_token();
        let right = self.parse_expression(precedence)?;
        Ok(Expression::new(
            ExprKind::Infix {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            line,
        ))
    }

    fn parse_grouped(&mut self) -> PResult<Expression> {
        self.next_token();
        let expression = self.parse_expression(Precedence::Normal)?;
        self.expect_peek(TokenKind::RParen)?;
        Ok(expression)
    }

    fn parse_array(&mut self) -> PResult<Expression> {
        let line = self.cur.line;
        let mut elements = Vec::new();
        if self.peek_is(TokenKind::RBracket) {
            self.next_token();
            return Ok(Expression::new(ExprKind::Array(elements), line));
        }

        self.next_token();
        elements.push(self.parse_expression(Precedence::Normal)?);
        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            elements.push(self.parse_expression(Precedence::Normal)?);
        }
        self.expect_peek(TokenKind::RBracket)?;
        Ok(Expression::new(ExprKind::Array(elements), line))
    }

    fn parse_hash(&mut self) -> PResult<Expression> {
        let line = self.cur.line;
        let mut pairs: Vec<(String, Expression)> = Vec::new();
        if self.peek_is(TokenKind::RBrace) {
            self.next_token();
            return Ok(Expression::new(ExprKind::Hash(pairs), line));
        }

        loop {
            self.next_token();
            let key = match self.cur.kind {
                TokenKind::Constant | TokenKind::Ident | TokenKind::String => {
                    self.cur.literal.clone()
                }
                _ => return Err(self.type_parsing_error(&self.cur.literal, "hash key")),
            };
            self.expect_peek(TokenKind::Colon)?;
            self.next_token();
            let value = self.parse_expression(Precedence::Normal)?;
            match pairs.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => pairs.push((key, value)),
            }

            if !self.peek_is(TokenKind::Comma) {
                break;
            }
            self.next_token();
        }

        self.expect_peek(TokenKind::RBrace)?;
        Ok(Expression::new(ExprKind::Hash(pairs), line))
    }

    fn parse_range(&mut self, start: Expression) -> PResult<Expression> {
        let line = self.cur.line;
        let exclusive = self.cur.is(TokenKind::RangeExcl);
        let precedence = self.cur_precedence();
        self.next_token();
        let end = self.parse_expression(precedence)?;
        Ok(Expression::new(
            ExprKind::Range {
                start: Box::new(start),
                end: Box::new(end),
                exclusive,
            },
            line,
        ))
    }

    fn parse_index(&mut self, receiver: Expression) -> PResult<Expression> {
        let line = self.cur.line;
        let mut call = CallExpression {
            receiver: Box::new(receiver),
            method: "[]".to_string(),
            arguments: Vec::new(),
            block: None,
            block_arguments: Vec::new(),
        };

        if self.peek_is(TokenKind::RBracket) {
            self.next_token();
            return Ok(Expression::new(ExprKind::Call(call), line));
        }

        self.next_token();
        call.arguments.push(self.parse_expression(Precedence::Normal)?);
        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            call.arguments.push(self.parse_expression(Precedence::Normal)?);
        }
        self.expect_peek(TokenKind::RBracket)?;

        if self.peek_is(TokenKind::Assign) {
            self.next_token();
            self.next_token();
            call.method = "[]=".to_string();
            call.arguments.push(self.parse_expression(Precedence::Normal)?);
        }
        Ok(Expression::new(ExprKind::Call(call), line))
    }

    fn parse_multi_variables(&mut self, left: Expression) -> PResult<Expression> {
        let line = left.line;
        if !left.is_variable() {
            return Err(self.no_prefix_error());
        }
        let mut variables = vec![left];

        loop {
            self.next_token();
            let variable = self.parse_expression(Precedence::Call)?;
            if !variable.is_variable() {
                return Err(self.no_prefix_error());
            }
            variables.push(variable);
            if !self.peek_is(TokenKind::Comma) {
                break;
            }
            self.next_token();
        }
        Ok(Expression::new(ExprKind::MultiVariable(variables), line))
    }

    fn parse_assign(&mut self, target: Expression) -> PResult<Expression> {
        let line = target.line;
        if let ExprKind::Call(call) = &target.kind {
            let mut call = call.clone();
            let value = self.expand_assignment_value(&target)?;
            if call.method == "[]" {
                call.arguments.truncate(1);
                call.method = "[]=".to_string();
            } else {
                call.method.push('=');
            }
            call.arguments.push(value);
            call.block = None;
            call.block_arguments.clear();
            return Ok(Expression::new(ExprKind::Call(call), line));
        }

        let variables = match target.kind {
            ExprKind::MultiVariable(variables) => variables,
            ExprKind::Identifier(_) | ExprKind::InstanceVariable(_) | ExprKind::Constant { .. } => {
                vec![target]
            }
            _ => {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidAssignment,
                    self.cur.line,
                    format!("Can't assign value to {target}. Line: {}", self.cur.line),
                ));
            }
        };

        let old = self.fsm.current();
        self.fsm.set(ParseState::Assignment);

        let value = if variables.len() == 1 {
            self.expand_assignment_value(&variables[0])?
        } else {
            let precedence = self.cur_precedence();
            self.next_token();
            self.parse_expression(precedence)?
        };

        self.fsm.set(old);
        Ok(Expression::new(
            ExprKind::Assign {
                variables,
                value: Box::new(value),
            },
            line,
        ))
    }

    /// Right-hand side of `=`, or the infix expansion of `+=`, `-=`, `||=`.
    fn expand_assignment_value(&mut self, target: &Expression) -> PResult<Expression> {
        let operator = match self.cur.kind {
            TokenKind::Assign => {
                let precedence = self.cur_precedence();
                self.next_token();
                return self.parse_expression(precedence);
            }
            TokenKind::PlusEq => "+",
            TokenKind::MinusEq => "-",
            TokenKind::OrEq => "||",
            kind => return Err(self.peek_error(kind)),
        };
        let line = self.cur.line;
        self.next_token();
        let right = self.parse_expression(Precedence::Lowest)?;
        Ok(Expression::new(
            ExprKind::Infix {
                left: Box::new(target.clone()),
                operator: operator.to_string(),
                right: Box::new(right),
            },
            line,
        ))
    }

    fn parse_argument_pair(&mut self, key: Expression) -> PResult<Expression> {
        let line = key.line;
        let Some(name) = key.identifier_name().map(str::to_string) else {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                self.cur.line,
                format!("unexpected {} Line: {}", self.cur.literal, self.cur.line),
            ));
        };

        let value = match self.fsm.current() {
            ParseState::MethodParam => {
                if self.peek_is(TokenKind::Comma) || self.peek_is(TokenKind::RParen) {
                    None
                } else {
                    self.next_token();
                    Some(self.parse_expression(Precedence::Normal)?)
                }
            }
            ParseState::FuncCall => {
                self.next_token();
                Some(self.parse_expression(Precedence::Normal)?)
            }
            _ => {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken,
                    self.cur.line,
                    format!("unexpected {} Line: {}", self.cur.literal, self.cur.line),
                ));
            }
        };
        Ok(Expression::new(
            ExprKind::ArgumentPair {
                key: name,
                value: value.map(Box::new),
            },
            line,
        ))
    }

    fn parse_yield(&mut self) -> PResult<Expression> {
        let line = self.cur.line;
        let mut arguments = Vec::new();
        if self.peek_is(TokenKind::LParen) && self.peek_at_same_line() {
            self.next_token();
            arguments = self.parse_call_arguments_with_parens()?;
        } else if is_argument_starter(self.peek.kind) && self.peek_at_same_line() {
            self.next_token();
            arguments = self.parse_call_arguments()?;
        }
        Ok(Expression::new(ExprKind::Yield(arguments), line))
    }

    // Calls

    fn new_call(receiver: Expression, method: String) -> CallExpression {
        CallExpression {
            receiver: Box::new(receiver),
            method,
            arguments: Vec::new(),
            block: None,
            block_arguments: Vec::new(),
        }
    }

    fn wants_block(&self) -> bool {
        self.peek_is(TokenKind::LBrace) && self.accept_block && self.peek_at_same_line()
    }

    /// `name(args)` or `name args` called on `self`. The current token is the
    /// name, or `(` when reached through the infix table.
    fn parse_call_without_receiver(&mut self, method: Expression) -> PResult<Expression> {
        let line = method.line;
        let ExprKind::Identifier(name) = method.kind else {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                self.cur.line,
                format!(
                    "unexpected {}({}) Line: {}",
                    self.cur.literal, self.cur.kind, self.cur.line
                ),
            ));
        };

        let old = self.fsm.current();
        self.fsm.set(ParseState::FuncCall);

        let receiver = Expression::new(ExprKind::SelfRef { is_super: false }, line);
        let mut call = Self::new_call(receiver, name);
        if self.cur.is(TokenKind::LParen) {
            call.arguments = self.parse_call_arguments_with_parens()?;
        } else if !self.wants_block()
            && is_argument_starter(self.peek.kind)
            && self.peek_at_same_line()
        {
            self.next_token();
            call.arguments = self.parse_call_arguments()?;
        }

        self.fsm.set(old);

        if self.wants_block() {
            self.parse_block_argument(&mut call)?;
        }
        Ok(Expression::new(ExprKind::Call(call), line))
    }

    fn parse_call_with_receiver(&mut self, receiver: Expression) -> PResult<Expression> {
        let old = self.fsm.current();
        self.fsm.set(ParseState::FuncCall);

        self.expect_peek(TokenKind::Ident)?;
        let line = self.cur.line;
        let mut call = Self::new_call(receiver, self.cur.literal.clone());

        if self.peek_at_same_line() {
            match self.peek.kind {
                TokenKind::LParen => {
                    self.next_token();
                    call.arguments = self.parse_call_arguments_with_parens()?;
                }
                TokenKind::Assign => {
                    call.method.push('=');
                    self.next_token();
                    self.next_token();
                    call.arguments = vec![self.parse_expression(Precedence::Normal)?];
                }
                TokenKind::LBrace => {}
                kind if is_argument_starter(kind) => {
                    self.next_token();
                    call.arguments = self.parse_call_arguments()?;
                }
                _ => {}
            }
        }

        self.fsm.set(old);

        if self.wants_block() {
            self.parse_block_argument(&mut call)?;
        }
        Ok(Expression::new(ExprKind::Call(call), line))
    }

    /// `recv catch(...) { }` style calls where the method name follows the
    /// receiver without a dot.
    fn parse_operator_method_call(&mut self, receiver: Expression) -> PResult<Expression> {
        let line = self.cur.line;
        let old = self.fsm.current();
        self.fsm.set(ParseState::FuncCall);

        let mut call = Self::new_call(receiver, self.cur.literal.clone());
        if self.peek_is(TokenKind::LParen) && self.peek_at_same_line() {
            self.next_token();
            call.arguments = self.parse_call_arguments_with_parens()?;
        } else if !self.wants_block()
            && is_argument_starter(self.peek.kind)
            && self.peek_at_same_line()
        {
            self.next_token();
            call.arguments = self.parse_call_arguments()?;
        }

        self.fsm.set(old);

        if self.wants_block() {
            self.parse_block_argument(&mut call)?;
        }
        Ok(Expression::new(ExprKind::Call(call), line))
    }

    fn parse_call_arguments_with_parens(&mut self) -> PResult<Vec<Expression>> {
        if self.peek_is(TokenKind::RParen) {
            self.next_token();
            return Ok(Vec::new());
        }
        self.next_token();
        let arguments = self.parse_call_arguments()?;
        self.expect_peek(TokenKind::RParen)?;
        Ok(arguments)
    }

    fn parse_call_arguments(&mut self) -> PResult<Vec<Expression>> {
        let mut arguments = Vec::new();
        if self.cur.is(TokenKind::Eof) {
            return Ok(arguments);
        }
        arguments.push(self.parse_expression(Precedence::Normal)?);
        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            arguments.push(self.parse_expression(Precedence::Normal)?);
        }
        Ok(arguments)
    }

    fn parse_block_argument(&mut self, call: &mut CallExpression) -> PResult<()> {
        self.next_token();

        if self.peek_is(TokenKind::Bar) {
            self.next_token();
            loop {
                self.expect_peek(TokenKind::Ident)?;
                call.block_arguments.push(self.cur.literal.clone());
                if !self.peek_is(TokenKind::Comma) {
                    break;
                }
                self.next_token();
            }
            self.expect_peek(TokenKind::Bar)?;
        }

        let mut block = self.parse_block_statement(&[TokenKind::RBrace])?;
        block.keep_last_value();
        call.block = Some(block);
        Ok(())
    }

    // Conditionals

    fn parse_if(&mut self) -> PResult<Expression> {
        let line = self.cur.line;
        let mut conditionals = vec![self.parse_conditional()?];

        if self.cur.is(TokenKind::RBrace) && self.peek_is(TokenKind::ElsIf) {
            self.next_token();
        }
        while self.cur.is(TokenKind::ElsIf) {
            conditionals.push(self.parse_conditional()?);
            if self.cur.is(TokenKind::RBrace) && self.peek_is(TokenKind::ElsIf) {
                self.next_token();
            }
        }

        if self.cur.is(TokenKind::RBrace) && self.peek_is(TokenKind::Else) {
            self.next_token();
        }
        let mut alternative = None;
        if self.cur.is(TokenKind::Else) {
            self.expect_peek(TokenKind::LBrace)?;
            let mut block = self.parse_block_statement(&[TokenKind::RBrace])?;
            block.keep_last_value();
            alternative = Some(block);
        }

        Ok(Expression::new(
            ExprKind::If {
                conditionals,
                alternative,
            },
            line,
        ))
    }

    fn parse_conditional(&mut self) -> PResult<Conditional> {
        let line = self.cur.line;
        self.next_token();
        self.accept_block = false;
        let condition = self.parse_expression(Precedence::Normal)?;
        self.accept_block = true;
        self.expect_peek(TokenKind::LBrace)?;
        let mut consequence = self.parse_block_statement(&[TokenKind::RBrace])?;
        consequence.keep_last_value();
        Ok(Conditional {
            condition,
            consequence,
            line,
        })
    }

    /// `switch subject { case a, b { } default { } }` becomes an `if` chain of
    /// `subject === a || subject === b` tests. Case bodies may also be written
    /// without braces, running until the next `case`, `default` or `}`.
    fn parse_switch(&mut self) -> PResult<Expression> {
        let line = self.cur.line;

        self.accept_block = false;
        let subject = if self.peek_is(TokenKind::LBrace) {
            self.expression(ExprKind::Boolean(true))
        } else {
            self.next_token();
            self.parse_expression(Precedence::Normal)?
        };
        self.expect_peek(TokenKind::LBrace)?;
        self.accept_block = true;
        self.expect_peek(TokenKind::Case)?;

        let mut conditionals = Vec::new();
        while self.cur.is(TokenKind::Case) {
            conditionals.push(self.parse_switch_conditional(&subject)?);
        }

        let mut alternative = None;
        if self.cur.is(TokenKind::Default) {
            let mut block = if self.peek_is(TokenKind::LBrace) {
                self.next_token();
                let block = self.parse_block_statement(&[TokenKind::RBrace])?;
                self.next_token();
                block
            } else {
                self.parse_block_statement(&[TokenKind::RBrace])?
            };
            block.keep_last_value();
            alternative = Some(block);
        }

        if !self.cur.is(TokenKind::RBrace) {
            return Err(self.cur_error(TokenKind::RBrace));
        }

        Ok(Expression::new(
            ExprKind::If {
                conditionals,
                alternative,
            },
            line,
        ))
    }

    fn parse_switch_conditional(&mut self, subject: &Expression) -> PResult<Conditional> {
        let line = self.cur.line;
        self.next_token();

        self.accept_block = false;
        let mut condition = self.case_test(subject)?;
        while self.peek_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            let right = self.case_test(subject)?;
            condition = Expression::new(
                ExprKind::Infix {
                    left: Box::new(condition),
                    operator: "||".to_string(),
                    right: Box::new(right),
                },
                line,
            );
        }
        self.accept_block = true;

        let mut consequence = if self.peek_is(TokenKind::LBrace) {
            self.next_token();
            let block = self.parse_block_statement(&[TokenKind::RBrace])?;
            self.next_token();
            block
        } else {
            self.parse_block_statement(&[TokenKind::Case, TokenKind::Default, TokenKind::RBrace])?
        };
        consequence.keep_last_value();

        Ok(Conditional {
            condition,
            consequence,
            line,
        })
    }

    fn case_test(&mut self, subject: &Expression) -> PResult<Expression> {
        let line = self.cur.line;
        let value = self.parse_expression(Precedence::Normal)?;
        Ok(Expression::new(
            ExprKind::Infix {
                left: Box::new(subject.clone()),
                operator: "===".to_string(),
                right: Box::new(value),
            },
            line,
        ))
    }
}

fn parameter_kind(param: &Expression) -> ArgState {
    match &param.kind {
        ExprKind::Assign { .. } => ArgState::Optioned,
        ExprKind::ArgumentPair { value: None, .. } => ArgState::RequiredKeyword,
        ExprKind::ArgumentPair { value: Some(_), .. } => ArgState::OptionalKeyword,
        ExprKind::Prefix { .. } => ArgState::Splat,
        _ => ArgState::Normal,
    }
}

/// Bound name of a parameter, or `None` when the form is not a parameter.
pub fn parameter_name(param: &Expression) -> Option<&str> {
    match &param.kind {
        ExprKind::Identifier(name) => Some(name),
        ExprKind::Assign { variables, .. } if variables.len() == 1 => {
            variables[0].identifier_name()
        }
        ExprKind::ArgumentPair { key, .. } => Some(key),
        ExprKind::Prefix { operator, right } if operator == "*" => right.identifier_name(),
        _ => None,
    }
}

fn parameter_literal(param: &Expression) -> String {
    match &param.kind {
        ExprKind::Assign { variables, value } if variables.len() == 1 => {
            format!("{} = {value}", variables[0])
        }
        ExprKind::ArgumentPair { key, value: None } => format!("{key}:"),
        ExprKind::ArgumentPair {
            key,
            value: Some(value),
        } => format!("{key}: {value}"),
        ExprKind::Prefix { operator, right } => format!("{operator}{right}"),
        _ => param.to_string(),
    }
}
