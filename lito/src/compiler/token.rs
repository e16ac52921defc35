use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Illegal,
    Eof,

    Constant,
    Ident,
    InstanceVariable,
    Int,
    Float,
    String,
    Comment,

    Assign,
    Plus,
    PlusEq,
    Minus,
    MinusEq,
    Bang,
    Asterisk,
    Pow,
    Slash,
    Dot,
    And,
    Or,
    OrEq,
    Modulo,
    Amp,
    Match,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    NotEq,
    IsSame,
    IsNotSame,
    Range,
    RangeExcl,
    ResolutionOperator,
    RightArrow,
    LeftArrow,
    Pipe,

    Comma,
    Semicolon,
    Colon,
    Bar,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    True,
    False,
    Nil,
    If,
    ElsIf,
    Else,
    Default,
    Switch,
    Case,
    Return,
    Continue,
    Break,
    Def,
    SelfKw,
    Super,
    While,
    Yield,
    GetBlock,
    HasBlock,
    Class,
    Module,
    Catch,
    Finally,
}

impl TokenKind {
    /// Stable name used in parser diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Illegal => "ILLEGAL",
            TokenKind::Eof => "EOF",
            TokenKind::Constant => "CONSTANT",
            TokenKind::Ident => "IDENT",
            TokenKind::InstanceVariable => "INSTANCE_VAR",
            TokenKind::Int => "INT",
            TokenKind::Float => "FLOAT",
            TokenKind::String => "STRING",
            TokenKind::Comment => "COMMENT",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::PlusEq => "+=",
            TokenKind::Minus => "-",
            TokenKind::MinusEq => "-=",
            TokenKind::Bang => "!",
            TokenKind::Asterisk => "*",
            TokenKind::Pow => "**",
            TokenKind::Slash => "/",
            TokenKind::Dot => ".",
            TokenKind::And => "&&",
            TokenKind::Or => "||",
            TokenKind::OrEq => "||=",
            TokenKind::Modulo => "%",
            TokenKind::Amp => "&",
            TokenKind::Match => "=~",
            TokenKind::Lt => "<",
            TokenKind::Lte => "<=",
            TokenKind::Gt => ">",
            TokenKind::Gte => ">=",
            TokenKind::Eq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::IsSame => "===",
            TokenKind::IsNotSame => "!==",
            TokenKind::Range => "..",
            TokenKind::RangeExcl => "...",
            TokenKind::ResolutionOperator => "::",
            TokenKind::RightArrow => "->",
            TokenKind::LeftArrow => "<-",
            TokenKind::Pipe => "|>",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Bar => "|",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::True => "TRUE",
            TokenKind::False => "FALSE",
            TokenKind::Nil => "NIL",
            TokenKind::If => "IF",
            TokenKind::ElsIf => "ELSIF",
            TokenKind::Else => "ELSE",
            TokenKind::Default => "DEFAULT",
            TokenKind::Switch => "SWITCH",
            TokenKind::Case => "CASE",
            TokenKind::Return => "RETURN",
            TokenKind::Continue => "CONTINUE",
            TokenKind::Break => "BREAK",
            TokenKind::Def => "DEF",
            TokenKind::SelfKw => "SELF",
            TokenKind::Super => "SUPER",
            TokenKind::While => "WHILE",
            TokenKind::Yield => "YIELD",
            TokenKind::GetBlock => "BLOCK",
            TokenKind::HasBlock => "HASBLOCK",
            TokenKind::Class => "CLASS",
            TokenKind::Module => "MODULE",
            TokenKind::Catch => "CATCH",
            TokenKind::Finally => "FINALLY",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("def", TokenKind::Def),
    ("true", TokenKind::True),
    ("false", TokenKind::False),
    ("nil", TokenKind::Nil),
    ("if", TokenKind::If),
    ("elsif", TokenKind::ElsIf),
    ("else", TokenKind::Else),
    ("switch", TokenKind::Switch),
    ("case", TokenKind::Case),
    ("default", TokenKind::Default),
    ("return", TokenKind::Return),
    ("self", TokenKind::SelfKw),
    ("super", TokenKind::Super),
    ("while", TokenKind::While),
    ("yield", TokenKind::Yield),
    ("continue", TokenKind::Continue),
    ("class", TokenKind::Class),
    ("module", TokenKind::Module),
    ("break", TokenKind::Break),
    ("block!", TokenKind::GetBlock),
    ("block?", TokenKind::HasBlock),
    ("catch", TokenKind::Catch),
    ("finally", TokenKind::Finally),
];

const OPERATORS: &[(&str, TokenKind)] = &[
    ("=", TokenKind::Assign),
    ("+", TokenKind::Plus),
    ("+=", TokenKind::PlusEq),
    ("-", TokenKind::Minus),
    ("-=", TokenKind::MinusEq),
    ("!", TokenKind::Bang),
    ("*", TokenKind::Asterisk),
    ("**", TokenKind::Pow),
    ("/", TokenKind::Slash),
    (".", TokenKind::Dot),
    ("&&", TokenKind::And),
    ("||", TokenKind::Or),
    ("||=", TokenKind::OrEq),
    ("%", TokenKind::Modulo),
    ("&", TokenKind::Amp),
    ("=~", TokenKind::Match),
    ("<", TokenKind::Lt),
    ("<=", TokenKind::Lte),
    (">", TokenKind::Gt),
    (">=", TokenKind::Gte),
    ("==", TokenKind::Eq),
    ("!=", TokenKind::NotEq),
    ("===", TokenKind::IsSame),
    ("!==", TokenKind::IsNotSame),
    ("..", TokenKind::Range),
    ("...", TokenKind::RangeExcl),
    ("::", TokenKind::ResolutionOperator),
    ("->", TokenKind::RightArrow),
    ("<-", TokenKind::LeftArrow),
    ("|>", TokenKind::Pipe),
];

const SEPARATORS: &[(&str, TokenKind)] = &[
    (",", TokenKind::Comma),
    (";", TokenKind::Semicolon),
    (":", TokenKind::Colon),
    ("|", TokenKind::Bar),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
];

fn lookup(table: &[(&str, TokenKind)], literal: &str) -> TokenKind {
    table
        .iter()
        .find(|(name, _)| *name == literal)
        .map(|(_, kind)| *kind)
        .unwrap_or(TokenKind::Ident)
}

/// Keyword for `ident`, or `Ident` when it is not reserved.
pub fn lookup_ident(ident: &str) -> TokenKind {
    lookup(KEYWORDS, ident)
}

pub fn is_keyword(ident: &str) -> bool {
    lookup_ident(ident) != TokenKind::Ident
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            literal: literal.into(),
            line,
        }
    }

    pub fn operator(literal: &str, line: usize) -> Self {
        Self::new(lookup(OPERATORS, literal), literal, line)
    }

    pub fn separator(literal: &str, line: usize) -> Self {
        Self::new(lookup(SEPARATORS, literal), literal, line)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new(TokenKind::Eof, "", 0)
    }
}
