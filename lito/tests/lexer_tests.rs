mod common;

use common::{Lexer, TokenKind, lex_kinds};

#[test]
fn float_literals_need_digits_on_both_sides() {
    assert_eq!(lex_kinds("1.5"), vec![TokenKind::Float, TokenKind::Eof]);
    assert_eq!(
        lex_kinds("1.times"),
        vec![TokenKind::Int, TokenKind::Dot, TokenKind::Ident, TokenKind::Eof]
    );
    assert_eq!(
        lex_kinds("1..5"),
        vec![TokenKind::Int, TokenKind::Range, TokenKind::Int, TokenKind::Eof]
    );
    assert_eq!(
        lex_kinds("1...5"),
        vec![TokenKind::Int, TokenKind::RangeExcl, TokenKind::Int, TokenKind::Eof]
    );
}

#[test]
fn keywords_with_a_suffix_are_identifiers() {
    let tokens = Lexer::tokenize("nil? if");
    assert_eq!(tokens[0].kind, TokenKind::Ident);
    assert_eq!(tokens[0].literal, "nil?");
    assert_eq!(tokens[1].kind, TokenKind::If);

    let tokens = Lexer::tokenize("block! block?");
    assert_eq!(tokens[0].kind, TokenKind::GetBlock);
    assert_eq!(tokens[1].kind, TokenKind::HasBlock);
}

#[test]
fn keywords_after_a_dot_name_methods() {
    assert_eq!(
        lex_kinds("x.class"),
        vec![TokenKind::Ident, TokenKind::Dot, TokenKind::Ident, TokenKind::Eof]
    );
    assert_eq!(
        lex_kinds("err.catch"),
        vec![TokenKind::Ident, TokenKind::Dot, TokenKind::Ident, TokenKind::Eof]
    );
}

#[test]
fn colon_after_identifier_separates_and_otherwise_makes_a_symbol() {
    assert_eq!(
        lex_kinds("{ a: 1 }"),
        vec![
            TokenKind::LBrace,
            TokenKind::Ident,
            TokenKind::Colon,
            TokenKind::Int,
            TokenKind::RBrace,
            TokenKind::Eof
        ]
    );
    let tokens = Lexer::tokenize("send :name");
    assert_eq!(tokens[1].kind, TokenKind::String);
    assert_eq!(tokens[1].literal, "name");
    assert_eq!(
        lex_kinds("Foo::Bar"),
        vec![
            TokenKind::Constant,
            TokenKind::ResolutionOperator,
            TokenKind::Constant,
            TokenKind::Eof
        ]
    );
}

#[test]
fn multi_character_operators_take_the_longest_match() {
    assert_eq!(
        lex_kinds("a === b !== c ** d <- e -> f |> g ||= h"),
        vec![
            TokenKind::Ident,
            TokenKind::IsSame,
            TokenKind::Ident,
            TokenKind::IsNotSame,
            TokenKind::Ident,
            TokenKind::Pow,
            TokenKind::Ident,
            TokenKind::LeftArrow,
            TokenKind::Ident,
            TokenKind::RightArrow,
            TokenKind::Ident,
            TokenKind::Pipe,
            TokenKind::Ident,
            TokenKind::OrEq,
            TokenKind::Ident,
            TokenKind::Eof
        ]
    );
}

#[test]
fn strings_decode_escapes_and_track_lines() {
    let tokens = Lexer::tokenize("\"a\\tb\\x41\"\n'c'");
    assert_eq!(tokens[0].kind, TokenKind::String);
    assert_eq!(tokens[0].literal, "a\tbA");
    assert_eq!(tokens[0].line, 1);
    assert_eq!(tokens[1].literal, "c");
    assert_eq!(tokens[1].line, 2);
}

#[test]
fn comments_instance_variables_and_quoted_identifiers() {
    let tokens = Lexer::tokenize("# note\n@count `odd name`");
    assert_eq!(tokens[0].kind, TokenKind::Comment);
    assert_eq!(tokens[0].literal, "# note");
    assert_eq!(tokens[1].kind, TokenKind::InstanceVariable);
    assert_eq!(tokens[1].literal, "@count");
    assert_eq!(tokens[1].line, 2);
    assert_eq!(tokens[2].kind, TokenKind::Ident);
    assert_eq!(tokens[2].literal, "odd name");
}

#[test]
fn unknown_characters_are_illegal() {
    let tokens = Lexer::tokenize("$");
    assert_eq!(tokens[0].kind, TokenKind::Illegal);
    assert_eq!(tokens[0].literal, "$");
}
