//! Hand-rolled cursor-based scanner.
//!
//! TC's grammar needs a couple of lookaheads a regex-automaton tokenizer
//! doesn't express cleanly (an identifier followed by `:` is a label; a `-`
//! followed by a digit is a negative number's sign, not a separate token),
//! so the scanner walks the byte stream directly instead.

use thiserror::Error;

use crate::token::{Token, TokenKind, TokenValue};

/// Reserved for a future stricter lexer; the current implementation never
/// rejects input — unrecognized bytes are silently skipped, matching the
/// source behavior this language was distilled from.
#[allow(dead_code)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("line {line}: malformed numeric literal '{text}'")]
    MalformedNumber { text: String, line: usize },
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Scans the full source and returns its tokens, always terminated by a
/// single trailing `Eof` token. Never fails: bytes it cannot classify are
/// simply skipped.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();

    loop {
        skip_inline_whitespace(&mut cursor);
        let Some(ch) = cursor.peek() else { break };
        let (line, col) = (cursor.line, cursor.col);

        match ch {
            b'\n' => {
                cursor.advance();
                tokens.push(Token::bare(TokenKind::Newline, line, col));
            }
            b';' => skip_comment(&mut cursor),
            b',' => {
                cursor.advance();
                tokens.push(Token::bare(TokenKind::Comma, line, col));
            }
            b'=' if cursor.peek_at(1) == Some(b'=') => {
                cursor.advance();
                cursor.advance();
                tokens.push(Token::bare(TokenKind::Eq, line, col));
            }
            b'!' if cursor.peek_at(1) == Some(b'=') => {
                cursor.advance();
                cursor.advance();
                tokens.push(Token::bare(TokenKind::Neq, line, col));
            }
            b'<' => {
                cursor.advance();
                if cursor.peek() == Some(b'=') {
                    cursor.advance();
                    tokens.push(Token::bare(TokenKind::Lte, line, col));
                } else {
                    tokens.push(Token::bare(TokenKind::Lt, line, col));
                }
            }
            b'>' => {
                cursor.advance();
                if cursor.peek() == Some(b'=') {
                    cursor.advance();
                    tokens.push(Token::bare(TokenKind::Gte, line, col));
                } else {
                    tokens.push(Token::bare(TokenKind::Gt, line, col));
                }
            }
            b'-' if cursor.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                tokens.push(read_number(&mut cursor, line, col));
            }
            b if b.is_ascii_digit() => {
                tokens.push(read_number(&mut cursor, line, col));
            }
            b if is_ident_start(b) => {
                tokens.push(read_word(&mut cursor, line, col));
            }
            _ => {
                cursor.advance();
            }
        }
    }

    tokens.push(Token::bare(TokenKind::Eof, cursor.line, cursor.col));
    tokens
}

fn skip_inline_whitespace(cursor: &mut Cursor<'_>) {
    while let Some(b) = cursor.peek() {
        if b == b' ' || b == b'\t' || b == b'\r' {
            cursor.advance();
        } else {
            break;
        }
    }
}

fn skip_comment(cursor: &mut Cursor<'_>) {
    while let Some(b) = cursor.peek() {
        if b == b'\n' {
            break;
        }
        cursor.advance();
    }
}

fn read_number(cursor: &mut Cursor<'_>, line: usize, col: usize) -> Token {
    let negative = cursor.peek() == Some(b'-');
    if negative {
        cursor.advance();
    }

    let (radix, prefix_len) = match (cursor.peek(), cursor.peek_at(1)) {
        (Some(b'0'), Some(b'x')) | (Some(b'0'), Some(b'X')) => (16, 2),
        (Some(b'0'), Some(b'b')) | (Some(b'0'), Some(b'B')) => (2, 2),
        _ => (10, 0),
    };
    for _ in 0..prefix_len {
        cursor.advance();
    }

    let digits_start = cursor.pos;
    while let Some(b) = cursor.peek() {
        let in_radix = match radix {
            16 => b.is_ascii_hexdigit(),
            2 => b == b'0' || b == b'1',
            _ => b.is_ascii_digit(),
        };
        if in_radix {
            cursor.advance();
        } else {
            break;
        }
    }

    let digits = std::str::from_utf8(&cursor.bytes[digits_start..cursor.pos]).unwrap_or("0");
    let magnitude = i64::from_str_radix(digits, radix).unwrap_or(0);
    let value = if negative { -magnitude } else { magnitude };
    Token::new(TokenKind::Number, TokenValue::Int(value), line, col)
}

fn read_word(cursor: &mut Cursor<'_>, line: usize, col: usize) -> Token {
    let start = cursor.pos;
    while let Some(b) = cursor.peek() {
        if is_ident_continue(b) {
            cursor.advance();
        } else {
            break;
        }
    }
    let text = std::str::from_utf8(&cursor.bytes[start..cursor.pos])
        .unwrap_or("")
        .to_string();

    if cursor.peek() == Some(b':') {
        cursor.advance();
        return Token::new(TokenKind::Label, TokenValue::Text(text), line, col);
    }

    if is_register_name(&text) {
        return Token::new(TokenKind::Register, TokenValue::Text(text), line, col);
    }

    if let Some(kind) = keyword_kind(&text.to_ascii_uppercase()) {
        return Token::new(kind, TokenValue::Text(text), line, col);
    }

    Token::new(TokenKind::Identifier, TokenValue::Text(text), line, col)
}

fn is_register_name(text: &str) -> bool {
    matches!(text, "R1" | "R2" | "R3" | "R4" | "R5" | "R6" | "R7" | "R8")
}

fn keyword_kind(upper: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match upper {
        "VAR" => Var,
        "LOAD" => Load,
        "SET" => Set,
        "MOVE" => Move,
        "ADD" => Add,
        "SUB" => Sub,
        "MUL" => Mul,
        "DIV" => Div,
        "AND" => And,
        "OR" => Or,
        "XOR" => Xor,
        "INC" => Inc,
        "DEC" => Dec,
        "NOT" => Not,
        "SHL" => Shl,
        "SHR" => Shr,
        "FUNC" => Func,
        "ENDFUNC" => EndFunc,
        "CALL" => Call,
        "RET" => Ret,
        "LOOP" => Loop,
        "ENDLOOP" => EndLoop,
        "WHILE" => While,
        "ENDWHILE" => EndWhile,
        "FOR" => For,
        "ENDFOR" => EndFor,
        "FROM" => From,
        "TO" => To,
        "STEP" => Step,
        "REPEAT" => Repeat,
        "UNTIL" => Until,
        "IF" => If,
        "ELSE" => Else,
        "ENDIF" => EndIf,
        "PUSH" => Push,
        "POP" => Pop,
        "PRINT" => Print,
        "INPUT" => Input,
        "HALT" => Halt,
        "NOP" => Nop,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_whitespace_and_comments() {
        let toks = tokenize("  ; a comment\nVAR x, 1\n");
        let ks: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            ks,
            vec![
                TokenKind::Newline,
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Comma,
                TokenKind::Number,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn recognizes_registers_by_exact_name_only() {
        let toks = tokenize("R1 R9 r1");
        let ks: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            ks,
            vec![
                TokenKind::Register,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let toks = tokenize("load Load LOAD");
        for t in toks.iter().take(3) {
            assert_eq!(t.kind, TokenKind::Load);
        }
    }

    #[test]
    fn labels_require_a_trailing_colon() {
        let toks = tokenize("start: JMP");
        assert_eq!(toks[0].kind, TokenKind::Label);
        assert_eq!(toks[0].value.as_text(), Some("start"));
    }

    #[test]
    fn decodes_hex_binary_and_negative_numbers() {
        let toks = tokenize("0x1A 0b1010 -7");
        let vals: Vec<_> = toks.iter().filter_map(|t| t.value.as_int()).collect();
        assert_eq!(vals, vec![26, 10, -7]);
    }

    #[test]
    fn scans_comparison_operators_with_longest_match() {
        let toks = tokenize("== != <= >= < >");
        let ks: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            ks,
            vec![
                TokenKind::Eq,
                TokenKind::Neq,
                TokenKind::Lte,
                TokenKind::Gte,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unknown_bytes_are_silently_skipped() {
        let toks = tokenize("VAR @@@ x");
        let ks: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            ks,
            vec![TokenKind::Var, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn always_terminates_with_eof() {
        let toks = tokenize("");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::Eof);
    }
}
