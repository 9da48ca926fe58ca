//! Recursive-descent parser: tokens to a `Program`, single-token lookahead,
//! no backtracking.

use thiserror::Error;

use crate::ast::*;
use crate::token::{Token, TokenKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
    },
    #[error("line {line}: '{found}' does not start a statement")]
    UnknownStatement { found: String, line: usize },
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn parse(tokens: Vec<Token>) -> Result<Program, ParseError> {
        let mut parser = Parser { tokens, pos: 0 };
        let mut statements = Vec::new();
        parser.skip_newlines();
        while parser.current().kind != TokenKind::Eof {
            statements.push(parser.parse_statement()?);
            parser.skip_newlines();
        }
        Ok(Program { statements })
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn skip_newlines(&mut self) {
        while self.current().kind == TokenKind::Newline {
            self.advance();
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.current().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.current().kind.to_string(),
            line: self.current().line,
        }
    }

    fn expect_register(&mut self) -> Result<String, ParseError> {
        let tok = self.expect(TokenKind::Register)?;
        Ok(tok.value.as_text().unwrap_or_default().to_string())
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        let tok = self.expect(TokenKind::Identifier)?;
        Ok(tok.value.as_text().unwrap_or_default().to_string())
    }

    fn expect_number(&mut self) -> Result<i64, ParseError> {
        let tok = self.expect(TokenKind::Number)?;
        Ok(tok.value.as_int().unwrap_or(0))
    }

    fn expect_comma(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::Comma)?;
        Ok(())
    }

    fn expect_label_name(&mut self) -> Result<String, ParseError> {
        let tok = self.expect(TokenKind::Label)?;
        Ok(tok.value.as_text().unwrap_or_default().to_string())
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        match self.current().kind {
            TokenKind::Register => Ok(Operand::Register(self.expect_register()?)),
            TokenKind::Identifier => Ok(Operand::Identifier(self.expect_identifier()?)),
            TokenKind::Number => Ok(Operand::Immediate(self.expect_number()?)),
            _ => Err(self.unexpected("register, identifier or number")),
        }
    }

    fn parse_reg_or_imm(&mut self) -> Result<RegOrImm, ParseError> {
        match self.current().kind {
            TokenKind::Register => Ok(RegOrImm::Register(self.expect_register()?)),
            TokenKind::Number => Ok(RegOrImm::Immediate(self.expect_number()?)),
            _ => Err(self.unexpected("register or number")),
        }
    }

    fn parse_reg_or_ident(&mut self) -> Result<RegOrIdent, ParseError> {
        match self.current().kind {
            TokenKind::Register => Ok(RegOrIdent::Register(self.expect_register()?)),
            TokenKind::Identifier => Ok(RegOrIdent::Identifier(self.expect_identifier()?)),
            _ => Err(self.unexpected("register or identifier")),
        }
    }

    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        let left = self.parse_operand()?;
        let op = match self.current().kind {
            TokenKind::Eq => CmpOp::Eq,
            TokenKind::Neq => CmpOp::Neq,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Gte => CmpOp::Gte,
            TokenKind::Lte => CmpOp::Lte,
            _ => return Err(self.unexpected("a comparison operator")),
        };
        self.advance();
        let right = self.parse_operand()?;
        Ok(Condition { left, op, right })
    }

    /// Parses statements until the current token matches one of `terminators`,
    /// which are left unconsumed for the caller.
    fn parse_block(&mut self, terminators: &[TokenKind]) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        self.skip_newlines();
        while !terminators.contains(&self.current().kind) {
            if self.current().kind == TokenKind::Eof {
                return Err(self.unexpected(&format!("{:?}", terminators)));
            }
            body.push(self.parse_statement()?);
            self.skip_newlines();
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.current().kind {
            TokenKind::Var => self.parse_var_decl(),
            TokenKind::Load => self.parse_load(),
            TokenKind::Set => self.parse_set(),
            TokenKind::Move => self.parse_move(),
            TokenKind::Add
            | TokenKind::Sub
            | TokenKind::Mul
            | TokenKind::Div
            | TokenKind::And
            | TokenKind::Or
            | TokenKind::Xor => self.parse_binary_op(),
            TokenKind::Inc | TokenKind::Dec => self.parse_unary_op(),
            TokenKind::Not => self.parse_not(),
            TokenKind::Shl | TokenKind::Shr => self.parse_shift_op(),
            TokenKind::Func => self.parse_function(),
            TokenKind::Call => self.parse_call(),
            TokenKind::Ret => self.parse_return(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Loop => self.parse_loop(),
            TokenKind::Repeat => self.parse_repeat(),
            TokenKind::Push => self.parse_push(),
            TokenKind::Pop => self.parse_pop(),
            TokenKind::Print => self.parse_print(),
            TokenKind::Input => self.parse_input(),
            TokenKind::Halt => {
                self.advance();
                Ok(Stmt::Halt)
            }
            TokenKind::Nop => {
                self.advance();
                Ok(Stmt::Nop)
            }
            TokenKind::Label => {
                let name = self.expect_label_name()?;
                Ok(Stmt::Label(name))
            }
            _ => Err(ParseError::UnknownStatement {
                found: self.current().kind.to_string(),
                line: self.current().line,
            }),
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let name = self.expect_identifier()?;
        let init = if self.current().kind == TokenKind::Comma {
            self.advance();
            Some(self.expect_number()?)
        } else {
            None
        };
        Ok(Stmt::VarDecl(VarDecl { name, init }))
    }

    fn parse_load(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let dest = self.expect_register()?;
        self.expect_comma()?;
        let src = self.parse_operand()?;
        Ok(Stmt::Load(Load { dest, src }))
    }

    fn parse_set(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let dest = self.expect_identifier()?;
        self.expect_comma()?;
        let src = self.parse_reg_or_imm()?;
        Ok(Stmt::Set(Set { dest, src }))
    }

    fn parse_move(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let dest = self.expect_register()?;
        self.expect_comma()?;
        let src = self.expect_register()?;
        Ok(Stmt::Move(Move { dest, src }))
    }

    fn parse_binary_op(&mut self) -> Result<Stmt, ParseError> {
        let op = match self.advance().kind {
            TokenKind::Add => BinOp::Add,
            TokenKind::Sub => BinOp::Sub,
            TokenKind::Mul => BinOp::Mul,
            TokenKind::Div => BinOp::Div,
            TokenKind::And => BinOp::And,
            TokenKind::Or => BinOp::Or,
            TokenKind::Xor => BinOp::Xor,
            _ => unreachable!("dispatch guarantees a binary operator token"),
        };
        let dest = self.expect_register()?;
        self.expect_comma()?;
        let left = self.expect_register()?;
        self.expect_comma()?;
        let right = self.parse_reg_or_imm()?;
        Ok(Stmt::BinaryOp(BinaryOp {
            op,
            dest,
            left,
            right,
        }))
    }

    fn parse_unary_op(&mut self) -> Result<Stmt, ParseError> {
        let op = match self.advance().kind {
            TokenKind::Inc => UnOp::Inc,
            TokenKind::Dec => UnOp::Dec,
            _ => unreachable!("dispatch guarantees INC or DEC"),
        };
        let operand = self.parse_reg_or_ident()?;
        Ok(Stmt::UnaryOp(UnaryOp { op, operand }))
    }

    fn parse_not(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let reg = self.expect_register()?;
        Ok(Stmt::UnaryOp(UnaryOp {
            op: UnOp::Not,
            operand: RegOrIdent::Register(reg),
        }))
    }

    fn parse_shift_op(&mut self) -> Result<Stmt, ParseError> {
        let op = match self.advance().kind {
            TokenKind::Shl => ShiftKind::Shl,
            TokenKind::Shr => ShiftKind::Shr,
            _ => unreachable!("dispatch guarantees SHL or SHR"),
        };
        let dest = self.expect_register()?;
        self.expect_comma()?;
        let src = self.expect_register()?;
        self.expect_comma()?;
        let count = self.expect_number()?;
        Ok(Stmt::ShiftOp(ShiftOp {
            op,
            dest,
            src,
            count,
        }))
    }

    fn parse_function(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let name = self.expect_identifier()?;
        let body = self.parse_block(&[TokenKind::EndFunc])?;
        self.expect(TokenKind::EndFunc)?;
        Ok(Stmt::Function(Function { name, body }))
    }

    fn parse_call(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let name = self.expect_identifier()?;
        Ok(Stmt::Call(Call { name }))
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let value = if self.current().kind == TokenKind::Register {
            Some(self.expect_register()?)
        } else {
            None
        };
        Ok(Stmt::Return(Return { value }))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let cond = self.parse_condition()?;
        let then_body = self.parse_block(&[TokenKind::Else, TokenKind::EndIf])?;
        let else_body = if self.current().kind == TokenKind::Else {
            self.advance();
            Some(self.parse_block(&[TokenKind::EndIf])?)
        } else {
            None
        };
        self.expect(TokenKind::EndIf)?;
        Ok(Stmt::If(If {
            cond,
            then_body,
            else_body,
        }))
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let cond = self.parse_condition()?;
        let body = self.parse_block(&[TokenKind::EndWhile])?;
        self.expect(TokenKind::EndWhile)?;
        Ok(Stmt::While(While { cond, body }))
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let var = self.expect_identifier()?;
        self.expect(TokenKind::From)?;
        let start = self.expect_number()?;
        self.expect(TokenKind::To)?;
        let end = self.expect_number()?;
        let step = if self.current().kind == TokenKind::Step {
            self.advance();
            self.expect_number()?
        } else {
            1
        };
        let body = self.parse_block(&[TokenKind::EndFor])?;
        self.expect(TokenKind::EndFor)?;
        Ok(Stmt::For(For {
            var,
            start,
            end,
            step,
            body,
        }))
    }

    fn parse_loop(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let var = self.expect_identifier()?;
        self.expect_comma()?;
        let limit = self.expect_number()?;
        let body = self.parse_block(&[TokenKind::EndLoop])?;
        self.expect(TokenKind::EndLoop)?;
        Ok(Stmt::Loop(Loop { var, limit, body }))
    }

    fn parse_repeat(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let body = self.parse_block(&[TokenKind::Until])?;
        self.expect(TokenKind::Until)?;
        let cond = self.parse_condition()?;
        Ok(Stmt::Repeat(Repeat { body, cond }))
    }

    fn parse_push(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let reg = self.expect_register()?;
        Ok(Stmt::Push(Push { reg }))
    }

    fn parse_pop(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let reg = self.expect_register()?;
        Ok(Stmt::Pop(Pop { reg }))
    }

    fn parse_print(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let value = self.parse_operand()?;
        Ok(Stmt::Print(Print { value }))
    }

    fn parse_input(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let dest = self.parse_reg_or_ident()?;
        Ok(Stmt::Input(Input { dest }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(src: &str) -> Program {
        Parser::parse(tokenize(src)).expect("should parse")
    }

    #[test]
    fn parses_var_decl_with_and_without_initializer() {
        let p = parse("VAR x, 5\nVAR y\n");
        assert_eq!(
            p.statements,
            vec![
                Stmt::VarDecl(VarDecl {
                    name: "x".into(),
                    init: Some(5)
                }),
                Stmt::VarDecl(VarDecl {
                    name: "y".into(),
                    init: None
                }),
            ]
        );
    }

    #[test]
    fn parses_if_else_endif() {
        let p = parse("IF R1 == 0\nHALT\nELSE\nNOP\nENDIF\n");
        match &p.statements[0] {
            Stmt::If(s) => {
                assert_eq!(s.then_body, vec![Stmt::Halt]);
                assert_eq!(s.else_body, Some(vec![Stmt::Nop]));
            }
            other => panic!("expected If, got {:?}", other),
        }
    }

    #[test]
    fn parses_for_with_default_and_explicit_step() {
        let p = parse("FOR i FROM 1 TO 3\nNOP\nENDFOR\nFOR j FROM 0 TO 10 STEP 2\nNOP\nENDFOR\n");
        match (&p.statements[0], &p.statements[1]) {
            (Stmt::For(a), Stmt::For(b)) => {
                assert_eq!(a.step, 1);
                assert_eq!(b.step, 2);
            }
            other => panic!("expected two For statements, got {:?}", other),
        }
    }

    #[test]
    fn parses_nested_function_and_hoists_it_syntactically() {
        let p = parse("FUNC outer\nFUNC inner\nRET\nENDFUNC\nRET\nENDFUNC\n");
        match &p.statements[0] {
            Stmt::Function(f) => {
                assert_eq!(f.name, "outer");
                assert!(matches!(f.body[0], Stmt::Function(_)));
            }
            other => panic!("expected Function, got {:?}", other),
        }
    }

    #[test]
    fn reports_line_number_on_unexpected_token() {
        let err = Parser::parse(tokenize("VAR\nLOAD R1, R1\n")).unwrap_err();
        match err {
            ParseError::UnexpectedToken { line, .. } => assert_eq!(line, 1),
            other => panic!("expected UnexpectedToken, got {:?}", other),
        }
    }

    #[test]
    fn repeat_until_parses_body_then_condition() {
        let p = parse("REPEAT\nINC R1\nUNTIL R1 == 5\n");
        match &p.statements[0] {
            Stmt::Repeat(r) => {
                assert_eq!(r.body.len(), 1);
                assert_eq!(r.cond.op, CmpOp::Eq);
            }
            other => panic!("expected Repeat, got {:?}", other),
        }
    }
}
