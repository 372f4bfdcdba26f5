//! Hand-rolled recursive-descent parser producing the program AST.
//!
//! Grammar:
//!   program      := functionItem*
//!   functionItem := 'func' IDENT '(' (IDENT (',' IDENT)*)? ')' ( ';' | block )
//!   block        := '{' statement* '}'
//!   statement    := IDENT '<-' expr ';'
//!                 | 'if' expr block ('else' block)?
//!                 | (IDENT ':')? 'while' expr block
//!                 | ('break' | 'continue') IDENT? ';'
//!                 | expr ';'
//!   expr         := add (('==' | '!=') add)*
//!   add          := primary ('+' primary)*
//!   primary      := INT | IDENT ('(' (expr (',' expr)*)? ')')? | '(' expr ')'
//!
//! A parenthesized `while` condition is just a parenthesized expression, so
//! `while (c) {..}` and `while c {..}` produce the same tree.

use tracing::debug;

use crate::ast::{BinaryOp, Expr, ExternDecl, FunctionDef, FunctionItem, Program, Stmt};
use crate::error::{CompileError, CompileResult, Pos};
use crate::lexer::{tokenize, Token, TokenKind};

/// Entry point for turning source code into an AST.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Parse a complete program from raw source text.
    pub fn parse(src: &str) -> CompileResult<Program> {
        let tokens = tokenize(src)?;
        debug!(tokens = tokens.len(), "lexed source");
        Self::from_tokens(tokens)?.program()
    }

    /// Build a parser over an already lexed stream. The stream must end
    /// with an `Eof` token.
    pub fn from_tokens(tokens: Vec<Token>) -> CompileResult<Self> {
        match tokens.last() {
            Some(last) if last.kind == TokenKind::Eof => Ok(Self { tokens, pos: 0 }),
            _ => Err(CompileError::parse(
                Default::default(),
                "token stream terminated by end of input",
                "unterminated stream",
            )),
        }
    }

    pub fn program(mut self) -> CompileResult<Program> {
        let mut items = Vec::new();
        while !self.check(TokenKind::Eof) {
            items.push(self.function_item()?);
        }
        debug!(items = items.len(), "parsed program");
        Ok(Program { items })
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + ahead).min(last)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let found = self.peek();
        CompileError::parse(found.pos, expected, found.to_string())
    }

    // ---- items ----

    fn function_item(&mut self) -> CompileResult<FunctionItem> {
        let func = self.expect(TokenKind::Func)?;
        let name = self.expect(TokenKind::Ident)?.text;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                params.push(self.expect(TokenKind::Ident)?.text);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        if self.eat(TokenKind::Semi) {
            return Ok(FunctionItem::Extern(ExternDecl {
                name,
                params,
                pos: func.pos,
            }));
        }
        if !self.check(TokenKind::LBrace) {
            return Err(self.unexpected("`;` or function body"));
        }
        let body = self.block()?;
        Ok(FunctionItem::Def(FunctionDef {
            name,
            params,
            body,
            pos: func.pos,
        }))
    }

    fn block(&mut self) -> CompileResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.check(TokenKind::Eof) {
                return Err(self.unexpected(TokenKind::RBrace.describe()));
            }
            stmts.push(self.statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    // ---- statements ----

    fn statement(&mut self) -> CompileResult<Stmt> {
        match self.peek().kind {
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(None),
            TokenKind::Break => {
                let (label, pos) = self.jump_stmt()?;
                Ok(Stmt::Break { label, pos })
            }
            TokenKind::Continue => {
                let (label, pos) = self.jump_stmt()?;
                Ok(Stmt::Continue { label, pos })
            }
            TokenKind::Ident if self.peek_at(1).kind == TokenKind::Arrow => {
                let target = self.advance();
                self.advance();
                let value = self.expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Assign {
                    target: target.text,
                    value,
                    pos: target.pos,
                })
            }
            TokenKind::Ident if self.peek_at(1).kind == TokenKind::Colon => {
                let label = self.advance();
                self.advance();
                if !self.check(TokenKind::While) {
                    return Err(self.unexpected("`while` after loop label"));
                }
                self.while_stmt(Some(label))
            }
            _ => {
                let expr = self.expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn if_stmt(&mut self) -> CompileResult<Stmt> {
        self.expect(TokenKind::If)?;
        let cond = self.expr()?;
        let then_body = self.block()?;
        let else_body = if self.eat(TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn while_stmt(&mut self, label: Option<Token>) -> CompileResult<Stmt> {
        let keyword = self.expect(TokenKind::While)?;
        let pos = label.as_ref().map_or(keyword.pos, |l| l.pos);
        let cond = self.expr()?;
        let body = self.block()?;
        Ok(Stmt::While {
            label: label.map(|l| l.text),
            cond,
            body,
            pos,
        })
    }

    /// Shared tail of `break` and `continue`: optional label, then `;`.
    fn jump_stmt(&mut self) -> CompileResult<(Option<String>, Pos)> {
        let keyword = self.advance();
        let label = if self.check(TokenKind::Ident) {
            Some(self.advance().text)
        } else {
            None
        };
        self.expect(TokenKind::Semi)?;
        Ok((label, keyword.pos))
    }

    // ---- expressions ----

    fn expr(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.add()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            let rhs = self.add()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn add(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.primary()?;
        while self.eat(TokenKind::Plus) {
            let rhs = self.primary()?;
            lhs = Expr::binary(BinaryOp::Add, lhs, rhs);
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> CompileResult<Expr> {
        match self.peek().kind {
            TokenKind::Int => {
                let token = self.advance();
                let value = token
                    .int_value()
                    .ok_or_else(|| CompileError::parse(token.pos, "integer literal", token.to_string()))?;
                Ok(Expr::Int(value))
            }
            TokenKind::Ident => {
                let token = self.advance();
                if !self.eat(TokenKind::LParen) {
                    return Ok(Expr::Var {
                        name: token.text,
                        pos: token.pos,
                    });
                }
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Call {
                    callee: token.text,
                    args,
                    pos: token.pos,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            _ => Err(self.unexpected("expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        Parser::parse(src).expect("program should parse")
    }

    fn main_body(src: &str) -> Vec<Stmt> {
        let program = parse(src);
        program
            .items
            .into_iter()
            .find_map(|item| match item {
                FunctionItem::Def(def) if def.name == "main" => Some(def.body),
                _ => None,
            })
            .expect("main should be defined")
    }

    fn var(name: &str, line: usize, column: usize) -> Expr {
        Expr::Var {
            name: name.to_string(),
            pos: Pos::new(line, column),
        }
    }

    #[test]
    fn extern_and_definition_items() {
        let program = parse("func print_int(x);\nfunc main() { print_int(1); }");
        assert_eq!(program.items.len(), 2);
        match &program.items[0] {
            FunctionItem::Extern(decl) => {
                assert_eq!(decl.name, "print_int");
                assert_eq!(decl.params, vec!["x".to_string()]);
            }
            other => panic!("expected extern, got {other:?}"),
        }
        match &program.items[1] {
            FunctionItem::Def(def) => {
                assert_eq!(def.name, "main");
                assert!(def.params.is_empty());
                assert_eq!(def.body.len(), 1);
            }
            other => panic!("expected definition, got {other:?}"),
        }
    }

    #[test]
    fn multiple_parameters() {
        let program = parse("func f(a, b, c);");
        assert_eq!(program.items[0].params(), ["a", "b", "c"]);
    }

    #[test]
    fn empty_source_is_an_empty_program() {
        assert_eq!(parse(""), Program::default());
    }

    #[test]
    fn plus_binds_tighter_than_equality() {
        let body = main_body("func main() { x <- 1 + 2 == 3; }");
        let Stmt::Assign { value, .. } = &body[0] else {
            panic!("expected assignment");
        };
        assert_eq!(
            value,
            &Expr::binary(
                BinaryOp::Eq,
                Expr::binary(BinaryOp::Add, Expr::Int(1), Expr::Int(2)),
                Expr::Int(3),
            )
        );
    }

    /// Position-free rendering so trees can be compared across layouts.
    fn render(expr: &Expr) -> String {
        match expr {
            Expr::Int(v) => v.to_string(),
            Expr::Var { name, .. } => name.clone(),
            Expr::Binary { op, lhs, rhs } => format!("({op:?} {} {})", render(lhs), render(rhs)),
            Expr::Call { callee, args, .. } => {
                let args: Vec<_> = args.iter().map(render).collect();
                format!("{callee}({})", args.join(", "))
            }
        }
    }

    #[test]
    fn equality_chains_left_associatively() {
        let body = main_body("func main() {\na <- 0; b <- 0; c <- 0; x <- a == b != c; }");
        let Stmt::Assign { value, .. } = &body[3] else {
            panic!("expected assignment");
        };
        assert_eq!(
            value,
            &Expr::binary(
                BinaryOp::NotEq,
                Expr::binary(BinaryOp::Eq, var("a", 2, 30), var("b", 2, 35)),
                var("c", 2, 40),
            )
        );
    }

    #[test]
    fn parenthesized_while_condition_is_equivalent() {
        let bare = main_body("func main() { i <- 0; while i != 5 { i <- i + 1; } }");
        let parens = main_body("func main() { i <- 0; while (i != 5) { i <- i + 1; } }");
        let (Stmt::While { cond: a, body: body_a, .. }, Stmt::While { cond: b, body: body_b, .. }) =
            (&bare[1], &parens[1])
        else {
            panic!("expected loops");
        };
        assert_eq!(render(a), "(NotEq i 5)");
        assert_eq!(render(a), render(b));
        assert_eq!(body_a.len(), body_b.len());
    }

    #[test]
    fn labeled_while_and_labeled_break() {
        let body = main_body(
            "func main() { i <- 0; main_loop: while i != 5 { if (i == 3) { break main_loop; } continue; } }",
        );
        let Stmt::While { label, body, .. } = &body[1] else {
            panic!("expected while");
        };
        assert_eq!(label.as_deref(), Some("main_loop"));
        let Stmt::If { then_body, else_body, .. } = &body[0] else {
            panic!("expected if");
        };
        assert!(else_body.is_none());
        assert!(matches!(
            &then_body[0],
            Stmt::Break { label: Some(l), .. } if l == "main_loop"
        ));
        assert!(matches!(&body[1], Stmt::Continue { label: None, .. }));
    }

    #[test]
    fn nested_if_else() {
        let body = main_body(
            "func main() { if 1==2 { if 1==2 { f(1); } else { f(2); } } else { if 1==1 { f(3); } else { f(4); } } }",
        );
        let Stmt::If { then_body, else_body: Some(else_body), .. } = &body[0] else {
            panic!("expected if/else");
        };
        assert!(matches!(&then_body[0], Stmt::If { else_body: Some(_), .. }));
        assert!(matches!(&else_body[0], Stmt::If { else_body: Some(_), .. }));
    }

    #[test]
    fn call_with_nested_arguments() {
        let body = main_body("func main() { f(g(), 1 + x, (2)); }");
        let Stmt::Expr(Expr::Call { callee, args, .. }) = &body[0] else {
            panic!("expected call statement");
        };
        assert_eq!(callee, "f");
        assert_eq!(args.len(), 3);
        assert!(matches!(&args[0], Expr::Call { args, .. } if args.is_empty()));
        assert_eq!(args[2], Expr::Int(2));
    }

    #[test]
    fn label_must_precede_while() {
        let err = Parser::parse("func main() { lbl: x <- 1; }").unwrap_err();
        match err {
            CompileError::Parse { expected, found, .. } => {
                assert!(expected.contains("while"), "{expected}");
                assert_eq!(found, "`x`");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(Parser::parse("func main() { lbl: if 1 { } }").is_err());
    }

    #[test]
    fn missing_semicolon_reports_position() {
        let err = Parser::parse("func main() {\n  x <- 1\n}").unwrap_err();
        match err {
            CompileError::Parse { pos, expected, found } => {
                assert_eq!(pos, Pos::new(3, 1));
                assert_eq!(expected, "`;`");
                assert_eq!(found, "`}`");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_block_is_rejected() {
        let err = Parser::parse("func main() { x <- 1;").unwrap_err();
        assert!(matches!(err, CompileError::Parse { ref found, .. } if found == "end of input"));
    }

    #[test]
    fn function_needs_body_or_semicolon() {
        assert!(Parser::parse("func f() x").is_err());
        assert!(Parser::parse("main() {}").is_err());
    }

    #[test]
    fn break_requires_semicolon() {
        assert!(Parser::parse("func main() { while 1 { break } }").is_err());
    }

    #[test]
    fn lex_errors_surface_unchanged() {
        let err = Parser::parse("func main() { x <- 1 - 2; }").unwrap_err();
        assert!(matches!(err, CompileError::Lex { .. }));
    }

    #[test]
    fn from_tokens_requires_eof() {
        assert!(Parser::from_tokens(Vec::new()).is_err());
    }
}
