// Piccola grammatica di espressioni per indirizzi e breakpoint condizionali
// (§9 "Dynamic expression evaluation in the shell", ridisegno rispetto
// all'`eval` su stringhe Python dell'originale). Identificatori: `r0`..`r15`,
// `sp`, `lr`, `pc`, `cpsr`; `m(addr,size)` legge la memoria; letterali
// esadecimali (`0x..`) o decimali; operatori `+ - * / & | ^ << >> == != < >
// <= >=` più un `!`/`-` unario. Nessuna esecuzione di codice arbitrario: solo
// questa grammatica fissa.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use gba_arm7tdmi::Registers;
use gba_core::Memory;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("unknown identifier {0:?}")]
    UnknownIdentifier(String),
    #[error("expected {0:?}")]
    Expected(char),
    #[error("trailing input after expression: {0:?}")]
    TrailingInput(String),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(u32),
    Register(usize),
    Cpsr,
    Mem(Box<Expr>, Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Expr {
    /// Valuta l'espressione sul registro file e la memoria correnti.
    pub fn eval(&self, regs: &Registers, memory: &mut Memory) -> u32 {
        match self {
            Expr::Literal(v) => *v,
            Expr::Register(i) => regs.r[*i],
            Expr::Cpsr => regs.cpsr,
            Expr::Mem(addr, size) => {
                let addr = addr.eval(regs, memory);
                let size = size.eval(regs, memory);
                memory.read(addr, size)
            }
            Expr::Unary(op, inner) => {
                let v = inner.eval(regs, memory);
                match op {
                    UnOp::Neg => v.wrapping_neg(),
                    UnOp::Not => {
                        if v == 0 {
                            1
                        } else {
                            0
                        }
                    }
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(regs, memory);
                let b = rhs.eval(regs, memory);
                match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::Div => {
                        if b == 0 {
                            0
                        } else {
                            a / b
                        }
                    }
                    BinOp::And => a & b,
                    BinOp::Or => a | b,
                    BinOp::Xor => a ^ b,
                    BinOp::Shl => a.wrapping_shl(b),
                    BinOp::Shr => a.wrapping_shr(b),
                    BinOp::Eq => bool_u32(a == b),
                    BinOp::Ne => bool_u32(a != b),
                    BinOp::Lt => bool_u32(a < b),
                    BinOp::Gt => bool_u32(a > b),
                    BinOp::Le => bool_u32(a <= b),
                    BinOp::Ge => bool_u32(a >= b),
                }
            }
        }
    }

    /// Compila l'espressione in un predicato adatto a
    /// `BreakpointRegistry::add_condition` (vero quando il valore risultante
    /// è diverso da zero).
    pub fn into_condition(self) -> gba_core::breakpoints::Condition {
        Box::new(move |regs, memory| self.eval(regs, memory) != 0)
    }
}

fn bool_u32(b: bool) -> u32 {
    if b {
        1
    } else {
        0
    }
}

/// Analizza `input` e restituisce l'espressione risultante.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser {
        chars: input.char_indices().peekable(),
        input,
    };
    let expr = parser.parse_expr()?;
    parser.skip_ws();
    if let Some((pos, _)) = parser.chars.peek() {
        return Err(ExprError::TrailingInput(input[*pos..].to_string()));
    }
    Ok(expr)
}

struct Parser<'a> {
    chars: Peekable<CharIndices<'a>>,
    input: &'a str,
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.peek().map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.next().map(|(_, c)| c)
    }

    fn expect(&mut self, expected: char) -> Result<(), ExprError> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            _ => Err(ExprError::Expected(expected)),
        }
    }

    fn try_consume_op(&mut self, op: &str) -> bool {
        self.skip_ws();
        let rest = &self.input[self.byte_pos()..];
        if rest.starts_with(op) {
            for _ in 0..op.chars().count() {
                self.chars.next();
            }
            true
        } else {
            false
        }
    }

    fn byte_pos(&mut self) -> usize {
        match self.chars.peek() {
            Some((pos, _)) => *pos,
            None => self.input.len(),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_bitor()?;
        loop {
            let op = if self.try_consume_op("==") {
                BinOp::Eq
            } else if self.try_consume_op("!=") {
                BinOp::Ne
            } else if self.try_consume_op("<=") {
                BinOp::Le
            } else if self.try_consume_op(">=") {
                BinOp::Ge
            } else if self.try_consume_op("<") {
                BinOp::Lt
            } else if self.try_consume_op(">") {
                BinOp::Gt
            } else {
                break;
            };
            let rhs = self.parse_bitor()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_bitxor()?;
        loop {
            if self.peek_single('|') {
                self.bump();
                let rhs = self.parse_bitxor()?;
                lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_bitand()?;
        loop {
            if self.peek_single('^') {
                self.bump();
                let rhs = self.parse_bitand()?;
                lhs = Expr::Binary(BinOp::Xor, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_shift()?;
        loop {
            if self.peek_single('&') {
                self.bump();
                let rhs = self.parse_shift()?;
                lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = if self.try_consume_op("<<") {
                BinOp::Shl
            } else if self.try_consume_op(">>") {
                BinOp::Shr
            } else {
                break;
            };
            let rhs = self.parse_add()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = if self.peek_single('+') {
                self.bump();
                BinOp::Add
            } else if self.peek_single('-') {
                self.bump();
                BinOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.peek_single('*') {
                self.bump();
                BinOp::Mul
            } else if self.peek_single('/') {
                self.bump();
                BinOp::Div
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek_single('-') {
            self.bump();
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnOp::Neg, Box::new(inner)));
        }
        if self.peek_single('!') {
            self.bump();
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnOp::Not, Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.peek_char() {
            Some(c) if c == '(' => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(')')?;
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_ident(),
            Some(c) => Err(ExprError::UnexpectedChar(c)),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn parse_number(&mut self) -> Result<Expr, ExprError> {
        self.skip_ws();
        let start = self.byte_pos();
        if self.input[start..].starts_with("0x") || self.input[start..].starts_with("0X") {
            self.chars.next();
            self.chars.next();
            let digits_start = self.byte_pos();
            while matches!(self.chars.peek(), Some((_, c)) if c.is_ascii_hexdigit()) {
                self.chars.next();
            }
            let text = &self.input[digits_start..self.byte_pos()];
            let value = u32::from_str_radix(text, 16).map_err(|_| ExprError::UnexpectedEnd)?;
            return Ok(Expr::Literal(value));
        }
        while matches!(self.chars.peek(), Some((_, c)) if c.is_ascii_digit()) {
            self.chars.next();
        }
        let text = &self.input[start..self.byte_pos()];
        let value: u32 = text.parse().map_err(|_| ExprError::UnexpectedEnd)?;
        Ok(Expr::Literal(value))
    }

    fn parse_ident(&mut self) -> Result<Expr, ExprError> {
        self.skip_ws();
        let start = self.byte_pos();
        while matches!(self.chars.peek(), Some((_, c)) if c.is_alphanumeric() || *c == '_') {
            self.chars.next();
        }
        let name = &self.input[start..self.byte_pos()];

        if name == "m" && self.peek_single('(') {
            self.bump();
            let addr = self.parse_expr()?;
            self.skip_ws();
            let size = if self.peek_single(',') {
                self.bump();
                self.parse_expr()?
            } else {
                Expr::Literal(4)
            };
            self.expect(')')?;
            return Ok(Expr::Mem(Box::new(addr), Box::new(size)));
        }

        register_index(name)
            .map(Expr::Register)
            .or_else(|| (name == "cpsr").then_some(Expr::Cpsr))
            .ok_or_else(|| ExprError::UnknownIdentifier(name.to_string()))
    }

    fn peek_single(&mut self, c: char) -> bool {
        self.peek_char() == Some(c)
    }
}

fn register_index(name: &str) -> Option<usize> {
    match name {
        "sp" => Some(13),
        "lr" => Some(14),
        "pc" => Some(15),
        _ => {
            let digits = name.strip_prefix('r')?;
            let n: usize = digits.parse().ok()?;
            (n < 16).then_some(n)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_str(s: &str) -> u32 {
        let mut regs = Registers::new();
        regs.r[0] = 5;
        regs.r[1] = 3;
        let mut mem = Memory::new();
        mem.write_word(0x0200_0000, 0xDEAD_BEEF);
        parse(s).unwrap().eval(&regs, &mut mem)
    }

    #[test]
    fn arithmetic_precedence_matches_c_like_rules() {
        assert_eq!(eval_str("2 + 3 * 4"), 14);
        assert_eq!(eval_str("(2 + 3) * 4"), 20);
    }

    #[test]
    fn register_identifiers_resolve_to_register_file() {
        assert_eq!(eval_str("r0 + r1"), 8);
        assert_eq!(eval_str("r0 == 5"), 1);
        assert_eq!(eval_str("r0 != 5"), 0);
    }

    #[test]
    fn hex_literals_and_memory_reads() {
        assert_eq!(eval_str("0x02000000"), 0x0200_0000);
        assert_eq!(eval_str("m(0x02000000,4)"), 0xDEAD_BEEF);
    }

    #[test]
    fn shift_and_bitwise_operators() {
        assert_eq!(eval_str("1 << 4"), 16);
        assert_eq!(eval_str("0xF0 | 0x0F"), 0xFF);
        assert_eq!(eval_str("0xFF & 0x0F"), 0x0F);
    }

    #[test]
    fn condition_predicate_is_nonzero_check() {
        let mut regs = Registers::new();
        regs.set_pc(0x1234);
        let mut mem = Memory::new();
        let cond = parse("pc == 0x1234").unwrap().into_condition();
        assert!(cond(&regs, &mut mem));
    }

    #[test]
    fn unknown_identifier_is_an_error() {
        assert!(matches!(parse("foo"), Err(ExprError::UnknownIdentifier(_))));
    }
}
