//! 계산기 - 제한된 산술식 파서/평가기
//!
//! 숫자 리터럴, `+ - * / // % **`, 괄호, 허용된 함수
//! (`sqrt sin cos tan log exp`)와 상수(`pi e`)만 지원합니다.
//! 그 외 식별자는 전부 거부되며, 임의 코드 실행 경로가 없습니다.
//!
//! 문법 (우선순위 낮은 순):
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '//' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('**' unary)?
//! primary := NUMBER | NAME | NAME '(' args ')' | '(' expr ')'
//! ```

use std::fmt;

use thiserror::Error;

/// 괄호/단항 부호/함수 호출/거듭제곱의 최대 중첩 깊이
const MAX_DEPTH: usize = 200;

// ============================================================================
// Types
// ============================================================================

/// 계산 결과 값 (정수 연산은 정수로 유지)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

/// 계산 에러
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("empty expression")]
    Empty,

    #[error("invalid syntax")]
    Syntax,

    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("name '{0}' is not defined")]
    UnknownName(String),

    #[error("'{0}' is not callable")]
    NotCallable(String),

    #[error("function '{0}' must be called with arguments")]
    NotCalled(String),

    #[error("{name}() takes {expected} ({given} given)")]
    Arity {
        name: &'static str,
        expected: &'static str,
        given: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("math domain error")]
    Domain,

    #[error("math range error")]
    Range,

    #[error("integer overflow")]
    Overflow,

    #[error("expression is too deeply nested")]
    TooDeep,
}

/// 산술식 평가
pub fn evaluate(expr: &str) -> Result<Number, CalcError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(CalcError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(CalcError::Syntax);
    }
    Ok(value)
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Number),
    Name(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' if c != '.' || next.map_or(false, |n| n.is_ascii_digit()) => {
                let (number, end) = lex_number(&chars, i)?;
                tokens.push(Token::Num(number));
                i = end;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if next == Some('*') => {
                tokens.push(Token::DoubleStar);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(CalcError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

/// 숫자 리터럴 (`12`, `1.5`, `.5`, `2.`, `1e3`, `2.5E-3`)
fn lex_number(chars: &[char], start: usize) -> Result<(Number, usize), CalcError> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let literal: String = chars[start..i].iter().collect();
    let number = if is_float {
        Number::Float(literal.parse().map_err(|_| CalcError::Syntax)?)
    } else {
        Number::Int(literal.parse().map_err(|_| CalcError::Overflow)?)
    };

    Ok((number, i))
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), CalcError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(CalcError::Syntax)
        }
    }

    /// 재귀 한 단계 진입 (한도를 넘으면 에러)
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, CalcError>,
    ) -> Result<T, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<Number, CalcError> {
        let mut value = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                value = add(value, self.term()?)?;
            } else if self.eat(&Token::Minus) {
                value = sub(value, self.term()?)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<Number, CalcError> {
        let mut value = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                value = mul(value, self.unary()?)?;
            } else if self.eat(&Token::Slash) {
                value = div(value, self.unary()?)?;
            } else if self.eat(&Token::DoubleSlash) {
                value = floor_div(value, self.unary()?)?;
            } else if self.eat(&Token::Percent) {
                value = modulo(value, self.unary()?)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> Result<Number, CalcError> {
        if self.eat(&Token::Minus) {
            return neg(self.nested(Self::unary)?);
        }
        if self.eat(&Token::Plus) {
            return self.nested(Self::unary);
        }
        self.power()
    }

    fn power(&mut self) -> Result<Number, CalcError> {
        let base = self.primary()?;
        if self.eat(&Token::DoubleStar) {
            // 오른쪽 결합, 지수에는 단항 부호 허용 (2 ** -1)
            let exponent = self.nested(Self::unary)?;
            return pow(base, exponent);
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Number, CalcError> {
        let token = self.peek().cloned().ok_or(CalcError::Syntax)?;
        self.pos += 1;

        match token {
            Token::Num(n) => Ok(n),
            Token::LParen => {
                let value = self.nested(Self::expr)?;
                self.expect(&Token::RParen)?;
                Ok(value)
            }
            Token::Name(name) => {
                let called = self.eat(&Token::LParen);
                if let Some(value) = constant(&name) {
                    return if called {
                        Err(CalcError::NotCallable(name))
                    } else {
                        Ok(value)
                    };
                }
                let function = Function::lookup(&name)
                    .ok_or_else(|| CalcError::UnknownName(name.clone()))?;
                if !called {
                    return Err(CalcError::NotCalled(name));
                }
                let args = self.nested(Self::args)?;
                function.apply(&args)
            }
            _ => Err(CalcError::Syntax),
        }
    }

    /// 여는 괄호 다음부터 닫는 괄호까지의 인자 목록
    fn args(&mut self) -> Result<Vec<Number>, CalcError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            self.expect(&Token::Comma)?;
        }
    }
}

// ============================================================================
// Allow-list
// ============================================================================

fn constant(name: &str) -> Option<Number> {
    match name {
        "pi" => Some(Number::Float(std::f64::consts::PI)),
        "e" => Some(Number::Float(std::f64::consts::E)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum Function {
    Sqrt,
    Sin,
    Cos,
    Tan,
    Log,
    Exp,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "sqrt" => Some(Function::Sqrt),
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            "log" => Some(Function::Log),
            "exp" => Some(Function::Exp),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Function::Sqrt => "sqrt",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Log => "log",
            Function::Exp => "exp",
        }
    }

    fn apply(self, args: &[Number]) -> Result<Number, CalcError> {
        let arity_error = |expected| CalcError::Arity {
            name: self.name(),
            expected,
            given: args.len(),
        };

        let x = match (self, args) {
            (Function::Log, [x, base]) => return log_base(x.as_f64(), base.as_f64()),
            (_, [x]) => x.as_f64(),
            (Function::Log, _) => return Err(arity_error("1 or 2 arguments")),
            _ => return Err(arity_error("exactly one argument")),
        };

        let result = match self {
            Function::Sqrt if x < 0.0 => return Err(CalcError::Domain),
            Function::Sqrt => x.sqrt(),
            Function::Sin | Function::Cos | Function::Tan if x.is_infinite() => {
                return Err(CalcError::Domain)
            }
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tan => x.tan(),
            Function::Log if x <= 0.0 => return Err(CalcError::Domain),
            Function::Log => x.ln(),
            Function::Exp => x.exp(),
        };

        finite(x, result)
    }
}

fn log_base(x: f64, base: f64) -> Result<Number, CalcError> {
    if x <= 0.0 || base <= 0.0 {
        return Err(CalcError::Domain);
    }
    if base == 1.0 {
        return Err(CalcError::DivisionByZero);
    }
    Ok(Number::Float(x.ln() / base.ln()))
}

/// 유한 입력에서 무한 결과가 나오면 범위 에러
fn finite(input: f64, result: f64) -> Result<Number, CalcError> {
    if result.is_infinite() && input.is_finite() {
        Err(CalcError::Range)
    } else {
        Ok(Number::Float(result))
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

fn add(a: Number, b: Number) -> Result<Number, CalcError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.checked_add(y).map(Number::Int).ok_or(CalcError::Overflow),
        _ => Ok(Number::Float(a.as_f64() + b.as_f64())),
    }
}

fn sub(a: Number, b: Number) -> Result<Number, CalcError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.checked_sub(y).map(Number::Int).ok_or(CalcError::Overflow),
        _ => Ok(Number::Float(a.as_f64() - b.as_f64())),
    }
}

fn mul(a: Number, b: Number) -> Result<Number, CalcError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.checked_mul(y).map(Number::Int).ok_or(CalcError::Overflow),
        _ => Ok(Number::Float(a.as_f64() * b.as_f64())),
    }
}

fn div(a: Number, b: Number) -> Result<Number, CalcError> {
    if b.is_zero() {
        return Err(CalcError::DivisionByZero);
    }
    Ok(Number::Float(a.as_f64() / b.as_f64()))
}

/// 바닥 나눗셈 (음의 무한대 방향)
fn floor_div(a: Number, b: Number) -> Result<Number, CalcError> {
    if b.is_zero() {
        return Err(CalcError::DivisionByZero);
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let q = x.checked_div(y).ok_or(CalcError::Overflow)?;
            if x % y != 0 && ((x < 0) != (y < 0)) {
                Ok(Number::Int(q - 1))
            } else {
                Ok(Number::Int(q))
            }
        }
        _ => Ok(Number::Float((a.as_f64() / b.as_f64()).floor())),
    }
}

/// 나머지 (결과 부호는 제수를 따름)
fn modulo(a: Number, b: Number) -> Result<Number, CalcError> {
    if b.is_zero() {
        return Err(CalcError::DivisionByZero);
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let r = x.checked_rem(y).ok_or(CalcError::Overflow)?;
            if r != 0 && ((r < 0) != (y < 0)) {
                Ok(Number::Int(r + y))
            } else {
                Ok(Number::Int(r))
            }
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
                Ok(Number::Float(r + y))
            } else {
                Ok(Number::Float(r))
            }
        }
    }
}

fn pow(base: Number, exponent: Number) -> Result<Number, CalcError> {
    if let (Number::Int(b), Number::Int(e)) = (base, exponent) {
        if e >= 0 {
            let e = u32::try_from(e).map_err(|_| CalcError::Overflow)?;
            return b.checked_pow(e).map(Number::Int).ok_or(CalcError::Overflow);
        }
    }

    let (b, e) = (base.as_f64(), exponent.as_f64());
    if b == 0.0 && e < 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    if b < 0.0 && e.fract() != 0.0 {
        return Err(CalcError::Domain);
    }
    let result = b.powf(e);
    if result.is_infinite() && b.is_finite() && e.is_finite() {
        return Err(CalcError::Range);
    }
    Ok(Number::Float(result))
}

fn neg(a: Number) -> Result<Number, CalcError> {
    match a {
        Number::Int(x) => x.checked_neg().map(Number::Int).ok_or(CalcError::Overflow),
        Number::Float(x) => Ok(Number::Float(-x)),
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// 최단 왕복 표기 (`2.0`, `0.1`, `1e+16`, `1e-05`)
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    // Debug 포맷은 1e-4 <= |x| < 1e16 범위 밖에서 지수 표기를 사용
    let repr = format!("{:?}", x);
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => repr,
    }
}

// ============================================================================
// Tests
// ============================================================================
