use crate::traits::{RealFunction, Scalar};
use std::cell::RefCell;
use std::fmt;
use thiserror::Error;

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of the independent variable `x` onto the stack.
    LoadVar,
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes sin(a).
    Sin,
    /// Pops top value (a), pushes cos(a).
    Cos,
    /// Pops top value (a), pushes tan(a).
    Tan,
    /// Pops top value (a), pushes -a.
    Neg,
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Compiles an AST into postfix bytecode.
    pub fn compile(expr: &Expr) -> Self {
        let mut ops = Vec::new();
        compile_recursive(expr, &mut ops);
        Self { ops }
    }
}

fn compile_recursive(expr: &Expr, ops: &mut Vec<OpCode>) {
    match expr {
        Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
        Expr::Variable => ops.push(OpCode::LoadVar),
        Expr::Binary(left, op, right) => {
            compile_recursive(left, ops);
            compile_recursive(right, ops);
            ops.push(match op {
                BinaryOp::Add => OpCode::Add,
                BinaryOp::Sub => OpCode::Sub,
                BinaryOp::Mul => OpCode::Mul,
                BinaryOp::Div => OpCode::Div,
                BinaryOp::Pow => OpCode::Pow,
            });
        }
        Expr::Negate(operand) => {
            compile_recursive(operand, ops);
            ops.push(OpCode::Neg);
        }
        Expr::Call(func, arg) => {
            compile_recursive(arg, ops);
            ops.push(match func {
                Function::Sin => OpCode::Sin,
                Function::Cos => OpCode::Cos,
                Function::Tan => OpCode::Tan,
            });
        }
    }
}

/// Stack-based Virtual Machine for evaluating expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `x`: Value of the independent variable.
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Returns the value left on the stack, or `None` if the bytecode is not
/// well formed (stack underflow or leftover operands).
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(bytecode: &Bytecode, x: T, stack: &mut Vec<T>) -> Option<T> {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(T::from_f64(*val)?),
                OpCode::LoadVar => stack.push(x),
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow => {
                    let b = stack.pop()?;
                    let a = stack.pop()?;
                    stack.push(match op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => a.powf(b),
                    });
                }
                OpCode::Sin | OpCode::Cos | OpCode::Tan | OpCode::Neg => {
                    let a = stack.pop()?;
                    stack.push(match op {
                        OpCode::Sin => a.sin(),
                        OpCode::Cos => a.cos(),
                        OpCode::Tan => a.tan(),
                        _ => -a,
                    });
                }
            }
        }

        let result = stack.pop()?;
        if stack.is_empty() {
            Some(result)
        } else {
            None
        }
    }
}

// --- AST & Parser ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
}

impl Function {
    const ALL: [Function; 3] = [Function::Sin, Function::Cos, Function::Tan];

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
        }
    }
}

/// Abstract Syntax Tree nodes for expressions in `x`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable,
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Negate(Box<Expr>),
    Call(Function, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),
    #[error("malformed number '{0}' at position {1}")]
    MalformedNumber(String, usize),
    #[error("unknown identifier '{0}' at position {1}")]
    UnknownIdentifier(String, usize),
    #[error("unexpected {0} at position {1}")]
    UnexpectedToken(String, usize),
    #[error("expected ')' at position {0}")]
    MissingClosingParen(usize),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
}

/// Parses a string expression into an AST.
///
/// The whole input must be consumed; adjacency such as `2x` is rejected
/// rather than read as implicit multiplication.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some((token, at)) => Err(ParseError::UnexpectedToken(token.to_string(), at)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Variable,
    Function(Function),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::Variable => write!(f, "'x'"),
            Token::Function(func) => write!(f, "'{}'", func.name()),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Caret => write!(f, "'^'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal
                .parse::<f64>()
                .map_err(|_| ParseError::MalformedNumber(literal.clone(), start))?;
            tokens.push((Token::Number(value), start));
        } else if c.is_alphabetic() {
            let start = i;
            if let Some(func) = Function::ALL.into_iter().find(|func| {
                let name = func.name();
                chars[i..].iter().take(name.len()).copied().eq(name.chars())
            }) {
                i += func.name().len();
                tokens.push((Token::Function(func), start));
            } else if c == 'x' {
                i += 1;
                tokens.push((Token::Variable, start));
            } else {
                while i < chars.len() && chars[i].is_alphabetic() {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                return Err(ParseError::UnknownIdentifier(ident, start));
            }
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(ParseError::UnexpectedCharacter(c, i)),
            };
            tokens.push((token, i));
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<(Token, usize)> {
        self.tokens.get(self.pos).copied()
    }

    fn consume(&mut self) -> Option<(Token, usize)> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn end_position(&self) -> usize {
        self.tokens.last().map_or(0, |(_, at)| at + 1)
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;

        while let Some((token, _)) = self.peek() {
            let op = match token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        while let Some((token, _)) = self.peek() {
            let op = match token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // Sign binds looser than '^', so -x^2 is -(x^2).
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some((Token::Minus, _)) => {
                self.consume();
                let expr = self.parse_unary()?;
                Ok(Expr::Negate(Box::new(expr)))
            }
            Some((Token::Plus, _)) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // Right-associative: 2^3^2 is 2^(3^2).
    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        if let Some((Token::Caret, _)) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.consume() {
            Some((Token::Number(n), _)) => Ok(Expr::Number(n)),
            Some((Token::Variable, _)) => Ok(Expr::Variable),
            Some((Token::Function(func), _)) => {
                let arg = self.parse_call_argument()?;
                Ok(Expr::Call(func, Box::new(arg)))
            }
            Some((Token::LParen, _)) => self.parse_group(),
            Some((token, at)) => Err(ParseError::UnexpectedToken(token.to_string(), at)),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    /// A function applies to a parenthesized group or directly to `x`.
    fn parse_call_argument(&mut self) -> Result<Expr, ParseError> {
        match self.consume() {
            Some((Token::LParen, _)) => self.parse_group(),
            Some((Token::Variable, _)) => Ok(Expr::Variable),
            Some((token, at)) => Err(ParseError::UnexpectedToken(token.to_string(), at)),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn parse_group(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expression()?;
        match self.consume() {
            Some((Token::RParen, _)) => Ok(expr),
            Some((_, at)) => Err(ParseError::MissingClosingParen(at)),
            None => Err(ParseError::MissingClosingParen(self.end_position())),
        }
    }
}

// --- CompiledExpression ---

/// A canonical expression compiled once and evaluated many times.
pub struct CompiledExpression {
    canonical: String,
    bytecode: Bytecode,
    // Interior mutability for VM stack to avoid allocation per sample.
    // This makes the expression !Sync; each overlay entry compiles its own.
    stack: RefCell<Vec<f64>>,
}

impl CompiledExpression {
    pub fn compile(canonical: &str) -> Result<Self, ParseError> {
        let expr = parse(canonical)?;
        Ok(Self {
            canonical: canonical.to_string(),
            bytecode: Bytecode::compile(&expr),
            stack: RefCell::new(Vec::with_capacity(32)),
        })
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }
}

impl RealFunction for CompiledExpression {
    fn value_at(&self, x: f64) -> Option<f64> {
        if !x.is_finite() {
            return None;
        }
        let mut stack = self.stack.borrow_mut();
        VM::execute(&self.bytecode, x, &mut *stack).filter(|value| value.is_finite())
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("canonical", &self.canonical)
            .field("ops", &self.bytecode.ops.len())
            .finish()
    }
}

/// Evaluates a canonical expression at `x`.
///
/// Total: parse failures, NaN and infinite results all yield `None`.
pub fn evaluate(canonical: &str, x: f64) -> Option<f64> {
    CompiledExpression::compile(canonical).ok()?.value_at(x)
}
