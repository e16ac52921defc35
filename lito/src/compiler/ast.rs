use std::fmt::{self, Write as _};

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Expression(Expression),
    Def {
        receiver: Option<Expression>,
        name: String,
        parameters: Vec<Expression>,
        body: BlockStatement,
    },
    Class {
        name: String,
        super_class: Option<Expression>,
        super_class_name: Option<String>,
        body: BlockStatement,
    },
    Module {
        name: String,
        body: BlockStatement,
    },
    Return(Expression),
    While {
        condition: Expression,
        body: BlockStatement,
    },
    Continue,
    Break,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
    pub keep_last_value: bool,
    pub line: usize,
}

impl BlockStatement {
    pub fn new(line: usize) -> Self {
        Self {
            statements: Vec::new(),
            keep_last_value: false,
            line,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The final expression statement keeps its value on the stack.
    pub fn keep_last_value(&mut self) {
        self.keep_last_value = true;
        if let Some(Statement {
            kind: StmtKind::Expression(expression),
            ..
        }) = self.statements.last_mut()
        {
            expression.is_stmt = false;
        }
    }

    /// Whether the last statement leaves its value on the stack.
    pub fn ends_with_value(&self) -> bool {
        match self.statements.last() {
            Some(Statement {
                kind: StmtKind::Expression(expression),
                ..
            }) => !expression.is_stmt,
            Some(Statement {
                kind: StmtKind::Return(_),
                ..
            }) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub line: usize,
    /// Set when the value is unused and must be popped.
    pub is_stmt: bool,
}

impl Expression {
    pub fn new(kind: ExprKind, line: usize) -> Self {
        Self {
            kind,
            line,
            is_stmt: false,
        }
    }

    pub fn boxed(kind: ExprKind, line: usize) -> Box<Self> {
        Box::new(Self::new(kind, line))
    }

    pub fn is_variable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Identifier(_) | ExprKind::InstanceVariable(_) | ExprKind::Constant { .. }
        )
    }

    pub fn identifier_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Conditional {
    pub condition: Expression,
    pub consequence: BlockStatement,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallExpression {
    pub receiver: Box<Expression>,
    pub method: String,
    pub arguments: Vec<Expression>,
    pub block: Option<BlockStatement>,
    pub block_arguments: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Nil,
    Array(Vec<Expression>),
    Hash(Vec<(String, Expression)>),
    Range {
        start: Box<Expression>,
        end: Box<Expression>,
        exclusive: bool,
    },
    Identifier(String),
    InstanceVariable(String),
    Constant {
        name: String,
        is_namespace: bool,
    },
    MultiVariable(Vec<Expression>),
    Prefix {
        operator: String,
        right: Box<Expression>,
    },
    Infix {
        left: Box<Expression>,
        operator: String,
        right: Box<Expression>,
    },
    Assign {
        variables: Vec<Expression>,
        value: Box<Expression>,
    },
    Call(CallExpression),
    ArgumentPair {
        key: String,
        value: Option<Box<Expression>>,
    },
    Yield(Vec<Expression>),
    GetBlock,
    HasBlock,
    SelfRef {
        is_super: bool,
    },
    If {
        conditionals: Vec<Conditional>,
        alternative: Option<BlockStatement>,
    },
}

impl Program {
    /// Copy with every source line zeroed, for structural comparisons.
    pub fn without_lines(&self) -> Program {
        let mut program = self.clone();
        for statement in &mut program.statements {
            strip_statement(statement);
        }
        program
    }
}

fn strip_statement(statement: &mut Statement) {
    statement.line = 0;
    match &mut statement.kind {
        StmtKind::Expression(expression) | StmtKind::Return(expression) => {
            strip_expression(expression)
        }
        StmtKind::Def {
            receiver,
            parameters,
            body,
            ..
        } => {
            if let Some(receiver) = receiver {
                strip_expression(receiver);
            }
            parameters.iter_mut().for_each(strip_expression);
            strip_block(body);
        }
        StmtKind::Class {
            super_class, body, ..
        } => {
            if let Some(super_class) = super_class {
                strip_expression(super_class);
            }
            strip_block(body);
        }
        StmtKind::Module { body, .. } => strip_block(body),
        StmtKind::While { condition, body } => {
            strip_expression(condition);
            strip_block(body);
        }
        StmtKind::Continue | StmtKind::Break => {}
    }
}

fn strip_block(block: &mut BlockStatement) {
    block.line = 0;
    block.statements.iter_mut().for_each(strip_statement);
}

fn strip_expression(expression: &mut Expression) {
    expression.line = 0;
    match &mut expression.kind {
        ExprKind::Array(items) | ExprKind::MultiVariable(items) | ExprKind::Yield(items) => {
            items.iter_mut().for_each(strip_expression)
        }
        ExprKind::Hash(pairs) => pairs
            .iter_mut()
            .for_each(|(_, value)| strip_expression(value)),
        ExprKind::Range { start, end, .. } => {
            strip_expression(start);
            strip_expression(end);
        }
        ExprKind::Prefix { right, .. } => strip_expression(right),
        ExprKind::Infix { left, right, .. } => {
            strip_expression(left);
            strip_expression(right);
        }
        ExprKind::Assign { variables, value } => {
            variables.iter_mut().for_each(strip_expression);
            strip_expression(value);
        }
        ExprKind::Call(call) => {
            strip_expression(&mut call.receiver);
            call.arguments.iter_mut().for_each(strip_expression);
            if let Some(block) = &mut call.block {
                strip_block(block);
            }
        }
        ExprKind::ArgumentPair { value, .. } => {
            if let Some(value) = value {
                strip_expression(value);
            }
        }
        ExprKind::If {
            conditionals,
            alternative,
        } => {
            for conditional in conditionals {
                conditional.line = 0;
                strip_expression(&mut conditional.condition);
                strip_block(&mut conditional.consequence);
            }
            if let Some(alternative) = alternative {
                strip_block(alternative);
            }
        }
        _ => {}
    }
}

// Source printer. The output re-parses to the same tree (modulo lines).

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer::default();
        for statement in &self.statements {
            printer.statement(statement);
        }
        f.write_str(printer.out.trim_end())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer::default();
        printer.statement(self);
        f.write_str(printer.out.trim_end())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer::default();
        printer.expression(self);
        f.write_str(&printer.out)
    }
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn statement(&mut self, statement: &Statement) {
        self.line_start();
        match &statement.kind {
            StmtKind::Expression(expression) => self.top_expression(expression),
            StmtKind::Def {
                receiver,
                name,
                parameters,
                body,
            } => {
                self.out.push_str("def ");
                if let Some(receiver) = receiver {
                    self.expression(receiver);
                    self.out.push('.');
                }
                self.out.push_str(name);
                self.out.push('(');
                self.list(parameters);
                self.out.push_str(") ");
                self.block(body);
            }
            StmtKind::Class {
                name,
                super_class,
                body,
                ..
            } => {
                self.out.push_str("class ");
                self.out.push_str(name);
                if let Some(super_class) = super_class {
                    self.out.push_str(" < ");
                    self.bare(super_class);
                }
                self.out.push(' ');
                self.block(body);
            }
            StmtKind::Module { name, body } => {
                let _ = write!(self.out, "module {name} ");
                self.block(body);
            }
            StmtKind::Return(value) => {
                self.out.push_str("return ");
                self.expression(value);
            }
            StmtKind::While { condition, body } => {
                self.out.push_str("while ");
                self.expression(condition);
                self.out.push(' ');
                self.block(body);
            }
            StmtKind::Continue => self.out.push_str("continue"),
            StmtKind::Break => self.out.push_str("break"),
        }
        self.out.push('\n');
    }

    fn block(&mut self, block: &BlockStatement) {
        self.out.push_str("{\n");
        self.indent += 1;
        for statement in &block.statements {
            self.statement(statement);
        }
        self.indent -= 1;
        self.line_start();
        self.out.push('}');
    }

    /// Statement-level expressions print assignments without parentheses so
    /// multi-target assignment parses back.
    fn top_expression(&mut self, expression: &Expression) {
        if let ExprKind::Assign { variables, value } = &expression.kind {
            self.assignment(variables, value);
        } else {
            self.expression(expression);
        }
    }

    fn assignment(&mut self, variables: &[Expression], value: &Expression) {
        self.list(variables);
        self.out.push_str(" = ");
        self.expression(value);
    }

    /// Namespaced constants print without the grouping parentheses.
    fn bare(&mut self, expression: &Expression) {
        match &expression.kind {
            ExprKind::Infix {
                left,
                operator,
                right,
            } if operator == "::" => {
                self.bare(left);
                self.out.push_str("::");
                self.bare(right);
            }
            _ => self.expression(expression),
        }
    }

    fn list(&mut self, items: &[Expression]) {
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                self.out.push_str(", ");
            }
            self.expression(item);
        }
    }

    fn expression(&mut self, expression: &Expression) {
        match &expression.kind {
            ExprKind::Integer(value) => {
                let _ = write!(self.out, "{value}");
            }
            ExprKind::Float(value) => {
                let text = value.to_string();
                self.out.push_str(&text);
                if !text.contains('.') {
                    self.out.push_str(".0");
                }
            }
            ExprKind::String(value) => self.out.push_str(&quote(value)),
            ExprKind::Boolean(value) => {
                let _ = write!(self.out, "{value}");
            }
            ExprKind::Nil => self.out.push_str("nil"),
            ExprKind::Array(items) => {
                self.out.push('[');
                self.list(items);
                self.out.push(']');
            }
            ExprKind::Hash(pairs) => {
                self.out.push('{');
                for (index, (key, value)) in pairs.iter().enumerate() {
                    if index > 0 {
                        self.out.push(',');
                    }
                    let _ = write!(self.out, " {}: ", quote(key));
                    self.expression(value);
                }
                self.out.push_str(if pairs.is_empty() { "}" } else { " }" });
            }
            ExprKind::Range {
                start,
                end,
                exclusive,
            } => {
                self.out.push('(');
                self.expression(start);
                self.out.push_str(if *exclusive { "..." } else { ".." });
                self.expression(end);
                self.out.push(')');
            }
            ExprKind::Identifier(name) => {
                if is_plain_identifier(name) {
                    self.out.push_str(name);
                } else {
                    let _ = write!(self.out, "`{name}`");
                }
            }
            ExprKind::InstanceVariable(name) => self.out.push_str(name),
            ExprKind::Constant { name, .. } => self.out.push_str(name),
            ExprKind::MultiVariable(variables) => self.list(variables),
            ExprKind::Prefix { operator, right } => {
                self.out.push('(');
                self.out.push_str(operator);
                self.expression(right);
                self.out.push(')');
            }
            ExprKind::Infix {
                left,
                operator,
                right,
            } => {
                self.out.push('(');
                if operator == "::" {
                    self.expression(left);
                    self.out.push_str("::");
                    self.expression(right);
                } else {
                    self.expression(left);
                    let _ = write!(self.out, " {operator} ");
                    self.expression(right);
                }
                self.out.push(')');
            }
            ExprKind::Assign { variables, value } => {
                self.out.push('(');
                self.assignment(variables, value);
                self.out.push(')');
            }
            ExprKind::Call(call) => self.call(call),
            ExprKind::ArgumentPair { key, value } => {
                self.out.push_str(key);
                self.out.push(':');
                if let Some(value) = value {
                    self.out.push(' ');
                    self.expression(value);
                }
            }
            ExprKind::Yield(arguments) => {
                self.out.push_str("yield(");
                self.list(arguments);
                self.out.push(')');
            }
            ExprKind::GetBlock => self.out.push_str("block!"),
            ExprKind::HasBlock => self.out.push_str("block?"),
            ExprKind::SelfRef { is_super } => {
                self.out.push_str(if *is_super { "super" } else { "self" })
            }
            ExprKind::If {
                conditionals,
                alternative,
            } => {
                for (index, conditional) in conditionals.iter().enumerate() {
                    self.out.push_str(if index == 0 { "if " } else { " elsif " });
                    self.expression(&conditional.condition);
                    self.out.push(' ');
                    self.block(&conditional.consequence);
                }
                if let Some(alternative) = alternative {
                    self.out.push_str(" else ");
                    self.block(alternative);
                }
            }
        }
    }

    fn receiver(&mut self, receiver: &Expression) {
        let atomic = matches!(
            receiver.kind,
            ExprKind::Identifier(_)
                | ExprKind::InstanceVariable(_)
                | ExprKind::Constant { .. }
                | ExprKind::SelfRef { .. }
                | ExprKind::String(_)
                | ExprKind::Array(_)
                | ExprKind::Call(_)
                | ExprKind::Infix { .. }
                | ExprKind::Prefix { .. }
                | ExprKind::Range { .. }
        );
        if atomic {
            self.expression(receiver);
        } else {
            self.out.push('(');
            self.expression(receiver);
            self.out.push(')');
        }
    }

    fn call(&mut self, call: &CallExpression) {
        match call.method.as_str() {
            "[]" => {
                self.receiver(&call.receiver);
                self.out.push('[');
                self.list(&call.arguments);
                self.out.push(']');
            }
            "[]=" if !call.arguments.is_empty() => {
                if let Some((value, index)) = call.arguments.split_last() {
                    self.out.push('(');
                    self.receiver(&call.receiver);
                    self.out.push('[');
                    self.list(index);
                    self.out.push_str("] = ");
                    self.expression(value);
                    self.out.push(')');
                }
            }
            method => {
                self.receiver(&call.receiver);
                self.out.push('.');
                self.out.push_str(method);
                self.out.push('(');
                self.list(&call.arguments);
                self.out.push(')');
            }
        }
        if let Some(block) = &call.block {
            self.out.push_str(" {");
            if !call.block_arguments.is_empty() {
                let _ = write!(self.out, " |{}|", call.block_arguments.join(", "));
            }
            self.out.push('\n');
            self.indent += 1;
            for statement in &block.statements {
                self.statement(statement);
            }
            self.indent -= 1;
            self.line_start();
            self.out.push('}');
        }
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars().peekable();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {}
        _ => return false,
    }
    while let Some(ch) = chars.next() {
        let suffix = (ch == '?' || ch == '!') && chars.peek().is_none();
        if !(ch.is_ascii_alphanumeric() || ch == '_' || suffix) {
            return false;
        }
    }
    !super::token::is_keyword(name)
}

/// Double-quoted literal using the lexer's escape syntax.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            ch if (ch as u32) < 0x20 || ch as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", ch as u32);
            }
            ch => out.push(ch),
        }
    }
    out.push('"');
    out
}
