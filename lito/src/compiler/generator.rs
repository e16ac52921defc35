use std::collections::HashMap;
use std::sync::Arc;

use super::ast::{
    BlockStatement, CallExpression, Conditional, ExprKind, Expression, Program, Statement,
    StmtKind,
};
use super::parser::parameter_name;
use crate::assembler::{Anchor, Assembler, AssemblerError};
use crate::bytecode::{ArgSet, ArgType, InstructionSet, NO_SUPER_CLASS, SetKind};

type GResult<T = ()> = Result<T, AssemblerError>;

/// Name of the top-level instruction set.
pub const PROGRAM_SET: &str = "ProgramStart";

/// Variable slots of one method, class body or block.
#[derive(Clone, Debug, Default)]
pub struct LocalTable {
    store: HashMap<String, usize>,
    count: usize,
}

impl LocalTable {
    pub fn get(&self, name: &str) -> Option<usize> {
        self.store.get(name).copied()
    }

    /// Index of `name`, allocating the next slot when it is new.
    pub fn set(&mut self, name: &str) -> usize {
        if let Some(index) = self.get(name) {
            return index;
        }
        let index = self.count;
        self.store.insert(name.to_string(), index);
        self.count += 1;
        index
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Lexical chain of local tables. The first table belongs to the enclosing
/// method (or program); every nested block pushes one more.
#[derive(Clone, Debug)]
pub struct Locals {
    tables: Vec<LocalTable>,
}

impl Default for Locals {
    fn default() -> Self {
        Self {
            tables: vec![LocalTable::default()],
        }
    }
}

impl Locals {
    pub fn depth(&self) -> usize {
        self.tables.len().saturating_sub(1)
    }

    /// `(depth, index)` of a visible variable, depth counted outwards from
    /// the innermost table.
    pub fn lookup(&self, name: &str) -> Option<(usize, usize)> {
        let innermost = self.depth();
        self.tables
            .iter()
            .enumerate()
            .rev()
            .find_map(|(level, table)| table.get(name).map(|index| (innermost - level, index)))
    }

    /// Resolves an assignment target: an existing visible variable, or a new
    /// slot in the innermost table.
    pub fn assign(&mut self, name: &str) -> (usize, usize) {
        match self.lookup(name) {
            Some(found) => found,
            None => (0, self.current().set(name)),
        }
    }

    /// Allocates `name` in the innermost table even when an outer one has it.
    pub fn declare(&mut self, name: &str) -> usize {
        self.current().set(name)
    }

    pub fn enter(&mut self) {
        self.tables.push(LocalTable::default());
    }

    pub fn leave(&mut self) {
        if self.tables.len() > 1 {
            self.tables.pop();
        }
    }

    fn current(&mut self) -> &mut LocalTable {
        if self.tables.is_empty() {
            self.tables.push(LocalTable::default());
        }
        let last = self.tables.len() - 1;
        &mut self.tables[last]
    }
}

#[derive(Clone, Copy)]
struct LoopAnchors {
    next: Anchor,
    exit: Anchor,
}

/// One instruction set under construction.
struct Unit {
    asm: Assembler,
    loops: Option<LoopAnchors>,
}

impl Unit {
    fn new(name: impl Into<String>, kind: SetKind) -> Self {
        Self {
            asm: Assembler::new(name, kind),
            loops: None,
        }
    }

    fn at(&mut self, line: usize) -> &mut Assembler {
        self.asm.set_line(line);
        &mut self.asm
    }

    fn finish(self) -> GResult<Arc<InstructionSet>> {
        Ok(Arc::new(self.asm.finish()?))
    }
}

/// Lowers an AST to instruction sets. In REPL mode the top-level locals
/// survive between calls to `generate`.
pub struct Generator {
    repl: bool,
    block_counter: usize,
    top_level: Locals,
}

impl Generator {
    pub fn new(repl: bool) -> Self {
        Self {
            repl,
            block_counter: 0,
            top_level: Locals::default(),
        }
    }

    pub fn reset(&mut self) {
        self.block_counter = 0;
        self.top_level = Locals::default();
    }

    /// Number of top-level variable slots allocated so far.
    pub fn top_level_slots(&self) -> usize {
        self.top_level.tables.first().map_or(0, LocalTable::len)
    }

    pub fn generate(&mut self, program: &Program) -> GResult<InstructionSet> {
        let mut locals = std::mem::take(&mut self.top_level);
        let result = self.program(program, &mut locals);
        self.top_level = locals;
        result
    }

    fn program(&mut self, program: &Program, locals: &mut Locals) -> GResult<InstructionSet> {
        let mut unit = Unit::new(PROGRAM_SET, SetKind::Program);
        for statement in &program.statements {
            self.statement(&mut unit, locals, statement)?;
        }
        if !self.repl {
            let line = program.statements.last().map_or(1, |last| last.line);
            unit.at(line).leave();
        }
        unit.asm.finish()
    }

    fn statement(&mut self, unit: &mut Unit, locals: &mut Locals, statement: &Statement) -> GResult {
        let line = statement.line;
        match &statement.kind {
            StmtKind::Expression(expression) => {
                self.expression(unit, locals, expression)?;
                if expression.is_stmt {
                    unit.at(line).pop();
                }
            }
            StmtKind::Def {
                receiver,
                name,
                parameters,
                body,
            } => self.def(unit, locals, receiver.as_ref(), name, parameters, body, line)?,
            StmtKind::Class {
                name,
                super_class,
                super_class_name,
                body,
            } => {
                let parent = super_class
                    .as_ref()
                    .map(|expr| (expr, super_class_name.clone().unwrap_or_else(|| expr.to_string())));
                self.class(unit, locals, "class", name, parent, body, line)?;
            }
            StmtKind::Module { name, body } => {
                self.class(unit, locals, "module", name, None, body, line)?
            }
            StmtKind::Return(value) => {
                self.expression(unit, locals, value)?;
                unit.at(line).leave();
            }
            StmtKind::While { condition, body } => {
                self.while_loop(unit, locals, condition, body, line)?
            }
            StmtKind::Continue => match unit.loops {
                Some(anchors) => unit.at(line).jump(anchors.next),
                None => {
                    let asm = unit.at(line);
                    asm.put_nil();
                    asm.leave();
                }
            },
            StmtKind::Break => match unit.loops {
                Some(anchors) => unit.at(line).jump(anchors.exit),
                None => unit.at(line).break_frame(),
            },
        }
        Ok(())
    }

    /// Statements whose values are discarded.
    fn body(&mut self, unit: &mut Unit, locals: &mut Locals, block: &BlockStatement) -> GResult {
        for statement in &block.statements {
            self.statement(unit, locals, statement)?;
        }
        Ok(())
    }

    /// Statements leaving exactly one value: the last expression, or nil.
    fn value_body(
        &mut self,
        unit: &mut Unit,
        locals: &mut Locals,
        block: &BlockStatement,
    ) -> GResult {
        self.body(unit, locals, block)?;
        if !block.ends_with_value() {
            let line = block.statements.last().map_or(block.line, |last| last.line);
            unit.at(line).put_nil();
        }
        Ok(())
    }

    fn while_loop(
        &mut self,
        unit: &mut Unit,
        locals: &mut Locals,
        condition: &Expression,
        body: &BlockStatement,
        line: usize,
    ) -> GResult {
        let check = unit.asm.new_anchor();
        let exit = unit.asm.new_anchor();
        let start = unit.asm.new_anchor();

        unit.at(line).jump(check);
        unit.asm.bind(start)?;

        let outer = unit.loops.replace(LoopAnchors { next: check, exit });
        let result = self.body(unit, locals, body);
        unit.loops = outer;
        result?;

        unit.asm.bind(check)?;
        self.expression(unit, locals, condition)?;
        unit.at(line).branch_if(start);
        unit.asm.bind(exit)
    }

    #[allow(clippy::too_many_arguments)]
    fn def(
        &mut self,
        unit: &mut Unit,
        locals: &mut Locals,
        receiver: Option<&Expression>,
        name: &str,
        parameters: &[Expression],
        body: &BlockStatement,
        line: usize,
    ) -> GResult {
        let mut method = Unit::new(name, SetKind::Method);
        let mut scope = Locals::default();

        // parameters occupy the first slots, in order
        for parameter in parameters {
            if let Some(param) = parameter_name(parameter) {
                scope.declare(param);
            }
        }

        for parameter in parameters {
            let Some(param) = parameter_name(parameter) else {
                continue;
            };
            let (depth, index) = scope.assign(param);
            let kind = match &parameter.kind {
                ExprKind::Assign { value, .. } => {
                    self.expression(&mut method, &mut scope, value)?;
                    method.at(parameter.line).set_optional(depth, index);
                    ArgType::Optioned
                }
                ExprKind::Prefix { .. } => {
                    let asm = method.at(parameter.line);
                    asm.new_array(0);
                    asm.set_optional(depth, index);
                    ArgType::Splat
                }
                ExprKind::ArgumentPair {
                    value: Some(value), ..
                } => {
                    self.expression(&mut method, &mut scope, value)?;
                    method.at(parameter.line).set_optional(depth, index);
                    ArgType::OptionalKeyword
                }
                ExprKind::ArgumentPair { value: None, .. } => ArgType::RequiredKeyword,
                _ => ArgType::Normal,
            };
            method.asm.arg_types_mut().push(param, kind);
        }

        self.value_body(&mut method, &mut scope, body)?;
        method.at(line).leave();
        let set = method.finish()?;

        match receiver {
            None => {
                let asm = unit.at(line);
                asm.put_self();
                asm.def_method(parameters.len(), name, set, false);
            }
            Some(receiver) => {
                self.expression(unit, locals, receiver)?;
                unit.at(line).def_method(parameters.len(), name, set, true);
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn class(
        &mut self,
        unit: &mut Unit,
        locals: &mut Locals,
        kind: &str,
        name: &str,
        parent: Option<(&Expression, String)>,
        body: &BlockStatement,
        line: usize,
    ) -> GResult {
        let mut class_body = Unit::new(name, SetKind::Class);
        let mut scope = Locals::default();
        self.body(&mut class_body, &mut scope, body)?;
        class_body.at(line).leave();
        let set = class_body.finish()?;

        unit.at(line).put_self();
        let super_name = match parent {
            Some((expression, super_name)) => {
                self.expression(unit, locals, expression)?;
                super_name
            }
            None => NO_SUPER_CLASS.to_string(),
        };
        let asm = unit.at(line);
        asm.def_class(kind, name, set, &super_name);
        asm.pop();
        tracing::trace!(kind, name, "lowered class body");
        Ok(())
    }

    fn expression(
        &mut self,
        unit: &mut Unit,
        locals: &mut Locals,
        expression: &Expression,
    ) -> GResult {
        let line = expression.line;
        match &expression.kind {
            ExprKind::Integer(value) => unit.at(line).put_int(*value),
            ExprKind::Float(value) => unit.at(line).put_float(*value),
            ExprKind::String(value) => unit.at(line).put_string(value),
            ExprKind::Boolean(value) => unit.at(line).put_bool(*value),
            ExprKind::Nil => unit.at(line).put_nil(),
            ExprKind::Array(items) | ExprKind::MultiVariable(items) => {
                for item in items {
                    self.expression(unit, locals, item)?;
                }
                unit.at(line).new_array(items.len());
            }
            ExprKind::Hash(pairs) => {
                for (key, value) in pairs {
                    unit.at(line).put_string(key);
                    self.expression(unit, locals, value)?;
                }
                unit.at(line).new_hash(pairs.len() * 2);
            }
            ExprKind::Range {
                start,
                end,
                exclusive,
            } => {
                self.expression(unit, locals, start)?;
                self.expression(unit, locals, end)?;
                unit.at(line).new_range(*exclusive);
            }
            ExprKind::Identifier(name) => match locals.lookup(name) {
                Some((depth, index)) => unit.at(line).get_local(depth, index),
                None => {
                    let asm = unit.at(line);
                    asm.put_self();
                    asm.send(name, 0, None, None);
                }
            },
            ExprKind::InstanceVariable(name) => unit.at(line).get_instance_variable(name),
            ExprKind::Constant { name, is_namespace } => {
                unit.at(line).get_constant(name, *is_namespace)
            }
            ExprKind::Prefix { operator, right } => {
                self.prefix(unit, locals, operator, right, line)?
            }
            ExprKind::Infix {
                left,
                operator,
                right,
            } => self.infix(unit, locals, left, operator, right, line)?,
            ExprKind::Assign { variables, value } => {
                self.assign(unit, locals, variables, value, line)?
            }
            ExprKind::Call(call) => self.call(unit, locals, call, line)?,
            ExprKind::ArgumentPair { value, .. } => match value {
                Some(value) => self.expression(unit, locals, value)?,
                None => unit.at(line).put_nil(),
            },
            ExprKind::Yield(arguments) => {
                unit.at(line).put_self();
                for argument in arguments {
                    self.expression(unit, locals, argument)?;
                }
                unit.at(line).invoke_block(arguments.len());
            }
            ExprKind::GetBlock => unit.at(line).get_block(),
            ExprKind::HasBlock => unit.at(line).has_block(),
            ExprKind::SelfRef { is_super } => {
                if *is_super {
                    unit.at(line).put_super();
                } else {
                    unit.at(line).put_self();
                }
            }
            ExprKind::If {
                conditionals,
                alternative,
            } => self.if_expression(unit, locals, conditionals, alternative.as_ref(), line)?,
        }
        Ok(())
    }

    fn prefix(
        &mut self,
        unit: &mut Unit,
        locals: &mut Locals,
        operator: &str,
        right: &Expression,
        line: usize,
    ) -> GResult {
        match operator {
            "-" => {
                unit.at(line).put_int(0);
                self.expression(unit, locals, right)?;
                unit.at(line).send("-", 1, None, None);
            }
            "<-" | "->" => {
                unit.at(line).put_self();
                self.expression(unit, locals, right)?;
                unit.at(line).send(operator, 1, None, None);
            }
            _ => {
                self.expression(unit, locals, right)?;
                let asm = unit.at(line);
                match operator {
                    "*" => asm.splat_array(),
                    "&" => asm.splat_block(),
                    "+" => {}
                    other => asm.send(other, 0, None, None),
                }
            }
        }
        Ok(())
    }

    fn infix(
        &mut self,
        unit: &mut Unit,
        locals: &mut Locals,
        left: &Expression,
        operator: &str,
        right: &Expression,
        line: usize,
    ) -> GResult {
        match operator {
            "::" => {
                self.expression(unit, locals, left)?;
                self.expression(unit, locals, right)?;
            }
            "&&" | "||" => {
                let end = unit.asm.new_anchor();
                self.expression(unit, locals, left)?;
                let asm = unit.at(line);
                asm.dup();
                if operator == "&&" {
                    asm.branch_unless(end);
                } else {
                    asm.branch_if(end);
                }
                asm.pop();
                self.expression(unit, locals, right)?;
                unit.asm.bind(end)?;
            }
            _ => {
                self.expression(unit, locals, left)?;
                self.expression(unit, locals, right)?;
                unit.at(line).binary(operator);
            }
        }
        Ok(())
    }

    fn assign(
        &mut self,
        unit: &mut Unit,
        locals: &mut Locals,
        variables: &[Expression],
        value: &Expression,
        line: usize,
    ) -> GResult {
        self.expression(unit, locals, value)?;
        if variables.len() > 1 {
            unit.at(line).expand_array(variables.len());
        }
        for (position, variable) in variables.iter().enumerate() {
            match &variable.kind {
                ExprKind::Identifier(name) if name == "_" => {}
                ExprKind::Identifier(name) => {
                    let (depth, index) = locals.assign(name);
                    unit.at(line).set_local(depth, index);
                }
                ExprKind::InstanceVariable(name) => unit.at(line).set_instance_variable(name),
                ExprKind::Constant { name, .. } => unit.at(line).set_constant(name),
                _ => {}
            }
            if position + 1 < variables.len() {
                unit.at(line).pop();
            }
        }
        Ok(())
    }

    fn call(
        &mut self,
        unit: &mut Unit,
        locals: &mut Locals,
        call: &CallExpression,
        line: usize,
    ) -> GResult {
        self.expression(unit, locals, &call.receiver)?;

        let mut args = ArgSet::default();
        for argument in &call.arguments {
            let (name, kind) = argument_kind(argument);
            args.push(name, kind);
            self.expression(unit, locals, argument)?;
        }

        let block = match &call.block {
            Some(block) => Some(self.block(locals, block, &call.block_arguments, line)?),
            None => None,
        };

        let asm = unit.at(line);
        if call.method == "defer" {
            asm.defer(call.arguments.len(), block);
        } else {
            asm.send(&call.method, call.arguments.len(), block, Some(args));
        }
        Ok(())
    }

    fn block(
        &mut self,
        locals: &mut Locals,
        body: &BlockStatement,
        parameters: &[String],
        line: usize,
    ) -> GResult<Arc<InstructionSet>> {
        let name = self.block_counter.to_string();
        self.block_counter += 1;

        let mut unit = Unit::new(name, SetKind::Block);
        locals.enter();
        for parameter in parameters {
            locals.declare(parameter);
            unit.asm.arg_types_mut().push(parameter.as_str(), ArgType::Normal);
        }
        let result = self.value_body(&mut unit, locals, body);
        locals.leave();
        result?;

        unit.at(line).leave();
        unit.finish()
    }

    fn if_expression(
        &mut self,
        unit: &mut Unit,
        locals: &mut Locals,
        conditionals: &[Conditional],
        alternative: Option<&BlockStatement>,
        line: usize,
    ) -> GResult {
        let last = unit.asm.new_anchor();
        for conditional in conditionals {
            let next = unit.asm.new_anchor();
            self.expression(unit, locals, &conditional.condition)?;
            unit.at(line).branch_unless(next);
            self.value_body(unit, locals, &conditional.consequence)?;
            unit.at(line).jump(last);
            unit.asm.bind(next)?;
        }
        match alternative {
            Some(alternative) => self.value_body(unit, locals, alternative)?,
            None => unit.at(line).put_nil(),
        }
        unit.asm.bind(last)
    }
}

fn argument_kind(argument: &Expression) -> (String, ArgType) {
    match &argument.kind {
        ExprKind::Identifier(name) => (name.clone(), ArgType::Normal),
        ExprKind::Assign { variables, .. } => (
            variables
                .first()
                .and_then(Expression::identifier_name)
                .unwrap_or_default()
                .to_string(),
            ArgType::Optioned,
        ),
        ExprKind::ArgumentPair { key, value } => (
            key.clone(),
            if value.is_some() {
                ArgType::OptionalKeyword
            } else {
                ArgType::RequiredKeyword
            },
        ),
        ExprKind::Prefix { operator, right } if operator == "*" => (
            right.identifier_name().unwrap_or_default().to_string(),
            ArgType::Splat,
        ),
        _ => (String::new(), ArgType::Normal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_reuses_outer_slots() {
        let mut locals = Locals::default();
        assert_eq!(locals.assign("a"), (0, 0));
        locals.enter();
        assert_eq!(locals.assign("a"), (1, 0));
        assert_eq!(locals.assign("b"), (0, 0));
        locals.enter();
        assert_eq!(locals.lookup("b"), Some((1, 0)));
        assert_eq!(locals.lookup("a"), Some((2, 0)));
        locals.leave();
        locals.leave();
        assert_eq!(locals.lookup("b"), None);
    }

    #[test]
    fn declare_shadows_outer_names() {
        let mut locals = Locals::default();
        locals.assign("x");
        locals.enter();
        assert_eq!(locals.declare("x"), 0);
        assert_eq!(locals.lookup("x"), Some((0, 0)));
    }

    #[test]
    fn table_indices_are_dense() {
        let mut table = LocalTable::default();
        assert_eq!(table.set("a"), 0);
        assert_eq!(table.set("b"), 1);
        assert_eq!(table.set("a"), 0);
        assert_eq!(table.len(), 2);
    }
}
