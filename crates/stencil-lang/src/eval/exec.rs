use itertools::Itertools;
use smol_str::SmolStr;

use crate::{
    Shared,
    ast::{AssignScope, Block, Case, Expr, InstrKind, Instruction, MacroKind, ParameterList, Template},
    error::{Error, EvaluationError, RuntimeError},
    ident::Ident,
    range::Range,
    value::{Callable, Curried, MacroRef, Value},
};

use super::{
    debugger::{DebugContext, DebuggerAction},
    env::{Activation, Environment, NestedContent},
    params::{self, ArgValues},
    resolver::resolve_name,
};

/// How execution of an instruction ended. Everything but `Continue` unwinds
/// to the construct that handles it.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Continue,
    /// Handled by the nearest loop or switch.
    Break,
    /// Handled by the nearest macro or function invocation.
    Return(Option<Value>),
    /// Handled by the top-level render.
    Stop(Option<String>),
}

impl Environment<'_> {
    /// Renders the main template into the output sink.
    pub fn process(&mut self) -> Result<(), Error> {
        let template = Shared::clone(&self.main_template);
        tracing::debug!(template = %template.name, "render started");

        match self.render(&template) {
            Ok(()) => {
                tracing::debug!(template = %template.name, "render finished");
                Ok(())
            }
            Err(cause) => {
                tracing::debug!(template = %template.name, error = %cause, "render failed");
                let origin = self.error_template.take().unwrap_or(template);
                Err(Error::from_error(
                    origin.name.clone(),
                    origin.source.as_deref(),
                    cause,
                ))
            }
        }
    }

    fn render(&mut self, template: &Template) -> Result<(), RuntimeError> {
        for (name, value) in &template.header {
            self.apply_setting(name, value)?;
        }
        self.register_macros(template, self.main_namespace);

        let flow = self.exec_block(&template.root)?;
        self.flush()?;

        match flow {
            Flow::Continue => Ok(()),
            Flow::Break => Err(RuntimeError::BreakOutsideLoop(self.location)),
            Flow::Return(_) => Err(RuntimeError::ReturnOutsideMacro(self.location)),
            Flow::Stop(message) => Err(RuntimeError::Stopped(self.location, message)),
        }
    }

    pub(crate) fn exec_block(&mut self, block: &[Instruction]) -> Result<Flow, RuntimeError> {
        for instruction in block {
            let flow = self.exec(instruction)?;
            if !matches!(flow, Flow::Continue) {
                return Ok(flow);
            }
        }
        Ok(Flow::Continue)
    }

    fn exec(&mut self, instruction: &Instruction) -> Result<Flow, RuntimeError> {
        self.location = instruction.range;

        if self.debugger.is_some() {
            if let Some(flow) = self.check_debugger(instruction) {
                return Ok(flow);
            }
        }

        match &instruction.kind {
            InstrKind::Text(text) => self.write(text)?,
            InstrKind::Interpolation(expr) => {
                let text = self.eval_text(expr)?;
                self.write(&text)?;
            }
            InstrKind::Block(body) => return self.exec_block(body),
            InstrKind::If(branches) => {
                for branch in branches {
                    if let Some(condition) = &branch.condition {
                        if !self.is_true(condition)? {
                            continue;
                        }
                    }
                    return self.exec_block(&branch.body);
                }
            }
            InstrKind::Switch { subject, cases } => return self.exec_switch(subject, cases),
            InstrKind::List {
                sequence,
                var,
                body,
                otherwise,
            } => return self.exec_list(sequence, *var, body, otherwise.as_deref()),
            InstrKind::Break => return Ok(Flow::Break),
            InstrKind::Return(value) => {
                let value = value.as_ref().map(|e| self.eval_strict(e)).transpose()?;
                return Ok(Flow::Return(value));
            }
            InstrKind::Stop(message) => {
                let message = message.as_ref().map(|e| self.eval_text(e)).transpose()?;
                return Ok(Flow::Stop(message));
            }
            InstrKind::Assign { scope, targets } => {
                for (name, expr) in targets {
                    let value = self.eval_strict(expr)?;
                    self.assign(*scope, *name, value)?;
                }
            }
            InstrKind::BlockAssign { scope, name, body } => {
                let (text, flow) = self.capture(|env| env.exec_block(body));
                let flow = flow?;
                self.assign(*scope, *name, Value::from(text))?;
                return Ok(flow);
            }
            InstrKind::MacroDef(def) => {
                let namespace = self.current_namespace();
                let callable = Callable::Macro(MacroRef {
                    def: Shared::clone(def),
                    namespace,
                });
                self.namespaces[namespace]
                    .vars
                    .insert(def.name, Value::Callable(callable));
            }
            InstrKind::MacroCall {
                callee,
                args,
                body,
                loop_vars,
            } => {
                let nested = body.as_ref().map(|body| NestedContent {
                    body: Shared::clone(body),
                    loop_vars: loop_vars.clone(),
                });
                return self.exec_macro_call(callee, args, nested, instruction.range);
            }
            InstrKind::Nested(args) => return self.exec_nested(args),
            InstrKind::Attempt { attempt, recover } => return self.exec_attempt(attempt, recover),
            InstrKind::Include(name) => return self.exec_include(name),
            InstrKind::Import {
                template,
                namespace,
            } => return self.exec_import(template, *namespace),
            InstrKind::Setting { name, value } => {
                let value = self.eval_text(value)?;
                self.apply_setting(name, &value)?;
            }
            InstrKind::Flush => self.flush()?,
            InstrKind::Malformed(message) => {
                return Err(RuntimeError::Template(
                    instruction.range,
                    message.to_string(),
                ));
            }
        }

        Ok(Flow::Continue)
    }

    /// Runs from the first matching case (or the default) until a `Break`.
    fn exec_switch(&mut self, subject: &Expr, cases: &[Case]) -> Result<Flow, RuntimeError> {
        let subject = self.eval_strict(subject)?;

        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(value) = &case.value {
                let value = self.eval_strict(value)?;
                if self.values_equal(&subject, &value) {
                    start = Some(i);
                    break;
                }
            }
        }
        let Some(start) = start.or_else(|| cases.iter().position(|c| c.value.is_none())) else {
            return Ok(Flow::Continue);
        };

        for case in &cases[start..] {
            match self.exec_block(&case.body)? {
                Flow::Continue => {}
                Flow::Break => return Ok(Flow::Continue),
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::String(x), Value::String(y)) => self.collator.equals(x, y),
            (Value::Number(x), Value::Number(y)) => self.engine.compare(x, y).is_eq(),
            _ => a == b,
        }
    }

    fn exec_list(
        &mut self,
        sequence: &Expr,
        var: Ident,
        body: &Block,
        otherwise: Option<&[Instruction]>,
    ) -> Result<Flow, RuntimeError> {
        let value = self.eval_strict(sequence)?;
        let items: Box<dyn Iterator<Item = Value>> = match value {
            Value::Sequence(items) => Box::new(items.as_ref().clone().into_iter()),
            Value::Hash(hash) => Box::new(
                hash.keys()
                    .cloned()
                    .map(Value::String)
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            Value::Range(range) if range.size().is_none() => Box::new(range.iter().map(Value::from)),
            Value::Range(range) => Box::new(range.iter().map(Value::from).collect::<Vec<_>>().into_iter()),
            other => {
                return Err(RuntimeError::Evaluation(
                    sequence.range,
                    EvaluationError::Unsupported(format!(
                        "Expected a sequence, hash or range, but \"{}\" has evaluated to {}",
                        sequence,
                        other.type_name()
                    )),
                ));
            }
        };
        let mut items = items.peekable();

        if items.peek().is_none() {
            return match otherwise {
                Some(block) => self.exec_block(block),
                None => Ok(Flow::Continue),
            };
        }

        let index_var = var.with_suffix("_index");
        let has_next_var = var.with_suffix("_has_next");

        self.with_loop_frame(|env| {
            let mut index = 0usize;
            while let Some(item) = items.next() {
                env.set_loop_var(var, item);
                env.set_loop_var(index_var, Value::from(index));
                env.set_loop_var(has_next_var, Value::Boolean(items.peek().is_some()));

                match env.exec_block(body)? {
                    Flow::Continue => {}
                    Flow::Break => break,
                    flow => return Ok(flow),
                }
                index += 1;
            }
            Ok(Flow::Continue)
        })
    }

    fn exec_macro_call(
        &mut self,
        callee: &Expr,
        args: &crate::ast::ArgsList,
        nested: Option<NestedContent>,
        range: Range,
    ) -> Result<Flow, RuntimeError> {
        let value = self.eval_strict(callee)?;
        let Value::Callable(callable) = value else {
            return Err(RuntimeError::Evaluation(
                range,
                EvaluationError::Unsupported(format!(
                    "\"{}\" is not a macro, it has evaluated to {}",
                    callee,
                    value.type_name()
                )),
            ));
        };
        let args = self.eval_args(args)?;

        let (base, params) = match &callable {
            Callable::Macro(base) => (base, &base.def.params),
            Callable::Curried(curried) => match curried.as_ref() {
                Curried::Macro { base, params } => (base, params.as_ref()),
                Curried::Method { .. } => return self.exec_method_directive(&callable, args, callee, range),
            },
            Callable::Method(_) => return self.exec_method_directive(&callable, args, callee, range),
            Callable::Lambda(_) => {
                return Err(RuntimeError::Evaluation(
                    range,
                    EvaluationError::Unsupported(format!(
                        "Lambda \"{}\" cannot be called as a directive",
                        callable.name()
                    )),
                ));
            }
        };

        if base.def.kind == MacroKind::Function {
            return Err(RuntimeError::Evaluation(
                range,
                EvaluationError::Unsupported(format!(
                    "Function \"{}\" can only be called from an expression",
                    base.def.name
                )),
            ));
        }

        match self.invoke_macro(base, params, args, nested, range)? {
            Flow::Stop(message) => Ok(Flow::Stop(message)),
            _ => Ok(Flow::Continue),
        }
    }

    /// A host method used as a directive renders its result.
    fn exec_method_directive(
        &mut self,
        callable: &Callable,
        args: ArgValues,
        callee: &Expr,
        range: Range,
    ) -> Result<Flow, RuntimeError> {
        let value = self.call(callable, args, range)?;
        if !value.is_missing() {
            let text = self.to_text(&value, callee)?;
            self.write(&text)?;
        }
        Ok(Flow::Continue)
    }

    /// Binds `args` and runs the body of `macro_ref` in a new activation.
    pub(crate) fn invoke_macro(
        &mut self,
        macro_ref: &MacroRef,
        params: &ParameterList,
        args: ArgValues,
        nested: Option<NestedContent>,
        range: Range,
    ) -> Result<Flow, RuntimeError> {
        self.enter_call()?;
        let mut env = scopeguard::guard(self, |env| env.exit_call());

        let name = macro_ref.def.name.as_str();
        tracing::trace!(name = %name, depth = env.call_depth, "invoking macro");

        let locals = params::bind(&name, params, args, range)?;
        let caller = env.current;
        let activation = Activation::invocation(name, macro_ref.namespace, locals, caller, nested);

        env.with_activation(activation, |env| {
            params::resolve_defaults(env, params)?;
            match env.exec_block(&macro_ref.def.body)? {
                Flow::Break => Err(RuntimeError::BreakOutsideLoop(env.location)),
                flow => Ok(flow),
            }
        })
    }

    /// Renders the body passed to the current macro, in the caller's context.
    fn exec_nested(&mut self, args: &[crate::Shared<Expr>]) -> Result<Flow, RuntimeError> {
        let activation = self.current_activation();
        let (Some(caller), Some(nested)) = (activation.caller, activation.nested.clone()) else {
            return Ok(Flow::Continue);
        };

        let values = args
            .iter()
            .map(|e| self.eval(e))
            .collect::<Result<Vec<_>, _>>()?;

        self.with_current(caller, |env| {
            env.with_loop_frame(|env| {
                for (name, value) in nested.loop_vars.iter().zip(values) {
                    env.set_loop_var(*name, value);
                }
                env.exec_block(&nested.body)
            })
        })
    }

    /// Output of `attempt` is kept only when it completes. Stops are never
    /// recovered.
    fn exec_attempt(&mut self, attempt: &Block, recover: &Block) -> Result<Flow, RuntimeError> {
        let (text, result) = self.capture(|env| env.exec_block(attempt));

        match result {
            Ok(flow) => {
                self.write(&text)?;
                Ok(flow)
            }
            Err(e @ RuntimeError::Stopped(..)) => {
                self.write(&text)?;
                Err(e)
            }
            Err(e) => {
                tracing::debug!(error = %e, location = %e.location(), "recovering from error");
                self.error_template = None;
                self.recovered.push(e.to_string());

                let mut env = scopeguard::guard(self, |env| {
                    env.recovered.pop();
                });
                env.exec_block(recover)
            }
        }
    }

    fn load_template(&self, name: &str) -> Result<Shared<Template>, RuntimeError> {
        self.resolver
            .resolve(name, &self.template.name)
            .map_err(|e| RuntimeError::TemplateLoad(self.location, name.to_string(), e.to_string()))
    }

    /// Records the innermost template an error escaped from.
    fn escaped_from(&mut self, template: &Shared<Template>, error: RuntimeError) -> RuntimeError {
        if self.error_template.is_none() {
            self.error_template = Some(Shared::clone(template));
        }
        error
    }

    fn exec_include(&mut self, name: &Expr) -> Result<Flow, RuntimeError> {
        let name = self.eval_text(name)?;
        let template = self.load_template(&name)?;
        tracing::debug!(template = %template.name, "including template");

        let included = Shared::clone(&template);
        self.with_settings(|env| {
            env.with_template(Shared::clone(&included), |env| {
                for (name, value) in &included.header {
                    env.apply_setting(name, value)?;
                }
                env.register_macros(&included, env.current_namespace());
                env.exec_block(&included.root)
            })
        })
        .map_err(|e| self.escaped_from(&template, e))
    }

    /// Runs a template once in its own namespace and binds that namespace.
    fn exec_import(&mut self, name: &Expr, bind_as: Ident) -> Result<Flow, RuntimeError> {
        let name = self.eval_text(name)?;
        let resolved = SmolStr::new(resolve_name(&name, &self.template.name));

        let namespace = match self.imports.get(&resolved) {
            Some(namespace) => *namespace,
            None => {
                let template = self.load_template(&name)?;
                let namespace = self.new_namespace(template.name.clone());
                // Registered up front so cyclic imports see the namespace.
                self.imports.insert(resolved.clone(), namespace);
                tracing::debug!(template = %template.name, "importing template");

                self.register_macros(&template, namespace);
                let imported = Shared::clone(&template);
                let flow = self
                    .discard(|env| {
                        env.with_settings(|env| {
                            env.with_template(Shared::clone(&imported), |env| {
                                env.with_activation(Activation::root(namespace), |env| {
                                    env.exec_block(&imported.root)
                                })
                            })
                        })
                    })
                    .map_err(|e| {
                        self.imports.remove(&resolved);
                        self.escaped_from(&template, e)
                    })?;
                if let Flow::Stop(message) = flow {
                    return Ok(Flow::Stop(message));
                }
                namespace
            }
        };

        self.assign(AssignScope::Namespace, bind_as, Value::Namespace(namespace))?;
        Ok(Flow::Continue)
    }

    fn check_debugger(&mut self, instruction: &Instruction) -> Option<Flow> {
        let pause = self
            .debugger
            .as_ref()?
            .pause_at(&self.template.name, &instruction.range)?;
        let context = self.debug_context(instruction);

        match self.debugger.as_mut()?.paused(&pause, &context) {
            DebuggerAction::Stop(message) => Some(Flow::Stop(message)),
            _ => None,
        }
    }

    fn debug_context(&self, instruction: &Instruction) -> DebugContext {
        let activation = self.current_activation();
        let locals = activation.is_macro.then_some(&activation.locals);

        let variables = activation
            .loops
            .iter()
            .rev()
            .chain(locals)
            .chain(std::iter::once(&self.namespaces[activation.namespace].vars))
            .flat_map(|frame| frame.iter().sorted_by_key(|(name, _)| name.as_str()))
            .unique_by(|(name, _)| **name)
            .map(|(name, value)| (name.as_str(), value.clone()))
            .collect();

        DebugContext {
            template_name: self.template.name.clone(),
            range: instruction.range,
            instruction: instruction.name(),
            call_stack: self.activations[..=self.current]
                .iter()
                .filter(|a| a.is_macro)
                .map(|a| a.name.clone())
                .collect(),
            variables,
        }
    }
}
