use std::{fmt, io};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    Shared,
    arena::{Arena, ArenaId},
    ast::{AssignScope, Block, Template},
    error::RuntimeError,
    format::Formatter,
    ident::Ident,
    number::{self, ArithmeticEngine},
    range::Range,
    settings::Settings,
    value::{MacroRef, Value, Callable},
};

use super::{
    debugger::Debugger,
    resolver::{MapResolver, TemplateResolver},
};

/// A mutable variable frame.
pub type Frame = FxHashMap<Ident, Value>;

/// Top-level variables of one template: the main template's, or those of a
/// template brought in by `Import`.
#[derive(Debug, Default)]
pub struct Namespace {
    pub name: SmolStr,
    pub vars: Frame,
}

pub type NamespaceId = ArenaId<Namespace>;

/// Destination of rendered text.
pub trait Output {
    fn write_str(&mut self, s: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Output for String {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.push_str(s);
        Ok(())
    }
}

/// Adapts any [`io::Write`] into an [`Output`].
#[derive(Debug)]
pub struct WriteOutput<W: io::Write> {
    inner: W,
}

impl<W: io::Write> WriteOutput<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> Output for WriteOutput<W> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.inner.write_all(s.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// String equality used by `==` and `!=` on strings.
pub trait Collator: fmt::Debug + Send + Sync {
    fn equals(&self, a: &str, b: &str) -> bool;
}

/// Compares code point by code point.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrdinalCollator;

impl Collator for OrdinalCollator {
    fn equals(&self, a: &str, b: &str) -> bool {
        a == b
    }
}

/// Body passed to a macro call, rendered by `Nested` in the caller's context.
#[derive(Debug, Clone)]
pub(crate) struct NestedContent {
    pub(crate) body: Shared<Block>,
    pub(crate) loop_vars: Vec<Ident>,
}

/// One entry of the context stack: the top-level render, an import, or a
/// macro or function invocation.
#[derive(Debug)]
pub(crate) struct Activation {
    pub(crate) name: SmolStr,
    pub(crate) is_macro: bool,
    pub(crate) namespace: NamespaceId,
    pub(crate) locals: Frame,
    /// Innermost loop last.
    pub(crate) loops: Vec<Frame>,
    /// Activation whose nested content `Nested` renders.
    pub(crate) caller: Option<usize>,
    pub(crate) nested: Option<NestedContent>,
}

impl Activation {
    pub(crate) fn root(namespace: NamespaceId) -> Self {
        Self {
            name: SmolStr::default(),
            is_macro: false,
            namespace,
            locals: Frame::default(),
            loops: Vec::new(),
            caller: None,
            nested: None,
        }
    }

    pub(crate) fn invocation(
        name: SmolStr,
        namespace: NamespaceId,
        locals: Frame,
        caller: usize,
        nested: Option<NestedContent>,
    ) -> Self {
        Self {
            name,
            is_macro: true,
            namespace,
            locals,
            loops: Vec::new(),
            caller: Some(caller),
            nested,
        }
    }
}

#[derive(Debug)]
enum Capture {
    Buffer(String),
    Discard,
}

/// State of one render.
///
/// Every nested context (macro invocation, nested body, capture, include,
/// import) is entered through a `with_*` method that restores the previous
/// state when it returns, including on error.
pub struct Environment<'a> {
    pub(crate) settings: Settings,
    pub(crate) formatter: Formatter,
    pub(crate) engine: Shared<dyn ArithmeticEngine>,
    pub(crate) collator: Shared<dyn Collator>,
    pub(crate) data_model: Value,
    pub(crate) globals: Frame,
    pub(crate) namespaces: Arena<Namespace>,
    pub(crate) main_namespace: NamespaceId,
    pub(crate) activations: Vec<Activation>,
    pub(crate) current: usize,
    pub(crate) resolver: Shared<dyn TemplateResolver>,
    pub(crate) main_template: Shared<Template>,
    pub(crate) template: Shared<Template>,
    /// Messages of the errors being recovered from, innermost last.
    pub(crate) recovered: Vec<String>,
    pub(crate) imports: FxHashMap<SmolStr, NamespaceId>,
    pub(crate) debugger: Option<Debugger>,
    pub(crate) call_depth: u32,
    /// Range of the instruction being executed.
    pub(crate) location: Range,
    /// Template an escaping error was raised in, when not the main one.
    pub(crate) error_template: Option<Shared<Template>>,
    captures: Vec<Capture>,
    out: &'a mut dyn Output,
}

impl fmt::Debug for Environment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("template", &self.template.name)
            .field("current", &self.current)
            .field("call_depth", &self.call_depth)
            .field("namespaces", &self.namespaces.len())
            .finish()
    }
}

impl<'a> Environment<'a> {
    pub fn new(
        settings: Settings,
        template: Shared<Template>,
        data_model: Value,
        out: &'a mut dyn Output,
    ) -> Result<Self, RuntimeError> {
        let formatter = Formatter::new(&settings)
            .map_err(|message| RuntimeError::Template(Range::default(), message))?;
        let engine = number::engine_for(settings.arithmetic_engine, settings.decimal_scale);

        let mut namespaces = Arena::new(4);
        let main_namespace = namespaces.alloc(Namespace {
            name: template.name.clone(),
            vars: Frame::default(),
        });

        Ok(Self {
            settings,
            formatter,
            engine,
            collator: Shared::new(OrdinalCollator),
            data_model,
            globals: Frame::default(),
            namespaces,
            main_namespace,
            activations: vec![Activation::root(main_namespace)],
            current: 0,
            resolver: Shared::new(MapResolver::default()),
            main_template: Shared::clone(&template),
            template,
            recovered: Vec::new(),
            imports: FxHashMap::default(),
            debugger: None,
            call_depth: 0,
            location: Range::default(),
            error_template: None,
            captures: Vec::new(),
            out,
        })
    }

    pub fn with_resolver(mut self, resolver: Shared<dyn TemplateResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_collator(mut self, collator: Shared<dyn Collator>) -> Self {
        self.collator = collator;
        self
    }

    pub fn with_debugger(mut self, debugger: Debugger) -> Self {
        self.debugger = Some(debugger);
        self
    }

    pub fn debugger_mut(&mut self) -> Option<&mut Debugger> {
        self.debugger.as_mut()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(Ident::new(name), value);
    }

    /// Variable of the main namespace, as left by the render.
    pub fn main_var(&self, name: &str) -> Option<&Value> {
        self.namespaces[self.main_namespace].vars.get(&Ident::new(name))
    }

    /// Unqualified read: loop frames, locals, namespace, globals, then the
    /// data model.
    pub fn lookup(&self, name: Ident) -> Value {
        let activation = &self.activations[self.current];

        if let Some(value) = activation.loops.iter().rev().find_map(|frame| frame.get(&name)) {
            return value.clone();
        }
        if activation.is_macro {
            if let Some(value) = activation.locals.get(&name) {
                return value.clone();
            }
        }
        if let Some(value) = self.namespaces[activation.namespace].vars.get(&name) {
            return value.clone();
        }
        if let Some(value) = self.globals.get(&name) {
            return value.clone();
        }

        match &self.data_model {
            Value::Hash(hash) => name
                .resolve_with(|name| hash.get(name).cloned())
                .unwrap_or_default(),
            Value::Host(object) => super::host_member(object, &name.as_str()).unwrap_or_default(),
            _ => Value::Absent,
        }
    }

    pub(crate) fn assign(
        &mut self,
        scope: AssignScope,
        name: Ident,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let activation = &mut self.activations[self.current];

        match scope {
            AssignScope::Local | AssignScope::Unqualified if activation.is_macro => {
                activation.locals.insert(name, value);
            }
            AssignScope::Local => {
                return Err(RuntimeError::Template(
                    self.location,
                    format!("Local variable \"{name}\" can only be assigned inside a macro or function"),
                ));
            }
            AssignScope::Unqualified | AssignScope::Namespace => {
                let namespace = activation.namespace;
                self.namespaces[namespace].vars.insert(name, value);
            }
            AssignScope::Global => {
                self.globals.insert(name, value);
            }
        }

        Ok(())
    }

    pub(crate) fn current_activation(&self) -> &Activation {
        &self.activations[self.current]
    }

    pub(crate) fn current_namespace(&self) -> NamespaceId {
        self.activations[self.current].namespace
    }

    pub(crate) fn new_namespace(&mut self, name: SmolStr) -> NamespaceId {
        self.namespaces.alloc(Namespace {
            name,
            vars: Frame::default(),
        })
    }

    /// Binds every macro of `template` in `namespace`, so that calls may
    /// precede definitions.
    pub(crate) fn register_macros(&mut self, template: &Template, namespace: NamespaceId) {
        for def in template.macros() {
            let name = def.name;
            let callable = Callable::Macro(MacroRef { def, namespace });
            self.namespaces[namespace]
                .vars
                .insert(name, Value::Callable(callable));
        }
    }

    pub(crate) fn write(&mut self, text: &str) -> Result<(), RuntimeError> {
        match self.captures.last_mut() {
            Some(Capture::Buffer(buffer)) => {
                buffer.push_str(text);
                Ok(())
            }
            Some(Capture::Discard) => Ok(()),
            None => self
                .out
                .write_str(text)
                .map_err(|e| RuntimeError::Io(self.location, e.to_string())),
        }
    }

    pub(crate) fn flush(&mut self) -> Result<(), RuntimeError> {
        if !self.captures.is_empty() {
            return Ok(());
        }
        self.out
            .flush()
            .map_err(|e| RuntimeError::Io(self.location, e.to_string()))
    }

    pub(crate) fn enter_call(&mut self) -> Result<(), RuntimeError> {
        if self.call_depth >= self.settings.max_call_depth {
            return Err(RuntimeError::RecursionLimit(
                self.location,
                self.settings.max_call_depth,
            ));
        }
        self.call_depth += 1;
        Ok(())
    }

    pub(crate) fn exit_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }

    /// Runs `f` with `activation` as the current context.
    pub(crate) fn with_activation<R>(
        &mut self,
        activation: Activation,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous = self.current;
        self.activations.push(activation);
        self.current = self.activations.len() - 1;

        let mut env = scopeguard::guard(self, move |env| {
            env.activations.pop();
            env.current = previous;
        });
        f(&mut **env)
    }

    /// Runs `f` in the context of an enclosing activation, used to render
    /// nested content where the caller's variables are visible.
    pub(crate) fn with_current<R>(&mut self, index: usize, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.current;
        self.current = index;

        let mut env = scopeguard::guard(self, move |env| env.current = previous);
        f(&mut **env)
    }

    /// Runs `f` with a fresh loop frame on the current activation.
    pub(crate) fn with_loop_frame<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let index = self.current;
        self.activations[index].loops.push(Frame::default());

        let mut env = scopeguard::guard(self, move |env| {
            env.activations[index].loops.pop();
        });
        f(&mut **env)
    }

    pub(crate) fn set_loop_var(&mut self, name: Ident, value: Value) {
        if let Some(frame) = self.activations[self.current].loops.last_mut() {
            frame.insert(name, value);
        }
    }

    /// Runs `f` and returns what it wrote instead of writing it.
    pub(crate) fn capture<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> (String, R) {
        self.captures.push(Capture::Buffer(String::new()));

        let mut env = scopeguard::guard(self, |env| {
            env.captures.pop();
        });
        let result = f(&mut **env);
        let text = match env.captures.last_mut() {
            Some(Capture::Buffer(buffer)) => std::mem::take(buffer),
            _ => String::new(),
        };
        (text, result)
    }

    /// Runs `f` with its output dropped.
    pub(crate) fn discard<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.captures.push(Capture::Discard);

        let mut env = scopeguard::guard(self, |env| {
            env.captures.pop();
        });
        f(&mut **env)
    }

    /// Runs `f` with the settings restored afterwards.
    pub(crate) fn with_settings<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = (
            self.settings.clone(),
            self.formatter.clone(),
            Shared::clone(&self.engine),
        );

        let mut env = scopeguard::guard(self, move |env| {
            (env.settings, env.formatter, env.engine) = saved;
        });
        f(&mut **env)
    }

    /// Runs `f` with `template` as the current template.
    pub(crate) fn with_template<R>(
        &mut self,
        template: Shared<Template>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous = std::mem::replace(&mut self.template, template);

        let mut env = scopeguard::guard(self, move |env| env.template = previous);
        f(&mut **env)
    }

    /// Overrides one setting for the rest of the current settings scope.
    pub(crate) fn apply_setting(&mut self, name: &str, value: &str) -> Result<(), RuntimeError> {
        self.settings
            .set(name, value)
            .map_err(|e| RuntimeError::Template(self.location, e.to_string()))?;
        self.formatter = Formatter::new(&self.settings)
            .map_err(|message| RuntimeError::Template(self.location, message))?;
        self.engine = number::engine_for(self.settings.arithmetic_engine, self.settings.decimal_scale);
        tracing::trace!(name, value, "setting changed");
        Ok(())
    }
}
