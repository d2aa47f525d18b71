use std::fmt::Debug;

use itertools::Itertools;
use smol_str::SmolStr;

use crate::{range::Range, value::Value};

/// Represents a breakpoint in the debugger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Breakpoint {
    /// Unique identifier for the breakpoint
    pub id: usize,
    /// Line number where the breakpoint is set
    pub line: u32,
    /// Column number where the breakpoint is set (optional)
    pub column: Option<usize>,
    /// Restricts the breakpoint to one template
    pub template: Option<SmolStr>,
    /// Whether the breakpoint is enabled
    pub enabled: bool,
}

impl Breakpoint {
    fn matches(&self, template: &str, range: &Range) -> bool {
        self.enabled
            && self.line == range.start.line
            && self.column.is_none_or(|column| column == range.start.column)
            && self.template.as_deref().is_none_or(|name| name == template)
    }
}

/// What the handler sees when execution pauses.
#[derive(Debug, Clone)]
pub struct DebugContext {
    pub template_name: SmolStr,
    pub range: Range,
    /// Short name of the instruction about to run.
    pub instruction: &'static str,
    /// Names of the active macro invocations, outermost first.
    pub call_stack: Vec<SmolStr>,
    /// Variables visible without qualification at this point.
    pub variables: Vec<(SmolStr, Value)>,
}

/// Result of debugger callback execution
#[derive(Debug, Clone, PartialEq)]
pub enum DebuggerAction {
    /// Continue normal execution
    Continue,
    /// Pause again before the next instruction
    Step,
    /// Set a breakpoint at a specific line
    Breakpoint(u32),
    /// Clear one breakpoint, or all of them
    Clear(Option<usize>),
    /// Stop the render
    Stop(Option<String>),
}

pub trait DebuggerHandler: Debug + Send {
    /// Called when a breakpoint is hit.
    fn on_breakpoint_hit(
        &mut self,
        _breakpoint: &Breakpoint,
        _context: &DebugContext,
    ) -> DebuggerAction {
        DebuggerAction::Continue
    }

    /// Called before each instruction while stepping.
    fn on_step(&mut self, _context: &DebugContext) -> DebuggerAction {
        DebuggerAction::Continue
    }
}

#[derive(Debug, Default)]
pub struct DefaultDebuggerHandler;

impl DebuggerHandler for DefaultDebuggerHandler {}

/// Why execution paused.
#[derive(Debug, Clone)]
pub(crate) enum Pause {
    Breakpoint(Breakpoint),
    Step,
}

/// Breakpoints checked at instruction boundaries.
#[derive(Debug)]
pub struct Debugger {
    breakpoints: Vec<Breakpoint>,
    next_breakpoint_id: usize,
    active: bool,
    stepping: bool,
    handler: Box<dyn DebuggerHandler>,
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

impl Debugger {
    pub fn new() -> Self {
        Self {
            breakpoints: Vec::new(),
            next_breakpoint_id: 1,
            active: true,
            stepping: false,
            handler: Box::new(DefaultDebuggerHandler),
        }
    }

    pub fn set_handler(&mut self, handler: Box<dyn DebuggerHandler>) {
        self.handler = handler;
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Add a breakpoint at the specified line
    pub fn add_breakpoint(&mut self, line: u32, column: Option<usize>) -> usize {
        let id = self.next_breakpoint_id;
        self.breakpoints.push(Breakpoint {
            id,
            line,
            column,
            template: None,
            enabled: true,
        });
        self.next_breakpoint_id += 1;
        id
    }

    /// Like [`Debugger::add_breakpoint`], limited to one template.
    pub fn add_template_breakpoint(&mut self, template: &str, line: u32) -> usize {
        let id = self.add_breakpoint(line, None);
        if let Some(breakpoint) = self.breakpoints.last_mut() {
            breakpoint.template = Some(SmolStr::new(template));
        }
        id
    }

    /// Remove a breakpoint by ID
    pub fn remove_breakpoint(&mut self, id: usize) -> bool {
        let before = self.breakpoints.len();
        self.breakpoints.retain(|bp| bp.id != id);
        self.breakpoints.len() != before
    }

    pub fn set_enabled(&mut self, id: usize, enabled: bool) -> bool {
        match self.breakpoints.iter_mut().find(|bp| bp.id == id) {
            Some(breakpoint) => {
                breakpoint.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn list_breakpoints(&self) -> Vec<&Breakpoint> {
        self.breakpoints
            .iter()
            .sorted_by_key(|bp| (bp.line, bp.column))
            .collect()
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Pause before the next instruction.
    pub fn step(&mut self) {
        self.stepping = true;
    }

    pub(crate) fn pause_at(&self, template: &str, range: &Range) -> Option<Pause> {
        if !self.active {
            return None;
        }

        if let Some(breakpoint) = self.breakpoints.iter().find(|bp| bp.matches(template, range)) {
            return Some(Pause::Breakpoint(breakpoint.clone()));
        }

        self.stepping.then_some(Pause::Step)
    }

    pub(crate) fn paused(&mut self, pause: &Pause, context: &DebugContext) -> DebuggerAction {
        self.stepping = false;

        let action = match pause {
            Pause::Breakpoint(breakpoint) => self.handler.on_breakpoint_hit(breakpoint, context),
            Pause::Step => self.handler.on_step(context),
        };
        tracing::debug!(
            template = %context.template_name,
            location = %context.range,
            action = ?action,
            "debugger paused"
        );

        match &action {
            DebuggerAction::Step => self.stepping = true,
            DebuggerAction::Breakpoint(line) => {
                self.add_breakpoint(*line, None);
            }
            DebuggerAction::Clear(Some(id)) => {
                self.remove_breakpoint(*id);
            }
            DebuggerAction::Clear(None) => self.clear_breakpoints(),
            DebuggerAction::Continue | DebuggerAction::Stop(_) => {}
        }

        action
    }
}
