use crate::{
    RenderResult, Shared,
    ast::Template,
    error::Error,
    eval::{
        debugger::Debugger,
        env::{Collator, Environment, OrdinalCollator, Output},
        resolver::{MapResolver, TemplateResolver},
    },
    optimizer::Optimizer,
    settings::Settings,
    value::Value,
};

#[derive(Debug, Clone)]
pub struct Options {
    pub optimize: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { optimize: true }
    }
}

/// Renders templates against a data model.
///
/// An `Engine` holds what stays fixed across renders. Every call to
/// [`Engine::render`] gets a fresh [`Environment`], so one engine can be
/// shared by concurrent renders.
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) settings: Settings,
    pub(crate) options: Options,
    resolver: Shared<dyn TemplateResolver>,
    collator: Shared<dyn Collator>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            options: Options::default(),
            resolver: Shared::new(MapResolver::default()),
            collator: Shared::new(OrdinalCollator),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_optimize(&mut self, optimize: bool) {
        self.options.optimize = optimize;
    }

    pub fn set_resolver(&mut self, resolver: Shared<dyn TemplateResolver>) {
        self.resolver = resolver;
    }

    pub fn set_collator(&mut self, collator: Shared<dyn Collator>) {
        self.collator = collator;
    }

    /// Folds the constant parts of `template` for repeated rendering.
    pub fn prepare(&self, template: &Template) -> Template {
        if !self.options.optimize {
            return template.clone();
        }

        Optimizer::with_engine(self.settings.arithmetic_engine, self.settings.decimal_scale)
            .optimize(template)
    }

    #[allow(clippy::result_large_err)]
    pub fn render(
        &self,
        template: &Shared<Template>,
        data_model: Value,
        out: &mut dyn Output,
    ) -> Result<(), Error> {
        self.render_with(template, data_model, out, None)
    }

    /// Like [`Engine::render`], stopping at the breakpoints of `debugger`.
    #[allow(clippy::result_large_err)]
    pub fn render_with(
        &self,
        template: &Shared<Template>,
        data_model: Value,
        out: &mut dyn Output,
        debugger: Option<Debugger>,
    ) -> Result<(), Error> {
        let env = Environment::new(
            self.settings.clone(),
            Shared::clone(template),
            data_model,
            out,
        )
        .map_err(|e| Error::from_error(template.name.clone(), template.source.as_deref(), e))?;

        let mut env = env
            .with_resolver(Shared::clone(&self.resolver))
            .with_collator(Shared::clone(&self.collator));
        if let Some(debugger) = debugger {
            env = env.with_debugger(debugger);
        }

        env.process()
    }

    #[allow(clippy::result_large_err)]
    pub fn render_to_string(
        &self,
        template: &Shared<Template>,
        data_model: Value,
    ) -> RenderResult {
        let mut out = String::new();
        self.render(template, data_model, &mut out)?;
        Ok(out)
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
