use clap::Parser;
use miette::{IntoDiagnostic, miette};
use std::io::{self, BufWriter, Read, Write};
use std::{fs, path::PathBuf};
use stencil_lang::ast::Template;
use stencil_lang::{
    Breakpoint, DebugContext, Debugger, DebuggerAction, DebuggerHandler, Engine, FileResolver,
    Settings, Shared, Value, WriteOutput,
};

#[derive(Parser, Debug, Default)]
#[command(name = "stencil")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To render a template with a data model:\n\
    stencil page.json --data model.json\n\n\
    ## To read the data model from stdin:\n\
    cat model.json | stencil page.json --data -\n\n\
    ## To override a setting:\n\
    stencil page.json --set number_format=#,##0.00")]
#[command(
    about = "stencil renders compiled template trees against a JSON data model.",
    long_about = None
)]
pub struct Cli {
    /// Template tree serialized as JSON
    #[arg(value_name = "TEMPLATE")]
    template: PathBuf,

    /// JSON data model, `-` reads it from stdin
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// TOML settings file
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Override a single setting
    #[arg(long = "set", value_name = "NAME=VALUE")]
    overrides: Vec<String>,

    /// Sets a string variable in the data model
    #[arg(long = "var", value_names = ["NAME", "VALUE"], num_args = 2)]
    vars: Vec<String>,

    /// Search included and imported templates in the directory
    #[arg(short = 'L', long = "directory")]
    directories: Vec<PathBuf>,

    /// Write the output to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip constant folding before rendering
    #[arg(long, default_value_t = false)]
    no_optimize: bool,

    /// Print the prepared tree as JSON instead of rendering it
    #[arg(long, default_value_t = false)]
    dump: bool,

    /// Log the context at each instruction on the given line (needs RUST_LOG=info)
    #[arg(long = "break", value_name = "LINE")]
    breakpoints: Vec<u32>,
}

/// Logs breakpoint hits and lets the render continue.
#[derive(Debug, Default)]
struct TraceHandler;

impl DebuggerHandler for TraceHandler {
    fn on_breakpoint_hit(
        &mut self,
        _breakpoint: &Breakpoint,
        context: &DebugContext,
    ) -> DebuggerAction {
        tracing::info!(
            template = %context.template_name,
            line = context.range.start.line,
            column = context.range.start.column,
            instruction = context.instruction,
            call_stack = %context.call_stack.join(" > "),
            variables = ?context.variables,
            "breakpoint hit"
        );

        DebuggerAction::Continue
    }
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        let template = self.load_template()?;
        let engine = self.engine()?;
        let template = Shared::new(engine.prepare(&template));

        if self.dump {
            let json = template.to_json().into_diagnostic()?;
            return self.write(|out| writeln!(out, "{json}"));
        }

        let data = self.data_model()?;
        let debugger = self.debugger();
        tracing::debug!(template = %template.name, "rendering");

        match &self.output {
            Some(path) => {
                let file = fs::File::create(path).into_diagnostic()?;
                let mut out = WriteOutput::new(BufWriter::new(file));
                engine.render_with(&template, data, &mut out, debugger)?;
            }
            None => {
                let mut out = WriteOutput::new(BufWriter::new(io::stdout().lock()));
                engine.render_with(&template, data, &mut out, debugger)?;
            }
        }

        Ok(())
    }

    fn load_template(&self) -> miette::Result<Template> {
        if !self.template.is_file() {
            return Err(miette!("File not found: {}", self.template.display()));
        }

        let json = fs::read_to_string(&self.template).into_diagnostic()?;
        let mut template = Template::from_json(&json).into_diagnostic()?;
        if template.name.is_empty() {
            template.name = self
                .template
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned().into())
                .unwrap_or_default();
        }

        Ok(template)
    }

    fn engine(&self) -> miette::Result<Engine> {
        let mut settings = match &self.settings {
            Some(path) => {
                let toml = fs::read_to_string(path).into_diagnostic()?;
                Settings::from_toml_str(&toml).into_diagnostic()?
            }
            None => Settings::default(),
        };

        for entry in &self.overrides {
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| miette!("Expected NAME=VALUE, got \"{entry}\""))?;
            settings.set(name.trim(), value).into_diagnostic()?;
        }

        let mut engine = Engine::new(settings);
        engine.set_optimize(!self.no_optimize);
        engine.set_resolver(Shared::new(FileResolver::new(Some(self.search_paths()))));
        Ok(engine)
    }

    fn search_paths(&self) -> Vec<PathBuf> {
        if !self.directories.is_empty() {
            return self.directories.clone();
        }

        match self.template.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => vec![parent.to_path_buf()],
            _ => vec![PathBuf::from(".")],
        }
    }

    fn data_model(&self) -> miette::Result<Value> {
        let json: serde_json::Value = match &self.data {
            Some(path) if path.as_os_str() == "-" => {
                let mut input = String::new();
                io::stdin().read_to_string(&mut input).into_diagnostic()?;
                serde_json::from_str(&input).into_diagnostic()?
            }
            Some(path) => {
                let content = fs::read_to_string(path).into_diagnostic()?;
                serde_json::from_str(&content).into_diagnostic()?
            }
            None => serde_json::Value::Object(serde_json::Map::new()),
        };

        let json = if self.vars.is_empty() {
            json
        } else {
            let serde_json::Value::Object(mut map) = json else {
                return Err(miette!("--var requires the data model to be a JSON object"));
            };
            for pair in self.vars.chunks(2) {
                if let [name, value] = pair {
                    map.insert(name.clone(), serde_json::Value::String(value.clone()));
                }
            }
            serde_json::Value::Object(map)
        };

        Ok(Value::from(json))
    }

    fn debugger(&self) -> Option<Debugger> {
        if self.breakpoints.is_empty() {
            return None;
        }

        let mut debugger = Debugger::new();
        debugger.set_handler(Box::new(TraceHandler));
        for line in &self.breakpoints {
            debugger.add_breakpoint(*line, None);
        }
        debugger.activate();
        Some(debugger)
    }

    fn write(&self, f: impl FnOnce(&mut dyn Write) -> io::Result<()>) -> miette::Result<()> {
        match &self.output {
            Some(path) => {
                let mut file = BufWriter::new(fs::File::create(path).into_diagnostic()?);
                f(&mut file).into_diagnostic()?;
                file.flush().into_diagnostic()
            }
            None => {
                let mut stdout = BufWriter::new(io::stdout().lock());
                f(&mut stdout).into_diagnostic()?;
                stdout.flush().into_diagnostic()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use std::path::Path;

    use super::*;

    const PAGE: &str = r#"{
        "root": [
            {"kind": {"Text": "Hello, "}},
            {"kind": {"Interpolation": {"kind": {"Ident": "name"}}}},
            {"kind": {"Text": " "}},
            {"kind": {"Interpolation": {"kind": {"Ident": "total"}}}}
        ]
    }"#;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn cli(template: PathBuf, output: PathBuf) -> Cli {
        Cli {
            template,
            output: Some(output),
            ..Cli::default()
        }
    }

    #[test]
    fn test_cli_renders_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_file(dir.path(), "page.json", PAGE);
        let data = write_file(dir.path(), "data.json", r#"{"name": "Ann", "total": 1234.5}"#);
        let output = dir.path().join("out.txt");

        let cli = Cli {
            data: Some(data),
            ..cli(template, output.clone())
        };

        assert!(cli.run().is_ok());
        assert_eq!(fs::read_to_string(output).unwrap(), "Hello, Ann 1234.5");
    }

    #[test]
    fn test_cli_settings_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_file(dir.path(), "page.json", PAGE);
        let data = write_file(dir.path(), "data.json", r#"{"name": "Ann", "total": 1234.5}"#);
        let settings = write_file(dir.path(), "settings.toml", "number_format = \"#,##0.00\"\n");
        let output = dir.path().join("out.txt");

        let cli = Cli {
            data: Some(data),
            settings: Some(settings),
            overrides: vec!["locale=en_US".to_string()],
            ..cli(template, output.clone())
        };

        assert!(cli.run().is_ok());
        assert_eq!(fs::read_to_string(output).unwrap(), "Hello, Ann 1,234.50");
    }

    #[test]
    fn test_cli_vars_extend_data_model() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_file(dir.path(), "page.json", PAGE);
        let output = dir.path().join("out.txt");

        let cli = Cli {
            vars: vec![
                "name".to_string(),
                "Bob".to_string(),
                "total".to_string(),
                "none".to_string(),
            ],
            ..cli(template, output.clone())
        };

        assert!(cli.run().is_ok());
        assert_eq!(fs::read_to_string(output).unwrap(), "Hello, Bob none");
    }

    #[test]
    fn test_cli_includes_from_template_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "footer.json", r#"{"root": [{"kind": {"Text": "(c)"}}]}"#);
        let template = write_file(
            dir.path(),
            "page.json",
            r#"{"root": [{"kind": {"Include": {"kind": {"String": "footer"}}}}]}"#,
        );
        let output = dir.path().join("out.txt");

        assert!(cli(template, output.clone()).run().is_ok());
        assert_eq!(fs::read_to_string(output).unwrap(), "(c)");
    }

    #[test]
    fn test_cli_dump_prepared_tree() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_file(dir.path(), "page.json", PAGE);
        let output = dir.path().join("out.json");

        let cli = Cli {
            dump: true,
            ..cli(template, output.clone())
        };

        assert!(cli.run().is_ok());
        let dumped = Template::from_json(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(dumped.name, "page");
    }

    #[test]
    fn test_cli_breakpoints_keep_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_file(dir.path(), "page.json", PAGE);
        let output = dir.path().join("out.txt");

        let cli = Cli {
            vars: vec![
                "name".to_string(),
                "Ann".to_string(),
                "total".to_string(),
                "1".to_string(),
            ],
            breakpoints: vec![1],
            ..cli(template, output.clone())
        };

        let mut handler = TraceHandler;
        let context = DebugContext {
            template_name: "page".into(),
            range: Default::default(),
            instruction: "text",
            call_stack: Vec::new(),
            variables: vec![("name".into(), Value::from("Ann"))],
        };
        let breakpoint = Breakpoint {
            id: 1,
            line: 1,
            column: None,
            template: None,
            enabled: true,
        };
        assert_eq!(
            handler.on_breakpoint_hit(&breakpoint, &context),
            DebuggerAction::Continue
        );

        assert!(cli.run().is_ok());
        assert_eq!(fs::read_to_string(output).unwrap(), "Hello, Ann 1");
    }

    #[rstest]
    #[case::missing_template(None, vec![])]
    #[case::bad_override(None, vec!["number_format".to_string()])]
    #[case::unknown_setting(None, vec!["colour=red".to_string()])]
    #[case::missing_value(Some(r#"{"name": "Ann"}"#), vec![])]
    fn test_cli_errors(#[case] data: Option<&str>, #[case] overrides: Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        let template = if data.is_some() || !overrides.is_empty() {
            write_file(dir.path(), "page.json", PAGE)
        } else {
            dir.path().join("missing.json")
        };
        let data = data.map(|json| write_file(dir.path(), "data.json", json));

        let cli = Cli {
            data,
            overrides,
            ..cli(template, dir.path().join("out.txt"))
        };

        assert!(cli.run().is_err());
    }

    #[test]
    fn test_cli_parses_arguments() {
        let cli = Cli::try_parse_from([
            "stencil",
            "page.json",
            "--data",
            "-",
            "--set",
            "locale=de_DE",
            "--var",
            "title",
            "Home",
            "-L",
            "templates",
            "--break",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.template, PathBuf::from("page.json"));
        assert_eq!(cli.data, Some(PathBuf::from("-")));
        assert_eq!(cli.overrides, vec!["locale=de_DE"]);
        assert_eq!(cli.vars, vec!["title", "Home"]);
        assert_eq!(cli.directories, vec![PathBuf::from("templates")]);
        assert_eq!(cli.breakpoints, vec![3]);
        assert!(cli.debugger().is_some());
    }
}
