// Language toolchain adapters.
//
// The engine core stays language-agnostic: an adapter knows how to
// materialize source into a canonical file, run the language's front-end
// (when it has one) and produce the invocation recipe for the prepared
// artifact. Adding a language means registering one more adapter in
// `adapter_of`; nothing else changes.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use arbiter_common::error::{EngineError, Result};
use arbiter_common::types::Language;

use crate::engine::{self, ExitKind};
use crate::workspace::Workspace;

/// Fully resolved executable plus argument list. Produced once per
/// submission, with classpaths and artifact paths baked in against the
/// workspace, and reused for every test case.
#[derive(Debug, Clone)]
pub struct InvocationRecipe {
    pub program: String,
    pub args: Vec<String>,
}

/// Result of the compile/prepare phase for one submission. Produced once,
/// consumed by every test case run, never mutated.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub exit_code: i32,
    pub elapsed_ms: u64,
    /// The front-end's stderr, split into non-empty lines, verbatim.
    pub messages: Vec<String>,
    /// Present exactly when compilation succeeded.
    pub recipe: Option<InvocationRecipe>,
    pub peak_rss_kb: Option<u64>,
}

impl CompileOutcome {
    /// Outcome for languages that run straight from source: nothing to do,
    /// immediate success.
    fn immediate(recipe: InvocationRecipe) -> Self {
        Self {
            exit_code: 0,
            elapsed_ms: 0,
            messages: Vec::new(),
            recipe: Some(recipe),
            peak_rss_kb: None,
        }
    }
}

pub trait ToolchainAdapter: Send + Sync + std::fmt::Debug {
    fn language(&self) -> Language;

    /// Write the source into its canonical file inside the workspace and
    /// return that file's path.
    fn materialize(&self, source: &str, workspace: &Workspace) -> io::Result<PathBuf>;

    /// The front-end invocation, or `None` for languages that run straight
    /// from source.
    fn compile_command(&self, workspace: &Workspace) -> Option<InvocationRecipe>;

    /// The invocation recipe for the prepared artifact, resolved against
    /// the workspace.
    fn run_recipe(&self, workspace: &Workspace) -> InvocationRecipe;

    /// Executables this adapter expects on PATH.
    fn required_binaries(&self) -> &'static [&'static str];
}

/// Map a request's language name onto its adapter. Fails before any
/// workspace is allocated when no adapter is registered.
pub fn adapter_for(name: &str) -> Result<Box<dyn ToolchainAdapter>> {
    Language::parse(name)
        .map(adapter_of)
        .ok_or_else(|| EngineError::UnsupportedLanguage(name.to_string()))
}

pub fn adapter_of(language: Language) -> Box<dyn ToolchainAdapter> {
    match language {
        Language::Cpp => Box::new(NativeAdapter {
            language: Language::Cpp,
            compiler: "g++",
            source_file: "main.cpp",
            binaries: &["g++"],
        }),
        Language::C => Box::new(NativeAdapter {
            language: Language::C,
            compiler: "gcc",
            source_file: "main.c",
            binaries: &["gcc"],
        }),
        Language::Java => Box::new(JavaAdapter),
        Language::Python => Box::new(PythonAdapter),
        Language::Javascript => Box::new(InterpreterAdapter {
            language: Language::Javascript,
            interpreter: "node",
            source_file: "main.js",
            binaries: &["node"],
        }),
        Language::Ruby => Box::new(InterpreterAdapter {
            language: Language::Ruby,
            interpreter: "ruby",
            source_file: "main.rb",
            binaries: &["ruby"],
        }),
        Language::Csharp => Box::new(DotnetAdapter),
    }
}

/// Run the adapter's compile/prepare phase under the compile deadline.
///
/// Never errors: a rejected program, a missing compiler or a front-end that
/// hangs all come back as a failed outcome with diagnostic lines.
pub async fn compile(
    adapter: &dyn ToolchainAdapter,
    workspace: &Workspace,
    timeout: Duration,
) -> CompileOutcome {
    let Some(command) = adapter.compile_command(workspace) else {
        debug!(language = %adapter.language(), "no compile step, immediate success");
        return CompileOutcome::immediate(adapter.run_recipe(workspace));
    };

    debug!(language = %adapter.language(), program = %command.program, "compiling");
    let output = engine::run_command(&command, "", workspace.path(), timeout).await;

    let mut messages = output.stderr_lines;
    let recipe = match output.exit {
        ExitKind::Code(0) => Some(adapter.run_recipe(workspace)),
        ExitKind::TimedOut => {
            // The runner's generic deadline note reads wrong for the
            // front-end pass; swap it for the compile-specific one.
            messages.pop();
            messages.push("Compilation timed out.".to_string());
            None
        }
        _ => None,
    };
    if recipe.is_none() && messages.is_empty() {
        messages.push("Compilation failed.".to_string());
    }

    CompileOutcome {
        exit_code: output.exit.code(),
        elapsed_ms: output.duration_ms,
        messages,
        recipe,
        peak_rss_kb: output.peak_rss_kb,
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Compiled-native languages: compiler in, standalone binary out.
#[derive(Debug)]
struct NativeAdapter {
    language: Language,
    compiler: &'static str,
    source_file: &'static str,
    binaries: &'static [&'static str],
}

impl ToolchainAdapter for NativeAdapter {
    fn language(&self) -> Language {
        self.language
    }

    fn materialize(&self, source: &str, workspace: &Workspace) -> io::Result<PathBuf> {
        workspace.write_file(self.source_file, source)
    }

    fn compile_command(&self, workspace: &Workspace) -> Option<InvocationRecipe> {
        Some(InvocationRecipe {
            program: self.compiler.to_string(),
            args: vec![
                "-O2".to_string(),
                "-o".to_string(),
                path_str(&workspace.path().join("main")),
                path_str(&workspace.path().join(self.source_file)),
            ],
        })
    }

    fn run_recipe(&self, workspace: &Workspace) -> InvocationRecipe {
        InvocationRecipe {
            program: path_str(&workspace.path().join("main")),
            args: vec![],
        }
    }

    fn required_binaries(&self) -> &'static [&'static str] {
        self.binaries
    }
}

/// Interpreted languages with no usable ahead-of-time check: the prepare
/// phase is a no-op and syntax errors surface at run time.
#[derive(Debug)]
struct InterpreterAdapter {
    language: Language,
    interpreter: &'static str,
    source_file: &'static str,
    binaries: &'static [&'static str],
}

impl ToolchainAdapter for InterpreterAdapter {
    fn language(&self) -> Language {
        self.language
    }

    fn materialize(&self, source: &str, workspace: &Workspace) -> io::Result<PathBuf> {
        workspace.write_file(self.source_file, source)
    }

    fn compile_command(&self, _workspace: &Workspace) -> Option<InvocationRecipe> {
        None
    }

    fn run_recipe(&self, workspace: &Workspace) -> InvocationRecipe {
        InvocationRecipe {
            program: self.interpreter.to_string(),
            args: vec![path_str(&workspace.path().join(self.source_file))],
        }
    }

    fn required_binaries(&self) -> &'static [&'static str] {
        self.binaries
    }
}

/// Python: interpreted, but `py_compile` gives a real syntax check, so a
/// malformed program is reported as a compile failure instead of blowing
/// up on the first test case.
#[derive(Debug)]
struct PythonAdapter;

impl ToolchainAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn materialize(&self, source: &str, workspace: &Workspace) -> io::Result<PathBuf> {
        workspace.write_file("main.py", source)
    }

    fn compile_command(&self, workspace: &Workspace) -> Option<InvocationRecipe> {
        Some(InvocationRecipe {
            program: "python".to_string(),
            args: vec![
                "-m".to_string(),
                "py_compile".to_string(),
                path_str(&workspace.path().join("main.py")),
            ],
        })
    }

    fn run_recipe(&self, workspace: &Workspace) -> InvocationRecipe {
        InvocationRecipe {
            program: "python".to_string(),
            args: vec![path_str(&workspace.path().join("main.py"))],
        }
    }

    fn required_binaries(&self) -> &'static [&'static str] {
        &["python"]
    }
}

/// Java: the source file must be named after its public class, and the
/// run recipe needs the workspace as classpath.
#[derive(Debug)]
struct JavaAdapter;

impl JavaAdapter {
    /// The class the workspace was materialized with. The workspace holds
    /// exactly one `.java` file, written by `materialize`.
    fn class_name(workspace: &Workspace) -> String {
        std::fs::read_dir(workspace.path())
            .ok()
            .and_then(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .find(|path| path.extension().is_some_and(|ext| ext == "java"))
                    .and_then(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
            })
            .unwrap_or_else(|| "Main".to_string())
    }
}

impl ToolchainAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    fn materialize(&self, source: &str, workspace: &Workspace) -> io::Result<PathBuf> {
        let class = public_class_name(source).unwrap_or_else(|| "Main".to_string());
        workspace.write_file(&format!("{class}.java"), source)
    }

    fn compile_command(&self, workspace: &Workspace) -> Option<InvocationRecipe> {
        let class = Self::class_name(workspace);
        Some(InvocationRecipe {
            program: "javac".to_string(),
            args: vec![path_str(&workspace.path().join(format!("{class}.java")))],
        })
    }

    fn run_recipe(&self, workspace: &Workspace) -> InvocationRecipe {
        InvocationRecipe {
            program: "java".to_string(),
            args: vec![
                "-cp".to_string(),
                path_str(workspace.path()),
                Self::class_name(workspace),
            ],
        }
    }

    fn required_binaries(&self) -> &'static [&'static str] {
        &["javac", "java"]
    }
}

/// Extract the public class name a Java source declares, if any.
fn public_class_name(source: &str) -> Option<String> {
    static PUBLIC_CLASS: OnceLock<Regex> = OnceLock::new();
    let re = PUBLIC_CLASS.get_or_init(|| {
        Regex::new(r"public\s+(?:final\s+|abstract\s+)?class\s+([A-Za-z_$][A-Za-z0-9_$]*)")
            .expect("class-name pattern is valid")
    });
    re.captures(source)
        .map(|captures| captures[1].to_string())
}

/// C#: built through the .NET build tool against a stub project file, then
/// run from the produced assembly.
#[derive(Debug)]
struct DotnetAdapter;

const RUNNER_CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <OutputType>Exe</OutputType>
    <TargetFramework>net8.0</TargetFramework>
    <ImplicitUsings>enable</ImplicitUsings>
    <Nullable>disable</Nullable>
    <AssemblyName>runner</AssemblyName>
  </PropertyGroup>
</Project>
"#;

impl ToolchainAdapter for DotnetAdapter {
    fn language(&self) -> Language {
        Language::Csharp
    }

    fn materialize(&self, source: &str, workspace: &Workspace) -> io::Result<PathBuf> {
        workspace.write_file("runner.csproj", RUNNER_CSPROJ)?;
        workspace.write_file("Program.cs", source)
    }

    fn compile_command(&self, workspace: &Workspace) -> Option<InvocationRecipe> {
        Some(InvocationRecipe {
            program: "dotnet".to_string(),
            args: vec![
                "build".to_string(),
                "--nologo".to_string(),
                "-c".to_string(),
                "Release".to_string(),
                "-o".to_string(),
                path_str(&workspace.path().join("build")),
            ],
        })
    }

    fn run_recipe(&self, workspace: &Workspace) -> InvocationRecipe {
        InvocationRecipe {
            program: "dotnet".to_string(),
            args: vec![path_str(&workspace.path().join("build").join("runner.dll"))],
        }
    }

    fn required_binaries(&self) -> &'static [&'static str] {
        &["dotnet"]
    }
}
