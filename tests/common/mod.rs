//! Shared test infrastructure for integration tests.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// A scratch directory holding one input table and the mock LM wiring.
pub struct TestFixture {
    pub dir: TempDir,
    pub input: PathBuf,
    env: Vec<(String, String)>,
}

impl TestFixture {
    pub fn with_input(contents: &str) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let input = dir.path().join("books.csv");
        fs::write(&input, contents).expect("write input");
        Self {
            dir,
            input,
            env: Vec::new(),
        }
    }

    /// Set an environment variable for the mock LM.
    pub fn mock_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Drop the mock LM settings, e.g. to stop a forced failure.
    pub fn without_mock_env(mut self) -> Self {
        self.env.clear();
        self
    }

    /// Record every LM call to a file; returns the file path.
    pub fn count_calls(self) -> (Self, PathBuf) {
        let calls = self.dir.path().join("calls.txt");
        let fixture = self.mock_env("MOCK_LM_CALLS", &calls.display().to_string());
        (fixture, calls)
    }

    pub fn read_input(&self) -> String {
        fs::read_to_string(&self.input).expect("read input")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// `bookrich run` against the mock LM with no delays.
    pub fn run(&self, extra: &[&str]) -> Output {
        let mut args = vec![
            "run".to_string(),
            "--input".to_string(),
            self.input.display().to_string(),
            "--lm-command".to_string(),
            mock_lm_command(),
            "--delay".to_string(),
            "0".to_string(),
            "--retry-delay".to_string(),
            "0".to_string(),
        ];
        args.extend(extra.iter().map(|arg| arg.to_string()));
        self.bookrich(&args)
    }

    pub fn bookrich<S: AsRef<std::ffi::OsStr>>(&self, args: &[S]) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_bookrich"));
        command
            .args(args)
            .env_remove("BOOKRICH_LM_COMMAND")
            .env_remove("OPENAI_API_KEY")
            .env_remove("RUST_LOG");
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command.output().expect("spawn bookrich")
    }
}

pub fn mock_lm_command() -> String {
    let script = manifest_dir().join("tests/mock-lm.sh");
    shell_words::join(["sh", script.display().to_string().as_str()])
}

pub fn books(count: usize) -> String {
    (1..=count).map(|n| format!("Book {n},Author {n}\n")).collect()
}

pub fn call_count(path: &Path) -> usize {
    fs::read_to_string(path)
        .map(|text| text.lines().count())
        .unwrap_or(0)
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
