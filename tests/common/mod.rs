//! Builds the C fixture module used by the loader tests.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Compiled fixture modules, each named `libopenasip.so` in its own directory.
pub struct FixtureModules {
    _root: TempDir,
    /// Exports all four entry points.
    pub complete_dir: PathBuf,
    /// Lacks `executeInstruction64`.
    pub partial_dir: PathBuf,
}

impl FixtureModules {
    pub fn complete_module(&self) -> PathBuf {
        self.complete_dir.join("libopenasip.so")
    }

    pub fn partial_module(&self) -> PathBuf {
        self.partial_dir.join("libopenasip.so")
    }
}

/// Compile both fixture variants, or `None` if no C compiler is installed.
pub fn build_fixture_modules() -> Option<FixtureModules> {
    let root = tempfile::tempdir().expect("create fixture dir");
    let complete_dir = root.path().join("complete");
    let partial_dir = root.path().join("partial");
    std::fs::create_dir_all(&complete_dir).unwrap();
    std::fs::create_dir_all(&partial_dir).unwrap();

    compile(&complete_dir.join("libopenasip.so"), &[])?;
    compile(&partial_dir.join("libopenasip.so"), &["-DOMIT_EXECUTE64"])?;

    Some(FixtureModules {
        _root: root,
        complete_dir,
        partial_dir,
    })
}

/// Returns `None` when the compiler is missing; panics if compilation fails.
fn compile(output: &Path, defines: &[&str]) -> Option<()> {
    let source = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/openasip_fixture.c");
    let compiler = std::env::var("CC").unwrap_or_else(|_| "cc".to_string());

    let result = Command::new(&compiler)
        .args(["-shared", "-fPIC", "-Wl,-z,lazy", "-o"])
        .arg(output)
        .arg(&source)
        .args(defines)
        .output();

    match result {
        Ok(out) if out.status.success() => Some(()),
        Ok(out) => panic!(
            "compiling fixture with {} failed:\n{}",
            compiler,
            String::from_utf8_lossy(&out.stderr)
        ),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            eprintln!("skipping: C compiler '{}' not found", compiler);
            None
        }
        Err(e) => panic!("running {}: {}", compiler, e),
    }
}
