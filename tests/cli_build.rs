use std::fs;
use std::path::Path;

use predicates::prelude::*;

fn write_book(root: &Path) -> anyhow::Result<()> {
    let book = root.join("manuscript").join("1_trench");
    fs::create_dir_all(book.join("chapters"))?;
    fs::create_dir_all(book.join("front"))?;
    fs::write(
        book.join("book.yaml"),
        "title: The Trench\nauthor: A. Writer\nprefix: trench\n",
    )?;
    fs::write(book.join("front").join("00-title.md"), "# Title {.unnumbered}\n")?;
    fs::write(book.join("chapters").join("01-one.md"), "# One\n\nText.\n")?;
    fs::write(book.join("chapters").join("02-two.md"), "# Two\n\nMore.\n")?;
    Ok(())
}

/// Stand-in for pandoc: touches the `-o` target, fails for docx.
#[cfg(unix)]
fn write_fake_pandoc(dir: &Path) -> anyhow::Result<std::path::PathBuf> {
    use std::os::unix::fs::PermissionsExt as _;

    let script = dir.join("fake-pandoc");
    fs::write(
        &script,
        r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
case "$out" in
  *.docx) echo "docx writer exploded" >&2; exit 1 ;;
esac
: > "$out"
"#,
    )?;
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
    Ok(script)
}

#[cfg(unix)]
#[test]
fn failed_format_does_not_stop_the_others() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_book(temp.path())?;
    let pandoc = write_fake_pandoc(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookpipe");
    cmd.args(["build", "1", "--md", "--docx", "--no-validate", "--root"])
        .arg(temp.path())
        .arg("--pandoc")
        .arg(&pandoc)
        .assert()
        .failure()
        .stdout(predicate::str::contains("trench.md"))
        .stdout(predicate::str::contains("FAILED"))
        .stderr(predicate::str::contains("1 of 2 format(s) failed: docx"));

    let output = temp.path().join("output");
    assert!(output.join("trench.md").is_file());
    assert!(!output.join("trench.docx").exists());
    assert!(!output.join("trench.assembled.md").exists());

    Ok(())
}

#[cfg(unix)]
#[test]
fn bare_book_argument_builds_with_default_subcommand() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_book(temp.path())?;
    let pandoc = write_fake_pandoc(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookpipe");
    cmd.args(["trench", "--md", "--keep-intermediate", "--root"])
        .arg(temp.path())
        .arg("--pandoc")
        .arg(&pandoc)
        .assert()
        .success();

    let output = temp.path().join("output");
    assert!(output.join("trench.md").is_file());
    assert_eq!(
        fs::read_to_string(output.join("trench.assembled.md"))?,
        "# Title {.unnumbered}\n\n# One\n\nText.\n\n# Two\n\nMore.\n"
    );

    Ok(())
}

#[test]
fn missing_pdf_template_fails_before_any_output() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_book(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookpipe");
    cmd.args(["build", "1", "--pdf", "--root"])
        .arg(temp.path())
        .arg("--pandoc")
        .arg(temp.path().join("no-such-pandoc"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required artifact 'template'"));

    assert!(!temp.path().join("output").join("trench.pdf").exists());

    Ok(())
}

#[test]
fn unknown_book_is_reported() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_book(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookpipe");
    cmd.args(["build", "7", "--root"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("'7'"));

    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_book(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bookpipe");
    cmd.env("RUST_LOG", "debug")
        .args(["lint", "1", "--root"])
        .arg(temp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));

    Ok(())
}
