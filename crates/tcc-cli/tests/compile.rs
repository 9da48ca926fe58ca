use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn compile_writes_nasm_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("prog.tc");
    std::fs::write(&input, "VAR x, 7\nPRINT x\nHALT\n").unwrap();

    Command::cargo_bin("tcc")
        .unwrap()
        .arg("compile")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("global _start"))
        .stdout(predicate::str::contains("x dq 7"));
}

#[test]
fn compile_writes_nasm_to_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("prog.tc");
    let output = dir.path().join("prog.asm");
    std::fs::write(&input, "VAR x, 1\nPRINT x\nHALT\n").unwrap();

    Command::cargo_bin("tcc")
        .unwrap()
        .arg("compile")
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    let contents = std::fs::read_to_string(&output).unwrap();
    assert!(contents.contains("section .text"));
}

#[test]
fn compile_reports_parse_errors_on_stderr_with_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.tc");
    std::fs::write(&input, "LOAD R1\n").unwrap();

    Command::cargo_bin("tcc")
        .unwrap()
        .arg("compile")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn missing_input_file_fails_with_context() {
    Command::cargo_bin("tcc")
        .unwrap()
        .arg("compile")
        .arg("/nonexistent/does-not-exist.tc")
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading source file"));
}
