#![allow(deprecated)] // `Command::cargo_bin` is deprecated but still functional

use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;

use anyhow::Result;
use assert_cmd::Command;
use ntest::timeout;
use pretty_assertions::assert_eq;
use utrace::config::DEBUG_ENV;
use utrace::Policy;

#[test]
#[timeout(10000)]
fn test_writes_policy_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("true.json");

    Command::cargo_bin("utrace")?
        .arg("-f")
        .arg(&output)
        .args(&["-p", "7", "/bin/true"])
        .assert()
        .success();

    let policy: Policy = serde_json::from_str(&fs::read_to_string(&output)?)?;

    assert_eq!(policy.policy, 7);
    assert!(policy.whitelist.iter().any(|name| name == "execve"));
    assert!(policy.whitelist.iter().any(|name| name == "exit_group"));

    Ok(())
}

#[test]
#[timeout(10000)]
fn test_unwritable_output_goes_to_stdout() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("missing").join("true.json");

    let assert = Command::cargo_bin("utrace")?
        .arg("-f")
        .arg(&output)
        .arg("/bin/true")
        .assert()
        .success();

    let policy: Policy = serde_json::from_slice(&assert.get_output().stdout)?;

    assert_eq!(policy.policy, libc::EPERM);
    assert!(policy.whitelist.iter().any(|name| name == "exit_group"));

    Ok(())
}

#[test]
#[timeout(10000)]
fn test_tracee_environment() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("sh.json");
    let seen = dir.path().join("seen");

    let script = format!(
        "echo \"${{{}-unset}} $LD_PRELOAD\" > {}",
        DEBUG_ENV,
        seen.display(),
    );

    Command::cargo_bin("utrace")?
        .env(DEBUG_ENV, "1")
        .arg("-f")
        .arg(&output)
        .args(&["--preload", "/nonexistent/libpreload-trace.so"])
        .args(&["/bin/sh", "-c", &script])
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&seen)?, "unset /nonexistent/libpreload-trace.so\n");

    Ok(())
}

#[test]
#[timeout(10000)]
fn test_preload_path_is_passed_verbatim() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("sh.json");
    let seen = dir.path().join("seen");

    let script = format!("printf %s \"$LD_PRELOAD\" > {}", seen.display());
    let lib = OsStr::from_bytes(b"/nonexistent/lib\xfftrace.so");

    Command::cargo_bin("utrace")?
        .arg("-f")
        .arg(&output)
        .arg("--preload")
        .arg(lib)
        .args(&["/bin/sh", "-c", &script])
        .assert()
        .success();

    assert_eq!(fs::read(&seen)?, lib.as_bytes());

    Ok(())
}

#[test]
fn test_missing_program_fails() -> Result<()> {
    Command::cargo_bin("utrace")?
        .args(&["-p", "7"])
        .assert()
        .failure();

    Ok(())
}
