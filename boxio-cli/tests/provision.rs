use predicates::prelude::*;

mod common;

#[test]
fn test_provision_prints_pipe_paths() {
    let ctx = common::boxio();
    let config = ctx.provision("prov-basic", &["-i"]);

    let dir = ctx.container_dir("prov-basic");
    assert_eq!(common::path_of(&config, "stdin"), Some(dir.join("stdin")));
    assert_eq!(common::path_of(&config, "stdout"), Some(dir.join("stdout")));
    assert_eq!(common::path_of(&config, "stderr"), Some(dir.join("stderr")));
    assert_eq!(config["terminal"], false);
}

#[test]
fn test_provision_tty_has_no_stderr() {
    let ctx = common::boxio();
    let config = ctx.provision("prov-tty", &["--tty"]);

    assert!(config["stdin"].is_null());
    assert!(config["stderr"].is_null());
    assert!(config["stdout"].is_string());
    assert_eq!(config["terminal"], true);
    assert!(!ctx.container_dir("prov-tty").join("stderr").exists());
}

#[test]
fn test_provision_twice_succeeds() {
    let ctx = common::boxio();
    let first = ctx.provision("prov-twice", &[]);
    let second = ctx.provision("prov-twice", &[]);
    assert_eq!(first, second);
}

#[test]
fn test_provision_rejects_bad_id() {
    let mut ctx = common::boxio();

    ctx.cmd
        .args(["provision", "a/b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("single path component"));
}

#[test]
fn test_provision_requires_id() {
    let mut ctx = common::boxio();

    ctx.cmd.arg("provision").assert().failure();
}

#[test]
fn test_reprovision_with_tty_drops_old_pipes() {
    let ctx = common::boxio();
    ctx.provision("prov-switch", &["-i"]);
    let config = ctx.provision("prov-switch", &["--tty"]);

    assert!(config["stdin"].is_null());
    assert!(config["stderr"].is_null());
    let dir = ctx.container_dir("prov-switch");
    assert!(!dir.join("stdin").exists());
    assert!(!dir.join("stderr").exists());
    assert!(dir.join("stdout").exists());
}
