use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn tasktree_help_works() {
    Command::cargo_bin("tasktree")
        .expect("binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Work-breakdown task tree"));
}

#[test]
fn subcommand_help_works() {
    let subcommands = [
        "init",
        "check",
        "show",
        "path",
        "children",
        "descendants",
        "duration",
        "access",
        "move",
        "rename",
        "add",
        "remove",
        "book",
    ];

    for cmd in subcommands {
        Command::cargo_bin("tasktree")
            .expect("binary")
            .arg(cmd)
            .arg("--help")
            .assert()
            .success();
    }
}

#[test]
fn missing_snapshot_is_a_user_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    Command::cargo_bin("tasktree")
        .expect("binary")
        .current_dir(dir.path())
        .env_remove("TASKTREE_SNAPSHOT")
        .arg("check")
        .assert()
        .code(2)
        .stderr(contains("snapshot not found"));
}
