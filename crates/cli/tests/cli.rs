use assert_cmd::Command;

#[test]
fn help_lists_subcommands() {
    let output = Command::cargo_bin("shelf").unwrap().arg("--help").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    for subcommand in ["serve", "migrate", "config"] {
        assert!(stdout.contains(subcommand), "missing {subcommand} in help");
    }
}

#[test]
fn config_redacts_secrets() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("base.toml"),
        "[auth]\nusername = \"archivist\"\npassword = \"s3cret\"\n",
    )
    .unwrap();

    let output = Command::cargo_bin("shelf")
        .unwrap()
        .args(["config", "--config-dir"])
        .arg(dir.path())
        .env_remove("SHELF_ENV")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("archivist"));
    assert!(!stdout.contains("s3cret"));
}

#[test]
fn migrate_creates_schema_once() {
    let dir = tempfile::tempdir().unwrap();
    let db_url = format!("sqlite://{}?mode=rwc", dir.path().join("shelf.db").display());

    let run = || {
        Command::cargo_bin("shelf")
            .unwrap()
            .args(["migrate", "--config-dir"])
            .arg(dir.path())
            .env_remove("SHELF_ENV")
            .env("SHELF_DATABASE__URL", &db_url)
            .output()
            .unwrap()
    };

    let first = run();
    assert!(first.status.success());
    assert!(String::from_utf8_lossy(&first.stdout).contains("applied 1 migration(s)"));

    let second = run();
    assert!(second.status.success());
    assert!(String::from_utf8_lossy(&second.stdout).contains("applied 0 migration(s)"));
}

#[test]
fn unknown_environment_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::cargo_bin("shelf")
        .unwrap()
        .args(["config", "--config-dir"])
        .arg(dir.path())
        .env("SHELF_ENV", "mars")
        .output()
        .unwrap();
    assert!(!output.status.success());
}
