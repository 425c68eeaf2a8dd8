#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! migration

mod common;

use common::{TWO_FILES, TestProject, sky_in};
use predicates::prelude::*;

#[test]
fn test_cli_help() {
    let project = TestProject::new();
    project
        .sky()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Declare it. Plan it. Apply it."))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("refresh"));
}

#[test]
fn test_cli_version() {
    let project = TestProject::new();
    project
        .sky()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("skyflow"));
}

#[test]
fn test_apply_help() {
    let project = TestProject::new();
    project
        .sky()
        .args(["apply", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"))
        .stdout(predicate::str::contains("--target"))
        .stdout(predicate::str::contains("--parallelism"));
}

#[test]
fn test_invalid_command() {
    let project = TestProject::new();
    project.sky().arg("invalid-command").assert().failure();
}

#[test]
fn test_plan_without_stack_file() {
    let project = TestProject::new();
    project
        .sky()
        .arg("plan")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Stack file not found"));
}

#[test]
fn test_validate() {
    let project = TestProject::new();
    project.write_stack(TWO_FILES);

    project
        .sky()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Resources: 2 (1 dependencies)"));
}

#[test]
fn test_validate_cycle() {
    let project = TestProject::new();
    project.write_stack(
        r#"
resources:
  - kind: null_resource
    name: a
    depends_on: [null_resource.b]
  - kind: null_resource
    name: b
    attributes:
      triggers: "${null_resource.a.id}"
"#,
    );

    project
        .sky()
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Cyclic dependency"))
        .stderr(predicate::str::contains("null_resource.a"))
        .stderr(predicate::str::contains("null_resource.b"));
}

#[test]
fn test_validate_unknown_reference() {
    let project = TestProject::new();
    project.write_stack(
        r#"
resources:
  - kind: local_file
    name: motd
    attributes:
      filename: motd.txt
      content: "${null_resource.missing.id}"
"#,
    );

    project
        .sky()
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("null_resource.missing"));
}

#[test]
fn test_validate_unknown_kind() {
    let project = TestProject::new();
    project.write_stack(
        r#"
resources:
  - kind: aws_vpc
    name: main
"#,
    );

    project
        .sky()
        .arg("validate")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("aws_vpc"));
}

#[test]
fn test_plan_json() {
    let project = TestProject::new();
    project.write_stack(TWO_FILES);

    let output = project
        .sky()
        .args(["plan", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let plan: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(plan["has_changes"], true);
    assert_eq!(plan["summary"]["create"], 2);

    let steps: Vec<(&str, &str)> = plan["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| (s["address"].as_str().unwrap(), s["action"].as_str().unwrap()))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("null_resource.build", "create"),
            ("local_file.motd", "create")
        ]
    );
}

#[test]
fn test_apply_requires_yes() {
    let project = TestProject::new();
    project.write_stack(TWO_FILES);

    project
        .sky()
        .arg("apply")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 to create"))
        .stdout(predicate::str::contains("--yes"));

    assert!(!project.file("motd.txt").exists());
    assert!(!project.file(".skyflow/state.json").exists());
}

#[test]
fn test_apply_then_no_changes() {
    let project = TestProject::new();
    project.write_stack(TWO_FILES);

    project
        .sky()
        .args(["apply", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Apply complete"));

    let content = project.read("motd.txt").unwrap();
    assert!(content.starts_with("build "));
    assert!(!content.contains("known after apply"));
    assert!(project.file(".skyflow/state.json").exists());
    assert!(!project.file(".skyflow/lock.json").exists());

    project
        .sky()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes"));

    project
        .sky()
        .args(["state", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("local_file.motd"))
        .stdout(predicate::str::contains("null_resource.build"));

    project
        .sky()
        .args(["state", "show", "local_file.motd"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": \"motd.txt\""))
        .stdout(predicate::str::contains("content_hash"));
}

#[test]
fn test_state_show_unknown() {
    let project = TestProject::new();
    project
        .sky()
        .args(["state", "show", "local_file.nothing"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("local_file.nothing"));
}

#[test]
fn test_partial_failure_exit_code() {
    let project = TestProject::new();
    project.write_stack(
        r#"
resources:
  - kind: local_file
    name: good
    attributes:
      filename: good.txt
      content: ok
  - kind: local_file
    name: bad
    attributes:
      filename: bad.txt
      content: 42
  - kind: local_file
    name: after_bad
    attributes:
      filename: after.txt
      content: "${local_file.bad.content_hash}"
"#,
    );

    project
        .sky()
        .args(["apply", "--yes"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("local_file.bad"))
        .stdout(predicate::str::contains("skipped"));

    assert_eq!(project.read("good.txt").as_deref(), Some("ok"));
    assert!(!project.file("after.txt").exists());

    project
        .sky()
        .args(["state", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("local_file.good"))
        .stdout(predicate::str::contains("local_file.bad").not());
}

#[test]
fn test_drop_resource_plans_destroy_only() {
    let project = TestProject::new();
    project.write_stack(TWO_FILES);
    project.sky().args(["apply", "--yes"]).assert().success();

    project.write_stack(
        r#"
resources:
  - kind: null_resource
    name: build
    attributes:
      triggers:
        version: "1"
"#,
    );

    project
        .sky()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("local_file.motd"))
        .stdout(predicate::str::contains(
            "0 to create, 0 to update, 0 to replace, 1 to destroy, 1 unchanged",
        ));

    project.sky().args(["apply", "--yes"]).assert().success();
    assert!(!project.file("motd.txt").exists());
}

#[test]
fn test_taint_forces_replace() {
    let project = TestProject::new();
    project.write_stack(TWO_FILES);
    project.sky().args(["apply", "--yes"]).assert().success();

    project
        .sky()
        .args(["taint", "null_resource.build"])
        .assert()
        .success();

    project
        .sky()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 to replace"));

    project
        .sky()
        .args(["untaint", "null_resource.build"])
        .assert()
        .success();

    project
        .sky()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes"));
}

#[test]
fn test_refresh_detects_deleted_file() {
    let project = TestProject::new();
    project.write_stack(TWO_FILES);
    project.sky().args(["apply", "--yes"]).assert().success();

    std::fs::remove_file(project.file("motd.txt")).unwrap();

    project
        .sky()
        .arg("refresh")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 removed"));

    project
        .sky()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 to create"));
}

#[test]
fn test_destroy() {
    let project = TestProject::new();
    project.write_stack(TWO_FILES);
    project.sky().args(["apply", "--yes"]).assert().success();

    project
        .sky()
        .arg("destroy")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 to destroy"));
    assert!(project.file("motd.txt").exists());

    project.sky().args(["destroy", "--yes"]).assert().success();
    assert!(!project.file("motd.txt").exists());

    project
        .sky()
        .args(["state", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No resources in state"));
}

#[test]
fn test_graph_dot() {
    let project = TestProject::new();
    project.write_stack(TWO_FILES);

    project
        .sky()
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph {"))
        .stdout(predicate::str::contains(
            "\"local_file.motd\" -> \"null_resource.build\";",
        ));
}

#[test]
fn test_stack_in_project_dir_and_settings() {
    let project = TestProject::new();
    std::fs::create_dir(project.file(".skyflow")).unwrap();
    std::fs::write(project.file(".skyflow/stack.yaml"), TWO_FILES).unwrap();
    project.write_settings("local:\n  root: out\n");

    sky_in(&project.path())
        .args(["apply", "--yes"])
        .assert()
        .success();

    assert!(project.file("out/motd.txt").exists());
}

#[test]
fn test_invalid_settings() {
    let project = TestProject::new();
    project.write_stack(TWO_FILES);
    project.write_settings("parallelism: 0\n");

    project
        .sky()
        .arg("plan")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("parallelism"));
}
