use swe_agent::control_plane::GitCredentials;
use swe_agent::git;
use swe_agent::sandbox::{LocalSandbox, Sandbox};
use swe_agent::tools::{execute, truncate_output, with_co_author, Tool, ToolSet};
use swe_agent::AppError;

fn co_author() -> GitCredentials {
    GitCredentials {
        token: "tok".into(),
        co_author_name: Some("Ada".into()),
        co_author_email: Some("ada@example.com".into()),
        ..GitCredentials::default()
    }
}

#[test]
fn programmer_edits_but_cannot_commit_or_push() {
    let names: Vec<String> = ToolSet::programmer()
        .definitions()
        .into_iter()
        .map(|definition| definition.name)
        .collect();
    assert_eq!(
        names,
        vec!["read_file", "write_file", "list_files", "run_command", "git_status", "git_diff"]
    );
    assert_eq!(ToolSet::programmer().find("commit_changes"), None);
    assert_eq!(ToolSet::programmer().find("push_changes"), None);
}

#[test]
fn inspector_has_read_list_and_run() {
    let names: Vec<String> = ToolSet::inspector()
        .definitions()
        .into_iter()
        .map(|definition| definition.name)
        .collect();
    assert_eq!(names, vec!["read_file", "list_files", "run_command"]);
}

#[test]
fn find_is_limited_to_the_set() {
    assert_eq!(ToolSet::programmer().find("write_file"), Some(Tool::WriteFile));
    assert_eq!(ToolSet::inspector().find("write_file"), None);
    assert_eq!(ToolSet::programmer().find("rm_rf"), None);
}

#[test]
fn definitions_carry_object_schemas() {
    for definition in ToolSet::programmer().definitions() {
        assert_eq!(definition.parameters["type"], "object", "{}", definition.name);
        assert!(!definition.description.is_empty());
    }
}

#[test]
fn output_truncation_marks_the_cut() {
    assert_eq!(truncate_output("short", 10), "short");
    assert_eq!(truncate_output("abcdefghij", 4), "abcd... (truncated)");
}

#[test]
fn co_author_trailer_is_appended_once() {
    let creds = co_author();
    let message = with_co_author("feat: add readme", Some(&creds));
    assert_eq!(
        message,
        "feat: add readme\n\nCo-authored-by: Ada <ada@example.com>"
    );
    assert_eq!(with_co_author(&message, Some(&creds)), message);
    assert_eq!(with_co_author("fix: x", None), "fix: x");
}

#[tokio::test]
async fn file_tools_work_against_the_sandbox() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sandbox = LocalSandbox::new(temp.path(), false).expect("sandbox");

    let wrote = execute(
        Tool::WriteFile,
        r##"{"path":"README.md","content":"# Widgets"}"##,
        &sandbox,
    )
    .await;
    assert_eq!(wrote, "Wrote 9 bytes to README.md");

    let read = execute(Tool::ReadFile, r#"{"path":"README.md"}"#, &sandbox).await;
    assert_eq!(read, "# Widgets");

    let listed = execute(Tool::ListFiles, "", &sandbox).await;
    assert_eq!(listed, "README.md");
}

#[tokio::test]
async fn tool_failures_are_reported_as_text() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sandbox = LocalSandbox::new(temp.path(), false).expect("sandbox");

    let missing = execute(Tool::ReadFile, r#"{"path":"nope.txt"}"#, &sandbox).await;
    assert!(missing.starts_with("Error: "), "{missing}");

    let escape = execute(Tool::ReadFile, r#"{"path":"../../etc/passwd"}"#, &sandbox).await;
    assert!(escape.starts_with("Error: "), "{escape}");

    let bad_args = execute(Tool::WriteFile, "not json", &sandbox).await;
    assert!(bad_args.starts_with("Error: invalid arguments"), "{bad_args}");
}

#[tokio::test]
async fn run_command_returns_combined_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sandbox = LocalSandbox::new(temp.path(), false).expect("sandbox");

    let output = execute(
        Tool::RunCommand,
        r#"{"command":"echo out; echo err >&2; exit 1"}"#,
        &sandbox,
    )
    .await;
    assert_eq!(output, "out\nerr\n\n(exit code 1)");
}

#[tokio::test]
async fn push_to_protected_branch_runs_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let sandbox = LocalSandbox::new(temp.path(), false).expect("sandbox");

    for branch in ["main", "master", "develop", "release"] {
        let err = git::push(&sandbox, branch, "release")
            .await
            .expect_err("protected");
        match err {
            AppError::ProtectedBranch(msg) => {
                assert!(msg.contains(&format!("'{branch}'")), "{msg}");
                assert!(msg.contains("Create a feature branch first."));
            }
            other => panic!("expected protected branch error, got {other}"),
        }
    }
    assert!(sandbox.list_dir(".").await.expect("list").is_empty());
}
