use swe_agent::AppError;

#[test]
fn display_prefixes_the_category() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Db("locked".into()), "db: locked"),
        (AppError::Queue("gone".into()), "queue: gone"),
        (AppError::Sandbox("escape".into()), "sandbox: escape"),
        (AppError::Llm("timeout".into()), "llm: timeout"),
        (AppError::Git("no repo".into()), "git: no repo"),
        (AppError::ProtectedBranch("main".into()), "protected branch: main"),
        (AppError::InvalidState("running".into()), "invalid state: running"),
        (AppError::NotFound("s1".into()), "not found: s1"),
        (AppError::BadRequest("empty".into()), "bad request: empty"),
        (AppError::ControlPlane("503".into()), "control plane: 503"),
        (AppError::Serialization("eof".into()), "serialization: eof"),
        (AppError::Io("denied".into()), "io: denied"),
        (AppError::Workflow("no handler".into()), "workflow: no handler"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("missing")));
}

#[test]
fn json_errors_convert_to_serialization() {
    let parse = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
    let err: AppError = parse.into();
    assert!(matches!(err, AppError::Serialization(_)));
}

#[test]
fn toml_errors_convert_to_config() {
    let parse = toml::from_str::<toml::Value>("= nope").expect_err("invalid toml");
    let err: AppError = parse.into();
    assert!(matches!(err, AppError::Config(_)));
}
