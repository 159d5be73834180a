use super::*;

fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lowering.toml");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

#[test]
fn test_defaults() {
    let config = LoweringConfig::default();
    assert_eq!(config.word_width, TcgWidth::I64);
    assert!(!config.parallel);
    assert!(config.optimize_jump_slots);
}

#[test]
fn test_empty_file_gives_defaults() {
    let (_dir, path) = write_config("# nothing here\n");
    assert_eq!(LoweringConfig::load(&path).unwrap(), LoweringConfig::default());
}

#[test]
fn test_load_from_file() {
    let (_dir, path) = write_config(
        r#"
[target]
word_width = 32

[lowering]
parallel = true   # use the pool
optimize_jump_slots = false
"#,
    );
    let config = LoweringConfig::load(&path).unwrap();
    assert_eq!(config.word_width, TcgWidth::I32);
    assert!(config.parallel);
    assert!(!config.optimize_jump_slots);
}

#[test]
fn test_rejects_unsupported_width() {
    let (_dir, path) = write_config("[target]\nword_width = 16\n");
    let err = LoweringConfig::load(&path).unwrap_err();
    assert_eq!(err.kind, crate::diagnostic::DiagnosticKind::Config);
    assert!(err.message.contains("must be 32 or 64"));
}

#[test]
fn test_rejects_bad_bool() {
    let (_dir, path) = write_config("[lowering]\nparallel = yes\n");
    let err = LoweringConfig::load(&path).unwrap_err();
    assert!(err.message.contains("invalid lowering.parallel"));
}

#[test]
fn test_rejects_unknown_key() {
    let (_dir, path) = write_config("[lowering]\nthreads = 4\n");
    let err = LoweringConfig::load(&path).unwrap_err();
    assert!(err.message.contains("unknown key 'threads'"));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = LoweringConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(err.message.contains("cannot read lowering config"));
}
