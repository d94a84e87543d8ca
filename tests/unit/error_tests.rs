//! Unit tests for `AppError` display format.

use agent_beacon::AppError;

#[test]
fn display_prefixes_category() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Io("bad".into()), "io: bad"),
        (AppError::Registry("bad".into()), "registry: bad"),
        (AppError::Protocol("bad".into()), "protocol: bad"),
        (AppError::Transport("bad".into()), "transport: bad"),
        (AppError::Timeout("bad".into()), "timeout: bad"),
        (AppError::Unauthorized("bad".into()), "unauthorized: bad"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn error_message_no_trailing_period() {
    let err = AppError::Transport("connection reset".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn implements_std_error_trait() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    let err = AppError::Registry("test".into());
    assert_error(&err);
    assert!(format!("{err:?}").contains("Registry"));
}

#[test]
fn toml_error_converts_to_config() {
    let parse: Result<toml::Value, _> = toml::from_str("x = [");
    let err: AppError = parse.unwrap_err().into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn io_error_converts_to_io() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into();
    assert!(matches!(err, AppError::Io(_)));
    assert_eq!(err.to_string(), "io: pipe closed");
}
