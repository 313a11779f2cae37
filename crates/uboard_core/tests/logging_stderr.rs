use uboard_core::{init_logging, logging_status};

#[test]
fn stderr_logging_is_idempotent_and_pinned_to_stderr() {
    assert!(logging_status().is_none());
    assert!(init_logging("loud", None).is_err());
    assert!(logging_status().is_none());

    init_logging("warn", None).unwrap();
    init_logging(" Warning ", None).unwrap();
    assert_eq!(logging_status(), Some(("warn", None)));

    let dir = tempfile::tempdir().unwrap();
    let error = init_logging("warn", dir.path().to_str()).unwrap_err();
    assert!(error.contains("stderr"));
    assert!(error.contains("refusing to switch"));

    let error = init_logging("error", None).unwrap_err();
    assert!(error.contains("`warn`"));

    log::warn!("event=test_line module=core status=ok");
}
