use std::io;
use std::sync::{Arc, Mutex};
use std::thread;

use logsink::{LogConfig, LoggerFactory, LoggingError, Severity, SinkWriter, new_logger};
use serde_json::{Value, json};

/// In-memory destination standing in for stdout/stderr
#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }

    fn records(&self) -> Vec<Value> {
        self.contents()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Harness {
    stdout: Buffer,
    stderr: Buffer,
    factory: LoggerFactory,
}

fn harness() -> Harness {
    let stdout = Buffer::default();
    let stderr = Buffer::default();
    let factory = LoggerFactory::new()
        .with_stdout(SinkWriter::new(stdout.clone()))
        .with_stderr(SinkWriter::new(stderr.clone()));
    Harness {
        stdout,
        stderr,
        factory,
    }
}

fn console(level: &str) -> LogConfig {
    LogConfig {
        log_level: level.to_string(),
        log_to_console: true,
        ..LogConfig::default()
    }
}

#[test]
fn every_known_level_builds() {
    for severity in Severity::ALL {
        let h = harness();
        let result = h.factory.build(&console(severity.as_str()));
        assert!(result.is_ok(), "level {severity} failed to build");
    }
}

#[test]
fn unknown_level_is_rejected() {
    let err = new_logger(&console("chatty")).unwrap_err();
    assert!(matches!(err, LoggingError::InvalidLevel(ref level) if level == "chatty"));
}

#[test]
fn directory_as_log_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        log_to_file: true,
        log_file_path: Some(dir.path().to_path_buf()),
        ..LogConfig::default()
    };

    match new_logger(&config) {
        Err(LoggingError::Io { path, .. }) => assert_eq!(path, dir.path()),
        other => panic!("expected Io error, got {other:?}"),
    }
}

#[test]
fn no_outputs_fall_back_to_stderr() {
    let h = harness();
    let (logger, cleanup) = h.factory.build(&LogConfig::default()).unwrap();

    logger.info("fallback", &[]);
    cleanup.run();

    let records = h.stderr.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["msg"], "fallback");
    assert!(h.stdout.contents().is_empty());
}

#[test]
fn file_and_console_both_receive_records() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let config = LogConfig {
        log_to_file: true,
        log_file_path: Some(path.clone()),
        ..console("info")
    };
    let (logger, cleanup) = h.factory.build(&config).unwrap();

    logger.debug("filtered everywhere", &[]);
    logger.info("everywhere", &[("request", json!(7))]);
    cleanup.run();

    let file_records: Vec<Value> = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let stdout_records = h.stdout.records();

    for records in [&file_records, &stdout_records] {
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["msg"], "everywhere");
        assert_eq!(records[0]["request"], 7);
    }
    for key in ["ts", "level", "caller", "logger"] {
        assert_eq!(file_records[0][key], stdout_records[0][key], "{key} differs");
    }
    assert!(h.stderr.contents().is_empty());
}

#[test]
fn fanned_out_records_are_identical_across_sinks() {
    let h = harness();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let config = LogConfig {
        log_to_file: true,
        log_file_path: Some(path.clone()),
        ..console("info")
    };
    let (logger, cleanup) = h.factory.build(&config).unwrap();

    for i in 0..100 {
        logger.error("failed", &[("attempt", json!(i))]);
    }
    cleanup.run();

    let file_content = std::fs::read_to_string(&path).unwrap();
    let stdout_content = h.stdout.contents();
    assert_eq!(file_content.lines().count(), 100);
    assert_eq!(file_content, stdout_content);
}

#[test]
fn colliding_attribute_is_kept_under_prefix() {
    let h = harness();
    let (logger, cleanup) = h.factory.build(&console("info")).unwrap();

    logger.info("real", &[("msg", json!("shadow")), ("region", json!("eu"))]);
    cleanup.run();

    let record = &h.stdout.records()[0];
    assert_eq!(record["msg"], "real");
    assert_eq!(record["fields.msg"], "shadow");
    assert_eq!(record["region"], "eu");
}

#[test]
fn error_stacktrace_skips_logger_frames() {
    let h = harness();
    let (logger, cleanup) = h.factory.build(&console("error")).unwrap();

    logger.error("failed", &[]);
    cleanup.run();

    let record = &h.stdout.records()[0];
    let stacktrace = record["stacktrace"].as_str().unwrap();
    assert!(!stacktrace.contains("logsink::fanout"), "{stacktrace}");
    assert!(!stacktrace.contains("logsink::logging::Logger::emit"), "{stacktrace}");
}

#[test]
fn file_is_appended_across_loggers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let config = LogConfig {
        log_to_file: true,
        log_file_path: Some(path.clone()),
        ..LogConfig::default()
    };

    for msg in ["first", "second"] {
        let (logger, cleanup) = new_logger(&config).unwrap();
        logger.warn(msg, &[]);
        cleanup.run();
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let messages: Vec<String> = content
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["msg"].to_string())
        .collect();
    assert_eq!(messages, ["\"first\"", "\"second\""]);
}

#[test]
fn below_minimum_level_is_dropped() {
    let h = harness();
    let (logger, cleanup) = h.factory.build(&console("error")).unwrap();

    logger.debug("no", &[]);
    logger.info("no", &[]);
    logger.warn("no", &[]);
    cleanup.run();

    assert!(h.stdout.contents().is_empty());
}

#[test]
fn only_error_records_carry_stacktrace() {
    let h = harness();
    let (logger, cleanup) = h.factory.build(&console("debug")).unwrap();

    logger.warn("warned", &[]);
    logger.error("failed", &[]);
    cleanup.run();

    let records = h.stdout.records();
    assert_eq!(records.len(), 2);
    assert!(records[0].get("stacktrace").is_none());
    assert!(!records[1]["stacktrace"].as_str().unwrap().is_empty());
}

#[test]
fn cleanup_closes_the_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let config = LogConfig {
        log_to_file: true,
        log_file_path: Some(path.clone()),
        ..LogConfig::default()
    };
    let (logger, cleanup) = new_logger(&config).unwrap();

    logger.info("before", &[]);
    cleanup.run();
    logger.info("after", &[]);

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("before"));
    assert!(!content.contains("after"));
}

#[test]
fn dropping_cleanup_releases_on_early_exit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let config = LogConfig {
        log_to_file: true,
        log_file_path: Some(path.clone()),
        ..LogConfig::default()
    };

    fn fails_midway(config: &LogConfig) -> Result<logsink::Logger, String> {
        let (logger, _cleanup) = new_logger(config).map_err(|e| e.to_string())?;
        logger.info("started", &[]);
        Err("gave up".to_string())
    }

    assert!(fails_midway(&config).is_err());
    assert!(std::fs::read_to_string(&path).unwrap().contains("started"));
}

#[test]
fn warn_record_matches_wire_format() {
    let h = harness();
    let (logger, cleanup) = h.factory.build(&console("info")).unwrap();

    logger.warn("disk low", &[]);
    logger.debug("not shown", &[]);
    cleanup.run();

    let output = h.stdout.contents();
    assert_eq!(output.lines().count(), 1);
    assert!(output.contains(r#""level":"warn""#));
    assert!(output.contains(r#""msg":"disk low""#));

    let record = &h.stdout.records()[0];
    let caller = record["caller"].as_str().unwrap();
    assert!(caller.starts_with("tests/logger.rs:"), "{caller}");
}

#[test]
fn tracing_macros_in_scope_reach_the_logger() {
    let h = harness();
    let (logger, cleanup) = h.factory.build(&console("info")).unwrap();

    logger.in_scope(|| tracing::info!(user = "ada", "signed in"));
    {
        let _guard = logger.set_default();
        tracing::warn!("guarded");
    }
    tracing::warn!("nowhere");
    cleanup.run();

    let records = h.stdout.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["logger"], module_path!());
    assert_eq!(records[0]["user"], "ada");
    assert_eq!(records[1]["msg"], "guarded");
}

#[test]
fn config_name_labels_records() {
    let h = harness();
    let config = LogConfig {
        name: "api".to_string(),
        ..console("info")
    };
    let (logger, cleanup) = h.factory.build(&config).unwrap();

    logger.info("ready", &[]);
    cleanup.run();

    assert_eq!(logger.name(), "api");
    assert_eq!(h.stdout.records()[0]["logger"], "api");
}

#[test]
fn dev_mode_console_is_human_readable() {
    let h = harness();
    let config = LogConfig {
        dev_mode: true,
        ..console("info")
    };
    let (logger, cleanup) = h.factory.build(&config).unwrap();

    logger.warn("disk low", &[("device", json!("sda"))]);
    cleanup.run();

    let output = h.stdout.contents();
    assert!(serde_json::from_str::<Value>(output.trim()).is_err());
    let fields: Vec<&str> = output.trim_end().split('\t').collect();
    assert_eq!(fields[1].trim(), "warn");
    assert_eq!(fields[4], "disk low");
    assert_eq!(fields[5], r#"{"device":"sda"}"#);
}

#[test]
fn concurrent_records_stay_whole() {
    let h = harness();
    let (logger, cleanup) = h.factory.build(&console("info")).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let logger = logger.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    logger.info("tick", &[("worker", json!(worker)), ("i", json!(i))]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    cleanup.run();

    assert_eq!(h.stdout.records().len(), 400);
}
