use chrono::Local;
use loghub::record::LogRecord;
use loghub::writer::naming;
use loghub::writer::FileWriter;
use std::sync::Arc;
use tempfile::TempDir;

fn record(app_code: &str, version: &str, content: &str) -> Arc<LogRecord> {
    Arc::new(LogRecord {
        app_code: app_code.to_string(),
        version: version.to_string(),
        level: "INFO".to_string(),
        content: content.to_string(),
        timestamp: Local::now(),
        seq: 0,
    })
}

fn log_files(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".log"))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_session_restart_cycle_produces_gapless_runs() {
    let temp_dir = TempDir::new().unwrap();
    let app_dir = temp_dir.path().join("svc");

    // First run
    let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * 1024 * 1024, 500, 4));
    writer.begin_session("svc", "1.0").await.unwrap();
    writer.submit(record("svc", "1.0", "run one"));
    writer.flush("svc").await.unwrap();
    assert_eq!(log_files(&app_dir), vec!["svc_1.0_1-1.log"]);

    // Simulated process restart: brand new writer, new session
    let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * 1024 * 1024, 500, 4));
    writer.begin_session("svc", "1.0").await.unwrap();
    writer.submit(record("svc", "1.0", "run two"));
    writer.flush("svc").await.unwrap();

    assert_eq!(
        log_files(&app_dir),
        vec!["svc_1.0_1-1.log", "svc_1.0_2-1.log"]
    );
}

#[tokio::test]
async fn test_restart_without_session_resumes_last_file() {
    let temp_dir = TempDir::new().unwrap();
    let app_dir = temp_dir.path().join("svc");

    let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * 1024 * 1024, 500, 4));
    writer.begin_session("svc", "1.0").await.unwrap();
    writer.submit(record("svc", "1.0", "before restart"));
    writer.flush("svc").await.unwrap();

    // Restart without begin_session: keeps appending to run 1
    let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * 1024 * 1024, 500, 4));
    writer.submit(record("svc", "1.0", "after restart"));
    writer.flush("svc").await.unwrap();

    assert_eq!(log_files(&app_dir), vec!["svc_1.0_1-1.log"]);
    let content = std::fs::read_to_string(app_dir.join("svc_1.0_1-1.log")).unwrap();
    assert!(content.contains("before restart"));
    assert!(content.contains("after restart"));
}

#[tokio::test]
async fn test_size_ceiling_splits_batch_across_file_indices() {
    let temp_dir = TempDir::new().unwrap();
    let app_dir = temp_dir.path().join("svc");

    // Each line is ~40 bytes with its timestamp; ceiling fits two of them
    let writer = Arc::new(FileWriter::new(temp_dir.path(), 90, 500, 4));
    writer.begin_session("svc", "1.0").await.unwrap();

    for i in 0..4 {
        writer.submit(record("svc", "1.0", &format!("payload {:04}", i)));
    }
    let written = writer.flush("svc").await.unwrap();
    assert_eq!(written, 4);

    let files = log_files(&app_dir);
    assert!(files.contains(&"svc_1.0_1-1.log".to_string()));
    assert!(files.contains(&"svc_1.0_1-2.log".to_string()));

    // Every record survived the rotation, in submission order
    let mut all_lines = Vec::new();
    for name in &files {
        let content = std::fs::read_to_string(app_dir.join(name)).unwrap();
        all_lines.extend(content.lines().map(str::to_string));
    }
    assert_eq!(all_lines.len(), 4);
    for (i, line) in all_lines.iter().enumerate() {
        assert!(line.ends_with(&format!("payload {:04}", i)));
    }

    // The first file closed at or just past the ceiling boundary
    let first_len = std::fs::metadata(app_dir.join("svc_1.0_1-1.log")).unwrap().len();
    assert!(first_len >= 90);
    assert!(first_len < 90 + 60);
}

#[tokio::test]
async fn test_naming_scan_matches_writer_output() {
    let temp_dir = TempDir::new().unwrap();
    let app_dir = temp_dir.path().join("svc");

    let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * 1024 * 1024, 500, 4));
    writer.begin_session("svc", "2.1.0").await.unwrap();
    writer.submit(record("svc", "2.1.0", "line"));
    writer.flush("svc").await.unwrap();

    assert_eq!(naming::max_run_index(&app_dir, "svc", "2.1.0"), 1);
    assert_eq!(
        naming::next_run_and_file_index(&app_dir, "svc", "2.1.0", 20 * 1024 * 1024),
        (1, 1)
    );
}

#[tokio::test]
async fn test_unrelated_apps_do_not_interfere() {
    let temp_dir = TempDir::new().unwrap();

    let writer = Arc::new(FileWriter::new(temp_dir.path(), 20 * 1024 * 1024, 500, 4));
    writer.begin_session("svc-a", "1.0").await.unwrap();
    writer.begin_session("svc-b", "1.0").await.unwrap();

    writer.submit(record("svc-a", "1.0", "alpha"));
    writer.submit(record("svc-b", "1.0", "beta"));
    writer.flush_all().await;

    let a = std::fs::read_to_string(temp_dir.path().join("svc-a/svc-a_1.0_1-1.log")).unwrap();
    let b = std::fs::read_to_string(temp_dir.path().join("svc-b/svc-b_1.0_1-1.log")).unwrap();
    assert!(a.contains("alpha") && !a.contains("beta"));
    assert!(b.contains("beta") && !b.contains("alpha"));
}
