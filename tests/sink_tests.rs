use splitlog::{
    DirectoryRegistry, EntryFormatter, Error, FileSink, LogEntry, Severity, SinkBuilder,
    SinkConfig, SizeScope, TimeZone, strip_ansi,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes only the message, so every entry is exactly `message.len() + 1` bytes.
struct RawFormatter;

impl EntryFormatter for RawFormatter {
    fn format(&self, entry: &LogEntry, _colors: bool) -> splitlog::Result<Vec<u8>> {
        Ok(format!("{}\n", entry.message).into_bytes())
    }
}

fn raw_builder(dir: &Path) -> SinkBuilder {
    SinkBuilder::new()
        .with_log_dir(dir)
        .with_console(false)
        .with_time_zone(TimeZone::Utc)
        .with_formatter(Box::new(RawFormatter))
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files.sort();
    files
}

fn today() -> String {
    let now = time::OffsetDateTime::now_utc();
    format!(
        "{:04}_{:02}_{:02}",
        now.year(),
        u8::from(now.month()),
        now.day()
    )
}

#[test]
fn test_concurrent_producers_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(
        raw_builder(dir.path())
            .with_max_log_size(4096)
            .open(&DirectoryRegistry::new())
            .unwrap(),
    );

    let threads = 8;
    let per_thread = 500;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let sink = Arc::clone(&sink);
            std::thread::spawn(move || {
                for i in 0..per_thread {
                    sink.handle(LogEntry::new(Severity::Info, format!("t{}-{:04}", t, i)))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    sink.shutdown();

    let files = files_under(dir.path());
    assert!(files.len() > 1, "expected size rotation to produce several files");

    let mut seen: HashMap<String, usize> = HashMap::new();
    for file in &files {
        let content = std::fs::read_to_string(file).unwrap();
        assert!(content.ends_with('\n'));
        let mut last_in_file: HashMap<&str, &str> = HashMap::new();
        for line in content.lines() {
            let (thread, seq) = line.split_once('-').unwrap();
            assert_eq!(seq.len(), 4, "torn line {:?}", line);
            // Within one file a producer's entries keep their call order.
            if let Some(prev) = last_in_file.insert(thread, seq) {
                assert!(prev < seq);
            }
            *seen.entry(line.to_string()).or_default() += 1;
        }
    }
    assert_eq!(seen.len(), threads * per_thread);
    assert!(seen.values().all(|&count| count == 1));
}

#[test]
fn test_directory_exclusivity() {
    let dir = tempfile::tempdir().unwrap();
    let registry = DirectoryRegistry::new();
    let _first = raw_builder(dir.path()).open(&registry).unwrap();

    let err = raw_builder(&dir.path().join(".")).open(&registry).unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    // A different directory in the same registry is fine.
    let other = tempfile::tempdir().unwrap();
    raw_builder(other.path()).open(&registry).unwrap();
}

#[test]
fn test_size_accounting_rotates_on_third_entry() {
    let dir = tempfile::tempdir().unwrap();
    let sink = raw_builder(dir.path())
        .with_write_buffer(false)
        .with_max_log_size(25)
        .open(&DirectoryRegistry::new())
        .unwrap();
    let first = sink.current_log_path().unwrap();

    sink.handle(LogEntry::new(Severity::Info, "123456789")).unwrap();
    sink.handle(LogEntry::new(Severity::Info, "123456789")).unwrap();
    assert_eq!(sink.accumulated_size(), 20);
    assert_eq!(sink.current_log_path().unwrap(), first);

    sink.handle(LogEntry::new(Severity::Info, "123456789")).unwrap();
    assert_eq!(sink.accumulated_size(), 10);
    let second = sink.current_log_path().unwrap();
    assert_ne!(second, first);

    assert_eq!(std::fs::metadata(&first).unwrap().len(), 20);
    assert_eq!(std::fs::metadata(&second).unwrap().len(), 10);
}

#[test]
fn test_error_separation_without_mirroring() {
    let dir = tempfile::tempdir().unwrap();
    let sink = raw_builder(dir.path())
        .with_write_buffer(false)
        .with_error_separation(true, false)
        .open(&DirectoryRegistry::new())
        .unwrap();
    let error_path = sink.current_error_path().unwrap();

    sink.handle(LogEntry::new(Severity::Info, "info")).unwrap();
    assert!(!error_path.exists(), "error file must not exist before the first error");

    sink.handle(LogEntry::new(Severity::Error, "error")).unwrap();
    sink.handle(LogEntry::new(Severity::Panic, "panic")).unwrap();

    let normal = std::fs::read_to_string(sink.current_log_path().unwrap()).unwrap();
    let errors = std::fs::read_to_string(&error_path).unwrap();
    assert_eq!(normal, "info\n");
    assert_eq!(errors, "error\npanic\n");
    assert_eq!(error_path, dir.path().join("default_error.log"));
}

#[test]
fn test_error_separation_with_mirroring_counts_per_stream() {
    let dir = tempfile::tempdir().unwrap();
    let sink = raw_builder(dir.path())
        .with_write_buffer(false)
        .with_error_separation(true, true)
        .open(&DirectoryRegistry::new())
        .unwrap();

    sink.handle(LogEntry::new(Severity::Warn, "warn")).unwrap();
    sink.handle(LogEntry::new(Severity::Error, "error")).unwrap();

    let normal = std::fs::read_to_string(dir.path().join("default.log")).unwrap();
    let errors = std::fs::read_to_string(dir.path().join("default_error.log")).unwrap();
    assert_eq!(normal, "warn\nerror\n");
    assert_eq!(errors, "error\n");
    assert_eq!(sink.accumulated_size(), 5 + 6 + 6);
}

#[test]
fn test_normal_only_scope() {
    let dir = tempfile::tempdir().unwrap();
    let sink = raw_builder(dir.path())
        .with_write_buffer(false)
        .with_error_separation(true, false)
        .with_size_scope(SizeScope::NormalOnly)
        .open(&DirectoryRegistry::new())
        .unwrap();

    sink.handle(LogEntry::new(Severity::Error, "error")).unwrap();
    assert_eq!(sink.accumulated_size(), 0);
}

#[test]
fn test_retention_keeps_marked_files_on_full_purge() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("2020_01_01");
    std::fs::create_dir_all(&old).unwrap();
    std::fs::write(old.join("2020_01_01.log"), "old").unwrap();
    std::fs::create_dir_all(dir.path().join("2020_01_02")).unwrap();
    std::fs::write(dir.path().join("2020_01_02").join("2020_01_02.log"), "old").unwrap();
    std::fs::write(dir.path().join("release_keep"), "kept").unwrap();

    let sink = raw_builder(dir.path())
        .with_write_buffer(false)
        .with_date_split(true)
        .open(&DirectoryRegistry::new())
        .unwrap();
    sink.handle(LogEntry::new(Severity::Info, "before purge")).unwrap();

    let report = sink.sweep(0).unwrap();
    assert_eq!(report.errors, 0);
    assert!(!old.exists());
    assert!(!dir.path().join("2020_01_02").exists());
    assert!(dir.path().join("release_keep").exists());

    // The live file was recreated empty and still takes writes.
    let current = sink.current_log_path().unwrap();
    assert_eq!(std::fs::read_to_string(&current).unwrap(), "");
    sink.handle(LogEntry::new(Severity::Info, "after purge")).unwrap();
    assert_eq!(std::fs::read_to_string(&current).unwrap(), "after purge\n");
}

#[test]
fn test_retention_by_age() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("2020_01_01")).unwrap();
    std::fs::write(dir.path().join("2020_01_01").join("a.log"), "old").unwrap();
    std::fs::create_dir_all(dir.path().join("2020_01_01_keep")).unwrap();
    std::fs::create_dir_all(dir.path().join("notes")).unwrap();

    let sink = raw_builder(dir.path())
        .with_write_buffer(false)
        .with_date_split(true)
        .open(&DirectoryRegistry::new())
        .unwrap();
    sink.handle(LogEntry::new(Severity::Info, "today")).unwrap();

    let report = sink.sweep(7).unwrap();
    assert_eq!(report.removed_dirs, vec![dir.path().join("2020_01_01")]);
    assert!(dir.path().join("2020_01_01_keep").exists());
    assert!(dir.path().join("notes").exists());
    assert!(sink.current_log_path().unwrap().exists());
}

#[test]
fn test_resume_under_threshold_appends() {
    let dir = tempfile::tempdir().unwrap();
    let existing = dir.path().join("2020_01_01_120000.log");
    std::fs::write(&existing, "12345\n").unwrap();

    let sink = raw_builder(dir.path())
        .with_write_buffer(false)
        .with_max_log_size(100)
        .open(&DirectoryRegistry::new())
        .unwrap();
    assert_eq!(sink.current_log_path().unwrap(), existing);
    assert_eq!(sink.accumulated_size(), 6);

    sink.handle(LogEntry::new(Severity::Info, "more")).unwrap();
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "12345\nmore\n");
}

#[test]
fn test_resume_over_threshold_starts_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let existing = dir.path().join("2020_01_01_120000.log");
    std::fs::write(&existing, "x".repeat(100)).unwrap();

    let sink = raw_builder(dir.path())
        .with_write_buffer(false)
        .with_max_log_size(100)
        .open(&DirectoryRegistry::new())
        .unwrap();
    assert_ne!(sink.current_log_path().unwrap(), existing);
    assert_eq!(sink.accumulated_size(), 0);
}

#[test]
fn test_date_split_layout_with_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let sink = raw_builder(dir.path())
        .with_date_split(true)
        .with_error_separation(true, false)
        .with_file_name_suffix("node:1")
        .with_log_ext("txt")
        .open(&DirectoryRegistry::new())
        .unwrap();

    let day = today();
    assert_eq!(
        sink.current_log_path().unwrap(),
        dir.path().join(&day).join(format!("{}_node_1.txt", day))
    );
    assert_eq!(
        sink.current_error_path().unwrap(),
        dir.path().join(&day).join(format!("{}_error_node_1.txt", day))
    );
}

#[test]
fn test_buffered_entries_survive_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let sink = raw_builder(dir.path())
        .with_write_buffer_size(1 << 16)
        .open(&DirectoryRegistry::new())
        .unwrap();

    for i in 0..1000 {
        sink.handle(LogEntry::new(Severity::Info, format!("{}", i))).unwrap();
    }
    drop(sink);

    let content = std::fs::read_to_string(dir.path().join("default.log")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1000);
    assert_eq!(lines[999], "999");
}

#[test]
fn test_both_split_modes_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = DirectoryRegistry::new();
    let config = SinkConfig::new()
        .with_log_dir(dir.path())
        .with_date_split(true)
        .with_max_log_size(1024);

    let err = FileSink::open(&config, &registry).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(!registry.contains(dir.path()));
}

#[test]
fn test_json_output_from_yaml_config() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "log_dir: {:?}\nformat: json\nno_console: true\ndisable_write_buffer: true\ntime_zone: utc\nextra_fields:\n  service: api\n",
        dir.path().display().to_string()
    );
    let config: SinkConfig = serde_yaml::from_str(&yaml).unwrap();
    let sink = FileSink::open(&config, &DirectoryRegistry::new()).unwrap();

    sink.handle(LogEntry::new(Severity::Warn, "disk low").with_field("free_mb", 12))
        .unwrap();

    let content = std::fs::read_to_string(dir.path().join("default.log")).unwrap();
    let value: serde_json::Value = serde_json::from_str(content.trim_end()).unwrap();
    assert_eq!(value["level"], "warn");
    assert_eq!(value["msg"], "disk low");
    assert_eq!(value["free_mb"], 12);
    assert_eq!(value["service"], "api");
    assert!(value["time"].is_string());
}

#[test]
fn test_strip_ansi_cases() {
    assert_eq!(&*strip_ansi(b"\x1b[31mred\x1b[0m"), b"red");
    assert_eq!(
        &*strip_ansi(b"\x1b[1m\x1b[32mbold green\x1b[0m\x1b[0m"),
        b"bold green"
    );
    let malformed = b"\x1b[31xxxxxxx text\x1b[0m";
    assert_eq!(&*strip_ansi(malformed), malformed);
    assert_eq!(&*strip_ansi(b"plain"), b"plain");
}
