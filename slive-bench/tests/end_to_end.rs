use slive_bench::config::{Config, Storage};
use slive_bench::report::read_report;
use slive_bench::run::run;
use slive_service::ExecutionMode;
use slive_test::storage::TestStorage;

fn operations(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[tokio::test]
async fn in_memory_run() {
    slive_test::tracing::init();
    let output = tempfile::tempdir().unwrap();
    let config = Config {
        storage: Storage::Memory,
        operations: operations(&["mkdir", "write", "read", "delete_dir", "delete_file", "ls"]),
        workers: 4,
        ops_per_worker: 120,
        file_size_mb: 0,
        pool_size: 8,
        seed: Some(1),
        output: output.path().join("report.txt"),
        ..Default::default()
    };

    let report = run(&config).await.unwrap();

    let names: Vec<_> = report
        .summaries
        .iter()
        .map(|s| s.operation.as_str())
        .collect();
    assert_eq!(
        names,
        ["delete_dir", "delete_file", "list", "mkdir", "read", "write"]
    );
    for summary in &report.summaries {
        assert_eq!(summary.count, 80, "{summary}");
        assert!(summary.min_time >= 0, "{summary}");
    }

    let mkdir = &report.summaries[3];
    assert_eq!(mkdir.error_count, 0);

    let written = read_report(&config.output).await.unwrap();
    assert_eq!(written, report);
}

#[tokio::test]
async fn on_disk_run() {
    slive_test::tracing::init();
    let storage = TestStorage::new();
    let config = Config {
        storage: Storage::FileSystem {
            path: storage.path().to_owned(),
        },
        operations: operations(&["write", "append_truncate", "mkdir"]),
        workers: 2,
        ops_per_worker: 6,
        file_size_mb: 1,
        pool_size: 2,
        mode: ExecutionMode::Sequential,
        seed: Some(3),
        output: storage.join("report/slive-report.txt"),
        ..Default::default()
    };

    let report = run(&config).await.unwrap();

    let total: u64 = report.summaries.iter().map(|s| s.count).sum();
    assert_eq!(total, 12);
    assert!(report.summaries.iter().all(|s| s.error_count == 0));

    assert_eq!(
        storage.files_under("slive/write/0"),
        ["slive/write/0/file_0", "slive/write/0/file_3"]
    );
    assert_eq!(storage.dirs_in("slive/mkdir/1"), ["dir_2", "dir_5"]);

    let truncated = storage.join("slive/append_truncate/1/file_4");
    assert_eq!(std::fs::metadata(truncated).unwrap().len(), 500);
    let written = storage.join("slive/write/1/file_3");
    assert_eq!(std::fs::metadata(written).unwrap().len(), 1024 * 1024);

    let read = read_report(&config.output).await.unwrap();
    assert_eq!(read.parameters.storage, config.storage.to_string());
    assert_eq!(read.totals, report.totals);
}

#[tokio::test]
async fn invalid_config_touches_no_storage() {
    let storage = TestStorage::new();
    let config = Config {
        storage: Storage::FileSystem {
            path: storage.join("data"),
        },
        operations: Vec::new(),
        output: storage.join("report.txt"),
        ..Default::default()
    };

    assert!(run(&config).await.is_err());
    assert!(storage.files_under("").is_empty());
    assert!(storage.dirs_in("").is_empty());
}
