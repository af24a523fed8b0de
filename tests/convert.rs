mod common;

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

use common::{FixtureEntry, ZipBuilder, archive, names, open, placement_free};
use zip2zip::{
    CancelToken, ConvertConfig, ConvertError, ConvertStats, FilterResult, MemoryReader,
    NameFilter, SimpleNameFilter, ZipFileEntry,
};

fn name_config(pattern: &str, include_found: bool) -> ConvertConfig {
    let filter = SimpleNameFilter::default()
        .with_pattern_string(pattern)
        .with_include_found(include_found);
    ConvertConfig::default().with_filter(filter.into_entry_filter())
}

async fn run(
    config: &ConvertConfig,
    cancel: &CancelToken,
    source: Vec<u8>,
) -> (Result<ConvertStats, ConvertError>, Vec<u8>) {
    let mut out = Vec::new();
    let result = config
        .zip_to_filtered(cancel, Arc::new(MemoryReader::new(source)), &mut out)
        .await;
    (result, out)
}

#[tokio::test]
async fn test_include_matching_names() {
    let config = name_config(r"\.txt$", true);
    let source = archive(&["a.txt", "b.log", "c.txt"]);
    let (result, out) = run(&config, &CancelToken::new(), source).await;

    let stats = result.unwrap();
    assert_eq!(names(out).await, ["a.txt", "c.txt"]);
    assert_eq!(
        stats,
        ConvertStats {
            copied: 2,
            skipped_by_filter: 1,
            skipped_by_size: 0,
        }
    );
}

#[tokio::test]
async fn test_exclude_matching_names() {
    let config = name_config(r"\.txt$", false);
    let source = archive(&["a.txt", "b.log", "c.txt"]);
    let (result, out) = run(&config, &CancelToken::new(), source).await;

    assert_eq!(result.unwrap().copied, 1);
    assert_eq!(names(out).await, ["b.log"]);
}

/// Formatted log output kept in memory.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_oversized_entry_is_skipped() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let source = ZipBuilder::new()
        .deflated("small.txt", b"tiny")
        .stored("big.bin", &vec![0u8; 20_000_000])
        .deflated("after.txt", b"still here")
        .build();
    let (result, out) = run(&ConvertConfig::default(), &CancelToken::new(), source).await;

    let stats = result.unwrap();
    assert_eq!(stats.skipped_by_size, 1);
    assert_eq!(stats.copied, 2);
    assert_eq!(names(out).await, ["small.txt", "after.txt"]);

    let logs = logs.contents();
    assert!(logs.contains("WARN"), "{logs}");
    assert!(logs.contains("too big file(20000000): big.bin"), "{logs}");
    assert!(logs.contains("ENV_MAX_ITEM_SIZE"), "{logs}");
    assert!(!logs.contains("small.txt"), "{logs}");
}

#[tokio::test]
async fn test_size_ceiling_is_inclusive() {
    let source = ZipBuilder::new()
        .stored("exact.bin", &[7u8; 100])
        .stored("over.bin", &[7u8; 101])
        .build();
    let config = ConvertConfig::default().with_max_item_size(100);
    let (result, out) = run(&config, &CancelToken::new(), source).await;

    assert_eq!(result.unwrap().skipped_by_size, 1);
    assert_eq!(names(out).await, ["exact.bin"]);
}

#[tokio::test]
async fn test_invalid_pattern_keeps_everything() {
    let config = name_config("(", true);
    let source = archive(&["a.txt", "b.log", "c.txt"]);
    let (result, out) = run(&config, &CancelToken::new(), source).await;

    assert_eq!(result.unwrap().copied, 3);
    assert_eq!(names(out).await, ["a.txt", "b.log", "c.txt"]);
}

#[tokio::test]
async fn test_cancellation_between_entries() {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let filter = move |_entry: &ZipFileEntry| {
        if counter.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
            trigger.cancel();
        }
        FilterResult::Keep
    };
    let config = ConvertConfig::default().with_filter(filter);

    let (result, out) = run(&config, &cancel, archive(&["e0", "e1", "e2", "e3", "e4"])).await;

    let err = result.unwrap_err();
    assert!(matches!(err, ConvertError::Cancelled), "{err:?}");
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    // the destination is still finalized and holds what was copied
    assert_eq!(names(out).await, ["e0", "e1"]);
}

#[tokio::test]
async fn test_cancelled_before_start_copies_nothing() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let (result, out) = run(&ConvertConfig::default(), &cancel, archive(&["a", "b"])).await;

    assert!(result.unwrap_err().is_cancelled());
    assert!(names(out).await.is_empty());
}

#[tokio::test]
async fn test_output_is_deterministic() {
    let source = archive(&["one.txt", "two.log", "three.txt"]);
    let config = name_config(r"\.txt$", true);

    let (first, out_a) = run(&config, &CancelToken::new(), source.clone()).await;
    let (second, out_b) = run(&config, &CancelToken::new(), source).await;

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(out_a, out_b);
}

#[tokio::test]
async fn test_order_is_preserved() {
    let source_names = ["z.txt", "m.log", "a.txt", "q.txt", "b.log", "c.txt"];
    let config = name_config(r"\.txt$", true);
    let (result, out) = run(&config, &CancelToken::new(), archive(&source_names)).await;
    result.unwrap();

    let kept = names(out).await;
    let expected: Vec<_> = source_names
        .iter()
        .filter(|name| name.ends_with(".txt"))
        .map(|name| name.to_string())
        .collect();
    assert_eq!(kept, expected);
}

#[tokio::test]
async fn test_copies_are_verbatim() {
    let text = b"the quick brown fox jumps over the lazy dog\n".repeat(200);
    let source = ZipBuilder::new()
        .deflated("docs/fox.txt", &text)
        .stored("raw.bin", &[1, 2, 3, 4, 5])
        .entry(FixtureEntry {
            data_descriptor: true,
            comment: b"streamed".to_vec(),
            ..FixtureEntry::deflated("streamed.txt", &text)
        })
        .entry(FixtureEntry {
            name: vec![b'n', 0xFF, b'.', b'b'],
            // extended timestamp block
            extra: vec![0x55, 0x54, 0x05, 0x00, 0x01, 0x10, 0x20, 0x30, 0x40],
            ..FixtureEntry::stored("", b"odd name")
        })
        .entry(FixtureEntry::stored("dir/", b""))
        .build();

    let (result, out) = run(&ConvertConfig::default(), &CancelToken::new(), source.clone()).await;
    assert_eq!(result.unwrap().copied, 5);

    let before = open(source).await;
    let after = open(out).await;
    assert_eq!(before.entries().len(), after.entries().len());

    for (src, dst) in before.entries().iter().zip(after.entries()) {
        assert_eq!(placement_free(src), placement_free(dst));

        let mut src_raw = Vec::new();
        let mut dst_raw = Vec::new();
        before.copy_raw(src, &mut src_raw).await.unwrap();
        after.copy_raw(dst, &mut dst_raw).await.unwrap();
        assert_eq!(src_raw, dst_raw, "{}", src.file_name);

        assert_eq!(
            before.read_entry(src).await.unwrap(),
            after.read_entry(dst).await.unwrap(),
            "{}",
            src.file_name
        );
    }

    let fox = &after.entries()[0];
    assert_eq!(after.read_entry(fox).await.unwrap(), text);
    assert!(fox.compressed_size < fox.uncompressed_size);
}

#[tokio::test]
async fn test_truncated_entry_aborts_with_copy_error() {
    let source = ZipBuilder::new()
        .stored("first.txt", b"fine")
        .entry(FixtureEntry {
            declared_size: Some(1_000_000),
            ..FixtureEntry::stored("broken.txt", b"short")
        })
        .stored("never.txt", b"not reached")
        .build();
    let (result, out) = run(&ConvertConfig::default(), &CancelToken::new(), source).await;

    match result.unwrap_err() {
        ConvertError::Copy { name, .. } => assert_eq!(name, "broken.txt"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(names(out).await, ["first.txt"]);
}

#[tokio::test]
async fn test_invalid_source_fails_to_open() {
    let source = b"not a zip file at all, honest".to_vec();
    let (result, out) = run(&ConvertConfig::default(), &CancelToken::new(), source).await;

    assert!(matches!(result, Err(ConvertError::ArchiveOpen(_))));
    assert!(out.is_empty());
}

/// Writer that rejects every write and flush.
struct BrokenPipe;

impl AsyncWrite for BrokenPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed")))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_copy_and_finalize_errors_are_joined() {
    let source = Arc::new(MemoryReader::new(archive(&["a.txt"])));
    let err = ConvertConfig::default()
        .zip_to_filtered(&CancelToken::new(), source, BrokenPipe)
        .await
        .unwrap_err();

    match &err {
        ConvertError::Joined(errors) => {
            assert!(matches!(errors[0], ConvertError::Copy { .. }));
            assert!(matches!(errors[1], ConvertError::Finalize(_)));
        }
        other => panic!("unexpected {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("failed to copy entry a.txt"));
    assert!(message.contains("failed to finalize destination archive"));
    assert!(message.contains("pipe closed"));
}

#[tokio::test]
async fn test_finalize_error_alone() {
    let source = Arc::new(MemoryReader::new(archive(&["a.log"])));
    let err = name_config(r"\.txt$", true)
        .zip_to_filtered(&CancelToken::new(), source, BrokenPipe)
        .await
        .unwrap_err();

    assert!(matches!(err, ConvertError::Finalize(_)), "{err:?}");
}
