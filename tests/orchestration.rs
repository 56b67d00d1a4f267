//! Orchestration tests against scripted stand-ins for identify / convert /
//! pdftk.
//!
//! Each test writes small `sh` scripts into a fresh temp directory and points
//! the config at them. The scripts log their argument vectors and produce
//! predictable output, so these tests cover argument construction, output
//! parsing, error classification and scratch cleanup without needing
//! ImageMagick or pdftk installed.
//!
//! Run with:
//!   cargo test --test orchestration

#![cfg(unix)]

use futures::future::join_all;
use futures::stream;
use pdf_massage::{Document, Massage, MassageConfig, MassageError};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// ── Stand-in tools ───────────────────────────────────────────────────────────

/// Reports a 6 x 4 in, 2-page PDF; rejects anything containing `NOTPDF`.
const FAKE_IDENTIFY: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$(dirname "$0")/identify.args"
input=$(cat)
case "$input" in
  *NOTPDF*)
    echo "identify: no decode delegate for this image format \`-'" >&2
    exit 1 ;;
  *WARN*)
    echo "**** Warning: page has no fonts" >&2 ;;
esac
printf 'PDF,432,288,2,PDF,432,288,2,'
"#;

/// Copies its input to the last argument; fails on a `bad` geometry.
const FAKE_CONVERT: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$(dirname "$0")/convert.args"
for a in "$@"; do
  [ "$a" = "bad" ] && { echo "convert: invalid argument for option \`-resize'" >&2; exit 1; }
done
eval "out=\${$#}"
printf 'CONVERTED' > "$out"
"#;

/// `in... cat output out` concatenates; `in burst output pattern` writes
/// as many pages as the input's decimal content says, last page first.
const FAKE_PDFTK: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$(dirname "$0")/pdftk.args"
if [ "$2" = "burst" ]; then
  n=$(cat "$1")
  case "$n" in
    ''|*[!0-9]*) echo "Error: Unable to find file." >&2; exit 1 ;;
  esac
  i=$n
  while [ "$i" -gt 0 ]; do
    printf 'page %d' "$i" > "$(printf "$4" "$i")"
    i=$((i - 1))
  done
  echo "InfoKey: Producer" > doc_data.txt
  exit 0
fi
eval "out=\${$#}"
for a in "$@"; do
  [ "$a" = "cat" ] && break
  cat "$a" || exit 1
done > "$out"
"#;

/// Route library logs through the test writer; `RUST_LOG=debug` shows them.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

struct Harness {
    tools: TempDir,
    scratch: TempDir,
    massage: Massage,
}

impl Harness {
    fn new() -> Self {
        Self::with(|b| b)
    }

    fn with(
        tweak: impl FnOnce(pdf_massage::MassageConfigBuilder) -> pdf_massage::MassageConfigBuilder,
    ) -> Self {
        init_logging();
        let tools = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let identify = script(tools.path(), "identify", FAKE_IDENTIFY);
        let convert = script(tools.path(), "convert", FAKE_CONVERT);
        let pdftk = script(tools.path(), "pdftk", FAKE_PDFTK);
        let builder = MassageConfig::builder()
            .scratch_dir(scratch.path())
            .identify_path(identify)
            .convert_path(convert)
            .pdftk_path(pdftk)
            .tool_timeout_secs(30);
        let massage = Massage::new(tweak(builder).build().unwrap()).unwrap();
        Self {
            tools,
            scratch,
            massage,
        }
    }

    /// Argument vector the named tool saw on its last run.
    fn args(&self, tool: &str) -> Vec<String> {
        std::fs::read_to_string(self.tools.path().join(format!("{tool}.args")))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn scratch_entries(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.scratch.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    fn assert_scratch_empty(&self) {
        let left = self.scratch_entries();
        assert!(left.is_empty(), "scratch files left behind: {left:?}");
    }
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

// ── Metadata ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn meta_data_is_parsed_from_stdin_run() {
    let h = Harness::new();
    let meta = h.massage.get_meta_data(b"%PDF-1.4".to_vec()).await.unwrap();

    assert_eq!(meta.file_type, "PDF");
    assert_eq!(meta.width, 6.0);
    assert_eq!(meta.length, 4.0);
    assert_eq!(meta.page_count, 2);
    assert_eq!(h.args("identify"), ["-density", "72", "-format", "%m,%[fx:w],%[fx:h],%n,", "-"]);
    h.assert_scratch_empty();
}

#[tokio::test]
async fn identify_error_line_means_invalid_document() {
    let h = Harness::new();
    let err = h.massage.get_meta_data(b"NOTPDF".to_vec()).await.unwrap_err();
    assert_eq!(err, MassageError::InvalidDocument);
    assert_eq!(err.name(), "Invalid PDF File");
    h.assert_scratch_empty();
}

#[tokio::test]
async fn benign_stderr_does_not_fail_inspection() {
    let h = Harness::new();
    let meta = h.massage.get_meta_data(b"WARN".to_vec()).await.unwrap();
    assert_eq!(meta.page_count, 2);
}

#[tokio::test]
async fn meta_data_accepts_a_stream() {
    let h = Harness::new();
    let chunks = stream::iter(vec![
        Ok::<_, io::Error>(b"%PDF".to_vec()),
        Ok(b"-1.4".to_vec()),
    ]);
    let meta = h
        .massage
        .get_meta_data(Document::from_stream(chunks))
        .await
        .unwrap();
    assert_eq!(meta.page_count, 2);
}

// ── Rotate ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rotate_builds_argument_vector_and_cleans_up() {
    let h = Harness::new();
    let out = h.massage.rotate_pdf(b"%PDF".to_vec(), 270).await.unwrap();

    assert_eq!(out, b"CONVERTED");
    let args = h.args("convert");
    assert_eq!(&args[..4], ["-rotate", "270", "-density", "300"]);
    assert!(args[4].ends_with("/in.pdf"), "input arg {:?}", args[4]);
    assert!(args[5].ends_with("/out.pdf"), "output arg {:?}", args[5]);
    assert!(args[4].starts_with(&h.scratch.path().display().to_string()));
    h.assert_scratch_empty();
}

#[tokio::test]
async fn rotate_rejects_odd_angles_without_running_anything() {
    let h = Harness::new();
    for degrees in [0, 45, -90, 360] {
        assert_eq!(
            h.massage.rotate_pdf(b"%PDF".to_vec(), degrees).await.unwrap_err(),
            MassageError::InvalidRotation
        );
    }
    assert!(!h.tools.path().join("convert.args").exists());
    h.assert_scratch_empty();
}

#[tokio::test]
async fn rotate_reads_a_file_stream() {
    let h = Harness::new();
    let input = h.tools.path().join("input.pdf");
    std::fs::write(&input, b"%PDF-1.7").unwrap();
    let file = tokio::fs::File::open(&input).await.unwrap();

    let out = h
        .massage
        .rotate_pdf(Document::from_reader(file), 90)
        .await
        .unwrap();
    assert_eq!(out, b"CONVERTED");
    h.assert_scratch_empty();
}

#[tokio::test]
async fn failing_input_stream_is_processing_failure() {
    let h = Harness::new();
    let chunks = stream::iter(vec![
        Ok(b"%PDF".to_vec()),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away")),
    ]);
    let err = h
        .massage
        .rotate_pdf(Document::from_stream(chunks), 90)
        .await
        .unwrap_err();
    assert_eq!(err, MassageError::ProcessingFailure);
    h.assert_scratch_empty();
}

// ── Merge ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_concatenates_in_order() {
    let h = Harness::new();
    let merged = h
        .massage
        .merge(b"first|".to_vec(), b"second".to_vec())
        .await
        .unwrap();

    assert_eq!(merged, b"first|second");
    let args = h.args("pdftk");
    assert_eq!(args.len(), 5);
    assert!(args[0].ends_with("/in1.pdf"));
    assert!(args[1].ends_with("/in2.pdf"));
    assert_eq!(&args[2..4], ["cat", "output"]);
    assert!(args[4].ends_with("/out.pdf"));
    h.assert_scratch_empty();
}

#[tokio::test]
async fn merge_all_handles_many_inputs() {
    let h = Harness::new();
    let docs: Vec<Document> = (1..=5).map(|i| format!("{i}").into_bytes().into()).collect();
    let merged = h.massage.merge_all(docs).await.unwrap();
    assert_eq!(merged, b"12345");
    h.assert_scratch_empty();
}

#[tokio::test]
async fn merge_with_bad_locator_cleans_up_the_other_input() {
    let h = Harness::new();
    let err = h
        .massage
        .merge(b"first".to_vec(), "not a url")
        .await
        .unwrap_err();
    assert_eq!(err, MassageError::InvalidLocator);
    assert!(!h.tools.path().join("pdftk.args").exists());
    h.assert_scratch_empty();
}

#[tokio::test]
async fn empty_merge_never_reaches_the_tool() {
    let h = Harness::new();
    let err = h.massage.merge_all(Vec::new()).await.unwrap_err();
    assert_eq!(err, MassageError::ProcessingFailure);
    assert!(!h.tools.path().join("pdftk.args").exists());
    h.assert_scratch_empty();
}

// ── Burst ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn burst_returns_pages_in_order() {
    let h = Harness::new();
    let pages = h.massage.burst_pdf(b"12".to_vec()).await.unwrap();

    assert_eq!(pages.len(), 12);
    for (i, page) in pages.iter().enumerate() {
        let n = i as u32 + 1;
        assert_eq!(page.page, n);
        assert_eq!(page.bytes, format!("page {n}").into_bytes());
    }
    let args = h.args("pdftk");
    assert_eq!(args[0], "in.pdf");
    assert_eq!(&args[1..3], ["burst", "output"]);
    assert_eq!(args[3], "page_%03d");
    h.assert_scratch_empty();
}

#[tokio::test]
async fn burst_of_single_page_document() {
    let h = Harness::new();
    let pages = h.massage.burst_pdf(b"1".to_vec()).await.unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].page, 1);
    h.assert_scratch_empty();
}

#[tokio::test]
async fn burst_failure_is_processing_failure_and_cleans_up() {
    let h = Harness::new();
    let err = h.massage.burst_pdf(b"garbage".to_vec()).await.unwrap_err();
    assert_eq!(err, MassageError::ProcessingFailure);
    h.assert_scratch_empty();
}

#[tokio::test]
async fn concurrent_bursts_do_not_share_files() {
    let h = Harness::new();
    let runs = (1..=6).map(|n| {
        let massage = h.massage.clone();
        async move { (n, massage.burst_pdf(n.to_string().into_bytes()).await) }
    });
    for (n, result) in join_all(runs).await {
        let pages = result.unwrap();
        assert_eq!(pages.len(), n, "burst of {n} pages");
        assert_eq!(pages.last().unwrap().bytes, format!("page {n}").into_bytes());
    }
    h.assert_scratch_empty();
}

// ── Thumbnail ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn thumbnail_renders_first_page_only() {
    let h = Harness::new();
    let png = h
        .massage
        .generate_thumbnail(b"%PDF".to_vec(), "200x200")
        .await
        .unwrap();

    assert_eq!(png, b"CONVERTED");
    let args = h.args("convert");
    assert_eq!(&args[..4], ["-resize", "200x200", "-density", "72"]);
    assert!(args[4].ends_with("/in[0]"), "input arg {:?}", args[4]);
    assert!(args[5].ends_with("/out.png"));
    h.assert_scratch_empty();
}

#[tokio::test]
async fn malformed_geometry_is_processing_failure() {
    let h = Harness::new();
    let err = h
        .massage
        .generate_thumbnail(b"%PDF".to_vec(), "bad")
        .await
        .unwrap_err();
    assert_eq!(err, MassageError::ProcessingFailure);
    h.assert_scratch_empty();
}

#[tokio::test]
async fn thumbnail_format_follows_config() {
    let h = Harness::with(|b| b.thumbnail_format("jpg").thumbnail_density(96));
    h.massage
        .generate_thumbnail(b"%PDF".to_vec(), "20%")
        .await
        .unwrap();
    let args = h.args("convert");
    assert_eq!(args[3], "96");
    assert!(args[5].ends_with("/out.jpg"));
}

// ── Image → PDF ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_to_pdf_sets_density() {
    let h = Harness::new();
    let pdf = h.massage.image_to_pdf(b"\x89PNG".to_vec(), 150).await.unwrap();

    assert_eq!(pdf, b"CONVERTED");
    let args = h.args("convert");
    assert!(args[0].ends_with("/in"));
    assert_eq!(
        &args[1..7],
        ["-quality", "100", "-units", "PixelsPerInch", "-density", "150x150"]
    );
    assert!(args[7].ends_with("/out.pdf"));
    h.assert_scratch_empty();
}

// ── Concurrency, timeouts, cancellation ──────────────────────────────────────

#[tokio::test]
async fn mixed_concurrent_operations_leave_nothing_behind() {
    let h = Harness::new();
    let m = &h.massage;
    let (meta, rotated, merged, pages, thumb, pdf) = tokio::join!(
        m.get_meta_data(b"%PDF".to_vec()),
        m.rotate_pdf(b"%PDF".to_vec(), 180),
        m.merge(b"a".to_vec(), b"b".to_vec()),
        m.burst_pdf(b"3".to_vec()),
        m.generate_thumbnail(b"%PDF".to_vec(), "50%"),
        m.image_to_pdf(b"\x89PNG".to_vec(), 300),
    );
    assert_eq!(meta.unwrap().page_count, 2);
    assert_eq!(rotated.unwrap(), b"CONVERTED");
    assert_eq!(merged.unwrap(), b"ab");
    assert_eq!(pages.unwrap().len(), 3);
    assert_eq!(thumb.unwrap(), b"CONVERTED");
    assert_eq!(pdf.unwrap(), b"CONVERTED");
    h.assert_scratch_empty();
}

#[tokio::test]
async fn hung_tool_is_killed_and_cleaned_up() {
    let h = Harness::with(|b| b.tool_timeout_secs(1));
    let slow = script(h.tools.path(), "slow-convert", "#!/bin/sh\nsleep 30\n");
    let config = MassageConfig {
        convert_path: slow,
        ..h.massage.config().clone()
    };
    let massage = Massage::new(config).unwrap();

    let err = massage.rotate_pdf(b"%PDF".to_vec(), 90).await.unwrap_err();
    assert_eq!(err, MassageError::ProcessingFailure);
    h.assert_scratch_empty();
}

#[tokio::test]
async fn dropped_operation_still_cleans_up() {
    let h = Harness::new();
    let slow = script(h.tools.path(), "slow-convert", "#!/bin/sh\nsleep 30\n");
    let config = MassageConfig {
        convert_path: slow,
        ..h.massage.config().clone()
    };
    let massage = Massage::new(config).unwrap();

    let cancelled = tokio::time::timeout(
        Duration::from_millis(300),
        massage.rotate_pdf(b"%PDF".to_vec(), 90),
    )
    .await;
    assert!(cancelled.is_err());
    h.assert_scratch_empty();
}

#[tokio::test]
async fn burst_dropped_mid_run_removes_partial_pages() {
    let h = Harness::new();
    // writes two pages and the side log, then hangs
    let stuck = script(
        h.tools.path(),
        "stuck-pdftk",
        "#!/bin/sh\nprintf p1 > page_001\nprintf p2 > page_002\necho log > doc_data.txt\n\
         touch \"$(dirname \"$0\")/ready\"\nsleep 30\n",
    );
    let config = MassageConfig {
        pdftk_path: stuck,
        ..h.massage.config().clone()
    };
    let massage = Massage::new(config).unwrap();
    let ready = h.tools.path().join("ready");

    let raced = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::select! {
            result = massage.burst_pdf(b"2".to_vec()) => {
                panic!("burst finished despite a hung tool: {result:?}")
            }
            _ = async {
                while !ready.exists() {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            } => {}
        }
    })
    .await;
    assert!(raced.is_ok(), "tool never started");
    h.assert_scratch_empty();
}

#[test]
fn operations_run_on_a_plain_executor() {
    let h = Harness::new();
    let result = tokio_test::block_on(h.massage.get_buffer(b"abc".to_vec()));
    assert_eq!(result.unwrap(), b"abc");
    assert_eq!(
        tokio_test::block_on(h.massage.get_buffer("ftp//nope")).unwrap_err(),
        MassageError::InvalidLocator
    );
}
