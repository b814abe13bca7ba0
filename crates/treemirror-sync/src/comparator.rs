//! Exact content equality
//!
//! [`streams_equal`] is a pure function over two readable byte streams and
//! knows nothing about the filesystem, so it can be exercised directly with
//! in-memory byte slices. [`files_equal`] wraps it with a size short-circuit
//! and opens both files through the [`ILocalFileSystem`] port.
//!
//! This is an exact test, not a content hash: no false positives and no
//! false negatives, at the cost of reading both files in full when they
//! match.

use std::io;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use treemirror_core::{domain::FileSystemEntry, ports::ILocalFileSystem};

/// Read-ahead for each side of a comparison
const BUFFER_SIZE: usize = 64 * 1024;

/// Compares two byte streams in lock-step
///
/// Returns `false` at the first mismatching byte, or as soon as one stream
/// ends while the other still has data. Returns `true` when both streams end
/// together.
///
/// # Errors
/// Propagates the first read error from either stream
pub async fn streams_equal<A, B>(left: A, right: B) -> io::Result<bool>
where
    A: AsyncRead + Unpin,
    B: AsyncRead + Unpin,
{
    let mut left = BufReader::with_capacity(BUFFER_SIZE, left);
    let mut right = BufReader::with_capacity(BUFFER_SIZE, right);

    loop {
        let l = left.fill_buf().await?;
        let r = right.fill_buf().await?;

        let n = l.len().min(r.len());
        if n == 0 {
            // At least one side is exhausted: equal only if both are.
            return Ok(l.is_empty() && r.is_empty());
        }

        if l[..n] != r[..n] {
            return Ok(false);
        }

        left.consume(n);
        right.consume(n);
    }
}

/// Whether a destination file is byte-identical to its source
///
/// Entries of different sizes are unequal without opening either file.
///
/// # Errors
/// Returns an error if either file cannot be opened or read
pub async fn files_equal(
    fs: &dyn ILocalFileSystem,
    source: &FileSystemEntry,
    destination: &FileSystemEntry,
) -> anyhow::Result<bool> {
    if source.size != destination.size {
        return Ok(false);
    }

    let left = fs
        .open_read(&source.path)
        .await
        .with_context(|| format!("Failed to open {}", source.path))?;
    let right = fs
        .open_read(&destination.path)
        .await
        .with_context(|| format!("Failed to open {}", destination.path))?;

    streams_equal(left, right).await.with_context(|| {
        format!(
            "Failed to compare {} with {}",
            source.path, destination.path
        )
    })
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    async fn eq(a: &[u8], b: &[u8]) -> bool {
        streams_equal(a, b).await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_vs_empty_is_equal() {
        assert!(eq(b"", b"").await);
    }

    #[tokio::test]
    async fn test_empty_vs_non_empty_differs() {
        assert!(!eq(b"", b"x").await);
        assert!(!eq(b"x", b"").await);
    }

    #[tokio::test]
    async fn test_identical_content_is_equal() {
        assert!(eq(b"hello mirror", b"hello mirror").await);
    }

    #[tokio::test]
    async fn test_equal_length_different_content() {
        assert!(!eq(b"abcdef", b"abcxef").await);
        assert!(!eq(b"X", b"Y").await);
    }

    #[tokio::test]
    async fn test_prefix_equal_different_length() {
        assert!(!eq(b"abc", b"abcd").await);
        assert!(!eq(b"abcd", b"abc").await);
    }

    #[tokio::test]
    async fn test_content_larger_than_buffer() {
        let a = vec![7u8; BUFFER_SIZE * 3 + 17];
        let mut b = a.clone();
        assert!(eq(&a, &b).await);

        // Mismatch in the last byte, well past the first buffer fill
        *b.last_mut().unwrap() = 8;
        assert!(!eq(&a, &b).await);
    }

    #[tokio::test]
    async fn test_misaligned_chunk_boundaries() {
        // Same bytes delivered in different chunkings on each side
        let left = (&b"ab"[..]).chain(&b"cdef"[..]).chain(&b"g"[..]);
        let right = (&b"abcde"[..]).chain(&b"fg"[..]);
        assert!(streams_equal(left, right).await.unwrap());

        let left = (&b"ab"[..]).chain(&b"cdef"[..]);
        let right = (&b"abcde"[..]).chain(&b"fg"[..]);
        assert!(!streams_equal(left, right).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_error_propagates() {
        struct Broken;

        impl AsyncRead for Broken {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<io::Result<()>> {
                std::task::Poll::Ready(Err(io::Error::from(io::ErrorKind::PermissionDenied)))
            }
        }

        let err = streams_equal(Broken, &b"x"[..]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
