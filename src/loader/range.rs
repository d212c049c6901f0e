use crate::common::errors::{LoadError, LoadResult};

use super::request::ByteWindow;

/// Computes the `Range` header value for a byte window.
///
/// * `None` window, or a window from offset 0 with no length: no header,
///   the whole resource is requested.
/// * Open-ended window from a non-zero offset: `bytes=<offset>-`.
/// * Bounded window: `bytes=<offset>-<offset + length - 1>`.
///
/// A zero-length window, or one whose last byte does not fit in `u64`, is
/// rejected and must not be dispatched.
pub fn resolve_range(window: Option<&ByteWindow>) -> LoadResult<Option<String>> {
    let Some(window) = window else {
        return Ok(None);
    };

    match window.length {
        None if window.offset == 0 => Ok(None),
        None => Ok(Some(format!("bytes={}-", window.offset))),
        Some(length) => {
            let last = length
                .checked_sub(1)
                .and_then(|n| window.offset.checked_add(n))
                .ok_or(LoadError::InvalidRange {
                    offset: window.offset,
                    length: window.length,
                })?;
            Ok(Some(format!("bytes={}-{}", window.offset, last)))
        }
    }
}
