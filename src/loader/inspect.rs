use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};

use crate::common::errors::{LoadError, LoadResult};
use crate::transport::ResponseHead;

/// Content type identifier handed to the playback engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    Mp3,
    Aac,
    Mpeg4Audio,
    Mpeg4,
    QuickTime,
    Wave,
    Aiff,
    Flac,
    Ogg,
    Webm,
    Hls,
    /// Well-formed MIME type without a known mapping, kept verbatim.
    Other(String),
}

impl ContentType {
    /// Maps a `Content-Type` value to an identifier. Parameters such as
    /// `; charset=` are ignored. Returns `None` when the value is not a
    /// `type/subtype` pair.
    pub fn from_mime(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        let (kind, subtype) = essence.split_once('/')?;
        if kind.is_empty() || subtype.is_empty() || subtype.contains('/') {
            return None;
        }

        Some(match essence.as_str() {
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg-3" => Self::Mp3,
            "audio/aac" | "audio/aacp" | "audio/x-aac" => Self::Aac,
            "audio/mp4" | "audio/x-m4a" | "audio/m4a" => Self::Mpeg4Audio,
            "video/mp4" | "application/mp4" => Self::Mpeg4,
            "video/quicktime" => Self::QuickTime,
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Self::Wave,
            "audio/aiff" | "audio/x-aiff" => Self::Aiff,
            "audio/flac" | "audio/x-flac" => Self::Flac,
            "audio/ogg" | "application/ogg" => Self::Ogg,
            "audio/webm" | "video/webm" => Self::Webm,
            "application/vnd.apple.mpegurl" | "application/x-mpegurl" | "audio/mpegurl" => Self::Hls,
            _ => Self::Other(essence),
        })
    }

    pub fn identifier(&self) -> &str {
        match self {
            Self::Mp3 => "public.mp3",
            Self::Aac => "public.aac-audio",
            Self::Mpeg4Audio => "public.mpeg-4-audio",
            Self::Mpeg4 => "public.mpeg-4",
            Self::QuickTime => "com.apple.quicktime-movie",
            Self::Wave => "com.microsoft.waveform-audio",
            Self::Aiff => "public.aiff-audio",
            Self::Flac => "org.xiph.flac",
            Self::Ogg => "org.xiph.ogg",
            Self::Webm => "org.webmproject.webm",
            Self::Hls => "public.m3u-playlist",
            Self::Other(mime) => mime,
        }
    }
}

/// A parsed `Content-Range: bytes <start>-<end>/<total>` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    /// `None` when the origin sent `*` for the complete length.
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (span, total) = rest.split_once('/')?;
        let (start, end) = span.trim().split_once('-')?;
        let start = start.trim().parse::<u64>().ok()?;
        let end = end.trim().parse::<u64>().ok()?;
        if end < start {
            return None;
        }
        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse::<u64>().ok()?),
        };
        Some(Self { start, end, total })
    }

    /// Number of bytes this response body covers.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Content metadata extracted from a response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInfo {
    pub content_type: ContentType,
    /// Resource length: the `Content-Range` total when present, otherwise the
    /// declared body length.
    pub content_length: Option<u64>,
    pub byte_range_access: bool,
    pub content_range: Option<ContentRange>,
}

/// Interprets a response head. Header lookups are case-insensitive.
pub fn inspect(head: &ResponseHead) -> LoadResult<ContentInfo> {
    if !(200..300).contains(&head.status) {
        return Err(LoadError::HttpStatus {
            status: head.status,
        });
    }

    let raw_mime = head.headers.get(CONTENT_TYPE).map(|v| v.to_str());
    let content_type = match raw_mime {
        Some(Ok(mime)) => ContentType::from_mime(mime).ok_or_else(|| {
            LoadError::UnresolvableContentType {
                mime: Some(mime.to_string()),
            }
        })?,
        Some(Err(_)) | None => return Err(LoadError::UnresolvableContentType { mime: None }),
    };

    let raw_range = head
        .headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok());
    let content_range = raw_range.and_then(ContentRange::parse);

    let content_length = match raw_range {
        Some(_) => content_range.and_then(|r| r.total),
        None => head.content_length,
    };

    Ok(ContentInfo {
        content_type,
        content_length,
        byte_range_access: raw_range.is_some(),
        content_range,
    })
}
