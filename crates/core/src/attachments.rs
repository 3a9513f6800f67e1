//! Inline attachment markers and attachment metadata helpers.
//!
//! Source rich text embeds attachments as `![](index.php?/attachments/get/<id>)`.
//! These markers are rewritten to target markdown links once the attachment
//! has been uploaded.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::target::AttachmentHandle;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Regex pattern matching an inline source attachment marker.
pub const ATTACHMENT_MARKER_PATTERN: &str =
    r"!\[\]\(index\.php\?/attachments/get/([A-Za-z0-9_-]+)\)";

/// Prefix some source versions put in front of attachment ids.
pub const ATTACHMENT_ID_PREFIX: &str = "E_";

/// Name used when the download carries no usable filename.
pub const DEFAULT_ATTACHMENT_NAME: &str = "attachment";

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ATTACHMENT_MARKER_PATTERN).expect("valid regex"));

static DISPOSITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"filename\*=UTF-8''([^;]+)|filename="?([^";]+)"?"#).expect("valid regex")
});

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// Strip the optional `E_` prefix from an attachment id.
pub fn normalize_attachment_id(id: &str) -> &str {
    id.strip_prefix(ATTACHMENT_ID_PREFIX).unwrap_or(id)
}

/// Distinct, normalised attachment ids referenced by `text`, in order of
/// first appearance.
pub fn find_attachment_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for caps in MARKER_RE.captures_iter(text) {
        let id = normalize_attachment_id(&caps[1]).to_string();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Replace every marker whose id `lookup` resolves with a markdown link to
/// the uploaded file. Unresolved markers are left untouched.
pub fn rewrite_markers<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<AttachmentHandle>,
{
    MARKER_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let id = normalize_attachment_id(&caps[1]);
            match lookup(id) {
                Some(handle) => format!("![{}]({})", handle.filename, handle.url),
                None => {
                    tracing::warn!(attachment = id, "Attachment not found, leaving marker in place");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Download metadata
// ---------------------------------------------------------------------------

/// Filename carried by a `Content-Disposition` header.
///
/// The RFC 5987 `filename*=UTF-8''...` form is percent-decoded.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let caps = DISPOSITION_RE.captures(header)?;
    if let Some(encoded) = caps.get(1) {
        return Some(percent_decode(encoded.as_str().trim()));
    }
    caps.get(2).map(|plain| plain.as_str().trim().to_string())
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
