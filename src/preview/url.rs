use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use super::error::{PreviewError, Result};

/// Root every sandbox file path lives under.
pub const WORKSPACE_ROOT: &str = "/workspace";

static UNICODE_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\u([0-9a-fA-F]{4})").expect("valid unicode escape regex"));

/// Build the URL used to fetch `path`. Without a sandbox the path is already
/// a usable reference and comes back unchanged.
pub fn resolve_file_url(backend_base: &str, sandbox_id: Option<&str>, path: &str) -> String {
    let Some(sandbox_id) = sandbox_id.filter(|id| !id.is_empty()) else {
        return path.to_string();
    };

    let path = normalize_sandbox_path(path);
    match content_endpoint(backend_base, sandbox_id, &path) {
        Ok(url) => url.to_string(),
        Err(e) => {
            warn!(
                "Could not build content URL from base '{}': {}",
                backend_base, e
            );
            format!(
                "{}/sandboxes/{}/files/content?path={}",
                backend_base.trim_end_matches('/'),
                sandbox_id,
                path
            )
        }
    }
}

/// URL the attachment view points at: a caller-supplied local preview
/// reference wins over the resolved content URL.
pub fn attachment_url(
    backend_base: &str,
    sandbox_id: Option<&str>,
    path: &str,
    local_preview_url: Option<&str>,
) -> String {
    match local_preview_url.filter(|u| !u.is_empty()) {
        Some(local) => local.to_string(),
        None => resolve_file_url(backend_base, sandbox_id, path),
    }
}

/// Prefix `path` with the workspace root and decode `\uXXXX` escapes.
/// Decoding problems are logged and the undecoded path is kept.
pub fn normalize_sandbox_path(path: &str) -> String {
    let prefixed = if path.starts_with(WORKSPACE_ROOT) {
        path.to_string()
    } else {
        format!(
            "{}/{}",
            WORKSPACE_ROOT,
            path.strip_prefix('/').unwrap_or(path)
        )
    };

    match decode_unicode_escapes(&prefixed) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!("Failed to decode unicode escapes in '{}': {}", prefixed, e);
            prefixed
        }
    }
}

/// Replace `\uXXXX` sequences with the characters they encode. Adjacent
/// escapes are decoded as UTF-16, so surrogate pairs combine; an unpaired
/// surrogate is an error.
pub fn decode_unicode_escapes(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut units: Vec<u16> = Vec::new();
    let mut last = 0;

    for caps in UNICODE_ESCAPE.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() != last {
            flush_utf16(&mut units, &mut out)?;
            out.push_str(&input[last..whole.start()]);
        }
        let unit = u16::from_str_radix(&caps[1], 16)
            .map_err(|e| PreviewError::Decode(e.to_string()))?;
        units.push(unit);
        last = whole.end();
    }

    flush_utf16(&mut units, &mut out)?;
    out.push_str(&input[last..]);
    Ok(out)
}

fn flush_utf16(units: &mut Vec<u16>, out: &mut String) -> Result<()> {
    for decoded in char::decode_utf16(units.drain(..)) {
        let c = decoded.map_err(|e| {
            PreviewError::Decode(format!(
                "unpaired surrogate \\u{:04x}",
                e.unpaired_surrogate()
            ))
        })?;
        out.push(c);
    }
    Ok(())
}

fn content_endpoint(backend_base: &str, sandbox_id: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(&format!(
        "{}/sandboxes/{}/files/content",
        backend_base.trim_end_matches('/'),
        sandbox_id
    ))?;
    url.query_pairs_mut().append_pair("path", path);
    Ok(url)
}

/// Convert a sandbox preview-proxy URL such as
/// `https://8000-<id>.<suffix>/index.html` into `<local_base>/8000-<id>/index.html`.
/// Anything that is not a proxy URL comes back unchanged.
pub fn rewrite_proxy_url(url: &str, proxy_host_suffix: &str, local_base: &str) -> String {
    if proxy_host_suffix.is_empty() {
        return url.to_string();
    }

    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return url.to_string(),
    };
    let Some(host) = parsed.host_str() else {
        return url.to_string();
    };
    let suffix = format!(".{}", proxy_host_suffix.trim_start_matches('.'));
    let Some(subdomain) = host.strip_suffix(&suffix) else {
        return url.to_string();
    };
    let subdomain = subdomain.split('.').next().unwrap_or(subdomain);

    let path = if parsed.path() == "/" { "" } else { parsed.path() };
    let rewritten = format!("{}/{}{}", local_base.trim_end_matches('/'), subdomain, path);
    debug!("Rewrote proxy URL {} -> {}", url, rewritten);
    rewritten
}
