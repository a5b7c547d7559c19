//! URL discovery in channel chatter.
//!
//! Lines that didn't carry a trigger get scanned for things that look
//! like links: `http(s)://host` with an optional path, or a bare
//! `host.tld/path`. A bare hostname with no path is ignored (too many
//! false positives on ordinary prose), and a leading `!` escapes a URL
//! from scanning entirely.

use std::sync::OnceLock;

use regex::Regex;

static URL_RE: OnceLock<Regex> = OnceLock::new();

fn url_re() -> &'static Regex {
    URL_RE.get_or_init(|| {
        Regex::new(r"(!)?(?:(https?)://)?([^\s/]+\.[^\s/]+)(/\S*)?").expect("valid pattern")
    })
}

/// Scans `text` and yields `(domain, url)` per discovered link, in
/// order of appearance. The domain is lowercased with one leading
/// `www.` removed; the url is normalized to carry a scheme.
pub fn scan(text: &str) -> Vec<(String, String)> {
    let mut found = Vec::new();
    for caps in url_re().captures_iter(text) {
        if caps.get(1).is_some() {
            continue;
        }
        let scheme = caps.get(2).map(|m| m.as_str());
        let host = match caps.get(3) {
            Some(m) => m.as_str(),
            None => continue,
        };
        let path = caps.get(4).map_or("", |m| m.as_str());
        if scheme.is_none() && path.is_empty() {
            continue;
        }
        let url = format!("{}://{}{}", scheme.unwrap_or("http"), host, path);
        let lowered = host.to_lowercase();
        let domain = lowered.strip_prefix("www.").unwrap_or(&lowered).to_string();
        found.push((domain, url));
    }
    found
}
