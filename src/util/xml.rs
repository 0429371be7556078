//! Minimal XML helpers for the SOAP and indicator responses.
//!
//! The carrier and bank responses are flat envelopes, so reading a value
//! means finding an element by local name, ignoring namespace prefixes.

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Decodes the predefined entities and numeric character references.
/// Unknown or malformed references are kept as written.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&after[..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse::<u32>().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Text of the first element whose local name is `name`.
pub fn element_text(xml: &str, name: &str) -> Option<String> {
    elements_text(xml, name).into_iter().next()
}

/// Text of every element whose local name is `name`, in document order.
/// Self-closing elements yield an empty string.
pub fn elements_text(xml: &str, name: &str) -> Vec<String> {
    elements_raw(xml, name).into_iter().map(unescape).collect()
}

/// Undecoded content of every element whose local name is `name`, for
/// reading child elements of repeated records.
pub fn elements_raw<'a>(xml: &'a str, name: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut rest = xml;

    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            break;
        };
        let tag = &after[..close];
        rest = &after[close + 1..];

        if tag.starts_with('/') || tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }
        let self_closing = tag.ends_with('/');
        let qualified = tag
            .trim_end_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or_default();
        if local_name(qualified) != name {
            continue;
        }
        if self_closing {
            found.push("");
            continue;
        }

        let closing = format!("</{qualified}>");
        if let Some(end) = rest.find(&closing) {
            found.push(rest[..end].trim());
            rest = &rest[end + closing.len()..];
        }
    }

    found
}

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}
