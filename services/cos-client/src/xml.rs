//! Just enough XML for the multipart protocol and error bodies.
//!
//! Responses are small, flat documents; values are extracted by element name
//! and echoed back verbatim.

use std::fmt::Write as _;

/// The text of the first `<name>…</name>` element in `body`, if any.
///
/// Leading and trailing whitespace is trimmed; entities are not decoded.
pub(crate) fn element<'b>(body: &'b str, name: &str) -> Option<&'b str> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");

    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim())
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// The `<CompleteMultipartUpload>` body for `(part number, etag)` pairs,
/// which must already be in ascending part-number order.
pub(crate) fn complete_multipart_upload<'e, I>(parts: I) -> String
where
    I: IntoIterator<Item = (usize, &'e str)>,
{
    let mut body = String::from("<CompleteMultipartUpload>");
    for (number, etag) in parts {
        let _ = write!(
            body,
            "<Part><PartNumber>{number}</PartNumber><ETag>{}</ETag></Part>",
            escape(etag)
        );
    }
    body.push_str("</CompleteMultipartUpload>");
    body
}
