//! Minimal XML reader/writer helpers for signature blocks.
//!
//! The engine writes every signature block itself, so the reader only has
//! to understand that output: no namespaces resolution, no comments, no
//! nested elements sharing a name.

/// Escape text or attribute content.
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

pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// One element located in a document, borrowed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    pub name: &'a str,
    /// `<name attr="...">` including the angle brackets.
    pub start_tag: &'a str,
    /// Content between the start and end tags.
    pub inner: &'a str,
    /// The whole element, start tag to end tag.
    pub outer: &'a str,
}

impl<'a> Element<'a> {
    pub fn attribute(&self, attribute: &str) -> Option<String> {
        let needle = format!(" {}=\"", attribute);
        let start = self.start_tag.find(&needle)? + needle.len();
        let end = self.start_tag[start..].find('"')? + start;
        Some(unescape(&self.start_tag[start..end]))
    }

    pub fn text(&self) -> String {
        unescape(self.inner.trim())
    }

    pub fn child(&self, name: &str) -> Option<Element<'a>> {
        first(self.inner, name)
    }

    pub fn children(&self, name: &str) -> Vec<Element<'a>> {
        elements(self.inner, name)
    }
}

/// Every element called `name`, in document order.
pub fn elements<'a>(xml: &'a str, name: &str) -> Vec<Element<'a>> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some((element, next)) = next_element(xml, name, cursor) {
        found.push(element);
        cursor = next;
    }
    found
}

pub fn first<'a>(xml: &'a str, name: &str) -> Option<Element<'a>> {
    next_element(xml, name, 0).map(|(element, _)| element)
}

/// The element carrying `Id="id"`, whatever its name.
pub fn find_by_id<'a>(xml: &'a str, id: &str) -> Option<Element<'a>> {
    let needle = format!(" Id=\"{}\"", escape(id));
    let attr_at = xml.find(&needle)?;
    let open = xml[..attr_at].rfind('<')?;
    let name_end = xml[open + 1..]
        .find(|c: char| c.is_whitespace())
        .map(|i| open + 1 + i)?;
    let name = &xml[open + 1..name_end];
    next_element(xml, name, open).map(|(element, _)| element)
}

fn next_element<'a>(xml: &'a str, name: &str, from: usize) -> Option<(Element<'a>, usize)> {
    let open_needle = format!("<{}", name);
    let mut search = from;
    loop {
        let open = xml[search..].find(&open_needle)? + search;
        let after_name = open + open_needle.len();
        match xml[after_name..].chars().next() {
            Some(c) if c.is_whitespace() || c == '>' || c == '/' => {}
            // A longer name sharing the prefix.
            _ => {
                search = after_name;
                continue;
            }
        }
        let tag_end = xml[after_name..].find('>')? + after_name + 1;
        let start_tag = &xml[open..tag_end];
        if start_tag.ends_with("/>") {
            let element = Element {
                name: &xml[open + 1..after_name],
                start_tag,
                inner: "",
                outer: start_tag,
            };
            return Some((element, tag_end));
        }
        let close_needle = format!("</{}>", name);
        let close = xml[tag_end..].find(&close_needle)? + tag_end;
        let end = close + close_needle.len();
        let element = Element {
            name: &xml[open + 1..after_name],
            start_tag,
            inner: &xml[tag_end..close],
            outer: &xml[open..end],
        };
        return Some((element, end));
    }
}
