//! # Page record model
//!
//! Typed representation of one `<page>` element from a MediaWiki XML dump.
//! Everything except the revision body is opaque metadata that is copied
//! through unchanged; the body is rewritten at most once by a worker before
//! the page is serialized again.
//!
//! Serialization is event based through `quick-xml`'s indenting [`Writer`].
//! Structural elements are indented; character data is written inline, so
//! the body comes back byte for byte. Optional sub-blocks that were absent
//! from the input are omitted from the output.

use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::{PipelineError, Result};

/// Indentation used when re-serializing pages.
const INDENT_CHAR: u8 = b' ';
const INDENT_SIZE: usize = 4;

/// One page (record) of the dump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Page title, the deduplication key.
    pub title: String,
    pub ns: String,
    pub id: String,
    pub redirect: Option<Redirect>,
    pub revision: Revision,
}

/// `<redirect title="..."/>` marker present on redirect stubs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirect {
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Revision {
    pub id: String,
    pub parentid: Option<String>,
    pub timestamp: String,
    pub contributor: Contributor,
    pub comment: Option<String>,
    pub model: Option<String>,
    pub format: Option<String>,
    pub text: PageText,
    /// Checksum of the original body. Carried through as-is, it is not
    /// recomputed after the body is rewritten.
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contributor {
    pub username: Option<String>,
    pub id: Option<String>,
    pub ip: Option<String>,
}

/// The `<text>` element: the mutable body plus its attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pub bytes: Option<String>,
    /// Value of `xml:space`.
    pub space: Option<String>,
    pub body: String,
}

impl Page {
    /// Create a page with a title and body; remaining metadata is empty.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let mut page = Self {
            title: title.into(),
            ..Self::default()
        };
        page.revision.text.body = body.into();
        page
    }

    /// Key used by the dedup gate.
    pub fn identifier(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.revision.text.body
    }

    /// Replace the body with transformed text.
    pub fn set_body(&mut self, body: String) {
        self.revision.text.body = body;
    }

    /// Whether the body starts with the redirect marker.
    pub fn is_redirect(&self, marker: &str) -> bool {
        self.body().starts_with(marker)
    }

    /// Serialize the page as an indented `<page>` element.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), INDENT_CHAR, INDENT_SIZE);
        self.write_to(&mut writer).map_err(|e| self.serialize_error(e))?;
        String::from_utf8(writer.into_inner()).map_err(|e| self.serialize_error(e))
    }

    fn write_to<W: Write>(&self, w: &mut Writer<W>) -> quick_xml::Result<()> {
        w.write_event(Event::Start(BytesStart::new("page")))?;
        text_element(w, "title", &self.title)?;
        text_element(w, "ns", &self.ns)?;
        text_element(w, "id", &self.id)?;
        if let Some(redirect) = &self.redirect {
            let start = BytesStart::new("redirect")
                .with_attributes([("title", redirect.title.as_str())]);
            w.write_event(Event::Empty(start))?;
        }
        self.revision.write_to(w)?;
        w.write_event(Event::End(BytesEnd::new("page")))
    }

    fn serialize_error(&self, e: impl std::fmt::Display) -> PipelineError {
        PipelineError::Serialize {
            title: self.title.clone(),
            message: e.to_string(),
        }
    }
}

impl Revision {
    fn write_to<W: Write>(&self, w: &mut Writer<W>) -> quick_xml::Result<()> {
        w.write_event(Event::Start(BytesStart::new("revision")))?;
        text_element(w, "id", &self.id)?;
        optional_element(w, "parentid", self.parentid.as_deref())?;
        text_element(w, "timestamp", &self.timestamp)?;

        let contributor = &self.contributor;
        w.write_event(Event::Start(BytesStart::new("contributor")))?;
        optional_element(w, "username", contributor.username.as_deref())?;
        optional_element(w, "id", contributor.id.as_deref())?;
        optional_element(w, "ip", contributor.ip.as_deref())?;
        w.write_event(Event::End(BytesEnd::new("contributor")))?;

        optional_element(w, "comment", self.comment.as_deref())?;
        optional_element(w, "model", self.model.as_deref())?;
        optional_element(w, "format", self.format.as_deref())?;

        let mut start = BytesStart::new("text");
        if let Some(bytes) = &self.text.bytes {
            start.push_attribute(("bytes", bytes.as_str()));
        }
        if let Some(space) = &self.text.space {
            start.push_attribute(("xml:space", space.as_str()));
        }
        w.write_event(Event::Start(start))?;
        w.write_event(Event::Text(BytesText::new(&self.text.body)))?;
        w.write_event(Event::End(BytesEnd::new("text")))?;

        optional_element(w, "sha1", self.sha1.as_deref())?;
        w.write_event(Event::End(BytesEnd::new("revision")))
    }
}

/// `<name>value</name>` on one line. The text event is always written, even
/// when empty, so the closing tag never gets an indent of its own.
fn text_element<W: Write>(w: &mut Writer<W>, name: &str, value: &str) -> quick_xml::Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(value)))?;
    w.write_event(Event::End(BytesEnd::new(name)))
}

fn optional_element<W: Write>(
    w: &mut Writer<W>,
    name: &str,
    value: Option<&str>,
) -> quick_xml::Result<()> {
    match value {
        Some(value) => text_element(w, name, value),
        None => Ok(()),
    }
}
