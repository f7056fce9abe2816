//! # Dump decoder
//!
//! Pull-based reader that walks the dump event by event and materializes one
//! [`Page`] at a time. The document is never parsed as a whole: everything
//! outside `<page>` elements (site info, namespaces) is skipped, and a page
//! is released as soon as its closing tag is seen.
//!
//! The decoder also owns the dedup gate. Only the first page carrying a given
//! title is forwarded; later ones are logged and discarded.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::{PipelineError, Result};
use crate::record::{Page, Redirect};

const PAGE_TAG: &[u8] = b"page";

/// Titles already emitted during this run.
///
/// Grows for the lifetime of the run and is never pruned: evicting entries
/// would let a late duplicate through.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: FxHashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `identifier`. Returns `false` if it was already present.
    pub fn insert(&mut self, identifier: &str) -> bool {
        self.seen.insert(identifier.to_owned())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Counters reported by the decoder when it finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Pages parsed from the input.
    pub pages_read: u64,
    /// Pages dropped by the dedup gate.
    pub duplicates: u64,
    /// Pages pushed onto the handoff queue.
    pub emitted: u64,
}

/// Streaming page decoder over any buffered reader.
pub struct DumpDecoder<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    seen: DedupSet,
    stats: DecoderStats,
}

impl<R: BufRead> DumpDecoder<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::with_capacity(8 * 1024),
            seen: DedupSet::new(),
            stats: DecoderStats::default(),
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Read the next `<page>` element, without deduplication.
    ///
    /// Returns `Ok(None)` at end of input.
    pub fn next_page(&mut self) -> Result<Option<Page>> {
        loop {
            self.buf.clear();
            let at_page = {
                let event = self
                    .reader
                    .read_event_into(&mut self.buf)
                    .map_err(|e| PipelineError::decode(self.reader.buffer_position() as u64, e))?;
                match event {
                    Event::Start(ref e) => e.local_name().as_ref() == PAGE_TAG,
                    Event::Eof => return Ok(None),
                    _ => false,
                }
            };

            if at_page {
                let page = read_page(&mut self.reader, &mut self.buf)?;
                self.stats.pages_read += 1;
                return Ok(Some(page));
            }
        }
    }

    /// Read the next page whose title has not been seen before.
    pub fn next_unique(&mut self) -> Result<Option<Page>> {
        while let Some(page) = self.next_page()? {
            if self.seen.insert(page.identifier()) {
                return Ok(Some(page));
            }
            self.stats.duplicates += 1;
            warn!(title = %page.title, "Duplicate title, skipping");
        }
        Ok(None)
    }

    /// Drive the handoff queue until the input is exhausted.
    ///
    /// `sender` is dropped on return, which closes the queue and lets the
    /// workers drain and exit.
    pub fn run(mut self, ctx: &RunContext, sender: flume::Sender<Page>) -> Result<DecoderStats> {
        info!(dump = %ctx.name, "Decoder started");

        loop {
            if ctx.is_cancelled() {
                debug!("Decoder observed cancellation");
                return Err(PipelineError::Cancelled);
            }

            let Some(page) = self.next_unique()? else {
                break;
            };

            if sender.send(page).is_err() {
                return Err(if ctx.is_cancelled() {
                    PipelineError::Cancelled
                } else {
                    PipelineError::ChannelClosed("handoff")
                });
            }
            self.stats.emitted += 1;
        }

        info!(
            pages_read = self.stats.pages_read,
            duplicates = self.stats.duplicates,
            emitted = self.stats.emitted,
            unique_titles = self.seen.len(),
            "Decoder done"
        );
        Ok(self.stats)
    }
}

/// Parse the body of a `<page>` element whose start tag was just consumed.
fn read_page<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Page> {
    let mut page = Page::default();
    // Element names below <page>, outermost first.
    let mut path: Vec<String> = Vec::new();

    loop {
        buf.clear();
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event_into(buf)
            .map_err(|e| PipelineError::decode(position, e))?;

        match event {
            Event::Start(e) => {
                path.push(element_name(&e));
                enter_element(&mut page, &path, &e)
                    .map_err(|e| PipelineError::decode(position, e))?;
            }
            Event::Empty(e) => {
                path.push(element_name(&e));
                enter_element(&mut page, &path, &e)
                    .map_err(|e| PipelineError::decode(position, e))?;
                path.pop();
            }
            Event::Text(text) => {
                if let Some(field) = field_mut(&mut page, &path) {
                    let text = text
                        .unescape()
                        .map_err(|e| PipelineError::decode(position, e))?;
                    field.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(field) = field_mut(&mut page, &path) {
                    let text = std::str::from_utf8(&data)
                        .map_err(|e| PipelineError::decode(position, e))?;
                    field.push_str(text);
                }
            }
            Event::End(_) => {
                if path.pop().is_none() {
                    return Ok(page);
                }
            }
            Event::Eof => {
                return Err(PipelineError::decode(
                    position,
                    "unexpected end of input inside <page>",
                ));
            }
            _ => {}
        }
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Pick up attributes and mark optional fields as present.
fn enter_element(page: &mut Page, path: &[String], e: &BytesStart<'_>) -> quick_xml::Result<()> {
    let keys: Vec<&str> = path.iter().map(String::as_str).collect();
    match keys.as_slice() {
        ["redirect"] => {
            page.redirect = Some(Redirect {
                title: attribute(e, "title")?.unwrap_or_default(),
            });
        }
        ["revision", "text"] => {
            page.revision.text.bytes = attribute(e, "bytes")?;
            page.revision.text.space = attribute(e, "xml:space")?;
        }
        _ => {}
    }
    field_mut(page, path);
    Ok(())
}

fn attribute(e: &BytesStart<'_>, name: &str) -> quick_xml::Result<Option<String>> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// Map an element path to the field its character data belongs to.
fn field_mut<'a>(page: &'a mut Page, path: &[String]) -> Option<&'a mut String> {
    let keys: Vec<&str> = path.iter().map(String::as_str).collect();
    let revision = &mut page.revision;
    let field = match keys.as_slice() {
        ["title"] => &mut page.title,
        ["ns"] => &mut page.ns,
        ["id"] => &mut page.id,
        ["revision", "id"] => &mut revision.id,
        ["revision", "parentid"] => revision.parentid.get_or_insert_with(String::new),
        ["revision", "timestamp"] => &mut revision.timestamp,
        ["revision", "contributor", "username"] => {
            revision.contributor.username.get_or_insert_with(String::new)
        }
        ["revision", "contributor", "id"] => {
            revision.contributor.id.get_or_insert_with(String::new)
        }
        ["revision", "contributor", "ip"] => {
            revision.contributor.ip.get_or_insert_with(String::new)
        }
        ["revision", "comment"] => revision.comment.get_or_insert_with(String::new),
        ["revision", "model"] => revision.model.get_or_insert_with(String::new),
        ["revision", "format"] => revision.format.get_or_insert_with(String::new),
        ["revision", "text"] => &mut revision.text.body,
        ["revision", "sha1"] => revision.sha1.get_or_insert_with(String::new),
        _ => return None,
    };
    Some(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{dump, page_xml};

    fn decoder(xml: &str) -> DumpDecoder<&[u8]> {
        DumpDecoder::new(xml.as_bytes())
    }

    #[test]
    fn test_dedup_set_first_insert_wins() {
        let mut set = DedupSet::new();
        assert!(set.is_empty());
        assert!(set.insert("Dog"));
        assert!(!set.insert("Dog"));
        assert!(set.insert("dog"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_parses_full_page() {
        let xml = dump(&[r#"
  <page>
    <title>Dog</title>
    <ns>0</ns>
    <id>12</id>
    <revision>
      <id>100</id>
      <parentid>99</parentid>
      <timestamp>2020-05-01T00:00:00Z</timestamp>
      <contributor>
        <username>Alice</username>
        <id>7</id>
      </contributor>
      <comment>tidy</comment>
      <model>wikitext</model>
      <format>text/x-wiki</format>
      <text bytes="22" xml:space="preserve">Dogs &amp; [[wolves]].
More.</text>
      <sha1>abc123</sha1>
    </revision>
  </page>"#]);

        let mut decoder = decoder(&xml);
        let page = decoder.next_page().unwrap().unwrap();

        assert_eq!(page.title, "Dog");
        assert_eq!(page.ns, "0");
        assert_eq!(page.id, "12");
        assert!(page.redirect.is_none());
        assert_eq!(page.revision.id, "100");
        assert_eq!(page.revision.parentid.as_deref(), Some("99"));
        assert_eq!(page.revision.timestamp, "2020-05-01T00:00:00Z");
        assert_eq!(page.revision.contributor.username.as_deref(), Some("Alice"));
        assert_eq!(page.revision.contributor.id.as_deref(), Some("7"));
        assert_eq!(page.revision.contributor.ip, None);
        assert_eq!(page.revision.comment.as_deref(), Some("tidy"));
        assert_eq!(page.revision.model.as_deref(), Some("wikitext"));
        assert_eq!(page.revision.format.as_deref(), Some("text/x-wiki"));
        assert_eq!(page.revision.text.bytes.as_deref(), Some("22"));
        assert_eq!(page.revision.text.space.as_deref(), Some("preserve"));
        assert_eq!(page.body(), "Dogs & [[wolves]].\nMore.");
        assert_eq!(page.revision.sha1.as_deref(), Some("abc123"));

        assert!(decoder.next_page().unwrap().is_none());
        assert_eq!(decoder.stats().pages_read, 1);
    }

    #[test]
    fn test_redirect_attribute_and_empty_elements() {
        let xml = dump(&[r#"
  <page>
    <title>Kitty</title>
    <ns>0</ns>
    <id>3</id>
    <redirect title="Cat" />
    <revision>
      <id>5</id>
      <timestamp>2020-05-01T00:00:00Z</timestamp>
      <contributor><ip>127.0.0.1</ip></contributor>
      <comment />
      <text bytes="17" xml:space="preserve">#REDIRECT [[Cat]]</text>
    </revision>
  </page>"#]);

        let page = decoder(&xml).next_page().unwrap().unwrap();
        assert_eq!(page.redirect.as_ref().map(|r| r.title.as_str()), Some("Cat"));
        assert_eq!(page.revision.contributor.ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(page.revision.comment.as_deref(), Some(""));
        assert_eq!(page.body(), "#REDIRECT [[Cat]]");
        assert!(page.is_redirect("#REDIRECT"));
    }

    #[test]
    fn test_cdata_body() {
        let xml = dump(&[
            "<page><title>C</title><revision><text><![CDATA[a < b]]></text></revision></page>",
        ]);
        let page = decoder(&xml).next_page().unwrap().unwrap();
        assert_eq!(page.body(), "a < b");
    }

    #[test]
    fn test_siteinfo_is_skipped() {
        let xml = dump(&[&page_xml("Dog", "Animal.")]);
        let mut decoder = decoder(&xml);
        let page = decoder.next_page().unwrap().unwrap();
        assert_eq!(page.title, "Dog");
        assert_ne!(page.title, "Wikipedia");
        assert!(decoder.next_page().unwrap().is_none());
    }

    #[test]
    fn test_next_unique_drops_later_duplicates() {
        let xml = dump(&[
            &page_xml("Dog", "Animal."),
            &page_xml("Cat", "Feline."),
            &page_xml("Dog", "Other."),
        ]);
        let mut decoder = decoder(&xml);

        let first = decoder.next_unique().unwrap().unwrap();
        let second = decoder.next_unique().unwrap().unwrap();
        assert_eq!((first.title.as_str(), first.body()), ("Dog", "Animal."));
        assert_eq!(second.title, "Cat");
        assert!(decoder.next_unique().unwrap().is_none());

        let stats = decoder.stats();
        assert_eq!(stats.pages_read, 3);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(decoder.seen.len(), 2);
    }

    #[test]
    fn test_body_entities_are_decoded() {
        let body = "&quot;hi&quot;&lt;ref&gt;a &amp; b&lt;/ref&gt;";
        let xml = dump(&[&page_xml("Quote", body)]);
        let page = decoder(&xml).next_page().unwrap().unwrap();
        assert_eq!(page.body(), "\"hi\"<ref>a & b</ref>");
    }

    #[test]
    fn test_truncated_page_is_fatal() {
        let xml = "<mediawiki><page><title>Dog</title><revision><text>cut";
        let err = decoder(xml).next_page().unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }), "{err:?}");
    }

    #[test]
    fn test_mismatched_tags_are_fatal() {
        let xml = "<mediawiki><page><title>Dog</ns></page></mediawiki>";
        let err = decoder(xml).next_page().unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }), "{err:?}");
    }

    #[test]
    fn test_run_pushes_unique_pages_and_closes_queue() {
        let xml = dump(&[
            &page_xml("Dog", "Animal."),
            &page_xml("Dog", "Other."),
            &page_xml("Cat", "Feline."),
        ]);
        let ctx = RunContext::default();
        let (tx, rx) = flume::unbounded();

        let stats = decoder(&xml).run(&ctx, tx).unwrap();
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.duplicates, 1);

        let titles: Vec<String> = rx.iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["Dog", "Cat"]);
    }

    #[test]
    fn test_run_stops_when_cancelled() {
        let xml = dump(&[&page_xml("Dog", "Animal.")]);
        let ctx = RunContext::default();
        ctx.token.cancel();
        let (tx, rx) = flume::unbounded();

        let err = decoder(&xml).run(&ctx, tx).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_run_reports_closed_handoff() {
        let xml = dump(&[&page_xml("Dog", "Animal.")]);
        let ctx = RunContext::default();
        let (tx, rx) = flume::bounded(0);
        drop(rx);

        let err = decoder(&xml).run(&ctx, tx).unwrap_err();
        assert!(matches!(err, PipelineError::ChannelClosed("handoff")));
    }
}
