//! # Dump writer
//!
//! Single consumer of the result queue. Writes a fixed MediaWiki header,
//! appends every serialized page in arrival order, and closes the document
//! with a trailer once the queue is closed.
//!
//! The writer is the only owner of the output handle, so no locking is
//! involved. It runs on a blocking thread and uses synchronous I/O.

use std::io::Write;

use tracing::{debug, info};

use crate::error::Result;

/// Encoded newline left behind by some serializers inside text content.
pub const NEWLINE_ARTIFACT: &str = "&#xA;";

/// Fixed document header. The site metadata is not carried over from the
/// input dump.
pub const DUMP_HEADER: &str = r#"<mediawiki xmlns="http://www.mediawiki.org/xml/export-0.10/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://www.mediawiki.org/xml/export-0.10/ http://www.mediawiki.org/xml/export-0.10.xsd" version="0.10" xml:lang="en">
  <siteinfo>
    <sitename>Wikipedia</sitename>
    <dbname>enwiki</dbname>
    <base>https://en.wikipedia.org/wiki/Main_Page</base>
    <generator>MediaWiki 1.35.0-wmf.31</generator>
    <case>first-letter</case>
    <namespaces>
      <namespace key="-2" case="first-letter">Media</namespace>
      <namespace key="-1" case="first-letter">Special</namespace>
      <namespace key="0" case="first-letter" />
      <namespace key="1" case="first-letter">Talk</namespace>
      <namespace key="2" case="first-letter">User</namespace>
      <namespace key="3" case="first-letter">User talk</namespace>
      <namespace key="4" case="first-letter">Wikipedia</namespace>
      <namespace key="5" case="first-letter">Wikipedia talk</namespace>
      <namespace key="6" case="first-letter">File</namespace>
      <namespace key="7" case="first-letter">File talk</namespace>
      <namespace key="8" case="first-letter">MediaWiki</namespace>
      <namespace key="9" case="first-letter">MediaWiki talk</namespace>
      <namespace key="10" case="first-letter">Template</namespace>
      <namespace key="11" case="first-letter">Template talk</namespace>
      <namespace key="12" case="first-letter">Help</namespace>
      <namespace key="13" case="first-letter">Help talk</namespace>
      <namespace key="14" case="first-letter">Category</namespace>
      <namespace key="15" case="first-letter">Category talk</namespace>
      <namespace key="100" case="first-letter">Portal</namespace>
      <namespace key="101" case="first-letter">Portal talk</namespace>
      <namespace key="108" case="first-letter">Book</namespace>
      <namespace key="109" case="first-letter">Book talk</namespace>
      <namespace key="118" case="first-letter">Draft</namespace>
      <namespace key="119" case="first-letter">Draft talk</namespace>
      <namespace key="446" case="first-letter">Education Program</namespace>
      <namespace key="447" case="first-letter">Education Program talk</namespace>
      <namespace key="710" case="first-letter">TimedText</namespace>
      <namespace key="711" case="first-letter">TimedText talk</namespace>
      <namespace key="828" case="first-letter">Module</namespace>
      <namespace key="829" case="first-letter">Module talk</namespace>
      <namespace key="2300" case="first-letter">Gadget</namespace>
      <namespace key="2301" case="first-letter">Gadget talk</namespace>
      <namespace key="2302" case="case-sensitive">Gadget definition</namespace>
      <namespace key="2303" case="case-sensitive">Gadget definition talk</namespace>
    </namespaces>
  </siteinfo>"#;

/// Closes the root element opened by [`DUMP_HEADER`].
pub const DUMP_TRAILER: &str = "</mediawiki>";

/// Counters reported by the writer when it finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub records_written: u64,
    pub bytes_written: u64,
}

/// Sequential writer for the output dump.
pub struct DumpWriter<W: Write> {
    out: W,
    stats: WriterStats,
}

impl<W: Write> DumpWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            stats: WriterStats::default(),
        }
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn write_header(&mut self) -> Result<()> {
        self.write_bytes(DUMP_HEADER.as_bytes())
    }

    /// Append one serialized page on its own line.
    pub fn write_record(&mut self, record: &str) -> Result<()> {
        let record = record.replace(NEWLINE_ARTIFACT, "");
        self.write_bytes(b"\n")?;
        self.write_bytes(record.as_bytes())?;
        self.stats.records_written += 1;
        Ok(())
    }

    /// Write the trailer and flush.
    pub fn write_trailer(&mut self) -> Result<()> {
        self.write_bytes(b"\n")?;
        self.write_bytes(DUMP_TRAILER.as_bytes())?;
        self.write_bytes(b"\n")?;
        self.out.flush()?;
        Ok(())
    }

    /// Drain `input` until every sender is gone, then close the document.
    pub fn run(&mut self, input: flume::Receiver<String>) -> Result<WriterStats> {
        info!("Writer started");
        self.write_header()?;

        for record in input.iter() {
            self.write_record(&record)?;
            if self.stats.records_written % 10_000 == 0 {
                debug!(records = self.stats.records_written, "Writer progress");
            }
        }

        self.write_trailer()?;
        info!(
            records = self.stats.records_written,
            bytes = self.stats.bytes_written,
            "Writer done"
        );
        Ok(self.stats)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.stats.bytes_written += bytes.len() as u64;
        Ok(())
    }
}
