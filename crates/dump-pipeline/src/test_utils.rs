use crate::writer::DUMP_HEADER;

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer() // Write to test output
        .try_init();
}

/// Minimal `<page>` element with a title and body.
pub fn page_xml(title: &str, body: &str) -> String {
    format!(
        r#"
  <page>
    <title>{title}</title>
    <ns>0</ns>
    <id>1</id>
    <revision>
      <id>10</id>
      <timestamp>2020-05-01T00:00:00Z</timestamp>
      <contributor><username>Tester</username><id>2</id></contributor>
      <model>wikitext</model>
      <format>text/x-wiki</format>
      <text bytes="{}" xml:space="preserve">{body}</text>
      <sha1>deadbeef</sha1>
    </revision>
  </page>"#,
        body.len()
    )
}

/// Wrap page elements in a dump document with a site info block.
pub fn dump<S: AsRef<str>>(pages: &[S]) -> String {
    let mut xml = String::from(DUMP_HEADER);
    for page in pages {
        xml.push_str(page.as_ref());
    }
    xml.push_str("\n</mediawiki>\n");
    xml
}
