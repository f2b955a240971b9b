//! Streaming MARCXML reader and FAST geographic heading extraction.
//!
//! Records are yielded one at a time; the document is never held in memory.

use anyhow::Result;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::io::BufRead;
use tracing::{debug, info};

use crate::models::FastEntry;

const PROGRESS_EVERY: usize = 10_000;

/// Where the reader is inside the MARCXML element tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    OutsideRecord,
    InRecord,
    InControlField,
    InDataField,
    InSubfield,
}

/// One MARC record as ordered `key -> values` pairs.
///
/// Control fields are keyed by tag (`001`); subfields by
/// `{tag}_{ind1}_{ind2}_{code}` (`151_ _ _a`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarcRecord {
    fields: Vec<(String, Vec<String>)>,
}

impl MarcRecord {
    pub fn push(&mut self, key: String, value: String) {
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.fields.push((key, vec![value])),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Values of every key for `tag`, in first-seen key order.
    pub fn tag_values<'a>(&'a self, tag: &str) -> impl Iterator<Item = &'a str> + 'a {
        let prefix = format!("{}_", tag);
        self.fields
            .iter()
            .filter(move |(k, _)| k.starts_with(&prefix))
            .flat_map(|(_, values)| values.iter().map(String::as_str))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub struct MarcReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: ParseState,
    record: MarcRecord,
    tag: Option<String>,
    ind1: String,
    ind2: String,
    code: Option<String>,
    value: String,
    records_read: usize,
    done: bool,
}

impl<R: BufRead> MarcReader<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            buf: Vec::new(),
            state: ParseState::OutsideRecord,
            record: MarcRecord::default(),
            tag: None,
            ind1: " ".to_string(),
            ind2: " ".to_string(),
            code: None,
            value: String::new(),
            records_read: 0,
            done: false,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn records_read(&self) -> usize {
        self.records_read
    }

    fn start(&mut self, e: &BytesStart) -> Result<()> {
        match (e.local_name().as_ref(), self.state) {
            (b"record", _) => {
                self.record = MarcRecord::default();
                self.state = ParseState::InRecord;
            }
            (b"controlfield", ParseState::InRecord) => {
                self.tag = attribute(e, b"tag")?;
                self.value.clear();
                self.state = ParseState::InControlField;
            }
            (b"datafield", ParseState::InRecord) => {
                self.tag = attribute(e, b"tag")?;
                self.ind1 = attribute(e, b"ind1")?.unwrap_or_else(|| " ".to_string());
                self.ind2 = attribute(e, b"ind2")?.unwrap_or_else(|| " ".to_string());
                self.state = ParseState::InDataField;
            }
            (b"subfield", ParseState::InDataField) => {
                self.code = attribute(e, b"code")?;
                self.value.clear();
                self.state = ParseState::InSubfield;
            }
            _ => {}
        }
        Ok(())
    }

    /// Returns the finished record when `record` closes.
    fn end(&mut self, local_name: &[u8]) -> Option<MarcRecord> {
        match (local_name, self.state) {
            (b"record", ParseState::OutsideRecord) => None,
            (b"record", _) => {
                self.state = ParseState::OutsideRecord;
                self.records_read += 1;
                if self.records_read % PROGRESS_EVERY == 0 {
                    info!("Parsed {} MARC records", self.records_read);
                }
                Some(std::mem::take(&mut self.record))
            }
            (b"controlfield", ParseState::InControlField) => {
                if let Some(tag) = &self.tag {
                    if !self.value.is_empty() {
                        self.record.push(tag.clone(), std::mem::take(&mut self.value));
                    }
                }
                self.state = ParseState::InRecord;
                None
            }
            (b"subfield", ParseState::InSubfield) => {
                if let (Some(tag), Some(code)) = (&self.tag, &self.code) {
                    if !self.value.is_empty() {
                        let key = format!("{}_{}_{}_{}", tag, self.ind1, self.ind2, code);
                        self.record.push(key, std::mem::take(&mut self.value));
                    }
                }
                self.state = ParseState::InDataField;
                None
            }
            (b"datafield", ParseState::InDataField) => {
                self.ind1 = " ".to_string();
                self.ind2 = " ".to_string();
                self.state = ParseState::InRecord;
                None
            }
            _ => None,
        }
    }

    fn collecting_text(&self) -> bool {
        matches!(
            self.state,
            ParseState::InControlField | ParseState::InSubfield
        )
    }
}

impl<R: BufRead> Iterator for MarcReader<R> {
    type Item = Result<MarcRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event.into_owned(),
                Err(e) => {
                    self.done = true;
                    let position = self.reader.buffer_position();
                    return Some(Err(anyhow::Error::new(e)
                        .context(format!("Malformed MARCXML near byte {}", position))));
                }
            };

            let finished = match event {
                Event::Start(e) => self.start(&e).map(|_| None),
                Event::Empty(e) => self
                    .start(&e)
                    .map(|_| self.end(e.local_name().as_ref())),
                Event::End(e) => Ok(self.end(e.local_name().as_ref())),
                Event::Text(t) if self.collecting_text() => t
                    .unescape()
                    .map(|text| {
                        self.value.push_str(&text);
                        None
                    })
                    .map_err(anyhow::Error::from),
                Event::CData(c) if self.collecting_text() => {
                    self.value.push_str(&String::from_utf8_lossy(&c));
                    Ok(None)
                }
                Event::Eof => {
                    self.done = true;
                    info!("Finished parsing MARCXML: {} records", self.records_read);
                    Ok(None)
                }
                _ => Ok(None),
            };

            match finished {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

fn attribute(e: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Turns MARC authority records into FAST geographic entries.
pub struct FastExtractor {
    fast_id: Regex,
    geonames: Regex,
    viaf: Regex,
    wikipedia: Regex,
}

impl FastExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            fast_id: Regex::new(r"^fst(\d+)")?,
            geonames: Regex::new(r"geonames\.org/(\d+)")?,
            viaf: Regex::new(r"viaf\.org/viaf/(\d+)")?,
            wikipedia: Regex::new(r"wikipedia\.org/wiki/([^/]+)")?,
        })
    }

    /// FAST id from the first `016` value shaped `fst<digits>`, leading
    /// zeros removed.
    pub fn fast_id(&self, record: &MarcRecord) -> Option<String> {
        record.tag_values("016").find_map(|value| {
            let digits = self.fast_id.captures(value)?.get(1)?.as_str();
            match digits.parse::<u64>() {
                Ok(n) => Some(n.to_string()),
                Err(_) => {
                    let trimmed = digits.trim_start_matches('0');
                    Some(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
                }
            }
        })
    }

    fn link(&self, record: &MarcRecord, pattern: &Regex) -> Option<String> {
        record
            .tag_values("751")
            .find_map(|uri| Some(pattern.captures(uri)?.get(1)?.as_str().to_string()))
    }

    /// `None` when the record has no FAST id or no `151` heading.
    pub fn extract(&self, record: &MarcRecord, now: DateTime<Utc>) -> Option<FastEntry> {
        let fast_id = self.fast_id(record)?;
        let parts: Vec<&str> = record.tag_values("151").collect();
        if parts.is_empty() {
            debug!("Dropping FAST record {} without a heading", fast_id);
            return None;
        }

        Some(FastEntry {
            uri: FastEntry::uri_for(&fast_id),
            entry_type: "place".to_string(),
            label: parts.join("--"),
            geoname_id: self.link(record, &self.geonames),
            viaf_id: self.link(record, &self.viaf),
            wikipedia_id: self.link(record, &self.wikipedia),
            fast_id,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::stamp;

    const MINNEAPOLIS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<marc:collection xmlns:marc="http://www.loc.gov/MARC21/slim">
  <marc:record>
    <marc:controlfield tag="001">fst01204592</marc:controlfield>
    <marc:datafield tag="016" ind1="7" ind2=" ">
      <marc:subfield code="a">fst01204592</marc:subfield>
      <marc:subfield code="2">OCoLC-fast</marc:subfield>
    </marc:datafield>
    <marc:datafield tag="151" ind1=" " ind2=" ">
      <marc:subfield code="a">Minnesota</marc:subfield>
      <marc:subfield code="z">Minneapolis</marc:subfield>
    </marc:datafield>
    <marc:datafield tag="751" ind1=" " ind2="7">
      <marc:subfield code="0">https://www.geonames.org/5037649</marc:subfield>
      <marc:subfield code="1">http://viaf.org/viaf/128542016</marc:subfield>
    </marc:datafield>
    <marc:datafield tag="751" ind1=" " ind2="4">
      <marc:subfield code="0">https://en.wikipedia.org/wiki/Minneapolis</marc:subfield>
    </marc:datafield>
    <marc:datafield tag="670" ind1=" " ind2=" "><marc:subfield code="a"/></marc:datafield>
  </marc:record>
  <marc:record>
    <marc:datafield tag="151" ind1=" " ind2=" ">
      <marc:subfield code="a">No Id Land</marc:subfield>
    </marc:datafield>
  </marc:record>
</marc:collection>"#;

    fn records(xml: &str) -> Vec<MarcRecord> {
        MarcReader::new(xml.as_bytes()).map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_reader_keys_fields_with_indicators() {
        let records = records(MINNEAPOLIS);
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.get("001").unwrap(), &["fst01204592".to_string()]);
        assert_eq!(first.get("016_7_ _a").unwrap(), &["fst01204592".to_string()]);
        assert_eq!(first.get("151_ _ _z").unwrap(), &["Minneapolis".to_string()]);
        assert!(first.get("670_ _ _a").is_none());
        assert_eq!(first.tag_values("751").count(), 3);
    }

    #[test]
    fn test_reader_returns_to_outside_record() {
        let mut reader = MarcReader::new(MINNEAPOLIS.as_bytes());
        assert_eq!(reader.state(), ParseState::OutsideRecord);
        reader.next().unwrap().unwrap();
        assert_eq!(reader.state(), ParseState::OutsideRecord);
        assert_eq!(reader.records_read(), 1);
    }

    #[test]
    fn test_extract_fast_entry() {
        let extractor = FastExtractor::new().unwrap();
        let records = records(MINNEAPOLIS);

        let entry = extractor.extract(&records[0], stamp()).unwrap();
        assert_eq!(entry.fast_id, "1204592");
        assert_eq!(entry.uri, "https://id.worldcat.org/fast/1204592");
        assert_eq!(entry.entry_type, "place");
        assert_eq!(entry.label, "Minnesota--Minneapolis");
        assert_eq!(entry.geoname_id.as_deref(), Some("5037649"));
        assert_eq!(entry.viaf_id.as_deref(), Some("128542016"));
        assert_eq!(entry.wikipedia_id.as_deref(), Some("Minneapolis"));
    }

    #[test]
    fn test_record_without_016_is_dropped() {
        let extractor = FastExtractor::new().unwrap();
        let records = records(MINNEAPOLIS);
        assert!(extractor.extract(&records[1], stamp()).is_none());
    }

    #[test]
    fn test_malformed_xml_yields_error() {
        let xml = "<collection><record><controlfield tag=\"001\">x</datafield></record>";
        let results: Vec<_> = MarcReader::new(xml.as_bytes()).collect();
        assert!(results.iter().any(|r| r.is_err()));
    }
}
