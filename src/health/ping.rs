//! Ping protocol payloads.
//!
//! A node answers `GET /?ping` with a `PingList` document:
//!
//! ```text
//! <PingList xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
//!   <PingItem><Name>LOAD_FACTOR</Name><Value>1</Value></PingItem>
//!   <PingItem><Name>MAINTENANCE_MODE</Name><Status>OFF</Status><Text>...</Text></PingItem>
//! </PingList>
//! ```
//!
//! Items are keyed by name in document order, so parsing and serializing a
//! canonical document gives back the same bytes.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::XmlError;

pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Item reporting whether the node is in maintenance.
pub const MAINTENANCE_MODE: &str = "MAINTENANCE_MODE";
/// Item reporting the node's load factor.
pub const LOAD_FACTOR: &str = "LOAD_FACTOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStatus {
    On,
    Off,
}

impl PingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PingStatus::On => "ON",
            PingStatus::Off => "OFF",
        }
    }
}

impl FromStr for PingStatus {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(PingStatus::On),
            "OFF" => Ok(PingStatus::Off),
            other => Err(XmlError(format!("unknown ping status {:?}", other))),
        }
    }
}

impl fmt::Display for PingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named status item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PingItem {
    pub name: String,
    pub status: Option<PingStatus>,
    pub text: Option<String>,
    pub value: Option<String>,
}

impl PingItem {
    pub fn new(
        name: impl Into<String>,
        status: Option<PingStatus>,
        text: Option<&str>,
        value: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            text: text.map(str::to_string),
            value: value.map(str::to_string),
        }
    }
}

/// Parsed ping response: items keyed by name, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PingResponse {
    items: IndexMap<String, PingItem>,
}

impl PingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item. A repeated name replaces the earlier item in place.
    pub fn insert(&mut self, item: PingItem) {
        self.items.insert(item.name.clone(), item);
    }

    pub fn get(&self, name: &str) -> Option<&PingItem> {
        self.items.get(name)
    }

    pub fn items(&self) -> impl Iterator<Item = &PingItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True only when `MAINTENANCE_MODE` is present with status `ON`.
    pub fn maintenance_mode(&self) -> bool {
        self.get(MAINTENANCE_MODE).and_then(|item| item.status) == Some(PingStatus::On)
    }

    /// Parse a `PingList` document.
    pub fn from_xml(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text_start = true;
        reader.config_mut().trim_text_end = true;

        let mut response = PingResponse::new();
        let mut saw_root = false;
        let mut current: Option<PingItem> = None;
        let mut current_text = String::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    current_text.clear();
                    match e.local_name().as_ref() {
                        b"PingList" => saw_root = true,
                        b"PingItem" => current = Some(PingItem::default()),
                        _ => {}
                    }
                }
                Event::Empty(e) => {
                    // <Text/> and friends carry an empty value
                    if let Some(item) = current.as_mut() {
                        match e.local_name().as_ref() {
                            b"Text" => item.text = Some(String::new()),
                            b"Value" => item.value = Some(String::new()),
                            _ => {}
                        }
                    } else if e.local_name().as_ref() == b"PingList" {
                        saw_root = true;
                    }
                }
                Event::Text(e) => {
                    current_text.push_str(&e.unescape()?);
                }
                Event::End(e) => {
                    let text = std::mem::take(&mut current_text);
                    match e.local_name().as_ref() {
                        b"PingItem" => {
                            let item = current
                                .take()
                                .ok_or_else(|| XmlError("unbalanced PingItem".to_string()))?;
                            if item.name.is_empty() {
                                return Err(XmlError("PingItem without a Name".to_string()));
                            }
                            response.insert(item);
                        }
                        b"Name" => {
                            if let Some(item) = current.as_mut() {
                                item.name = text;
                            }
                        }
                        b"Status" => {
                            if let Some(item) = current.as_mut() {
                                item.status = Some(text.parse()?);
                            }
                        }
                        b"Text" => {
                            if let Some(item) = current.as_mut() {
                                item.text = Some(text);
                            }
                        }
                        b"Value" => {
                            if let Some(item) = current.as_mut() {
                                item.value = Some(text);
                            }
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(XmlError("missing PingList element".to_string()));
        }
        Ok(response)
    }

    /// Serialize as a canonical `PingList` document.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(128 + self.items.len() * 96);
        xml.push_str(XML_DECLARATION);
        xml.push_str("<PingList xmlns=\"");
        xml.push_str(S3_NAMESPACE);
        xml.push_str("\">");
        for item in self.items.values() {
            xml.push_str("<PingItem>");
            push_element(&mut xml, "Name", &item.name);
            if let Some(status) = item.status {
                push_element(&mut xml, "Status", status.as_str());
            }
            if let Some(text) = &item.text {
                push_element(&mut xml, "Text", text);
            }
            if let Some(value) = &item.value {
                push_element(&mut xml, "Value", value);
            }
            xml.push_str("</PingItem>");
        }
        xml.push_str("</PingList>");
        xml
    }
}

fn push_element(buf: &mut String, tag: &str, content: &str) {
    buf.push('<');
    buf.push_str(tag);
    buf.push('>');
    xml_escape_into(buf, content);
    buf.push_str("</");
    buf.push_str(tag);
    buf.push('>');
}

pub(crate) fn xml_escape_into(buf: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '"' => buf.push_str("&quot;"),
            '\'' => buf.push_str("&apos;"),
            _ => buf.push(ch),
        }
    }
}
