//! Topology payloads.
//!
//! `GET /?endpoint` answers with the data nodes of the site:
//!
//! ```text
//! <ListDataNode xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
//!   <DataNodes>10.1.1.1</DataNodes>
//!   <DataNodes>10.1.1.2</DataNodes>
//!   <VersionInfo>3.0.0.0</VersionInfo>
//! </ListDataNode>
//! ```

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::XmlError;
use crate::health::ping::{xml_escape_into, S3_NAMESPACE};

/// Management path listing the data nodes of a site.
pub const ENDPOINT_PATH: &str = "/?endpoint";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListDataNode {
    pub data_nodes: Vec<String>,
    pub version_info: Option<String>,
}

impl ListDataNode {
    pub fn new<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data_nodes: nodes.into_iter().map(Into::into).collect(),
            version_info: None,
        }
    }

    pub fn from_xml(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text_start = true;
        reader.config_mut().trim_text_end = true;

        let mut list = ListDataNode::default();
        let mut saw_root = false;
        let mut current_text = String::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    current_text.clear();
                    if e.local_name().as_ref() == b"ListDataNode" {
                        saw_root = true;
                    }
                }
                Event::Empty(e) => {
                    if e.local_name().as_ref() == b"ListDataNode" {
                        saw_root = true;
                    }
                }
                Event::Text(e) => current_text.push_str(&e.unescape()?),
                Event::End(e) => {
                    let text = std::mem::take(&mut current_text);
                    match e.local_name().as_ref() {
                        b"DataNodes" if !text.is_empty() => list.data_nodes.push(text),
                        b"VersionInfo" => list.version_info = Some(text),
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(XmlError("missing ListDataNode element".to_string()));
        }
        Ok(list)
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str("<ListDataNode xmlns=\"");
        xml.push_str(S3_NAMESPACE);
        xml.push_str("\">");
        for node in &self.data_nodes {
            xml.push_str("<DataNodes>");
            xml_escape_into(&mut xml, node);
            xml.push_str("</DataNodes>");
        }
        if let Some(version) = &self.version_info {
            xml.push_str("<VersionInfo>");
            xml_escape_into(&mut xml, version);
            xml.push_str("</VersionInfo>");
        }
        xml.push_str("</ListDataNode>");
        xml
    }
}
