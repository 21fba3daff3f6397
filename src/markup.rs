//! Markup Validators
//!
//! Pure Rust validators for the documents a web application serves: plain XML
//! (well-formedness only), XHTML 1.0 Strict and RSS 2.0. Each document is read
//! into a small element tree with `quick-xml`, then the rules for the document
//! type are checked against that tree. A well-formedness failure is reported as
//! a single error, since nothing after it can be trusted.

use std::collections::HashSet;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::Url;

use crate::validator::{DocumentValidator, ValidationError, position_at};

pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Presentational elements removed from XHTML 1.0 Strict
const DEPRECATED_XHTML_ELEMENTS: &[&str] = &[
    "applet", "basefont", "center", "dir", "font", "iframe", "isindex", "menu", "s", "strike",
    "u",
];

/// Deepest element nesting accepted, the same limit libxml2 applies by default.
/// The tree is walked and dropped recursively, so deeper documents are rejected.
pub const MAX_NESTING_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
    offset: usize,
}

impl Element {
    fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn child(&self, local_name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.local_name() == local_name)
    }

    fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children
            .iter()
            .filter(move |c| c.local_name() == local_name)
    }

    /// Depth-first walk over this element and all of its descendants
    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Element)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

#[derive(Debug)]
struct ParsedDocument {
    root: Element,
    has_doctype: bool,
}

/// Start of the markup at or around a reader offset; the reader may report the
/// position just past the opening `<`, or before leading whitespace.
fn markup_start(document: &[u8], offset: usize) -> usize {
    let offset = offset.min(document.len());
    if offset > 0 && document[offset - 1] == b'<' && document.get(offset) != Some(&b'<') {
        return offset - 1;
    }
    document[offset..]
        .iter()
        .position(|&b| b == b'<')
        .map_or(offset, |idx| offset + idx)
}

fn fatal(document: &[u8], offset: usize, message: impl Into<String>) -> ValidationError {
    let position = position_at(document, offset);
    ValidationError::error(message).at(position.line, position.column)
}

fn at_element(document: &[u8], element: &Element, finding: ValidationError) -> ValidationError {
    let position = position_at(document, element.offset);
    finding.at(position.line, position.column)
}

fn element_from(
    document: &[u8],
    start: &BytesStart<'_>,
    offset: usize,
) -> Result<Element, ValidationError> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| fatal(document, offset, e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        attributes.push((key, value));
    }

    Ok(Element {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attributes,
        children: Vec::new(),
        text: String::new(),
        offset,
    })
}

fn attach(
    document: &[u8],
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ValidationError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_some() {
        Err(fatal(
            document,
            element.offset,
            format!("document has more than one root element: <{}>", element.name),
        ))
    } else {
        *root = Some(element);
        Ok(())
    }
}

fn parse_document(document: &[u8]) -> Result<ParsedDocument, ValidationError> {
    let mut reader = Reader::from_reader(document);
    reader.check_end_names(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut has_doctype = false;

    loop {
        let position = reader.buffer_position();
        let offset = markup_start(document, position);
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if stack.len() >= MAX_NESTING_DEPTH {
                    return Err(fatal(
                        document,
                        offset,
                        format!("elements nested deeper than {} levels", MAX_NESTING_DEPTH),
                    ));
                }
                let element = element_from(document, &start, offset)?;
                if stack.is_empty() && root.is_some() {
                    return Err(fatal(
                        document,
                        offset,
                        format!("document has more than one root element: <{}>", element.name),
                    ));
                }
                stack.push(element);
            }
            Ok(Event::Empty(start)) => {
                let element = element_from(document, &start, offset)?;
                attach(document, &mut stack, &mut root, element)?;
            }
            Ok(Event::End(end)) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                match stack.pop() {
                    Some(open) if open.name == name => {
                        attach(document, &mut stack, &mut root, open)?;
                    }
                    Some(open) => {
                        return Err(fatal(
                            document,
                            offset,
                            format!(
                                "end tag </{}> does not match start tag <{}>",
                                name, open.name
                            ),
                        ));
                    }
                    None => {
                        return Err(fatal(
                            document,
                            offset,
                            format!("unexpected end tag </{}>", name),
                        ));
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let content = text
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&content);
                } else if !content.trim().is_empty() {
                    return Err(fatal(
                        document,
                        position,
                        "text content outside of the root element",
                    ));
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::DocType(_)) => has_doctype = true,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(fatal(document, reader.buffer_position(), e.to_string())),
        }
    }

    if let Some(open) = stack.last() {
        return Err(fatal(
            document,
            open.offset,
            format!("element <{}> is never closed", open.name),
        ));
    }

    let root = root.ok_or_else(|| ValidationError::error("document has no root element"))?;
    Ok(ParsedDocument { root, has_doctype })
}

/// Well-formedness check for arbitrary XML documents
#[derive(Debug, Default, Clone)]
pub struct XmlValidator;

impl DocumentValidator for XmlValidator {
    fn name(&self) -> &str {
        "XML"
    }

    fn validate(&self, document: &[u8]) -> Vec<ValidationError> {
        match parse_document(document) {
            Ok(_) => Vec::new(),
            Err(finding) => vec![finding],
        }
    }
}

/// XHTML 1.0 Strict checks: well-formedness, namespace, required structure and
/// the elements/attributes the strict DTD forbids or requires.
#[derive(Debug, Default, Clone)]
pub struct XhtmlValidator;

impl DocumentValidator for XhtmlValidator {
    fn name(&self) -> &str {
        "XHTML"
    }

    fn validate(&self, document: &[u8]) -> Vec<ValidationError> {
        let parsed = match parse_document(document) {
            Ok(parsed) => parsed,
            Err(finding) => return vec![finding],
        };

        let mut findings = Vec::new();
        let root = &parsed.root;

        if !parsed.has_doctype {
            findings.push(ValidationError::warning("missing DOCTYPE declaration").at(1, 1));
        }

        if root.local_name() != "html" {
            findings.push(at_element(
                document,
                root,
                ValidationError::error(format!("root element must be <html>, found <{}>", root.name)),
            ));
            return findings;
        }

        if root.attribute("xmlns") != Some(XHTML_NAMESPACE) {
            findings.push(at_element(
                document,
                root,
                ValidationError::error(format!(
                    "<html> must declare the XHTML namespace {}",
                    XHTML_NAMESPACE
                )),
            ));
        }

        match root.child("head") {
            Some(head) if head.child("title").is_none() => findings.push(at_element(
                document,
                head,
                ValidationError::error("<head> must contain a <title> element"),
            )),
            Some(_) => {}
            None => findings.push(at_element(
                document,
                root,
                ValidationError::error("missing <head> element"),
            )),
        }
        if root.child("body").is_none() {
            findings.push(at_element(
                document,
                root,
                ValidationError::error("missing <body> element"),
            ));
        }

        let mut seen_ids = HashSet::new();
        root.walk(&mut |element| {
            let name = element.local_name();
            if name != name.to_lowercase() {
                findings.push(at_element(
                    document,
                    element,
                    ValidationError::error(format!("element names must be lowercase: <{}>", name)),
                ));
            }
            if DEPRECATED_XHTML_ELEMENTS.contains(&name) {
                findings.push(at_element(
                    document,
                    element,
                    ValidationError::error(format!(
                        "element <{}> is not allowed in XHTML 1.0 Strict",
                        name
                    )),
                ));
            }
            if name == "img" && element.attribute("alt").is_none() {
                findings.push(at_element(
                    document,
                    element,
                    ValidationError::error("<img> requires an alt attribute"),
                ));
            }
            if name == "script" && element.attribute("type").is_none() {
                findings.push(at_element(
                    document,
                    element,
                    ValidationError::warning("<script> should declare a type attribute"),
                ));
            }
            if let Some(id) = element.attribute("id")
                && !seen_ids.insert(id)
            {
                findings.push(at_element(
                    document,
                    element,
                    ValidationError::error(format!("duplicate id \"{}\"", id)),
                ));
            }
        });

        findings
    }
}

/// RSS 2.0 checks: channel structure, item content, link and date formats
#[derive(Debug, Default, Clone)]
pub struct RssValidator;

impl RssValidator {
    fn check_link(document: &[u8], link: &Element, findings: &mut Vec<ValidationError>) {
        let value = link.text.trim();
        if Url::parse(value).is_err() {
            findings.push(at_element(
                document,
                link,
                ValidationError::warning(format!("<link> is not an absolute URL: {}", value)),
            ));
        }
    }

    fn check_dates(document: &[u8], parent: &Element, findings: &mut Vec<ValidationError>) {
        for date in parent
            .children
            .iter()
            .filter(|c| matches!(c.local_name(), "pubDate" | "lastBuildDate"))
        {
            let value = date.text.trim();
            if chrono::DateTime::parse_from_rfc2822(value).is_err() {
                findings.push(at_element(
                    document,
                    date,
                    ValidationError::error(format!(
                        "<{}> is not an RFC 822 date: {}",
                        date.local_name(),
                        value
                    )),
                ));
            }
        }
    }
}

impl DocumentValidator for RssValidator {
    fn name(&self) -> &str {
        "RSS"
    }

    fn validate(&self, document: &[u8]) -> Vec<ValidationError> {
        let parsed = match parse_document(document) {
            Ok(parsed) => parsed,
            Err(finding) => return vec![finding],
        };

        let mut findings = Vec::new();
        let root = &parsed.root;

        if root.local_name() != "rss" {
            findings.push(at_element(
                document,
                root,
                ValidationError::error(format!("root element must be <rss>, found <{}>", root.name)),
            ));
            return findings;
        }

        match root.attribute("version") {
            None => findings.push(at_element(
                document,
                root,
                ValidationError::error("<rss> requires a version attribute"),
            )),
            Some("2.0") => {}
            Some(other) => findings.push(at_element(
                document,
                root,
                ValidationError::warning(format!(
                    "RSS version {} is not 2.0, only 2.0 rules are checked",
                    other
                )),
            )),
        }

        let channels: Vec<&Element> = root.children_named("channel").collect();
        let channel = match channels.as_slice() {
            [] => {
                findings.push(at_element(
                    document,
                    root,
                    ValidationError::error("missing <channel> element"),
                ));
                return findings;
            }
            [channel] => *channel,
            [first, ..] => {
                findings.push(at_element(
                    document,
                    root,
                    ValidationError::error("<rss> must contain exactly one <channel>"),
                ));
                *first
            }
        };

        for required in ["title", "link", "description"] {
            if channel.child(required).is_none() {
                findings.push(at_element(
                    document,
                    channel,
                    ValidationError::error(format!(
                        "<channel> is missing required element <{}>",
                        required
                    )),
                ));
            }
        }
        if let Some(link) = channel.child("link") {
            Self::check_link(document, link, &mut findings);
        }
        Self::check_dates(document, channel, &mut findings);

        for item in channel.children_named("item") {
            if item.child("title").is_none() && item.child("description").is_none() {
                findings.push(at_element(
                    document,
                    item,
                    ValidationError::error(
                        "<item> must contain at least one of <title> or <description>",
                    ),
                ));
            }
            if let Some(link) = item.child("link") {
                Self::check_link(document, link, &mut findings);
            }
            Self::check_dates(document, item, &mut findings);
        }

        findings
    }
}
