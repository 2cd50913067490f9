use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::PlanParseError;

/// One element of a parsed plan, with names reduced to their local part.
#[derive(Debug, Clone)]
pub struct PlanElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub parent: Option<usize>,
    pub child_count: usize,
}

impl PlanElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Flat, document-ordered element tree of a showplan.
#[derive(Debug, Clone)]
pub struct PlanDocument {
    elements: Vec<PlanElement>,
}

/// `1` or `true`, ignoring case.
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn to_parse_err(err: impl std::fmt::Display) -> PlanParseError {
    PlanParseError::Malformed(err.to_string())
}

fn read_element(e: &BytesStart<'_>, parent: Option<usize>) -> Result<PlanElement, PlanParseError> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(to_parse_err)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let value = attr.unescape_value().map_err(to_parse_err)?.into_owned();
        attributes.push((key, value));
    }
    Ok(PlanElement {
        name,
        attributes,
        parent,
        child_count: 0,
    })
}

impl PlanDocument {
    pub fn parse(xml: &str) -> Result<Self, PlanParseError> {
        if xml.trim().is_empty() {
            return Err(PlanParseError::Empty);
        }

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut elements: Vec<PlanElement> = Vec::new();
        let mut open: Vec<usize> = Vec::new();

        loop {
            match reader.read_event().map_err(to_parse_err)? {
                Event::Start(e) => {
                    let parent = open.last().copied();
                    let element = read_element(&e, parent)?;
                    if let Some(p) = parent {
                        elements[p].child_count += 1;
                    }
                    open.push(elements.len());
                    elements.push(element);
                }
                Event::Empty(e) => {
                    let parent = open.last().copied();
                    let element = read_element(&e, parent)?;
                    if let Some(p) = parent {
                        elements[p].child_count += 1;
                    }
                    elements.push(element);
                }
                Event::End(_) => {
                    if open.pop().is_none() {
                        return Err(PlanParseError::Malformed("unexpected closing tag".to_string()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !open.is_empty() {
            return Err(PlanParseError::Malformed(format!(
                "{} unclosed element(s)",
                open.len()
            )));
        }
        if elements.is_empty() {
            return Err(PlanParseError::NoRootElement);
        }

        Ok(PlanDocument { elements })
    }

    pub fn elements(&self) -> &[PlanElement] {
        &self.elements
    }

    pub fn elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PlanElement> + 'a {
        self.elements.iter().filter(move |e| e.name == name)
    }

    pub fn has_element(&self, name: &str) -> bool {
        self.elements_named(name).next().is_some()
    }

    /// Any element carrying attribute `name` whose value satisfies `pred`.
    pub fn has_attribute(&self, name: &str, pred: impl Fn(&str) -> bool) -> bool {
        self.elements
            .iter()
            .filter_map(|e| e.attribute(name))
            .any(pred)
    }

    pub fn has_ancestor(&self, element: &PlanElement, name: &str) -> bool {
        let mut parent = element.parent;
        while let Some(index) = parent {
            let ancestor = &self.elements[index];
            if ancestor.name == name {
                return true;
            }
            parent = ancestor.parent;
        }
        false
    }
}
