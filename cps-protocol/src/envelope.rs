//! Request envelope construction.
//!
//! The envelope text is identical for both transports:
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8"?>
//! <cps:request xmlns:cps="www.clusterpoint.com">
//! <cps:storage>..</cps:storage>
//! <cps:request_id>..</cps:request_id>      (optional)
//! <cps:application>..</cps:application>    (optional)
//! <cps:command>..</cps:command>
//! <cps:user>..</cps:user>
//! <cps:password>..</cps:password>
//! <cps:timeout>..</cps:timeout>            (optional)
//! <cps:type>..</cps:type>                  (optional)
//! <cps:content>..</cps:content>            (or <cps:content/>)
//! </cps:request>
//! ```

use crate::error::ProtocolError;
use crate::NAMESPACE;
use quick_xml::escape::partial_escape;
use std::fmt;
use std::str::FromStr;

/// How the server should distribute a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingType {
    Auto,
    Single,
    Cluster,
}

impl ProcessingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingType::Auto => "auto",
            ProcessingType::Single => "single",
            ProcessingType::Cluster => "cluster",
        }
    }
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ProcessingType::Auto),
            "single" => Ok(ProcessingType::Single),
            "cluster" => Ok(ProcessingType::Cluster),
            other => Err(ProtocolError::InvalidParameter(format!(
                "unknown processing type '{other}'"
            ))),
        }
    }
}

/// Optional per-request envelope fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub request_id: Option<String>,
    /// Advisory timeout for the server, in seconds. Not a local deadline; zero is not sent.
    pub timeout: Option<u64>,
    pub processing_type: Option<ProcessingType>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn with_processing_type(mut self, processing_type: ProcessingType) -> Self {
        self.processing_type = Some(processing_type);
        self
    }
}

/// The command-specific payload of a request.
///
/// Renders documents first, then nested groups, then flat fields in the
/// order they were first set. Empty values are never emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Content {
    documents: Vec<String>,
    groups: Vec<(String, Vec<(String, String)>)>,
    fields: Vec<(String, Vec<String>)>,
}

impl Content {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_documents(&mut self, documents: Vec<String>) {
        self.documents = documents;
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    /// Sets a field whose value is a markup fragment, inserted verbatim.
    pub fn set_markup(&mut self, name: &str, value: impl Into<String>) {
        self.set_values(name, vec![value.into()]);
    }

    /// Sets a repeated field of markup fragments, one tag pair per element.
    pub fn set_markup_list(&mut self, name: &str, values: Vec<String>) {
        self.set_values(name, values);
    }

    /// Sets a plain-text field; markup characters are escaped.
    pub fn set_text(&mut self, name: &str, value: &str) {
        self.set_values(name, vec![partial_escape(value).into_owned()]);
    }

    /// Sets a repeated plain-text field.
    pub fn set_text_list<I, S>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values = values
            .into_iter()
            .map(|v| partial_escape(v.as_ref()).into_owned())
            .collect();
        self.set_values(name, values);
    }

    /// Sets a field from any displayable value when present.
    pub fn set_optional<T: fmt::Display>(&mut self, name: &str, value: Option<T>) {
        if let Some(value) = value {
            self.set_text(name, &value.to_string());
        }
    }

    /// Sets a nested block of `<sub>value</sub>` pairs.
    pub fn set_group(&mut self, name: &str, entries: Vec<(String, String)>) {
        match self.groups.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = entries,
            None => self.groups.push((name.to_string(), entries)),
        }
    }

    /// True when rendering would produce no markup at all.
    pub fn is_empty(&self) -> bool {
        self.render().is_empty()
    }

    pub fn render(&self) -> String {
        let mut items: Vec<String> = self.documents.clone();

        for (name, entries) in &self.groups {
            let entries: Vec<&(String, String)> =
                entries.iter().filter(|(_, v)| !v.is_empty()).collect();
            if entries.is_empty() {
                continue;
            }
            items.push(format!("<{name}>"));
            for (key, value) in entries {
                items.push(format!("<{key}>{value}</{key}>"));
            }
            items.push(format!("</{name}>"));
        }

        for (name, values) in &self.fields {
            for value in values.iter().filter(|v| !v.is_empty()) {
                items.push(format!("<{name}>{value}</{name}>"));
            }
        }

        items.join("\n")
    }

    fn set_values(&mut self, name: &str, values: Vec<String>) {
        match self.fields.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = values,
            None => self.fields.push((name.to_string(), values)),
        }
    }
}

/// A complete request envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub storage: String,
    pub command: String,
    pub user: String,
    pub password: String,
    pub application: Option<String>,
    pub options: RequestOptions,
    pub content: Content,
}

impl Envelope {
    pub fn new(storage: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_application(mut self, application: Option<String>) -> Self {
        self.application = application;
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    /// Serializes the envelope to its canonical text form.
    pub fn to_xml(&self) -> String {
        let content = self.content.render();
        let mut out = String::with_capacity(256 + content.len());

        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str("<cps:request xmlns:cps=\"");
        out.push_str(NAMESPACE);
        out.push_str("\">\n");

        push_header(&mut out, "storage", &self.storage);
        if let Some(request_id) = non_empty(&self.options.request_id) {
            push_header(&mut out, "request_id", request_id);
        }
        if let Some(application) = non_empty(&self.application) {
            push_header(&mut out, "application", application);
        }
        push_header(&mut out, "command", &self.command);
        push_header(&mut out, "user", &self.user);
        push_header(&mut out, "password", &self.password);
        if let Some(timeout) = self.options.timeout.filter(|t| *t > 0) {
            push_header(&mut out, "timeout", &timeout.to_string());
        }
        if let Some(processing_type) = self.options.processing_type {
            push_header(&mut out, "type", processing_type.as_str());
        }

        if content.is_empty() {
            out.push_str("<cps:content/>\n");
        } else {
            out.push_str("<cps:content>\n");
            out.push_str(&content);
            out.push_str("\n</cps:content>\n");
        }
        out.push_str("</cps:request>\n");
        out
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn push_header(out: &mut String, tag: &str, value: &str) {
    out.push_str("<cps:");
    out.push_str(tag);
    out.push('>');
    out.push_str(&partial_escape(value));
    out.push_str("</cps:");
    out.push_str(tag);
    out.push_str(">\n");
}
