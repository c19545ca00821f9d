//! [`ProfileStore`] backed by a Solid pod over HTTP.
//!
//! Documents are read as JSON-LD and written with a single SPARQL Update `PATCH`, which the
//! server applies atomically.

use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use async_trait::async_trait;
use reqwest::{
    Method, StatusCode,
    header::{ACCEPT, CONTENT_TYPE},
};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::{
    Email, Identifier, ProfileDocument, ProfilePatch,
    session::AuthenticatedFetch,
    store::{FindOne, ProfileStore, StoreError, UpdateQuery},
};

const JSON_LD: &str = "application/ld+json";
const SPARQL_UPDATE: &str = "application/sparql-update";
/// Error bodies are cut down to this many characters before being shown
const MAX_ERROR_BODY: usize = 200;

/// A vocabulary term, matched against JSON-LD keys in expanded, prefixed or bare form.
struct Term {
    iri: &'static str,
    prefixed: &'static str,
    local: &'static str,
}

impl Term {
    fn matches(&self, key: &str) -> bool {
        key == self.iri || key == self.prefixed || key == self.local
    }
}

const FOAF_NAME: Term = Term {
    iri: "http://xmlns.com/foaf/0.1/name",
    prefixed: "foaf:name",
    local: "name",
};
const VCARD_FN: Term = Term {
    iri: "http://www.w3.org/2006/vcard/ns#fn",
    prefixed: "vcard:fn",
    local: "fn",
};
const VCARD_HAS_EMAIL: Term = Term {
    iri: "http://www.w3.org/2006/vcard/ns#hasEmail",
    prefixed: "vcard:hasEmail",
    local: "hasEmail",
};
const VCARD_VALUE: Term = Term {
    iri: "http://www.w3.org/2006/vcard/ns#value",
    prefixed: "vcard:value",
    local: "value",
};

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpStore;

impl HttpStore {
    pub fn new() -> Self {
        Self
    }

    async fn read_graph(&self, doc: &Url, fetch: &AuthenticatedFetch) -> Result<Graph, StoreError> {
        debug!("GET {doc}");
        let response = fetch
            .request(Method::GET, doc.clone())
            .header(ACCEPT, JSON_LD)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }

        let body: Value = response.json().await.map_err(|e| {
            StoreError::Malformed(format!("Profile document is not valid JSON-LD: {e}"))
        })?;

        Graph::parse(&body, doc)
    }

    async fn read_profile(
        &self,
        query: &FindOne,
        fetch: &AuthenticatedFetch,
    ) -> Result<StoredProfile, StoreError> {
        self.read_graph(&query.from.document(), fetch)
            .await?
            .profile(&query.where_id)
    }
}

#[async_trait]
impl ProfileStore for HttpStore {
    async fn find_one(
        &self,
        query: &FindOne,
        fetch: &AuthenticatedFetch,
    ) -> Result<ProfileDocument, StoreError> {
        self.read_profile(query, fetch)
            .await
            .map(|stored| stored.doc)
    }

    async fn update(
        &self,
        query: &UpdateQuery,
        fetch: &AuthenticatedFetch,
    ) -> Result<ProfileDocument, StoreError> {
        let find = FindOne {
            from: query.doc.clone(),
            where_id: query.data.id.clone(),
        };

        // Deletions are computed from what the server holds right now
        let current = self.read_profile(&find, fetch).await?;
        let body = sparql_update(&current, &query.data);

        let doc = query.doc.document();
        debug!("PATCH {doc}\n{body}");
        let response = fetch
            .request(Method::PATCH, doc)
            .header(CONTENT_TYPE, SPARQL_UPDATE)
            .body(body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }

        self.find_one(&find, fetch).await
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Network(format!("Request timed out: {e}"))
    } else {
        StoreError::Network(e.to_string())
    }
}

fn classify(status: StatusCode, body: &str) -> StoreError {
    let detail: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    let message = if detail.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {detail}")
    };

    let error = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Permission(message),
        StatusCode::NOT_FOUND | StatusCode::GONE => StoreError::NotFound(message),
        StatusCode::BAD_REQUEST
        | StatusCode::CONFLICT
        | StatusCode::PRECONDITION_FAILED
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Validation(message),
        _ => StoreError::Server(message),
    };

    warn!(kind = %error.kind(), %status, "Pod rejected request");
    error
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeRef {
    Named(Url),
    Blank(String),
}

impl NodeRef {
    fn resolve(raw: &str, base: &Url) -> Result<Self, StoreError> {
        if let Some(label) = raw.strip_prefix("_:") {
            return Ok(NodeRef::Blank(label.into()));
        }

        base.join(raw)
            .map(NodeRef::Named)
            .map_err(|e| StoreError::Malformed(format!("Invalid @id `{raw}`: {e}")))
    }
}

impl Display for NodeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Named(url) => write!(f, "<{url}>"),
            NodeRef::Blank(label) => write!(f, "_:{label}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Literal {
    value: String,
    language: Option<String>,
    datatype: Option<Url>,
}

impl Literal {
    fn plain(value: &str) -> Self {
        Self {
            value: value.into(),
            language: None,
            datatype: None,
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::plain(s)),
            Value::Object(object) => {
                let value = match object.get("@value")? {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some(Self {
                    value,
                    language: object
                        .get("@language")
                        .and_then(Value::as_str)
                        .map(Into::into),
                    // Compact datatypes can't be expanded without the context, so they are
                    // dropped
                    datatype: object
                        .get("@type")
                        .and_then(Value::as_str)
                        .and_then(|t| Url::parse(t).ok())
                        .filter(|t| matches!(t.scheme(), "http" | "https")),
                })
            }
            _ => None,
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("\"")?;
        for c in self.value.chars() {
            match c {
                '\\' => f.write_str("\\\\")?,
                '"' => f.write_str("\\\"")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                c => write!(f, "{c}")?,
            }
        }
        f.write_str("\"")?;

        if let Some(language) = &self.language {
            write!(f, "@{language}")
        } else if let Some(datatype) = &self.datatype {
            write!(f, "^^<{datatype}>")
        } else {
            Ok(())
        }
    }
}

/// An email address the way the pod serialized it: as an IRI or as a string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StoredValue {
    Iri(Url),
    Literal(Literal),
}

impl StoredValue {
    fn url(&self) -> Option<Url> {
        match self {
            StoredValue::Iri(url) => Some(url.clone()),
            StoredValue::Literal(literal) => Url::parse(&literal.value).ok(),
        }
    }
}

impl Display for StoredValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoredValue::Iri(url) => write!(f, "<{url}>"),
            StoredValue::Literal(literal) => write!(f, "{literal}"),
        }
    }
}

/// How one of a profile's emails is currently stored.
#[derive(Debug, Clone)]
struct StoredEmail {
    /// `None` for inline nodes without an `@id`
    node: Option<NodeRef>,
    value: Option<StoredValue>,
}

/// A profile together with the exact triples it was read from.
#[derive(Debug, Clone)]
struct StoredProfile {
    doc: ProfileDocument,
    names: Vec<Literal>,
    emails: Vec<StoredEmail>,
}

/// The node objects of a JSON-LD document, keyed by `@id`.
#[derive(Debug)]
struct Graph {
    base: Url,
    nodes: HashMap<NodeRef, Map<String, Value>>,
}

impl Graph {
    fn parse(body: &Value, base: &Url) -> Result<Self, StoreError> {
        let mut graph = Self {
            base: base.clone(),
            nodes: HashMap::new(),
        };
        graph.collect(body)?;
        Ok(graph)
    }

    fn collect(&mut self, value: &Value) -> Result<(), StoreError> {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.collect(item)?;
                }
            }
            Value::Object(object) => {
                if let Some(inner) = object.get("@graph") {
                    self.collect(inner)?;
                }

                if let Some(raw) = object.get("@id").and_then(Value::as_str) {
                    let id = NodeRef::resolve(raw, &self.base)?;
                    let node = self.nodes.entry(id).or_default();
                    for (key, value) in object {
                        merge(node, key, value);
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn profile(&self, id: &Identifier) -> Result<StoredProfile, StoreError> {
        let subject = NodeRef::Named(id.url().clone());
        let node = self.nodes.get(&subject).ok_or_else(|| {
            StoreError::NotFound(format!("No profile for {id} in {}", id.document()))
        })?;

        let names: Vec<Literal> = values(node, &FOAF_NAME)
            .filter_map(Literal::from_json)
            .collect();
        let name = names
            .first()
            .cloned()
            .or_else(|| values(node, &VCARD_FN).find_map(Literal::from_json))
            .map(|l| l.value);

        let emails = values(node, &VCARD_HAS_EMAIL)
            .map(|value| self.email(value))
            .collect::<Result<Vec<_>, _>>()?;

        let doc = ProfileDocument {
            id: id.clone(),
            name,
            has_email: emails
                .iter()
                .find_map(|e| e.value.as_ref().and_then(StoredValue::url))
                .map(|value| Email { value }),
        };

        Ok(StoredProfile { doc, names, emails })
    }

    fn email(&self, value: &Value) -> Result<StoredEmail, StoreError> {
        let (node, properties) = match value {
            Value::String(raw) => {
                let node = NodeRef::resolve(raw, &self.base)?;
                let properties = self.nodes.get(&node);
                (Some(node), properties)
            }
            Value::Object(object) => match object.get("@id").and_then(Value::as_str) {
                Some(raw) => {
                    let node = NodeRef::resolve(raw, &self.base)?;
                    let properties = self.nodes.get(&node).or(Some(object));
                    (Some(node), properties)
                }
                None => (None, Some(object)),
            },
            other => {
                return Err(StoreError::Malformed(format!(
                    "Unexpected hasEmail value: {other}"
                )));
            }
        };

        let value = match properties.and_then(|p| values(p, &VCARD_VALUE).next()) {
            Some(Value::Object(object)) if object.contains_key("@id") => {
                match object.get("@id").and_then(Value::as_str) {
                    Some(raw) => Some(StoredValue::Iri(Url::parse(raw).map_err(|e| {
                        StoreError::Malformed(format!("Invalid email value `{raw}`: {e}"))
                    })?)),
                    None => None,
                }
            }
            Some(other) => Literal::from_json(other).map(StoredValue::Literal),
            None => None,
        };

        if let Some(StoredValue::Literal(literal)) = &value
            && Url::parse(&literal.value).is_err()
        {
            return Err(StoreError::Malformed(format!(
                "Invalid email value `{}`",
                literal.value
            )));
        }

        Ok(StoredEmail { node, value })
    }
}

/// Add `value` under `key`, turning repeated keys into arrays.
fn merge(node: &mut Map<String, Value>, key: &str, value: &Value) {
    match node.get_mut(key) {
        None => {
            node.insert(key.into(), value.clone());
        }
        Some(existing) if existing == value || key == "@id" => {}
        Some(Value::Array(items)) => match value {
            Value::Array(more) => items.extend(more.iter().cloned()),
            other => items.push(other.clone()),
        },
        Some(existing) => {
            let mut items = vec![existing.take()];
            match value {
                Value::Array(more) => items.extend(more.iter().cloned()),
                other => items.push(other.clone()),
            }
            *existing = Value::Array(items);
        }
    }
}

/// Every value stored under `term`, flattening arrays.
fn values<'a>(node: &'a Map<String, Value>, term: &Term) -> impl Iterator<Item = &'a Value> {
    node.iter()
        .filter(move |(key, _)| term.matches(key))
        .flat_map(|(_, value)| match value {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
}

/// Build the SPARQL Update replacing the editable fields of `current` with `patch`.
fn sparql_update(current: &StoredProfile, patch: &ProfilePatch) -> String {
    let subject = NodeRef::Named(patch.id.url().clone());
    let mut operations = Vec::new();
    let mut deletions = Vec::new();
    let mut insertions = Vec::new();

    for name in &current.names {
        deletions.push(format!("{subject} <{}> {name} .", FOAF_NAME.iri));
    }

    let email_node = current.emails.iter().find_map(|e| match &e.node {
        Some(node @ NodeRef::Named(_)) => Some(node.clone()),
        _ => None,
    });

    let anonymous = current
        .emails
        .iter()
        .any(|e| !matches!(e.node, Some(NodeRef::Named(_))));
    if anonymous {
        // Blank nodes can't be named in DELETE DATA, so every email is matched instead
        operations.push(format!(
            "DELETE {{ {subject} <{has_email}> ?email . ?email <{value}> ?value . }}\n\
             WHERE {{ {subject} <{has_email}> ?email . OPTIONAL {{ ?email <{value}> ?value . }} }}",
            has_email = VCARD_HAS_EMAIL.iri,
            value = VCARD_VALUE.iri,
        ));
    } else {
        for email in &current.emails {
            let Some(node) = &email.node else {
                continue;
            };
            deletions.push(format!("{subject} <{}> {node} .", VCARD_HAS_EMAIL.iri));
            if let Some(value) = &email.value {
                deletions.push(format!("{node} <{}> {value} .", VCARD_VALUE.iri));
            }
        }
    }

    insertions.push(format!(
        "{subject} <{}> {} .",
        FOAF_NAME.iri,
        Literal::plain(&patch.name)
    ));

    if let Some(email) = &patch.email {
        let node = email_node.unwrap_or_else(|| NodeRef::Named(patch.id.sibling("email")));
        insertions.push(format!("{subject} <{}> {node} .", VCARD_HAS_EMAIL.iri));
        insertions.push(format!("{node} <{}> <{}> .", VCARD_VALUE.iri, email.value));
    }

    if !deletions.is_empty() {
        operations.push(format!("DELETE DATA {{\n  {}\n}}", deletions.join("\n  ")));
    }
    operations.push(format!("INSERT DATA {{\n  {}\n}}", insertions.join("\n  ")));

    operations.join(" ;\n")
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn me() -> Identifier {
        Identifier::parse("https://u.example/profile/card#me").unwrap()
    }

    fn graph(body: Value) -> Graph {
        Graph::parse(&body, &me().document()).unwrap()
    }

    #[test]
    fn test_parse_compacted_graph() {
        let profile = graph(json!({
            "@context": {
                "foaf": "http://xmlns.com/foaf/0.1/",
                "vcard": "http://www.w3.org/2006/vcard/ns#"
            },
            "@graph": [
                {
                    "@id": "#me",
                    "foaf:name": "Ana",
                    "vcard:hasEmail": { "@id": "#email" }
                },
                {
                    "@id": "#email",
                    "vcard:value": { "@id": "mailto:ana@example.com" }
                }
            ]
        }))
        .profile(&me())
        .unwrap();

        assert_eq!(profile.doc.name.as_deref(), Some("Ana"));
        assert_eq!(
            profile.doc.has_email.unwrap().value.as_str(),
            "mailto:ana@example.com"
        );
    }

    #[test]
    fn test_parse_expanded_inline_email() {
        let profile = graph(json!([{
            "@id": "https://u.example/profile/card#me",
            "http://www.w3.org/2006/vcard/ns#fn": [{ "@value": "Ana", "@language": "en" }],
            "http://www.w3.org/2006/vcard/ns#hasEmail": [{
                "@id": "_:b0",
                "http://www.w3.org/2006/vcard/ns#value": [{ "@id": "mailto:ana@example.com" }]
            }]
        }]))
        .profile(&me())
        .unwrap();

        assert_eq!(profile.doc.name.as_deref(), Some("Ana"));
        assert!(profile.names.is_empty());
        assert!(matches!(
            profile.emails.as_slice(),
            [StoredEmail {
                node: Some(NodeRef::Blank(_)),
                value: Some(StoredValue::Iri(_))
            }]
        ));
    }

    #[test]
    fn test_parse_missing_subject() {
        let result = graph(json!({ "@id": "#someone-else", "name": "Bo" })).profile(&me());

        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_parse_empty_profile() {
        let profile = graph(json!({ "@id": "#me" })).profile(&me()).unwrap();

        assert_eq!(profile.doc, ProfileDocument::new(me()));
    }

    #[test]
    fn test_literal_escaping() {
        let literal = Literal::plain("A \"quoted\"\nname\\");

        assert_eq!(literal.to_string(), r#""A \"quoted\"\nname\\""#);
    }

    #[test]
    fn test_update_replaces_named_email() {
        let current = graph(json!({
            "@graph": [
                { "@id": "#me", "name": "Ana", "hasEmail": { "@id": "#email" } },
                { "@id": "#email", "value": { "@id": "mailto:ana@example.com" } }
            ]
        }))
        .profile(&me())
        .unwrap();
        let patch = ProfilePatch {
            id: me(),
            name: "Ana Maria".into(),
            email: Email::from_display("am@example.com").unwrap(),
        };

        let update = sparql_update(&current, &patch);

        assert!(update.starts_with("DELETE DATA {"));
        assert!(update.contains(
            "<https://u.example/profile/card#me> <http://xmlns.com/foaf/0.1/name> \"Ana\" ."
        ));
        assert!(update.contains(
            "<https://u.example/profile/card#email> <http://www.w3.org/2006/vcard/ns#value> <mailto:ana@example.com> ."
        ));
        assert!(update.contains(
            "<https://u.example/profile/card#email> <http://www.w3.org/2006/vcard/ns#value> <mailto:am@example.com> ."
        ));
        assert!(update.contains("\"Ana Maria\""));
    }

    #[test]
    fn test_update_unsets_email() {
        let current = graph(json!({
            "@graph": [
                { "@id": "#me", "hasEmail": { "@id": "#email" } },
                { "@id": "#email", "value": { "@id": "mailto:ana@example.com" } }
            ]
        }))
        .profile(&me())
        .unwrap();
        let patch = ProfilePatch {
            id: me(),
            name: "Ana".into(),
            email: None,
        };

        let update = sparql_update(&current, &patch);
        let insert = update.split("INSERT DATA").nth(1).unwrap();

        assert!(update.contains("<mailto:ana@example.com>"));
        assert!(!insert.contains("hasEmail"));
        assert!(!insert.contains("mailto:"));
    }

    #[test]
    fn test_update_unsets_every_email() {
        let current = graph(json!({
            "@graph": [
                { "@id": "#me", "hasEmail": [{ "@id": "#home" }, { "@id": "#work" }] },
                { "@id": "#home", "value": { "@id": "mailto:home@example.com" } },
                { "@id": "#work", "value": { "@id": "mailto:work@example.com" } }
            ]
        }))
        .profile(&me())
        .unwrap();
        assert_eq!(current.emails.len(), 2);
        assert_eq!(
            current.doc.has_email.as_ref().map(Email::display).as_deref(),
            Some("home@example.com")
        );

        let patch = ProfilePatch {
            id: me(),
            name: "Ana".into(),
            email: None,
        };
        let update = sparql_update(&current, &patch);
        let (delete, insert) = update.split_once("INSERT DATA").unwrap();

        for node in ["#home", "#work"] {
            assert!(delete.contains(&format!(
                "<https://u.example/profile/card#me> <http://www.w3.org/2006/vcard/ns#hasEmail> <https://u.example/profile/card{node}> ."
            )));
        }
        assert!(delete.contains("<mailto:home@example.com>"));
        assert!(delete.contains("<mailto:work@example.com>"));
        assert!(!insert.contains("hasEmail"));
    }

    #[test]
    fn test_update_deletes_literal_value_as_literal() {
        let current = graph(json!({
            "@graph": [
                { "@id": "#me", "hasEmail": { "@id": "#email" } },
                { "@id": "#email", "value": "mailto:ana@example.com" }
            ]
        }))
        .profile(&me())
        .unwrap();
        assert_eq!(
            current.doc.has_email.as_ref().map(|e| e.value.as_str()),
            Some("mailto:ana@example.com")
        );

        let patch = ProfilePatch {
            id: me(),
            name: "Ana".into(),
            email: None,
        };
        let update = sparql_update(&current, &patch);

        assert!(update.contains(
            "<https://u.example/profile/card#email> <http://www.w3.org/2006/vcard/ns#value> \"mailto:ana@example.com\" ."
        ));
        assert!(!update.contains("<mailto:ana@example.com>"));
    }

    #[test]
    fn test_update_blank_email() {
        let current = graph(json!({
            "@id": "#me",
            "hasEmail": { "value": "mailto:ana@example.com" }
        }))
        .profile(&me())
        .unwrap();
        let patch = ProfilePatch {
            id: me(),
            name: "Ana".into(),
            email: Email::from_display("ana@example.com").unwrap(),
        };

        let update = sparql_update(&current, &patch);

        assert!(update.starts_with("DELETE {"));
        assert!(update.contains("<https://u.example/profile/card#email>"));
    }

    #[test]
    fn test_classify() {
        assert!(
            classify(StatusCode::FORBIDDEN, "")
                .kind()
                .is_permission()
        );
        assert!(classify(StatusCode::NOT_FOUND, "").kind().is_not_found());
        assert!(
            classify(StatusCode::UNPROCESSABLE_ENTITY, "bad")
                .kind()
                .is_validation()
        );
        assert_eq!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, "  boom \n").to_string(),
            "500 Internal Server Error: boom"
        );
    }
}
