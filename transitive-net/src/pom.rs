// transitive-net/src/pom.rs
// POM codec: parses the parts of a project object model that affect the
// dependency graph. Inheritance and dependency management are applied by
// the repository client, which can fetch parents and imported BOMs.

use std::collections::HashMap;

use roxmltree::{Document, Node};
use transitive_common::error::{ResolveError, Result};
use transitive_common::Coordinate;

const MAX_INTERPOLATION_PASSES: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PomModel {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub parent: Option<PomParent>,
    pub properties: HashMap<String, String>,
    pub dependency_management: Vec<PomDependency>,
    pub dependencies: Vec<PomDependency>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PomParent {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

/// A `<dependency>` element exactly as written, placeholders included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PomDependency {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub optional: Option<String>,
    pub classifier: Option<String>,
    pub dep_type: Option<String>,
    pub exclusions: Vec<(String, String)>,
}

impl PomModel {
    /// Decodes a POM file and parses it. UTF-8 is assumed unless the XML
    /// declaration names ISO-8859-1, which older POMs still use.
    pub fn from_bytes(bytes: &[u8], coordinate: &Coordinate) -> Result<Self> {
        let xml = decode(bytes).map_err(|reason| ResolveError::corrupt(coordinate, reason))?;
        Self::parse(&xml, coordinate)
    }

    /// Parses `xml`; `coordinate` only labels errors.
    pub fn parse(xml: &str, coordinate: &Coordinate) -> Result<Self> {
        let document = Document::parse(xml).map_err(|e| {
            ResolveError::corrupt(coordinate, format!("failed to parse POM: {e}"))
        })?;
        let project = document.root_element();
        if project.tag_name().name() != "project" {
            return Err(ResolveError::corrupt(
                coordinate,
                format!(
                    "expected <project> root element, found <{}>",
                    project.tag_name().name()
                ),
            ));
        }

        let parent = child(&project, "parent")
            .map(|node| parse_parent(node, coordinate))
            .transpose()?;

        Ok(Self {
            group_id: node_text(&project, "groupId"),
            artifact_id: node_text(&project, "artifactId"),
            version: node_text(&project, "version"),
            packaging: node_text(&project, "packaging"),
            parent,
            properties: parse_properties(&project),
            dependency_management: child(&project, "dependencyManagement")
                .map(|dm| parse_dependencies(&dm))
                .unwrap_or_default(),
            dependencies: parse_dependencies(&project),
        })
    }
}

impl PomParent {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(&self.group_id, &self.artifact_id, &self.version).descriptor()
    }
}

impl PomDependency {
    /// Key under which dependency management and inheritance merge entries:
    /// `group:artifact:type[:classifier]`, with placeholders left as written.
    pub fn management_key(&self) -> String {
        let mut key = format!(
            "{}:{}:{}",
            self.group_id.as_deref().unwrap_or_default(),
            self.artifact_id.as_deref().unwrap_or_default(),
            self.dep_type.as_deref().unwrap_or("jar")
        );
        if let Some(classifier) = &self.classifier {
            key.push(':');
            key.push_str(classifier);
        }
        key
    }

    /// Returns a copy with every field interpolated against `properties`.
    /// Fails with the name of the first placeholder that cannot be resolved.
    pub fn interpolated(
        &self,
        properties: &HashMap<String, String>,
    ) -> std::result::Result<Self, String> {
        let field = |value: &Option<String>| -> std::result::Result<Option<String>, String> {
            value
                .as_deref()
                .map(|v| interpolate(v, properties))
                .transpose()
        };
        Ok(Self {
            group_id: field(&self.group_id)?,
            artifact_id: field(&self.artifact_id)?,
            version: field(&self.version)?,
            scope: field(&self.scope)?,
            optional: field(&self.optional)?,
            classifier: field(&self.classifier)?,
            dep_type: field(&self.dep_type)?,
            exclusions: self
                .exclusions
                .iter()
                .map(|(g, a)| -> std::result::Result<(String, String), String> {
                    Ok((interpolate(g, properties)?, interpolate(a, properties)?))
                })
                .collect::<std::result::Result<_, String>>()?,
        })
    }

    pub fn is_optional(&self) -> bool {
        self.optional
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

/// Maps a dependency `<type>` to the file extension and implied classifier.
pub fn type_extension(dep_type: Option<&str>, classifier: Option<&str>) -> (String, Option<String>) {
    let classifier = classifier.map(str::to_string);
    match dep_type.unwrap_or("jar") {
        "test-jar" => ("jar".to_string(), classifier.or(Some("tests".to_string()))),
        "ejb-client" => ("jar".to_string(), classifier.or(Some("client".to_string()))),
        "java-source" => ("jar".to_string(), classifier.or(Some("sources".to_string()))),
        "javadoc" => ("jar".to_string(), classifier.or(Some("javadoc".to_string()))),
        "bundle" | "maven-plugin" | "ejb" | "jar" => ("jar".to_string(), classifier),
        other => (other.to_string(), classifier),
    }
}

/// Resolves `${name}` placeholders. Every placeholder is replaced in each
/// pass; further passes only resolve values that themselves contain
/// placeholders. A value that still contains one afterwards is an error
/// carrying the unresolved name.
pub fn interpolate(value: &str, properties: &HashMap<String, String>) -> std::result::Result<String, String> {
    let mut current = value.to_string();
    for _ in 0..MAX_INTERPOLATION_PASSES {
        if !current.contains("${") {
            return Ok(current);
        }
        let mut next = String::with_capacity(current.len());
        let mut rest = current.as_str();
        while let Some(start) = rest.find("${") {
            let Some(len) = rest[start..].find('}') else {
                return Err(rest[start..].to_string());
            };
            let name = &rest[start + 2..start + len];
            let replacement = properties
                .get(name)
                .ok_or_else(|| format!("${{{name}}}"))?;
            next.push_str(&rest[..start]);
            next.push_str(replacement);
            rest = &rest[start + len + 1..];
        }
        next.push_str(rest);
        current = next;
    }
    if current.contains("${") {
        Err(current)
    } else {
        Ok(current)
    }
}

fn decode(bytes: &[u8]) -> std::result::Result<String, String> {
    match std::str::from_utf8(bytes) {
        Ok(xml) => Ok(xml.to_string()),
        Err(e) => match declared_encoding(bytes).as_deref() {
            Some("iso-8859-1" | "iso8859-1" | "latin1" | "l1") => {
                Ok(bytes.iter().map(|&b| char::from(b)).collect())
            }
            Some(other) => Err(format!("unsupported encoding '{other}': {e}")),
            None => Err(format!("not valid UTF-8: {e}")),
        },
    }
}

/// The lowercased `encoding` of the XML declaration, if there is one.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let end = bytes.windows(2).position(|w| w == b"?>")?;
    let prolog = String::from_utf8_lossy(&bytes[..end]);
    let prolog = prolog.trim_start_matches('\u{feff}').trim_start();
    if !prolog.starts_with("<?xml") {
        return None;
    }
    let after = &prolog[prolog.find("encoding")? + "encoding".len()..];
    let after = after.trim_start().strip_prefix('=')?.trim_start();
    let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &after[1..];
    let close = value.find(quote)?;
    Some(value[..close].trim().to_ascii_lowercase())
}

fn parse_parent(node: Node<'_, '_>, coordinate: &Coordinate) -> Result<PomParent> {
    let field = |tag: &str| {
        node_text(&node, tag).ok_or_else(|| {
            ResolveError::corrupt(coordinate, format!("<parent> is missing <{tag}>"))
        })
    };
    Ok(PomParent {
        group_id: field("groupId")?,
        artifact_id: field("artifactId")?,
        version: field("version")?,
    })
}

fn parse_properties(node: &Node<'_, '_>) -> HashMap<String, String> {
    child(node, "properties")
        .map(|props| {
            props
                .children()
                .filter(|c| c.is_element())
                .map(|prop| {
                    let value = prop.text().map(|t| t.trim().to_string()).unwrap_or_default();
                    (prop.tag_name().name().to_string(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_dependencies(node: &Node<'_, '_>) -> Vec<PomDependency> {
    child(node, "dependencies")
        .map(|deps| {
            deps.children()
                .filter(|c| c.is_element() && c.tag_name().name() == "dependency")
                .map(parse_dependency)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_dependency(node: Node<'_, '_>) -> PomDependency {
    let exclusions = child(&node, "exclusions")
        .map(|exclusions| {
            exclusions
                .children()
                .filter(|c| c.is_element() && c.tag_name().name() == "exclusion")
                .map(|ex| {
                    // A missing side of an exclusion means "any".
                    (
                        node_text(&ex, "groupId").unwrap_or_else(|| "*".to_string()),
                        node_text(&ex, "artifactId").unwrap_or_else(|| "*".to_string()),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    PomDependency {
        group_id: node_text(&node, "groupId"),
        artifact_id: node_text(&node, "artifactId"),
        version: node_text(&node, "version"),
        scope: node_text(&node, "scope"),
        optional: node_text(&node, "optional"),
        classifier: node_text(&node, "classifier"),
        dep_type: node_text(&node, "type"),
        exclusions,
    }
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == tag)
}

fn node_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|c| c.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
