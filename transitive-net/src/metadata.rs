// transitive-net/src/metadata.rs
use roxmltree::Document;
use transitive_common::error::{ResolveError, Result};

/// Extracts `<versioning><versions><version>` from a `maven-metadata.xml`,
/// in document order. `subject` labels errors.
pub fn parse_versions(xml: &str, subject: &str) -> Result<Vec<String>> {
    let document = Document::parse(xml)
        .map_err(|e| ResolveError::corrupt(subject, format!("failed to parse metadata: {e}")))?;
    let root = document.root_element();
    if root.tag_name().name() != "metadata" {
        return Err(ResolveError::corrupt(
            subject,
            format!(
                "expected <metadata> root element, found <{}>",
                root.tag_name().name()
            ),
        ));
    }

    let versions = root
        .children()
        .filter(|n| n.has_tag_name("versioning"))
        .flat_map(|versioning| versioning.children().filter(|n| n.has_tag_name("versions")))
        .flat_map(|versions| versions.children().filter(|n| n.has_tag_name("version")))
        .filter_map(|v| v.text())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    Ok(versions)
}
