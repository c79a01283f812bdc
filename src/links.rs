//! Document links: file paths written in a Compose file and Docker Hub pages
//! for `image:` values.

use pathdiff::diff_paths;
use tower_lsp::lsp_types::{DocumentLink, Url};

use crate::{
    config::Settings,
    document::{Document, Mapping, Node, Scalar},
};

/// Top-level sections whose entries may point at a `file:`.
const FILE_SECTIONS: [&str; 2] = ["secrets", "configs"];

pub fn document_links(document: &Document, settings: &Settings) -> Option<Vec<DocumentLink>> {
    if !settings.document_links {
        return None;
    }

    let mut links: Vec<DocumentLink> = document
        .include_paths()
        .into_iter()
        .filter_map(|path| file_link(document, path))
        .collect();
    for root in document.root_mappings() {
        if let Some(Node::Sequence(include)) = root.get("include") {
            for entry in include.items.iter().filter_map(Node::as_mapping) {
                links.extend(env_file_links(document, entry));
            }
        }

        for section in FILE_SECTIONS {
            let Some(entries) = root.get(section).and_then(Node::as_mapping) else {
                continue;
            };
            for entry in entries.pairs.iter().filter_map(|pair| pair.value.as_mapping()) {
                links.extend(scalar_at(entry, "file").and_then(|file| file_link(document, file)));
            }
        }

        let Some(services) = root.get("services").and_then(Node::as_mapping) else {
            continue;
        };
        for service in services.pairs.iter().filter_map(|pair| pair.value.as_mapping()) {
            links.extend(service_links(document, service, settings));
        }
    }

    links.sort_by_key(|link| (link.range.start.line, link.range.start.character));
    links.dedup_by(|a, b| a.range == b.range);
    Some(links)
}

fn service_links(document: &Document, service: &Mapping, settings: &Settings) -> Vec<DocumentLink> {
    let mut links = env_file_links(document, service);

    if let Some(label_file) = service.get("label_file") {
        links.extend(
            label_file
                .scalars()
                .into_iter()
                .filter_map(|file| file_link(document, file)),
        );
    }

    for (attribute, key) in [("extends", "file"), ("credential_spec", "file")] {
        let file = service
            .get(attribute)
            .and_then(Node::as_mapping)
            .and_then(|mapping| scalar_at(mapping, key));
        links.extend(file.and_then(|file| file_link(document, file)));
    }

    if let Some(build) = service.get("build") {
        let dockerfile = build
            .as_mapping()
            .and_then(|mapping| scalar_at(mapping, "dockerfile"))
            .filter(|dockerfile| is_local_path(&dockerfile.value));
        if let Some(dockerfile) = dockerfile {
            let target = document.dockerfile_uri(build);
            links.extend(target.map(|target| link(document, dockerfile, target)));
        }
    }

    if settings.image_links {
        if let Some(image) = scalar_at(service, "image") {
            links.extend(docker_hub_url(&image.value).map(|target| DocumentLink {
                range: image.range(),
                target: Some(target),
                tooltip: Some("Open on Docker Hub".to_string()),
                data: None,
            }));
        }
    }

    links
}

/// `env_file` as a string, a list of strings, or a list of `path:` entries.
fn env_file_links(document: &Document, owner: &Mapping) -> Vec<DocumentLink> {
    let Some(env_file) = owner.get("env_file") else {
        return vec![];
    };
    let paths: Vec<&Scalar> = match env_file {
        Node::Scalar(path) => vec![path],
        Node::Sequence(entries) => entries
            .items
            .iter()
            .filter_map(|entry| match entry {
                Node::Scalar(path) => Some(path),
                Node::Mapping(long) => scalar_at(long, "path"),
                _ => None,
            })
            .collect(),
        _ => vec![],
    };
    paths
        .into_iter()
        .filter_map(|path| file_link(document, path))
        .collect()
}

fn scalar_at<'m>(mapping: &'m Mapping, key: &str) -> Option<&'m Scalar> {
    mapping.get(key).and_then(Node::as_scalar)
}

fn is_local_path(written: &str) -> bool {
    !written.trim().is_empty() && !written.contains("://") && !written.contains("${")
}

fn file_link(document: &Document, path: &Scalar) -> Option<DocumentLink> {
    if !is_local_path(&path.value) {
        return None;
    }
    let target = document.resolve_uri(&path.value)?;
    Some(link(document, path, target))
}

fn link(document: &Document, scalar: &Scalar, target: Url) -> DocumentLink {
    DocumentLink {
        range: scalar.range(),
        tooltip: Some(format!("Open {}", tooltip_path(document, &target))),
        target: Some(target),
        data: None,
    }
}

/// Target path relative to the document's directory when it has one.
fn tooltip_path(document: &Document, target: &Url) -> String {
    let Ok(path) = target.to_file_path() else {
        return target.to_string();
    };
    document
        .directory()
        .and_then(|directory| diff_paths(&path, directory))
        .map(|relative| relative.display().to_string())
        .filter(|relative| !relative.is_empty())
        .unwrap_or_else(|| path.display().to_string())
}

/// Docker Hub page of an image reference. Images from other registries and
/// references with interpolation have none.
pub fn docker_hub_url(image: &str) -> Option<Url> {
    let image = image.trim();
    if image.is_empty() || image.contains("${") {
        return None;
    }

    let name = image.split('@').next()?;
    // a colon after the last slash starts the tag
    let name = match name.rsplit_once('/') {
        Some((repository, last)) => {
            format!("{repository}/{}", last.split(':').next().unwrap_or(last))
        }
        None => name.split(':').next().unwrap_or(name).to_string(),
    };

    let mut components: Vec<&str> = name.split('/').collect();
    if let Some(first) = components.first().copied() {
        let is_registry = first.contains('.') || first.contains(':') || first == "localhost";
        if is_registry && components.len() > 1 {
            if !matches!(first, "docker.io" | "index.docker.io" | "registry-1.docker.io") {
                return None;
            }
            components.remove(0);
        }
    }

    let url = match components.as_slice() {
        [name] | ["library", name] if !name.is_empty() => {
            format!("https://hub.docker.com/_/{name}")
        }
        [namespace, name] if !namespace.is_empty() && !name.is_empty() => {
            format!("https://hub.docker.com/r/{namespace}/{name}")
        }
        _ => return None,
    };
    Url::parse(&url).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{file_uri, position};
    use pretty_assertions::assert_eq;

    fn links(text: &str) -> Vec<DocumentLink> {
        let document = Document::new(file_uri("/w/app/compose.yaml"), text);
        document_links(&document, &Settings::default()).expect("links enabled")
    }

    fn targets(text: &str) -> Vec<String> {
        links(text)
            .into_iter()
            .filter_map(|link| link.target)
            .map(|target| target.to_string())
            .collect()
    }

    // ========================================================================
    // Image links
    // ========================================================================

    #[test]
    fn test_docker_hub_url() {
        let url = |image: &str| docker_hub_url(image).map(|url| url.to_string());
        assert_eq!(url("nginx").as_deref(), Some("https://hub.docker.com/_/nginx"));
        assert_eq!(url("nginx:1.25-alpine").as_deref(), Some("https://hub.docker.com/_/nginx"));
        assert_eq!(url("library/redis:7").as_deref(), Some("https://hub.docker.com/_/redis"));
        assert_eq!(
            url("bitnami/postgresql:16").as_deref(),
            Some("https://hub.docker.com/r/bitnami/postgresql")
        );
        assert_eq!(
            url("docker.io/grafana/grafana@sha256:abc").as_deref(),
            Some("https://hub.docker.com/r/grafana/grafana")
        );
        assert_eq!(url("ghcr.io/owner/tool:1"), None);
        assert_eq!(url("localhost:5000/app"), None);
        assert_eq!(url("${IMAGE}"), None);
    }

    #[test]
    fn test_image_link_range_is_the_value() {
        let found = links("services:\n  web:\n    image: nginx:latest\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].range.start, position(2, 11));
        assert_eq!(found[0].range.end, position(2, 23));
    }

    #[test]
    fn test_image_links_can_be_disabled() {
        let document = Document::new(
            file_uri("/w/compose.yaml"),
            "services:\n  web:\n    image: nginx\n",
        );
        let settings = Settings {
            image_links: false,
            ..Settings::default()
        };
        assert_eq!(document_links(&document, &settings), Some(vec![]));
    }

    #[test]
    fn test_links_can_be_disabled() {
        let document = Document::new(file_uri("/w/compose.yaml"), "include:\n  - a.yaml\n");
        let settings = Settings {
            document_links: false,
            ..Settings::default()
        };
        assert_eq!(document_links(&document, &settings), None);
    }

    // ========================================================================
    // File links
    // ========================================================================

    #[test]
    fn test_service_file_links() {
        let text = "services:
  web:
    env_file:
      - .env
      - path: ./override.env
        required: false
    label_file: ./labels
    extends:
      file: ../base.yaml
      service: common
    credential_spec:
      file: spec.json
    build:
      context: ./src
      dockerfile: web.Dockerfile
";
        assert_eq!(
            targets(text),
            vec![
                "file:///w/app/.env",
                "file:///w/app/override.env",
                "file:///w/app/labels",
                "file:///w/base.yaml",
                "file:///w/app/spec.json",
                "file:///w/app/src/web.Dockerfile",
            ]
        );
    }

    #[test]
    fn test_top_level_file_links() {
        let text = "include:
  - ../db/compose.yaml
  - path: cache.yaml
    env_file: cache.env
secrets:
  token:
    file: ./secrets/token
  external:
    external: true
configs:
  nginx:
    file: nginx.conf
";
        assert_eq!(
            targets(text),
            vec![
                "file:///w/db/compose.yaml",
                "file:///w/app/cache.yaml",
                "file:///w/app/cache.env",
                "file:///w/app/secrets/token",
                "file:///w/app/nginx.conf",
            ]
        );
    }

    #[test]
    fn test_tooltip_is_relative_to_document() {
        let found = links("include:\n  - ../db/compose.yaml\n");
        assert_eq!(found[0].tooltip.as_deref(), Some("Open ../db/compose.yaml"));
        assert_eq!(found[0].range.start, position(1, 4));
    }

    #[test]
    fn test_interpolated_paths_are_skipped() {
        assert!(links("services:\n  web:\n    env_file: ${ENV_FILE}\n").is_empty());
    }
}
