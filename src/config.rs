use std::path::Path;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;
use tower_lsp::lsp_types::ClientCapabilities;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub hover: bool,
    pub document_links: bool,
    /// Link `image:` values to Docker Hub
    pub image_links: bool,
    /// Complete service, network, volume, config and secret names
    pub dependency_completion: bool,
    /// Read included files and Dockerfiles from disk when a document opens
    pub load_related_files: bool,
    /// Schema document to use instead of the embedded one
    pub schema_path: Option<String>,
    pub snippet_support: bool,
}

impl Settings {
    pub fn new(root_dir: &Path, capabilities: &ClientCapabilities) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/compose-lsp/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.compose-lsp",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("hover", true)?
            .set_default("document_links", true)?
            .set_default("image_links", true)?
            .set_default("dependency_completion", true)?
            .set_default("load_related_files", true)?
            .set_default("snippet_support", true)?
            .set_override_option(
                "snippet_support",
                capabilities
                    .text_document
                    .as_ref()
                    .and_then(|it| it.completion.as_ref())
                    .and_then(|it| it.completion_item.as_ref())
                    .and_then(|it| match it.snippet_support {
                        Some(true) => None,
                        _ => Some(false),
                    }),
            )?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let mut settings = settings.try_deserialize::<Settings>()?;
        settings.schema_path = settings
            .schema_path
            .map(|path| shellexpand::tilde(&path).into_owned());

        anyhow::Ok(settings)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            hover: true,
            document_links: true,
            image_links: true,
            dependency_completion: true,
            load_related_files: true,
            schema_path: None,
            snippet_support: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::{
        CompletionClientCapabilities, CompletionItemCapability, TextDocumentClientCapabilities,
    };

    fn capabilities(snippet_support: Option<bool>) -> ClientCapabilities {
        ClientCapabilities {
            text_document: Some(TextDocumentClientCapabilities {
                completion: Some(CompletionClientCapabilities {
                    completion_item: Some(CompletionItemCapability {
                        snippet_support,
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_without_settings_files() {
        let (_temp_dir, dir) = crate::test_utils::create_test_workspace_dir();
        let settings = Settings::new(&dir, &capabilities(Some(true))).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_workspace_settings_file() {
        let (_temp_dir, dir) = crate::test_utils::create_test_workspace_dir();
        std::fs::write(
            dir.join(".compose-lsp.toml"),
            "hover = false\nschema_path = \"/opt/schema.json\"\n",
        )
        .unwrap();

        let settings = Settings::new(&dir, &capabilities(Some(true))).unwrap();
        assert!(!settings.hover);
        assert_eq!(settings.schema_path.as_deref(), Some("/opt/schema.json"));
    }

    #[test]
    fn test_snippets_follow_client_capabilities() {
        let (_temp_dir, dir) = crate::test_utils::create_test_workspace_dir();
        let settings = Settings::new(&dir, &capabilities(None)).unwrap();
        assert!(!settings.snippet_support);
    }
}
