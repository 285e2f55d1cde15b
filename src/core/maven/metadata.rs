use quick_xml::de::from_str;
use serde::Deserialize;

use crate::core::downloader::{fetch_text, Fetcher};
use crate::core::error::InstallerResult;

/// `maven-metadata.xml`, reduced to the version listing.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MavenMetadata {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub versioning: Versioning,
}

#[derive(Debug, Deserialize, Default)]
pub struct Versioning {
    #[serde(default)]
    pub latest: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub versions: Versions,
}

#[derive(Debug, Deserialize, Default)]
pub struct Versions {
    #[serde(default, rename = "version")]
    pub items: Vec<String>,
}

impl MavenMetadata {
    pub fn parse(xml: &str) -> InstallerResult<Self> {
        Ok(from_str(xml)?)
    }

    pub async fn fetch(fetcher: &dyn Fetcher, url: &str) -> InstallerResult<Self> {
        Self::parse(&fetch_text(fetcher, url).await?)
    }

    pub fn versions(&self) -> &[String] {
        &self.versioning.versions.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_listing() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <metadata>
            <groupId>net.neoforged</groupId>
            <artifactId>neoforge</artifactId>
            <versioning>
                <latest>21.1.5-beta</latest>
                <release>21.1.5-beta</release>
                <versions>
                    <version>20.4.80-beta</version>
                    <version>20.4.237</version>
                    <version>21.1.5-beta</version>
                </versions>
                <lastUpdated>20240101000000</lastUpdated>
            </versioning>
        </metadata>"#;

        let meta = MavenMetadata::parse(xml).unwrap();
        assert_eq!(meta.artifact_id.as_deref(), Some("neoforge"));
        assert_eq!(meta.versions().len(), 3);
        assert_eq!(meta.versioning.release.as_deref(), Some("21.1.5-beta"));
    }
}
