//! Share-listing discovery.
//!
//! Some deployments publish frames to a file share whose contents can be
//! fetched in a single listing request instead of probing candidate names
//! one by one. Entry names follow `<printer>-<number>.jpg`; everything else
//! in the share is ignored.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::discovery::{Discover, Frame};

/// One entry of the share listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareEntry {
    pub name: String,
    pub download_url: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    items: Vec<ShareEntry>,
}

/// Frames grouped per printer; iteration yields printers in name order.
pub type FrameGroups = BTreeMap<String, Vec<Frame>>;

/// Split `<printer>-<number>.jpg` into its parts.
///
/// The printer name may itself contain dashes; the frame number is whatever
/// follows the last one. Extension match is case-insensitive.
fn parse_entry_name(name: &str) -> Option<(&str, u32)> {
    let (stem, extension) = name.rsplit_once('.')?;
    if !extension.eq_ignore_ascii_case("jpg") {
        return None;
    }
    let (printer, number) = stem.rsplit_once('-')?;
    if printer.is_empty() {
        return None;
    }
    let ordinal = number.parse().ok()?;
    Some((printer, ordinal))
}

/// Group listing entries by printer, each group ascending by frame number.
pub fn group_entries(entries: Vec<ShareEntry>) -> FrameGroups {
    let mut groups: FrameGroups = BTreeMap::new();

    for entry in entries {
        let Some((printer, ordinal)) = parse_entry_name(&entry.name) else {
            tracing::debug!("Skipping unrecognized share entry: {}", entry.name);
            continue;
        };
        groups.entry(printer.to_string()).or_default().push(Frame {
            ordinal,
            locator: entry.download_url,
        });
    }

    for frames in groups.values_mut() {
        frames.sort_by_key(|f| f.ordinal);
        frames.dedup_by_key(|f| f.ordinal);
    }

    groups
}

/// Listing-based discovery strategy.
///
/// One-shot: every call re-fetches the whole share. Unlike the probe scan,
/// a failure here is surfaced to the caller rather than folded into
/// miss-counting, since the single request is all-or-nothing.
pub struct ShareListing {
    client: reqwest::Client,
    listing_url: String,
}

impl ShareListing {
    pub fn new(client: reqwest::Client, listing_url: String) -> Self {
        Self {
            client,
            listing_url,
        }
    }

    /// Fetch and group the whole share in one request.
    pub async fn fetch_groups(&self) -> Result<FrameGroups> {
        let response = self
            .client
            .get(&self.listing_url)
            .send()
            .await
            .context("Failed to fetch share listing")?
            .error_for_status()
            .context("Share listing returned an error status")?;

        let parsed: ListResponse = response
            .json()
            .await
            .context("Failed to parse share listing")?;

        Ok(group_entries(parsed.items))
    }
}

#[async_trait]
impl Discover for ShareListing {
    async fn discover(&self, printer: &str) -> Result<Vec<Frame>> {
        let mut groups = self.fetch_groups().await?;
        Ok(groups.remove(printer).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ShareEntry {
        ShareEntry {
            name: name.to_string(),
            download_url: format!("http://share/download/{}", name),
        }
    }

    #[test]
    fn parses_printer_and_frame_number() {
        assert_eq!(parse_entry_name("h2c-3.jpg"), Some(("h2c", 3)));
        assert_eq!(parse_entry_name("h2c-3.JPG"), Some(("h2c", 3)));
        assert_eq!(parse_entry_name("mk3-v2-17.jpg"), Some(("mk3-v2", 17)));
    }

    #[test]
    fn rejects_names_outside_the_scheme() {
        assert_eq!(parse_entry_name("readme.txt"), None);
        assert_eq!(parse_entry_name("h2c-3.png"), None);
        assert_eq!(parse_entry_name("h2c_3.jpg"), None);
        assert_eq!(parse_entry_name("-3.jpg"), None);
        assert_eq!(parse_entry_name("h2c-.jpg"), None);
        assert_eq!(parse_entry_name("h2c-three.jpg"), None);
    }

    #[test]
    fn groups_by_printer_in_name_order() {
        let groups = group_entries(vec![
            entry("h2c-3.jpg"),
            entry("h2c-1.jpg"),
            entry("h2d-2.jpg"),
        ]);

        let printers: Vec<&String> = groups.keys().collect();
        assert_eq!(printers, vec!["h2c", "h2d"]);

        let h2c: Vec<u32> = groups["h2c"].iter().map(|f| f.ordinal).collect();
        assert_eq!(h2c, vec![1, 3]);

        let h2d: Vec<u32> = groups["h2d"].iter().map(|f| f.ordinal).collect();
        assert_eq!(h2d, vec![2]);
    }

    #[test]
    fn unrecognized_entries_are_skipped() {
        let groups = group_entries(vec![
            entry("h2c-1.jpg"),
            entry("thumbs.db"),
            entry("notes.txt"),
        ]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups["h2c"].len(), 1);
    }

    #[test]
    fn duplicate_frame_numbers_collapse() {
        let groups = group_entries(vec![entry("h2c-1.jpg"), entry("h2c-1.jpg")]);
        assert_eq!(groups["h2c"].len(), 1);
    }

    #[test]
    fn frames_carry_the_download_url() {
        let groups = group_entries(vec![entry("h2c-1.jpg")]);
        assert_eq!(groups["h2c"][0].locator, "http://share/download/h2c-1.jpg");
    }
}
