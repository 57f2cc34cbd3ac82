//! Frame discovery over a minute-indexed URL naming scheme.
//!
//! The publisher uploads one image per active minute under a predictable
//! name. With no listing API, the only way to learn what exists is to walk
//! candidate names backward from the current minute and probe each one. Idle
//! periods and upload latency leave holes in the numbering, so the scan
//! tolerates a bounded run of misses before concluding the feed has gone
//! quiet and stopping.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::clock::ReferenceClock;
use crate::probe::Probe;

/// One discovered time-lapse frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Minute of day (or sequence number) encoded in the source name.
    pub ordinal: u32,
    /// Fetchable URL of the image.
    pub locator: String,
}

/// Builds candidate URLs from the publisher's naming convention.
#[derive(Debug, Clone)]
pub struct FrameLocator {
    base_url: String,
    extension: String,
    padded: bool,
}

impl FrameLocator {
    pub fn new(base_url: &str, extension: &str, padded: bool) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            extension: extension.to_string(),
            padded,
        }
    }

    /// Candidate URL for one printer at one ordinal.
    ///
    /// Padding must match what the publisher writes exactly: `_0095` and
    /// `_95` are different resources.
    pub fn url_for(&self, printer: &str, ordinal: u32) -> String {
        let printer = urlencoding::encode(printer);
        if self.padded {
            format!(
                "{}/{}_{:04}.{}",
                self.base_url, printer, ordinal, self.extension
            )
        } else {
            format!(
                "{}/{}_{}.{}",
                self.base_url, printer, ordinal, self.extension
            )
        }
    }
}

/// A discovery strategy: the ordered frames currently available for one
/// printer, oldest first.
#[async_trait]
pub trait Discover: Send + Sync {
    async fn discover(&self, printer: &str) -> Result<Vec<Frame>>;
}

/// Walk candidate ordinals downward from `start`, collecting frames that
/// exist.
///
/// Probes run strictly one at a time: each outcome decides whether the scan
/// continues. A hit resets the consecutive-miss counter; `max_gap` misses in
/// a row end the scan, as does collecting `max_count` frames or reaching
/// ordinal 0. The result is returned ascending.
pub async fn scan_backward(
    probe: &dyn Probe,
    locator: &FrameLocator,
    printer: &str,
    start: u32,
    max_count: usize,
    max_gap: u32,
) -> Vec<Frame> {
    let mut found: Vec<Frame> = Vec::new();
    let mut misses = 0u32;
    let mut ordinal = start;

    if max_count == 0 || max_gap == 0 {
        return found;
    }

    loop {
        let url = locator.url_for(printer, ordinal);
        if probe.exists(&url).await {
            found.push(Frame {
                ordinal,
                locator: url,
            });
            misses = 0;
            if found.len() >= max_count {
                break;
            }
        } else {
            misses += 1;
            if misses >= max_gap {
                tracing::debug!(
                    "Scan for {} hit {} consecutive misses at minute {}, stopping",
                    printer,
                    misses,
                    ordinal
                );
                break;
            }
        }

        if ordinal == 0 {
            break;
        }
        ordinal -= 1;
    }

    found.reverse();
    found
}

/// Probe-based discovery: seeds a backward scan from the reference clock.
pub struct ProbeScan {
    probe: Arc<dyn Probe>,
    locator: FrameLocator,
    clock: ReferenceClock,
    max_count: usize,
    max_gap: u32,
}

impl ProbeScan {
    pub fn new(
        probe: Arc<dyn Probe>,
        locator: FrameLocator,
        clock: ReferenceClock,
        max_count: usize,
        max_gap: u32,
    ) -> Self {
        Self {
            probe,
            locator,
            clock,
            max_count,
            max_gap,
        }
    }
}

#[async_trait]
impl Discover for ProbeScan {
    async fn discover(&self, printer: &str) -> Result<Vec<Frame>> {
        let start = self.clock.minute_of_day();
        tracing::debug!("Scanning {} backward from minute {}", printer, start);
        Ok(scan_backward(
            self.probe.as_ref(),
            &self.locator,
            printer,
            start,
            self.max_count,
            self.max_gap,
        )
        .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe {
        hits: HashSet<String>,
        probed: AtomicUsize,
    }

    impl FixedProbe {
        fn at(locator: &FrameLocator, printer: &str, ordinals: &[u32]) -> Self {
            Self {
                hits: ordinals
                    .iter()
                    .map(|o| locator.url_for(printer, *o))
                    .collect(),
                probed: AtomicUsize::new(0),
            }
        }

        fn probe_count(&self) -> usize {
            self.probed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Probe for FixedProbe {
        async fn exists(&self, url: &str) -> bool {
            self.probed.fetch_add(1, Ordering::SeqCst);
            self.hits.contains(url)
        }
    }

    fn locator() -> FrameLocator {
        FrameLocator::new("http://host/frames", "jpg", false)
    }

    fn ordinals(frames: &[Frame]) -> Vec<u32> {
        frames.iter().map(|f| f.ordinal).collect()
    }

    #[test]
    fn padded_and_unpadded_urls() {
        let padded = FrameLocator::new("http://host/frames/", "jpg", true);
        assert_eq!(padded.url_for("h2c", 95), "http://host/frames/h2c_0095.jpg");

        let plain = locator();
        assert_eq!(plain.url_for("h2c", 95), "http://host/frames/h2c_95.jpg");
    }

    #[test]
    fn printer_names_are_percent_encoded() {
        assert_eq!(
            locator().url_for("mk3 s", 5),
            "http://host/frames/mk3%20s_5.jpg"
        );
    }

    #[tokio::test]
    async fn gap_run_terminates_before_older_frames() {
        // Hits at 95, 94 and 90; misses at 93, 92, 91. With max_gap of
        // three, the scan must stop after 91 and never probe 90.
        let loc = locator();
        let probe = FixedProbe::at(&loc, "h2c", &[95, 94, 90]);

        let frames = scan_backward(&probe, &loc, "h2c", 95, 100, 3).await;

        assert_eq!(ordinals(&frames), vec![94, 95]);
        assert_eq!(probe.probe_count(), 5); // 95, 94, 93, 92, 91
    }

    #[tokio::test]
    async fn hit_resets_the_miss_counter() {
        // Misses at 94 and 93 do not accumulate past the hit at 92.
        let loc = locator();
        let probe = FixedProbe::at(&loc, "h2c", &[95, 92, 89]);

        let frames = scan_backward(&probe, &loc, "h2c", 95, 100, 3).await;

        assert_eq!(ordinals(&frames), vec![89, 92, 95]);
    }

    #[tokio::test]
    async fn result_is_ascending_and_capped_at_max_count() {
        let loc = locator();
        let probe = FixedProbe::at(&loc, "h2c", &[100, 99, 98, 97, 96]);

        let frames = scan_backward(&probe, &loc, "h2c", 100, 3, 5).await;

        assert_eq!(ordinals(&frames), vec![98, 99, 100]);
        assert_eq!(probe.probe_count(), 3);
    }

    #[tokio::test]
    async fn active_feed_probe_count_is_bounded() {
        // A contiguous run of frames then silence: the scan examines at most
        // max_count hits plus max_gap trailing misses.
        let loc = locator();
        let hits: Vec<u32> = (41..=60).collect();
        let probe = FixedProbe::at(&loc, "h2c", &hits);

        let frames = scan_backward(&probe, &loc, "h2c", 60, 10, 4).await;

        assert_eq!(frames.len(), 10);
        assert!(probe.probe_count() <= 10 + 4);
    }

    #[tokio::test]
    async fn scan_stops_at_ordinal_zero() {
        let loc = locator();
        let probe = FixedProbe::at(&loc, "h2c", &[2, 1, 0]);

        let frames = scan_backward(&probe, &loc, "h2c", 2, 100, 10).await;

        assert_eq!(ordinals(&frames), vec![0, 1, 2]);
        assert_eq!(probe.probe_count(), 3);
    }

    #[tokio::test]
    async fn empty_feed_yields_no_frames() {
        let loc = locator();
        let probe = FixedProbe::at(&loc, "h2c", &[]);

        let frames = scan_backward(&probe, &loc, "h2c", 700, 100, 5).await;

        assert!(frames.is_empty());
        assert_eq!(probe.probe_count(), 5);
    }
}
