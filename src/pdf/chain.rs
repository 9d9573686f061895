//! Back-link chain reconstruction
//!
//! The walk starts at the xref section named by the last trustworthy
//! `%%EOF` and follows `/Prev` toward older saves. A hop to a *higher*
//! offset stays inside the current logical revision: that is how a
//! linearized file links its first-page section to the main section of the
//! same save. Sections that no walk reaches are kept as version 0.

use std::collections::{BTreeMap, HashMap, HashSet};

use lopdf::Dictionary;
use tracing::{debug, warn};

use crate::options::ScanOptions;
use crate::pdf::document::Revision;
use crate::pdf::scan::EofMarker;
use crate::pdf::xref::{parse_section_at, XrefSection};

/// Parsed sections by offset, each parsed at most once
struct SectionCache<'a> {
    data: &'a [u8],
    options: &'a ScanOptions,
    sections: HashMap<u64, std::result::Result<XrefSection, String>>,
}

impl<'a> SectionCache<'a> {
    fn new(data: &'a [u8], options: &'a ScanOptions) -> Self {
        Self {
            data,
            options,
            sections: HashMap::new(),
        }
    }

    fn load(&mut self, offset: u64) -> std::result::Result<&XrefSection, String> {
        let (data, options) = (self.data, self.options);
        self.sections
            .entry(offset)
            .or_insert_with(|| {
                parse_section_at(data, offset, options).map_err(|e| {
                    warn!(offset, "unreadable xref section: {}", e);
                    e.to_string()
                })
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

/// Result of walking `/Prev` links
#[derive(Default)]
struct Walk {
    /// Logical revisions, newest first; offsets in the order they were reached
    groups: Vec<Vec<u64>>,
    /// Groups taken out of the chain, with the reason
    demoted: Vec<(Vec<u64>, String)>,
    visited: HashSet<u64>,
}

impl Walk {
    /// The newest group reached so far carries the broken `/Prev`
    fn demote_last(&mut self, reason: String) {
        if let Some(group) = self.groups.pop() {
            self.demoted.push((group, reason));
        }
    }
}

/// Build every revision the markers lead to
///
/// Valid revisions come first in ascending version order, then the
/// diagnostic (version 0) ones ordered by where they end in the file.
pub(crate) fn reconstruct(data: &[u8], markers: &[EofMarker], options: &ScanOptions) -> Vec<Revision> {
    let file_len = data.len() as u64;
    let mut cache = SectionCache::new(data, options);
    let mut walk = walk_chain(&mut cache, markers, options);
    merge_linearized_fragments(&mut cache, markers, &mut walk);

    let mut revisions: Vec<Revision> = walk
        .groups
        .iter()
        .rev()
        .zip(1u32..)
        .map(|(group, version)| build_revision(&mut cache, group, version, markers, file_len))
        .collect();

    let mut diagnostics = Vec::new();
    for (group, reason) in &walk.demoted {
        let mut rev = build_revision(&mut cache, group, 0, markers, file_len);
        rev.diagnostic = Some(reason.clone());
        diagnostics.push(rev);
    }

    let mut seen = walk.visited.clone();
    for marker in markers {
        let Some(offset) = marker.startxref else {
            continue;
        };
        if !seen.insert(offset) {
            continue;
        }
        let reason = match cache.load(offset) {
            Ok(_) => {
                warn!(offset, "xref section is not reachable from the last '%%EOF'");
                None
            }
            Err(_) if offset == 0 => Some("placeholder 'startxref 0'".to_string()),
            Err(message) => Some(format!("unreadable xref section: {message}")),
        };
        let rev = match reason {
            None => {
                let mut rev = build_revision(&mut cache, &[offset], 0, markers, file_len);
                rev.diagnostic = Some("not reachable from the last '%%EOF'".to_string());
                rev
            }
            Some(reason) => Revision {
                start: offset,
                end: marker.end,
                version: 0,
                is_linear: false,
                is_stream: false,
                entries: Vec::new(),
                sections: vec![offset],
                creator: Vec::new(),
                diagnostic: Some(reason),
                trailer: Dictionary::new(),
            },
        };
        diagnostics.push(rev);
    }

    diagnostics.sort_by_key(|rev| rev.end);
    revisions.extend(diagnostics);
    revisions
}

fn walk_chain(cache: &mut SectionCache<'_>, markers: &[EofMarker], options: &ScanOptions) -> Walk {
    let mut walk = Walk::default();

    let head = markers
        .iter()
        .rev()
        .filter_map(|m| m.startxref)
        .find(|&offset| cache.load(offset).is_ok());
    let Some(head) = head else {
        warn!("no '%%EOF' marker leads to a readable xref section");
        return walk;
    };

    let mut current = Some(head);
    let mut previous: Option<u64> = None;
    while let Some(offset) = current {
        if walk.visited.len() >= options.max_chain_length {
            warn!(offset, limit = options.max_chain_length, "xref chain is longer than the limit, stopping");
            break;
        }
        if !walk.visited.insert(offset) {
            warn!(offset, "/Prev loops back to an xref section already visited");
            walk.demote_last(format!("/Prev {offset} loops back to a newer section"));
            break;
        }
        let prev = match cache.load(offset) {
            Ok(section) => section.prev(),
            Err(message) => {
                warn!(offset, "/Prev does not resolve to an xref section");
                walk.demote_last(format!("/Prev {offset} does not resolve: {message}"));
                break;
            }
        };

        let forward = previous.is_some_and(|p| offset > p);
        match walk.groups.last_mut() {
            Some(group) if forward => {
                debug!(offset, "forward /Prev hop, merging linearized section");
                group.push(offset);
            }
            _ => walk.groups.push(vec![offset]),
        }
        previous = Some(offset);
        current = match prev {
            Ok(prev) => prev,
            Err(message) => {
                warn!(offset, "{}", message);
                walk.demote_last(message);
                break;
            }
        };
    }
    walk
}

/// A first-page section whose own marker names it and whose `/Prev` points
/// forward into an already reached revision belongs to that revision
fn merge_linearized_fragments(cache: &mut SectionCache<'_>, markers: &[EofMarker], walk: &mut Walk) {
    for offset in markers.iter().filter_map(|m| m.startxref) {
        if walk.visited.contains(&offset) {
            continue;
        }
        let Ok(Ok(Some(prev))) = cache.load(offset).map(XrefSection::prev) else {
            continue;
        };
        if prev <= offset {
            continue;
        }
        if let Some(group) = walk.groups.iter_mut().find(|g| g.contains(&prev)) {
            debug!(offset, prev, "merging linearized first-page section");
            group.push(offset);
            walk.visited.insert(offset);
        }
    }
}

fn build_revision(
    cache: &mut SectionCache<'_>,
    group: &[u64],
    version: u32,
    markers: &[EofMarker],
    file_len: u64,
) -> Revision {
    let mut sections = group.to_vec();
    sections.sort_unstable();

    // ascending offset: the section later in the file wins a shared id
    let mut merged = BTreeMap::new();
    let mut is_stream = false;
    for &offset in &sections {
        if let Ok(section) = cache.load(offset) {
            is_stream |= section.uses_stream();
            for entry in &section.entries {
                merged.insert(entry.id, *entry);
            }
        }
    }

    // the section reached first supplies the trailer; others fill gaps
    let mut trailer = Dictionary::new();
    for &offset in group {
        if let Ok(section) = cache.load(offset) {
            for (key, value) in section.trailer.iter() {
                if !trailer.has(key) {
                    trailer.set(key.clone(), value.clone());
                }
            }
        }
    }

    let last = sections.last().copied().unwrap_or(0);
    Revision {
        start: group.first().copied().unwrap_or(0),
        end: end_after(markers, last, file_len),
        version,
        is_linear: group.len() > 1,
        is_stream,
        entries: merged.into_values().collect(),
        sections,
        creator: Vec::new(),
        diagnostic: None,
        trailer,
    }
}

/// End of the first `%%EOF` after `offset`, preferring trusted markers
fn end_after(markers: &[EofMarker], offset: u64, file_len: u64) -> u64 {
    let after = |trusted_only: bool| {
        markers
            .iter()
            .filter(|m| m.position > offset && (!trusted_only || m.is_trusted()))
            .map(|m| m.end)
            .min()
    };
    after(true).or_else(|| after(false)).unwrap_or(file_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::scan::find_eof_markers;
    use crate::pdf::test_support::TestPdf;

    fn revisions(data: &[u8]) -> Vec<Revision> {
        reconstruct(data, &find_eof_markers(data), &ScanOptions::default())
    }

    #[test]
    fn test_three_saves_in_order() {
        let mut pdf = TestPdf::new();
        pdf.object(1, "<< /Type /Catalog >>");
        pdf.save();
        pdf.object(2, "<< /A 1 >>");
        pdf.save();
        pdf.object(2, "<< /A 2 >>");
        pdf.save();
        let revs = revisions(&pdf.finish());

        let versions: Vec<u32> = revs.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert!(revs[0].start < revs[1].start && revs[1].start < revs[2].start);
        assert!(revs.iter().all(|r| r.diagnostic.is_none() && !r.is_linear));
        assert_eq!(revs[2].entries.len(), 1);
    }

    #[test]
    fn test_self_loop_is_demoted() {
        let mut pdf = TestPdf::new();
        pdf.object(1, "<< >>");
        let here = pdf.len();
        pdf.save_with_prev(Some(here), "");

        let revs = revisions(&pdf.finish());
        assert!(revs.iter().all(|r| r.version == 0));
        assert!(revs[0].diagnostic.as_deref().unwrap().contains("loops back"));
    }

    #[test]
    fn test_dangling_prev_demotes_carrier() {
        let mut pdf = TestPdf::new();
        pdf.object(1, "<< >>");
        pdf.save();
        pdf.object(2, "<< >>");
        pdf.save_with_prev(Some(3), "");
        pdf.object(3, "<< >>");
        pdf.save();

        let revs = revisions(&pdf.finish());
        let valid: Vec<&Revision> = revs.iter().filter(|r| r.is_valid()).collect();
        // only the newest save survives; the save carrying /Prev 3 is demoted
        assert_eq!(valid.len(), 1);
        assert!(valid[0].entry(3).is_some());
        assert!(revs.iter().any(|r| r.diagnostic.as_deref().is_some_and(|d| d.contains("does not resolve"))));
    }

    #[test]
    fn test_malformed_prev_demotes_carrier() {
        for bad in ["/Prev 5 0 R", "/Prev -3", "/Prev 12.0"] {
            let mut pdf = TestPdf::new();
            pdf.object(1, "<< /Type /Catalog >>");
            pdf.save();
            pdf.object(2, "<< >>");
            pdf.save_with_prev(None, bad);

            let revs = revisions(&pdf.finish());
            assert!(revs.iter().all(|r| !r.is_valid()), "{bad} left a valid version");
            let carrier = revs.iter().find(|r| r.entry(2).is_some()).unwrap();
            assert!(carrier.diagnostic.as_deref().unwrap().contains("is not a byte offset"), "{bad}");
        }
    }

    #[test]
    fn test_unreadable_startxref_is_diagnostic() {
        let mut pdf = TestPdf::new();
        pdf.object(1, "<< >>");
        pdf.save();
        let mut data = pdf.finish();
        data.extend_from_slice(b"\nstartxref\n5\n%%EOF\n");

        let revs = revisions(&data);
        assert_eq!(revs.len(), 2);
        assert_eq!(revs[0].version, 1);
        assert_eq!(revs[1].version, 0);
        assert!(revs[1].diagnostic.as_deref().unwrap().starts_with("unreadable"));
    }

    #[test]
    fn test_end_prefers_trusted_marker() {
        let markers = [
            EofMarker { position: 50, end: 55, startxref: None },
            EofMarker { position: 90, end: 95, startxref: Some(20) },
        ];
        assert_eq!(end_after(&markers, 20, 200), 95);
        assert_eq!(end_after(&markers, 100, 200), 200);
    }
}
