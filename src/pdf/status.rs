//! Per-object change classification across revisions
//!
//! Each entry in a revision is compared with the nearest earlier revision
//! that mentions the same object id. The oldest revision has nothing to
//! compare against, so everything in it is unchanged.

use std::collections::HashMap;
use std::fmt;

use crate::pdf::document::Document;
use crate::pdf::xref::Entry;

/// How an object changed at one revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl Status {
    /// Letter printed in summaries: `A`, `M`, `D`, or `-` when unchanged
    pub fn letter(&self) -> char {
        match self {
            Status::Unchanged => '-',
            Status::Added => 'A',
            Status::Modified => 'M',
            Status::Deleted => 'D',
        }
    }

    pub fn is_change(&self) -> bool {
        *self != Status::Unchanged
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Unchanged => "unchanged",
            Status::Added => "added",
            Status::Modified => "modified",
            Status::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// What earlier revisions recorded for one object id
#[derive(Debug, Clone, Copy, Default)]
pub struct Prior<'a> {
    /// Most recent earlier mention, free or not
    pub latest: Option<&'a Entry>,
    /// Most recent earlier mention that was in use
    pub in_use: Option<&'a Entry>,
}

/// Classify `entry` against its history
///
/// `prior` is `None` for the oldest revision.
pub fn classify(entry: &Entry, prior: Option<&Prior<'_>>) -> Status {
    let Some(prior) = prior else {
        return Status::Unchanged;
    };

    if entry.is_free() {
        return match prior.latest {
            Some(latest) if latest.is_in_use() => Status::Deleted,
            _ => Status::Unchanged,
        };
    }

    match (prior.latest, prior.in_use) {
        (None, _) | (Some(_), None) => Status::Added,
        // id reused after being freed
        (Some(latest), Some(_)) if latest.is_free() => Status::Modified,
        (Some(_), Some(in_use)) if in_use.same_location(entry) => Status::Unchanged,
        _ => Status::Modified,
    }
}

/// One classified entry of one revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectChange {
    pub entry: Entry,
    pub status: Status,
    /// Nearest earlier in-use entry for the same id
    pub previous: Option<Entry>,
}

/// All classified entries of one revision, in object id order
#[derive(Debug, Clone)]
pub struct RevisionChanges {
    pub version: u32,
    pub changes: Vec<ObjectChange>,
}

impl RevisionChanges {
    pub fn count(&self, status: Status) -> usize {
        self.changes.iter().filter(|c| c.status == status).count()
    }

    pub fn get(&self, id: u32) -> Option<&ObjectChange> {
        self.changes.iter().find(|c| c.entry.id == id)
    }
}

/// Earlier mentions of `id`, searching backward from just before `version`
pub fn prior_occurrences(doc: &Document, version: u32, id: u32) -> Prior<'_> {
    let mut prior = Prior::default();
    for rev in doc.versions().rev().filter(|r| r.version < version) {
        if let Some(entry) = rev.entry(id) {
            prior.latest.get_or_insert(entry);
            if entry.is_in_use() {
                prior.in_use = Some(entry);
                break;
            }
        }
    }
    prior
}

/// Status of object `id` at `version`, if that revision lists it
///
/// Never computed for object 0.
pub fn object_status(doc: &Document, version: u32, id: u32) -> Option<Status> {
    if id == 0 {
        return None;
    }
    let rev = doc.revision(version)?;
    let entry = rev.entry(id)?;
    if version == 1 {
        return Some(classify(entry, None));
    }
    let prior = prior_occurrences(doc, version, id);
    Some(classify(entry, Some(&prior)))
}

/// Classify every entry of every valid revision in one forward pass
pub fn classify_document(doc: &Document) -> Vec<RevisionChanges> {
    let mut latest: HashMap<u32, Entry> = HashMap::new();
    let mut in_use: HashMap<u32, Entry> = HashMap::new();
    let mut result = Vec::new();

    for rev in doc.versions() {
        let mut changes = Vec::with_capacity(rev.entries.len());
        for entry in rev.entries.iter().filter(|e| e.id != 0) {
            let previous = in_use.get(&entry.id).copied();
            let status = if rev.version == 1 {
                classify(entry, None)
            } else {
                let prior = Prior {
                    latest: latest.get(&entry.id),
                    in_use: previous.as_ref(),
                };
                classify(entry, Some(&prior))
            };
            changes.push(ObjectChange {
                entry: *entry,
                status,
                previous,
            });
        }
        for change in &changes {
            latest.insert(change.entry.id, change.entry);
            if change.entry.is_in_use() {
                in_use.insert(change.entry.id, change.entry);
            }
        }
        result.push(RevisionChanges {
            version: rev.version,
            changes,
        });
    }
    result
}
