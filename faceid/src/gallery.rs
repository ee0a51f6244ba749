use std::collections::{HashMap, HashSet};

use crate::types::{FaceId, PersonId, Record};

/// Result of [`Gallery::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    DuplicateKey,
}

/// Result of [`Gallery::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Ordered in-memory collection of enrolled faces.
///
/// Insertion order is preserved; it decides save order and breaks ranking
/// ties. Every record carries a sequence number so that the records added
/// since the last save can be found even after deletions.
///
/// Not synchronized; [`crate::Recognizer`] wraps it in a lock.
#[derive(Debug, Default)]
pub struct Gallery {
    records: Vec<Record>,
    seqs: Vec<u64>,
    keys: HashSet<(PersonId, FaceId)>,
    next_seq: u64,
    saved_seq: u64,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a gallery from loaded records. All of them count as saved.
    ///
    /// A key repeated in the file was deleted and enrolled again between
    /// incremental saves, so the last occurrence wins and keeps its
    /// position. Earlier occurrences are returned separately.
    pub fn from_saved(records: Vec<Record>) -> (Self, Vec<Record>) {
        let mut last: HashMap<(&str, &str), usize> = HashMap::new();
        for (i, r) in records.iter().enumerate() {
            last.insert((r.person_id.as_str(), r.face_id.as_str()), i);
        }
        let keep: Vec<bool> = records
            .iter()
            .enumerate()
            .map(|(i, r)| last.get(&(r.person_id.as_str(), r.face_id.as_str())) == Some(&i))
            .collect();

        let mut gallery = Self::new();
        let mut skipped = Vec::new();
        for (record, keep) in records.into_iter().zip(keep) {
            if keep {
                gallery.add(record);
            } else {
                skipped.push(record);
            }
        }
        gallery.saved_seq = gallery.next_seq;
        (gallery, skipped)
    }

    /// Appends a record unless its `(person_id, face_id)` key is taken.
    pub fn add(&mut self, record: Record) -> AddOutcome {
        let key = (record.person_id.clone(), record.face_id.clone());
        if self.keys.contains(&key) {
            return AddOutcome::DuplicateKey;
        }
        self.keys.insert(key);
        self.next_seq += 1;
        self.seqs.push(self.next_seq);
        self.records.push(record);
        AddOutcome::Inserted
    }

    /// Removes the record with the exact key. Memory only.
    pub fn delete(&mut self, person_id: &str, face_id: &str) -> DeleteOutcome {
        let Some(pos) = self.position(person_id, face_id) else {
            return DeleteOutcome::NotFound;
        };
        let record = self.records.remove(pos);
        self.seqs.remove(pos);
        self.keys.remove(&(record.person_id, record.face_id));
        DeleteOutcome::Deleted
    }

    pub fn get(&self, person_id: &str, face_id: &str) -> Option<&Record> {
        self.position(person_id, face_id).map(|i| &self.records[i])
    }

    pub fn contains(&self, person_id: &str, face_id: &str) -> bool {
        self.get(person_id, face_id).is_some()
    }

    /// Returns all records in insertion order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the records added since the last successful save, in
    /// insertion order.
    pub fn pending(&self) -> Vec<Record> {
        self.records
            .iter()
            .zip(&self.seqs)
            .filter(|(_, seq)| **seq > self.saved_seq)
            .map(|(r, _)| r.clone())
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.seqs.iter().filter(|seq| **seq > self.saved_seq).count()
    }

    /// Returns the watermark to pass to [`Gallery::mark_saved`] once the
    /// current contents are on disk.
    pub fn watermark(&self) -> u64 {
        self.next_seq
    }

    /// Marks every record up to `watermark` as persisted.
    pub fn mark_saved(&mut self, watermark: u64) {
        self.saved_seq = self.saved_seq.max(watermark);
    }

    /// Returns distinct person ids in first-enrolment order.
    pub fn persons(&self) -> Vec<&PersonId> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.person_id.as_str()))
            .map(|r| &r.person_id)
            .collect()
    }

    /// Returns the faces enrolled for one person, in insertion order.
    pub fn faces_of(&self, person_id: &str) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|r| r.person_id.as_str() == person_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn position(&self, person_id: &str, face_id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.has_key(person_id, face_id))
    }
}
