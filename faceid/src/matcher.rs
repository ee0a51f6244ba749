//! Brute-force 1:N matching with face- and person-level ranking.
//!
//! Every query scores every record, so cost grows linearly with the number
//! of enrolled faces. There is no index.

use std::collections::HashMap;

use crate::error::{FaceIdError, Result};
use crate::types::{FaceId, PersonId, Record, SearchResult, SearchType};

struct Candidate<'a> {
    person_id: &'a PersonId,
    face_id: &'a FaceId,
    score: f32,
}

struct PersonGroup<'a> {
    person_id: &'a PersonId,
    best_face: &'a FaceId,
    best: f32,
    sum: f64,
    count: usize,
}

// NaN ranks below every real score.
fn rank_key(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}

/// Scores `query` against every record and returns at most `top_k`
/// results ranked by descending score.
///
/// Ties keep gallery insertion order (for person-level searches, the order
/// in which each person was first enrolled), so repeated searches against an
/// unchanged gallery return identical rankings.
///
/// - [`SearchType::FaceLevel`]: one result per record.
/// - [`SearchType::PersonLevelMax`]: one result per person with the best
///   face score; `face_id` is the first face reaching it.
/// - [`SearchType::PersonLevelAvg`]: one result per person with the mean of
///   all their face scores; `face_id` is the person's best-scoring face.
///
/// An empty gallery yields no results. `top_k == 0` is rejected.
pub fn search<F>(
    query: &[f32],
    records: &[Record],
    search_type: SearchType,
    top_k: usize,
    similarity: F,
) -> Result<Vec<SearchResult>>
where
    F: Fn(&[f32], &[f32]) -> f32,
{
    if top_k == 0 {
        return Err(FaceIdError::InvalidInput("top_k must be positive".into()));
    }
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let scored = records
        .iter()
        .map(|r| (r, similarity(query, r.feature.as_slice())));

    let mut candidates: Vec<Candidate<'_>> = match search_type {
        SearchType::FaceLevel => scored
            .map(|(r, score)| Candidate {
                person_id: &r.person_id,
                face_id: &r.face_id,
                score,
            })
            .collect(),
        SearchType::PersonLevelMax => group_by_person(scored)
            .into_iter()
            .map(|g| Candidate {
                person_id: g.person_id,
                face_id: g.best_face,
                score: g.best,
            })
            .collect(),
        SearchType::PersonLevelAvg => group_by_person(scored)
            .into_iter()
            .map(|g| Candidate {
                person_id: g.person_id,
                face_id: g.best_face,
                score: (g.sum / g.count as f64) as f32,
            })
            .collect(),
    };

    // sort_by is stable: equal scores stay in insertion order.
    candidates.sort_by(|a, b| rank_key(b.score).total_cmp(&rank_key(a.score)));
    candidates.truncate(top_k);

    Ok(candidates
        .into_iter()
        .map(|c| SearchResult {
            person_id: c.person_id.clone(),
            face_id: c.face_id.clone(),
            score: c.score,
        })
        .collect())
}

fn group_by_person<'a>(
    scored: impl Iterator<Item = (&'a Record, f32)>,
) -> Vec<PersonGroup<'a>> {
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut groups: Vec<PersonGroup<'a>> = Vec::new();

    for (r, score) in scored {
        match index.get(r.person_id.as_str()) {
            Some(&i) => {
                let g = &mut groups[i];
                if rank_key(score) > rank_key(g.best) {
                    g.best = score;
                    g.best_face = &r.face_id;
                }
                g.sum += score as f64;
                g.count += 1;
            }
            None => {
                index.insert(r.person_id.as_str(), groups.len());
                groups.push(PersonGroup {
                    person_id: &r.person_id,
                    best_face: &r.face_id,
                    best: score,
                    sum: score as f64,
                    count: 1,
                });
            }
        }
    }
    groups
}
