//! Result ranking shared by every store and by the query engine.
//!
//! # Ordering
//!
//! 1. Score, descending.
//! 2. Id, ascending (ties).
//! 3. Truncate to `top_k`.
//!
//! NaN scores sort last so a single bad vector cannot displace real hits.

use std::cmp::Ordering;

use crate::models::QueryHit;

/// Sort hits into result order and keep at most `top_k`.
pub fn rank_hits(mut hits: Vec<QueryHit>, top_k: usize) -> Vec<QueryHit> {
    hits.sort_by(compare_hits);
    hits.truncate(top_k);
    hits
}

fn compare_hits(a: &QueryHit, b: &QueryHit) -> Ordering {
    match (a.score.is_nan(), b.score.is_nan()) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

/// True when scores never increase from one rank to the next.
pub fn is_ranked(hits: &[QueryHit]) -> bool {
    hits.windows(2).all(|w| !(w[1].score > w[0].score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;

    fn hit(id: &str, score: f32) -> QueryHit {
        QueryHit {
            id: id.to_string(),
            score,
            metadata: Record::new(),
        }
    }

    #[test]
    fn test_descending_scores() {
        let ranked = rank_hits(vec![hit("a", 0.1), hit("b", 0.9), hit("c", 0.5)], 10);
        let ids: Vec<&str> = ranked.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!(is_ranked(&ranked));
    }

    #[test]
    fn test_ties_break_on_id() {
        let ranked = rank_hits(vec![hit("z", 0.5), hit("m", 0.5), hit("a", 0.5)], 10);
        let ids: Vec<&str> = ranked.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "m", "z"]);
    }

    #[test]
    fn test_truncates_without_padding() {
        let hits = vec![hit("a", 0.3), hit("b", 0.2), hit("c", 0.1)];
        assert_eq!(rank_hits(hits.clone(), 2).len(), 2);
        assert_eq!(rank_hits(hits, 10).len(), 3);
        assert!(rank_hits(Vec::new(), 5).is_empty());
    }

    #[test]
    fn test_nan_sorts_last() {
        let ranked = rank_hits(vec![hit("nan", f32::NAN), hit("b", -0.5)], 10);
        assert_eq!(ranked[0].id, "b");
        assert_eq!(ranked[1].id, "nan");
    }
}
