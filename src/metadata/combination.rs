//! Non-empty subsets of an entity's relationship edges, one query route pair per subset.

use crate::config::RelationshipEdge;

/// One subset of relationships with its synthesized names.
#[derive(Clone, Debug, PartialEq)]
pub struct Combination {
    pub edges: Vec<RelationshipEdge>,
    /// Target names joined by `And`, e.g. `VideoStudyAndSentence`.
    pub name: String,
    /// Target snake names joined by `_and_`, e.g. `video_study_and_sentence`.
    pub snake_name: String,
}

impl Combination {
    fn from_indices(edges: &[RelationshipEdge], indices: &[usize]) -> Self {
        let picked: Vec<RelationshipEdge> = indices.iter().map(|&i| edges[i].clone()).collect();
        let name = picked.iter().map(|e| e.target.as_str()).collect::<Vec<_>>().join("And");
        let snake_name = picked.iter().map(|e| e.target_snake()).collect::<Vec<_>>().join("_and_");
        Combination {
            edges: picked,
            name,
            snake_name,
        }
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.edges.iter().map(|e| e.target.as_str())
    }
}

/// Every non-empty subset of `edges`: by increasing size, then lexicographic by position.
/// Each subset keeps the input order. Returns `2^n - 1` entries.
pub fn combinations(edges: &[RelationshipEdge]) -> Vec<Combination> {
    let n = edges.len();
    let mut out = Vec::with_capacity((1usize << n).saturating_sub(1));
    for k in 1..=n {
        let mut idx: Vec<usize> = (0..k).collect();
        loop {
            out.push(Combination::from_indices(edges, &idx));
            // Rightmost position that can still advance.
            let Some(i) = (0..k).rev().find(|&i| idx[i] != i + n - k) else {
                break;
            };
            idx[i] += 1;
            for j in i + 1..k {
                idx[j] = idx[j - 1] + 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelationshipSide;
    use std::collections::HashSet;

    fn edges(names: &[&str]) -> Vec<RelationshipEdge> {
        names
            .iter()
            .map(|n| RelationshipEdge {
                target: n.to_string(),
                side: RelationshipSide::Many,
                link_table: None,
            })
            .collect()
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(combinations(&[]).is_empty());
    }

    #[test]
    fn size_then_lexicographic_order() {
        let names: Vec<String> = combinations(&edges(&["A", "B", "C"])).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["A", "B", "C", "AAndB", "AAndC", "BAndC", "AAndBAndC"]);
    }

    #[test]
    fn count_is_two_to_the_n_minus_one_without_duplicates() {
        for n in 0..=6 {
            let names: Vec<String> = (0..n).map(|i| format!("E{}", i)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let combos = combinations(&edges(&refs));
            assert_eq!(combos.len(), (1 << n) - 1);
            let distinct: HashSet<Vec<&str>> = combos.iter().map(|c| c.targets().collect()).collect();
            assert_eq!(distinct.len(), combos.len());
        }
    }

    #[test]
    fn snake_name_joins_with_and() {
        let combos = combinations(&edges(&["VideoStudy", "Sentence", "VideoRecord"]));
        let last = combos.last().unwrap();
        assert_eq!(last.name, "VideoStudyAndSentenceAndVideoRecord");
        assert_eq!(last.snake_name, "video_study_and_sentence_and_video_record");
    }
}
