//! Two-stage playlist recommendation.
//!
//! Stage 1 ranks the corpus against the playlist's mood vector (the
//! normalized mean of its tracks). Stage 2 lets each playlist track vote
//! for its own nearest neighbors and adds the most-voted tracks that
//! stage 1 missed.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use cadence_core::{magnitude, FeatureError, FeatureVector, TrackId, MIN_MAGNITUDE};
use serde::{Deserialize, Serialize};

use crate::ann::AnnIndex;
use crate::distance::{mean, normalize};
use crate::error::{SearchError, SearchResult};
use crate::lookup::IdLookup;

/// Per-request tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendOptions {
    /// Maximum number of results.
    pub top_n: usize,
    /// Slots reserved for diversity voting. Must not exceed `top_n`.
    pub diversity_k: usize,
    /// Neighbors each playlist track votes for.
    pub neighbors_per_track: usize,
    pub with_scores: bool,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            top_n: 10,
            diversity_k: 2,
            neighbors_per_track: 5,
            with_scores: false,
        }
    }
}

impl RecommendOptions {
    pub fn validate(&self) -> SearchResult<()> {
        if self.diversity_k > self.top_n {
            return Err(SearchError::InvalidParameter(format!(
                "diversity_k ({}) exceeds top_n ({})",
                self.diversity_k, self.top_n
            )));
        }
        Ok(())
    }
}

/// Which stage produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Mood,
    Diversity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub track_id: TrackId,
    /// Mood relevance in `[0, 100]`, two decimals. Diversity picks score
    /// `0.0`. `None` unless scores were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub stage: Stage,
}

/// Maps a cosine distance in `[0, 2]` to a relevance in `[0, 100]`.
#[must_use]
pub fn relevance(distance: f32) -> f64 {
    let raw = (1.0 - f64::from(distance) / 2.0).max(0.0) * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Stateless recommender over one index and its lookup.
#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    options: RecommendOptions,
}

impl RecommendationEngine {
    #[must_use]
    pub fn new(options: RecommendOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &RecommendOptions {
        &self.options
    }

    /// Recommend tracks for a playlist, best first.
    ///
    /// Returns at most `top_n` tracks, none of them from the playlist. An
    /// empty playlist yields an empty list.
    pub fn recommend(
        &self,
        playlist: &[FeatureVector],
        index: &dyn AnnIndex,
        lookup: &IdLookup,
    ) -> SearchResult<Vec<Recommendation>> {
        let opts = &self.options;
        opts.validate()?;
        if playlist.is_empty() {
            return Ok(Vec::new());
        }
        check_playlist(playlist, index.dimension())?;
        if opts.top_n == 0 {
            return Ok(Vec::new());
        }

        let members: HashSet<&TrackId> = playlist.iter().map(|v| &v.track_id).collect();
        let mut chosen: HashSet<TrackId> = HashSet::new();
        let mut results = Vec::with_capacity(opts.top_n);

        let mood_slots = opts.top_n - opts.diversity_k;
        if mood_slots > 0 {
            let mood = mean(playlist.iter().map(|v| v.values.as_slice()), index.dimension())
                .map(|m| normalize(&m))
                .ok_or_else(|| SearchError::InvalidParameter("empty playlist".to_string()))?;
            let k1 = (opts.top_n * 5).min(index.len());

            for neighbor in index.query(&mood, k1)? {
                if results.len() >= mood_slots {
                    break;
                }
                let track = lookup.resolve(neighbor.id)?;
                if members.contains(track) || chosen.contains(track) {
                    continue;
                }
                chosen.insert(track.clone());
                results.push(Recommendation {
                    track_id: track.clone(),
                    score: opts.with_scores.then(|| relevance(neighbor.distance)),
                    stage: Stage::Mood,
                });
            }
        }

        if opts.diversity_k > 0 && opts.neighbors_per_track > 0 {
            let k2 = opts.neighbors_per_track.min(index.len());
            let mut votes: HashMap<&TrackId, usize> = HashMap::new();
            for vector in playlist {
                if magnitude(&vector.values) < MIN_MAGNITUDE {
                    log::debug!("Skipping zero vector of {} in diversity vote", vector.track_id);
                    continue;
                }
                for neighbor in index.query(&normalize(&vector.values), k2)? {
                    let track = lookup.resolve(neighbor.id)?;
                    if !members.contains(track) {
                        *votes.entry(track).or_insert(0) += 1;
                    }
                }
            }

            let mut ranked: Vec<(&TrackId, usize)> = votes.into_iter().collect();
            ranked.sort_by(|a, b| Reverse(a.1).cmp(&Reverse(b.1)).then_with(|| a.0.cmp(b.0)));

            let mut added = 0;
            for (track, _) in ranked {
                if added >= opts.diversity_k {
                    break;
                }
                if chosen.contains(track) {
                    continue;
                }
                chosen.insert(track.clone());
                results.push(Recommendation {
                    track_id: track.clone(),
                    score: opts.with_scores.then_some(0.0),
                    stage: Stage::Diversity,
                });
                added += 1;
            }
        }

        log::debug!(
            "Recommended {} tracks for a playlist of {}",
            results.len(),
            playlist.len()
        );
        Ok(results)
    }
}

fn check_playlist(playlist: &[FeatureVector], dimension: usize) -> SearchResult<()> {
    for vector in playlist {
        if vector.values.len() != dimension {
            return Err(SearchError::DimensionMismatch {
                expected: dimension,
                found: vector.values.len(),
            });
        }
        if let Some(index) = vector.values.iter().position(|v| !v.is_finite()) {
            return Err(SearchError::InvalidVector(FeatureError::NonFinite {
                track_id: vector.track_id.to_string(),
                index,
            }));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ann::{FlatIndex, IndexParams};

    fn corpus() -> (FlatIndex, IdLookup) {
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.9, 0.1, 0.0],
            vec![0.8, 0.3, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ];
        let mut index = FlatIndex::with_capacity(3, 5, &IndexParams::default()).unwrap();
        index.add(&vectors, &[0, 1, 2, 3, 4]).unwrap();
        let lookup = IdLookup::new(["a", "b", "c", "d", "e"].map(TrackId::from).to_vec());
        (index, lookup)
    }

    fn opts(top_n: usize, diversity_k: usize, neighbors: usize) -> RecommendOptions {
        RecommendOptions {
            top_n,
            diversity_k,
            neighbors_per_track: neighbors,
            with_scores: true,
        }
    }

    #[test]
    fn test_relevance_formula() {
        assert_eq!(relevance(0.0), 100.0);
        assert_eq!(relevance(2.0), 0.0);
        assert_eq!(relevance(1.0), 50.0);
        assert_eq!(relevance(0.123_456), 93.83);
        assert_eq!(relevance(2.5), 0.0);
    }

    #[test]
    fn test_empty_playlist() {
        let (index, lookup) = corpus();
        let engine = RecommendationEngine::default();
        assert!(engine.recommend(&[], &index, &lookup).unwrap().is_empty());
    }

    #[test]
    fn test_diversity_larger_than_top_n_rejected() {
        let (index, lookup) = corpus();
        let engine = RecommendationEngine::new(opts(2, 3, 5));
        let playlist = [FeatureVector::new("a", vec![1.0, 0.0, 0.0])];
        assert!(matches!(
            engine.recommend(&playlist, &index, &lookup),
            Err(SearchError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_stage_one_then_stage_two() {
        let (index, lookup) = corpus();
        let engine = RecommendationEngine::new(opts(3, 1, 4));
        let playlist = [FeatureVector::new("a", vec![1.0, 0.0, 0.0])];
        let recs = engine.recommend(&playlist, &index, &lookup).unwrap();

        let ids: Vec<&str> = recs.iter().map(|r| r.track_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "d"]);
        assert_eq!(recs[0].stage, Stage::Mood);
        assert!(recs[0].score.unwrap() > recs[1].score.unwrap());
        // d and e are equidistant from a; the index breaks the tie by id.
        assert_eq!(recs[2].stage, Stage::Diversity);
        assert_eq!(recs[2].score, Some(0.0));
    }

    #[test]
    fn test_stage_two_adds_nothing_when_votes_already_taken() {
        let (index, lookup) = corpus();
        let engine = RecommendationEngine::new(opts(3, 1, 3));
        let playlist = [FeatureVector::new("a", vec![1.0, 0.0, 0.0])];
        let recs = engine.recommend(&playlist, &index, &lookup).unwrap();
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.stage == Stage::Mood));
    }

    #[test]
    fn test_no_playlist_members_returned() {
        let (index, lookup) = corpus();
        let engine = RecommendationEngine::new(opts(10, 2, 5));
        let playlist = [
            FeatureVector::new("a", vec![1.0, 0.0, 0.0]),
            FeatureVector::new("d", vec![0.0, 1.0, 0.0]),
        ];
        let recs = engine.recommend(&playlist, &index, &lookup).unwrap();
        assert!(recs.len() <= 3);
        assert!(recs
            .iter()
            .all(|r| r.track_id.as_str() != "a" && r.track_id.as_str() != "d"));
    }

    #[test]
    fn test_scores_absent_unless_requested() {
        let (index, lookup) = corpus();
        let engine = RecommendationEngine::new(RecommendOptions {
            top_n: 3,
            diversity_k: 1,
            ..RecommendOptions::default()
        });
        let playlist = [FeatureVector::new("a", vec![1.0, 0.0, 0.0])];
        let recs = engine.recommend(&playlist, &index, &lookup).unwrap();
        assert!(recs.iter().all(|r| r.score.is_none()));
    }

    #[test]
    fn test_playlist_dimension_checked_first() {
        let (index, lookup) = corpus();
        let engine = RecommendationEngine::default();
        let playlist = [FeatureVector::new("x", vec![1.0, 0.0])];
        let err = engine.recommend(&playlist, &index, &lookup).unwrap_err();
        assert!(err.is_schema_mismatch());
    }

    #[test]
    fn test_non_finite_playlist_vector_rejected() {
        let (index, lookup) = corpus();
        let engine = RecommendationEngine::default();
        let playlist = [FeatureVector::new("x", vec![f32::NAN, 0.0, 0.0])];
        assert!(matches!(
            engine.recommend(&playlist, &index, &lookup),
            Err(SearchError::InvalidVector(_))
        ));
    }

    #[test]
    fn test_all_diversity_slots() {
        let (index, lookup) = corpus();
        let engine = RecommendationEngine::new(opts(2, 2, 2));
        let playlist = [FeatureVector::new("a", vec![1.0, 0.0, 0.0])];
        let recs = engine.recommend(&playlist, &index, &lookup).unwrap();
        // a's two nearest are a (excluded) and b.
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].track_id.as_str(), "b");
        assert_eq!(recs[0].score, Some(0.0));
    }
}
