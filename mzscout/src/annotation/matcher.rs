use super::oracle::{
    QuerySpectrum,
    SimilarityOracle,
    SimilarityScore,
};
use crate::errors::{
    MzScoutError,
    Result,
};
use crate::models::{
    FeatureRecord,
    LibraryEntry,
    Match,
    RunStats,
};
use crate::storage::Repository;
use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{
    debug,
    info,
    warn,
};

/// Parameters of one annotation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationSettings {
    /// Fragment-matching tolerance handed to the oracle, in m/z.
    pub fragment_tol: f64,
    /// Minimum similarity score for acceptance, in [0, 1].
    pub score_cutoff: f64,
    /// Minimum number of aligned fragment peaks for acceptance.
    pub min_nr_matched_peaks: usize,
    /// Maximum |query mz - library precursor mz| for acceptance, in m/z.
    pub max_precursor_mass_diff: f64,
    /// Wall-clock budget for the oracle call, in seconds. 0 = unbounded.
    pub maximum_runtime: u64,
    /// Provenance string stamped on every match: the library file path.
    #[serde(default)]
    pub library: String,
}

impl Default for AnnotationSettings {
    fn default() -> Self {
        Self {
            fragment_tol: 0.1,
            score_cutoff: 0.7,
            min_nr_matched_peaks: 8,
            max_precursor_mass_diff: 600.0,
            maximum_runtime: 0,
            library: String::new(),
        }
    }
}

/// Attaches zero or more library [`Match`]es to every active feature
/// that carries a spectrum.
///
/// The oracle call is bounded by `maximum_runtime`; on exceeding it the
/// whole annotation step is abandoned and the feature store is returned
/// unchanged. Partial results are never applied.
pub struct AnnotationMatcher {
    settings: AnnotationSettings,
}

impl AnnotationMatcher {
    pub fn new(settings: AnnotationSettings) -> Result<Self> {
        if !(0.0..=1.0).contains(&settings.score_cutoff) {
            return Err(MzScoutError::ParseError {
                msg: format!(
                    "score_cutoff must be within [0, 1], got {}",
                    settings.score_cutoff
                ),
            });
        }
        if settings.min_nr_matched_peaks == 0 {
            return Err(MzScoutError::ParseError {
                msg: "min_nr_matched_peaks must be a positive integer".to_string(),
            });
        }
        if !settings.fragment_tol.is_finite() || settings.fragment_tol <= 0.0 {
            return Err(MzScoutError::ParseError {
                msg: format!(
                    "fragment_tol must be finite and > 0, got {}",
                    settings.fragment_tol
                ),
            });
        }
        if !settings.max_precursor_mass_diff.is_finite()
            || settings.max_precursor_mass_diff < 0.0
        {
            return Err(MzScoutError::ParseError {
                msg: format!(
                    "max_precursor_mass_diff must be finite and >= 0, got {}",
                    settings.max_precursor_mass_diff
                ),
            });
        }
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &AnnotationSettings {
        &self.settings
    }

    /// Run one annotation pass over the active features.
    ///
    /// Returns the feature store unchanged except for annotation-list
    /// mutations; no feature is created or removed. A timeout of the
    /// oracle call is recoverable: the store comes back untouched and a
    /// single warning is logged.
    pub fn annotate<O>(
        &self,
        oracle: Arc<O>,
        stats: &RunStats,
        mut features: Repository<u32, FeatureRecord>,
    ) -> Result<Repository<u32, FeatureRecord>>
    where
        O: SimilarityOracle + Send + Sync + 'static,
    {
        let mut queries: Vec<QuerySpectrum> = Vec::new();
        for f_id in &stats.active_features {
            let feature = features.get(f_id)?;
            match feature.spectrum {
                Some(spectrum) => queries.push(QuerySpectrum {
                    f_id: *f_id,
                    spectrum,
                }),
                None => {
                    debug!("feature {} has no spectrum, not annotated", f_id);
                }
            }
        }
        if queries.is_empty() || stats.spectral_library.is_empty() {
            info!(
                "nothing to annotate: {} query spectra, {} library entries",
                queries.len(),
                stats.spectral_library.len(),
            );
            return Ok(features);
        }

        let algorithm = oracle.algorithm().to_string();
        let score_lists =
            match self.run_oracle(oracle, &queries, &stats.spectral_library) {
                Some(lists) => lists,
                // Budget exceeded; the warning is already out.
                None => return Ok(features),
            };
        assert_eq!(
            score_lists.len(),
            queries.len(),
            "similarity oracle returned {} score lists for {} queries",
            score_lists.len(),
            queries.len(),
        );

        let library = &stats.spectral_library;
        let per_query: Vec<(u32, Vec<Match>)> = queries
            .par_iter()
            .zip(score_lists.par_iter())
            .map(|(query, entry_scores)| {
                let matches = self.select_matches(query, entry_scores, library, &algorithm);
                (query.f_id, matches)
            })
            .collect();

        // Checkin touches each query's own key exactly once.
        let mut attached = 0;
        let mut annotated_features = 0;
        for (f_id, matches) in per_query {
            if matches.is_empty() {
                continue;
            }
            let mut feature = features.get(&f_id)?;
            let mut newly_attached = 0;
            for m in matches {
                if feature.has_annotation(&m) {
                    debug!(
                        "feature {} already carries {} from {}, not duplicated",
                        f_id, m.compound_id, m.library
                    );
                    continue;
                }
                feature.push_annotation(m);
                newly_attached += 1;
            }
            if newly_attached > 0 {
                features.modify(f_id, feature)?;
                attached += newly_attached;
                annotated_features += 1;
            }
        }

        info!(
            "annotation attached {} matches across {} features",
            attached, annotated_features
        );
        Ok(features)
    }

    /// One blocking oracle call under the wall-clock ceiling. `None`
    /// means the budget was exceeded and the run must continue without
    /// annotations.
    fn run_oracle<O>(
        &self,
        oracle: Arc<O>,
        queries: &[QuerySpectrum],
        library: &[LibraryEntry],
    ) -> Option<Vec<Vec<SimilarityScore>>>
    where
        O: SimilarityOracle + Send + Sync + 'static,
    {
        let fragment_tol = self.settings.fragment_tol;
        if self.settings.maximum_runtime == 0 {
            return Some(oracle.score_batch(queries, library, fragment_tol));
        }

        let budget = Duration::from_secs(self.settings.maximum_runtime);
        let (tx, rx) = mpsc::channel();
        let queries = queries.to_vec();
        let library = library.to_vec();
        std::thread::spawn(move || {
            let scores = oracle.score_batch(&queries, &library, fragment_tol);
            // The receiver is gone when the budget ran out; nothing to do.
            let _ = tx.send(scores);
        });

        match rx.recv_timeout(budget) {
            Ok(scores) => Some(scores),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "similarity scoring exceeded the maximum runtime of {}s; \
                     skipping annotation for this run. Raise maximum_runtime \
                     (0 disables the limit) or shrink the spectral library \
                     to get annotations.",
                    self.settings.maximum_runtime
                );
                None
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                panic!("similarity oracle terminated without producing scores");
            }
        }
    }

    /// Sort one query's candidates by descending score (stable: equal
    /// scores keep library input order), then keep every candidate that
    /// passes all three acceptance criteria. The full list is evaluated;
    /// a failing candidate never ends the scan.
    fn select_matches(
        &self,
        query: &QuerySpectrum,
        entry_scores: &[SimilarityScore],
        library: &[LibraryEntry],
        algorithm: &str,
    ) -> Vec<Match> {
        assert_eq!(
            entry_scores.len(),
            library.len(),
            "similarity oracle returned {} scores for {} library entries",
            entry_scores.len(),
            library.len(),
        );
        let mut candidates: Vec<(usize, SimilarityScore)> =
            entry_scores.iter().copied().enumerate().collect();
        candidates.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));

        let mut accepted = Vec::new();
        for (entry_idx, similarity) in candidates {
            let entry = &library[entry_idx];
            let mz_diff = (query.spectrum.precursor_mz - entry.spectrum.precursor_mz).abs();
            let passes = similarity.score >= self.settings.score_cutoff
                && similarity.matched_peaks >= self.settings.min_nr_matched_peaks
                && mz_diff <= self.settings.max_precursor_mass_diff;
            if passes {
                accepted.push(Match::new(
                    entry.id.clone(),
                    entry.name.clone(),
                    self.settings.library.clone(),
                    algorithm,
                    similarity.score,
                    query.spectrum.precursor_mz,
                    mz_diff,
                ));
            }
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        FeatureBuilder,
        Spectrum,
    };
    use std::collections::BTreeSet;
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    fn spectrum(precursor_mz: f64) -> Spectrum {
        Spectrum::new(vec![50.0, 60.0], vec![1.0, 0.4], precursor_mz)
    }

    fn feature_with_spectrum(f_id: u32, precursor_mz: f64) -> FeatureRecord {
        let mut feature = FeatureBuilder::default()
            .f_id(f_id)
            .unwrap()
            .mz(precursor_mz)
            .unwrap()
            .rt(5.0)
            .unwrap()
            .rt_start(4.9)
            .unwrap()
            .rt_stop(5.1)
            .unwrap()
            .rt_range()
            .unwrap()
            .intensity(100.0)
            .unwrap()
            .rel_intensity(100.0)
            .unwrap()
            .area(10.0)
            .unwrap()
            .rel_area(10.0)
            .unwrap()
            .samples(BTreeSet::from(["s1".to_string()]))
            .get_result()
            .unwrap();
        feature.spectrum = Some(spectrum(precursor_mz));
        feature
    }

    fn library_entry(id: &str, name: &str, precursor_mz: f64) -> LibraryEntry {
        LibraryEntry {
            id: id.to_string(),
            name: name.to_string(),
            exact_mass: precursor_mz - 1.0073,
            spectrum: spectrum(precursor_mz),
        }
    }

    fn stats_with_library(
        active: impl IntoIterator<Item = u32>,
        library: Vec<LibraryEntry>,
    ) -> RunStats {
        RunStats {
            active_features: active.into_iter().collect(),
            spectral_library: library,
            ..RunStats::default()
        }
    }

    fn settings(score_cutoff: f64, min_peaks: usize, max_diff: f64) -> AnnotationSettings {
        AnnotationSettings {
            fragment_tol: 0.1,
            score_cutoff,
            min_nr_matched_peaks: min_peaks,
            max_precursor_mass_diff: max_diff,
            maximum_runtime: 0,
            library: "lib.mgf".to_string(),
        }
    }

    /// Scores every query against every library entry with a fixed list.
    struct FixedOracle {
        scores: Vec<Vec<SimilarityScore>>,
    }

    impl SimilarityOracle for FixedOracle {
        fn algorithm(&self) -> &str {
            "modified cosine"
        }

        fn score_batch(
            &self,
            _queries: &[QuerySpectrum],
            _library: &[LibraryEntry],
            _fragment_tol: f64,
        ) -> Vec<Vec<SimilarityScore>> {
            self.scores.clone()
        }
    }

    struct SlowOracle;

    impl SimilarityOracle for SlowOracle {
        fn algorithm(&self) -> &str {
            "modified cosine"
        }

        fn score_batch(
            &self,
            _queries: &[QuerySpectrum],
            library: &[LibraryEntry],
            _fragment_tol: f64,
        ) -> Vec<Vec<SimilarityScore>> {
            std::thread::sleep(Duration::from_secs(3));
            vec![vec![
                SimilarityScore {
                    score: 1.0,
                    matched_peaks: 100,
                };
                library.len()
            ]]
        }
    }

    fn one_feature_repo(precursor_mz: f64) -> Repository<u32, FeatureRecord> {
        let mut repo = Repository::new();
        repo.add(1, feature_with_spectrum(1, precursor_mz)).unwrap();
        repo
    }

    #[test]
    fn test_precursor_mass_gate() {
        let library = vec![library_entry("lib0", "quercetin", 100.0005)];
        let stats = stats_with_library([1], library);
        let oracle = Arc::new(FixedOracle {
            scores: vec![vec![SimilarityScore {
                score: 0.9,
                matched_peaks: 10,
            }]],
        });

        // Window of 0.01 keeps the candidate.
        let matcher = AnnotationMatcher::new(settings(0.7, 5, 0.01)).unwrap();
        let repo = matcher
            .annotate(oracle.clone(), &stats, one_feature_repo(100.0))
            .unwrap();
        let feature = repo.get(&1).unwrap();
        let annotations = feature.annotations.unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].compound_id, "lib0");
        assert_eq!(annotations[0].score, 0.9);
        assert_eq!(annotations[0].mz_diff, 0.0005);
        assert_eq!(annotations[0].algorithm, "modified cosine");
        assert_eq!(annotations[0].library, "lib.mgf");

        // Window of 0.0001 drops it.
        let matcher = AnnotationMatcher::new(settings(0.7, 5, 0.0001)).unwrap();
        let repo = matcher
            .annotate(oracle, &stats, one_feature_repo(100.0))
            .unwrap();
        assert!(repo.get(&1).unwrap().annotations.is_none());
    }

    #[test]
    fn test_score_cutoff_gate() {
        let library = vec![library_entry("lib0", "quercetin", 100.0)];
        let stats = stats_with_library([1], library);
        let oracle = Arc::new(FixedOracle {
            scores: vec![vec![SimilarityScore {
                score: 0.65,
                matched_peaks: 10_000,
            }]],
        });
        let matcher = AnnotationMatcher::new(settings(0.7, 1, 10.0)).unwrap();
        let repo = matcher
            .annotate(oracle, &stats, one_feature_repo(100.0))
            .unwrap();
        assert!(repo.get(&1).unwrap().annotations.is_none());
    }

    #[test]
    fn test_matched_peak_gate_does_not_end_the_scan() {
        // First candidate by score fails the peak gate; the second,
        // lower-scoring one still gets in.
        let library = vec![
            library_entry("lib0", "first", 100.0),
            library_entry("lib1", "second", 100.0),
        ];
        let stats = stats_with_library([1], library);
        let oracle = Arc::new(FixedOracle {
            scores: vec![vec![
                SimilarityScore {
                    score: 0.95,
                    matched_peaks: 2,
                },
                SimilarityScore {
                    score: 0.8,
                    matched_peaks: 12,
                },
            ]],
        });
        let matcher = AnnotationMatcher::new(settings(0.7, 5, 10.0)).unwrap();
        let repo = matcher
            .annotate(oracle, &stats, one_feature_repo(100.0))
            .unwrap();
        let annotations = repo.get(&1).unwrap().annotations.unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].compound_id, "lib1");
    }

    #[test]
    fn test_ties_keep_library_order_and_matches_are_score_sorted() {
        let library = vec![
            library_entry("lib0", "a", 100.0),
            library_entry("lib1", "b", 100.0),
            library_entry("lib2", "c", 100.0),
        ];
        let stats = stats_with_library([1], library);
        let oracle = Arc::new(FixedOracle {
            scores: vec![vec![
                SimilarityScore {
                    score: 0.8,
                    matched_peaks: 10,
                },
                SimilarityScore {
                    score: 0.9,
                    matched_peaks: 10,
                },
                SimilarityScore {
                    score: 0.8,
                    matched_peaks: 10,
                },
            ]],
        });
        let matcher = AnnotationMatcher::new(settings(0.7, 5, 10.0)).unwrap();
        let repo = matcher
            .annotate(oracle, &stats, one_feature_repo(100.0))
            .unwrap();
        let annotations = repo.get(&1).unwrap().annotations.unwrap();
        let ids: Vec<&str> = annotations.iter().map(|m| m.compound_id.as_str()).collect();
        // lib1 wins on score; lib0 and lib2 tie and keep input order.
        assert_eq!(ids, vec!["lib1", "lib0", "lib2"]);
    }

    #[test]
    fn test_feature_without_spectrum_is_skipped() {
        let library = vec![library_entry("lib0", "a", 100.0)];
        let stats = stats_with_library([1, 2], library);
        let mut repo = one_feature_repo(100.0);
        let mut bare = feature_with_spectrum(2, 100.0);
        bare.spectrum = None;
        repo.add(2, bare).unwrap();

        let oracle = Arc::new(FixedOracle {
            scores: vec![vec![SimilarityScore {
                score: 0.9,
                matched_peaks: 10,
            }]],
        });
        let matcher = AnnotationMatcher::new(settings(0.7, 5, 10.0)).unwrap();
        let repo = matcher.annotate(oracle, &stats, repo).unwrap();
        assert!(repo.get(&1).unwrap().annotations.is_some());
        assert!(repo.get(&2).unwrap().annotations.is_none());
    }

    #[test]
    fn test_reannotation_is_idempotent() {
        let library = vec![library_entry("lib0", "a", 100.0)];
        let stats = stats_with_library([1], library);
        let oracle = Arc::new(FixedOracle {
            scores: vec![vec![SimilarityScore {
                score: 0.9,
                matched_peaks: 10,
            }]],
        });
        let matcher = AnnotationMatcher::new(settings(0.7, 5, 10.0)).unwrap();
        let repo = matcher
            .annotate(oracle.clone(), &stats, one_feature_repo(100.0))
            .unwrap();
        let repo = matcher.annotate(oracle, &stats, repo).unwrap();
        assert_eq!(repo.get(&1).unwrap().annotations.unwrap().len(), 1);
    }

    /// Counts WARN events; everything else is a no-op.
    struct WarnCounter {
        warnings: Arc<AtomicUsize>,
    }

    impl tracing::Subscriber for WarnCounter {
        fn enabled(&self, _metadata: &tracing::Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _span: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }

        fn record(&self, _span: &tracing::span::Id, _values: &tracing::span::Record<'_>) {}

        fn record_follows_from(&self, _span: &tracing::span::Id, _follows: &tracing::span::Id) {}

        fn event(&self, event: &tracing::Event<'_>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.warnings.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn enter(&self, _span: &tracing::span::Id) {}

        fn exit(&self, _span: &tracing::span::Id) {}
    }

    #[test]
    fn test_timeout_leaves_repository_unchanged() {
        let library = vec![library_entry("lib0", "a", 100.0)];
        let stats = stats_with_library([1], library);
        let repo = one_feature_repo(100.0);
        let before = repo.get(&1).unwrap();

        let mut slow_settings = settings(0.7, 5, 10.0);
        slow_settings.maximum_runtime = 1;
        let matcher = AnnotationMatcher::new(slow_settings).unwrap();

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = WarnCounter {
            warnings: warnings.clone(),
        };
        let repo = tracing::subscriber::with_default(subscriber, || {
            matcher.annotate(Arc::new(SlowOracle), &stats, repo).unwrap()
        });

        assert_eq!(repo.get(&1).unwrap(), before);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_settings_validation() {
        let mut bad = settings(1.5, 5, 10.0);
        assert!(AnnotationMatcher::new(bad.clone()).is_err());
        bad.score_cutoff = 0.7;
        bad.min_nr_matched_peaks = 0;
        assert!(AnnotationMatcher::new(bad).is_err());
        assert!(AnnotationMatcher::new(settings(0.7, 5, 10.0)).is_ok());
    }
}
